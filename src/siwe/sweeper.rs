// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Challenge Sweeper
//!
//! Background task that drops challenges older than the nonce TTL. Expired
//! challenges already fail verification; sweeping only bounds memory.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken`; cancel the token to stop the
//! loop between sweeps.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::nonce::ChallengeStore;
use crate::clock::Clock;

/// Periodically purges expired challenges from a [`ChallengeStore`].
pub struct ChallengeSweeper {
    store: Arc<dyn ChallengeStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    interval: Duration,
}

impl ChallengeSweeper {
    pub fn new(
        store: Arc<dyn ChallengeStore>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            ttl,
            interval,
        }
    }

    /// Run until the cancellation token is triggered.
    ///
    /// ```rust,ignore
    /// tokio::spawn(sweeper.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            ttl_secs = self.ttl.as_secs(),
            "Challenge sweeper starting"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Challenge sweeper shutting down");
                    return;
                }
            }

            self.sweep_once();
        }
    }

    /// Purge expired challenges once, returning how many were removed.
    pub fn sweep_once(&self) -> usize {
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX);
        let cutoff = self
            .clock
            .now()
            .checked_sub_signed(ttl)
            .unwrap_or(chrono::DateTime::<chrono::Utc>::MIN_UTC);

        let purged = self.store.purge_issued_before(cutoff);
        if purged > 0 {
            debug!(purged, remaining = self.store.len(), "Swept expired SIWE challenges");
        }
        purged
    }
}
