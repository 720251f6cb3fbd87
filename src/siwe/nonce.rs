// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Challenge issuance and the single-use nonce store.
//!
//! Each browser context holds at most one live challenge, referenced by the
//! nonce cookie. A challenge is consumed by the first verification attempt
//! that names it, whatever that attempt's outcome.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use k256::elliptic_curve::rand_core::{OsRng, RngCore};

use crate::clock::Clock;

/// Random bytes per nonce (128 bits of entropy).
pub const NONCE_BYTES: usize = 16;

/// A server-side challenge record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub nonce: String,
    pub issued_at: DateTime<Utc>,
    pub consumed: bool,
}

/// State of a challenge at the moment it was consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Consumption {
    /// First use. The challenge is now marked consumed.
    Fresh(Challenge),
    /// A previous attempt already used this nonce.
    AlreadyConsumed(Challenge),
    /// No such challenge (never issued, replaced or swept).
    Unknown,
}

/// Storage for outstanding challenges, keyed by nonce.
pub trait ChallengeStore: Send + Sync {
    fn insert(&self, challenge: Challenge);

    fn remove(&self, nonce: &str) -> Option<Challenge>;

    /// Mark the challenge consumed and report its previous state.
    ///
    /// Lookup and flag update happen under one per-key lock, so concurrent
    /// callers never both observe [`Consumption::Fresh`].
    fn consume(&self, nonce: &str) -> Consumption;

    /// Drop every challenge issued strictly before `cutoff`.
    fn purge_issued_before(&self, cutoff: DateTime<Utc>) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-local challenge store.
#[derive(Debug, Default)]
pub struct InMemoryChallengeStore {
    challenges: DashMap<String, Challenge>,
}

impl InMemoryChallengeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChallengeStore for InMemoryChallengeStore {
    fn insert(&self, challenge: Challenge) {
        self.challenges.insert(challenge.nonce.clone(), challenge);
    }

    fn remove(&self, nonce: &str) -> Option<Challenge> {
        self.challenges.remove(nonce).map(|(_, challenge)| challenge)
    }

    fn consume(&self, nonce: &str) -> Consumption {
        match self.challenges.get_mut(nonce) {
            Some(mut entry) => {
                let was_consumed = std::mem::replace(&mut entry.consumed, true);
                let prior = Challenge {
                    consumed: was_consumed,
                    ..entry.clone()
                };
                if was_consumed {
                    Consumption::AlreadyConsumed(prior)
                } else {
                    Consumption::Fresh(prior)
                }
            }
            None => Consumption::Unknown,
        }
    }

    fn purge_issued_before(&self, cutoff: DateTime<Utc>) -> usize {
        let before = self.challenges.len();
        self.challenges.retain(|_, challenge| challenge.issued_at >= cutoff);
        before.saturating_sub(self.challenges.len())
    }

    fn len(&self) -> usize {
        self.challenges.len()
    }
}

/// Errors raised while issuing a challenge.
#[derive(Debug, thiserror::Error)]
pub enum NonceError {
    #[error("Secure randomness unavailable: {0}")]
    RandomnessUnavailable(String),
}

/// Issues challenges into a [`ChallengeStore`].
#[derive(Clone)]
pub struct NonceIssuer {
    store: Arc<dyn ChallengeStore>,
    clock: Arc<dyn Clock>,
}

impl NonceIssuer {
    pub fn new(store: Arc<dyn ChallengeStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Issue a fresh challenge.
    ///
    /// `previous` is the nonce this client context held before, if any. It is
    /// dropped so that only the newest challenge stays usable.
    pub fn issue(&self, previous: Option<&str>) -> Result<Challenge, NonceError> {
        if let Some(previous) = previous {
            if self.store.remove(previous).is_some() {
                tracing::debug!("Replaced outstanding SIWE challenge");
            }
        }

        let challenge = Challenge {
            nonce: generate_nonce()?,
            issued_at: self.clock.now(),
            consumed: false,
        };
        self.store.insert(challenge.clone());

        Ok(challenge)
    }
}

/// Generate a hex nonce from the operating system RNG.
///
/// Hex keeps the nonce inside the alphanumeric alphabet EIP-4361 requires.
pub fn generate_nonce() -> Result<String, NonceError> {
    let mut bytes = [0u8; NONCE_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| NonceError::RandomnessUnavailable(e.to_string()))?;
    Ok(alloy::hex::encode(bytes))
}
