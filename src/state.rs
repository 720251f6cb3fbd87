// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::clock::Clock;
use crate::config::SiweConfig;
use crate::session::{CookieSettings, SessionKey, SessionKeyError};
use crate::siwe::{ChallengeStore, NonceIssuer, SignatureVerifier};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<SiweConfig>,
    pub challenges: Arc<dyn ChallengeStore>,
    pub clock: Arc<dyn Clock>,
    pub session_key: Arc<SessionKey>,
}

impl AppState {
    pub fn new(
        config: SiweConfig,
        challenges: Arc<dyn ChallengeStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, SessionKeyError> {
        let session_key = match &config.session_secret {
            Some(secret) => SessionKey::new(secret)?,
            None => {
                tracing::warn!("No session secret configured; sessions will not survive a restart");
                SessionKey::random()?
            }
        };

        Ok(Self {
            config: Arc::new(config),
            challenges,
            clock,
            session_key: Arc::new(session_key),
        })
    }

    pub fn nonce_issuer(&self) -> NonceIssuer {
        NonceIssuer::new(self.challenges.clone(), self.clock.clone())
    }

    pub fn verifier(&self) -> SignatureVerifier {
        let verifier = SignatureVerifier::new(
            self.challenges.clone(),
            self.clock.clone(),
            self.config.nonce_ttl,
        );
        match &self.config.expected_domain {
            Some(domain) => verifier.with_expected_domain(domain.clone()),
            None => verifier,
        }
    }

    pub fn cookie_settings(&self) -> CookieSettings {
        CookieSettings {
            secure: self.config.cookie_secure,
            nonce_max_age: self.config.nonce_ttl,
            session_max_age: self.config.session_ttl,
        }
    }
}

#[cfg(test)]
impl Default for AppState {
    fn default() -> Self {
        let config = SiweConfig {
            session_secret: Some(b"test-session-secret-0123456789abcdef".to_vec()),
            ..SiweConfig::default()
        };
        Self::new(
            config,
            Arc::new(crate::siwe::InMemoryChallengeStore::new()),
            Arc::new(crate::clock::SystemClock),
        )
        .expect("test state")
    }
}
