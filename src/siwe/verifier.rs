// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! SIWE signature verification.
//!
//! ## Order of checks
//!
//! 1. Consume the expected challenge (atomic, whatever happens next)
//! 2. Parse the message strictly
//! 3. Message nonce must equal the expected nonce
//! 4. Challenge must have been fresh and younger than the TTL
//! 5. Domain, expiration and not-before constraints
//! 6. EIP-191 signer recovery must yield the message address
//!
//! A nonce is never usable twice, so a failed attempt cannot be retried with
//! the same challenge. Callers fetch a new nonce instead.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, Signature};

use super::message::{MessageError, SiweMessage};
use super::nonce::{ChallengeStore, Consumption};
use crate::clock::Clock;

/// Identity fields extracted from a verified message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedSiwe {
    pub address: Address,
    pub chain_id: u64,
    pub issued_at: String,
}

/// Reasons a verification attempt fails.
///
/// Only [`VerifyError::Malformed`] is distinguishable by clients; everything
/// else is reported as a generic verification failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    #[error(transparent)]
    Malformed(#[from] MessageError),

    #[error("message nonce does not match the issued challenge")]
    NonceMismatch,

    #[error("challenge is unknown or was already used")]
    NonceReplayed,

    #[error("challenge expired")]
    ChallengeExpired,

    #[error("message domain {actual:?} does not match {expected:?}")]
    DomainMismatch { expected: String, actual: String },

    #[error("message expiration time has passed")]
    MessageExpired,

    #[error("message is not valid yet")]
    MessageNotYetValid,

    #[error("signature does not match message address: {0}")]
    SignatureMismatch(String),
}

impl VerifyError {
    /// Stable identifier for logs.
    pub fn code(&self) -> &'static str {
        match self {
            VerifyError::Malformed(MessageError::MissingField(_)) => "missing_field",
            VerifyError::Malformed(MessageError::MalformedMessage(_)) => "malformed_message",
            VerifyError::NonceMismatch => "nonce_mismatch",
            VerifyError::NonceReplayed => "nonce_replayed",
            VerifyError::ChallengeExpired => "challenge_expired",
            VerifyError::DomainMismatch { .. } => "domain_mismatch",
            VerifyError::MessageExpired => "message_expired",
            VerifyError::MessageNotYetValid => "message_not_yet_valid",
            VerifyError::SignatureMismatch(_) => "signature_mismatch",
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, VerifyError::Malformed(_))
    }
}

/// Verifies signed SIWE messages against outstanding challenges.
#[derive(Clone)]
pub struct SignatureVerifier {
    store: Arc<dyn ChallengeStore>,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
    expected_domain: Option<String>,
}

impl SignatureVerifier {
    pub fn new(store: Arc<dyn ChallengeStore>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            store,
            clock,
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX),
            expected_domain: None,
        }
    }

    /// Reject messages whose domain differs from `domain`.
    pub fn with_expected_domain(mut self, domain: impl Into<String>) -> Self {
        self.expected_domain = Some(domain.into());
        self
    }

    /// Verify `signature` over the exact bytes of `message`.
    pub fn verify(
        &self,
        message: &str,
        signature: &str,
        expected_nonce: &str,
    ) -> Result<VerifiedSiwe, VerifyError> {
        let consumption = self.store.consume(expected_nonce);

        let parsed = SiweMessage::parse(message)?;
        if parsed.nonce != expected_nonce {
            return Err(VerifyError::NonceMismatch);
        }

        let challenge = match consumption {
            Consumption::Fresh(challenge) => challenge,
            Consumption::AlreadyConsumed(_) | Consumption::Unknown => {
                return Err(VerifyError::NonceReplayed)
            }
        };

        let now = self.clock.now();
        if now.signed_duration_since(challenge.issued_at) > self.ttl {
            return Err(VerifyError::ChallengeExpired);
        }

        if let Some(expected) = &self.expected_domain {
            if &parsed.domain != expected {
                return Err(VerifyError::DomainMismatch {
                    expected: expected.clone(),
                    actual: parsed.domain,
                });
            }
        }
        if let Some(expiration) = parsed.expiration_time()? {
            if now >= expiration {
                return Err(VerifyError::MessageExpired);
            }
        }
        if let Some(not_before) = parsed.not_before_time()? {
            if now < not_before {
                return Err(VerifyError::MessageNotYetValid);
            }
        }

        let recovered = recover_signer(message, signature)?;
        if recovered != parsed.address {
            return Err(VerifyError::SignatureMismatch(format!(
                "recovered {}",
                recovered.to_checksum(None)
            )));
        }

        Ok(VerifiedSiwe {
            address: parsed.address,
            chain_id: parsed.chain_id,
            issued_at: parsed.issued_at,
        })
    }
}

/// Recover the EIP-191 (`personal_sign`) signer of `message`.
pub fn recover_signer(message: &str, signature: &str) -> Result<Address, VerifyError> {
    let bytes = alloy::hex::decode(signature.trim())
        .map_err(|e| VerifyError::SignatureMismatch(format!("invalid signature hex: {e}")))?;
    let signature = Signature::try_from(bytes.as_slice())
        .map_err(|e| VerifyError::SignatureMismatch(format!("invalid signature: {e}")))?;

    signature
        .recover_address_from_msg(message.as_bytes())
        .map_err(|e| VerifyError::SignatureMismatch(format!("recovery failed: {e}")))
}
