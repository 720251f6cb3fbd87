// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Sign-In With Ethereum
//!
//! Server half of the challenge/response protocol:
//!
//! 1. [`NonceIssuer`] stores a single-use challenge and hands out its nonce
//! 2. The client builds a [`SiweMessage`] embedding the nonce and has the
//!    wallet sign it (EIP-191 `personal_sign`)
//! 3. [`SignatureVerifier`] consumes the challenge and recovers the signer
//!
//! [`ChallengeSweeper`] drops expired challenges in the background.

pub mod message;
pub mod nonce;
pub mod sweeper;
pub mod verifier;

pub use message::{MessageError, SiweFields, SiweMessage, SIWE_VERSION};
pub use nonce::{
    Challenge, ChallengeStore, Consumption, InMemoryChallengeStore, NonceError, NonceIssuer,
};
pub use sweeper::ChallengeSweeper;
pub use verifier::{recover_signer, SignatureVerifier, VerifiedSiwe, VerifyError};
