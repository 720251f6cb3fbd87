// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! secp256k1 identity key pairs.
//!
//! An [`Identity`] only ever stores the secret scalar. The compressed public
//! key and the Ethereum address are always derived from it.

use alloy::primitives::{keccak256, Address};
use k256::elliptic_curve::rand_core::{OsRng, RngCore};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use k256::SecretKey;

pub mod did;

pub use did::{caip10_account, did_ethr, did_pkh, normalize_address};

/// Length of a raw secret key.
pub const SECRET_KEY_LEN: usize = 32;

/// Length of a SEC1 compressed public key.
pub const COMPRESSED_PUBLIC_KEY_LEN: usize = 33;

/// Errors produced while creating or loading identities.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Secure randomness unavailable: {0}")]
    RandomnessUnavailable(String),
}

/// A secp256k1 key pair.
#[derive(Clone)]
pub struct Identity {
    secret: SecretKey,
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("public_key", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

impl Identity {
    /// Generate a fresh identity from the operating system RNG.
    pub fn generate() -> Result<Self, IdentityError> {
        loop {
            let mut bytes = [0u8; SECRET_KEY_LEN];
            OsRng
                .try_fill_bytes(&mut bytes)
                .map_err(|e| IdentityError::RandomnessUnavailable(e.to_string()))?;

            // Zero or >= n is astronomically unlikely; draw again if it happens.
            if let Ok(secret) = SecretKey::from_slice(&bytes) {
                return Ok(Self { secret });
            }
        }
    }

    /// Load an identity from raw secret bytes.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, IdentityError> {
        // SecretKey::from_slice zero-pads short input, so the length is checked here.
        if bytes.len() != SECRET_KEY_LEN {
            return Err(IdentityError::InvalidPrivateKey(format!(
                "expected {SECRET_KEY_LEN} bytes, got {}",
                bytes.len()
            )));
        }

        let secret = SecretKey::from_slice(bytes).map_err(|_| {
            IdentityError::InvalidPrivateKey("scalar is zero or not below the curve order".into())
        })?;

        Ok(Self { secret })
    }

    /// Load an identity from a hex-encoded secret (with or without `0x`).
    pub fn from_private_key_hex(private_key_hex: &str) -> Result<Self, IdentityError> {
        let bytes = alloy::hex::decode(private_key_hex.trim())
            .map_err(|e| IdentityError::InvalidPrivateKey(format!("invalid hex: {e}")))?;
        Self::from_secret_bytes(&bytes)
    }

    /// Load an identity from a PEM-encoded secret (PKCS#8 or SEC1).
    pub fn from_pem(pem: &str) -> Result<Self, IdentityError> {
        let secret = SecretKey::from_pkcs8_pem(pem)
            .or_else(|_| SecretKey::from_sec1_pem(pem))
            .map_err(|e| IdentityError::InvalidPrivateKey(format!("invalid PEM: {e}")))?;
        Ok(Self { secret })
    }

    /// Encode the secret as PKCS#8 PEM for storage.
    pub fn to_pkcs8_pem(&self) -> Result<String, IdentityError> {
        self.secret
            .to_pkcs8_pem(LineEnding::LF)
            .map(|pem| pem.to_string())
            .map_err(|e| IdentityError::InvalidPrivateKey(format!("PEM encoding failed: {e}")))
    }

    /// Raw secret bytes.
    pub fn secret_bytes(&self) -> [u8; SECRET_KEY_LEN] {
        self.secret.to_bytes().into()
    }

    /// Hex-encoded secret, without `0x` prefix.
    pub fn private_key_hex(&self) -> String {
        alloy::hex::encode(self.secret_bytes())
    }

    /// SEC1 compressed public key.
    pub fn public_key_bytes(&self) -> [u8; COMPRESSED_PUBLIC_KEY_LEN] {
        let point = self.secret.public_key().to_encoded_point(true);
        let mut out = [0u8; COMPRESSED_PUBLIC_KEY_LEN];
        out.copy_from_slice(point.as_bytes());
        out
    }

    /// Hex-encoded compressed public key, without `0x` prefix.
    pub fn public_key_hex(&self) -> String {
        alloy::hex::encode(self.public_key_bytes())
    }

    /// Ethereum address controlled by this key.
    pub fn address(&self) -> Address {
        let uncompressed = self.secret.public_key().to_encoded_point(false);
        // Skip the 0x04 prefix and keep the last 20 bytes of the hash.
        let hash = keccak256(&uncompressed.as_bytes()[1..]);
        Address::from_slice(&hash[12..])
    }

    /// EIP-55 checksummed address.
    pub fn checksum_address(&self) -> String {
        self.address().to_checksum(None)
    }
}

/// Generate a new identity.
pub fn generate() -> Result<Identity, IdentityError> {
    Identity::generate()
}

/// Derive the hex-encoded compressed public key of a hex-encoded secret.
pub fn derive_public(private_key_hex: &str) -> Result<String, IdentityError> {
    Identity::from_private_key_hex(private_key_hex).map(|identity| identity.public_key_hex())
}
