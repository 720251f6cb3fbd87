// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! A [`WalletProvider`] backed by a locally held [`Identity`].

use std::sync::atomic::{AtomicU64, Ordering};

use alloy::signers::{local::PrivateKeySigner, Signer};
use async_trait::async_trait;

use super::wallet::{known_chain, ChainParams, WalletError, WalletProvider};
use crate::identity::{Identity, IdentityError};

/// Signs with an in-process key. Knows the chains in [`known_chain`].
#[derive(Debug)]
pub struct LocalWallet {
    signer: PrivateKeySigner,
    chain_id: AtomicU64,
}

impl LocalWallet {
    pub fn new(identity: &Identity, chain_id: u64) -> Result<Self, IdentityError> {
        let signer = PrivateKeySigner::from_slice(&identity.secret_bytes())
            .map_err(|e| IdentityError::InvalidPrivateKey(e.to_string()))?;
        Ok(Self {
            signer,
            chain_id: AtomicU64::new(chain_id),
        })
    }

    pub fn address(&self) -> String {
        self.signer.address().to_checksum(None)
    }
}

#[async_trait]
impl WalletProvider for LocalWallet {
    async fn request_accounts(&self) -> Result<Vec<String>, WalletError> {
        Ok(vec![self.address()])
    }

    async fn chain_id(&self) -> Result<u64, WalletError> {
        Ok(self.chain_id.load(Ordering::Acquire))
    }

    async fn switch_network(&self, chain_id: u64) -> Result<(), WalletError> {
        if known_chain(chain_id).is_none() {
            return Err(WalletError::UnrecognizedChain(chain_id));
        }
        self.chain_id.store(chain_id, Ordering::Release);
        Ok(())
    }

    async fn add_network(&self, params: &ChainParams) -> Result<(), WalletError> {
        Err(WalletError::Provider {
            code: -32601,
            message: format!("cannot add {} to a local wallet", params.chain_name),
        })
    }

    async fn request_signature(&self, address: &str, message: &str) -> Result<String, WalletError> {
        if !address.eq_ignore_ascii_case(&self.address()) {
            return Err(WalletError::Provider {
                code: 4100,
                message: format!("account {address} is not held by this wallet"),
            });
        }

        let signature = self
            .signer
            .sign_message(message.as_bytes())
            .await
            .map_err(|e| WalletError::Provider {
                code: -32603,
                message: e.to_string(),
            })?;
        Ok(alloy::hex::encode_prefixed(signature.as_bytes()))
    }
}
