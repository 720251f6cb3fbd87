// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallet capability used by the sign-in flow.
//!
//! Errors follow EIP-1193 provider codes: `4001` user rejected, `4902` chain
//! not added to the wallet.

use async_trait::async_trait;
use serde::Serialize;

/// EIP-1193 "user rejected the request".
pub const USER_REJECTED_CODE: i64 = 4001;

/// EIP-1193 / EIP-3326 "unrecognized chain id".
pub const UNRECOGNIZED_CHAIN_CODE: i64 = 4902;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalletError {
    #[error("request rejected by the user")]
    Rejected,

    #[error("chain {0} is not known to the wallet")]
    UnrecognizedChain(u64),

    #[error("no wallet available")]
    Unavailable,

    #[error("wallet error {code}: {message}")]
    Provider { code: i64, message: String },
}

impl WalletError {
    /// Map a raw provider error code.
    pub fn from_code(code: i64, message: impl Into<String>, chain_id: u64) -> Self {
        match code {
            USER_REJECTED_CODE => WalletError::Rejected,
            UNRECOGNIZED_CHAIN_CODE => WalletError::UnrecognizedChain(chain_id),
            _ => WalletError::Provider {
                code,
                message: message.into(),
            },
        }
    }
}

/// Native currency of a chain, as `wallet_addEthereumChain` expects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NativeCurrency {
    pub name: &'static str,
    pub symbol: &'static str,
    pub decimals: u8,
}

/// Parameters for `wallet_addEthereumChain`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainParams {
    /// 0x-prefixed hex chain id.
    pub chain_id: String,
    pub chain_name: &'static str,
    pub native_currency: NativeCurrency,
    pub rpc_urls: Vec<&'static str>,
    pub block_explorer_urls: Vec<&'static str>,
}

/// Parameters for the chains the app can add on demand.
pub fn known_chain(chain_id: u64) -> Option<ChainParams> {
    let eth = |name| NativeCurrency {
        name,
        symbol: "ETH",
        decimals: 18,
    };
    let pol = NativeCurrency {
        name: "POL",
        symbol: "POL",
        decimals: 18,
    };

    let (chain_name, native_currency, rpc, explorer) = match chain_id {
        1 => (
            "Ethereum Mainnet",
            eth("Ether"),
            "https://cloudflare-eth.com",
            "https://etherscan.io",
        ),
        11155111 => (
            "Sepolia",
            eth("Sepolia Ether"),
            "https://rpc.sepolia.org",
            "https://sepolia.etherscan.io",
        ),
        137 => (
            "Polygon Mainnet",
            pol,
            "https://polygon-rpc.com",
            "https://polygonscan.com",
        ),
        80002 => (
            "Polygon Amoy",
            pol,
            "https://rpc-amoy.polygon.technology",
            "https://amoy.polygonscan.com",
        ),
        _ => return None,
    };

    Some(ChainParams {
        chain_id: format!("{chain_id:#x}"),
        chain_name,
        native_currency,
        rpc_urls: vec![rpc],
        block_explorer_urls: vec![explorer],
    })
}

/// An injected wallet (browser extension, WalletConnect session, local key).
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Ask the wallet to expose its accounts (`eth_requestAccounts`).
    async fn request_accounts(&self) -> Result<Vec<String>, WalletError>;

    /// Chain the wallet is currently on (`eth_chainId`).
    async fn chain_id(&self) -> Result<u64, WalletError>;

    /// `wallet_switchEthereumChain`.
    async fn switch_network(&self, chain_id: u64) -> Result<(), WalletError>;

    /// `wallet_addEthereumChain`.
    async fn add_network(&self, params: &ChainParams) -> Result<(), WalletError>;

    /// `personal_sign` over the UTF-8 bytes of `message`. Returns 0x-hex.
    async fn request_signature(&self, address: &str, message: &str) -> Result<String, WalletError>;

    /// `wallet_revokePermissions`. Wallets without it succeed trivially.
    async fn revoke_permissions(&self) -> Result<(), WalletError> {
        Ok(())
    }
}

#[async_trait]
impl<T: WalletProvider + ?Sized> WalletProvider for std::sync::Arc<T> {
    async fn request_accounts(&self) -> Result<Vec<String>, WalletError> {
        (**self).request_accounts().await
    }

    async fn chain_id(&self) -> Result<u64, WalletError> {
        (**self).chain_id().await
    }

    async fn switch_network(&self, chain_id: u64) -> Result<(), WalletError> {
        (**self).switch_network(chain_id).await
    }

    async fn add_network(&self, params: &ChainParams) -> Result<(), WalletError> {
        (**self).add_network(params).await
    }

    async fn request_signature(&self, address: &str, message: &str) -> Result<String, WalletError> {
        (**self).request_signature(address, message).await
    }

    async fn revoke_permissions(&self) -> Result<(), WalletError> {
        (**self).revoke_permissions().await
    }
}
