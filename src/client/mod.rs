// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # SIWE Client
//!
//! Everything the app needs to sign a user in against the SIWE endpoints:
//!
//! - [`WalletProvider`]: injected wallet capability ([`LocalWallet`] signs with
//!   an in-process [`crate::identity::Identity`])
//! - [`SiweApi`]: the four endpoints ([`HttpSiweApi`] over `reqwest`)
//! - [`ClientOrchestrator`]: the sign-in state machine
//!
//! ```rust,ignore
//! let api = HttpSiweApi::new("https://mail.example.com", DEFAULT_REQUEST_TIMEOUT)?;
//! let flow = ClientOrchestrator::new(wallet, api);
//! let request = ConnectRequest::new("mail.example.com", "https://mail.example.com").with_chain(1);
//! let session = flow.connect(&request, &CancellationToken::new()).await?;
//! ```

pub mod api;
pub mod local;
pub mod orchestrator;
pub mod wallet;

pub use api::{ApiClientError, HttpSiweApi, SiweApi, DEFAULT_REQUEST_TIMEOUT};
pub use local::LocalWallet;
pub use orchestrator::{
    ClientOrchestrator, ConnectRequest, FlowError, FlowState, RetryPolicy, DEFAULT_STATEMENT,
};
pub use wallet::{known_chain, ChainParams, NativeCurrency, WalletError, WalletProvider};
