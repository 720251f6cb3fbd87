// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! BitMail Auth - Sign-In With Ethereum
//!
//! Challenge, verification and session handling for wallet sign-in, plus the
//! client-side flow that drives it.
//!
//! ## Modules
//!
//! - `api` - HTTP handlers (Axum) for `/api/siwe/*` and health probes
//! - `client` - Wallet capability, HTTP client and sign-in state machine
//! - `identity` - secp256k1 identity keys, addresses and DID formatting
//! - `session` - Session records and the signed cookie store
//! - `siwe` - EIP-4361 messages, challenges and signature verification

pub mod api;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod identity;
pub mod models;
pub mod session;
pub mod siwe;
pub mod state;
