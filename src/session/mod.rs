// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Sessions
//!
//! A [`Session`] is minted only from a verified SIWE message. Where it lives
//! is up to the [`SessionStore`]:
//!
//! - [`SiweCookies`]: authoritative server copy in a signed http-only cookie
//! - [`MemorySessionStore`]: tests, and the client's non-authoritative cache

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::identity::{caip10_account, did_pkh};
use crate::siwe::VerifiedSiwe;

pub mod cookies;

pub use cookies::{
    CookieSettings, SessionKey, SessionKeyError, SiweCookies, NONCE_COOKIE, SESSION_COOKIE,
};

/// An authenticated wallet session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// EIP-55 checksummed account address.
    #[schema(example = "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf")]
    pub address: String,
    /// Chain the message was signed for.
    #[schema(example = 1)]
    pub chain_id: u64,
    /// `Issued At` of the signed message, verbatim.
    #[schema(example = "2026-03-14T09:26:53.000Z")]
    pub issued_at: String,
}

impl Session {
    /// CAIP-10 account id of the signed-in address.
    pub fn account_id(&self) -> Option<String> {
        caip10_account(self.chain_id, &self.address)
    }

    /// `did:pkh` of the signed-in address.
    pub fn did(&self) -> Option<String> {
        did_pkh(self.chain_id, &self.address)
    }
}

impl From<VerifiedSiwe> for Session {
    fn from(verified: VerifiedSiwe) -> Self {
        SessionManager::<MemorySessionStore>::mint(
            verified.address,
            verified.chain_id,
            verified.issued_at,
        )
    }
}

/// Where a session record is kept.
pub trait SessionStore {
    /// Store `session`, replacing any previous one.
    fn persist(&mut self, session: &Session);

    /// The stored session. Missing or unreadable records yield `None`.
    fn retrieve(&self) -> Option<Session>;

    /// Forget the stored session. Idempotent.
    fn invalidate(&mut self);
}

impl<S: SessionStore + ?Sized> SessionStore for &mut S {
    fn persist(&mut self, session: &Session) {
        (**self).persist(session)
    }

    fn retrieve(&self) -> Option<Session> {
        (**self).retrieve()
    }

    fn invalidate(&mut self) {
        (**self).invalidate()
    }
}

/// Session store held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    session: Option<Session>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn persist(&mut self, session: &Session) {
        self.session = Some(session.clone());
    }

    fn retrieve(&self) -> Option<Session> {
        self.session.clone()
    }

    fn invalidate(&mut self) {
        self.session = None;
    }
}

/// Mints sessions and manages them in a [`SessionStore`].
#[derive(Debug)]
pub struct SessionManager<S> {
    store: S,
}

impl<S: SessionStore> SessionManager<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Build a session record for a verified account.
    pub fn mint(address: Address, chain_id: u64, issued_at: impl Into<String>) -> Session {
        Session {
            address: address.to_checksum(None),
            chain_id,
            issued_at: issued_at.into(),
        }
    }

    pub fn persist(&mut self, session: &Session) {
        self.store.persist(session);
        tracing::debug!(address = %session.address, chain_id = session.chain_id, "Session persisted");
    }

    pub fn retrieve(&self) -> Option<Session> {
        self.store.retrieve()
    }

    pub fn invalidate(&mut self) {
        self.store.invalidate();
    }
}
