// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response bodies of the SIWE endpoints. All types derive
//! `ToSchema` for the OpenAPI document served at `/docs`.
//!
//! Every response carries an `ok` flag so browser code can branch on the body
//! alone; errors use [`crate::error::ApiError`] with `ok: false`.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::session::Session;

/// Fresh challenge nonce. The same value is set in the `siwe-nonce` cookie.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct NonceResponse {
    #[schema(example = "9f2c4e1ab37d40c8a51e6b0f2d7c9e13")]
    pub nonce: String,
}

/// Signed SIWE message submitted for verification.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct VerifyRequest {
    /// The exact text the wallet signed.
    pub message: String,
    /// 65-byte `personal_sign` signature, 0x-prefixed hex.
    pub signature: String,
}

/// Result of a successful verification.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct VerifyResponse {
    pub ok: bool,
    pub session: Session,
}

/// Current session, if any.
///
/// `{ "ok": false }` when the request carries no valid session cookie.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct MeResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<Session>,
}

impl MeResponse {
    pub fn anonymous() -> Self {
        Self {
            ok: false,
            session: None,
        }
    }

    /// The session described by this response, when authenticated.
    pub fn into_session(self) -> Option<Session> {
        if self.ok {
            self.session
        } else {
            None
        }
    }
}

impl From<Option<Session>> for MeResponse {
    fn from(session: Option<Session>) -> Self {
        Self {
            ok: session.is_some(),
            session,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct LogoutResponse {
    pub ok: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_me_is_just_ok_false() {
        let json = serde_json::to_string(&MeResponse::anonymous()).unwrap();
        assert_eq!(json, r#"{"ok":false}"#);
    }

    #[test]
    fn me_round_trips_session() {
        let session = Session {
            address: "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf".into(),
            chain_id: 137,
            issued_at: "2026-03-14T09:26:53.000Z".into(),
        };
        let me = MeResponse::from(Some(session.clone()));
        let json = serde_json::to_value(&me).unwrap();
        assert_eq!(json["ok"], true);
        assert_eq!(json["session"]["chainId"], 137);
        assert_eq!(json["session"]["issuedAt"], "2026-03-14T09:26:53.000Z");

        let back: MeResponse = serde_json::from_value(json).unwrap();
        assert_eq!(back.into_session(), Some(session));
    }

    #[test]
    fn ok_false_hides_session() {
        let me: MeResponse = serde_json::from_str(
            r#"{"ok":false,"session":{"address":"0xabc","chainId":1,"issuedAt":"t"}}"#,
        )
        .unwrap();
        assert_eq!(me.into_session(), None);

        let me: MeResponse = serde_json::from_str(r#"{"ok":false}"#).unwrap();
        assert_eq!(me, MeResponse::anonymous());
    }
}
