// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! SIWE endpoints.
//!
//! | Route | Effect |
//! |-------|--------|
//! | `GET /api/siwe/nonce` | new challenge, `siwe-nonce` cookie |
//! | `POST /api/siwe/verify` | spends the challenge, sets `siwe-session` on success |
//! | `GET /api/siwe/me` | reads `siwe-session` |
//! | `POST /api/siwe/logout` | clears `siwe-session` |
//!
//! Verification failures are logged with their reason but reported to the
//! client only as "Verification failed".

use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    Json,
};
use tracing::{info, warn};

use crate::{
    error::ApiError,
    models::{LogoutResponse, MeResponse, NonceResponse, VerifyRequest, VerifyResponse},
    session::{Session, SessionManager, SiweCookies},
    state::AppState,
};

/// Issue a fresh challenge.
///
/// Any challenge previously held by this client (per its nonce cookie) is
/// dropped.
#[utoipa::path(
    get,
    path = "/api/siwe/nonce",
    tag = "SIWE",
    responses(
        (status = 200, description = "Challenge issued; nonce cookie set", body = NonceResponse),
        (status = 500, description = "Secure randomness unavailable")
    )
)]
pub async fn nonce(
    State(state): State<AppState>,
    mut cookies: SiweCookies,
) -> Result<(HeaderMap, Json<NonceResponse>), ApiError> {
    let previous = cookies.nonce();
    let challenge = state.nonce_issuer().issue(previous.as_deref()).map_err(|e| {
        tracing::error!(error = %e, "Failed to issue SIWE challenge");
        ApiError::internal("Internal error")
    })?;

    cookies.set_nonce(&challenge.nonce);
    Ok((
        cookies.set_cookie_headers(),
        Json(NonceResponse {
            nonce: challenge.nonce,
        }),
    ))
}

/// Verify a signed SIWE message and start a session.
///
/// The challenge named by the nonce cookie is spent by every attempt,
/// successful or not, and the nonce cookie is cleared.
#[utoipa::path(
    post,
    path = "/api/siwe/verify",
    tag = "SIWE",
    request_body = VerifyRequest,
    responses(
        (status = 200, description = "Signature verified; session cookie set", body = VerifyResponse),
        (status = 400, description = "Missing nonce cookie or malformed request"),
        (status = 401, description = "Verification failed")
    )
)]
pub async fn verify(
    State(state): State<AppState>,
    mut cookies: SiweCookies,
    body: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<(HeaderMap, Json<VerifyResponse>), (HeaderMap, ApiError)> {
    let Some(nonce) = cookies.nonce() else {
        return Err((HeaderMap::new(), ApiError::bad_request("Missing nonce")));
    };
    cookies.clear_nonce();

    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            state.challenges.consume(&nonce);
            warn!(error = %rejection, "Rejected SIWE verify body");
            return Err((cookies.set_cookie_headers(), ApiError::bad_request("Bad request")));
        }
    };

    match state
        .verifier()
        .verify(&request.message, &request.signature, &nonce)
    {
        Ok(verified) => {
            let session = Session::from(verified);
            SessionManager::new(&mut cookies).persist(&session);
            info!(
                account = %session.account_id().unwrap_or_default(),
                did = %session.did().unwrap_or_default(),
                "SIWE sign-in"
            );
            Ok((
                cookies.set_cookie_headers(),
                Json(VerifyResponse { ok: true, session }),
            ))
        }
        Err(e) if e.is_malformed() => {
            warn!(reason = e.code(), error = %e, "Malformed SIWE message");
            Err((cookies.set_cookie_headers(), ApiError::bad_request("Bad request")))
        }
        Err(e) => {
            warn!(reason = e.code(), error = %e, "SIWE verification failed");
            Err((
                cookies.set_cookie_headers(),
                ApiError::unauthorized("Verification failed"),
            ))
        }
    }
}

/// Current session, or `{ "ok": false }`.
#[utoipa::path(
    get,
    path = "/api/siwe/me",
    tag = "SIWE",
    responses(
        (status = 200, description = "Session status", body = MeResponse)
    )
)]
pub async fn me(cookies: SiweCookies) -> Json<MeResponse> {
    Json(MeResponse::from(SessionManager::new(cookies).retrieve()))
}

#[utoipa::path(
    post,
    path = "/api/siwe/logout",
    tag = "SIWE",
    responses(
        (status = 200, description = "Session cookie cleared", body = LogoutResponse)
    )
)]
pub async fn logout(mut cookies: SiweCookies) -> (HeaderMap, Json<LogoutResponse>) {
    let mut manager = SessionManager::new(&mut cookies);
    if let Some(session) = manager.retrieve() {
        info!(address = %session.address, "SIWE sign-out");
    }
    manager.invalidate();

    (cookies.set_cookie_headers(), Json(LogoutResponse { ok: true }))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use alloy::signers::{local::PrivateKeySigner, SignerSync};
    use axum::{
        body::{to_bytes, Body},
        http::{
            header::{CONTENT_TYPE, COOKIE, SET_COOKIE},
            Request, StatusCode,
        },
        Router,
    };
    use chrono::Utc;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::api::router;
    use crate::clock::{Clock, ManualClock};
    use crate::config::SiweConfig;
    use crate::siwe::{InMemoryChallengeStore, SiweFields, SiweMessage};
    use crate::state::AppState;

    /// A router plus the cookies a browser would hold for it.
    struct Browser {
        app: Router,
        state: AppState,
        clock: Arc<ManualClock>,
        jar: BTreeMap<String, String>,
    }

    impl Browser {
        fn new() -> Self {
            let clock = Arc::new(ManualClock::new(Utc::now()));
            let config = SiweConfig {
                session_secret: Some(b"router-test-secret-0123456789abcdef".to_vec()),
                expected_domain: Some("mail.example.com".into()),
                ..SiweConfig::default()
            };
            let state = AppState::new(
                config,
                Arc::new(InMemoryChallengeStore::new()),
                clock.clone(),
            )
            .unwrap();
            Self {
                app: router(state.clone()),
                state,
                clock,
                jar: BTreeMap::new(),
            }
        }

        async fn send(&mut self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
            let mut request = Request::builder().method(method).uri(uri);
            if !self.jar.is_empty() {
                let cookie = self
                    .jar
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect::<Vec<_>>()
                    .join("; ");
                request = request.header(COOKIE, cookie);
            }
            let body = match body {
                Some(json) => {
                    request = request.header(CONTENT_TYPE, "application/json");
                    Body::from(json.to_string())
                }
                None => Body::empty(),
            };

            let response = self
                .app
                .clone()
                .oneshot(request.body(body).unwrap())
                .await
                .unwrap();

            for header in response.headers().get_all(SET_COOKIE) {
                let raw = header.to_str().unwrap();
                let pair = raw.split(';').next().unwrap();
                let (name, value) = pair.split_once('=').unwrap();
                if value.is_empty() {
                    self.jar.remove(name);
                } else {
                    self.jar.insert(name.to_string(), value.to_string());
                }
            }

            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            (status, serde_json::from_slice(&bytes).unwrap())
        }

        async fn fetch_nonce(&mut self) -> String {
            let (status, body) = self.send("GET", "/api/siwe/nonce", None).await;
            assert_eq!(status, StatusCode::OK);
            body["nonce"].as_str().unwrap().to_string()
        }

        fn signed(&self, signer: &PrivateKeySigner, nonce: &str, chain_id: u64) -> Value {
            let message = SiweMessage::build(SiweFields {
                domain: Some("mail.example.com".into()),
                address: Some(signer.address().to_string()),
                statement: Some("Sign in to BitMail via SIWE".into()),
                uri: Some("https://mail.example.com".into()),
                version: Some("1".into()),
                chain_id: Some(chain_id),
                nonce: Some(nonce.into()),
                issued_at: Some(self.clock.now()),
                ..Default::default()
            })
            .unwrap()
            .to_string();
            let signature = signer.sign_message_sync(message.as_bytes()).unwrap();
            json!({
                "message": message,
                "signature": alloy::hex::encode_prefixed(signature.as_bytes()),
            })
        }
    }

    #[tokio::test]
    async fn nonce_sets_cookie_matching_body() {
        let mut browser = Browser::new();
        let nonce = browser.fetch_nonce().await;

        assert_eq!(nonce.len(), 32);
        assert_eq!(browser.jar.get("siwe-nonce"), Some(&nonce));
        assert_eq!(browser.state.challenges.len(), 1);
    }

    #[tokio::test]
    async fn refetching_nonce_replaces_previous_challenge() {
        let mut browser = Browser::new();
        let first = browser.fetch_nonce().await;
        let second = browser.fetch_nonce().await;

        assert_ne!(first, second);
        assert_eq!(browser.state.challenges.len(), 1);
    }

    #[tokio::test]
    async fn sign_in_then_me_returns_session() {
        let mut browser = Browser::new();
        let signer = PrivateKeySigner::random();
        let nonce = browser.fetch_nonce().await;
        let payload = browser.signed(&signer, &nonce, 1);

        let (status, body) = browser.send("POST", "/api/siwe/verify", Some(payload)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["session"]["address"], signer.address().to_checksum(None));
        assert_eq!(body["session"]["chainId"], 1);
        assert!(!browser.jar.contains_key("siwe-nonce"));

        let (status, me) = browser.send("GET", "/api/siwe/me", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["ok"], true);
        assert_eq!(me["session"], body["session"]);
    }

    #[tokio::test]
    async fn replayed_payload_is_rejected() {
        let mut browser = Browser::new();
        let signer = PrivateKeySigner::random();
        let nonce = browser.fetch_nonce().await;
        let payload = browser.signed(&signer, &nonce, 1);

        let (status, _) = browser.send("POST", "/api/siwe/verify", Some(payload.clone())).await;
        assert_eq!(status, StatusCode::OK);

        // Put the spent nonce back, as an attacker replaying the request would.
        browser.jar.insert("siwe-nonce".into(), nonce);
        let (status, body) = browser.send("POST", "/api/siwe/verify", Some(payload)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({"ok": false, "error": "Verification failed"}));
    }

    #[tokio::test]
    async fn verify_without_nonce_is_bad_request() {
        let mut browser = Browser::new();
        let signer = PrivateKeySigner::random();
        let payload = browser.signed(&signer, "abcdef0123456789", 1);

        let (status, body) = browser.send("POST", "/api/siwe/verify", Some(payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"ok": false, "error": "Missing nonce"}));
    }

    #[tokio::test]
    async fn logout_ends_session() {
        let mut browser = Browser::new();
        let signer = PrivateKeySigner::random();
        let nonce = browser.fetch_nonce().await;
        let payload = browser.signed(&signer, &nonce, 1);
        browser.send("POST", "/api/siwe/verify", Some(payload)).await;

        let (status, body) = browser.send("POST", "/api/siwe/logout", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"ok": true}));
        assert!(!browser.jar.contains_key("siwe-session"));

        let (status, me) = browser.send("GET", "/api/siwe/me", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me, json!({"ok": false}));
    }

    #[tokio::test]
    async fn me_without_cookie_is_not_an_error() {
        let mut browser = Browser::new();
        let (status, me) = browser.send("GET", "/api/siwe/me", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me, json!({"ok": false}));
    }

    #[tokio::test]
    async fn forged_session_cookie_is_ignored() {
        let mut browser = Browser::new();
        browser
            .jar
            .insert("siwe-session".into(), "eyJhZGRyZXNzIjoiMHgxIn0.AAAA".into());

        let (_, me) = browser.send("GET", "/api/siwe/me", None).await;
        assert_eq!(me, json!({"ok": false}));
    }

    #[tokio::test]
    async fn bad_body_is_bad_request_and_spends_nonce() {
        let mut browser = Browser::new();
        let nonce = browser.fetch_nonce().await;

        let (status, body) = browser
            .send("POST", "/api/siwe/verify", Some(json!({"message": 42})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Bad request");

        let signer = PrivateKeySigner::random();
        let payload = browser.signed(&signer, &nonce, 1);
        browser.jar.insert("siwe-nonce".into(), nonce);
        let (status, _) = browser.send("POST", "/api/siwe/verify", Some(payload)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn malformed_message_is_bad_request() {
        let mut browser = Browser::new();
        browser.fetch_nonce().await;

        let payload = json!({"message": "hello", "signature": "0x00"});
        let (status, body) = browser.send("POST", "/api/siwe/verify", Some(payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Bad request");
    }

    #[tokio::test]
    async fn wrong_signer_is_unauthorized() {
        let mut browser = Browser::new();
        let claimed = PrivateKeySigner::random();
        let actual = PrivateKeySigner::random();
        let nonce = browser.fetch_nonce().await;

        let mut payload = browser.signed(&claimed, &nonce, 1);
        let message = payload["message"].as_str().unwrap().to_string();
        let forged = actual.sign_message_sync(message.as_bytes()).unwrap();
        payload["signature"] = json!(alloy::hex::encode_prefixed(forged.as_bytes()));

        let (status, body) = browser.send("POST", "/api/siwe/verify", Some(payload)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Verification failed");
        assert!(!browser.jar.contains_key("siwe-session"));
    }

    #[tokio::test]
    async fn expired_challenge_is_unauthorized() {
        let mut browser = Browser::new();
        let signer = PrivateKeySigner::random();
        let nonce = browser.fetch_nonce().await;
        browser.clock.advance(chrono::Duration::minutes(11));
        let payload = browser.signed(&signer, &nonce, 1);

        let (status, _) = browser.send("POST", "/api/siwe/verify", Some(payload)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
