// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Cookie-backed SIWE state.
//!
//! Two separate cookies, both `HttpOnly; SameSite=Lax; Path=/`:
//!
//! - `siwe-nonce`: the nonce of the client's outstanding challenge
//! - `siwe-session`: `base64url(json(Session)) "." base64url(hmac_sha256)`
//!
//! Use the [`SiweCookies`] extractor in handlers, then append
//! [`SiweCookies::set_cookie_headers`] to the response.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::FromRequestParts,
    http::{
        header::{COOKIE, SET_COOKIE},
        request::Parts,
        HeaderMap, HeaderValue,
    },
};
use base64ct::{Base64UrlUnpadded, Encoding};
use cookie::{Cookie, CookieJar, SameSite};
use hmac::{Hmac, Mac};
use k256::elliptic_curve::rand_core::{OsRng, RngCore};
use sha2::Sha256;

use super::{Session, SessionStore};
use crate::state::AppState;

pub const NONCE_COOKIE: &str = "siwe-nonce";
pub const SESSION_COOKIE: &str = "siwe-session";

type HmacSha256 = Hmac<Sha256>;

/// Errors raised while setting up the session key.
#[derive(Debug, thiserror::Error)]
pub enum SessionKeyError {
    #[error("Secure randomness unavailable: {0}")]
    RandomnessUnavailable(String),

    #[error("Invalid session key: {0}")]
    InvalidKey(String),
}

/// HMAC key authenticating session cookies.
#[derive(Clone)]
pub struct SessionKey {
    mac: HmacSha256,
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

impl SessionKey {
    pub fn new(secret: &[u8]) -> Result<Self, SessionKeyError> {
        let mac = HmacSha256::new_from_slice(secret)
            .map_err(|e| SessionKeyError::InvalidKey(e.to_string()))?;
        Ok(Self { mac })
    }

    /// A random key. Sessions signed with it die with the process.
    pub fn random() -> Result<Self, SessionKeyError> {
        let mut secret = [0u8; 32];
        OsRng
            .try_fill_bytes(&mut secret)
            .map_err(|e| SessionKeyError::RandomnessUnavailable(e.to_string()))?;
        Self::new(&secret)
    }

    fn seal(&self, payload: &[u8]) -> String {
        let mut mac = self.mac.clone();
        mac.update(payload);
        let tag = mac.finalize().into_bytes();
        format!(
            "{}.{}",
            Base64UrlUnpadded::encode_string(payload),
            Base64UrlUnpadded::encode_string(&tag)
        )
    }

    fn open(&self, sealed: &str) -> Option<Vec<u8>> {
        let (payload, tag) = sealed.split_once('.')?;
        let payload = Base64UrlUnpadded::decode_vec(payload).ok()?;
        let tag = Base64UrlUnpadded::decode_vec(tag).ok()?;

        let mut mac = self.mac.clone();
        mac.update(&payload);
        mac.verify_slice(&tag).ok()?;
        Some(payload)
    }
}

/// Cookie attributes that vary by deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CookieSettings {
    pub secure: bool,
    pub nonce_max_age: Duration,
    pub session_max_age: Duration,
}

/// The SIWE cookies of one request, plus whatever the handler changes.
#[derive(Debug)]
pub struct SiweCookies {
    jar: CookieJar,
    settings: CookieSettings,
    key: Arc<SessionKey>,
}

impl SiweCookies {
    pub fn from_headers(headers: &HeaderMap, settings: CookieSettings, key: Arc<SessionKey>) -> Self {
        let mut jar = CookieJar::new();
        for value in headers.get_all(COOKIE) {
            let Ok(raw) = value.to_str() else {
                continue;
            };
            for cookie in Cookie::split_parse(raw.to_owned()).flatten() {
                jar.add_original(cookie);
            }
        }

        Self { jar, settings, key }
    }

    /// Nonce of the outstanding challenge, if the client holds one.
    pub fn nonce(&self) -> Option<String> {
        self.jar
            .get(NONCE_COOKIE)
            .map(|c| c.value().to_string())
            .filter(|v| !v.is_empty())
    }

    pub fn set_nonce(&mut self, nonce: &str) {
        let cookie = self.build(NONCE_COOKIE, nonce.to_string(), self.settings.nonce_max_age);
        self.jar.add(cookie);
    }

    pub fn clear_nonce(&mut self) {
        self.clear(NONCE_COOKIE);
    }

    /// `Set-Cookie` headers for every cookie changed through this value.
    pub fn set_cookie_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for cookie in self.jar.delta() {
            match HeaderValue::from_str(&cookie.to_string()) {
                Ok(value) => {
                    headers.append(SET_COOKIE, value);
                }
                Err(e) => tracing::warn!(cookie = cookie.name(), error = %e, "Dropping unencodable cookie"),
            }
        }
        headers
    }

    fn build(&self, name: &'static str, value: String, max_age: Duration) -> Cookie<'static> {
        let max_age = i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX);
        Cookie::build((name, value))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.settings.secure)
            .max_age(cookie::time::Duration::seconds(max_age))
            .build()
    }

    fn clear(&mut self, name: &'static str) {
        let mut removal = self.build(name, String::new(), Duration::ZERO);
        removal.make_removal();
        self.jar.add(removal);
    }
}

impl SessionStore for SiweCookies {
    fn persist(&mut self, session: &Session) {
        let json = match serde_json::to_vec(session) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize session");
                return;
            }
        };
        let value = self.key.seal(&json);
        let cookie = self.build(SESSION_COOKIE, value, self.settings.session_max_age);
        self.jar.add(cookie);
    }

    fn retrieve(&self) -> Option<Session> {
        let cookie = self.jar.get(SESSION_COOKIE)?;
        if cookie.value().is_empty() {
            return None;
        }

        let Some(payload) = self.key.open(cookie.value()) else {
            tracing::debug!("Ignoring session cookie with a bad signature");
            return None;
        };
        match serde_json::from_slice(&payload) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring unreadable session cookie");
                None
            }
        }
    }

    fn invalidate(&mut self) {
        self.clear(SESSION_COOKIE);
    }
}

impl FromRequestParts<AppState> for SiweCookies {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(
            &parts.headers,
            state.cookie_settings(),
            state.session_key.clone(),
        ))
    }
}
