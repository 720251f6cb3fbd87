// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HTTP access to the SIWE endpoints.
//!
//! [`HttpSiweApi`] keeps a cookie store, so the nonce cookie set by
//! `GET /api/siwe/nonce` travels with the following verify call exactly as it
//! would in a browser.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Deserialize};
use url::Url;

use crate::models::{MeResponse, NonceResponse, VerifyRequest, VerifyResponse};
use crate::session::Session;

/// Default timeout for SIWE API requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiClientError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("server returned {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// The four SIWE endpoints, as seen by a client.
#[async_trait]
pub trait SiweApi: Send + Sync {
    async fn fetch_nonce(&self) -> Result<String, ApiClientError>;

    async fn verify(&self, message: &str, signature: &str) -> Result<Session, ApiClientError>;

    /// `Ok(None)` when the server reports no session.
    async fn me(&self) -> Result<Option<Session>, ApiClientError>;

    async fn logout(&self) -> Result<(), ApiClientError>;
}

#[async_trait]
impl<T: SiweApi + ?Sized> SiweApi for std::sync::Arc<T> {
    async fn fetch_nonce(&self) -> Result<String, ApiClientError> {
        (**self).fetch_nonce().await
    }

    async fn verify(&self, message: &str, signature: &str) -> Result<Session, ApiClientError> {
        (**self).verify(message, signature).await
    }

    async fn me(&self) -> Result<Option<Session>, ApiClientError> {
        (**self).me().await
    }

    async fn logout(&self) -> Result<(), ApiClientError> {
        (**self).logout().await
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// [`SiweApi`] over HTTP with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpSiweApi {
    base: Url,
    client: Client,
}

impl HttpSiweApi {
    /// `base_url` is the origin serving `/api/siwe/*`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiClientError> {
        let mut base = Url::parse(base_url)
            .map_err(|e| ApiClientError::Transport(format!("invalid base URL {base_url:?}: {e}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = Client::builder()
            .cookie_store(true)
            .timeout(timeout)
            .build()
            .map_err(|e| ApiClientError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { base, client })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiClientError> {
        self.base
            .join(path)
            .map_err(|e| ApiClientError::Transport(format!("invalid endpoint {path}: {e}")))
    }

    async fn read<T: DeserializeOwned>(path: &str, response: Response) -> Result<T, ApiClientError> {
        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<ErrorBody>().await {
                Ok(body) => body.error,
                Err(_) => status.canonical_reason().unwrap_or("error").to_string(),
            };
            return Err(ApiClientError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| ApiClientError::InvalidResponse(format!("{path}: {e}")))
    }
}

fn transport(path: &str, e: reqwest::Error) -> ApiClientError {
    ApiClientError::Transport(format!("{path} failed: {e}"))
}

#[async_trait]
impl SiweApi for HttpSiweApi {
    async fn fetch_nonce(&self) -> Result<String, ApiClientError> {
        const PATH: &str = "api/siwe/nonce";
        let response = self
            .client
            .get(self.endpoint(PATH)?)
            .send()
            .await
            .map_err(|e| transport(PATH, e))?;
        let body: NonceResponse = Self::read(PATH, response).await?;
        Ok(body.nonce)
    }

    async fn verify(&self, message: &str, signature: &str) -> Result<Session, ApiClientError> {
        const PATH: &str = "api/siwe/verify";
        let request = VerifyRequest {
            message: message.to_string(),
            signature: signature.to_string(),
        };
        let response = self
            .client
            .post(self.endpoint(PATH)?)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport(PATH, e))?;
        let body: VerifyResponse = Self::read(PATH, response).await?;
        if !body.ok {
            return Err(ApiClientError::InvalidResponse(format!("{PATH}: ok=false on success status")));
        }
        Ok(body.session)
    }

    async fn me(&self) -> Result<Option<Session>, ApiClientError> {
        const PATH: &str = "api/siwe/me";
        let response = self
            .client
            .get(self.endpoint(PATH)?)
            .send()
            .await
            .map_err(|e| transport(PATH, e))?;
        let body: MeResponse = Self::read(PATH, response).await?;
        Ok(body.into_session())
    }

    async fn logout(&self) -> Result<(), ApiClientError> {
        const PATH: &str = "api/siwe/logout";
        let response = self
            .client
            .post(self.endpoint(PATH)?)
            .send()
            .await
            .map_err(|e| transport(PATH, e))?;
        let _: serde_json::Value = Self::read(PATH, response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use alloy::signers::{local::PrivateKeySigner, SignerSync};

    use crate::api::router;
    use crate::config::SiweConfig;
    use crate::siwe::{SiweFields, SiweMessage};
    use crate::state::AppState;

    /// Serve the real router on an ephemeral port.
    async fn serve() -> String {
        let config = SiweConfig {
            cookie_secure: false,
            session_secret: Some(b"http-client-test-secret-0123456789".to_vec()),
            ..SiweConfig::default()
        };
        let state = AppState::new(
            config,
            Arc::new(crate::siwe::InMemoryChallengeStore::new()),
            Arc::new(crate::clock::SystemClock),
        )
        .unwrap();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn sign_in_message(signer: &PrivateKeySigner, nonce: &str) -> (String, String) {
        let message = SiweMessage::build(SiweFields {
            domain: Some("localhost".into()),
            address: Some(signer.address().to_string()),
            uri: Some("http://localhost".into()),
            version: Some("1".into()),
            chain_id: Some(1),
            nonce: Some(nonce.into()),
            ..Default::default()
        })
        .unwrap()
        .to_string();
        let signature = signer.sign_message_sync(message.as_bytes()).unwrap();
        (message, alloy::hex::encode_prefixed(signature.as_bytes()))
    }

    #[test]
    fn base_url_gets_trailing_slash() {
        let api = HttpSiweApi::new("https://mail.example.com/app", DEFAULT_REQUEST_TIMEOUT).unwrap();
        assert_eq!(
            api.endpoint("api/siwe/me").unwrap().as_str(),
            "https://mail.example.com/app/api/siwe/me"
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        assert!(matches!(
            HttpSiweApi::new("not a url", DEFAULT_REQUEST_TIMEOUT),
            Err(ApiClientError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn full_sign_in_over_http() {
        let base = serve().await;
        let api = HttpSiweApi::new(&base, DEFAULT_REQUEST_TIMEOUT).unwrap();
        let signer = PrivateKeySigner::random();

        assert_eq!(api.me().await.unwrap(), None);

        let nonce = api.fetch_nonce().await.unwrap();
        let (message, signature) = sign_in_message(&signer, &nonce);
        let session = api.verify(&message, &signature).await.unwrap();
        assert_eq!(session.address, signer.address().to_checksum(None));

        assert_eq!(api.me().await.unwrap(), Some(session));

        api.logout().await.unwrap();
        assert_eq!(api.me().await.unwrap(), None);
    }

    #[tokio::test]
    async fn rejections_carry_server_message() {
        let base = serve().await;
        let api = HttpSiweApi::new(&base, DEFAULT_REQUEST_TIMEOUT).unwrap();

        let err = api.verify("hello", "0x00").await.unwrap_err();
        assert_eq!(
            err,
            ApiClientError::Rejected {
                status: 400,
                message: "Missing nonce".into()
            }
        );
    }

    #[tokio::test]
    async fn unreachable_server_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let api = HttpSiweApi::new(&format!("http://{addr}"), Duration::from_secs(2)).unwrap();
        assert!(matches!(api.fetch_nonce().await, Err(ApiClientError::Transport(_))));
    }
}
