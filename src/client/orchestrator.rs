// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Sign-In Flow
//!
//! [`ClientOrchestrator::connect`] drives one sign-in attempt:
//!
//! ```text
//! Idle -> Connecting -> Signing -> Verifying -> Success
//!              \            \           \
//!               +------------+-----------+--> Error -> (poll /me) -> Success
//! ```
//!
//! - **Connecting**: request accounts, switch to the target chain (adding it
//!   to the wallet when the wallet reports code 4902), fetch a nonce
//! - **Signing**: build the SIWE message and ask the wallet to sign it
//! - **Verifying**: submit message and signature to the server
//!
//! ## Failure recovery
//!
//! A failure does not prove the server has no session: the verify response
//! may have been lost after the cookie was set. After any failure the
//! orchestrator polls `GET /api/siwe/me` under its [`RetryPolicy`] and
//! reports success only if the server confirms a session.
//!
//! ## Cancellation
//!
//! Cancelling the token abandons the attempt at the next suspension point.
//! Results of in-flight requests are discarded, nothing is cached and the
//! state returns to [`FlowState::Idle`].

use std::future::Future;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use alloy::primitives::Address;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::api::{ApiClientError, SiweApi};
use super::wallet::{known_chain, WalletError, WalletProvider};
use crate::clock::{Clock, SystemClock};
use crate::session::{MemorySessionStore, Session, SessionManager};
use crate::siwe::{MessageError, SiweFields, SiweMessage, SIWE_VERSION};

/// Statement used when the caller does not supply one.
pub const DEFAULT_STATEMENT: &str = "Sign in to BitMail via SIWE";

/// Where the current sign-in attempt is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    Connecting,
    Signing,
    Verifying,
    Success(Session),
    Error(FlowError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlowError {
    #[error("transport error: {0}")]
    TransportError(String),

    #[error("request rejected in the wallet")]
    WalletRejected,

    #[error("could not switch to chain {chain_id}: {reason}")]
    NetworkSwitchFailed { chain_id: u64, reason: String },

    #[error("wallet returned no accounts")]
    NoAccounts,

    #[error("wallet returned an invalid account {0:?}")]
    InvalidAccount(String),

    #[error("wallet error: {0}")]
    Wallet(String),

    #[error("could not build sign-in message: {0}")]
    Message(#[from] MessageError),

    #[error("sign-in rejected by the server: {0}")]
    VerificationFailed(String),

    #[error("sign-in cancelled")]
    Cancelled,
}

impl FlowError {
    /// Text suitable for showing to the person signing in.
    pub fn user_message(&self) -> &'static str {
        match self {
            FlowError::TransportError(_) => "Could not reach the server. Check your connection and try again.",
            FlowError::WalletRejected => "The request was rejected in your wallet.",
            FlowError::NetworkSwitchFailed { .. } => "Please switch your wallet to the required network.",
            FlowError::NoAccounts => "No account is available in your wallet.",
            FlowError::InvalidAccount(_) | FlowError::Wallet(_) => "Your wallet returned an unexpected response.",
            FlowError::Message(_) => "Could not prepare the sign-in message.",
            FlowError::VerificationFailed(_) => "Sign-in could not be verified. Please try again.",
            FlowError::Cancelled => "Sign-in was cancelled.",
        }
    }
}

impl From<WalletError> for FlowError {
    fn from(err: WalletError) -> Self {
        match err {
            WalletError::Rejected => FlowError::WalletRejected,
            other => FlowError::Wallet(other.to_string()),
        }
    }
}

/// Any answered request the server refused, nonce or verify, is a
/// verification failure. Everything else is transport.
impl From<ApiClientError> for FlowError {
    fn from(err: ApiClientError) -> Self {
        match err {
            ApiClientError::Rejected { message, .. } => FlowError::VerificationFailed(message),
            other => FlowError::TransportError(other.to_string()),
        }
    }
}

/// Bounded polling of the session endpoint after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 12,
            interval: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// Never poll.
    pub fn none() -> Self {
        Self {
            max_attempts: 0,
            interval: Duration::ZERO,
        }
    }
}

/// What to sign in to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    /// RFC 3986 authority of the site requesting the sign-in.
    pub domain: String,
    pub uri: String,
    pub statement: Option<String>,
    /// Switch the wallet to this chain first. `None` signs on whatever chain
    /// the wallet is on.
    pub target_chain_id: Option<u64>,
}

impl ConnectRequest {
    pub fn new(domain: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            uri: uri.into(),
            statement: Some(DEFAULT_STATEMENT.to_string()),
            target_chain_id: None,
        }
    }

    pub fn with_chain(mut self, chain_id: u64) -> Self {
        self.target_chain_id = Some(chain_id);
        self
    }
}

/// Client half of the SIWE protocol.
///
/// Holds a non-authoritative copy of the session; the server always wins.
pub struct ClientOrchestrator<W, A> {
    wallet: W,
    api: A,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    state: watch::Sender<FlowState>,
    cache: Mutex<SessionManager<MemorySessionStore>>,
}

impl<W: WalletProvider, A: SiweApi> ClientOrchestrator<W, A> {
    pub fn new(wallet: W, api: A) -> Self {
        let (state, _) = watch::channel(FlowState::Idle);
        Self {
            wallet,
            api,
            clock: Arc::new(SystemClock),
            retry: RetryPolicy::default(),
            state,
            cache: Mutex::new(SessionManager::new(MemorySessionStore::new())),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<FlowState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> FlowState {
        self.state.borrow().clone()
    }

    /// Locally cached session, without asking the server.
    pub fn cached_session(&self) -> Option<Session> {
        self.with_cache(|cache| cache.retrieve())
    }

    /// Run one sign-in attempt.
    pub async fn connect(
        &self,
        request: &ConnectRequest,
        cancel: &CancellationToken,
    ) -> Result<Session, FlowError> {
        let err = match self.sign_in(request, cancel).await {
            Ok(session) => return Ok(self.succeed(session)),
            Err(FlowError::Cancelled) => return Err(self.abandon()),
            Err(err) => err,
        };

        warn!(error = %err, "SIWE sign-in failed; checking for a server session");
        self.state.send_replace(FlowState::Error(err.clone()));

        match self.poll_for_session(cancel).await {
            Ok(Some(session)) => {
                info!(address = %session.address, "Recovered server session after failure");
                Ok(self.succeed(session))
            }
            Ok(None) => Err(err),
            Err(_) => Err(self.abandon()),
        }
    }

    /// The current session. Asks the server first and falls back to the
    /// cached copy only when the server cannot be reached.
    pub async fn current_session(&self) -> Option<Session> {
        match self.api.me().await {
            Ok(Some(session)) => {
                self.with_cache(|cache| cache.persist(&session));
                Some(session)
            }
            Ok(None) => {
                self.with_cache(|cache| cache.invalidate());
                None
            }
            Err(e) => {
                debug!(error = %e, "Session check failed; using cached session");
                self.cached_session()
            }
        }
    }

    /// Sign out locally, on the server and, if supported, in the wallet.
    pub async fn disconnect(&self) {
        self.with_cache(|cache| cache.invalidate());
        self.state.send_replace(FlowState::Idle);

        if let Err(e) = self.api.logout().await {
            warn!(error = %e, "Server logout failed");
        }
        if let Err(e) = self.wallet.revoke_permissions().await {
            debug!(error = %e, "Wallet permission revoke failed");
        }
    }

    async fn sign_in(
        &self,
        request: &ConnectRequest,
        cancel: &CancellationToken,
    ) -> Result<Session, FlowError> {
        self.state.send_replace(FlowState::Connecting);

        let accounts = interruptible(cancel, self.wallet.request_accounts()).await??;
        let account = accounts.first().ok_or(FlowError::NoAccounts)?;
        let address = Address::from_str(account.trim())
            .map_err(|_| FlowError::InvalidAccount(account.clone()))?
            .to_checksum(None);

        let chain_id = match request.target_chain_id {
            Some(target) => self.ensure_chain(target, cancel).await?,
            None => interruptible(cancel, self.wallet.chain_id()).await??,
        };

        let nonce = interruptible(cancel, self.api.fetch_nonce()).await??;

        self.state.send_replace(FlowState::Signing);
        let message = SiweMessage::build(SiweFields {
            domain: Some(request.domain.clone()),
            address: Some(address.clone()),
            statement: request.statement.clone(),
            uri: Some(request.uri.clone()),
            version: Some(SIWE_VERSION.to_string()),
            chain_id: Some(chain_id),
            nonce: Some(nonce),
            issued_at: Some(self.clock.now()),
            ..Default::default()
        })?
        .to_string();

        let signature =
            interruptible(cancel, self.wallet.request_signature(&address, &message)).await??;

        self.state.send_replace(FlowState::Verifying);
        let session = interruptible(cancel, self.api.verify(&message, &signature)).await??;

        Ok(session)
    }

    /// Switches the wallet to `target` and returns the chain the wallet
    /// reports afterwards. Only an acknowledged switch that actually landed
    /// on `target` counts.
    async fn ensure_chain(&self, target: u64, cancel: &CancellationToken) -> Result<u64, FlowError> {
        let current = interruptible(cancel, self.wallet.chain_id()).await??;
        if current == target {
            return Ok(current);
        }

        let switch_failed = |reason: String| FlowError::NetworkSwitchFailed {
            chain_id: target,
            reason,
        };

        match interruptible(cancel, self.wallet.switch_network(target)).await? {
            Ok(()) => return self.confirm_chain(target, cancel).await,
            Err(WalletError::Rejected) => return Err(FlowError::WalletRejected),
            Err(WalletError::UnrecognizedChain(_)) => {}
            Err(e) => return Err(switch_failed(e.to_string())),
        }

        let params = known_chain(target)
            .ok_or_else(|| switch_failed("chain unknown to wallet and app".to_string()))?;
        debug!(chain_id = target, "Adding chain to wallet");

        match interruptible(cancel, self.wallet.add_network(&params)).await? {
            Ok(()) => {}
            Err(WalletError::Rejected) => return Err(FlowError::WalletRejected),
            Err(e) => return Err(switch_failed(e.to_string())),
        }
        match interruptible(cancel, self.wallet.switch_network(target)).await? {
            Ok(()) => self.confirm_chain(target, cancel).await,
            Err(WalletError::Rejected) => Err(FlowError::WalletRejected),
            Err(e) => Err(switch_failed(e.to_string())),
        }
    }

    async fn confirm_chain(&self, target: u64, cancel: &CancellationToken) -> Result<u64, FlowError> {
        let landed = interruptible(cancel, self.wallet.chain_id()).await??;
        if landed != target {
            return Err(FlowError::NetworkSwitchFailed {
                chain_id: target,
                reason: format!("wallet still on chain {landed}"),
            });
        }
        Ok(landed)
    }

    /// `Ok(None)` when the policy is exhausted, `Err` when cancelled.
    async fn poll_for_session(&self, cancel: &CancellationToken) -> Result<Option<Session>, FlowError> {
        for attempt in 1..=self.retry.max_attempts {
            interruptible(cancel, tokio::time::sleep(self.retry.interval)).await?;

            match interruptible(cancel, self.api.me()).await? {
                Ok(Some(session)) => return Ok(Some(session)),
                Ok(None) => {}
                Err(e) => debug!(attempt, error = %e, "Session poll failed"),
            }
        }
        Ok(None)
    }

    fn succeed(&self, session: Session) -> Session {
        self.with_cache(|cache| cache.persist(&session));
        self.state.send_replace(FlowState::Success(session.clone()));
        session
    }

    fn abandon(&self) -> FlowError {
        debug!("SIWE sign-in cancelled");
        self.state.send_replace(FlowState::Idle);
        FlowError::Cancelled
    }

    fn with_cache<T>(&self, f: impl FnOnce(&mut SessionManager<MemorySessionStore>) -> T) -> T {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut cache)
    }
}

/// Await `fut` unless `cancel` fires first. A result that arrives after
/// cancellation is discarded.
async fn interruptible<F: Future>(cancel: &CancellationToken, fut: F) -> Result<F::Output, FlowError> {
    let output = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(FlowError::Cancelled),
        output = fut => output,
    };
    if cancel.is_cancelled() {
        return Err(FlowError::Cancelled);
    }
    Ok(output)
}
