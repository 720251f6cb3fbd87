// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names, default values and the
//! [`SiweConfig`] loaded from the environment at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `SIWE_DOMAIN` | Domain every signed message must carry | unchecked |
//! | `SIWE_NONCE_TTL_SECS` | Lifetime of an issued challenge | `600` |
//! | `SIWE_SESSION_TTL_SECS` | Max-Age of the session cookie | `604800` |
//! | `SIWE_COOKIE_SECURE` | Mark cookies `Secure` | `true` |
//! | `SIWE_SESSION_SECRET` | HMAC key for the session cookie (>= 32 bytes) | random per process |
//! | `SIWE_SWEEP_INTERVAL_SECS` | Expired challenge sweep interval | `60` |
//! | `TLS_CERT_PATH` | PEM certificate chain (enables HTTPS) | unset |
//! | `TLS_KEY_PATH` | PEM private key (enables HTTPS) | unset |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::{env, net::SocketAddr, path::PathBuf, time::Duration};

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const DOMAIN_ENV: &str = "SIWE_DOMAIN";
pub const NONCE_TTL_ENV: &str = "SIWE_NONCE_TTL_SECS";
pub const SESSION_TTL_ENV: &str = "SIWE_SESSION_TTL_SECS";
pub const COOKIE_SECURE_ENV: &str = "SIWE_COOKIE_SECURE";
pub const SESSION_SECRET_ENV: &str = "SIWE_SESSION_SECRET";
pub const SWEEP_INTERVAL_ENV: &str = "SIWE_SWEEP_INTERVAL_SECS";
pub const TLS_CERT_ENV: &str = "TLS_CERT_PATH";
pub const TLS_KEY_ENV: &str = "TLS_KEY_PATH";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Default challenge lifetime (10 minutes).
pub const DEFAULT_NONCE_TTL: Duration = Duration::from_secs(600);

/// Default session cookie lifetime (7 days).
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Default interval between expired-challenge sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Minimum accepted length of `SIWE_SESSION_SECRET`, in bytes.
pub const MIN_SESSION_SECRET_LEN: usize = 32;

/// Errors raised while reading configuration from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} has an invalid value {value:?}: {reason}")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("{TLS_CERT_ENV} and {TLS_KEY_ENV} must be set together")]
    IncompleteTls,
}

/// TLS material locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct SiweConfig {
    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// When set, messages for any other domain are rejected.
    pub expected_domain: Option<String>,
    /// Challenges older than this fail verification.
    pub nonce_ttl: Duration,
    /// Max-Age of the session cookie.
    pub session_ttl: Duration,
    /// Whether cookies carry the `Secure` attribute.
    pub cookie_secure: bool,
    /// HMAC key for the session cookie. `None` means a random key per process.
    pub session_secret: Option<Vec<u8>>,
    /// Interval between expired challenge sweeps.
    pub sweep_interval: Duration,
    /// Serve HTTPS with these files when present.
    pub tls: Option<TlsPaths>,
}

impl Default for SiweConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            expected_domain: None,
            nonce_ttl: DEFAULT_NONCE_TTL,
            session_ttl: DEFAULT_SESSION_TTL,
            cookie_secure: true,
            session_secret: None,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            tls: None,
        }
    }
}

impl SiweConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let host = lookup(HOST_ENV).unwrap_or_else(|| "0.0.0.0".to_string());
        let port = match lookup(PORT_ENV) {
            Some(raw) => raw.parse::<u16>().map_err(|e| invalid(PORT_ENV, &raw, e))?,
            None => 8080,
        };
        let bind_addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .map_err(|e| invalid(HOST_ENV, &host, e))?;

        let expected_domain = lookup(DOMAIN_ENV)
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        let session_secret = match lookup(SESSION_SECRET_ENV) {
            Some(secret) if secret.len() < MIN_SESSION_SECRET_LEN => {
                return Err(ConfigError::InvalidValue {
                    name: SESSION_SECRET_ENV,
                    value: "<redacted>".to_string(),
                    reason: format!("must be at least {MIN_SESSION_SECRET_LEN} bytes"),
                });
            }
            Some(secret) => Some(secret.into_bytes()),
            None => None,
        };

        let tls = match (lookup(TLS_CERT_ENV), lookup(TLS_KEY_ENV)) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: cert.into(),
                key: key.into(),
            }),
            (None, None) => None,
            _ => return Err(ConfigError::IncompleteTls),
        };

        Ok(Self {
            bind_addr,
            expected_domain,
            nonce_ttl: secs(&lookup, NONCE_TTL_ENV, defaults.nonce_ttl)?,
            session_ttl: secs(&lookup, SESSION_TTL_ENV, defaults.session_ttl)?,
            cookie_secure: flag(&lookup, COOKIE_SECURE_ENV, defaults.cookie_secure)?,
            session_secret,
            sweep_interval: secs(&lookup, SWEEP_INTERVAL_ENV, defaults.sweep_interval)?,
            tls,
        })
    }
}

fn invalid(name: &'static str, value: &str, reason: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        name,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn secs<F>(lookup: &F, name: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => {
            let value = raw.trim().parse::<u64>().map_err(|e| invalid(name, &raw, e))?;
            if value == 0 {
                return Err(invalid(name, &raw, "must be greater than zero"));
            }
            Ok(Duration::from_secs(value))
        }
        None => Ok(default),
    }
}

fn flag<F>(lookup: &F, name: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name).as_deref().map(str::trim) {
        None => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(invalid(name, other, "expected a boolean")),
    }
}
