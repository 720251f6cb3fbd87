// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! EIP-4361 message text.
//!
//! The text form is the only thing a wallet signs, so building and parsing are
//! strict inverses: [`SiweMessage::parse`] rejects anything that would not
//! re-serialize to the exact same bytes.
//!
//! ```text
//! {domain} wants you to sign in with your Ethereum account:
//! {address}
//!
//! {statement}
//!
//! URI: {uri}
//! Version: 1
//! Chain ID: {chain_id}
//! Nonce: {nonce}
//! Issued At: {issued_at}
//! Expiration Time: {expiration_time}   (optional)
//! Not Before: {not_before}             (optional)
//! Request ID: {request_id}             (optional)
//! Resources:                           (optional)
//! - {resource}
//! ```
//!
//! Without a statement the address is followed by two blank lines.

use std::fmt;
use std::str::FromStr;

use alloy::primitives::Address;
use chrono::{DateTime, SecondsFormat, Utc};

const HEADER_SUFFIX: &str = " wants you to sign in with your Ethereum account:";
const URI_TAG: &str = "URI: ";
const VERSION_TAG: &str = "Version: ";
const CHAIN_ID_TAG: &str = "Chain ID: ";
const NONCE_TAG: &str = "Nonce: ";
const ISSUED_AT_TAG: &str = "Issued At: ";
const EXPIRATION_TAG: &str = "Expiration Time: ";
const NOT_BEFORE_TAG: &str = "Not Before: ";
const REQUEST_ID_TAG: &str = "Request ID: ";
const RESOURCES_TAG: &str = "Resources:";
const RESOURCE_ITEM: &str = "- ";

/// The only message version defined by EIP-4361.
pub const SIWE_VERSION: &str = "1";

/// Shortest nonce EIP-4361 accepts.
pub const MIN_NONCE_LEN: usize = 8;

/// Errors produced while building or parsing a message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("malformed message: {0}")]
    MalformedMessage(String),
}

fn malformed(reason: impl Into<String>) -> MessageError {
    MessageError::MalformedMessage(reason.into())
}

/// Structured input for [`SiweMessage::build`].
///
/// `address` may be in any case; it is checksummed before inclusion.
/// A missing `issued_at` means "now".
#[derive(Debug, Clone, Default)]
pub struct SiweFields {
    pub domain: Option<String>,
    pub address: Option<String>,
    pub statement: Option<String>,
    pub uri: Option<String>,
    pub version: Option<String>,
    pub chain_id: Option<u64>,
    pub nonce: Option<String>,
    pub issued_at: Option<DateTime<Utc>>,
    pub expiration_time: Option<DateTime<Utc>>,
    pub not_before: Option<DateTime<Utc>>,
    pub request_id: Option<String>,
    pub resources: Vec<String>,
}

/// A validated EIP-4361 message.
///
/// Timestamps keep their exact signed text; use the `*_time` accessors for
/// the parsed values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiweMessage {
    pub domain: String,
    pub address: Address,
    pub statement: Option<String>,
    pub uri: String,
    pub version: String,
    pub chain_id: u64,
    pub nonce: String,
    pub issued_at: String,
    pub expiration_time: Option<String>,
    pub not_before: Option<String>,
    pub request_id: Option<String>,
    pub resources: Vec<String>,
}

impl SiweMessage {
    /// Build a message from structured fields.
    pub fn build(fields: SiweFields) -> Result<Self, MessageError> {
        let domain = fields.domain.ok_or(MessageError::MissingField("domain"))?;
        let raw_address = fields.address.ok_or(MessageError::MissingField("address"))?;
        let uri = fields.uri.ok_or(MessageError::MissingField("uri"))?;
        let version = fields.version.ok_or(MessageError::MissingField("version"))?;
        let chain_id = fields.chain_id.ok_or(MessageError::MissingField("chainId"))?;
        let nonce = fields.nonce.ok_or(MessageError::MissingField("nonce"))?;

        let address = Address::from_str(raw_address.trim())
            .map_err(|e| malformed(format!("invalid address: {e}")))?;

        let message = Self {
            domain,
            address,
            statement: fields.statement,
            uri,
            version,
            chain_id,
            nonce,
            issued_at: format_time(fields.issued_at.unwrap_or_else(Utc::now)),
            expiration_time: fields.expiration_time.map(format_time),
            not_before: fields.not_before.map(format_time),
            request_id: fields.request_id,
            resources: fields.resources,
        };
        message.validate()?;
        Ok(message)
    }

    /// Parse signed text, accepting only the canonical form.
    pub fn parse(text: &str) -> Result<Self, MessageError> {
        let mut lines = text.split('\n').peekable();

        let header = lines.next().ok_or_else(|| malformed("empty message"))?;
        let domain = header
            .strip_suffix(HEADER_SUFFIX)
            .ok_or_else(|| malformed("invalid header line"))?
            .to_string();

        let address_line = lines.next().ok_or(MessageError::MissingField("address"))?;
        let address = Address::parse_checksummed(address_line, None)
            .map_err(|_| malformed("address is not a valid EIP-55 checksummed address"))?;

        expect_blank(lines.next())?;
        let statement = match lines.next() {
            Some("") => None,
            Some(line) => {
                expect_blank(lines.next())?;
                Some(line.to_string())
            }
            None => return Err(MessageError::MissingField("uri")),
        };

        let uri = tagged(lines.next(), URI_TAG, "uri")?;
        let version = tagged(lines.next(), VERSION_TAG, "version")?;
        let chain_id = tagged(lines.next(), CHAIN_ID_TAG, "chainId")?
            .parse::<u64>()
            .map_err(|_| malformed("chain id is not an unsigned integer"))?;
        let nonce = tagged(lines.next(), NONCE_TAG, "nonce")?;
        let issued_at = tagged(lines.next(), ISSUED_AT_TAG, "issuedAt")?;

        let mut optional = |tag: &str| -> Option<String> {
            let value = lines.peek()?.strip_prefix(tag)?.to_string();
            lines.next();
            Some(value)
        };
        let expiration_time = optional(EXPIRATION_TAG);
        let not_before = optional(NOT_BEFORE_TAG);
        let request_id = optional(REQUEST_ID_TAG);

        let mut resources = Vec::new();
        if lines.peek() == Some(&RESOURCES_TAG) {
            lines.next();
            while let Some(item) = lines
                .peek()
                .and_then(|l| l.strip_prefix(RESOURCE_ITEM))
                .map(str::to_string)
            {
                resources.push(item);
                lines.next();
            }
        }

        if let Some(extra) = lines.next() {
            return Err(malformed(format!("unexpected line {extra:?}")));
        }

        let message = Self {
            domain,
            address,
            statement,
            uri,
            version,
            chain_id,
            nonce,
            issued_at,
            expiration_time,
            not_before,
            request_id,
            resources,
        };
        message.validate()?;

        if message.to_string() != text {
            return Err(malformed("message is not in canonical form"));
        }

        Ok(message)
    }

    /// EIP-55 checksummed address as it appears in the text.
    pub fn checksum_address(&self) -> String {
        self.address.to_checksum(None)
    }

    pub fn issued_at_time(&self) -> Result<DateTime<Utc>, MessageError> {
        parse_time("issuedAt", &self.issued_at)
    }

    pub fn expiration_time(&self) -> Result<Option<DateTime<Utc>>, MessageError> {
        self.expiration_time
            .as_deref()
            .map(|raw| parse_time("expirationTime", raw))
            .transpose()
    }

    pub fn not_before_time(&self) -> Result<Option<DateTime<Utc>>, MessageError> {
        self.not_before
            .as_deref()
            .map(|raw| parse_time("notBefore", raw))
            .transpose()
    }

    fn validate(&self) -> Result<(), MessageError> {
        if self.domain.is_empty() {
            return Err(MessageError::MissingField("domain"));
        }
        if self.domain.chars().any(char::is_whitespace) {
            return Err(malformed("domain must not contain whitespace"));
        }
        if let Some(statement) = &self.statement {
            if statement.is_empty() || statement.contains('\n') || statement.contains('\r') {
                return Err(malformed("statement must be a single non-empty line"));
            }
        }
        check_uri("uri", &self.uri)?;
        if self.version != SIWE_VERSION {
            return Err(malformed(format!("unsupported version {:?}", self.version)));
        }
        if self.nonce.len() < MIN_NONCE_LEN || !self.nonce.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(malformed(format!(
                "nonce must be at least {MIN_NONCE_LEN} alphanumeric characters"
            )));
        }
        self.issued_at_time()?;
        self.expiration_time()?;
        self.not_before_time()?;
        if let Some(request_id) = &self.request_id {
            if request_id.contains('\n') || request_id.contains('\r') {
                return Err(malformed("request id must be a single line"));
            }
        }
        for resource in &self.resources {
            check_uri("resources", resource)?;
        }
        Ok(())
    }
}

impl fmt::Display for SiweMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}{HEADER_SUFFIX}", self.domain)?;
        writeln!(f, "{}\n", self.checksum_address())?;
        match &self.statement {
            Some(statement) => writeln!(f, "{statement}\n")?,
            None => writeln!(f)?,
        }
        writeln!(f, "{URI_TAG}{}", self.uri)?;
        writeln!(f, "{VERSION_TAG}{}", self.version)?;
        writeln!(f, "{CHAIN_ID_TAG}{}", self.chain_id)?;
        writeln!(f, "{NONCE_TAG}{}", self.nonce)?;
        write!(f, "{ISSUED_AT_TAG}{}", self.issued_at)?;
        if let Some(expiration_time) = &self.expiration_time {
            write!(f, "\n{EXPIRATION_TAG}{expiration_time}")?;
        }
        if let Some(not_before) = &self.not_before {
            write!(f, "\n{NOT_BEFORE_TAG}{not_before}")?;
        }
        if let Some(request_id) = &self.request_id {
            write!(f, "\n{REQUEST_ID_TAG}{request_id}")?;
        }
        if !self.resources.is_empty() {
            write!(f, "\n{RESOURCES_TAG}")?;
            for resource in &self.resources {
                write!(f, "\n{RESOURCE_ITEM}{resource}")?;
            }
        }
        Ok(())
    }
}

impl FromStr for SiweMessage {
    type Err = MessageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Render a timestamp the way browsers do (`toISOString`).
pub fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_time(field: &'static str, raw: &str) -> Result<DateTime<Utc>, MessageError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| malformed(format!("{field} is not an RFC 3339 timestamp: {e}")))
}

fn check_uri(field: &'static str, raw: &str) -> Result<(), MessageError> {
    url::Url::parse(raw)
        .map(|_| ())
        .map_err(|e| malformed(format!("{field} is not a valid URI: {e}")))
}

fn expect_blank(line: Option<&str>) -> Result<(), MessageError> {
    match line {
        Some("") => Ok(()),
        Some(other) => Err(malformed(format!("expected blank line, found {other:?}"))),
        None => Err(malformed("message ended early")),
    }
}

fn tagged(line: Option<&str>, tag: &str, field: &'static str) -> Result<String, MessageError> {
    let line = line.ok_or(MessageError::MissingField(field))?;
    line.strip_prefix(tag)
        .map(str::to_string)
        .ok_or_else(|| malformed(format!("expected {tag:?} line, found {line:?}")))
}
