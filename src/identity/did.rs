// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Account identifiers built from a chain id and an EVM address.

use std::str::FromStr;

use alloy::primitives::Address;

/// Normalize an address for display in identifiers.
///
/// Valid addresses come back EIP-55 checksummed. Anything else is only
/// trimmed and given a `0x` prefix. Blank input yields `None`.
pub fn normalize_address(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(address) = Address::from_str(trimmed) {
        return Some(address.to_checksum(None));
    }

    if trimmed.starts_with("0x") {
        Some(trimmed.to_string())
    } else {
        Some(format!("0x{trimmed}"))
    }
}

/// CAIP-10 account id: `eip155:<chain_id>:<address>`.
pub fn caip10_account(chain_id: u64, address: &str) -> Option<String> {
    normalize_address(address).map(|addr| format!("eip155:{chain_id}:{addr}"))
}

/// `did:pkh` identifier: `did:pkh:eip155:<chain_id>:<address>`.
pub fn did_pkh(chain_id: u64, address: &str) -> Option<String> {
    caip10_account(chain_id, address).map(|account| format!("did:pkh:{account}"))
}

/// `did:ethr` identifier: `did:ethr:<chain_id>:<address>`.
pub fn did_ethr(chain_id: u64, address: &str) -> Option<String> {
    normalize_address(address).map(|addr| format!("did:ethr:{chain_id}:{addr}"))
}
