// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Shared Domain Models
//!
//! Types used across the chain, ownership, monitor, and ledger modules.
//! All API-visible types derive `Serialize`, `Deserialize`, and `ToSchema`
//! for automatic JSON handling and OpenAPI documentation.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// =============================================================================
// Chain
// =============================================================================

/// Supported blockchains.
///
/// Every balance row, connected wallet, and deposit monitor is scoped to
/// exactly one chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    /// Solana (Ed25519 keys, base58 addresses)
    Solana,
    /// Ethereum (secp256k1 keys, 0x-prefixed hex addresses)
    Ethereum,
}

impl Chain {
    /// The chain's native asset symbol, credited by deposit monitors.
    pub fn native_asset(&self) -> &'static str {
        match self {
            Chain::Solana => "SOL",
            Chain::Ethereum => "ETH",
        }
    }

    /// Canonical storage form of an address on this chain.
    ///
    /// Ethereum addresses are case-insensitive hex (EIP-55 checksums are a
    /// display concern), so they are lowercased. Solana base58 addresses
    /// are case-sensitive and kept as-is.
    pub fn normalize_address(&self, address: &str) -> String {
        match self {
            Chain::Solana => address.to_string(),
            Chain::Ethereum => address.to_lowercase(),
        }
    }
}

impl std::fmt::Display for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Chain::Solana => write!(f, "solana"),
            Chain::Ethereum => write!(f, "ethereum"),
        }
    }
}

impl std::str::FromStr for Chain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "solana" => Ok(Chain::Solana),
            "ethereum" => Ok(Chain::Ethereum),
            other => Err(format!("unknown chain: {other}")),
        }
    }
}

// =============================================================================
// Ledger operation direction
// =============================================================================

/// Direction of an administrative balance adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AdjustOperation {
    /// Increase available and total
    Add,
    /// Decrease available and total
    Subtract,
}
