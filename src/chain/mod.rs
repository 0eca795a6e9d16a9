// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Chain Readers
//!
//! Read-only access to chain state behind the [`ChainReader`] trait, so
//! the deposit monitor registry (and its tests) can treat Solana and
//! Ethereum uniformly and substitute doubles.
//!
//! Readers never mutate chain state. Every call is bounded by a 10-second
//! timeout and any failure — network, RPC, timeout — surfaces as
//! [`ChainError::Unavailable`], which callers treat as transient and retry
//! on the next poll tick.

pub mod ethereum;
pub mod solana;

pub use ethereum::EthereumReader;
pub use solana::SolanaReader;

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::models::Chain;

/// Upper bound for any single chain query.
pub const CHAIN_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Types
// =============================================================================

/// Chain-native assurance that a transaction will not be reverted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationState {
    /// Seen but not yet safe to credit
    Pending,
    /// Confirmed (Solana `confirmed`)
    Confirmed,
    /// Finalized (Solana `finalized`; Ethereum success at full depth)
    Finalized,
}

impl ConfirmationState {
    /// Terminal-positive: safe to convert into an internal credit.
    pub fn credits(&self) -> bool {
        matches!(self, ConfirmationState::Confirmed | ConfirmationState::Finalized)
    }
}

/// An inbound transfer observed on chain.
#[derive(Debug, Clone)]
pub struct InboundTransfer {
    /// Chain transaction identifier (globally unique per chain)
    pub tx_id: String,
    /// Transferred amount in whole-coin units
    pub amount: Decimal,
    /// Assurance level at observation time
    pub confirmation: ConfirmationState,
}

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// Transient: endpoint unreachable, RPC failure, or timeout.
    #[error("chain unavailable: {0}")]
    Unavailable(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

// =============================================================================
// ChainReader
// =============================================================================

/// Read-only boundary to one blockchain.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Which chain this reader serves.
    fn chain(&self) -> Chain;

    /// Native balance of an address, in whole-coin units.
    async fn get_balance(&self, address: &str) -> Result<Decimal, ChainError>;

    /// Recent inbound transfers to an address, at most `limit`.
    async fn recent_inbound_transfers(
        &self,
        address: &str,
        limit: usize,
    ) -> Result<Vec<InboundTransfer>, ChainError>;
}

// =============================================================================
// Helpers
// =============================================================================

/// Convert an integer quantity of base units (lamports, wei) into a
/// whole-coin decimal. Returns `None` when the value exceeds the decimal
/// mantissa range.
pub(crate) fn base_units_to_decimal(raw: u128, scale: u32) -> Option<Decimal> {
    let mantissa = i128::try_from(raw).ok()?;
    Decimal::try_from_i128_with_scale(mantissa, scale).ok()
}

/// Bound a chain query by [`CHAIN_TIMEOUT`].
pub(crate) async fn with_timeout<T, F>(fut: F) -> Result<T, ChainError>
where
    F: std::future::Future<Output = Result<T, ChainError>>,
{
    match tokio::time::timeout(CHAIN_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(ChainError::Unavailable("request timed out".to_string())),
    }
}
