// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Balance Ledger
//!
//! The ledger is the single source of truth for user funds. It owns two
//! kinds of state:
//!
//! - **Balance rows**, one per `(user, asset, chain)`, holding
//!   `available`/`locked`/`total` quantities with the invariant
//!   `total == available + locked` (all non-negative).
//! - **Ledger entries**, an append-only, immutable history of every
//!   balance-affecting event, each with before/after snapshots of the
//!   available quantity.
//!
//! All mutations go through [`LedgerEngine`], which serializes concurrent
//! access per balance row. No other component writes balance state.

pub mod engine;

pub use engine::LedgerEngine;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::Chain;
use crate::storage::StoreError;

// =============================================================================
// Balance
// =============================================================================

/// A user's holdings of one asset on one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Balance {
    /// Opaque user identifier from the auth layer
    pub user_id: String,
    /// Asset symbol (e.g. "SOL", "ETH", "USDC")
    pub asset: String,
    /// Chain the asset lives on
    pub chain: Chain,
    /// Quantity free for use
    #[schema(value_type = String)]
    pub available: Decimal,
    /// Quantity held by locks (e.g. open orders)
    #[schema(value_type = String)]
    pub locked: Decimal,
    /// Always `available + locked`
    #[schema(value_type = String)]
    pub total: Decimal,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl Balance {
    /// A zeroed row, created lazily on first credit.
    pub fn empty(user_id: &str, asset: &str, chain: Chain) -> Self {
        Self {
            user_id: user_id.to_string(),
            asset: asset.to_string(),
            chain,
            available: Decimal::ZERO,
            locked: Decimal::ZERO,
            total: Decimal::ZERO,
            updated_at: Utc::now(),
        }
    }

    /// Storage key for this row: `user|asset|chain`.
    pub fn row_key(&self) -> String {
        balance_row_key(&self.user_id, &self.asset, self.chain)
    }

    /// Recompute `total` from `available + locked` and stamp the row.
    pub(crate) fn refresh(&mut self) {
        self.total = self.available + self.locked;
        self.updated_at = Utc::now();
    }
}

/// Storage key for a balance row.
pub fn balance_row_key(user_id: &str, asset: &str, chain: Chain) -> String {
    format!("{user_id}|{asset}|{chain}")
}

// =============================================================================
// Ledger Entry
// =============================================================================

/// Kind of balance-affecting event.
///
/// The entry amount is always positive; the sign of the effect on
/// `available` is implied by the type (adjustments carry their direction in
/// the before/after snapshots).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Deposit,
    Withdrawal,
    Lock,
    Unlock,
    TransferIn,
    TransferOut,
    Adjustment,
}

impl std::fmt::Display for EntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EntryType::Deposit => "deposit",
            EntryType::Withdrawal => "withdrawal",
            EntryType::Lock => "lock",
            EntryType::Unlock => "unlock",
            EntryType::TransferIn => "transfer_in",
            EntryType::TransferOut => "transfer_out",
            EntryType::Adjustment => "adjustment",
        };
        write!(f, "{s}")
    }
}

/// One append-only history record. Never mutated or deleted once written.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LedgerEntry {
    /// Unique entry identifier (UUID)
    pub entry_id: String,
    /// Owning user
    pub user_id: String,
    /// Event kind
    pub entry_type: EntryType,
    /// Asset symbol
    pub asset: String,
    /// Chain scope of the affected row
    pub chain: Chain,
    /// Magnitude of the change (always positive)
    #[schema(value_type = String)]
    pub amount: Decimal,
    /// Available quantity before the event
    #[schema(value_type = String)]
    pub balance_before: Decimal,
    /// Available quantity after the event
    #[schema(value_type = String)]
    pub balance_after: Decimal,
    /// Human-readable context
    pub description: String,
    /// Chain transaction id for deposits (idempotency key)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_id: Option<String>,
    /// Event time
    pub timestamp: DateTime<Utc>,
}

impl LedgerEntry {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn record(
        user_id: &str,
        entry_type: EntryType,
        asset: &str,
        chain: Chain,
        amount: Decimal,
        balance_before: Decimal,
        balance_after: Decimal,
        description: impl Into<String>,
        tx_id: Option<String>,
    ) -> Self {
        Self {
            entry_id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            entry_type,
            asset: asset.to_string(),
            chain,
            amount,
            balance_before,
            balance_after,
            description: description.into(),
            tx_id,
            timestamp: Utc::now(),
        }
    }
}

// =============================================================================
// History filters
// =============================================================================

/// Filters for paginated ledger history queries.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    /// Only entries for this asset
    pub asset: Option<String>,
    /// Only entries of this type
    pub entry_type: Option<EntryType>,
    /// Opaque cursor from a previous page
    pub cursor: Option<String>,
    /// Page size (clamped by the engine)
    pub limit: usize,
}

/// One page of ledger history, newest first.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HistoryPage {
    pub entries: Vec<LedgerEntry>,
    /// Present when more entries exist
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("insufficient balance: requested {requested} {asset}, available {available}")]
    InsufficientBalance {
        asset: String,
        requested: Decimal,
        available: Decimal,
    },

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

pub type LedgerResult<T> = Result<T, LedgerError>;
