// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Deposit Monitor Registry
//!
//! Watches deposit addresses for inbound transfers and converts confirmed
//! ones into ledger credits. A single background sweep services every
//! active monitor; monitors are persisted so a restart resumes watching
//! where it left off.
//!
//! ## Lifecycle
//!
//! `pending` → `confirmed` on the first credit-worthy inbound transfer,
//! or `pending` → `failed` when the monitor outlives its retention window
//! without one. Both transitions are terminal and destroy the monitor,
//! in memory and in the durable mirror. An expired watch is deliberate
//! data loss of the *watch*, not of funds: a late deposit is simply not
//! auto-credited and needs manual reconciliation.

pub mod registry;

pub use registry::MonitorRegistry;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::Chain;
use crate::storage::StoreError;

// =============================================================================
// Types
// =============================================================================

/// Lifecycle state of a deposit monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MonitorStatus {
    /// Watching; no credit-worthy transfer seen yet
    Pending,
    /// A confirmed inbound transfer was credited (terminal)
    Confirmed,
    /// Expired without a confirmed transfer (terminal)
    Failed,
}

impl std::fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorStatus::Pending => write!(f, "pending"),
            MonitorStatus::Confirmed => write!(f, "confirmed"),
            MonitorStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A registered watch on one deposit address.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DepositMonitor {
    /// Registry-assigned identifier
    pub monitor_id: Uuid,
    /// User to credit when a deposit lands
    pub user_id: String,
    /// Watched address
    pub address: String,
    /// Chain the address lives on
    pub chain: Chain,
    /// Advisory expected amount; mismatches are logged, never rejected
    #[schema(value_type = Option<String>)]
    pub expected_amount: Option<Decimal>,
    /// Credit-worthy transfers observed so far
    pub confirmations: u32,
    pub status: MonitorStatus,
    pub created_at: DateTime<Utc>,
    /// Past this instant a still-pending monitor fails and is purged
    pub expires_at: DateTime<Utc>,
}

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// No chain reader is configured for the requested chain.
    #[error("no reader configured for chain: {0}")]
    UnsupportedChain(Chain),

    #[error("monitor not found: {0}")]
    NotFound(Uuid),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

pub type MonitorResult<T> = Result<T, MonitorError>;
