// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Custody Core - Multi-Chain Wallet Verification and Ledger Service
//!
//! This crate provides the custody backbone of a trading platform:
//! read-only chain access, wallet ownership verification via
//! challenge-response signatures, deposit monitoring, and an append-only
//! internal ledger.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `chain` - Read-only Solana / Ethereum chain readers
//! - `ownership` - Challenge issuance and signature verification
//! - `monitor` - Deposit monitor registry and reconciliation sweep
//! - `ledger` - Balance engine with append-only entries
//! - `storage` - redb-backed persistence

pub mod api;
pub mod chain;
pub mod config;
pub mod error;
pub mod ledger;
pub mod models;
pub mod monitor;
pub mod ownership;
pub mod state;
pub mod storage;
