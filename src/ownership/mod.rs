// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Wallet Ownership Verification
//!
//! Challenge-response proof that a user controls an external wallet
//! address before any funds tied to it are trusted:
//!
//! 1. The user requests a challenge for an address. The server issues a
//!    human-readable message with a random nonce, valid for five minutes,
//!    one live challenge per address.
//! 2. The user signs the message off-core with the wallet's key.
//! 3. The server verifies the signature with real chain-specific
//!    cryptography (EIP-191 recovery for Ethereum, Ed25519 for Solana)
//!    and records a [`ConnectedWallet`]. An address can be claimed by at
//!    most one user at a time.
//!
//! Challenges are single-use: a successful verification consumes the
//! challenge; a failed one leaves it in place for retry within the window.

pub mod challenge;
pub mod verifier;

pub use challenge::{Challenge, ChallengeStore, CHALLENGE_TTL};
pub use verifier::OwnershipVerifier;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::Chain;
use crate::storage::StoreError;

/// A wallet address whose ownership has been proven by signature.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConnectedWallet {
    /// Owning user
    pub user_id: String,
    /// On-chain address (normalized per chain)
    pub address: String,
    /// Chain the address lives on
    pub chain: Chain,
    /// Always true for persisted wallets; kept for API compatibility
    pub verified: bool,
    /// The signature that proved ownership
    pub signature: String,
    /// When the proof was accepted
    pub connected_at: DateTime<Utc>,
}

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("no live challenge for address {0}")]
    ChallengeExpired(String),

    #[error("signature verification failed")]
    SignatureInvalid,

    #[error("address is already claimed by another user")]
    AddressAlreadyClaimed,

    #[error("connected wallet not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

pub type VerifyResult<T> = Result<T, VerifyError>;
