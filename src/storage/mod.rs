// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Durable Storage Module
//!
//! Embedded ACID storage backed by redb (pure Rust). Each component owns
//! its own database file so ownership boundaries stay explicit:
//!
//! ```text
//! $DATA_DIR/
//!   ledger.redb    # balances, ledger entries, processed deposit tx ids
//!   wallets.redb   # connected (ownership-verified) wallets
//!   monitors.redb  # deposit monitor mirror (pending only, 1 h retention)
//! ```
//!
//! The ledger database is written only by the `LedgerEngine`; the monitor
//! mirror only by the `MonitorRegistry`; the wallet table only by the
//! `OwnershipVerifier`.

pub mod ledger_db;
pub mod monitor_db;
pub mod wallet_db;

pub use ledger_db::LedgerDb;
pub use monitor_db::MonitorDb;
pub use wallet_db::WalletDb;

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// Composite Index Key Helpers
// =============================================================================

/// Build a composite key for time-ordered per-owner range scans.
///
/// Format: `owner | inverted_timestamp_ms_be | id`
///
/// The inverted timestamp ensures newest-first ordering when scanning
/// forward through the key range.
pub(crate) fn make_index_key(owner: &str, timestamp_ms: i64, id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(owner.len() + 1 + 8 + 1 + id.len());
    key.extend_from_slice(owner.as_bytes());
    key.push(b'|');
    key.extend_from_slice(&(!timestamp_ms as u64).to_be_bytes());
    key.push(b'|');
    key.extend_from_slice(id.as_bytes());
    key
}

/// Build a prefix key for range scanning all records of an owner.
pub(crate) fn make_prefix(owner: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(owner.len() + 1);
    prefix.extend_from_slice(owner.as_bytes());
    prefix.push(b'|');
    prefix
}

/// Build the upper bound for a range scan (prefix with 0xFF bytes appended).
pub(crate) fn make_prefix_end(owner: &str) -> Vec<u8> {
    let mut end = Vec::with_capacity(owner.len() + 1 + 20);
    end.extend_from_slice(owner.as_bytes());
    end.push(b'|');
    end.extend_from_slice(&[0xFF; 20]);
    end
}

// =============================================================================
// Cursor Encoding
// =============================================================================

pub(crate) fn encode_cursor(key: &[u8]) -> String {
    hex::encode(key)
}

pub(crate) fn decode_cursor(cursor: &str) -> Option<Vec<u8>> {
    hex::decode(cursor).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_key_orders_newest_first() {
        let key_old = make_index_key("user-1", 1000, "a");
        let key_new = make_index_key("user-1", 2000, "b");
        assert!(key_new < key_old, "newer timestamps must sort first");
    }

    #[test]
    fn prefix_bounds_cover_owner_keys() {
        let key = make_index_key("user-1", 1234, "entry");
        let prefix = make_prefix("user-1");
        let end = make_prefix_end("user-1");
        assert!(key.as_slice() >= prefix.as_slice());
        assert!(key.as_slice() < end.as_slice());

        // Another owner's keys fall outside the range
        let other = make_index_key("user-2", 1234, "entry");
        assert!(other.as_slice() >= end.as_slice() || other.as_slice() < prefix.as_slice());
    }

    #[test]
    fn cursor_round_trips() {
        let key = make_index_key("user-1", 99, "id");
        let cursor = encode_cursor(&key);
        assert_eq!(decode_cursor(&cursor), Some(key));
        assert_eq!(decode_cursor("not-hex!"), None);
    }
}
