// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded ledger database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `balances`: row key (`user|asset|chain`) → serialized Balance
//! - `entries`: composite key (`user|!timestamp|entry_id`) → serialized LedgerEntry
//! - `deposit_txids`: deposit key (`chain|tx_id`) → entry_id
//!
//! The `deposit_txids` table is the idempotency boundary for deposit
//! crediting: the key is inserted in the same write transaction as the
//! balance update and ledger entry, so a chain transaction can be credited
//! at most once no matter how often it is observed.

use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use crate::ledger::{Balance, EntryType, LedgerEntry};

use super::{decode_cursor, encode_cursor, make_index_key, make_prefix, make_prefix_end};
use super::StoreResult;

// =============================================================================
// Table Definitions
// =============================================================================

/// Balance rows: `user|asset|chain` → JSON bytes.
const BALANCES: TableDefinition<&str, &[u8]> = TableDefinition::new("balances");

/// Append-only entries: `user|!timestamp_be|entry_id` → JSON bytes.
/// The inverted timestamp gives newest-first forward scans.
const ENTRIES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("entries");

/// Processed deposits: `chain|tx_id` → entry_id.
const DEPOSIT_TXIDS: TableDefinition<&str, &str> = TableDefinition::new("deposit_txids");

// =============================================================================
// LedgerDb
// =============================================================================

/// Durable ACID store for balances and ledger history.
pub struct LedgerDb {
    db: Database,
}

impl LedgerDb {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(BALANCES)?;
            let _ = write_txn.open_table(ENTRIES)?;
            let _ = write_txn.open_table(DEPOSIT_TXIDS)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    // =========================================================================
    // Balances
    // =========================================================================

    /// Look up a single balance row.
    pub fn get_balance(&self, row_key: &str) -> StoreResult<Option<Balance>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(BALANCES)?;
        match table.get(row_key)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// List all balance rows belonging to a user.
    pub fn list_balances(&self, user_id: &str) -> StoreResult<Vec<Balance>> {
        let prefix = format!("{user_id}|");
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(BALANCES)?;

        let mut balances = Vec::new();
        for item in table.iter()? {
            let (key, value) = item?;
            if key.value().starts_with(&prefix) {
                balances.push(serde_json::from_slice(value.value())?);
            }
        }
        Ok(balances)
    }

    // =========================================================================
    // Mutations (called by the LedgerEngine under its row locks)
    // =========================================================================

    /// Persist a single-row mutation and its ledger entry atomically.
    pub fn commit_mutation(&self, balance: &Balance, entry: &LedgerEntry) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut bal_table = write_txn.open_table(BALANCES)?;
            let mut entry_table = write_txn.open_table(ENTRIES)?;
            write_balance(&mut bal_table, balance)?;
            write_entry(&mut entry_table, entry)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Check whether a deposit key (`chain|tx_id`) has already been credited.
    pub fn deposit_processed(&self, deposit_key: &str) -> StoreResult<bool> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(DEPOSIT_TXIDS)?;
        Ok(table.get(deposit_key)?.is_some())
    }

    /// Persist a deposit credit atomically: balance + entry + idempotency key.
    ///
    /// Returns `false` without writing anything if the key already exists.
    pub fn commit_credit(
        &self,
        balance: &Balance,
        entry: &LedgerEntry,
        deposit_key: &str,
    ) -> StoreResult<bool> {
        let write_txn = self.db.begin_write()?;
        let inserted = {
            let mut txid_table = write_txn.open_table(DEPOSIT_TXIDS)?;
            if txid_table.get(deposit_key)?.is_some() {
                false
            } else {
                txid_table.insert(deposit_key, entry.entry_id.as_str())?;
                let mut bal_table = write_txn.open_table(BALANCES)?;
                let mut entry_table = write_txn.open_table(ENTRIES)?;
                write_balance(&mut bal_table, balance)?;
                write_entry(&mut entry_table, entry)?;
                true
            }
        };
        write_txn.commit()?;
        Ok(inserted)
    }

    /// Persist both sides of a transfer in one transaction.
    ///
    /// A reader can never observe the debit without the credit: both rows
    /// and both entries become visible at the same commit.
    pub fn commit_transfer(
        &self,
        debit: (&Balance, &LedgerEntry),
        credit: (&Balance, &LedgerEntry),
    ) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut bal_table = write_txn.open_table(BALANCES)?;
            let mut entry_table = write_txn.open_table(ENTRIES)?;
            write_balance(&mut bal_table, debit.0)?;
            write_balance(&mut bal_table, credit.0)?;
            write_entry(&mut entry_table, debit.1)?;
            write_entry(&mut entry_table, credit.1)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    // =========================================================================
    // History
    // =========================================================================

    /// Paginated, newest-first listing of a user's ledger entries.
    ///
    /// Returns `(entries, next_cursor)`.
    pub fn list_entries(
        &self,
        user_id: &str,
        asset: Option<&str>,
        entry_type: Option<EntryType>,
        cursor: Option<&str>,
        limit: usize,
    ) -> StoreResult<(Vec<LedgerEntry>, Option<String>)> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ENTRIES)?;

        let prefix = make_prefix(user_id);
        let prefix_end = make_prefix_end(user_id);

        let start: Vec<u8> = match cursor {
            Some(c) => decode_cursor(c).unwrap_or_else(|| prefix.clone()),
            None => prefix.clone(),
        };

        let mut results = Vec::with_capacity(limit);
        let mut last_key: Option<Vec<u8>> = None;
        let mut skip_first = cursor.is_some();

        for item in table.range(start.as_slice()..prefix_end.as_slice())? {
            let (key, value) = item?;
            let key_bytes = key.value().to_vec();

            // Skip the cursor entry itself
            if skip_first {
                skip_first = false;
                continue;
            }

            let entry: LedgerEntry = serde_json::from_slice(value.value())?;
            if let Some(asset) = asset {
                if entry.asset != asset {
                    continue;
                }
            }
            if let Some(et) = entry_type {
                if entry.entry_type != et {
                    continue;
                }
            }

            results.push(entry);
            last_key = Some(key_bytes);

            if results.len() >= limit {
                break;
            }
        }

        let next_cursor = if results.len() >= limit {
            last_key.map(|k| encode_cursor(&k))
        } else {
            None
        };

        Ok((results, next_cursor))
    }
}

fn write_balance(
    table: &mut redb::Table<'_, &str, &[u8]>,
    balance: &Balance,
) -> StoreResult<()> {
    let json = serde_json::to_vec(balance)?;
    table.insert(balance.row_key().as_str(), json.as_slice())?;
    Ok(())
}

fn write_entry(
    table: &mut redb::Table<'_, &[u8], &[u8]>,
    entry: &LedgerEntry,
) -> StoreResult<()> {
    let key = make_index_key(
        &entry.user_id,
        entry.timestamp.timestamp_millis(),
        &entry.entry_id,
    );
    let json = serde_json::to_vec(entry)?;
    table.insert(key.as_slice(), json.as_slice())?;
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chain;
    use rust_decimal::Decimal;

    fn temp_db() -> (LedgerDb, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = LedgerDb::open(&dir.path().join("ledger.redb")).unwrap();
        (db, dir)
    }

    fn credited_balance(amount: i64) -> Balance {
        let mut bal = Balance::empty("user-1", "SOL", Chain::Solana);
        bal.available = Decimal::from(amount);
        bal.refresh();
        bal
    }

    fn deposit_entry(amount: i64, tx_id: &str) -> LedgerEntry {
        LedgerEntry::record(
            "user-1",
            EntryType::Deposit,
            "SOL",
            Chain::Solana,
            Decimal::from(amount),
            Decimal::ZERO,
            Decimal::from(amount),
            "deposit",
            Some(tx_id.to_string()),
        )
    }

    #[test]
    fn commit_and_get_balance() {
        let (db, _dir) = temp_db();
        let bal = credited_balance(100);
        let entry = deposit_entry(100, "tx1");

        assert!(db.commit_credit(&bal, &entry, "solana|tx1").unwrap());

        let loaded = db.get_balance(&bal.row_key()).unwrap().unwrap();
        assert_eq!(loaded.available, Decimal::from(100));
        assert_eq!(loaded.total, Decimal::from(100));
    }

    #[test]
    fn duplicate_deposit_key_is_rejected_without_writes() {
        let (db, _dir) = temp_db();
        let bal = credited_balance(100);
        let entry = deposit_entry(100, "tx1");
        assert!(db.commit_credit(&bal, &entry, "solana|tx1").unwrap());

        // Second attempt with a bigger balance must not write anything
        let bal2 = credited_balance(200);
        let entry2 = deposit_entry(100, "tx1");
        assert!(!db.commit_credit(&bal2, &entry2, "solana|tx1").unwrap());

        let loaded = db.get_balance(&bal.row_key()).unwrap().unwrap();
        assert_eq!(loaded.available, Decimal::from(100));

        let (entries, _) = db.list_entries("user-1", None, None, None, 10).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(db.deposit_processed("solana|tx1").unwrap());
    }

    #[test]
    fn list_balances_scopes_to_user() {
        let (db, _dir) = temp_db();
        let bal = credited_balance(50);
        db.commit_mutation(&bal, &deposit_entry(50, "txa")).unwrap();

        let mut other = Balance::empty("user-2", "ETH", Chain::Ethereum);
        other.available = Decimal::ONE;
        other.refresh();
        let other_entry = LedgerEntry::record(
            "user-2",
            EntryType::Deposit,
            "ETH",
            Chain::Ethereum,
            Decimal::ONE,
            Decimal::ZERO,
            Decimal::ONE,
            "deposit",
            None,
        );
        db.commit_mutation(&other, &other_entry).unwrap();

        let user1 = db.list_balances("user-1").unwrap();
        assert_eq!(user1.len(), 1);
        assert_eq!(user1[0].asset, "SOL");

        assert!(db.list_balances("user-3").unwrap().is_empty());
    }

    #[test]
    fn list_entries_newest_first_with_pagination() {
        let (db, _dir) = temp_db();
        for i in 0..5 {
            let mut entry = deposit_entry(10, &format!("tx{i}"));
            entry.timestamp = chrono::Utc::now() - chrono::Duration::seconds(5 - i);
            db.commit_mutation(&credited_balance(10 * (i + 1)), &entry)
                .unwrap();
        }

        let (page1, cursor) = db.list_entries("user-1", None, None, None, 2).unwrap();
        assert_eq!(page1.len(), 2);
        assert!(cursor.is_some());
        assert!(page1[0].timestamp >= page1[1].timestamp);

        let (page2, cursor2) = db
            .list_entries("user-1", None, None, cursor.as_deref(), 2)
            .unwrap();
        assert_eq!(page2.len(), 2);

        let (page3, cursor3) = db
            .list_entries("user-1", None, None, cursor2.as_deref(), 2)
            .unwrap();
        assert_eq!(page3.len(), 1);
        assert!(cursor3.is_none());
    }

    #[test]
    fn list_entries_applies_filters() {
        let (db, _dir) = temp_db();
        db.commit_mutation(&credited_balance(10), &deposit_entry(10, "tx1"))
            .unwrap();

        let lock_entry = LedgerEntry::record(
            "user-1",
            EntryType::Lock,
            "SOL",
            Chain::Solana,
            Decimal::from(4),
            Decimal::from(10),
            Decimal::from(6),
            "lock",
            None,
        );
        db.commit_mutation(&credited_balance(10), &lock_entry)
            .unwrap();

        let (deposits, _) = db
            .list_entries("user-1", None, Some(EntryType::Deposit), None, 10)
            .unwrap();
        assert_eq!(deposits.len(), 1);
        assert_eq!(deposits[0].entry_type, EntryType::Deposit);

        let (none, _) = db
            .list_entries("user-1", Some("ETH"), None, None, 10)
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn transfer_commits_both_sides() {
        let (db, _dir) = temp_db();

        let mut sender = credited_balance(100);
        sender.available = Decimal::from(60);
        sender.refresh();
        let out_entry = LedgerEntry::record(
            "user-1",
            EntryType::TransferOut,
            "SOL",
            Chain::Solana,
            Decimal::from(40),
            Decimal::from(100),
            Decimal::from(60),
            "to user-2",
            None,
        );

        let mut recipient = Balance::empty("user-2", "SOL", Chain::Solana);
        recipient.available = Decimal::from(40);
        recipient.refresh();
        let in_entry = LedgerEntry::record(
            "user-2",
            EntryType::TransferIn,
            "SOL",
            Chain::Solana,
            Decimal::from(40),
            Decimal::ZERO,
            Decimal::from(40),
            "from user-1",
            None,
        );

        db.commit_transfer((&sender, &out_entry), (&recipient, &in_entry))
            .unwrap();

        assert_eq!(
            db.get_balance(&sender.row_key()).unwrap().unwrap().total,
            Decimal::from(60)
        );
        assert_eq!(
            db.get_balance(&recipient.row_key()).unwrap().unwrap().total,
            Decimal::from(40)
        );
    }
}
