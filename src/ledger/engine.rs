// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Ledger Engine
//!
//! Sole writer of balance state. Every mutation:
//!
//! 1. acquires the lock of the affected `(user, asset, chain)` row (and
//!    only that row — unrelated users never contend),
//! 2. validates preconditions against the stored row,
//! 3. persists the new row together with its append-only entry in one
//!    storage transaction.
//!
//! Transfers lock both rows in canonical key order and commit both sides
//! atomically, so no reader can observe a half-applied transfer.

use std::sync::Arc;

use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::models::{AdjustOperation, Chain};
use crate::storage::LedgerDb;

use super::{
    balance_row_key, Balance, EntryType, HistoryFilter, HistoryPage, LedgerEntry, LedgerError,
    LedgerResult,
};

/// Default history page size.
const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Maximum history page size.
const MAX_HISTORY_LIMIT: usize = 200;

/// Atomic balance ledger over durable storage.
pub struct LedgerEngine {
    db: LedgerDb,
    /// One lock per balance row; global locks are forbidden.
    row_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl LedgerEngine {
    pub fn new(db: LedgerDb) -> Self {
        Self {
            db,
            row_locks: DashMap::new(),
        }
    }

    fn row_lock(&self, row_key: &str) -> Arc<Mutex<()>> {
        self.row_locks
            .entry(row_key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn load_or_empty(&self, user_id: &str, asset: &str, chain: Chain) -> LedgerResult<Balance> {
        let key = balance_row_key(user_id, asset, chain);
        Ok(self
            .db
            .get_balance(&key)?
            .unwrap_or_else(|| Balance::empty(user_id, asset, chain)))
    }

    // =========================================================================
    // Deposits
    // =========================================================================

    /// Credit a confirmed on-chain deposit, idempotent on `tx_id`.
    ///
    /// A repeated call for the same chain transaction is a no-op success:
    /// no balance change, no new ledger entry.
    pub async fn credit_deposit(
        &self,
        user_id: &str,
        asset: &str,
        chain: Chain,
        amount: Decimal,
        tx_id: &str,
    ) -> LedgerResult<Balance> {
        require_positive(amount)?;
        let deposit_key = format!("{chain}|{tx_id}");
        let row_key = balance_row_key(user_id, asset, chain);
        let lock = self.row_lock(&row_key);
        let _guard = lock.lock().await;

        if self.db.deposit_processed(&deposit_key)? {
            tracing::debug!(tx_id, %chain, "Deposit already credited, no-op");
            return self.load_or_empty(user_id, asset, chain);
        }

        let mut balance = self.load_or_empty(user_id, asset, chain)?;
        let before = balance.available;
        balance.available += amount;
        balance.refresh();

        let entry = LedgerEntry::record(
            user_id,
            EntryType::Deposit,
            asset,
            chain,
            amount,
            before,
            balance.available,
            format!("Deposit of {amount} {asset} ({chain} tx {tx_id})"),
            Some(tx_id.to_string()),
        );

        if self.db.commit_credit(&balance, &entry, &deposit_key)? {
            tracing::info!(
                user_id,
                asset,
                %chain,
                %amount,
                tx_id,
                "Deposit credited"
            );
            Ok(balance)
        } else {
            // Another row processed this tx id between check and commit
            self.load_or_empty(user_id, asset, chain)
        }
    }

    // =========================================================================
    // Administrative adjustments
    // =========================================================================

    /// Directly add to or subtract from a user's available balance.
    pub async fn adjust_balance(
        &self,
        user_id: &str,
        asset: &str,
        chain: Chain,
        amount: Decimal,
        operation: AdjustOperation,
    ) -> LedgerResult<Balance> {
        require_positive(amount)?;
        let row_key = balance_row_key(user_id, asset, chain);
        let lock = self.row_lock(&row_key);
        let _guard = lock.lock().await;

        let mut balance = self.load_or_empty(user_id, asset, chain)?;
        let before = balance.available;

        match operation {
            AdjustOperation::Add => balance.available += amount,
            AdjustOperation::Subtract => {
                if amount > balance.available {
                    return Err(LedgerError::InsufficientBalance {
                        asset: asset.to_string(),
                        requested: amount,
                        available: balance.available,
                    });
                }
                balance.available -= amount;
            }
        }
        balance.refresh();

        let verb = match operation {
            AdjustOperation::Add => "add",
            AdjustOperation::Subtract => "subtract",
        };
        let entry = LedgerEntry::record(
            user_id,
            EntryType::Adjustment,
            asset,
            chain,
            amount,
            before,
            balance.available,
            format!("Administrative {verb} of {amount} {asset}"),
            None,
        );

        self.db.commit_mutation(&balance, &entry)?;
        Ok(balance)
    }

    // =========================================================================
    // Lock / Unlock
    // =========================================================================

    /// Move quantity from `available` to `locked`. `total` is unchanged.
    pub async fn lock(
        &self,
        user_id: &str,
        asset: &str,
        chain: Chain,
        amount: Decimal,
    ) -> LedgerResult<Balance> {
        require_positive(amount)?;
        let row_key = balance_row_key(user_id, asset, chain);
        let lock = self.row_lock(&row_key);
        let _guard = lock.lock().await;

        let mut balance = self.load_or_empty(user_id, asset, chain)?;
        if amount > balance.available {
            return Err(LedgerError::InsufficientBalance {
                asset: asset.to_string(),
                requested: amount,
                available: balance.available,
            });
        }

        let before = balance.available;
        balance.available -= amount;
        balance.locked += amount;
        balance.refresh();

        let entry = LedgerEntry::record(
            user_id,
            EntryType::Lock,
            asset,
            chain,
            amount,
            before,
            balance.available,
            format!("Locked {amount} {asset}"),
            None,
        );

        self.db.commit_mutation(&balance, &entry)?;
        Ok(balance)
    }

    /// Move quantity from `locked` back to `available`. `total` unchanged.
    pub async fn unlock(
        &self,
        user_id: &str,
        asset: &str,
        chain: Chain,
        amount: Decimal,
    ) -> LedgerResult<Balance> {
        require_positive(amount)?;
        let row_key = balance_row_key(user_id, asset, chain);
        let lock = self.row_lock(&row_key);
        let _guard = lock.lock().await;

        let mut balance = self.load_or_empty(user_id, asset, chain)?;
        if amount > balance.locked {
            return Err(LedgerError::InvalidState(format!(
                "cannot unlock {amount} {asset}: only {} locked",
                balance.locked
            )));
        }

        let before = balance.available;
        balance.locked -= amount;
        balance.available += amount;
        balance.refresh();

        let entry = LedgerEntry::record(
            user_id,
            EntryType::Unlock,
            asset,
            chain,
            amount,
            before,
            balance.available,
            format!("Unlocked {amount} {asset}"),
            None,
        );

        self.db.commit_mutation(&balance, &entry)?;
        Ok(balance)
    }

    // =========================================================================
    // Transfers
    // =========================================================================

    /// Move funds between two users atomically.
    pub async fn transfer(
        &self,
        from_user_id: &str,
        to_user_id: &str,
        asset: &str,
        chain: Chain,
        amount: Decimal,
        description: &str,
    ) -> LedgerResult<(Balance, Balance)> {
        require_positive(amount)?;
        if from_user_id == to_user_id {
            return Err(LedgerError::InvalidState(
                "cannot transfer to the same user".to_string(),
            ));
        }

        let from_key = balance_row_key(from_user_id, asset, chain);
        let to_key = balance_row_key(to_user_id, asset, chain);

        // Lock both rows in canonical order to avoid lock-order inversion
        let (first_key, second_key) = if from_key < to_key {
            (&from_key, &to_key)
        } else {
            (&to_key, &from_key)
        };
        let first = self.row_lock(first_key);
        let second = self.row_lock(second_key);
        let _g1 = first.lock().await;
        let _g2 = second.lock().await;

        let mut sender = self.load_or_empty(from_user_id, asset, chain)?;
        if amount > sender.available {
            return Err(LedgerError::InsufficientBalance {
                asset: asset.to_string(),
                requested: amount,
                available: sender.available,
            });
        }
        let mut recipient = self.load_or_empty(to_user_id, asset, chain)?;

        let sender_before = sender.available;
        let recipient_before = recipient.available;
        sender.available -= amount;
        recipient.available += amount;
        sender.refresh();
        recipient.refresh();

        let out_entry = LedgerEntry::record(
            from_user_id,
            EntryType::TransferOut,
            asset,
            chain,
            amount,
            sender_before,
            sender.available,
            description,
            None,
        );
        let in_entry = LedgerEntry::record(
            to_user_id,
            EntryType::TransferIn,
            asset,
            chain,
            amount,
            recipient_before,
            recipient.available,
            description,
            None,
        );

        self.db
            .commit_transfer((&sender, &out_entry), (&recipient, &in_entry))?;

        tracing::info!(
            from = from_user_id,
            to = to_user_id,
            asset,
            %amount,
            "Transfer completed"
        );
        Ok((sender, recipient))
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// All balance rows for a user.
    pub fn balances(&self, user_id: &str) -> LedgerResult<Vec<Balance>> {
        Ok(self.db.list_balances(user_id)?)
    }

    /// Paginated ledger history, newest first. Read-only.
    pub fn history(&self, user_id: &str, filter: &HistoryFilter) -> LedgerResult<HistoryPage> {
        let limit = if filter.limit == 0 {
            DEFAULT_HISTORY_LIMIT
        } else {
            filter.limit.min(MAX_HISTORY_LIMIT)
        };
        let (entries, next_cursor) = self.db.list_entries(
            user_id,
            filter.asset.as_deref(),
            filter.entry_type,
            filter.cursor.as_deref(),
            limit,
        )?;
        Ok(HistoryPage {
            entries,
            next_cursor,
        })
    }
}

fn require_positive(amount: Decimal) -> LedgerResult<()> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount(format!(
            "amount must be positive, got {amount}"
        )));
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_engine() -> (Arc<LedgerEngine>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = LedgerDb::open(&dir.path().join("ledger.redb")).unwrap();
        (Arc::new(LedgerEngine::new(db)), dir)
    }

    fn dec(n: i64) -> Decimal {
        Decimal::from(n)
    }

    #[tokio::test]
    async fn deposit_lock_unlock_scenario() {
        let (engine, _dir) = test_engine();

        // Credit 1000 USDC on Solana
        let bal = engine
            .credit_deposit("user-1", "USDC", Chain::Solana, dec(1000), "tx1")
            .await
            .unwrap();
        assert_eq!(bal.available, dec(1000));
        assert_eq!(bal.total, dec(1000));

        // Same tx id again: no change, no new entry
        let bal = engine
            .credit_deposit("user-1", "USDC", Chain::Solana, dec(1000), "tx1")
            .await
            .unwrap();
        assert_eq!(bal.available, dec(1000));
        let page = engine
            .history("user-1", &HistoryFilter::default())
            .unwrap();
        assert_eq!(page.entries.len(), 1);

        // Lock 400
        let bal = engine
            .lock("user-1", "USDC", Chain::Solana, dec(400))
            .await
            .unwrap();
        assert_eq!(bal.available, dec(600));
        assert_eq!(bal.locked, dec(400));
        assert_eq!(bal.total, dec(1000));

        // Unlock 400 returns to pre-lock state
        let bal = engine
            .unlock("user-1", "USDC", Chain::Solana, dec(400))
            .await
            .unwrap();
        assert_eq!(bal.available, dec(1000));
        assert_eq!(bal.locked, dec(0));
        assert_eq!(bal.total, dec(1000));
    }

    #[tokio::test]
    async fn invariant_holds_after_every_operation() {
        let (engine, _dir) = test_engine();
        engine
            .credit_deposit("user-1", "SOL", Chain::Solana, dec(50), "tx-a")
            .await
            .unwrap();
        engine
            .lock("user-1", "SOL", Chain::Solana, dec(20))
            .await
            .unwrap();
        engine
            .adjust_balance("user-1", "SOL", Chain::Solana, dec(5), AdjustOperation::Add)
            .await
            .unwrap();

        for bal in engine.balances("user-1").unwrap() {
            assert_eq!(bal.total, bal.available + bal.locked);
            assert!(bal.available >= Decimal::ZERO);
            assert!(bal.locked >= Decimal::ZERO);
        }
    }

    #[tokio::test]
    async fn lock_beyond_available_fails() {
        let (engine, _dir) = test_engine();
        engine
            .credit_deposit("user-1", "SOL", Chain::Solana, dec(10), "tx-a")
            .await
            .unwrap();

        let err = engine
            .lock("user-1", "SOL", Chain::Solana, dec(11))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
    }

    #[tokio::test]
    async fn unlock_beyond_locked_fails() {
        let (engine, _dir) = test_engine();
        engine
            .credit_deposit("user-1", "SOL", Chain::Solana, dec(10), "tx-a")
            .await
            .unwrap();
        engine
            .lock("user-1", "SOL", Chain::Solana, dec(4))
            .await
            .unwrap();

        let err = engine
            .unlock("user-1", "SOL", Chain::Solana, dec(5))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidState(_)));
    }

    #[tokio::test]
    async fn subtract_below_zero_fails() {
        let (engine, _dir) = test_engine();
        let err = engine
            .adjust_balance(
                "user-1",
                "SOL",
                Chain::Solana,
                dec(1),
                AdjustOperation::Subtract,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
    }

    #[tokio::test]
    async fn non_positive_amounts_are_rejected() {
        let (engine, _dir) = test_engine();
        let err = engine
            .credit_deposit("user-1", "SOL", Chain::Solana, dec(0), "tx-a")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount(_)));

        let err = engine
            .lock("user-1", "SOL", Chain::Solana, dec(-5))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount(_)));
    }

    #[tokio::test]
    async fn transfer_conserves_total() {
        let (engine, _dir) = test_engine();
        engine
            .credit_deposit("alice", "ETH", Chain::Ethereum, dec(100), "tx-a")
            .await
            .unwrap();

        let (sender, recipient) = engine
            .transfer("alice", "bob", "ETH", Chain::Ethereum, dec(30), "rent")
            .await
            .unwrap();

        assert_eq!(sender.total, dec(70));
        assert_eq!(recipient.total, dec(30));
        assert_eq!(sender.total + recipient.total, dec(100));

        // Paired entries on both sides
        let alice_page = engine.history("alice", &HistoryFilter::default()).unwrap();
        assert_eq!(alice_page.entries[0].entry_type, EntryType::TransferOut);
        let bob_page = engine.history("bob", &HistoryFilter::default()).unwrap();
        assert_eq!(bob_page.entries[0].entry_type, EntryType::TransferIn);
        assert_eq!(bob_page.entries[0].description, "rent");
    }

    #[tokio::test]
    async fn transfer_with_insufficient_funds_fails_without_mutation() {
        let (engine, _dir) = test_engine();
        engine
            .credit_deposit("alice", "ETH", Chain::Ethereum, dec(10), "tx-a")
            .await
            .unwrap();

        let err = engine
            .transfer("alice", "bob", "ETH", Chain::Ethereum, dec(11), "too much")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));

        // Neither side changed
        let alice = engine.balances("alice").unwrap();
        assert_eq!(alice[0].total, dec(10));
        assert!(engine.balances("bob").unwrap().is_empty());
    }

    #[tokio::test]
    async fn self_transfer_is_rejected() {
        let (engine, _dir) = test_engine();
        let err = engine
            .transfer("alice", "alice", "ETH", Chain::Ethereum, dec(1), "loop")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidState(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_locks_cannot_overdraw() {
        let (engine, _dir) = test_engine();
        engine
            .credit_deposit("user-1", "USDC", Chain::Solana, dec(100), "tx-a")
            .await
            .unwrap();

        // 60 + 60 > 100: exactly one must win
        let e1 = engine.clone();
        let e2 = engine.clone();
        let h1 =
            tokio::spawn(async move { e1.lock("user-1", "USDC", Chain::Solana, dec(60)).await });
        let h2 =
            tokio::spawn(async move { e2.lock("user-1", "USDC", Chain::Solana, dec(60)).await });

        let r1 = h1.await.unwrap();
        let r2 = h2.await.unwrap();
        assert!(
            r1.is_ok() ^ r2.is_ok(),
            "exactly one lock must succeed, got {r1:?} / {r2:?}"
        );

        let bal = &engine.balances("user-1").unwrap()[0];
        assert_eq!(bal.locked, dec(60));
        assert_eq!(bal.available, dec(40));
        assert_eq!(bal.total, dec(100));
    }

    #[tokio::test]
    async fn history_reconstructs_available_balance() {
        let (engine, _dir) = test_engine();
        engine
            .credit_deposit("user-1", "SOL", Chain::Solana, dec(100), "t1")
            .await
            .unwrap();
        engine
            .lock("user-1", "SOL", Chain::Solana, dec(30))
            .await
            .unwrap();
        engine
            .unlock("user-1", "SOL", Chain::Solana, dec(10))
            .await
            .unwrap();
        engine
            .adjust_balance(
                "user-1",
                "SOL",
                Chain::Solana,
                dec(5),
                AdjustOperation::Subtract,
            )
            .await
            .unwrap();

        let page = engine
            .history("user-1", &HistoryFilter::default())
            .unwrap();

        // Replay oldest-to-newest: signed deltas must reach the current available
        let mut replayed = Decimal::ZERO;
        for entry in page.entries.iter().rev() {
            replayed += entry.balance_after - entry.balance_before;
        }
        let bal = &engine.balances("user-1").unwrap()[0];
        assert_eq!(replayed, bal.available);
    }
}
