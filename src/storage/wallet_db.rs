// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Connected wallet store backed by redb.
//!
//! ## Table Layout
//!
//! - `connected_wallets`: claim key (`chain|normalized_address`) → serialized ConnectedWallet
//!
//! Keying by address makes the at-most-one-claimant rule structural: a
//! claim either belongs to its current holder or nobody.

use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use crate::models::Chain;
use crate::ownership::ConnectedWallet;

use super::StoreResult;

/// Claims: `chain|normalized_address` → JSON bytes.
const CONNECTED_WALLETS: TableDefinition<&str, &[u8]> = TableDefinition::new("connected_wallets");

fn claim_key(chain: Chain, address: &str) -> String {
    format!("{chain}|{}", chain.normalize_address(address))
}

/// Durable store for ownership-verified wallet connections.
pub struct WalletDb {
    db: Database,
}

impl WalletDb {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = Database::create(path)?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(CONNECTED_WALLETS)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Current claimant of an address, if any.
    pub fn claimant(&self, chain: Chain, address: &str) -> StoreResult<Option<ConnectedWallet>> {
        let key = claim_key(chain, address);
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CONNECTED_WALLETS)?;
        match table.get(key.as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Persist a verified wallet connection (overwrites a same-user claim).
    pub fn insert(&self, wallet: &ConnectedWallet) -> StoreResult<()> {
        let key = claim_key(wallet.chain, &wallet.address);
        let json = serde_json::to_vec(wallet)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(CONNECTED_WALLETS)?;
            table.insert(key.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// All wallets connected by a user.
    pub fn list_by_user(&self, user_id: &str) -> StoreResult<Vec<ConnectedWallet>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CONNECTED_WALLETS)?;

        let mut wallets = Vec::new();
        for item in table.iter()? {
            let (_, value) = item?;
            let wallet: ConnectedWallet = serde_json::from_slice(value.value())?;
            if wallet.user_id == user_id {
                wallets.push(wallet);
            }
        }
        Ok(wallets)
    }

    /// Delete a claim. Returns the removed wallet, or `None` if absent.
    pub fn delete(&self, chain: Chain, address: &str) -> StoreResult<Option<ConnectedWallet>> {
        let key = claim_key(chain, address);
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(CONNECTED_WALLETS)?;
            let removed = match table.remove(key.as_str())? {
                Some(value) => Some(serde_json::from_slice(value.value())?),
                None => None,
            };
            removed
        };
        write_txn.commit()?;
        Ok(removed)
    }

    /// Find a user's claim on an address across chains.
    ///
    /// Used by disconnect, where the external interface carries no chain.
    pub fn find_claim(
        &self,
        user_id: &str,
        address: &str,
    ) -> StoreResult<Option<ConnectedWallet>> {
        for chain in [Chain::Solana, Chain::Ethereum] {
            if let Some(wallet) = self.claimant(chain, address)? {
                if wallet.user_id == user_id {
                    return Ok(Some(wallet));
                }
            }
        }
        Ok(None)
    }
}
