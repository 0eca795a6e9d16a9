// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Deposit monitor mirror backed by redb.
//!
//! ## Table Layout
//!
//! - `monitors`: monitor_id (UUID string) → serialized DepositMonitor
//!
//! The mirror only ever holds pending monitors; terminal ones are deleted
//! by the registry. Its purpose is restart survival within the bounded
//! retention window, not history.

use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use uuid::Uuid;

use crate::monitor::DepositMonitor;

use super::StoreResult;

/// Monitors: `monitor_id` → JSON bytes.
const MONITORS: TableDefinition<&str, &[u8]> = TableDefinition::new("monitors");

/// Durable mirror for in-flight deposit monitors.
pub struct MonitorDb {
    db: Database,
}

impl MonitorDb {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = Database::create(path)?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(MONITORS)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Insert or overwrite a monitor record.
    pub fn put(&self, monitor: &DepositMonitor) -> StoreResult<()> {
        let key = monitor.monitor_id.to_string();
        let json = serde_json::to_vec(monitor)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(MONITORS)?;
            table.insert(key.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Fetch one monitor by id.
    pub fn get(&self, monitor_id: Uuid) -> StoreResult<Option<DepositMonitor>> {
        let key = monitor_id.to_string();
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(MONITORS)?;
        match table.get(key.as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Remove a monitor record (terminal transition or purge).
    pub fn delete(&self, monitor_id: Uuid) -> StoreResult<()> {
        let key = monitor_id.to_string();
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(MONITORS)?;
            table.remove(key.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// All mirrored monitors, for restart restoration.
    pub fn load_all(&self) -> StoreResult<Vec<DepositMonitor>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(MONITORS)?;

        let mut monitors = Vec::new();
        for item in table.iter()? {
            let (_, value) = item?;
            monitors.push(serde_json::from_slice(value.value())?);
        }
        Ok(monitors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    use crate::models::Chain;
    use crate::monitor::MonitorStatus;

    fn temp_db() -> (MonitorDb, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = MonitorDb::open(&dir.path().join("monitors.redb")).unwrap();
        (db, dir)
    }

    fn sample_monitor() -> DepositMonitor {
        let now = Utc::now();
        DepositMonitor {
            monitor_id: Uuid::new_v4(),
            user_id: "user-1".to_string(),
            address: "addr-1".to_string(),
            chain: Chain::Solana,
            expected_amount: None,
            confirmations: 0,
            status: MonitorStatus::Pending,
            created_at: now,
            expires_at: now + Duration::hours(1),
        }
    }

    #[test]
    fn put_and_get_round_trip() {
        let (db, _dir) = temp_db();
        let monitor = sample_monitor();
        db.put(&monitor).unwrap();

        let loaded = db.get(monitor.monitor_id).unwrap().unwrap();
        assert_eq!(loaded.user_id, "user-1");
        assert_eq!(loaded.status, MonitorStatus::Pending);
        assert!(db.get(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn delete_removes_record() {
        let (db, _dir) = temp_db();
        let monitor = sample_monitor();
        db.put(&monitor).unwrap();

        db.delete(monitor.monitor_id).unwrap();
        assert!(db.get(monitor.monitor_id).unwrap().is_none());
        // Deleting again is a no-op, not an error
        db.delete(monitor.monitor_id).unwrap();
    }

    #[test]
    fn load_all_returns_every_mirrored_monitor() {
        let (db, _dir) = temp_db();
        let a = sample_monitor();
        let b = sample_monitor();
        db.put(&a).unwrap();
        db.put(&b).unwrap();

        let loaded = db.load_all().unwrap();
        assert_eq!(loaded.len(), 2);
    }
}
