// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Monitor registry and its background reconciliation sweep.
//!
//! ## Strategy
//!
//! Every `poll_interval` (default 30 s) the sweep:
//! 1. Purges monitors that outlived their retention window while still
//!    pending (terminal `failed`, no credit).
//! 2. Queries the chain reader for each remaining monitor's address.
//! 3. Credits every credit-worthy inbound transfer through the ledger
//!    engine (which deduplicates by transaction id) and destroys the
//!    monitor on the first successful credit (terminal `confirmed`).
//!
//! A reader failure is transient: the monitor stays pending and the
//! same address is queried again on the next sweep.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::chain::ChainReader;
use crate::ledger::LedgerEngine;
use crate::models::Chain;
use crate::storage::{MonitorDb, StoreResult};

use super::{DepositMonitor, MonitorError, MonitorResult, MonitorStatus};

/// Default interval between reconciliation sweeps.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Durable retention window: past this a pending monitor fails.
const MONITOR_RETENTION: chrono::Duration = chrono::Duration::hours(1);

/// Inbound transfers fetched per address per sweep.
const TRANSFER_FETCH_LIMIT: usize = 20;

/// Registry of active deposit monitors, serviced by one background sweep.
pub struct MonitorRegistry {
    db: Arc<MonitorDb>,
    ledger: Arc<LedgerEngine>,
    readers: HashMap<Chain, Arc<dyn ChainReader>>,
    active: DashMap<Uuid, DepositMonitor>,
    poll_interval: Duration,
}

impl MonitorRegistry {
    /// Build a registry and restore mirrored monitors from disk.
    ///
    /// Already-expired ones are not resurrected into the sweep; the first
    /// `poll_step` purges them.
    pub fn new(
        db: Arc<MonitorDb>,
        ledger: Arc<LedgerEngine>,
        readers: HashMap<Chain, Arc<dyn ChainReader>>,
    ) -> StoreResult<Self> {
        let active = DashMap::new();
        for monitor in db.load_all()? {
            active.insert(monitor.monitor_id, monitor);
        }
        if !active.is_empty() {
            info!(count = active.len(), "Restored pending deposit monitors");
        }

        Ok(Self {
            db,
            ledger,
            readers,
            active,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Register a new monitor on an address.
    pub fn start_monitor(
        &self,
        user_id: &str,
        address: &str,
        chain: Chain,
        expected_amount: Option<Decimal>,
    ) -> MonitorResult<DepositMonitor> {
        if !self.readers.contains_key(&chain) {
            return Err(MonitorError::UnsupportedChain(chain));
        }

        let now = Utc::now();
        let monitor = DepositMonitor {
            monitor_id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            address: chain.normalize_address(address),
            chain,
            expected_amount,
            confirmations: 0,
            status: MonitorStatus::Pending,
            created_at: now,
            expires_at: now + MONITOR_RETENTION,
        };

        self.db.put(&monitor)?;
        self.active.insert(monitor.monitor_id, monitor.clone());

        info!(
            monitor_id = %monitor.monitor_id,
            user_id = %monitor.user_id,
            chain = %monitor.chain,
            address = %monitor.address,
            "Deposit monitor started"
        );
        Ok(monitor)
    }

    /// Current state of an in-flight monitor.
    ///
    /// Terminal monitors are destroyed, so a confirmed or purged id
    /// reports `NotFound`.
    pub fn status(&self, monitor_id: Uuid) -> MonitorResult<DepositMonitor> {
        if let Some(monitor) = self.active.get(&monitor_id) {
            return Ok(monitor.clone());
        }
        self.db
            .get(monitor_id)?
            .ok_or(MonitorError::NotFound(monitor_id))
    }

    /// Run the reconciliation loop until the cancellation token fires.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(registry.clone().run(shutdown.clone()));
    /// ```
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(
            interval_secs = self.poll_interval.as_secs(),
            "Deposit monitor sweep starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Deposit monitor sweep shutting down");
                return;
            }

            self.poll_step().await;

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Deposit monitor sweep shutting down");
                    return;
                }
            }
        }
    }

    /// Execute one sweep over every active monitor.
    async fn poll_step(&self) {
        let ids: Vec<Uuid> = self.active.iter().map(|entry| *entry.key()).collect();
        let now = Utc::now();

        for monitor_id in ids {
            let Some(monitor) = self.active.get(&monitor_id).map(|m| m.clone()) else {
                continue;
            };

            if now >= monitor.expires_at {
                self.finish(monitor, MonitorStatus::Failed, 0);
                continue;
            }

            let Some(reader) = self.readers.get(&monitor.chain) else {
                // Unreachable after start_monitor validation; fail loudly
                warn!(monitor_id = %monitor_id, chain = %monitor.chain, "No reader for monitored chain");
                continue;
            };

            let transfers = match reader
                .recent_inbound_transfers(&monitor.address, TRANSFER_FETCH_LIMIT)
                .await
            {
                Ok(transfers) => transfers,
                Err(e) => {
                    warn!(
                        monitor_id = %monitor_id,
                        chain = %monitor.chain,
                        error = %e,
                        "Chain query failed; monitor retried next sweep"
                    );
                    continue;
                }
            };

            let mut credited = 0u32;
            for transfer in transfers.iter().filter(|t| t.confirmation.credits()) {
                if let Some(expected) = monitor.expected_amount {
                    if transfer.amount != expected {
                        warn!(
                            monitor_id = %monitor_id,
                            tx_id = %transfer.tx_id,
                            expected = %expected,
                            actual = %transfer.amount,
                            "Deposit amount differs from expectation"
                        );
                    }
                }

                match self
                    .ledger
                    .credit_deposit(
                        &monitor.user_id,
                        monitor.chain.native_asset(),
                        monitor.chain,
                        transfer.amount,
                        &transfer.tx_id,
                    )
                    .await
                {
                    Ok(_) => {
                        credited += 1;
                        info!(
                            monitor_id = %monitor_id,
                            user_id = %monitor.user_id,
                            tx_id = %transfer.tx_id,
                            amount = %transfer.amount,
                            "Deposit credited"
                        );
                    }
                    Err(e) => {
                        // Leave the monitor pending; the credit is retried
                        // next sweep and the tx-id check keeps it exact-once
                        warn!(
                            monitor_id = %monitor_id,
                            tx_id = %transfer.tx_id,
                            error = %e,
                            "Failed to credit deposit"
                        );
                    }
                }
            }

            if credited > 0 {
                self.finish(monitor, MonitorStatus::Confirmed, credited);
            }
        }
    }

    /// Terminal transition: destroy the monitor in memory and mirror.
    fn finish(&self, mut monitor: DepositMonitor, status: MonitorStatus, credited: u32) {
        monitor.status = status;
        monitor.confirmations += credited;

        if let Err(e) = self.db.delete(monitor.monitor_id) {
            warn!(monitor_id = %monitor.monitor_id, error = %e, "Failed to purge monitor mirror");
        }
        self.active.remove(&monitor.monitor_id);

        match status {
            MonitorStatus::Confirmed => {
                info!(
                    monitor_id = %monitor.monitor_id,
                    credited,
                    "Deposit monitor confirmed and destroyed"
                );
            }
            MonitorStatus::Failed => {
                warn!(
                    monitor_id = %monitor.monitor_id,
                    "Deposit monitor expired without a deposit; purged"
                );
            }
            MonitorStatus::Pending => {}
        }
    }

    /// Force-expire an active monitor (test hook for the TTL path).
    #[cfg(test)]
    fn expire_now(&self, monitor_id: Uuid) {
        if let Some(mut entry) = self.active.get_mut(&monitor_id) {
            entry.expires_at = Utc::now() - chrono::Duration::seconds(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;

    use crate::chain::{ChainError, ConfirmationState, InboundTransfer};
    use crate::ledger::engine::LedgerEngine;
    use crate::storage::LedgerDb;

    use super::*;

    /// Reader double that replays a scripted sequence of responses, one
    /// per sweep, then reports no transfers.
    struct ScriptedReader {
        chain: Chain,
        script: StdMutex<VecDeque<Result<Vec<InboundTransfer>, ChainError>>>,
    }

    impl ScriptedReader {
        fn new(
            chain: Chain,
            script: Vec<Result<Vec<InboundTransfer>, ChainError>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                chain,
                script: StdMutex::new(script.into()),
            })
        }
    }

    #[async_trait]
    impl ChainReader for ScriptedReader {
        fn chain(&self) -> Chain {
            self.chain
        }

        async fn get_balance(&self, _address: &str) -> Result<Decimal, ChainError> {
            Ok(Decimal::ZERO)
        }

        async fn recent_inbound_transfers(
            &self,
            _address: &str,
            _limit: usize,
        ) -> Result<Vec<InboundTransfer>, ChainError> {
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn transfer(tx_id: &str, amount: Decimal, state: ConfirmationState) -> InboundTransfer {
        InboundTransfer {
            tx_id: tx_id.to_string(),
            amount,
            confirmation: state,
        }
    }

    fn setup(
        script: Vec<Result<Vec<InboundTransfer>, ChainError>>,
    ) -> (Arc<MonitorRegistry>, Arc<LedgerEngine>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(LedgerEngine::new(
            LedgerDb::open(&dir.path().join("ledger.redb")).unwrap(),
        ));
        let monitor_db = Arc::new(MonitorDb::open(&dir.path().join("monitors.redb")).unwrap());

        let mut readers: HashMap<Chain, Arc<dyn ChainReader>> = HashMap::new();
        readers.insert(Chain::Solana, ScriptedReader::new(Chain::Solana, script));

        let registry =
            Arc::new(MonitorRegistry::new(monitor_db, ledger.clone(), readers).unwrap());
        (registry, ledger, dir)
    }

    #[tokio::test]
    async fn confirmed_transfer_credits_and_confirms() {
        let (registry, ledger, _dir) = setup(vec![Ok(vec![transfer(
            "sig-1",
            Decimal::from(5),
            ConfirmationState::Finalized,
        )])]);
        // Expected amount is advisory; a mismatch must not block the credit
        let monitor = registry
            .start_monitor("user-1", "addr-1", Chain::Solana, Some(Decimal::from(10)))
            .unwrap();

        registry.poll_step().await;

        let balances = ledger.balances("user-1").unwrap();
        assert_eq!(balances.len(), 1);
        assert_eq!(balances[0].available, Decimal::from(5));
        assert_eq!(balances[0].asset, "SOL");

        // The confirmed monitor is destroyed; its id no longer resolves
        assert!(matches!(
            registry.status(monitor.monitor_id),
            Err(MonitorError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn pending_transfer_does_not_credit() {
        let (registry, ledger, _dir) = setup(vec![Ok(vec![transfer(
            "sig-1",
            Decimal::from(5),
            ConfirmationState::Pending,
        )])]);
        let monitor = registry
            .start_monitor("user-1", "addr-1", Chain::Solana, None)
            .unwrap();

        registry.poll_step().await;

        assert!(ledger.balances("user-1").unwrap().is_empty());
        let state = registry.status(monitor.monitor_id).unwrap();
        assert_eq!(state.status, MonitorStatus::Pending);
    }

    #[tokio::test]
    async fn duplicate_transfer_credits_exactly_once() {
        let seen = transfer("sig-1", Decimal::from(5), ConfirmationState::Finalized);
        let (registry, ledger, _dir) = setup(vec![Ok(vec![seen.clone(), seen])]);
        registry
            .start_monitor("user-1", "addr-1", Chain::Solana, None)
            .unwrap();

        registry.poll_step().await;

        let balances = ledger.balances("user-1").unwrap();
        assert_eq!(balances[0].available, Decimal::from(5));
        assert_eq!(balances[0].total, Decimal::from(5));
    }

    #[tokio::test]
    async fn unavailable_reader_leaves_monitor_pending() {
        let (registry, ledger, _dir) = setup(vec![
            Err(ChainError::Unavailable("connection refused".to_string())),
            Ok(vec![transfer("sig-1", Decimal::from(2), ConfirmationState::Confirmed)]),
        ]);
        let monitor = registry
            .start_monitor("user-1", "addr-1", Chain::Solana, None)
            .unwrap();

        registry.poll_step().await;
        assert_eq!(
            registry.status(monitor.monitor_id).unwrap().status,
            MonitorStatus::Pending
        );
        assert!(ledger.balances("user-1").unwrap().is_empty());

        // Next sweep retries the same address, credits, and destroys the monitor
        registry.poll_step().await;
        assert!(matches!(
            registry.status(monitor.monitor_id),
            Err(MonitorError::NotFound(_))
        ));
        assert_eq!(ledger.balances("user-1").unwrap()[0].available, Decimal::from(2));
    }

    #[tokio::test]
    async fn expired_monitor_fails_without_credit() {
        let (registry, ledger, _dir) = setup(vec![Ok(vec![transfer(
            "sig-1",
            Decimal::from(5),
            ConfirmationState::Finalized,
        )])]);
        let monitor = registry
            .start_monitor("user-1", "addr-1", Chain::Solana, None)
            .unwrap();
        registry.expire_now(monitor.monitor_id);

        registry.poll_step().await;

        // Purged without crediting
        assert!(matches!(
            registry.status(monitor.monitor_id),
            Err(MonitorError::NotFound(_))
        ));
        assert!(ledger.balances("user-1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn unsupported_chain_is_rejected() {
        let (registry, _ledger, _dir) = setup(vec![]);
        let result = registry.start_monitor("user-1", "0xabc", Chain::Ethereum, None);
        assert!(matches!(result, Err(MonitorError::UnsupportedChain(_))));
    }

    #[tokio::test]
    async fn pending_monitors_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(LedgerEngine::new(
            LedgerDb::open(&dir.path().join("ledger.redb")).unwrap(),
        ));
        let monitor_db = Arc::new(MonitorDb::open(&dir.path().join("monitors.redb")).unwrap());

        let monitor_id = {
            let mut readers: HashMap<Chain, Arc<dyn ChainReader>> = HashMap::new();
            readers.insert(Chain::Solana, ScriptedReader::new(Chain::Solana, vec![]));
            let registry =
                MonitorRegistry::new(monitor_db.clone(), ledger.clone(), readers).unwrap();
            registry
                .start_monitor("user-1", "addr-1", Chain::Solana, None)
                .unwrap()
                .monitor_id
        };

        let mut readers: HashMap<Chain, Arc<dyn ChainReader>> = HashMap::new();
        readers.insert(
            Chain::Solana,
            ScriptedReader::new(
                Chain::Solana,
                vec![Ok(vec![transfer("sig-1", Decimal::from(3), ConfirmationState::Finalized)])],
            ),
        );
        let registry = Arc::new(MonitorRegistry::new(monitor_db, ledger.clone(), readers).unwrap());

        assert_eq!(
            registry.status(monitor_id).unwrap().status,
            MonitorStatus::Pending
        );
        registry.poll_step().await;
        assert!(matches!(
            registry.status(monitor_id),
            Err(MonitorError::NotFound(_))
        ));
        assert_eq!(ledger.balances("user-1").unwrap()[0].available, Decimal::from(3));
    }
}
