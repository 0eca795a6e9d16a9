// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use custody_core::api::router;
use custody_core::chain::{ChainReader, EthereumReader, SolanaReader};
use custody_core::config::Config;
use custody_core::ledger::LedgerEngine;
use custody_core::models::Chain;
use custody_core::monitor::MonitorRegistry;
use custody_core::ownership::OwnershipVerifier;
use custody_core::state::AppState;
use custody_core::storage::{LedgerDb, MonitorDb, WalletDb};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    if format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    let config = Config::from_env();

    // Storage
    let ledger_db = LedgerDb::open(&config.data_dir.join("ledger.redb"))
        .expect("Failed to open ledger database");
    let wallet_db = WalletDb::open(&config.data_dir.join("wallets.redb"))
        .expect("Failed to open wallet database");
    let monitor_db = MonitorDb::open(&config.data_dir.join("monitors.redb"))
        .expect("Failed to open monitor database");

    // Chain readers
    let mut readers: HashMap<Chain, Arc<dyn ChainReader>> = HashMap::new();
    readers.insert(
        Chain::Ethereum,
        Arc::new(
            EthereumReader::new(&config.eth_rpc_url).expect("Invalid Ethereum RPC URL"),
        ),
    );
    readers.insert(
        Chain::Solana,
        Arc::new(SolanaReader::new(&config.solana_rpc_url)),
    );

    // Core services
    let ledger = Arc::new(LedgerEngine::new(ledger_db));
    let registry = Arc::new(
        MonitorRegistry::new(Arc::new(monitor_db), ledger.clone(), readers)
            .expect("Failed to restore deposit monitors"),
    );
    let verifier = Arc::new(OwnershipVerifier::new(Arc::new(wallet_db)));

    // Background reconciliation sweep
    let shutdown = CancellationToken::new();
    tokio::spawn(registry.clone().run(shutdown.clone()));

    let state = AppState::new(ledger, registry, verifier);
    let app = router(state);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind server address");

    info!(%addr, "Custody core listening (docs at /docs)");

    axum::serve(listener, app)
        .with_graceful_shutdown({
            let shutdown = shutdown.clone();
            async move {
                tokio::signal::ctrl_c()
                    .await
                    .expect("Failed to listen for shutdown signal");
                info!("Shutdown signal received");
                shutdown.cancel();
            }
        })
        .await
        .expect("Server failed");
}
