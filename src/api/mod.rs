// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    ledger::{Balance, EntryType, HistoryPage, LedgerEntry},
    models::Chain,
    monitor::{DepositMonitor, MonitorStatus},
    ownership::ConnectedWallet,
    state::AppState,
};

pub mod health;
pub mod ledger;
pub mod monitors;
pub mod wallets;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/health", get(health::health))
        .route("/wallets/challenge", post(wallets::request_challenge))
        .route("/wallets/connect", post(wallets::connect_wallet))
        .route("/wallets/{user_id}", get(wallets::list_wallets))
        .route(
            "/wallets/{user_id}/{address}",
            delete(wallets::disconnect_wallet),
        )
        .route("/monitors", post(monitors::start_monitor))
        .route("/monitors/{monitor_id}", get(monitors::get_monitor))
        .route("/ledger/operation", post(ledger::ledger_operation))
        .route("/ledger/transfer", post(ledger::transfer))
        .route("/ledger/balances/{user_id}", get(ledger::get_balances))
        .route("/ledger/history/{user_id}", get(ledger::get_history))
        .with_state(state);

    Router::new()
        .nest("/v1", v1_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        wallets::request_challenge,
        wallets::connect_wallet,
        wallets::list_wallets,
        wallets::disconnect_wallet,
        monitors::start_monitor,
        monitors::get_monitor,
        ledger::ledger_operation,
        ledger::transfer,
        ledger::get_balances,
        ledger::get_history
    ),
    components(
        schemas(
            Chain,
            Balance,
            LedgerEntry,
            EntryType,
            HistoryPage,
            ConnectedWallet,
            DepositMonitor,
            MonitorStatus,
            health::HealthResponse,
            wallets::ChallengeRequest,
            wallets::ChallengeResponse,
            wallets::ConnectRequest,
            monitors::StartMonitorRequest,
            ledger::OperationKind,
            ledger::OperationRequest,
            ledger::TransferRequest,
            ledger::TransferResponse
        )
    ),
    tags(
        (name = "Health", description = "Service health"),
        (name = "Wallets", description = "Wallet ownership verification"),
        (name = "Monitors", description = "Deposit monitoring"),
        (name = "Ledger", description = "Internal balances and history")
    )
)]
struct ApiDoc;
