// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger endpoints: balance operations, transfers, balances, history.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    error::ApiError,
    ledger::{Balance, EntryType, HistoryFilter, HistoryPage},
    models::{AdjustOperation, Chain},
    state::AppState,
};

/// Operation selector for `/v1/ledger/operation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Move available → locked
    Lock,
    /// Move locked → available
    Unlock,
    /// Administrative increase of available
    Add,
    /// Administrative decrease of available
    Subtract,
}

/// Request body for a single-row ledger operation.
#[derive(Debug, Deserialize, ToSchema)]
pub struct OperationRequest {
    pub user_id: String,
    pub asset: String,
    pub chain: Chain,
    #[schema(value_type = String)]
    pub amount: Decimal,
    pub operation: OperationKind,
}

/// Request body for an internal transfer.
#[derive(Debug, Deserialize, ToSchema)]
pub struct TransferRequest {
    pub from_user_id: String,
    pub to_user_id: String,
    pub asset: String,
    pub chain: Chain,
    #[schema(value_type = String)]
    pub amount: Decimal,
    #[serde(default)]
    pub description: Option<String>,
}

/// Both sides of a completed transfer.
#[derive(Debug, Serialize, ToSchema)]
pub struct TransferResponse {
    pub from: Balance,
    pub to: Balance,
}

/// Query parameters for ledger history.
#[derive(Debug, Deserialize, IntoParams)]
pub struct HistoryQuery {
    /// Only entries for this asset
    pub asset: Option<String>,
    /// Only entries of this type
    pub entry_type: Option<EntryType>,
    /// Opaque cursor from a previous page
    pub cursor: Option<String>,
    /// Page size (defaulted and clamped server-side)
    pub limit: Option<usize>,
}

/// Apply a lock, unlock or adjustment to one balance row.
#[utoipa::path(
    post,
    path = "/v1/ledger/operation",
    tag = "Ledger",
    request_body = OperationRequest,
    responses(
        (status = 200, description = "Updated balance", body = Balance),
        (status = 400, description = "Non-positive amount"),
        (status = 422, description = "Insufficient balance or invalid state")
    )
)]
pub async fn ledger_operation(
    State(state): State<AppState>,
    Json(body): Json<OperationRequest>,
) -> Result<Json<Balance>, ApiError> {
    let ledger = &state.ledger;
    let balance = match body.operation {
        OperationKind::Lock => {
            ledger
                .lock(&body.user_id, &body.asset, body.chain, body.amount)
                .await?
        }
        OperationKind::Unlock => {
            ledger
                .unlock(&body.user_id, &body.asset, body.chain, body.amount)
                .await?
        }
        OperationKind::Add => {
            ledger
                .adjust_balance(
                    &body.user_id,
                    &body.asset,
                    body.chain,
                    body.amount,
                    AdjustOperation::Add,
                )
                .await?
        }
        OperationKind::Subtract => {
            ledger
                .adjust_balance(
                    &body.user_id,
                    &body.asset,
                    body.chain,
                    body.amount,
                    AdjustOperation::Subtract,
                )
                .await?
        }
    };
    Ok(Json(balance))
}

/// Transfer between two users atomically.
#[utoipa::path(
    post,
    path = "/v1/ledger/transfer",
    tag = "Ledger",
    request_body = TransferRequest,
    responses(
        (status = 200, description = "Transfer completed", body = TransferResponse),
        (status = 400, description = "Non-positive amount"),
        (status = 422, description = "Insufficient balance or self-transfer")
    )
)]
pub async fn transfer(
    State(state): State<AppState>,
    Json(body): Json<TransferRequest>,
) -> Result<Json<TransferResponse>, ApiError> {
    let description = body
        .description
        .unwrap_or_else(|| "internal transfer".to_string());
    let (from, to) = state
        .ledger
        .transfer(
            &body.from_user_id,
            &body.to_user_id,
            &body.asset,
            body.chain,
            body.amount,
            &description,
        )
        .await?;
    Ok(Json(TransferResponse { from, to }))
}

/// All balance rows for a user.
#[utoipa::path(
    get,
    path = "/v1/ledger/balances/{user_id}",
    tag = "Ledger",
    params(
        ("user_id" = String, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "Balance rows", body = [Balance])
    )
)]
pub async fn get_balances(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<Balance>>, ApiError> {
    let balances = state.ledger.balances(&user_id)?;
    Ok(Json(balances))
}

/// Paginated ledger history for a user, newest first.
#[utoipa::path(
    get,
    path = "/v1/ledger/history/{user_id}",
    tag = "Ledger",
    params(
        ("user_id" = String, Path, description = "User ID"),
        HistoryQuery
    ),
    responses(
        (status = 200, description = "History page", body = HistoryPage)
    )
)]
pub async fn get_history(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryPage>, ApiError> {
    let filter = HistoryFilter {
        asset: query.asset,
        entry_type: query.entry_type,
        cursor: query.cursor,
        limit: query.limit.unwrap_or(0),
    };
    let page = state.ledger.history(&user_id, &filter)?;
    Ok(Json(page))
}
