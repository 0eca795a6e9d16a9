// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Deposit monitor endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{error::ApiError, models::Chain, monitor::DepositMonitor, state::AppState};

/// Request body for starting a deposit monitor.
#[derive(Debug, Deserialize, ToSchema)]
pub struct StartMonitorRequest {
    pub user_id: String,
    pub address: String,
    pub chain: Chain,
    /// Advisory; a differing deposit is still credited, only logged
    #[schema(value_type = Option<String>)]
    pub expected_amount: Option<Decimal>,
}

/// Start watching an address for an inbound deposit.
#[utoipa::path(
    post,
    path = "/v1/monitors",
    tag = "Monitors",
    request_body = StartMonitorRequest,
    responses(
        (status = 200, description = "Monitor started", body = DepositMonitor),
        (status = 400, description = "Unsupported chain or bad request")
    )
)]
pub async fn start_monitor(
    State(state): State<AppState>,
    Json(body): Json<StartMonitorRequest>,
) -> Result<Json<DepositMonitor>, ApiError> {
    if body.address.trim().is_empty() {
        return Err(ApiError::bad_request("address must not be empty"));
    }

    let monitor = state.registry.start_monitor(
        &body.user_id,
        &body.address,
        body.chain,
        body.expected_amount,
    )?;
    Ok(Json(monitor))
}

/// Fetch the current state of a monitor.
#[utoipa::path(
    get,
    path = "/v1/monitors/{monitor_id}",
    tag = "Monitors",
    params(
        ("monitor_id" = Uuid, Path, description = "Monitor ID")
    ),
    responses(
        (status = 200, description = "Monitor state", body = DepositMonitor),
        (status = 404, description = "Monitor not found")
    )
)]
pub async fn get_monitor(
    State(state): State<AppState>,
    Path(monitor_id): Path<Uuid>,
) -> Result<Json<DepositMonitor>, ApiError> {
    let monitor = state.registry.status(monitor_id)?;
    Ok(Json(monitor))
}
