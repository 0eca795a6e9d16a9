// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallet ownership endpoints: challenge issuance, signature verification,
//! connection listing and disconnect.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{error::ApiError, models::Chain, ownership::ConnectedWallet, state::AppState};

/// Request body for challenge issuance.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ChallengeRequest {
    /// Address the caller claims to control
    pub address: String,
}

/// An issued challenge the wallet must sign verbatim.
#[derive(Debug, Serialize, ToSchema)]
pub struct ChallengeResponse {
    pub address: String,
    /// Sign exactly these bytes
    pub message: String,
    pub expires_at: DateTime<Utc>,
}

/// Request body for wallet connection.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ConnectRequest {
    pub user_id: String,
    pub address: String,
    pub chain: Chain,
    /// Signature over the challenge message (hex for Ethereum,
    /// base58 or hex for Solana)
    pub signature: String,
}

/// Issue a signing challenge for an address.
///
/// Re-requesting replaces the prior challenge for the same address.
#[utoipa::path(
    post,
    path = "/v1/wallets/challenge",
    tag = "Wallets",
    request_body = ChallengeRequest,
    responses(
        (status = 200, description = "Challenge issued", body = ChallengeResponse)
    )
)]
pub async fn request_challenge(
    State(state): State<AppState>,
    Json(body): Json<ChallengeRequest>,
) -> Result<Json<ChallengeResponse>, ApiError> {
    if body.address.trim().is_empty() {
        return Err(ApiError::bad_request("address must not be empty"));
    }

    let challenge = state.verifier.issue_challenge(&body.address);
    Ok(Json(ChallengeResponse {
        address: challenge.address.clone(),
        message: challenge.message.clone(),
        expires_at: challenge.expires_at(),
    }))
}

/// Connect a wallet by proving ownership of its address.
#[utoipa::path(
    post,
    path = "/v1/wallets/connect",
    tag = "Wallets",
    request_body = ConnectRequest,
    responses(
        (status = 200, description = "Wallet connected", body = ConnectedWallet),
        (status = 409, description = "Address already claimed by another user"),
        (status = 410, description = "Challenge expired or never issued"),
        (status = 422, description = "Signature verification failed")
    )
)]
pub async fn connect_wallet(
    State(state): State<AppState>,
    Json(body): Json<ConnectRequest>,
) -> Result<Json<ConnectedWallet>, ApiError> {
    let wallet = state
        .verifier
        .connect(&body.user_id, &body.address, body.chain, &body.signature)?;
    Ok(Json(wallet))
}

/// List a user's connected wallets.
#[utoipa::path(
    get,
    path = "/v1/wallets/{user_id}",
    tag = "Wallets",
    params(
        ("user_id" = String, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "Connected wallets", body = [ConnectedWallet])
    )
)]
pub async fn list_wallets(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<ConnectedWallet>>, ApiError> {
    let wallets = state.verifier.connected_wallets(&user_id)?;
    Ok(Json(wallets))
}

/// Disconnect a wallet. Owner-only.
#[utoipa::path(
    delete,
    path = "/v1/wallets/{user_id}/{address}",
    tag = "Wallets",
    params(
        ("user_id" = String, Path, description = "User ID"),
        ("address" = String, Path, description = "Wallet address")
    ),
    responses(
        (status = 200, description = "Wallet disconnected", body = ConnectedWallet),
        (status = 404, description = "No such connection for this user")
    )
)]
pub async fn disconnect_wallet(
    State(state): State<AppState>,
    Path((user_id, address)): Path<(String, String)>,
) -> Result<Json<ConnectedWallet>, ApiError> {
    let wallet = state.verifier.disconnect(&user_id, &address)?;
    Ok(Json(wallet))
}
