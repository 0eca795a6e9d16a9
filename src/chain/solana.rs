// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Solana chain reader over JSON-RPC.
//!
//! Inbound transfers are discovered via `getSignaturesForAddress` and the
//! per-signature `confirmationStatus`, then sized by the lamport delta of
//! the watched address between `preBalances` and `postBalances` in the
//! transaction metadata. Signatures whose transaction errored never
//! surface.

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::models::Chain;

use super::{
    base_units_to_decimal, with_timeout, ChainError, ChainReader, ConfirmationState,
    InboundTransfer,
};

/// Lamports per SOL, as a decimal scale.
const LAMPORT_SCALE: u32 = 9;

// =============================================================================
// RPC envelope
// =============================================================================

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// `getBalance` wraps its value in a slot context.
#[derive(Debug, Deserialize)]
struct ContextValue<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignatureInfo {
    signature: String,
    err: Option<Value>,
    confirmation_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TransactionDetail {
    meta: Option<TransactionMeta>,
    transaction: TransactionEnvelope,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionMeta {
    err: Option<Value>,
    pre_balances: Vec<u64>,
    post_balances: Vec<u64>,
}

#[derive(Debug, Deserialize)]
struct TransactionEnvelope {
    message: TransactionMessage,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionMessage {
    account_keys: Vec<String>,
}

// =============================================================================
// SolanaReader
// =============================================================================

/// Read-only Solana client.
pub struct SolanaReader {
    client: Client,
    rpc_url: String,
}

impl SolanaReader {
    /// Create a reader for the given RPC endpoint.
    pub fn new(rpc_url: &str) -> Self {
        Self {
            client: Client::new(),
            rpc_url: rpc_url.to_string(),
        }
    }

    fn validate_address(address: &str) -> Result<(), ChainError> {
        let bytes = bs58::decode(address)
            .into_vec()
            .map_err(|e| ChainError::InvalidAddress(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(ChainError::InvalidAddress(format!(
                "expected 32-byte public key, got {} bytes",
                bytes.len()
            )));
        }
        Ok(())
    }

    async fn rpc_call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, ChainError> {
        with_timeout(async {
            let body = json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": method,
                "params": params,
            });

            let response = self
                .client
                .post(&self.rpc_url)
                .json(&body)
                .send()
                .await
                .map_err(|e| ChainError::Unavailable(e.to_string()))?;

            let envelope: RpcResponse<T> = response
                .json()
                .await
                .map_err(|e| ChainError::Unavailable(e.to_string()))?;

            if let Some(err) = envelope.error {
                return Err(ChainError::Unavailable(format!(
                    "RPC error {}: {}",
                    err.code, err.message
                )));
            }
            envelope
                .result
                .ok_or_else(|| ChainError::Unavailable("empty RPC result".to_string()))
        })
        .await
    }
}

#[async_trait]
impl ChainReader for SolanaReader {
    fn chain(&self) -> Chain {
        Chain::Solana
    }

    async fn get_balance(&self, address: &str) -> Result<Decimal, ChainError> {
        Self::validate_address(address)?;

        let balance: ContextValue<u64> = self
            .rpc_call(
                "getBalance",
                json!([address, { "commitment": "confirmed" }]),
            )
            .await?;

        base_units_to_decimal(u128::from(balance.value), LAMPORT_SCALE)
            .ok_or_else(|| ChainError::Unavailable("balance exceeds representable range".into()))
    }

    async fn recent_inbound_transfers(
        &self,
        address: &str,
        limit: usize,
    ) -> Result<Vec<InboundTransfer>, ChainError> {
        Self::validate_address(address)?;

        let signatures: Vec<SignatureInfo> = self
            .rpc_call(
                "getSignaturesForAddress",
                json!([address, { "limit": limit, "commitment": "confirmed" }]),
            )
            .await?;

        let mut transfers = Vec::new();
        for info in signatures {
            // Errored transactions moved no funds
            if info.err.is_some() {
                continue;
            }

            let detail: Option<TransactionDetail> = self
                .rpc_call(
                    "getTransaction",
                    json!([
                        info.signature,
                        {
                            "encoding": "json",
                            "commitment": "confirmed",
                            "maxSupportedTransactionVersion": 0,
                        }
                    ]),
                )
                .await?;

            let Some(detail) = detail else { continue };
            let Some(lamports) = inbound_lamports(&detail, address) else {
                continue;
            };
            let Some(amount) = base_units_to_decimal(u128::from(lamports), LAMPORT_SCALE) else {
                continue;
            };

            transfers.push(InboundTransfer {
                tx_id: info.signature,
                amount,
                confirmation: classify_status(info.confirmation_status.as_deref()),
            });
        }

        Ok(transfers)
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Map Solana's `confirmationStatus` onto a confirmation state.
///
/// Unknown or absent statuses stay pending so the transfer is re-examined
/// on a later poll rather than credited prematurely.
fn classify_status(status: Option<&str>) -> ConfirmationState {
    match status {
        Some("finalized") => ConfirmationState::Finalized,
        Some("confirmed") => ConfirmationState::Confirmed,
        _ => ConfirmationState::Pending,
    }
}

/// Lamports gained by `address` in a transaction, from the balance delta
/// at the address's account index. `None` when the transaction errored,
/// the address is not among the account keys, or the address lost funds.
fn inbound_lamports(detail: &TransactionDetail, address: &str) -> Option<u64> {
    let meta = detail.meta.as_ref()?;
    if meta.err.is_some() {
        return None;
    }

    let index = detail
        .transaction
        .message
        .account_keys
        .iter()
        .position(|key| key == address)?;

    let before = *meta.pre_balances.get(index)?;
    let after = *meta.post_balances.get(index)?;
    after.checked_sub(before).filter(|delta| *delta > 0)
}
