// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ethereum chain reader over an alloy HTTP provider.
//!
//! Inbound transfers are discovered by scanning recent blocks for native
//! transfers to the watched address and checking their receipts. A
//! successful receipt buried at least [`DEFAULT_CONFIRMATION_DEPTH`]
//! blocks deep counts as finalized; shallower transfers stay pending and
//! are picked up again on a later poll. Failed receipts never surface.

use std::str::FromStr;

use alloy::{
    consensus::Transaction as _,
    network::{Ethereum, TransactionResponse},
    primitives::Address,
    providers::{
        fillers::{BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller},
        Identity, Provider, ProviderBuilder, RootProvider,
    },
    rpc::types::BlockNumberOrTag,
};
use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::models::Chain;

use super::{
    base_units_to_decimal, with_timeout, ChainError, ChainReader, ConfirmationState,
    InboundTransfer,
};

/// HTTP provider type (with all fillers).
type HttpProvider = FillProvider<
    JoinFill<
        Identity,
        JoinFill<GasFiller, JoinFill<BlobGasFiller, JoinFill<NonceFiller, ChainIdFiller>>>,
    >,
    RootProvider<Ethereum>,
>;

/// Block depth at which a successful transfer counts as finalized.
const DEFAULT_CONFIRMATION_DEPTH: u64 = 12;

/// How many recent blocks to scan per query.
const DEFAULT_SCAN_BLOCKS: u64 = 40;

/// Wei per ETH, as a decimal scale.
const WEI_SCALE: u32 = 18;

/// Read-only Ethereum client.
pub struct EthereumReader {
    provider: HttpProvider,
    confirmation_depth: u64,
    scan_blocks: u64,
}

impl EthereumReader {
    /// Create a reader for the given RPC endpoint.
    pub fn new(rpc_url: &str) -> Result<Self, ChainError> {
        let url: url::Url = rpc_url
            .parse()
            .map_err(|e: url::ParseError| ChainError::Unavailable(format!("invalid RPC URL: {e}")))?;
        let provider = ProviderBuilder::new().connect_http(url);

        Ok(Self {
            provider,
            confirmation_depth: DEFAULT_CONFIRMATION_DEPTH,
            scan_blocks: DEFAULT_SCAN_BLOCKS,
        })
    }

    fn parse_address(address: &str) -> Result<Address, ChainError> {
        Address::from_str(address).map_err(|e| ChainError::InvalidAddress(e.to_string()))
    }
}

#[async_trait]
impl ChainReader for EthereumReader {
    fn chain(&self) -> Chain {
        Chain::Ethereum
    }

    async fn get_balance(&self, address: &str) -> Result<Decimal, ChainError> {
        let addr = Self::parse_address(address)?;

        let wei = with_timeout(async {
            self.provider
                .get_balance(addr)
                .await
                .map_err(|e| ChainError::Unavailable(e.to_string()))
        })
        .await?;

        let raw = u128::try_from(wei)
            .map_err(|_| ChainError::Unavailable("balance exceeds representable range".into()))?;
        base_units_to_decimal(raw, WEI_SCALE)
            .ok_or_else(|| ChainError::Unavailable("balance exceeds representable range".into()))
    }

    async fn recent_inbound_transfers(
        &self,
        address: &str,
        limit: usize,
    ) -> Result<Vec<InboundTransfer>, ChainError> {
        let addr = Self::parse_address(address)?;

        let head = with_timeout(async {
            self.provider
                .get_block_number()
                .await
                .map_err(|e| ChainError::Unavailable(e.to_string()))
        })
        .await?;

        let start = head.saturating_sub(self.scan_blocks.saturating_sub(1));
        let mut transfers = Vec::new();

        for number in (start..=head).rev() {
            let block = with_timeout(async {
                self.provider
                    .get_block_by_number(BlockNumberOrTag::Number(number))
                    .full()
                    .await
                    .map_err(|e| ChainError::Unavailable(e.to_string()))
            })
            .await?;

            let Some(block) = block else { continue };

            for tx in block.transactions.into_transactions() {
                if tx.to() != Some(addr) || tx.value().is_zero() {
                    continue;
                }

                let tx_hash = tx.tx_hash();
                let receipt = with_timeout(async {
                    self.provider
                        .get_transaction_receipt(tx_hash)
                        .await
                        .map_err(|e| ChainError::Unavailable(e.to_string()))
                })
                .await?;

                // No receipt yet or a reverted execution: not an inbound credit
                let Some(receipt) = receipt else { continue };
                if !receipt.status() {
                    continue;
                }

                let Ok(raw) = u128::try_from(tx.value()) else {
                    continue;
                };
                let Some(amount) = base_units_to_decimal(raw, WEI_SCALE) else {
                    continue;
                };

                let confirmations = head.saturating_sub(number) + 1;
                transfers.push(InboundTransfer {
                    tx_id: format!("{tx_hash:#x}"),
                    amount,
                    confirmation: classify_depth(confirmations, self.confirmation_depth),
                });

                if transfers.len() >= limit {
                    return Ok(transfers);
                }
            }
        }

        Ok(transfers)
    }
}

/// Map block-confirmation depth onto a confirmation state.
fn classify_depth(confirmations: u64, required: u64) -> ConfirmationState {
    if confirmations >= required {
        ConfirmationState::Finalized
    } else {
        ConfirmationState::Pending
    }
}
