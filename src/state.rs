// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::ledger::LedgerEngine;
use crate::monitor::MonitorRegistry;
use crate::ownership::OwnershipVerifier;

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<LedgerEngine>,
    pub registry: Arc<MonitorRegistry>,
    pub verifier: Arc<OwnershipVerifier>,
}

impl AppState {
    pub fn new(
        ledger: Arc<LedgerEngine>,
        registry: Arc<MonitorRegistry>,
        verifier: Arc<OwnershipVerifier>,
    ) -> Self {
        Self {
            ledger,
            registry,
            verifier,
        }
    }
}
