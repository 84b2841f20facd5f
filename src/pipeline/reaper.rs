// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Stale-withdrawal reaper.
//!
//! A withdrawal sitting in `locked` or `processing` past the staleness
//! threshold means a worker died mid-flight or a debit anomaly was left for
//! review. The reaper never guesses at the right terminal state (the funds
//! may or may not have moved on chain); it marks the record escalated,
//! writes the audit entry, and reports it loudly so an operator reconciles
//! it by hand. Each record is escalated exactly once.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::error;

use crate::store::LedgerStore;
use crate::task::PeriodicJob;

pub struct StaleWithdrawalReaper {
    store: Arc<LedgerStore>,
    stale_after: Duration,
}

impl StaleWithdrawalReaper {
    pub fn new(store: Arc<LedgerStore>, stale_after: Duration) -> Self {
        Self { store, stale_after }
    }

    fn reap(&self) {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.stale_after).unwrap_or(chrono::Duration::zero());

        let stale = match self.store.stale_withdrawals(cutoff) {
            Ok(stale) => stale,
            Err(e) => {
                error!(error = %e, "stale withdrawal listing failed");
                return;
            }
        };

        for record in stale {
            match self.store.escalate_withdrawal(&record.id) {
                Ok(true) => {
                    error!(
                        withdrawal_id = %record.id,
                        user_id = %record.user_id,
                        status = ?record.status,
                        amount = record.amount,
                        stale_since = %record.updated_at,
                        "withdrawal stuck, escalated for manual review"
                    );
                }
                Ok(false) => {} // moved or already escalated since listing
                Err(e) => {
                    error!(withdrawal_id = %record.id, error = %e, "escalation failed");
                }
            }
        }
    }
}

impl PeriodicJob for StaleWithdrawalReaper {
    fn name(&self) -> &'static str {
        "stale-withdrawal-reaper"
    }

    async fn run_once(&self) {
        self.reap();
    }
}
