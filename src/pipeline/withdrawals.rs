// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Withdrawal worker.
//!
//! Each cycle claims a batch of queued withdrawals, debits and broadcasts
//! them one at a time from the platform hot wallet, and records the
//! outcome. A failed broadcast refunds the debit in the same store
//! transaction that marks the record failed. A debit that no longer covers
//! the amount leaves the record locked and is reported loudly; the reaper
//! escalates it if nobody intervenes.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::chain::ChainAdapter;
use crate::error::CustodyError;
use crate::models::WithdrawalRecord;
use crate::store::{DebitOutcome, LedgerStore};
use crate::task::PeriodicJob;

pub struct WithdrawalWorker<C: ChainAdapter> {
    store: Arc<LedgerStore>,
    chain: Arc<C>,
    /// Hex private key of the platform hot wallet funding withdrawals.
    platform_key: String,
    batch_size: usize,
}

impl<C: ChainAdapter> WithdrawalWorker<C> {
    pub fn new(
        store: Arc<LedgerStore>,
        chain: Arc<C>,
        platform_key: String,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            chain,
            platform_key,
            batch_size,
        }
    }

    async fn drain_queue(&self) {
        let claimed = match self.store.claim_queued(self.batch_size) {
            Ok(claimed) => claimed,
            Err(e) => {
                error!(error = %e, "failed to claim withdrawal batch");
                return;
            }
        };

        for record in claimed {
            self.process(record).await;
        }
    }

    async fn process(&self, record: WithdrawalRecord) {
        let id = record.id.clone();

        match self.store.debit_for_processing(&id) {
            Ok(DebitOutcome::Debited) => {}
            Ok(DebitOutcome::InsufficientBalance) => {
                // Balance shrank between request and debit. The record
                // stays locked until an operator or the reaper handles it.
                let anomaly = CustodyError::InsufficientBalanceAtConfirm(id.clone());
                error!(
                    withdrawal_id = %id,
                    user_id = %record.user_id,
                    amount = record.amount,
                    error = %anomaly,
                    "left locked for review"
                );
                return;
            }
            Ok(DebitOutcome::WrongStatus) => {
                warn!(withdrawal_id = %id, "withdrawal moved concurrently, skipping");
                return;
            }
            Err(e) => {
                error!(withdrawal_id = %id, error = %e, "debit transaction failed");
                return;
            }
        }

        match self
            .chain
            .send_token(&self.platform_key, &record.to_address, record.amount)
            .await
        {
            Ok(tx_id) => {
                if let Err(e) = self.store.complete_withdrawal(&id, &tx_id) {
                    // Debited and broadcast, but the terminal write failed.
                    // The record stays processing and the reaper will
                    // escalate it; the tx id is in the log for reconciliation.
                    error!(withdrawal_id = %id, tx_id, error = %e, "completion write failed");
                    return;
                }
                info!(
                    withdrawal_id = %id,
                    user_id = %record.user_id,
                    tx_id,
                    amount = record.amount,
                    "withdrawal broadcast"
                );
            }
            Err(e) => {
                warn!(withdrawal_id = %id, error = %e, "broadcast failed, refunding");
                match self.store.fail_and_refund(&id, &e.to_string()) {
                    Ok(true) => {}
                    Ok(false) => {
                        warn!(withdrawal_id = %id, "refund skipped, record moved concurrently");
                    }
                    Err(store_err) => {
                        error!(
                            withdrawal_id = %id,
                            error = %store_err,
                            "refund transaction failed, record stuck processing"
                        );
                    }
                }
            }
        }
    }
}

impl<C: ChainAdapter> PeriodicJob for WithdrawalWorker<C> {
    fn name(&self) -> &'static str {
        "withdrawal-worker"
    }

    async fn run_once(&self) {
        self.drain_queue().await;
    }
}
