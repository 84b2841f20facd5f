// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Deposit scanner.
//!
//! Each cycle walks every registered wallet, lists its recent incoming
//! token transfers, and credits confirmed ones. The cycle carries no state
//! between runs; idempotency lives entirely in the store (insert keyed on
//! tx id, exclusive apply transition), so observing the same transfer in
//! ten consecutive cycles credits once.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::chain::{ChainAdapter, IncomingTransfer};
use crate::models::{DepositRecord, DepositStatus, WalletRecord};
use crate::store::LedgerStore;
use crate::task::PeriodicJob;

pub struct DepositScanner<C: ChainAdapter> {
    store: Arc<LedgerStore>,
    chain: Arc<C>,
    min_deposit: u64,
    required_confirmations: u64,
}

impl<C: ChainAdapter> DepositScanner<C> {
    pub fn new(
        store: Arc<LedgerStore>,
        chain: Arc<C>,
        min_deposit: u64,
        required_confirmations: u64,
    ) -> Self {
        Self {
            store,
            chain,
            min_deposit,
            required_confirmations,
        }
    }

    async fn scan(&self) {
        // One head fetch per cycle. On failure the cycle still runs;
        // per-transfer depth falls back to 1 below.
        let head = match self.chain.current_block_height().await {
            Ok(height) => Some(height),
            Err(e) => {
                warn!(error = %e, "block height unavailable, assuming depth 1");
                None
            }
        };

        let wallets = match self.store.list_wallets() {
            Ok(wallets) => wallets,
            Err(e) => {
                error!(error = %e, "failed to list wallets, skipping scan cycle");
                return;
            }
        };

        for wallet in wallets {
            let transfers = match self
                .chain
                .list_incoming_token_transfers(&wallet.address)
                .await
            {
                Ok(transfers) => transfers,
                Err(e) => {
                    // One unreachable wallet must not poison the cycle.
                    warn!(address = %wallet.address, error = %e, "transfer listing failed");
                    continue;
                }
            };

            for transfer in transfers {
                self.process_transfer(&wallet, transfer, head).await;
            }
        }
    }

    async fn process_transfer(
        &self,
        wallet: &WalletRecord,
        transfer: IncomingTransfer,
        head: Option<u64>,
    ) {
        if transfer.amount < self.min_deposit {
            debug!(
                tx_id = %transfer.tx_id,
                amount = transfer.amount,
                "transfer below minimum deposit, ignored"
            );
            return;
        }

        // Already credited: nothing left to do for this tx id.
        match self.store.deposit(&transfer.tx_id) {
            Ok(Some(existing)) if existing.status == DepositStatus::Applied => return,
            Ok(_) => {}
            Err(e) => {
                error!(tx_id = %transfer.tx_id, error = %e, "deposit lookup failed");
                return;
            }
        }

        let depth = self.confirmation_depth(&transfer.tx_id, head).await;

        let status = if depth >= self.required_confirmations {
            DepositStatus::Confirmed
        } else {
            DepositStatus::Pending
        };
        let record = DepositRecord::new(
            &transfer.tx_id,
            &wallet.user_id,
            &wallet.address,
            transfer.amount,
            status,
        );
        if let Err(e) = self.store.insert_deposit_if_absent(&record) {
            error!(tx_id = %transfer.tx_id, error = %e, "deposit insert failed");
            return;
        }

        if depth < self.required_confirmations {
            debug!(
                tx_id = %transfer.tx_id,
                depth,
                required = self.required_confirmations,
                "deposit pending confirmation"
            );
            return;
        }

        match self.store.apply_deposit(&transfer.tx_id) {
            Ok(true) => {
                debug!(
                    tx_id = %transfer.tx_id,
                    user_id = %wallet.user_id,
                    amount = transfer.amount,
                    "deposit credited"
                );
            }
            Ok(false) => {} // another observer won the apply
            Err(e) => {
                error!(tx_id = %transfer.tx_id, error = %e, "deposit apply failed");
            }
        }
    }

    /// Blocks mined on top of the transfer's block. Defaults to 1 when the
    /// chain cannot answer, and to 0 when the node does not know the
    /// transaction yet.
    async fn confirmation_depth(&self, tx_id: &str, head: Option<u64>) -> u64 {
        let Some(head) = head else { return 1 };
        match self.chain.transaction_block_height(tx_id).await {
            Ok(Some(tx_height)) => head.saturating_sub(tx_height),
            Ok(None) => 0,
            Err(e) => {
                warn!(tx_id, error = %e, "tx height unavailable, assuming depth 1");
                1
            }
        }
    }
}

impl<C: ChainAdapter> PeriodicJob for DepositScanner<C> {
    fn name(&self) -> &'static str {
        "deposit-scanner"
    }

    async fn run_once(&self) {
        self.scan().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::testing::MockChain;
    use crate::store::tests::{sample_wallet, temp_store};

    fn scanner(
        min_deposit: u64,
        required: u64,
    ) -> (
        DepositScanner<MockChain>,
        Arc<LedgerStore>,
        Arc<MockChain>,
        tempfile::TempDir,
    ) {
        let (store, dir) = temp_store();
        let store = Arc::new(store);
        let chain = Arc::new(MockChain::new());
        let scanner = DepositScanner::new(
            Arc::clone(&store),
            Arc::clone(&chain),
            min_deposit,
            required,
        );
        (scanner, store, chain, dir)
    }

    fn transfer(tx_id: &str, to: &str, amount: u64) -> IncomingTransfer {
        IncomingTransfer {
            tx_id: tx_id.to_string(),
            from: "Tsender".to_string(),
            to: to.to_string(),
            amount,
            block_timestamp: 0,
        }
    }

    #[tokio::test]
    async fn confirmation_gating_credits_exactly_once() {
        let (scanner, store, chain, _dir) = scanner(1_000_000, 1);
        store.upsert_wallet(&sample_wallet("user-1", "Taddr1")).unwrap();

        // Transfer lands in the head block: depth 0, below threshold 1.
        chain.set_height(100);
        chain.add_incoming_transfer(transfer("tx-1", "Taddr1", 50_000_000), 100);

        scanner.run_once().await;
        assert_eq!(store.balance_of("user-1").unwrap(), 0);
        let stored = store.deposit("tx-1").unwrap().unwrap();
        assert_eq!(stored.status, DepositStatus::Pending);

        // One more block: depth 1 promotes and credits.
        chain.set_height(101);
        scanner.run_once().await;
        assert_eq!(store.balance_of("user-1").unwrap(), 50_000_000);
        let stored = store.deposit("tx-1").unwrap().unwrap();
        assert_eq!(stored.status, DepositStatus::Applied);

        // Re-observing the same transfer never credits again.
        scanner.run_once().await;
        assert_eq!(store.balance_of("user-1").unwrap(), 50_000_000);
        assert_eq!(store.list_history("user-1", 10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn transfers_below_minimum_are_ignored() {
        let (scanner, store, chain, _dir) = scanner(1_000_000, 1);
        store.upsert_wallet(&sample_wallet("user-1", "Taddr1")).unwrap();

        chain.set_height(10);
        chain.add_incoming_transfer(transfer("tx-dust", "Taddr1", 999_999), 5);

        scanner.run_once().await;
        assert_eq!(store.balance_of("user-1").unwrap(), 0);
        assert!(store.deposit("tx-dust").unwrap().is_none());
    }

    #[tokio::test]
    async fn height_failure_degrades_to_depth_one() {
        let (scanner, store, chain, _dir) = scanner(1_000_000, 1);
        store.upsert_wallet(&sample_wallet("user-1", "Taddr1")).unwrap();

        chain.add_incoming_transfer(transfer("tx-1", "Taddr1", 2_000_000), 5);
        chain.fail_height_lookups(true);

        // Head unavailable, depth defaults to 1, threshold 1 is met.
        scanner.run_once().await;
        assert_eq!(store.balance_of("user-1").unwrap(), 2_000_000);
    }

    #[tokio::test]
    async fn one_failing_wallet_does_not_poison_the_cycle() {
        let (scanner, store, chain, _dir) = scanner(1_000_000, 1);
        store.upsert_wallet(&sample_wallet("user-1", "Taddr1")).unwrap();
        store.upsert_wallet(&sample_wallet("user-2", "Taddr2")).unwrap();

        chain.set_height(10);
        chain.fail_transfer_listing("Taddr1");
        chain.add_incoming_transfer(transfer("tx-2", "Taddr2", 3_000_000), 5);

        scanner.run_once().await;
        assert_eq!(store.balance_of("user-1").unwrap(), 0);
        assert_eq!(store.balance_of("user-2").unwrap(), 3_000_000);
    }

    #[tokio::test]
    async fn higher_thresholds_hold_deposits_pending() {
        let (scanner, store, chain, _dir) = scanner(1_000_000, 19);
        store.upsert_wallet(&sample_wallet("user-1", "Taddr1")).unwrap();

        chain.set_height(110);
        chain.add_incoming_transfer(transfer("tx-1", "Taddr1", 5_000_000), 100);

        // Depth 10 < 19: stored but not credited.
        scanner.run_once().await;
        assert_eq!(store.balance_of("user-1").unwrap(), 0);
        assert_eq!(
            store.deposit("tx-1").unwrap().unwrap().status,
            DepositStatus::Pending
        );

        chain.set_height(119);
        scanner.run_once().await;
        assert_eq!(store.balance_of("user-1").unwrap(), 5_000_000);
    }
}
