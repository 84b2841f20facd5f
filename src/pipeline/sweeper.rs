// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Consolidation sweeper.
//!
//! Moves accumulated token balances from custodial deposit wallets to the
//! platform hot wallet. A wallet is swept only when its on-chain token
//! balance reaches the configured minimum, and only when it holds enough
//! native TRX to pay for the transfer; otherwise the cycle tops up its gas
//! from the platform wallet and leaves the sweep to a later cycle. Sweeps
//! never touch ledger balances; the user was credited at deposit time.

use std::sync::Arc;

use serde_json::json;
use tracing::{error, info, warn};

use crate::chain::ChainAdapter;
use crate::models::{AdminAction, WalletRecord};
use crate::store::LedgerStore;
use crate::task::PeriodicJob;
use crate::vault::KeyVault;

pub struct Sweeper<C: ChainAdapter> {
    store: Arc<LedgerStore>,
    chain: Arc<C>,
    vault: Arc<KeyVault>,
    /// Destination of swept funds.
    platform_address: String,
    /// Hex private key of the platform wallet, funds gas top-ups.
    platform_key: String,
    min_sweep_amount: u64,
    gas_topup_threshold: u64,
    gas_topup_amount: u64,
}

impl<C: ChainAdapter> Sweeper<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<LedgerStore>,
        chain: Arc<C>,
        vault: Arc<KeyVault>,
        platform_address: String,
        platform_key: String,
        min_sweep_amount: u64,
        gas_topup_threshold: u64,
        gas_topup_amount: u64,
    ) -> Self {
        Self {
            store,
            chain,
            vault,
            platform_address,
            platform_key,
            min_sweep_amount,
            gas_topup_threshold,
            gas_topup_amount,
        }
    }

    async fn sweep_all(&self) {
        let wallets = match self.store.list_wallets() {
            Ok(wallets) => wallets,
            Err(e) => {
                error!(error = %e, "failed to list wallets, skipping sweep cycle");
                return;
            }
        };

        for wallet in wallets {
            self.sweep_wallet(&wallet).await;
        }
    }

    async fn sweep_wallet(&self, wallet: &WalletRecord) {
        let token_balance = match self.chain.token_balance(&wallet.address).await {
            Ok(balance) => balance,
            Err(e) => {
                warn!(address = %wallet.address, error = %e, "token balance lookup failed");
                return;
            }
        };
        if token_balance < self.min_sweep_amount {
            return;
        }

        let native_balance = match self.chain.native_balance(&wallet.address).await {
            Ok(balance) => balance,
            Err(e) => {
                warn!(address = %wallet.address, error = %e, "native balance lookup failed");
                return;
            }
        };

        if native_balance < self.gas_topup_threshold {
            // Not enough TRX to pay for the transfer. Fund it and sweep on
            // a later cycle once the top-up has landed.
            self.top_up_gas(wallet).await;
            return;
        }

        let key_hex = match self.vault.decrypt(&wallet.encrypted_key) {
            Ok(plaintext) => match String::from_utf8(plaintext) {
                Ok(hex) => hex,
                Err(_) => {
                    error!(address = %wallet.address, "vaulted key is not utf-8, skipping wallet");
                    return;
                }
            },
            Err(e) => {
                error!(address = %wallet.address, error = %e, "key decryption failed, skipping wallet");
                return;
            }
        };

        match self
            .chain
            .send_token(&key_hex, &self.platform_address, token_balance)
            .await
        {
            Ok(tx_id) => {
                info!(
                    address = %wallet.address,
                    user_id = %wallet.user_id,
                    amount = token_balance,
                    tx_id,
                    "swept wallet to platform"
                );
                self.audit(
                    "sweep",
                    json!({
                        "user_id": wallet.user_id,
                        "address": wallet.address,
                        "amount": token_balance,
                        "tx_id": tx_id,
                    }),
                );
            }
            Err(e) => {
                warn!(address = %wallet.address, error = %e, "sweep broadcast failed");
            }
        }
    }

    async fn top_up_gas(&self, wallet: &WalletRecord) {
        match self
            .chain
            .send_native(&self.platform_key, &wallet.address, self.gas_topup_amount)
            .await
        {
            Ok(tx_id) => {
                info!(
                    address = %wallet.address,
                    amount = self.gas_topup_amount,
                    tx_id,
                    "gas top-up sent, sweep deferred"
                );
                self.audit(
                    "gas_topup",
                    json!({
                        "address": wallet.address,
                        "amount_sun": self.gas_topup_amount,
                        "tx_id": tx_id,
                    }),
                );
            }
            Err(e) => {
                warn!(address = %wallet.address, error = %e, "gas top-up failed");
            }
        }
    }

    fn audit(&self, action: &str, details: serde_json::Value) {
        if let Err(e) = self
            .store
            .append_admin_action(&AdminAction::new(action, details))
        {
            error!(action, error = %e, "audit append failed");
        }
    }
}

impl<C: ChainAdapter> PeriodicJob for Sweeper<C> {
    fn name(&self) -> &'static str {
        "sweeper"
    }

    async fn run_once(&self) {
        self.sweep_all().await;
    }
}
