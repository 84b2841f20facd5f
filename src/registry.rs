// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallet registry: custodial address provisioning.
//!
//! One wallet per user. Provisioning mints a keypair locally, seals the
//! private key in the vault, and persists the record; the plaintext key
//! never leaves this function. Re-provisioning an existing user is a
//! no-op that returns the existing wallet, so callers can treat
//! provisioning as idempotent.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::info;

use crate::chain::ChainAdapter;
use crate::error::CustodyError;
use crate::models::{AdminAction, WalletRecord};
use crate::store::LedgerStore;
use crate::vault::KeyVault;

pub struct WalletRegistry<C: ChainAdapter> {
    store: Arc<LedgerStore>,
    chain: Arc<C>,
    vault: Arc<KeyVault>,
}

impl<C: ChainAdapter> WalletRegistry<C> {
    pub fn new(store: Arc<LedgerStore>, chain: Arc<C>, vault: Arc<KeyVault>) -> Self {
        Self {
            store,
            chain,
            vault,
        }
    }

    /// Provision a custodial deposit wallet for `user_id`.
    ///
    /// Returns the existing wallet unchanged if one is already registered.
    pub fn provision_wallet(
        &self,
        user_id: &str,
        note: Option<String>,
    ) -> Result<WalletRecord, CustodyError> {
        if user_id.trim().is_empty() {
            return Err(CustodyError::InvalidArgument(
                "user id must not be empty".into(),
            ));
        }

        if let Some(existing) = self.store.wallet_by_user(user_id)? {
            return Ok(existing);
        }

        let account = self.chain.create_account()?;
        let encrypted_key = self.vault.encrypt(account.private_key_hex.as_bytes())?;

        let now = Utc::now();
        let record = WalletRecord {
            user_id: user_id.to_string(),
            address: account.address.clone(),
            encrypted_key,
            note,
            created_at: now,
            updated_at: now,
        };
        self.store.upsert_wallet(&record)?;

        self.store.append_admin_action(&AdminAction::new(
            "wallet_provisioned",
            json!({
                "user_id": user_id,
                "address": account.address,
            }),
        ))?;

        info!(user_id, address = %account.address, "provisioned custodial wallet");
        Ok(record)
    }
}
