// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Custody service facade.
//!
//! The synchronous entry points callers use: provision a wallet, queue a
//! withdrawal, report a deposit, read balances and history. The background
//! pipelines do the asynchronous chain work; everything here only touches
//! the store and validates input up front.

use std::sync::Arc;

use tracing::info;

use crate::chain::{address, ChainAdapter};
use crate::error::CustodyError;
use crate::models::{
    AdminAction, DepositRecord, DepositStatus, HistoryEntry, WalletRecord, WithdrawalRecord,
};
use crate::registry::WalletRegistry;
use crate::store::LedgerStore;
use crate::vault::KeyVault;

pub struct CustodyService<C: ChainAdapter> {
    store: Arc<LedgerStore>,
    registry: WalletRegistry<C>,
    /// Token base units held back at request time to cover network fees.
    fee_reserve: u64,
}

impl<C: ChainAdapter> CustodyService<C> {
    pub fn new(
        store: Arc<LedgerStore>,
        chain: Arc<C>,
        vault: Arc<KeyVault>,
        fee_reserve: u64,
    ) -> Self {
        let registry = WalletRegistry::new(Arc::clone(&store), chain, vault);
        Self {
            store,
            registry,
            fee_reserve,
        }
    }

    pub fn provision_wallet(
        &self,
        user_id: &str,
        note: Option<String>,
    ) -> Result<WalletRecord, CustodyError> {
        self.registry.provision_wallet(user_id, note)
    }

    /// Queue a withdrawal request.
    ///
    /// The balance check here is advisory: funds are reserved only when the
    /// worker moves the record to `processing`. The fee reserve must be
    /// covered on top of the requested amount, so a user can never drain a
    /// balance to the point where the transfer fee is uncovered.
    pub fn request_withdrawal(
        &self,
        user_id: &str,
        to_address: &str,
        amount: u64,
    ) -> Result<WithdrawalRecord, CustodyError> {
        if amount == 0 {
            return Err(CustodyError::InvalidArgument(
                "amount must be positive".into(),
            ));
        }
        if !address::is_valid_address(to_address) {
            return Err(CustodyError::InvalidArgument(format!(
                "invalid destination address: {to_address}"
            )));
        }
        let wallet = self
            .store
            .wallet_by_user(user_id)?
            .ok_or_else(|| CustodyError::InvalidArgument(format!("unknown user: {user_id}")))?;
        if to_address == wallet.address {
            return Err(CustodyError::InvalidArgument(
                "destination is the user's own custodial address".into(),
            ));
        }

        let required = amount
            .checked_add(self.fee_reserve)
            .ok_or(CustodyError::InsufficientBalance)?;
        if self.store.balance_of(user_id)? < required {
            return Err(CustodyError::InsufficientBalance);
        }

        let record = WithdrawalRecord::new_queued(user_id, to_address, amount);
        self.store.insert_withdrawal(&record)?;
        info!(
            user_id,
            withdrawal_id = %record.id,
            amount,
            "withdrawal queued"
        );
        Ok(record)
    }

    /// Record an externally reported incoming transfer as a pending
    /// deposit. Idempotent per transaction id; confirmation and crediting
    /// remain the scanner's job. Returns whether the record was new.
    pub fn ingest_deposit_notification(
        &self,
        tx_id: &str,
        address: &str,
        amount: u64,
    ) -> Result<bool, CustodyError> {
        if tx_id.is_empty() || amount == 0 {
            return Err(CustodyError::InvalidArgument(
                "tx id and amount must be set".into(),
            ));
        }
        let wallet = self.store.wallet_by_address(address)?.ok_or_else(|| {
            CustodyError::InvalidArgument(format!("address is not a custodial wallet: {address}"))
        })?;

        let record = DepositRecord::new(
            tx_id,
            &wallet.user_id,
            address,
            amount,
            DepositStatus::Pending,
        );
        Ok(self.store.insert_deposit_if_absent(&record)?)
    }

    pub fn balance_of(&self, user_id: &str) -> Result<u64, CustodyError> {
        Ok(self.store.balance_of(user_id)?)
    }

    pub fn withdrawal(&self, id: &str) -> Result<Option<WithdrawalRecord>, CustodyError> {
        Ok(self.store.withdrawal(id)?)
    }

    pub fn list_history(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>, CustodyError> {
        Ok(self.store.list_history(user_id, limit)?)
    }

    pub fn list_admin_actions(&self, limit: usize) -> Result<Vec<AdminAction>, CustodyError> {
        Ok(self.store.list_admin_actions(limit)?)
    }
}
