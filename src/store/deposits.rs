// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Deposit record lifecycle.
//!
//! Deposits are keyed by chain transaction id. Insertion is idempotent
//! (conflict is a no-op that preserves the existing record) and the
//! `!applied -> applied` transition is a single write transaction that also
//! credits the balance, so a transfer can be observed any number of times
//! but credited exactly once.

use chrono::Utc;
use redb::{ReadableDatabase, ReadableTable};
use serde_json::json;

use crate::models::{AdminAction, DepositRecord, DepositStatus, HistoryEntry, HistoryKind};

use super::{
    append_admin_action_in, append_history_in, LedgerStore, StoreError, StoreResult, ADMIN_LOG,
    BALANCES, DEPOSITS, HISTORY,
};

impl LedgerStore {
    /// Insert a deposit observation unless one already exists for its
    /// transaction id. Returns whether the record was inserted.
    pub fn insert_deposit_if_absent(&self, record: &DepositRecord) -> StoreResult<bool> {
        let write_txn = self.db().begin_write()?;
        {
            let mut deposits = write_txn.open_table(DEPOSITS)?;
            if deposits.get(record.tx_id.as_str())?.is_some() {
                return Ok(false);
            }
            let json = serde_json::to_vec(record)?;
            deposits.insert(record.tx_id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(true)
    }

    pub fn deposit(&self, tx_id: &str) -> StoreResult<Option<DepositRecord>> {
        let read_txn = self.db().begin_read()?;
        let table = read_txn.open_table(DEPOSITS)?;
        match table.get(tx_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Exclusive `!applied -> applied` transition.
    ///
    /// The caller that wins this transition credits the user balance,
    /// appends the user-visible history entry, and appends the audit
    /// record, all in one transaction. Every other caller observes `false`
    /// and must not credit.
    pub fn apply_deposit(&self, tx_id: &str) -> StoreResult<bool> {
        let write_txn = self.db().begin_write()?;
        let applied = {
            let mut deposits = write_txn.open_table(DEPOSITS)?;

            let existing = deposits
                .get(tx_id)?
                .map(|v| v.value().to_vec())
                .ok_or_else(|| StoreError::NotFound(format!("deposit {tx_id}")))?;
            let mut record: DepositRecord = serde_json::from_slice(&existing)?;

            if record.status == DepositStatus::Applied {
                false
            } else {
                record.status = DepositStatus::Applied;
                record.applied_at = Some(Utc::now());
                let json = serde_json::to_vec(&record)?;
                deposits.insert(tx_id, json.as_slice())?;

                let mut balances = write_txn.open_table(BALANCES)?;
                let current = balances
                    .get(record.user_id.as_str())?
                    .map(|v| v.value())
                    .unwrap_or(0);
                balances.insert(record.user_id.as_str(), current.saturating_add(record.amount))?;

                let mut history = write_txn.open_table(HISTORY)?;
                append_history_in(
                    &mut history,
                    &HistoryEntry::new(
                        &record.user_id,
                        HistoryKind::Deposit,
                        record.amount,
                        Some(tx_id.to_string()),
                    ),
                )?;

                let mut admin_log = write_txn.open_table(ADMIN_LOG)?;
                append_admin_action_in(
                    &mut admin_log,
                    &AdminAction::new(
                        "deposit_applied",
                        json!({
                            "tx_id": tx_id,
                            "user_id": record.user_id,
                            "address": record.address,
                            "amount": record.amount,
                        }),
                    ),
                )?;

                true
            }
        };
        write_txn.commit()?;
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::tests::temp_store;
    use super::*;

    fn pending_deposit(tx_id: &str, amount: u64) -> DepositRecord {
        DepositRecord::new(tx_id, "user-1", "Taddr1", amount, DepositStatus::Pending)
    }

    #[test]
    fn insert_is_idempotent_and_preserves_status() {
        let (store, _dir) = temp_store();

        assert!(store
            .insert_deposit_if_absent(&pending_deposit("tx-1", 50))
            .unwrap());

        // A second observation with a different status is a no-op.
        let confirmed =
            DepositRecord::new("tx-1", "user-1", "Taddr1", 50, DepositStatus::Confirmed);
        assert!(!store.insert_deposit_if_absent(&confirmed).unwrap());

        let stored = store.deposit("tx-1").unwrap().unwrap();
        assert_eq!(stored.status, DepositStatus::Pending);
    }

    #[test]
    fn apply_credits_exactly_once() {
        let (store, _dir) = temp_store();
        store
            .insert_deposit_if_absent(&pending_deposit("tx-1", 50_000_000))
            .unwrap();

        assert!(store.apply_deposit("tx-1").unwrap());
        assert!(!store.apply_deposit("tx-1").unwrap(), "second apply loses");
        assert_eq!(store.balance_of("user-1").unwrap(), 50_000_000);

        let stored = store.deposit("tx-1").unwrap().unwrap();
        assert_eq!(stored.status, DepositStatus::Applied);
        assert!(stored.applied_at.is_some());

        // Exactly one history entry and one audit record.
        assert_eq!(store.list_history("user-1", 10).unwrap().len(), 1);
        assert_eq!(store.list_admin_actions(10).unwrap().len(), 1);
    }

    #[test]
    fn racing_appliers_produce_one_credit() {
        let (store, _dir) = temp_store();
        store
            .insert_deposit_if_absent(&pending_deposit("tx-race", 25))
            .unwrap();
        let store = Arc::new(store);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                store.apply_deposit("tx-race").unwrap()
            }));
        }
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(wins, 1, "exactly one caller may credit");
        assert_eq!(store.balance_of("user-1").unwrap(), 25);
    }

    #[test]
    fn apply_unknown_deposit_is_an_error() {
        let (store, _dir) = temp_store();
        assert!(matches!(
            store.apply_deposit("no-such-tx"),
            Err(StoreError::NotFound(_))
        ));
    }
}
