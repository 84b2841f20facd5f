// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Withdrawal record lifecycle.
//!
//! `queued -> locked -> processing -> {completed | failed}`. Every
//! transition is one conditional write transaction keyed on the current
//! status, so concurrent workers can race on the same record and exactly
//! one wins. The balance debit happens on `locked -> processing` and the
//! compensating refund is written in the same transaction that marks the
//! record `failed`.

use chrono::{DateTime, Utc};
use redb::{ReadableDatabase, ReadableTable};
use serde_json::json;

use crate::models::{AdminAction, HistoryEntry, HistoryKind, WithdrawalRecord, WithdrawalStatus};

use super::{
    append_admin_action_in, append_history_in, make_queue_key, LedgerStore, StoreError,
    StoreResult, ADMIN_LOG, BALANCES, HISTORY, WITHDRAWALS, WITHDRAWAL_QUEUE,
};

/// Outcome of the `locked -> processing` debit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebitOutcome {
    /// Balance debited, record now `processing`.
    Debited,
    /// Balance changed since request time and no longer covers the amount.
    /// The record is left `locked` for manual review.
    InsufficientBalance,
    /// The record was not `locked` (another worker moved it first).
    WrongStatus,
}

impl LedgerStore {
    /// Insert a freshly queued withdrawal and its queue-index entry.
    pub fn insert_withdrawal(&self, record: &WithdrawalRecord) -> StoreResult<()> {
        let json = serde_json::to_vec(record)?;
        let queue_key = make_queue_key(record.created_at.timestamp_millis(), &record.id);

        let write_txn = self.db().begin_write()?;
        {
            let mut withdrawals = write_txn.open_table(WITHDRAWALS)?;
            withdrawals.insert(record.id.as_str(), json.as_slice())?;
            let mut queue = write_txn.open_table(WITHDRAWAL_QUEUE)?;
            queue.insert(queue_key.as_slice(), record.id.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn withdrawal(&self, id: &str) -> StoreResult<Option<WithdrawalRecord>> {
        let read_txn = self.db().begin_read()?;
        let table = read_txn.open_table(WITHDRAWALS)?;
        match table.get(id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Atomically claim up to `batch` of the oldest `queued` withdrawals by
    /// flipping them to `locked`. Two concurrent workers can never claim
    /// the same record: the flip and the queue-index removal commit
    /// together, and redb serializes writers.
    pub fn claim_queued(&self, batch: usize) -> StoreResult<Vec<WithdrawalRecord>> {
        let now = Utc::now();
        let write_txn = self.db().begin_write()?;
        let mut claimed = Vec::new();
        {
            let mut queue = write_txn.open_table(WITHDRAWAL_QUEUE)?;
            let mut withdrawals = write_txn.open_table(WITHDRAWALS)?;

            // Pass 1: walk the queue oldest-first, collecting claims and any
            // stale index entries pointing at records no longer queued.
            let mut to_remove: Vec<Vec<u8>> = Vec::new();
            let mut to_lock: Vec<WithdrawalRecord> = Vec::new();
            for entry in queue.iter()? {
                if to_lock.len() >= batch {
                    break;
                }
                let (key, id) = entry?;
                let key = key.value().to_vec();
                let id = id.value().to_string();

                let record = match withdrawals.get(id.as_str())? {
                    Some(value) => serde_json::from_slice::<WithdrawalRecord>(value.value())?,
                    None => {
                        to_remove.push(key);
                        continue;
                    }
                };

                to_remove.push(key);
                if record.status == WithdrawalStatus::Queued {
                    to_lock.push(record);
                }
            }

            // Pass 2: apply the mutations.
            for key in &to_remove {
                queue.remove(key.as_slice())?;
            }
            for mut record in to_lock {
                record.status = WithdrawalStatus::Locked;
                record.updated_at = now;
                let json = serde_json::to_vec(&record)?;
                withdrawals.insert(record.id.as_str(), json.as_slice())?;
                claimed.push(record);
            }
        }
        write_txn.commit()?;
        Ok(claimed)
    }

    /// `locked -> processing` with the balance debit, as one conditional
    /// transaction. Fails closed if the balance no longer covers the
    /// amount; nothing is written in that case.
    pub fn debit_for_processing(&self, id: &str) -> StoreResult<DebitOutcome> {
        let write_txn = self.db().begin_write()?;
        {
            let mut withdrawals = write_txn.open_table(WITHDRAWALS)?;
            let existing = withdrawals
                .get(id)?
                .map(|v| v.value().to_vec())
                .ok_or_else(|| StoreError::NotFound(format!("withdrawal {id}")))?;
            let mut record: WithdrawalRecord = serde_json::from_slice(&existing)?;

            if record.status != WithdrawalStatus::Locked {
                return Ok(DebitOutcome::WrongStatus);
            }

            let mut balances = write_txn.open_table(BALANCES)?;
            let current = balances
                .get(record.user_id.as_str())?
                .map(|v| v.value())
                .unwrap_or(0);
            if current < record.amount {
                return Ok(DebitOutcome::InsufficientBalance);
            }
            balances.insert(record.user_id.as_str(), current - record.amount)?;

            record.status = WithdrawalStatus::Processing;
            record.updated_at = Utc::now();
            let json = serde_json::to_vec(&record)?;
            withdrawals.insert(id, json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(DebitOutcome::Debited)
    }

    /// `processing -> completed`. Stores the chain transaction id, appends
    /// the user history entry and the audit record. Returns `false` if the
    /// record was not `processing`.
    pub fn complete_withdrawal(&self, id: &str, chain_tx_id: &str) -> StoreResult<bool> {
        let write_txn = self.db().begin_write()?;
        {
            let mut withdrawals = write_txn.open_table(WITHDRAWALS)?;
            let existing = withdrawals
                .get(id)?
                .map(|v| v.value().to_vec())
                .ok_or_else(|| StoreError::NotFound(format!("withdrawal {id}")))?;
            let mut record: WithdrawalRecord = serde_json::from_slice(&existing)?;

            if record.status != WithdrawalStatus::Processing {
                return Ok(false);
            }

            record.status = WithdrawalStatus::Completed;
            record.tx_id = Some(chain_tx_id.to_string());
            record.updated_at = Utc::now();
            let json = serde_json::to_vec(&record)?;
            withdrawals.insert(id, json.as_slice())?;

            let mut history = write_txn.open_table(HISTORY)?;
            append_history_in(
                &mut history,
                &HistoryEntry::new(
                    &record.user_id,
                    HistoryKind::Withdrawal,
                    record.amount,
                    Some(chain_tx_id.to_string()),
                ),
            )?;

            let mut admin_log = write_txn.open_table(ADMIN_LOG)?;
            append_admin_action_in(
                &mut admin_log,
                &AdminAction::new(
                    "withdrawal_completed",
                    json!({
                        "withdrawal_id": id,
                        "user_id": record.user_id,
                        "to_address": record.to_address,
                        "amount": record.amount,
                        "tx_id": chain_tx_id,
                    }),
                ),
            )?;
        }
        write_txn.commit()?;
        Ok(true)
    }

    /// Compensation: `processing -> failed` plus the balance refund, in one
    /// transaction, so the terminal state and the balance correction are
    /// never observed independently. Returns `false` if the record was not
    /// `processing`.
    pub fn fail_and_refund(&self, id: &str, reason: &str) -> StoreResult<bool> {
        let write_txn = self.db().begin_write()?;
        {
            let mut withdrawals = write_txn.open_table(WITHDRAWALS)?;
            let existing = withdrawals
                .get(id)?
                .map(|v| v.value().to_vec())
                .ok_or_else(|| StoreError::NotFound(format!("withdrawal {id}")))?;
            let mut record: WithdrawalRecord = serde_json::from_slice(&existing)?;

            if record.status != WithdrawalStatus::Processing {
                return Ok(false);
            }

            record.status = WithdrawalStatus::Failed;
            record.failure_reason = Some(reason.to_string());
            record.updated_at = Utc::now();
            let json = serde_json::to_vec(&record)?;
            withdrawals.insert(id, json.as_slice())?;

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
                    HistoryKind::WithdrawalRefund,
                    record.amount,
                    None,
                ),
            )?;
        }
        write_txn.commit()?;
        Ok(true)
    }

    /// Non-terminal withdrawals that have not moved since `cutoff` and have
    /// not yet been escalated.
    pub fn stale_withdrawals(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<WithdrawalRecord>> {
        let read_txn = self.db().begin_read()?;
        let table = read_txn.open_table(WITHDRAWALS)?;
        let mut stale = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let record: WithdrawalRecord = serde_json::from_slice(value.value())?;
            let stuck = matches!(
                record.status,
                WithdrawalStatus::Locked | WithdrawalStatus::Processing
            );
            if stuck && record.escalated_at.is_none() && record.updated_at < cutoff {
                stale.push(record);
            }
        }
        Ok(stale)
    }

    /// Mark a stuck withdrawal as escalated, exactly once, and append the
    /// audit record. Returns `false` if the record is terminal or already
    /// escalated.
    pub fn escalate_withdrawal(&self, id: &str) -> StoreResult<bool> {
        let write_txn = self.db().begin_write()?;
        {
            let mut withdrawals = write_txn.open_table(WITHDRAWALS)?;
            let existing = withdrawals
                .get(id)?
                .map(|v| v.value().to_vec())
                .ok_or_else(|| StoreError::NotFound(format!("withdrawal {id}")))?;
            let mut record: WithdrawalRecord = serde_json::from_slice(&existing)?;

            if record.status.is_terminal() || record.escalated_at.is_some() {
                return Ok(false);
            }

            record.escalated_at = Some(Utc::now());
            let json = serde_json::to_vec(&record)?;
            withdrawals.insert(id, json.as_slice())?;

            let mut admin_log = write_txn.open_table(ADMIN_LOG)?;
            append_admin_action_in(
                &mut admin_log,
                &AdminAction::new(
                    "withdrawal_stale",
                    json!({
                        "withdrawal_id": id,
                        "user_id": record.user_id,
                        "status": record.status,
                        "amount": record.amount,
                    }),
                ),
            )?;
        }
        write_txn.commit()?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::tests::temp_store;
    use super::*;

    fn queued(store: &LedgerStore, user: &str, amount: u64, age_secs: i64) -> String {
        let mut record = WithdrawalRecord::new_queued(user, "Tdest", amount);
        record.created_at = Utc::now() - chrono::Duration::seconds(age_secs);
        record.updated_at = record.created_at;
        store.insert_withdrawal(&record).unwrap();
        record.id
    }

    #[test]
    fn claim_is_oldest_first_and_bounded() {
        let (store, _dir) = temp_store();
        let oldest = queued(&store, "user-1", 10, 30);
        let middle = queued(&store, "user-1", 20, 20);
        let newest = queued(&store, "user-1", 30, 10);

        let claimed = store.claim_queued(2).unwrap();
        let ids: Vec<_> = claimed.iter().map(|w| w.id.clone()).collect();
        assert_eq!(ids, vec![oldest.clone(), middle.clone()]);
        assert!(claimed.iter().all(|w| w.status == WithdrawalStatus::Locked));

        // The remaining record is claimed on the next cycle.
        let rest = store.claim_queued(2).unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].id, newest);

        // Nothing left.
        assert!(store.claim_queued(2).unwrap().is_empty());
    }

    #[test]
    fn concurrent_claims_are_disjoint() {
        let (store, _dir) = temp_store();
        for i in 0..6 {
            queued(&store, "user-1", 10, 60 - i);
        }
        let store = Arc::new(store);

        let a = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || store.claim_queued(5).unwrap())
        };
        let b = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || store.claim_queued(5).unwrap())
        };
        let a = a.join().unwrap();
        let b = b.join().unwrap();

        assert_eq!(a.len() + b.len(), 6);
        for w in &a {
            assert!(b.iter().all(|other| other.id != w.id));
        }
    }

    #[test]
    fn debit_happens_on_processing_transition() {
        let (store, _dir) = temp_store();
        store.credit("user-1", 100).unwrap();
        let id = queued(&store, "user-1", 40, 1);

        // Request time reserves intent, not funds.
        assert_eq!(store.balance_of("user-1").unwrap(), 100);

        store.claim_queued(1).unwrap();
        assert_eq!(store.debit_for_processing(&id).unwrap(), DebitOutcome::Debited);
        assert_eq!(store.balance_of("user-1").unwrap(), 60);

        let record = store.withdrawal(&id).unwrap().unwrap();
        assert_eq!(record.status, WithdrawalStatus::Processing);
    }

    #[test]
    fn debit_fails_closed_when_balance_shrank() {
        let (store, _dir) = temp_store();
        store.credit("user-1", 100).unwrap();
        let id = queued(&store, "user-1", 40, 1);
        store.claim_queued(1).unwrap();

        // Balance spent elsewhere between request and confirm.
        assert!(store.try_debit("user-1", 80).unwrap());

        assert_eq!(
            store.debit_for_processing(&id).unwrap(),
            DebitOutcome::InsufficientBalance
        );
        // Record stays locked for manual review, balance untouched.
        let record = store.withdrawal(&id).unwrap().unwrap();
        assert_eq!(record.status, WithdrawalStatus::Locked);
        assert_eq!(store.balance_of("user-1").unwrap(), 20);
    }

    #[test]
    fn debit_requires_locked_status() {
        let (store, _dir) = temp_store();
        store.credit("user-1", 100).unwrap();
        let id = queued(&store, "user-1", 40, 1);

        // Still queued: not claimable for debit.
        assert_eq!(store.debit_for_processing(&id).unwrap(), DebitOutcome::WrongStatus);
    }

    #[test]
    fn complete_stores_tx_id_and_audit_trail() {
        let (store, _dir) = temp_store();
        store.credit("user-1", 100).unwrap();
        let id = queued(&store, "user-1", 40, 1);
        store.claim_queued(1).unwrap();
        store.debit_for_processing(&id).unwrap();

        assert!(store.complete_withdrawal(&id, "chain-tx-9").unwrap());

        let record = store.withdrawal(&id).unwrap().unwrap();
        assert_eq!(record.status, WithdrawalStatus::Completed);
        assert_eq!(record.tx_id.as_deref(), Some("chain-tx-9"));
        assert_eq!(store.balance_of("user-1").unwrap(), 60, "debit is permanent");

        let actions = store.list_admin_actions(10).unwrap();
        assert_eq!(actions[0].action, "withdrawal_completed");

        // Completing twice is a no-op.
        assert!(!store.complete_withdrawal(&id, "chain-tx-9").unwrap());
    }

    #[test]
    fn fail_and_refund_restores_balance_atomically() {
        let (store, _dir) = temp_store();
        store.credit("user-1", 100).unwrap();
        let id = queued(&store, "user-1", 40, 1);
        store.claim_queued(1).unwrap();
        store.debit_for_processing(&id).unwrap();
        assert_eq!(store.balance_of("user-1").unwrap(), 60);

        assert!(store.fail_and_refund(&id, "chain unavailable: timeout").unwrap());

        let record = store.withdrawal(&id).unwrap().unwrap();
        assert_eq!(record.status, WithdrawalStatus::Failed);
        assert_eq!(
            record.failure_reason.as_deref(),
            Some("chain unavailable: timeout")
        );
        // Debit + refund round-trip is a no-op on the balance.
        assert_eq!(store.balance_of("user-1").unwrap(), 100);

        // Refunding twice is impossible.
        assert!(!store.fail_and_refund(&id, "again").unwrap());
        assert_eq!(store.balance_of("user-1").unwrap(), 100);
    }

    #[test]
    fn reaper_escalates_stuck_records_once() {
        let (store, _dir) = temp_store();
        store.credit("user-1", 100).unwrap();
        let id = queued(&store, "user-1", 40, 3600);
        store.claim_queued(1).unwrap();

        // claim_queued touched updated_at; backdate it to look stale.
        let mut record = store.withdrawal(&id).unwrap().unwrap();
        record.updated_at = Utc::now() - chrono::Duration::hours(1);
        let write_txn = store.db().begin_write().unwrap();
        {
            let mut table = write_txn.open_table(WITHDRAWALS).unwrap();
            let json = serde_json::to_vec(&record).unwrap();
            table.insert(id.as_str(), json.as_slice()).unwrap();
        }
        write_txn.commit().unwrap();

        let cutoff = Utc::now() - chrono::Duration::minutes(15);
        let stale = store.stale_withdrawals(cutoff).unwrap();
        assert_eq!(stale.len(), 1);

        assert!(store.escalate_withdrawal(&id).unwrap());
        assert!(!store.escalate_withdrawal(&id).unwrap(), "escalation is one-shot");

        // Escalated records drop out of the stale listing.
        assert!(store.stale_withdrawals(cutoff).unwrap().is_empty());
    }
}
