// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded ledger store backed by redb (pure Rust, ACID).
//!
//! The store is the single source of truth and sole synchronization point
//! for the pipelines: every state transition is one write transaction whose
//! guard is re-checked inside the transaction, so only one caller can win a
//! given transition even across processes sharing the file.
//!
//! ## Table Layout
//!
//! - `wallets`: user_id → serialized WalletRecord
//! - `wallet_addresses`: on-chain address → user_id
//! - `balances`: user_id → token balance (base units)
//! - `deposits`: chain tx id → serialized DepositRecord
//! - `withdrawals`: withdrawal id → serialized WithdrawalRecord
//! - `withdrawal_queue`: composite key (created_at_be|id) → withdrawal id
//! - `history`: composite key (user_id|!timestamp|entry_id) → HistoryEntry
//! - `admin_log`: sequence number → serialized AdminAction

mod deposits;
mod withdrawals;

pub use withdrawals::DebitOutcome;

use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use crate::models::{AdminAction, HistoryEntry, WalletRecord};

pub(crate) const WALLETS: TableDefinition<&str, &[u8]> = TableDefinition::new("wallets");
pub(crate) const WALLET_ADDRESSES: TableDefinition<&str, &str> =
    TableDefinition::new("wallet_addresses");
pub(crate) const BALANCES: TableDefinition<&str, u64> = TableDefinition::new("balances");
pub(crate) const DEPOSITS: TableDefinition<&str, &[u8]> = TableDefinition::new("deposits");
pub(crate) const WITHDRAWALS: TableDefinition<&str, &[u8]> = TableDefinition::new("withdrawals");
pub(crate) const WITHDRAWAL_QUEUE: TableDefinition<&[u8], &str> =
    TableDefinition::new("withdrawal_queue");
pub(crate) const HISTORY: TableDefinition<&[u8], &[u8]> = TableDefinition::new("history");
pub(crate) const ADMIN_LOG: TableDefinition<u64, &[u8]> = TableDefinition::new("admin_log");

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Build a composite key for the history table.
///
/// Format: `user_id | inverted_timestamp_be_bytes | entry_id`. The inverted
/// timestamp gives newest-first ordering on a forward scan.
fn make_history_key(user_id: &str, timestamp: i64, entry_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(user_id.len() + 1 + 8 + 1 + entry_id.len());
    key.extend_from_slice(user_id.as_bytes());
    key.push(b'|');
    key.extend_from_slice(&(!timestamp as u64).to_be_bytes());
    key.push(b'|');
    key.extend_from_slice(entry_id.as_bytes());
    key
}

fn make_history_prefix(user_id: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(user_id.len() + 1);
    prefix.extend_from_slice(user_id.as_bytes());
    prefix.push(b'|');
    prefix
}

fn make_history_prefix_end(user_id: &str) -> Vec<u8> {
    let mut end = make_history_prefix(user_id);
    end.extend_from_slice(&[0xFF; 20]);
    end
}

/// Build a composite key for the withdrawal queue, ordered oldest-first.
pub(crate) fn make_queue_key(timestamp_millis: i64, id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + id.len());
    key.extend_from_slice(&(timestamp_millis.max(0) as u64).to_be_bytes());
    key.extend_from_slice(id.as_bytes());
    key
}

/// Embedded ACID ledger store.
pub struct LedgerStore {
    db: Database,
}

impl LedgerStore {
    /// Open (or create) the store at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail.
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(WALLETS)?;
            let _ = write_txn.open_table(WALLET_ADDRESSES)?;
            let _ = write_txn.open_table(BALANCES)?;
            let _ = write_txn.open_table(DEPOSITS)?;
            let _ = write_txn.open_table(WITHDRAWALS)?;
            let _ = write_txn.open_table(WITHDRAWAL_QUEUE)?;
            let _ = write_txn.open_table(HISTORY)?;
            let _ = write_txn.open_table(ADMIN_LOG)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    pub(crate) fn db(&self) -> &Database {
        &self.db
    }

    // =========================================================================
    // Wallet registry
    // =========================================================================

    /// Insert or replace the wallet for a user (conflict target: user id).
    ///
    /// Address uniqueness is enforced through the address index: a stale
    /// address mapping from a previous provisioning is removed in the same
    /// transaction.
    pub fn upsert_wallet(&self, record: &WalletRecord) -> StoreResult<()> {
        let json = serde_json::to_vec(record)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut wallets = write_txn.open_table(WALLETS)?;
            let mut addresses = write_txn.open_table(WALLET_ADDRESSES)?;

            let previous_address = match wallets.get(record.user_id.as_str())? {
                Some(existing) => {
                    let old: WalletRecord = serde_json::from_slice(existing.value())?;
                    Some(old.address)
                }
                None => None,
            };

            if let Some(old_address) = previous_address {
                if old_address != record.address {
                    addresses.remove(old_address.as_str())?;
                }
            }

            wallets.insert(record.user_id.as_str(), json.as_slice())?;
            addresses.insert(record.address.as_str(), record.user_id.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn wallet_by_user(&self, user_id: &str) -> StoreResult<Option<WalletRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(WALLETS)?;
        match table.get(user_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    pub fn wallet_by_address(&self, address: &str) -> StoreResult<Option<WalletRecord>> {
        let read_txn = self.db.begin_read()?;
        let addresses = read_txn.open_table(WALLET_ADDRESSES)?;
        let user_id = match addresses.get(address)? {
            Some(value) => value.value().to_string(),
            None => return Ok(None),
        };
        drop(addresses);
        let wallets = read_txn.open_table(WALLETS)?;
        match wallets.get(user_id.as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// All registered wallets, scanned for the deposit and sweep cycles.
    pub fn list_wallets(&self) -> StoreResult<Vec<WalletRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(WALLETS)?;
        let mut wallets = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            wallets.push(serde_json::from_slice(value.value())?);
        }
        Ok(wallets)
    }

    // =========================================================================
    // User ledger balance
    // =========================================================================

    pub fn balance_of(&self, user_id: &str) -> StoreResult<u64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(BALANCES)?;
        Ok(table.get(user_id)?.map(|v| v.value()).unwrap_or(0))
    }

    /// Unconditional increment. Returns the new balance.
    pub fn credit(&self, user_id: &str, amount: u64) -> StoreResult<u64> {
        let write_txn = self.db.begin_write()?;
        let new_balance;
        {
            let mut table = write_txn.open_table(BALANCES)?;
            let current = table.get(user_id)?.map(|v| v.value()).unwrap_or(0);
            new_balance = current.saturating_add(amount);
            table.insert(user_id, new_balance)?;
        }
        write_txn.commit()?;
        Ok(new_balance)
    }

    /// Conditional debit: `balance -= amount` only if `balance >= amount`.
    /// Returns whether the debit won.
    pub fn try_debit(&self, user_id: &str, amount: u64) -> StoreResult<bool> {
        let write_txn = self.db.begin_write()?;
        let debited;
        {
            let mut table = write_txn.open_table(BALANCES)?;
            let current = table.get(user_id)?.map(|v| v.value()).unwrap_or(0);
            if current < amount {
                return Ok(false);
            }
            table.insert(user_id, current - amount)?;
            debited = true;
        }
        write_txn.commit()?;
        Ok(debited)
    }

    // =========================================================================
    // History and admin log
    // =========================================================================

    /// User-visible ledger history, newest first.
    pub fn list_history(&self, user_id: &str, limit: usize) -> StoreResult<Vec<HistoryEntry>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(HISTORY)?;

        let prefix = make_history_prefix(user_id);
        let end = make_history_prefix_end(user_id);

        let mut entries = Vec::new();
        for entry in table.range(prefix.as_slice()..end.as_slice())? {
            let (_, value) = entry?;
            entries.push(serde_json::from_slice(value.value())?);
            if entries.len() >= limit {
                break;
            }
        }
        Ok(entries)
    }

    /// Append an audit record outside any other transaction.
    pub fn append_admin_action(&self, action: &AdminAction) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(ADMIN_LOG)?;
            append_admin_action_in(&mut table, action)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Most recent audit records, newest first.
    pub fn list_admin_actions(&self, limit: usize) -> StoreResult<Vec<AdminAction>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ADMIN_LOG)?;
        let mut actions = Vec::new();
        for entry in table.iter()?.rev() {
            let (_, value) = entry?;
            actions.push(serde_json::from_slice(value.value())?);
            if actions.len() >= limit {
                break;
            }
        }
        Ok(actions)
    }
}

/// Append a history entry inside an open write transaction.
pub(crate) fn append_history_in(
    table: &mut redb::Table<&[u8], &[u8]>,
    entry: &HistoryEntry,
) -> StoreResult<()> {
    let key = make_history_key(&entry.user_id, entry.created_at.timestamp(), &entry.entry_id);
    let json = serde_json::to_vec(entry)?;
    table.insert(key.as_slice(), json.as_slice())?;
    Ok(())
}

/// Append an admin action inside an open write transaction.
pub(crate) fn append_admin_action_in(
    table: &mut redb::Table<u64, &[u8]>,
    action: &AdminAction,
) -> StoreResult<()> {
    let next_seq = table.last()?.map(|(k, _)| k.value() + 1).unwrap_or(0);
    let json = serde_json::to_vec(action)?;
    table.insert(next_seq, json.as_slice())?;
    Ok(())
}
