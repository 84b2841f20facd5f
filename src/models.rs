// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Record types persisted by the ledger store.
//!
//! All monetary amounts are integer base units: token amounts in 10^-6 USDT,
//! native amounts in sun (10^-6 TRX). Records are stored as JSON values in
//! redb tables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A custodial deposit wallet provisioned for one user.
///
/// At most one wallet exists per user; the on-chain address is globally
/// unique. The private key is stored only as a key-vault ciphertext blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletRecord {
    /// Owning user identifier.
    pub user_id: String,
    /// Custodial TRON address (base58check, `T...`).
    pub address: String,
    /// Vault-encrypted private key blob.
    pub encrypted_key: String,
    /// Optional operator note.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Deposit lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepositStatus {
    /// Observed on-chain but below the required confirmation depth.
    Pending,
    /// At or above the required confirmation depth, not yet credited.
    Confirmed,
    /// Credited to the user ledger balance. Terminal; entered exactly once.
    Applied,
}

/// One observed incoming token transfer, keyed by chain transaction id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositRecord {
    /// Chain transaction id (unique key).
    pub tx_id: String,
    pub user_id: String,
    /// Destination custodial address.
    pub address: String,
    /// Observed token amount in base units.
    pub amount: u64,
    pub status: DepositStatus,
    pub observed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<DateTime<Utc>>,
}

impl DepositRecord {
    pub fn new(
        tx_id: impl Into<String>,
        user_id: impl Into<String>,
        address: impl Into<String>,
        amount: u64,
        status: DepositStatus,
    ) -> Self {
        Self {
            tx_id: tx_id.into(),
            user_id: user_id.into(),
            address: address.into(),
            amount,
            status,
            observed_at: Utc::now(),
            applied_at: None,
        }
    }
}

/// Withdrawal lifecycle status.
///
/// `Queued` is initial; `Completed` and `Failed` are terminal. The user
/// balance is debited on the `Locked -> Processing` transition and refunded
/// if the broadcast fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    Queued,
    Locked,
    Processing,
    Completed,
    Failed,
}

impl WithdrawalStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// A user-requested token withdrawal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalRecord {
    /// Withdrawal id (UUID).
    pub id: String,
    pub user_id: String,
    /// Destination TRON address.
    pub to_address: String,
    /// Requested token amount in base units.
    pub amount: u64,
    pub status: WithdrawalStatus,
    /// Resulting chain transaction id once broadcast succeeds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// Set once by the stale-withdrawal reaper when the record is handed
    /// over to manual review.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WithdrawalRecord {
    /// Create a freshly queued withdrawal request.
    pub fn new_queued(user_id: impl Into<String>, to_address: impl Into<String>, amount: u64) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            to_address: to_address.into(),
            amount,
            status: WithdrawalStatus::Queued,
            tx_id: None,
            failure_reason: None,
            escalated_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Kind of a user-visible ledger history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    Deposit,
    Withdrawal,
    WithdrawalRefund,
}

/// One user-visible ledger movement, appended in the same store transaction
/// that moves the balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub entry_id: String,
    pub user_id: String,
    pub kind: HistoryKind,
    pub amount: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(
        user_id: impl Into<String>,
        kind: HistoryKind,
        amount: u64,
        tx_id: Option<String>,
    ) -> Self {
        Self {
            entry_id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            kind,
            amount,
            tx_id,
            created_at: Utc::now(),
        }
    }
}

/// Append-only audit record of a sensitive operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminAction {
    pub action_id: String,
    /// Action tag, e.g. `deposit_applied`, `withdrawal_completed`, `sweep`.
    pub action: String,
    /// Structured details for reconciliation.
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AdminAction {
    pub fn new(action: impl Into<String>, details: serde_json::Value) -> Self {
        Self {
            action_id: uuid::Uuid::new_v4().to_string(),
            action: action.into(),
            details,
            created_at: Utc::now(),
        }
    }
}
