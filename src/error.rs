// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Service-level error taxonomy.
//!
//! Layer-local errors (store, chain, vault) converge here at the service
//! boundary. Transient chain failures are retried on the next scheduled
//! cycle by the pipelines and never treated as data errors.

use crate::chain::ChainError;
use crate::store::StoreError;
use crate::vault::VaultError;

#[derive(Debug, thiserror::Error)]
pub enum CustodyError {
    /// Transient RPC/network failure. Retried on the next cycle.
    #[error("chain unavailable: {0}")]
    ChainUnavailable(String),

    /// Malformed request (bad address, non-positive amount, missing user).
    /// Surfaced immediately to the caller, not retried.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Business-rule rejection at withdrawal request time.
    #[error("insufficient balance")]
    InsufficientBalance,

    /// Balance changed between request and debit time. An operational
    /// anomaly: the withdrawal is left for manual review, never silently
    /// failed.
    #[error("insufficient balance at confirm for withdrawal {0}")]
    InsufficientBalanceAtConfirm(String),

    /// Vault integrity failure. Fatal for the single wallet operation.
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    /// The chain rejected or failed to accept a sent transaction.
    #[error("broadcast failed: {0}")]
    BroadcastFailed(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<ChainError> for CustodyError {
    fn from(e: ChainError) -> Self {
        match e {
            ChainError::Unavailable(msg) => Self::ChainUnavailable(msg),
            ChainError::Rejected(msg) => Self::BroadcastFailed(msg),
            ChainError::InvalidAddress(msg) | ChainError::InvalidKey(msg) => {
                Self::InvalidArgument(msg)
            }
        }
    }
}

impl From<VaultError> for CustodyError {
    fn from(e: VaultError) -> Self {
        Self::DecryptionFailed(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_errors_map_to_taxonomy() {
        let e: CustodyError = ChainError::Unavailable("timeout".into()).into();
        assert!(matches!(e, CustodyError::ChainUnavailable(_)));

        let e: CustodyError = ChainError::Rejected("out of energy".into()).into();
        assert!(matches!(e, CustodyError::BroadcastFailed(_)));

        let e: CustodyError = ChainError::InvalidAddress("bad".into()).into();
        assert!(matches!(e, CustodyError::InvalidArgument(_)));
    }

    #[test]
    fn confirm_time_anomaly_names_the_withdrawal() {
        let e = CustodyError::InsufficientBalanceAtConfirm("w-1".into());
        assert_eq!(
            e.to_string(),
            "insufficient balance at confirm for withdrawal w-1"
        );
    }
}
