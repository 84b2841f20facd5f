// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Chain adapter: the narrow surface the pipelines need from a TRON node.
//!
//! Components depend only on the [`ChainAdapter`] trait and receive the
//! concrete client at construction, so tests can substitute a scripted
//! double for the RPC client.

pub mod address;
pub mod tron;

pub use tron::TronHttpClient;

/// A freshly minted account.
#[derive(Debug, Clone)]
pub struct ChainAccount {
    pub address: String,
    pub private_key_hex: String,
}

/// One incoming token transfer observed on chain.
#[derive(Debug, Clone)]
pub struct IncomingTransfer {
    pub tx_id: String,
    pub from: String,
    pub to: String,
    /// Token amount in base units.
    pub amount: u64,
    /// Chain block timestamp, milliseconds.
    pub block_timestamp: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// Transient RPC/network failure. Callers retry on the next cycle.
    #[error("chain unavailable: {0}")]
    Unavailable(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid private key: {0}")]
    InvalidKey(String),

    /// The node refused a broadcast.
    #[error("transaction rejected: {0}")]
    Rejected(String),
}

/// Operations the custody pipelines need from the chain.
///
/// All RPC-backed calls may fail with [`ChainError::Unavailable`]; callers
/// treat that as transient, never as a data error.
#[allow(async_fn_in_trait)]
pub trait ChainAdapter: Send + Sync + 'static {
    /// Mint a new account locally. Does not touch the network.
    fn create_account(&self) -> Result<ChainAccount, ChainError>;

    /// TRC-20 token balance of an address, base units.
    async fn token_balance(&self, address: &str) -> Result<u64, ChainError>;

    /// Native TRX balance of an address, sun.
    async fn native_balance(&self, address: &str) -> Result<u64, ChainError>;

    async fn current_block_height(&self) -> Result<u64, ChainError>;

    /// Block height containing `tx_id`, or `None` if the node does not know
    /// it (yet).
    async fn transaction_block_height(&self, tx_id: &str) -> Result<Option<u64>, ChainError>;

    /// Recent incoming token transfers to `address`. Order is whatever the
    /// node returns; crediting is idempotent per transaction id.
    async fn list_incoming_token_transfers(
        &self,
        address: &str,
    ) -> Result<Vec<IncomingTransfer>, ChainError>;

    /// Broadcast a token transfer signed with `from_private_key`. Returns
    /// the chain transaction id.
    async fn send_token(
        &self,
        from_private_key: &str,
        to: &str,
        amount: u64,
    ) -> Result<String, ChainError>;

    /// Broadcast a native TRX transfer. Returns the chain transaction id.
    async fn send_native(
        &self,
        from_private_key: &str,
        to: &str,
        amount: u64,
    ) -> Result<String, ChainError>;
}

#[cfg(test)]
pub mod testing {
    //! Scripted in-memory chain double for pipeline tests.

    use std::collections::HashMap;
    use std::sync::Mutex;

    use ring::rand::SystemRandom;

    use super::*;

    #[derive(Debug, Clone)]
    pub struct SentTransfer {
        pub from_key: String,
        pub to: String,
        pub amount: u64,
    }

    #[derive(Default)]
    struct MockState {
        height: u64,
        tx_heights: HashMap<String, u64>,
        transfers: HashMap<String, Vec<IncomingTransfer>>,
        token_balances: HashMap<String, u64>,
        native_balances: HashMap<String, u64>,
        sent_tokens: Vec<SentTransfer>,
        sent_native: Vec<SentTransfer>,
        next_send_results: Vec<Result<String, ChainError>>,
        height_unavailable: bool,
        list_unavailable_for: Vec<String>,
    }

    pub struct MockChain {
        rng: SystemRandom,
        state: Mutex<MockState>,
    }

    impl Default for MockChain {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MockChain {
        pub fn new() -> Self {
            Self {
                rng: SystemRandom::new(),
                state: Mutex::new(MockState::default()),
            }
        }

        pub fn set_height(&self, height: u64) {
            self.state.lock().unwrap().height = height;
        }

        pub fn fail_height_lookups(&self, fail: bool) {
            self.state.lock().unwrap().height_unavailable = fail;
        }

        pub fn fail_transfer_listing(&self, address: &str) {
            self.state
                .lock()
                .unwrap()
                .list_unavailable_for
                .push(address.to_string());
        }

        pub fn add_incoming_transfer(&self, transfer: IncomingTransfer, block_height: u64) {
            let mut state = self.state.lock().unwrap();
            state.tx_heights.insert(transfer.tx_id.clone(), block_height);
            state
                .transfers
                .entry(transfer.to.clone())
                .or_default()
                .push(transfer);
        }

        pub fn set_token_balance(&self, address: &str, amount: u64) {
            self.state
                .lock()
                .unwrap()
                .token_balances
                .insert(address.to_string(), amount);
        }

        pub fn set_native_balance(&self, address: &str, amount: u64) {
            self.state
                .lock()
                .unwrap()
                .native_balances
                .insert(address.to_string(), amount);
        }

        /// Queue the outcome of the next `send_token`/`send_native` call.
        pub fn push_send_result(&self, result: Result<String, ChainError>) {
            self.state.lock().unwrap().next_send_results.push(result);
        }

        pub fn sent_tokens(&self) -> Vec<SentTransfer> {
            self.state.lock().unwrap().sent_tokens.clone()
        }

        pub fn sent_native(&self) -> Vec<SentTransfer> {
            self.state.lock().unwrap().sent_native.clone()
        }

        fn next_send_result(state: &mut MockState) -> Result<String, ChainError> {
            if state.next_send_results.is_empty() {
                Ok(format!("mock-tx-{}", state.sent_tokens.len() + state.sent_native.len()))
            } else {
                state.next_send_results.remove(0)
            }
        }
    }

    impl ChainAdapter for MockChain {
        fn create_account(&self) -> Result<ChainAccount, ChainError> {
            let (address, private_key_hex) = address::generate_keypair(&self.rng)?;
            Ok(ChainAccount {
                address,
                private_key_hex,
            })
        }

        async fn token_balance(&self, address: &str) -> Result<u64, ChainError> {
            Ok(*self
                .state
                .lock()
                .unwrap()
                .token_balances
                .get(address)
                .unwrap_or(&0))
        }

        async fn native_balance(&self, address: &str) -> Result<u64, ChainError> {
            Ok(*self
                .state
                .lock()
                .unwrap()
                .native_balances
                .get(address)
                .unwrap_or(&0))
        }

        async fn current_block_height(&self) -> Result<u64, ChainError> {
            let state = self.state.lock().unwrap();
            if state.height_unavailable {
                return Err(ChainError::Unavailable("mock height failure".into()));
            }
            Ok(state.height)
        }

        async fn transaction_block_height(&self, tx_id: &str) -> Result<Option<u64>, ChainError> {
            let state = self.state.lock().unwrap();
            if state.height_unavailable {
                return Err(ChainError::Unavailable("mock height failure".into()));
            }
            Ok(state.tx_heights.get(tx_id).copied())
        }

        async fn list_incoming_token_transfers(
            &self,
            address: &str,
        ) -> Result<Vec<IncomingTransfer>, ChainError> {
            let state = self.state.lock().unwrap();
            if state.list_unavailable_for.iter().any(|a| a == address) {
                return Err(ChainError::Unavailable("mock listing failure".into()));
            }
            Ok(state.transfers.get(address).cloned().unwrap_or_default())
        }

        async fn send_token(
            &self,
            from_private_key: &str,
            to: &str,
            amount: u64,
        ) -> Result<String, ChainError> {
            let mut state = self.state.lock().unwrap();
            let result = Self::next_send_result(&mut state);
            if result.is_ok() {
                state.sent_tokens.push(SentTransfer {
                    from_key: from_private_key.to_string(),
                    to: to.to_string(),
                    amount,
                });
            }
            result
        }

        async fn send_native(
            &self,
            from_private_key: &str,
            to: &str,
            amount: u64,
        ) -> Result<String, ChainError> {
            let mut state = self.state.lock().unwrap();
            let result = Self::next_send_result(&mut state);
            if result.is_ok() {
                state.sent_native.push(SentTransfer {
                    from_key: from_private_key.to_string(),
                    to: to.to_string(),
                    amount,
                });
            }
            result
        }
    }
}
