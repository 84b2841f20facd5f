// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! TRON HTTP API client.
//!
//! Speaks the TronGrid-style HTTP interface:
//!
//! - `POST /wallet/triggerconstantcontract` — TRC-20 `balanceOf`
//! - `POST /wallet/getaccount` — native balance
//! - `POST /wallet/getnowblock` / `POST /wallet/gettransactioninfobyid` —
//!   confirmation depth
//! - `GET /v1/accounts/{address}/transactions/trc20` — incoming transfers
//! - `POST /wallet/triggersmartcontract` / `POST /wallet/createtransaction`
//!   + local signature + `POST /wallet/broadcasttransaction` — sends
//!
//! The node builds the unsigned transaction; we verify that its `txID`
//! matches `sha256(raw_data)`, sign that digest with a recoverable
//! secp256k1 signature (65 bytes, `v = recovery_id + 27`), and broadcast.

use std::time::Duration;

use k256::ecdsa::SigningKey;
use ring::rand::SystemRandom;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use super::address;
use super::{ChainAccount, ChainAdapter, ChainError, IncomingTransfer};

/// Fee limit applied to TRC-20 transfer transactions, in sun.
const FEE_LIMIT_SUN: u64 = 30_000_000;

/// Request timeout for all RPC calls.
const RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum transfers fetched per address scan.
const TRANSFER_PAGE_LIMIT: u32 = 100;

pub struct TronHttpClient {
    http: reqwest::Client,
    base: url::Url,
    api_key: Option<String>,
    token_contract: String,
    rng: SystemRandom,
}

impl TronHttpClient {
    pub fn new(
        base: url::Url,
        api_key: Option<String>,
        token_contract: impl Into<String>,
    ) -> Result<Self, ChainError> {
        let http = reqwest::Client::builder()
            .timeout(RPC_TIMEOUT)
            .build()
            .map_err(|e| ChainError::Unavailable(format!("build http client: {e}")))?;

        Ok(Self {
            http,
            base,
            api_key,
            token_contract: token_contract.into(),
            rng: SystemRandom::new(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<url::Url, ChainError> {
        self.base
            .join(path)
            .map_err(|e| ChainError::Unavailable(format!("bad endpoint {path}: {e}")))
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, ChainError> {
        let url = self.endpoint(path)?;
        let mut req = self.http.post(url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.header("TRON-PRO-API-KEY", key);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| ChainError::Unavailable(format!("{path}: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ChainError::Unavailable(format!("{path}: http {status}")));
        }

        resp.json()
            .await
            .map_err(|e| ChainError::Unavailable(format!("{path}: bad json: {e}")))
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value, ChainError> {
        let url = self.endpoint(path)?;
        let mut req = self.http.get(url).query(query);
        if let Some(key) = &self.api_key {
            req = req.header("TRON-PRO-API-KEY", key);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| ChainError::Unavailable(format!("{path}: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ChainError::Unavailable(format!("{path}: http {status}")));
        }

        resp.json()
            .await
            .map_err(|e| ChainError::Unavailable(format!("{path}: bad json: {e}")))
    }

    /// Sign the node-built transaction and broadcast it. Returns the
    /// transaction id.
    async fn sign_and_broadcast(
        &self,
        mut tx: Value,
        key: &SigningKey,
    ) -> Result<String, ChainError> {
        let raw_hex = tx
            .get("raw_data_hex")
            .and_then(Value::as_str)
            .ok_or_else(|| ChainError::Unavailable("node returned no raw_data_hex".into()))?;
        let raw = hex::decode(raw_hex)
            .map_err(|e| ChainError::Unavailable(format!("bad raw_data_hex: {e}")))?;

        let digest = Sha256::digest(&raw);
        let tx_id = hex::encode(digest);

        // Refuse to sign anything whose id does not match the raw payload.
        if let Some(node_id) = tx.get("txID").and_then(Value::as_str) {
            if !node_id.eq_ignore_ascii_case(&tx_id) {
                return Err(ChainError::Rejected(format!(
                    "node txID {node_id} does not match sha256(raw_data) {tx_id}"
                )));
            }
        }

        let (sig, recovery_id) = key
            .sign_prehash_recoverable(&digest)
            .map_err(|e| ChainError::InvalidKey(format!("signing failed: {e}")))?;

        let mut sig65 = sig.to_bytes().to_vec();
        sig65.push(recovery_id.to_byte() + 27);

        tx["signature"] = json!([hex::encode(sig65)]);

        let resp = self.post("/wallet/broadcasttransaction", tx).await?;
        if resp.get("result").and_then(Value::as_bool) == Some(true) {
            return Ok(tx_id);
        }

        let code = resp.get("code").and_then(Value::as_str).unwrap_or("UNKNOWN");
        let message = resp
            .get("message")
            .and_then(Value::as_str)
            .map(decode_node_message)
            .unwrap_or_default();
        Err(ChainError::Rejected(format!("{code}: {message}")))
    }
}

impl ChainAdapter for TronHttpClient {
    fn create_account(&self) -> Result<ChainAccount, ChainError> {
        let (address, private_key_hex) = address::generate_keypair(&self.rng)?;
        Ok(ChainAccount {
            address,
            private_key_hex,
        })
    }

    async fn token_balance(&self, addr: &str) -> Result<u64, ChainError> {
        let params = address::encode_balance_of_params(addr)?;
        let resp = self
            .post(
                "/wallet/triggerconstantcontract",
                json!({
                    "owner_address": addr,
                    "contract_address": self.token_contract,
                    "function_selector": "balanceOf(address)",
                    "parameter": params,
                    "visible": true,
                }),
            )
            .await?;

        if resp
            .pointer("/result/result")
            .and_then(Value::as_bool)
            != Some(true)
        {
            return Err(ChainError::Unavailable(format!(
                "balanceOf call failed for {addr}"
            )));
        }

        let word = resp
            .pointer("/constant_result/0")
            .and_then(Value::as_str)
            .ok_or_else(|| ChainError::Unavailable("balanceOf returned no result".into()))?;
        Ok(parse_uint_word(word))
    }

    async fn native_balance(&self, addr: &str) -> Result<u64, ChainError> {
        address::decode_address(addr)?;
        let resp = self
            .post("/wallet/getaccount", json!({ "address": addr, "visible": true }))
            .await?;
        // Unactivated accounts come back as an empty object.
        Ok(resp.get("balance").and_then(Value::as_u64).unwrap_or(0))
    }

    async fn current_block_height(&self) -> Result<u64, ChainError> {
        let resp = self.post("/wallet/getnowblock", json!({})).await?;
        resp.pointer("/block_header/raw_data/number")
            .and_then(Value::as_u64)
            .ok_or_else(|| ChainError::Unavailable("getnowblock returned no height".into()))
    }

    async fn transaction_block_height(&self, tx_id: &str) -> Result<Option<u64>, ChainError> {
        let resp = self
            .post("/wallet/gettransactioninfobyid", json!({ "value": tx_id }))
            .await?;
        Ok(resp.get("blockNumber").and_then(Value::as_u64))
    }

    async fn list_incoming_token_transfers(
        &self,
        addr: &str,
    ) -> Result<Vec<IncomingTransfer>, ChainError> {
        address::decode_address(addr)?;
        let resp = self
            .get(
                &format!("/v1/accounts/{addr}/transactions/trc20"),
                &[
                    ("only_to", "true".to_string()),
                    ("limit", TRANSFER_PAGE_LIMIT.to_string()),
                    ("contract_address", self.token_contract.clone()),
                ],
            )
            .await?;

        let rows = resp
            .get("data")
            .and_then(Value::as_array)
            .ok_or_else(|| ChainError::Unavailable("trc20 listing returned no data".into()))?;

        let mut transfers = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(tx_id) = row.get("transaction_id").and_then(Value::as_str) else {
                continue;
            };
            let Some(amount) = row
                .get("value")
                .and_then(Value::as_str)
                .and_then(|v| v.parse::<u64>().ok())
            else {
                continue;
            };
            transfers.push(IncomingTransfer {
                tx_id: tx_id.to_string(),
                from: row
                    .get("from")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                to: row
                    .get("to")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                amount,
                block_timestamp: row
                    .get("block_timestamp")
                    .and_then(Value::as_i64)
                    .unwrap_or_default(),
            });
        }
        Ok(transfers)
    }

    async fn send_token(
        &self,
        from_private_key: &str,
        to: &str,
        amount: u64,
    ) -> Result<String, ChainError> {
        let key = address::signing_key_from_hex(from_private_key)?;
        let owner = address::address_from_private_key(from_private_key)?;
        let params = address::encode_transfer_params(to, amount)?;

        let resp = self
            .post(
                "/wallet/triggersmartcontract",
                json!({
                    "owner_address": owner,
                    "contract_address": self.token_contract,
                    "function_selector": "transfer(address,uint256)",
                    "parameter": params,
                    "fee_limit": FEE_LIMIT_SUN,
                    "call_value": 0,
                    "visible": true,
                }),
            )
            .await?;

        if resp
            .pointer("/result/result")
            .and_then(Value::as_bool)
            != Some(true)
        {
            let message = resp
                .pointer("/result/message")
                .and_then(Value::as_str)
                .map(decode_node_message)
                .unwrap_or_else(|| "trigger refused".to_string());
            return Err(ChainError::Rejected(message));
        }

        let tx = resp
            .get("transaction")
            .cloned()
            .ok_or_else(|| ChainError::Unavailable("trigger returned no transaction".into()))?;
        self.sign_and_broadcast(tx, &key).await
    }

    async fn send_native(
        &self,
        from_private_key: &str,
        to: &str,
        amount: u64,
    ) -> Result<String, ChainError> {
        let key = address::signing_key_from_hex(from_private_key)?;
        let owner = address::address_from_private_key(from_private_key)?;
        address::decode_address(to)?;

        let tx = self
            .post(
                "/wallet/createtransaction",
                json!({
                    "owner_address": owner,
                    "to_address": to,
                    "amount": amount,
                    "visible": true,
                }),
            )
            .await?;

        if let Some(err) = tx.get("Error").and_then(Value::as_str) {
            return Err(ChainError::Rejected(err.to_string()));
        }

        self.sign_and_broadcast(tx, &key).await
    }
}

/// Parse one 256-bit ABI return word into a u64, saturating on overflow.
fn parse_uint_word(word: &str) -> u64 {
    let trimmed = word.trim_start_matches('0');
    if trimmed.is_empty() {
        return 0;
    }
    if trimmed.len() > 16 {
        return u64::MAX;
    }
    u64::from_str_radix(trimmed, 16).unwrap_or(u64::MAX)
}

/// Node error messages arrive hex-encoded; decode when possible.
fn decode_node_message(raw: &str) -> String {
    hex::decode(raw)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| raw.to_string())
}
