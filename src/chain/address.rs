// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! TRON account key and address helpers.
//!
//! A TRON address is the last 20 bytes of `Keccak256(pubkey)` prefixed with
//! the `0x41` version byte and base58check-encoded (`T...`).

use k256::ecdsa::SigningKey;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use ring::rand::{SecureRandom, SystemRandom};
use sha3::{Digest, Keccak256};

use super::ChainError;

/// TRON mainnet address version byte.
const ADDRESS_VERSION: u8 = 0x41;

/// Generate a fresh secp256k1 keypair, returning `(address, private_key_hex)`.
pub fn generate_keypair(rng: &SystemRandom) -> Result<(String, String), ChainError> {
    // A random 32-byte scalar is invalid with negligible probability; retry
    // rather than propagate.
    for _ in 0..8 {
        let mut raw = [0u8; 32];
        rng.fill(&mut raw)
            .map_err(|_| ChainError::InvalidKey("system rng failure".into()))?;

        if let Ok(key) = SigningKey::from_slice(&raw) {
            let address = address_from_signing_key(&key);
            return Ok((address, hex::encode(raw)));
        }
    }
    Err(ChainError::InvalidKey("could not generate a valid scalar".into()))
}

/// Parse a hex private key into a signing key.
pub fn signing_key_from_hex(private_key_hex: &str) -> Result<SigningKey, ChainError> {
    let raw = hex::decode(private_key_hex.trim())
        .map_err(|e| ChainError::InvalidKey(format!("bad private key hex: {e}")))?;
    SigningKey::from_slice(&raw)
        .map_err(|e| ChainError::InvalidKey(format!("bad private key: {e}")))
}

/// Derive the base58check address for a hex private key.
pub fn address_from_private_key(private_key_hex: &str) -> Result<String, ChainError> {
    Ok(address_from_signing_key(&signing_key_from_hex(private_key_hex)?))
}

fn address_from_signing_key(key: &SigningKey) -> String {
    let point = key.verifying_key().to_encoded_point(false);
    // Uncompressed SEC1 encoding: 0x04 || x || y. Hash the 64 coordinate bytes.
    let hash = Keccak256::digest(&point.as_bytes()[1..]);

    let mut payload = [0u8; 21];
    payload[0] = ADDRESS_VERSION;
    payload[1..].copy_from_slice(&hash[12..]);
    bs58::encode(payload).with_check().into_string()
}

/// Validate a base58check TRON address, returning its 20-byte payload.
pub fn decode_address(address: &str) -> Result<[u8; 20], ChainError> {
    let raw = bs58::decode(address)
        .with_check(Some(ADDRESS_VERSION))
        .into_vec()
        .map_err(|e| ChainError::InvalidAddress(format!("{address}: {e}")))?;
    if raw.len() != 21 {
        return Err(ChainError::InvalidAddress(format!(
            "{address}: expected 21 payload bytes, got {}",
            raw.len()
        )));
    }
    let mut out = [0u8; 20];
    out.copy_from_slice(&raw[1..]);
    Ok(out)
}

/// True if `address` is a well-formed TRON address.
pub fn is_valid_address(address: &str) -> bool {
    decode_address(address).is_ok()
}

/// ABI-encode the `transfer(address,uint256)` argument block.
pub fn encode_transfer_params(to: &str, amount: u64) -> Result<String, ChainError> {
    let payload = decode_address(to)?;
    let mut params = String::with_capacity(128);
    params.push_str(&"0".repeat(24));
    params.push_str(&hex::encode(payload));
    params.push_str(&format!("{amount:064x}"));
    Ok(params)
}

/// ABI-encode the `balanceOf(address)` argument block.
pub fn encode_balance_of_params(owner: &str) -> Result<String, ChainError> {
    let payload = decode_address(owner)?;
    let mut params = String::with_capacity(64);
    params.push_str(&"0".repeat(24));
    params.push_str(&hex::encode(payload));
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_address_is_valid() {
        let rng = SystemRandom::new();
        let (address, key_hex) = generate_keypair(&rng).unwrap();

        assert!(address.starts_with('T'), "TRON address should start with T");
        assert!(is_valid_address(&address));
        assert_eq!(key_hex.len(), 64);

        // Address derivation is deterministic from the key.
        assert_eq!(address_from_private_key(&key_hex).unwrap(), address);
    }

    #[test]
    fn known_usdt_contract_address_decodes() {
        let payload = decode_address(crate::config::MAINNET_USDT_CONTRACT).unwrap();
        assert_eq!(payload.len(), 20);
    }

    #[test]
    fn malformed_addresses_rejected() {
        assert!(!is_valid_address(""));
        assert!(!is_valid_address("not-an-address"));
        // Valid base58 but wrong version byte (Bitcoin address).
        assert!(!is_valid_address("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa"));
        // Checksum broken by flipping the last character.
        let (address, _) = generate_keypair(&SystemRandom::new()).unwrap();
        let mut bad = address.clone();
        bad.pop();
        bad.push(if address.ends_with('x') { 'y' } else { 'x' });
        assert!(!is_valid_address(&bad));
    }

    #[test]
    fn transfer_params_layout() {
        let rng = SystemRandom::new();
        let (address, _) = generate_keypair(&rng).unwrap();
        let params = encode_transfer_params(&address, 1_000_000).unwrap();

        assert_eq!(params.len(), 128);
        assert!(params.starts_with(&"0".repeat(24)));
        assert!(params.ends_with(&format!("{:064x}", 1_000_000u64)[48..]));
    }

    #[test]
    fn distinct_keys_distinct_addresses() {
        let rng = SystemRandom::new();
        let (a, _) = generate_keypair(&rng).unwrap();
        let (b, _) = generate_keypair(&rng).unwrap();
        assert_ne!(a, b);
    }
}
