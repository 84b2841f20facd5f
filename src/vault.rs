// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Key vault: authenticated encryption of custodial private keys at rest.
//!
//! AES-256-GCM with a fresh random 96-bit nonce per seal. The blob layout is
//! `base64(nonce || ciphertext || tag)`. Key material is derived once from
//! `ENCRYPTION_SECRET` and cached for the process lifetime:
//!
//! - 64 hex characters: decoded directly as the 256-bit key
//! - base64 of exactly 32 bytes: decoded directly
//! - anything else: treated as a passphrase and stretched with
//!   PBKDF2-HMAC-SHA256
//!
//! Losing the configured secret makes all vaulted keys permanently
//! unrecoverable. That is an accepted tradeoff, not a bug.

use std::num::NonZeroU32;

use base64ct::{Base64, Encoding};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};

/// Domain-separation salt for passphrase stretching. Changing this value
/// invalidates every blob sealed under a passphrase secret.
const PBKDF2_SALT: &[u8] = b"trc20-custody-key-vault-v1";

/// PBKDF2 iteration count for passphrase secrets.
const PBKDF2_ITERATIONS: u32 = 600_000;

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("invalid encryption secret: {0}")]
    InvalidSecret(String),

    #[error("encryption failed")]
    EncryptionFailed,

    /// Tag mismatch or malformed blob. Never yields partial plaintext.
    #[error("decryption failed")]
    DecryptionFailed,
}

/// Process-lifetime vault handle holding the derived AEAD key.
pub struct KeyVault {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl KeyVault {
    /// Derive the vault key from the configured secret.
    pub fn from_secret(secret: &str) -> Result<Self, VaultError> {
        if secret.is_empty() {
            return Err(VaultError::InvalidSecret("secret must not be empty".into()));
        }

        let key_bytes = derive_key(secret);
        let unbound = UnboundKey::new(&AES_256_GCM, &key_bytes)
            .map_err(|_| VaultError::InvalidSecret("key derivation produced bad key".into()))?;

        Ok(Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
        })
    }

    /// Seal plaintext into a self-contained blob.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, VaultError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| VaultError::EncryptionFailed)?;
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let mut in_out = plaintext.to_vec();
        self.key
            .seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| VaultError::EncryptionFailed)?;

        let mut blob = Vec::with_capacity(NONCE_LEN + in_out.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&in_out);
        Ok(Base64::encode_string(&blob))
    }

    /// Open a blob produced by [`encrypt`](Self::encrypt). Fails closed on
    /// tag mismatch or malformed input.
    pub fn decrypt(&self, blob: &str) -> Result<Vec<u8>, VaultError> {
        let raw = Base64::decode_vec(blob).map_err(|_| VaultError::DecryptionFailed)?;
        if raw.len() < NONCE_LEN + AES_256_GCM.tag_len() {
            return Err(VaultError::DecryptionFailed);
        }

        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|_| VaultError::DecryptionFailed)?;

        let mut in_out = ciphertext.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| VaultError::DecryptionFailed)?;

        Ok(plaintext.to_vec())
    }
}

/// Resolve the secret into 32 bytes of key material.
fn derive_key(secret: &str) -> [u8; 32] {
    let mut key = [0u8; 32];

    if secret.len() == 64 {
        if let Ok(raw) = hex::decode(secret) {
            key.copy_from_slice(&raw);
            return key;
        }
    }

    if let Ok(raw) = Base64::decode_vec(secret) {
        if raw.len() == 32 {
            key.copy_from_slice(&raw);
            return key;
        }
    }

    // Arbitrary passphrase: stretch with a slow KDF.
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        NonZeroU32::new(PBKDF2_ITERATIONS).expect("nonzero iterations"),
        PBKDF2_SALT,
        secret.as_bytes(),
        &mut key,
    );
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX_SECRET: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    #[test]
    fn roundtrip_hex_secret() {
        let vault = KeyVault::from_secret(HEX_SECRET).unwrap();
        let blob = vault.encrypt(b"private-key-material").unwrap();
        assert_eq!(vault.decrypt(&blob).unwrap(), b"private-key-material");
    }

    #[test]
    fn roundtrip_base64_secret() {
        let secret = Base64::encode_string(&[7u8; 32]);
        let vault = KeyVault::from_secret(&secret).unwrap();
        let blob = vault.encrypt(b"hello").unwrap();
        assert_eq!(vault.decrypt(&blob).unwrap(), b"hello");
    }

    #[test]
    fn nonces_are_unique_per_seal() {
        let vault = KeyVault::from_secret(HEX_SECRET).unwrap();
        let a = vault.encrypt(b"same plaintext").unwrap();
        let b = vault.encrypt(b"same plaintext").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn tampered_blob_fails_closed() {
        let vault = KeyVault::from_secret(HEX_SECRET).unwrap();
        let blob = vault.encrypt(b"secret").unwrap();

        let mut raw = Base64::decode_vec(&blob).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let tampered = Base64::encode_string(&raw);

        assert!(matches!(
            vault.decrypt(&tampered),
            Err(VaultError::DecryptionFailed)
        ));
    }

    #[test]
    fn malformed_blob_fails_closed() {
        let vault = KeyVault::from_secret(HEX_SECRET).unwrap();
        assert!(matches!(
            vault.decrypt("not-base64!!"),
            Err(VaultError::DecryptionFailed)
        ));
        assert!(matches!(
            vault.decrypt(""),
            Err(VaultError::DecryptionFailed)
        ));
    }

    #[test]
    fn different_secrets_cannot_open_each_other() {
        let a = KeyVault::from_secret(HEX_SECRET).unwrap();
        let b = KeyVault::from_secret("correct horse battery staple").unwrap();
        let blob = a.encrypt(b"secret").unwrap();
        assert!(b.decrypt(&blob).is_err());
    }

    #[test]
    fn empty_secret_rejected() {
        assert!(matches!(
            KeyVault::from_secret(""),
            Err(VaultError::InvalidSecret(_))
        ));
    }
}
