//! Credential sealing (spec §1: "treat as a `seal(plaintext,key)` /
//! `open(sealed,key)` pair") and payment ID generation.
//!
//! AES-256-GCM, the standard AEAD choice in the Rust ecosystem for exactly
//! this shape of problem: a symmetric key held by the service, sealing a
//! single secret (the disposable Solana private key) at rest.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use eyre::{eyre, Result};
use rand::RngCore;

const NONCE_LEN: usize = 12;

/// Seal `plaintext` under `key` (32 bytes). Output is `nonce || ciphertext`,
/// hex-encoded so it composes with the rest of the config surface's hex
/// convention (spec §6 `encryption.walletKey`).
pub fn seal(plaintext: &[u8], key: &[u8; 32]) -> Result<String> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| eyre!("seal failed: {e}"))?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(hex::encode(out))
}

/// Inverse of [`seal`].
pub fn open(sealed_hex: &str, key: &[u8; 32]) -> Result<Vec<u8>> {
    let bytes = hex::decode(sealed_hex)?;
    if bytes.len() < NONCE_LEN {
        return Err(eyre!("sealed payload too short"));
    }
    let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| eyre!("open failed: {e}"))
}

/// `payment_id (prefix + random)` per spec §3: `pay_` followed by 16 random
/// bytes, hex-encoded.
pub fn generate_payment_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("pay_{}", hex::encode(bytes))
}
