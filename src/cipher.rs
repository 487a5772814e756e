//! Password sealing for capsule payloads.
//!
//! # Envelope
//!
//! ```text
//! "CVLT" | version (1 byte) | salt (16) | nonce (12) | ciphertext + tag
//! ```
//!
//! - **Key derivation**: Argon2id over the password and the per-payload salt
//! - **Encryption**: ChaCha20-Poly1305
//!
//! `open` never fails loudly. Any mismatch (foreign bytes, truncation, wrong
//! password) yields an empty plaintext, and callers treat empty as failure.

use anyhow::{anyhow, Result};
use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::{aead::Aead, ChaCha20Poly1305, Key, KeyInit, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;

const MAGIC: &[u8; 4] = b"CVLT";
const VERSION: u8 = 1;

/// Argon2id memory cost in KiB (19 MiB)
pub const ARGON2_MEMORY_KB: u32 = 19_456;

/// Argon2id iteration count
pub const ARGON2_ITERATIONS: u32 = 2;

/// Argon2id parallelism
pub const ARGON2_PARALLELISM: u32 = 1;

pub const SALT_LEN: usize = 16;
pub const NONCE_LEN: usize = 12;

const HEADER_LEN: usize = MAGIC.len() + 1 + SALT_LEN + NONCE_LEN;

fn derive_key(password: &str, salt: &[u8]) -> Result<[u8; 32]> {
    let params = Params::new(ARGON2_MEMORY_KB, ARGON2_ITERATIONS, ARGON2_PARALLELISM, Some(32))
        .map_err(|e| anyhow!("Invalid Argon2 params: {}", e))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = [0u8; 32];
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|e| anyhow!("Key derivation failed: {}", e))?;
    Ok(key)
}

/// Encrypt a payload under a password.
pub fn seal(plaintext: &[u8], password: &str) -> Result<Vec<u8>> {
    let mut salt = [0u8; SALT_LEN];
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut nonce);

    let key = derive_key(password, &salt)?;
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| anyhow!("Encryption failed: {}", e))?;

    let mut envelope = Vec::with_capacity(HEADER_LEN + ciphertext.len());
    envelope.extend_from_slice(MAGIC);
    envelope.push(VERSION);
    envelope.extend_from_slice(&salt);
    envelope.extend_from_slice(&nonce);
    envelope.extend_from_slice(&ciphertext);
    Ok(envelope)
}

/// Decrypt an envelope. Returns an empty vector on any mismatch.
pub fn open(envelope: &[u8], password: &str) -> Vec<u8> {
    if envelope.len() < HEADER_LEN || &envelope[..4] != MAGIC || envelope[4] != VERSION {
        return Vec::new();
    }

    let salt = &envelope[5..5 + SALT_LEN];
    let nonce = &envelope[5 + SALT_LEN..HEADER_LEN];
    let ciphertext = &envelope[HEADER_LEN..];

    let key = match derive_key(password, salt) {
        Ok(key) => key,
        Err(_) => return Vec::new(),
    };

    ChaCha20Poly1305::new(Key::from_slice(&key))
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .unwrap_or_default()
}
