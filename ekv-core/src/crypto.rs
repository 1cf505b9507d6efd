//! Password-derived encryption and key-name obfuscation.
//!
//! - The store key is `SHA256(password)` and feeds XChaCha20-Poly1305.
//! - Storage identifiers are `SHA256(SHA256(password) || SHA256(name))`, so
//!   the same name maps to the same identifier under the same password and
//!   reveals nothing about the name itself.
//! - Ciphertexts are `nonce (24 bytes) || sealed payload`; the nonce is drawn
//!   fresh for every encryption.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    Key, XChaCha20Poly1305, XNonce,
};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{EkvError, EkvResult};

/// Size of the symmetric key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of the XChaCha20-Poly1305 nonce in bytes.
pub const NONCE_SIZE: usize = 24;
/// Size of the Poly1305 authentication tag in bytes.
pub const TAG_SIZE: usize = 16;
/// Size of a SHA-256 digest in bytes.
pub const HASH_SIZE: usize = 32;

/// Source of cryptographic randomness for nonces and secure deletion.
pub trait Csprng: RngCore + CryptoRng + Send {}

impl<T: RngCore + CryptoRng + Send> Csprng for T {}

/// Symmetric key derived from the store password.
///
/// Zeroized on drop and never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct StoreKey([u8; KEY_SIZE]);

impl StoreKey {
    /// Derives the store key from a password.
    #[must_use]
    pub fn derive(password: &str) -> Self {
        Self(Sha256::digest(password.as_bytes()).into())
    }

    /// Returns the raw key bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Text encoding used for obfuscated storage identifiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyEncoding {
    /// Lowercase hex, 64 characters.
    #[default]
    Hex,
    /// URL-safe unpadded base64, 43 characters. For backends with tight
    /// key-length limits.
    Base64Url,
}

impl KeyEncoding {
    /// Encodes a digest.
    #[must_use]
    pub fn encode(self, digest: &[u8; HASH_SIZE]) -> String {
        match self {
            Self::Hex => hex::encode(digest),
            Self::Base64Url => URL_SAFE_NO_PAD.encode(digest),
        }
    }
}

/// Hashes a logical key name under the store key.
#[must_use]
pub fn hash_key_name(name: &str, key: &StoreKey) -> [u8; HASH_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hasher.update(Sha256::digest(name.as_bytes()));
    hasher.finalize().into()
}

/// Returns the storage identifier for a logical key name.
#[must_use]
pub fn obfuscate_key_name(name: &str, key: &StoreKey, encoding: KeyEncoding) -> String {
    encoding.encode(&hash_key_name(name, key))
}

/// Encrypts `payload` under `key` with a fresh nonce from `csprng`.
///
/// # Errors
///
/// Returns [`EkvError::EncryptionFailed`] if sealing fails.
///
/// # Panics
///
/// Panics if the random source fails. Without randomness no nonce can be
/// produced safely, so the process must not continue.
pub fn encrypt(payload: &[u8], key: &StoreKey, csprng: &mut dyn Csprng) -> EkvResult<Vec<u8>> {
    let mut nonce = [0u8; NONCE_SIZE];
    if let Err(err) = csprng.try_fill_bytes(&mut nonce) {
        panic!("random source failed while generating a nonce: {err}");
    }

    let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    let sealed = cipher
        .encrypt(XNonce::from_slice(&nonce), payload)
        .map_err(|_| EkvError::EncryptionFailed {
            context: "sealing payload".to_string(),
        })?;

    let mut out = Vec::with_capacity(NONCE_SIZE + sealed.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Decrypts a ciphertext produced by [`encrypt`].
///
/// # Errors
///
/// Returns [`EkvError::AuthenticationFailed`] if the input is too short or
/// does not authenticate under `key`.
pub fn decrypt(ciphertext: &[u8], key: &StoreKey) -> EkvResult<Vec<u8>> {
    if ciphertext.len() < NONCE_SIZE + TAG_SIZE {
        return Err(EkvError::AuthenticationFailed {
            context: format!("ciphertext too short ({} bytes)", ciphertext.len()),
        });
    }

    let (nonce, sealed) = ciphertext.split_at(NONCE_SIZE);
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    cipher
        .decrypt(XNonce::from_slice(nonce), sealed)
        .map_err(|_| EkvError::AuthenticationFailed {
            context: "cannot decrypt with password".to_string(),
        })
}
