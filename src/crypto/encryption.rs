//! # Passphrase Encryption
//!
//! Payloads are encrypted into a self-describing JSON envelope:
//!
//! ```text
//! {"iv":"<hex>","salt":"<hex>","ciphertext":"<base64>"}
//! ```
//!
//! The key is derived from the passphrase with Argon2id over a random
//! 16-byte salt; the cipher is AES-256-GCM with a random 96-bit nonce.
//! Records written before salts were stored carry no `salt`; those are
//! decrypted with the configured fallback salt.
//!
//! Decryption never fails loudly: a wrong key, a tampered envelope or
//! malformed input all yield an empty string.

use std::rc::Rc;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use argon2::{Algorithm, Argon2, Params, Version};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};

use super::errors::{CryptoError, CryptoResult};

const SALT_LEN: usize = 16;
const IV_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Argon2id cost: 4 MiB memory, 2 passes, 1 lane
const ARGON2_MEMORY_KIB: u32 = 4096;
const ARGON2_ITERATIONS: u32 = 2;
const ARGON2_PARALLELISM: u32 = 1;

/// Opaque string encryption used for ledger payloads and drafts.
#[async_trait(?Send)]
pub trait Encryption {
    async fn encrypt(&self, data: &str) -> CryptoResult<String>;

    /// Returns the plaintext, or an empty string when `data` cannot be
    /// decrypted with the current key.
    async fn decrypt(&self, data: &str) -> String;
}

#[derive(Serialize, Deserialize)]
struct CipherEnvelope {
    iv: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    salt: Option<String>,
    ciphertext: String,
}

/// Random 256-bit key as hex.
pub fn generate_symmetric_key() -> String {
    let mut key = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut key);
    hex::encode(key)
}

/// Derives a 256-bit key from `passphrase` and `salt` with Argon2id.
pub fn derive_key(passphrase: &str, salt: &[u8]) -> CryptoResult<[u8; KEY_LEN]> {
    let params = Params::new(
        ARGON2_MEMORY_KIB,
        ARGON2_ITERATIONS,
        ARGON2_PARALLELISM,
        Some(KEY_LEN),
    )
    .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    let mut key = [0u8; KEY_LEN];
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password_into(passphrase.as_bytes(), salt, &mut key)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(key)
}

/// Encrypts `data` under a key derived from `passphrase` and a fresh salt.
pub fn encrypt_string(data: &str, passphrase: &str) -> CryptoResult<String> {
    let mut salt = [0u8; SALT_LEN];
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut iv);

    let key = derive_key(passphrase, &salt)?;
    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), data.as_bytes())
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    let envelope = CipherEnvelope {
        iv: hex::encode(iv),
        salt: Some(hex::encode(salt)),
        ciphertext: STANDARD.encode(ciphertext),
    };
    serde_json::to_string(&envelope).map_err(|e| CryptoError::Encryption(e.to_string()))
}

/// Decrypts an envelope produced by [`encrypt_string`]. `fallback_salt`
/// (hex) is used when the envelope carries no salt.
pub fn decrypt_string(data: &str, passphrase: &str, fallback_salt: Option<&str>) -> String {
    try_decrypt(data, passphrase, fallback_salt).unwrap_or_default()
}

fn try_decrypt(data: &str, passphrase: &str, fallback_salt: Option<&str>) -> Option<String> {
    let envelope: CipherEnvelope = serde_json::from_str(data).ok()?;
    let salt_hex = envelope
        .salt
        .as_deref()
        .filter(|s| !s.is_empty())
        .or(fallback_salt)?;

    let salt = hex::decode(salt_hex).ok()?;
    let iv = hex::decode(&envelope.iv).ok()?;
    if iv.len() != IV_LEN {
        return None;
    }
    let ciphertext = STANDARD.decode(&envelope.ciphertext).ok()?;

    let key = derive_key(passphrase, &salt).ok()?;
    let cipher = Aes256Gcm::new_from_slice(&key).ok()?;
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&iv), ciphertext.as_slice())
        .ok()?;
    String::from_utf8(plaintext).ok()
}

/// Supplies the passphrase at each use, so that it can be entered lazily
/// or rotated without rebuilding the store.
pub type PassphraseProvider = Rc<dyn Fn() -> String>;

/// [`Encryption`] keyed by a passphrase.
#[derive(Clone)]
pub struct PassphraseEncryption {
    fallback_salt: String,
    passphrase: PassphraseProvider,
}

impl std::fmt::Debug for PassphraseEncryption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassphraseEncryption")
            .field("fallback_salt", &self.fallback_salt)
            .finish_non_exhaustive()
    }
}

impl PassphraseEncryption {
    pub fn new(fallback_salt: impl Into<String>, passphrase: PassphraseProvider) -> Self {
        Self {
            fallback_salt: fallback_salt.into(),
            passphrase,
        }
    }

    /// Encryption with a fixed passphrase.
    pub fn with_passphrase(fallback_salt: impl Into<String>, passphrase: impl Into<String>) -> Self {
        let passphrase = passphrase.into();
        Self::new(fallback_salt, Rc::new(move || passphrase.clone()))
    }

    pub fn encrypt_with_passphrase(&self, data: &str, passphrase: &str) -> CryptoResult<String> {
        encrypt_string(data, passphrase)
    }

    pub fn decrypt_with_passphrase(&self, data: &str, passphrase: &str) -> String {
        decrypt_string(data, passphrase, Some(&self.fallback_salt))
    }
}

#[async_trait(?Send)]
impl Encryption for PassphraseEncryption {
    async fn encrypt(&self, data: &str) -> CryptoResult<String> {
        encrypt_string(data, &(self.passphrase)())
    }

    async fn decrypt(&self, data: &str) -> String {
        decrypt_string(data, &(self.passphrase)(), Some(&self.fallback_salt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FALLBACK_SALT: &str = "00112233445566778899aabbccddeeff";

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let encrypted = encrypt_string("hello ledger", "secret").unwrap();
        assert_ne!(encrypted, "hello ledger");
        assert_eq!(decrypt_string(&encrypted, "secret", None), "hello ledger");
    }

    #[test]
    fn test_envelope_shape() {
        let encrypted = encrypt_string("x", "secret").unwrap();
        let json: serde_json::Value = serde_json::from_str(&encrypted).unwrap();

        assert_eq!(json["iv"].as_str().unwrap().len(), IV_LEN * 2);
        assert_eq!(json["salt"].as_str().unwrap().len(), SALT_LEN * 2);
        assert!(STANDARD.decode(json["ciphertext"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn test_wrong_passphrase_yields_empty_string() {
        let encrypted = encrypt_string("hello", "A").unwrap();
        assert_eq!(decrypt_string(&encrypted, "B", None), "");
    }

    #[test]
    fn test_malformed_input_yields_empty_string() {
        assert_eq!(decrypt_string("not json", "A", None), "");
        assert_eq!(decrypt_string(r#"{"iv":"zz","ciphertext":""}"#, "A", None), "");
    }

    #[test]
    fn test_salts_differ_per_encryption() {
        let a = encrypt_string("same", "secret").unwrap();
        let b = encrypt_string("same", "secret").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_missing_salt_uses_fallback() {
        let salt = hex::decode(FALLBACK_SALT).unwrap();
        let key = derive_key("secret", &salt).unwrap();
        let iv = [7u8; IV_LEN];
        let ciphertext = Aes256Gcm::new_from_slice(&key)
            .unwrap()
            .encrypt(Nonce::from_slice(&iv), b"legacy".as_slice())
            .unwrap();
        let legacy = format!(
            r#"{{"iv":"{}","ciphertext":"{}"}}"#,
            hex::encode(iv),
            STANDARD.encode(ciphertext)
        );

        assert_eq!(decrypt_string(&legacy, "secret", None), "");
        assert_eq!(decrypt_string(&legacy, "secret", Some(FALLBACK_SALT)), "legacy");
    }

    #[test]
    fn test_generated_key_is_hex() {
        let key = generate_symmetric_key();
        assert_eq!(key.len(), KEY_LEN * 2);
        assert!(hex::decode(key).is_ok());
    }

    #[tokio::test]
    async fn test_passphrase_encryption_trait() {
        let encryption = PassphraseEncryption::with_passphrase(FALLBACK_SALT, "secret");
        let encrypted = encryption.encrypt("payload").await.unwrap();
        assert_eq!(encryption.decrypt(&encrypted).await, "payload");

        let other = PassphraseEncryption::with_passphrase(FALLBACK_SALT, "other");
        assert_eq!(other.decrypt(&encrypted).await, "");
        assert_eq!(other.decrypt_with_passphrase(&encrypted, "secret"), "payload");
    }
}
