//! # Crypto
//!
//! - `encryption`: passphrase-keyed payload encryption (Argon2id + AES-256-GCM)
//! - `signing`: the external signer seam and a digest-based reference signer
//! - `hashing`: SHA-256 hex digests

mod encryption;
mod errors;
mod hashing;
mod signing;

pub use encryption::{
    decrypt_string, derive_key, encrypt_string, generate_symmetric_key, Encryption,
    PassphraseEncryption, PassphraseProvider,
};
pub use errors::{CryptoError, CryptoResult};
pub use hashing::hash_sha256;
pub use signing::{DigestAuth, TransactionAuth};
