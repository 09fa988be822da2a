//! # Transaction Signing
//!
//! The store signs a canonical message built from the transaction id and the
//! SHA-256 of its envelope. The signer itself is external (a wallet, an HSM,
//! a user prompt); only the [`TransactionAuth`] seam is defined here.

use async_trait::async_trait;
use subtle::ConstantTimeEq;

use super::errors::CryptoResult;
use super::hashing::hash_sha256;

#[async_trait(?Send)]
pub trait TransactionAuth {
    /// Signs `message` on behalf of `signer_address`. May suspend for a
    /// long time, e.g. while a user confirms.
    async fn sign(&self, message: &str, signer_address: &str) -> CryptoResult<String>;

    async fn verify(&self, message: &str, signature: &str, signer_address: &str) -> bool;

    /// Application name embedded in signing messages.
    fn signing_context_name(&self) -> &str;
}

/// Reference signer: the signature is `sha256(address + ":" + message)`.
///
/// Proves integrity, not authorship. Intended for tests and single-user
/// local setups.
#[derive(Debug, Clone)]
pub struct DigestAuth {
    context: String,
}

impl DigestAuth {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
        }
    }

    fn digest(message: &str, signer_address: &str) -> String {
        hash_sha256(&format!("{}:{}", signer_address, message))
    }
}

#[async_trait(?Send)]
impl TransactionAuth for DigestAuth {
    async fn sign(&self, message: &str, signer_address: &str) -> CryptoResult<String> {
        Ok(Self::digest(message, signer_address))
    }

    async fn verify(&self, message: &str, signature: &str, signer_address: &str) -> bool {
        let expected = Self::digest(message, signer_address);
        expected.as_bytes().ct_eq(signature.as_bytes()).into()
    }

    fn signing_context_name(&self) -> &str {
        &self.context
    }
}
