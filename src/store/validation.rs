//! Transaction validation
//!
//! Every transaction read from a ledger or received for merging passes
//! through [`TransactionValidator::validate`] before it is applied or
//! appended:
//! 1. payload text (blobs must be UTF-8)
//! 2. decryption, if encryption is configured
//! 3. version check and signature verification, if signing is configured
//! 4. envelope parsing and cross-check against the outer record
//! 5. hash check, if the record carries a hash

use crate::crypto::{hash_sha256, Encryption, TransactionAuth};
use crate::ledger::Transaction;

use super::envelope::TransactionEnvelope;
use super::errors::{StoreError, StoreResult};

/// Builds the canonical message that is signed for a transaction.
///
/// - v1 signs the envelope itself
/// - v2 and v3 sign a human-readable sentence naming the id and the
///   SHA-256 of the envelope
pub fn signing_message(
    version: u32,
    context: &str,
    id: &str,
    envelope: &str,
) -> StoreResult<String> {
    match version {
        1 => Ok(envelope.to_string()),
        2 => Ok(format!(
            "You are about to save data changes in {}.\n\
             Please sign this message to confirm the integrity of these changes.\n\
             The record ID is {}, and its hash is {}.",
            context,
            id,
            hash_sha256(envelope)
        )),
        3 => Ok(format!(
            "{}: Sign this message to confirm integrity of changes to be saved.\n\
             ID: {}, HASH: {}.",
            context,
            id,
            hash_sha256(envelope)
        )),
        other => Err(StoreError::UnsupportedVersion(other)),
    }
}

fn is_supported(version: u32) -> bool {
    (1..=3).contains(&version)
}

pub struct TransactionValidator<'a> {
    auth: Option<&'a dyn TransactionAuth>,
    encryption: Option<&'a dyn Encryption>,
}

impl<'a> TransactionValidator<'a> {
    pub fn new(
        auth: Option<&'a dyn TransactionAuth>,
        encryption: Option<&'a dyn Encryption>,
    ) -> Self {
        Self { auth, encryption }
    }

    /// Recovers the plaintext envelope of `tx`.
    pub async fn envelope_text(&self, tx: &Transaction) -> StoreResult<String> {
        let text = tx.payload.to_text().map_err(|e| StoreError::PayloadDecoding {
            id: tx.id.clone(),
            message: e.to_string(),
        })?;

        match self.encryption {
            Some(encryption) => {
                let decrypted = encryption.decrypt(&text).await;
                if decrypted.is_empty() {
                    return Err(StoreError::WrongDecryptionKey);
                }
                Ok(decrypted)
            }
            None => Ok(text),
        }
    }

    async fn verify_signature(&self, tx: &Transaction, envelope: &str) -> StoreResult<()> {
        let Some(auth) = self.auth else {
            return Ok(());
        };
        let (Some(signer), Some(signature)) = (&tx.signer, &tx.signature) else {
            return Err(StoreError::WrongSignature(tx.id.clone()));
        };

        let message = signing_message(tx.version, auth.signing_context_name(), &tx.id, envelope)?;
        if !auth.verify(&message, signature, &signer.address).await {
            return Err(StoreError::WrongSignature(tx.id.clone()));
        }
        Ok(())
    }

    /// Runs every check and returns the parsed envelope.
    pub async fn validate(&self, tx: &Transaction) -> StoreResult<TransactionEnvelope> {
        let text = self.envelope_text(tx).await?;

        if !is_supported(tx.version) {
            return Err(StoreError::UnsupportedVersion(tx.version));
        }
        self.verify_signature(tx, &text).await?;

        let envelope = TransactionEnvelope::parse(&tx.id, &text)?;
        if !envelope.matches(tx) {
            return Err(StoreError::InconsistentTransaction(tx.id.clone()));
        }
        if !tx.hash.is_empty() && tx.hash != hash_sha256(&text) {
            return Err(StoreError::InconsistentTransaction(tx.id.clone()));
        }
        Ok(envelope)
    }
}
