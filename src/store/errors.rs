//! Store errors
//!
//! Integrity failures (`WrongDecryptionKey`, `WrongSignature`,
//! `InconsistentTransaction`, `UnsupportedVersion`) abort a whole load or
//! merge; nothing of the offending batch is applied or appended.

use thiserror::Error;

use crate::codec::CodecError;
use crate::crypto::CryptoError;
use crate::ledger::LedgerError;
use crate::manipulation::WireError;
use crate::model::ModelError;
use crate::sorter::SorterError;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    // ==================
    // Integrity
    // ==================
    #[error("transaction payload could not be decrypted with the current key")]
    WrongDecryptionKey,

    #[error("signature of transaction {0} does not verify")]
    WrongSignature(String),

    #[error("transaction {0} does not match its signed envelope")]
    InconsistentTransaction(String),

    #[error("unsupported transaction version: {0}")]
    UnsupportedVersion(u32),

    #[error("no genesis transaction among {count} transactions")]
    NoGenesisTransaction { count: usize },

    #[error("payload of transaction {id} is not a valid envelope: {message}")]
    PayloadDecoding { id: String, message: String },

    // ==================
    // Commit
    // ==================
    #[error("signing was withdrawn")]
    SigningWithdrawn,

    #[error("a signer is required when transactions are signed")]
    MissingSigner,

    // ==================
    // Entities
    // ==================
    #[error("entity not found: {0}")]
    EntityNotFound(String),

    // ==================
    // Wrapped
    // ==================
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl From<SorterError> for StoreError {
    fn from(err: SorterError) -> Self {
        match err {
            SorterError::NoGenesisTransaction { count } => StoreError::NoGenesisTransaction { count },
        }
    }
}

impl StoreError {
    /// Whether the error reports a ledger that fails integrity checks, as
    /// opposed to an I/O or usage problem.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            StoreError::WrongDecryptionKey
                | StoreError::WrongSignature(_)
                | StoreError::InconsistentTransaction(_)
                | StoreError::UnsupportedVersion(_)
                | StoreError::NoGenesisTransaction { .. }
                | StoreError::PayloadDecoding { .. }
        )
    }
}
