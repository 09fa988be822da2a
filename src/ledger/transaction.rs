//! Ledger record types
//!
//! A `Transaction` is an append-only ledger entry. It is never mutated once
//! appended. The genesis transaction has no dependencies; several leaves may
//! coexist when devices commit concurrently.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

/// Identity of the party that signed a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signer {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Signer {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Transaction payload: text for string-only stores, bytes for blob-capable stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StoredPayload", into = "StoredPayload")]
pub enum Payload {
    Text(String),
    Blob(Vec<u8>),
}

impl Payload {
    /// Returns the payload as text. Blobs are decoded as UTF-8.
    pub fn to_text(&self) -> Result<String, std::string::FromUtf8Error> {
        match self {
            Payload::Text(text) => Ok(text.clone()),
            Payload::Blob(bytes) => String::from_utf8(bytes.clone()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Payload::Text(text) => text.len(),
            Payload::Blob(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// On-disk form of a payload; blobs travel as base64.
#[derive(Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
enum StoredPayload {
    Text(String),
    Blob(String),
}

impl From<Payload> for StoredPayload {
    fn from(payload: Payload) -> Self {
        match payload {
            Payload::Text(text) => StoredPayload::Text(text),
            Payload::Blob(bytes) => StoredPayload::Blob(STANDARD.encode(bytes)),
        }
    }
}

impl TryFrom<StoredPayload> for Payload {
    type Error = base64::DecodeError;

    fn try_from(stored: StoredPayload) -> Result<Self, Self::Error> {
        match stored {
            StoredPayload::Text(text) => Ok(Payload::Text(text)),
            StoredPayload::Blob(encoded) => Ok(Payload::Blob(STANDARD.decode(encoded)?)),
        }
    }
}

/// A committed ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique id (UUID v4 for locally produced transactions)
    pub id: String,
    /// Commit time in epoch milliseconds
    pub date: i64,
    /// Ids of the predecessor transactions
    pub deps: Vec<String>,
    /// Envelope/signing format version (1, 2 or 3)
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer: Option<Signer>,
    /// SHA-256 of the unencrypted envelope
    pub hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    pub payload: Payload,
}

impl Transaction {
    pub fn is_genesis(&self) -> bool {
        self.deps.is_empty()
    }
}

/// Pre-commit persistence unit used for crash recovery of uncommitted edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftRecord {
    pub version: u32,
    /// Monotonic position within the current draft
    pub seq: u64,
    /// Serialized manipulation (possibly an encryption envelope)
    pub data: String,
    pub encrypted: bool,
}
