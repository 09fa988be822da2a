//! Transaction envelope
//!
//! The envelope is the signed, hashed and possibly encrypted text stored as a
//! transaction's payload. It repeats the outer record's metadata so that a
//! tampered record can be detected:
//!
//! ```text
//! {"version": 3, "id": "…", "date": 1700000000000, "deps": ["…"], "signer": {…}, "diff": […]}
//! ```
//!
//! The envelope is assembled by hand: keys keep this order, `signer` is
//! omitted when absent, and `diff` is the codec output spliced in verbatim.
//! Hashes and signatures are computed over these exact bytes.

use serde::Deserialize;
use serde_json::value::RawValue;

use crate::codec::CodecError;
use crate::ledger::{Signer, Transaction};

use super::errors::{StoreError, StoreResult};

/// Version written by [`build_envelope`].
pub const CURRENT_VERSION: u32 = 3;

fn json<T: serde::Serialize + ?Sized>(value: &T) -> StoreResult<String> {
    serde_json::to_string(value).map_err(|e| CodecError::Marshal(e.to_string()).into())
}

/// Assembles the envelope text for a new transaction.
pub fn build_envelope(
    version: u32,
    id: &str,
    date: i64,
    deps: &[String],
    signer: Option<&Signer>,
    diff: &str,
) -> StoreResult<String> {
    let mut fields = vec![
        ("version", json(&version)?),
        ("id", json(id)?),
        ("date", json(&date)?),
        ("deps", json(deps)?),
    ];
    if let Some(signer) = signer {
        fields.push(("signer", json(signer)?));
    }

    let mut out = String::with_capacity(diff.len() + 128);
    out.push('{');
    for (key, value) in fields {
        out.push('"');
        out.push_str(key);
        out.push_str("\": ");
        out.push_str(&value);
        out.push_str(", ");
    }
    out.push_str("\"diff\": ");
    out.push_str(diff);
    out.push('}');
    Ok(out)
}

/// A parsed envelope. `diff` keeps the original text.
#[derive(Debug, Deserialize)]
pub struct TransactionEnvelope {
    pub version: u32,
    pub id: String,
    pub date: i64,
    #[serde(default)]
    pub deps: Vec<String>,
    #[serde(default)]
    pub signer: Option<Signer>,
    diff: Box<RawValue>,
}

impl TransactionEnvelope {
    pub fn parse(tx_id: &str, text: &str) -> StoreResult<Self> {
        serde_json::from_str(text).map_err(|e| StoreError::PayloadDecoding {
            id: tx_id.to_string(),
            message: e.to_string(),
        })
    }

    /// The marshalled manipulation list.
    pub fn diff(&self) -> &str {
        self.diff.get()
    }

    /// Whether the envelope repeats the outer record's id, date, version and
    /// dependencies exactly.
    pub fn matches(&self, tx: &Transaction) -> bool {
        self.id == tx.id && self.date == tx.date && self.version == tx.version && self.deps == tx.deps
    }
}
