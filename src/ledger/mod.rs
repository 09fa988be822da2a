//! Transaction ledger
//!
//! - `transaction`: ledger record types
//! - `store`: the storage trait
//! - `memory`: shareable in-memory ledger
//! - `file`: checksummed append-only file ledger
//! - `log`, `record`: on-disk record framing and strict reader

mod errors;
mod file;
mod log;
mod memory;
mod record;
mod store;
mod transaction;

pub use errors::{LedgerError, LedgerErrorCode, LedgerResult, Severity};
pub use file::FileLedgerStore;
pub use memory::MemoryLedgerStore;
pub use store::LedgerStore;
pub use transaction::{DraftRecord, Payload, Signer, Transaction};
