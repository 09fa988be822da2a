use async_trait::async_trait;

use super::errors::LedgerResult;
use super::transaction::{DraftRecord, Transaction};

/// Durable storage for committed transactions and the pending draft.
///
/// Transactions are keyed by id and drafts by seq; appending an existing key
/// fails. Implementations need not be thread-safe: a store is driven from a
/// single logical thread.
#[async_trait(?Send)]
pub trait LedgerStore {
    /// Every committed transaction, in no particular order.
    async fn fetch(&self) -> LedgerResult<Vec<Transaction>>;

    async fn append(&self, transaction: &Transaction) -> LedgerResult<()>;

    /// Appends all or none.
    async fn append_many(&self, transactions: &[Transaction]) -> LedgerResult<()>;

    async fn append_to_draft(&self, record: &DraftRecord) -> LedgerResult<()>;

    /// Removes the draft record with `seq`. Unknown seqs are ignored.
    async fn remove_from_draft(&self, seq: u64) -> LedgerResult<()>;

    async fn fetch_draft(&self) -> LedgerResult<Vec<DraftRecord>>;

    async fn clear_draft(&self) -> LedgerResult<()>;

    async fn requires_sync(&self) -> LedgerResult<bool>;

    async fn set_requires_sync(&self, requires_sync: bool) -> LedgerResult<()>;

    /// Whether payloads are stored as bytes rather than text.
    fn supports_blob(&self) -> bool;
}
