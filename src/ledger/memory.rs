//! In-memory ledger
//!
//! Clones share the same underlying ledger, so two stores opened on clones
//! of one handle see each other's commits. Used by tests and by callers that
//! sync through some other channel.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use async_trait::async_trait;
use indexmap::IndexMap;

use super::errors::{LedgerError, LedgerResult};
use super::store::LedgerStore;
use super::transaction::{DraftRecord, Transaction};

#[derive(Debug, Default)]
struct MemoryLedger {
    transactions: IndexMap<String, Transaction>,
    draft: BTreeMap<u64, DraftRecord>,
    requires_sync: bool,
}

#[derive(Debug, Clone)]
pub struct MemoryLedgerStore {
    ledger: Rc<RefCell<MemoryLedger>>,
    supports_blob: bool,
}

impl Default for MemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedgerStore {
    /// A blob-capable ledger.
    pub fn new() -> Self {
        Self {
            ledger: Rc::new(RefCell::new(MemoryLedger::default())),
            supports_blob: true,
        }
    }

    /// A ledger that stores payloads as text.
    pub fn text_only() -> Self {
        Self {
            supports_blob: false,
            ..Self::new()
        }
    }

    pub fn len(&self) -> usize {
        self.ledger.borrow().transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn draft_len(&self) -> usize {
        self.ledger.borrow().draft.len()
    }
}

#[async_trait(?Send)]
impl LedgerStore for MemoryLedgerStore {
    async fn fetch(&self) -> LedgerResult<Vec<Transaction>> {
        Ok(self.ledger.borrow().transactions.values().cloned().collect())
    }

    async fn append(&self, transaction: &Transaction) -> LedgerResult<()> {
        self.append_many(std::slice::from_ref(transaction)).await
    }

    async fn append_many(&self, transactions: &[Transaction]) -> LedgerResult<()> {
        let mut ledger = self.ledger.borrow_mut();
        for (i, tx) in transactions.iter().enumerate() {
            let repeated = transactions[..i].iter().any(|other| other.id == tx.id);
            if repeated || ledger.transactions.contains_key(&tx.id) {
                return Err(LedgerError::duplicate("transaction", &tx.id));
            }
        }
        for tx in transactions {
            ledger.transactions.insert(tx.id.clone(), tx.clone());
        }
        Ok(())
    }

    async fn append_to_draft(&self, record: &DraftRecord) -> LedgerResult<()> {
        let mut ledger = self.ledger.borrow_mut();
        if ledger.draft.contains_key(&record.seq) {
            return Err(LedgerError::duplicate("draft record", record.seq));
        }
        ledger.draft.insert(record.seq, record.clone());
        Ok(())
    }

    async fn remove_from_draft(&self, seq: u64) -> LedgerResult<()> {
        self.ledger.borrow_mut().draft.remove(&seq);
        Ok(())
    }

    async fn fetch_draft(&self) -> LedgerResult<Vec<DraftRecord>> {
        Ok(self.ledger.borrow().draft.values().cloned().collect())
    }

    async fn clear_draft(&self) -> LedgerResult<()> {
        self.ledger.borrow_mut().draft.clear();
        Ok(())
    }

    async fn requires_sync(&self) -> LedgerResult<bool> {
        Ok(self.ledger.borrow().requires_sync)
    }

    async fn set_requires_sync(&self, requires_sync: bool) -> LedgerResult<()> {
        self.ledger.borrow_mut().requires_sync = requires_sync;
        Ok(())
    }

    fn supports_blob(&self) -> bool {
        self.supports_blob
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{LedgerErrorCode, Payload};

    fn tx(id: &str) -> Transaction {
        Transaction {
            id: id.to_string(),
            date: 1,
            deps: vec![],
            version: 3,
            signer: None,
            hash: String::new(),
            signature: None,
            payload: Payload::Text("{}".to_string()),
        }
    }

    fn draft(seq: u64) -> DraftRecord {
        DraftRecord {
            version: 1,
            seq,
            data: format!("[{}]", seq),
            encrypted: false,
        }
    }

    #[tokio::test]
    async fn test_clones_share_the_ledger() {
        let store = MemoryLedgerStore::new();
        let other = store.clone();
        store.append(&tx("a")).await.unwrap();

        let fetched = other.fetch().await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].id, "a");
    }

    #[tokio::test]
    async fn test_append_many_is_all_or_nothing() {
        let store = MemoryLedgerStore::new();
        store.append(&tx("a")).await.unwrap();

        let err = store.append_many(&[tx("b"), tx("a")]).await.unwrap_err();
        assert_eq!(err.code(), LedgerErrorCode::LedgerAppendFailed);
        assert_eq!(store.len(), 1);

        let err = store.append_many(&[tx("c"), tx("c")]).await.unwrap_err();
        assert_eq!(err.code(), LedgerErrorCode::LedgerAppendFailed);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_draft_lifecycle() {
        let store = MemoryLedgerStore::new();
        store.append_to_draft(&draft(1)).await.unwrap();
        store.append_to_draft(&draft(0)).await.unwrap();
        assert!(store.append_to_draft(&draft(1)).await.is_err());

        let seqs: Vec<_> = store.fetch_draft().await.unwrap().iter().map(|d| d.seq).collect();
        assert_eq!(seqs, vec![0, 1]);

        store.remove_from_draft(1).await.unwrap();
        store.remove_from_draft(99).await.unwrap();
        assert_eq!(store.draft_len(), 1);

        store.clear_draft().await.unwrap();
        assert_eq!(store.draft_len(), 0);
    }

    #[tokio::test]
    async fn test_sync_flag_and_blob_capability() {
        let store = MemoryLedgerStore::text_only();
        assert!(!store.supports_blob());
        assert!(!store.requires_sync().await.unwrap());

        store.set_requires_sync(true).await.unwrap();
        assert!(store.requires_sync().await.unwrap());
        assert!(MemoryLedgerStore::new().supports_blob());
    }
}
