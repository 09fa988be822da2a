//! File-backed ledger
//!
//! Layout under the ledger directory:
//! - `ledger/transactions.log`: one `Transaction` record per commit
//! - `ledger/draft.log`: draft append/remove/clear records, replayed on open
//! - `ledger/meta.json`: `{"requiresSync": bool}`
//!
//! Every append is fsynced before it is acknowledged. Any corrupt record in
//! either log fails the open.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::errors::{LedgerError, LedgerResult};
use super::log::{read_records, RecordLog};
use super::record::{LedgerRecord, RecordKind};
use super::store::LedgerStore;
use super::transaction::{DraftRecord, Transaction};

const LEDGER_DIR: &str = "ledger";
const TRANSACTIONS_FILE: &str = "transactions.log";
const DRAFT_FILE: &str = "draft.log";
const META_FILE: &str = "meta.json";

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LedgerMeta {
    #[serde(default)]
    requires_sync: bool,
}

struct FileLedgerState {
    transactions: RecordLog,
    draft_log: RecordLog,
    transaction_ids: HashSet<String>,
    draft: BTreeMap<u64, DraftRecord>,
    meta: LedgerMeta,
}

pub struct FileLedgerStore {
    dir: PathBuf,
    state: RefCell<FileLedgerState>,
}

impl std::fmt::Debug for FileLedgerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileLedgerStore")
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

fn corrupt_body(record: &LedgerRecord, err: impl std::fmt::Display) -> LedgerError {
    LedgerError::corruption_at_sequence(
        record.sequence_number,
        format!("Undecodable {:?} record: {}", record.kind, err),
    )
}

fn decode_transaction(record: &LedgerRecord) -> LedgerResult<Transaction> {
    if record.kind != RecordKind::Transaction {
        return Err(corrupt_body(record, "unexpected record kind"));
    }
    serde_json::from_slice(&record.body).map_err(|e| corrupt_body(record, e))
}

/// Folds draft log records into the current draft.
fn replay_draft(records: &[LedgerRecord]) -> LedgerResult<BTreeMap<u64, DraftRecord>> {
    let mut draft = BTreeMap::new();
    for record in records {
        match record.kind {
            RecordKind::DraftAppend => {
                let entry: DraftRecord =
                    serde_json::from_slice(&record.body).map_err(|e| corrupt_body(record, e))?;
                draft.insert(entry.seq, entry);
            }
            RecordKind::DraftRemove => {
                let bytes: [u8; 8] = record
                    .body
                    .as_slice()
                    .try_into()
                    .map_err(|_| corrupt_body(record, "seq must be 8 bytes"))?;
                draft.remove(&u64::from_le_bytes(bytes));
            }
            RecordKind::DraftClear => draft.clear(),
            RecordKind::Transaction => {
                return Err(corrupt_body(record, "transaction in draft log"));
            }
        }
    }
    Ok(draft)
}

impl FileLedgerStore {
    /// Opens or creates the ledger under `dir`.
    pub fn open(dir: impl AsRef<Path>) -> LedgerResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        let ledger_dir = dir.join(LEDGER_DIR);

        let (transactions, records) = RecordLog::open(&ledger_dir.join(TRANSACTIONS_FILE))?;
        let transaction_ids = records
            .iter()
            .map(|r| decode_transaction(r).map(|tx| tx.id))
            .collect::<LedgerResult<HashSet<_>>>()?;

        let (mut draft_log, draft_records) = RecordLog::open(&ledger_dir.join(DRAFT_FILE))?;
        let draft = replay_draft(&draft_records)?;
        if draft.is_empty() && !draft_records.is_empty() {
            draft_log.truncate()?;
        }

        let meta = Self::read_meta(&ledger_dir.join(META_FILE))?;

        info!(
            event = "ledger_open",
            dir = %dir.display(),
            transactions = transaction_ids.len(),
            draft = draft.len(),
            "file ledger opened"
        );

        Ok(Self {
            dir,
            state: RefCell::new(FileLedgerState {
                transactions,
                draft_log,
                transaction_ids,
                draft,
                meta,
            }),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ledger_dir(&self) -> PathBuf {
        self.dir.join(LEDGER_DIR)
    }

    fn read_meta(path: &Path) -> LedgerResult<LedgerMeta> {
        match fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                LedgerError::corruption(format!("Invalid {}: {}", path.display(), e))
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(LedgerMeta::default()),
            Err(e) => Err(LedgerError::io(
                format!("Failed to read {}", path.display()),
                e,
            )),
        }
    }

    /// Replaces the meta file through a temporary file and a rename.
    fn write_meta(&self, meta: LedgerMeta) -> LedgerResult<()> {
        let path = self.ledger_dir().join(META_FILE);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec(&meta).map_err(|e| {
            LedgerError::io("Failed to encode ledger meta", io::Error::other(e))
        })?;

        let write = || -> io::Result<()> {
            fs::write(&tmp, &body)?;
            fs::File::open(&tmp)?.sync_all()?;
            fs::rename(&tmp, &path)
        };
        write().map_err(|e| LedgerError::io(format!("Failed to write {}", path.display()), e))
    }

    fn encode<T: Serialize>(value: &T) -> LedgerResult<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| {
            LedgerError::append_failed("Failed to encode ledger record", io::Error::other(e))
        })
    }
}

#[async_trait(?Send)]
impl LedgerStore for FileLedgerStore {
    async fn fetch(&self) -> LedgerResult<Vec<Transaction>> {
        let path = self.ledger_dir().join(TRANSACTIONS_FILE);
        let transactions = read_records(&path)?
            .iter()
            .map(decode_transaction)
            .collect::<LedgerResult<Vec<_>>>()?;
        debug!(event = "ledger_fetch", count = transactions.len());
        Ok(transactions)
    }

    async fn append(&self, transaction: &Transaction) -> LedgerResult<()> {
        self.append_many(std::slice::from_ref(transaction)).await
    }

    async fn append_many(&self, transactions: &[Transaction]) -> LedgerResult<()> {
        let mut state = self.state.borrow_mut();

        let mut seen = HashSet::new();
        for tx in transactions {
            if state.transaction_ids.contains(&tx.id) || !seen.insert(tx.id.as_str()) {
                return Err(LedgerError::duplicate("transaction", &tx.id));
            }
        }

        let bodies = transactions
            .iter()
            .map(Self::encode)
            .collect::<LedgerResult<Vec<_>>>()?;
        let last = state
            .transactions
            .append_many(RecordKind::Transaction, bodies)?;
        state
            .transaction_ids
            .extend(transactions.iter().map(|tx| tx.id.clone()));

        debug!(
            event = "ledger_append",
            count = transactions.len(),
            sequence = last
        );
        Ok(())
    }

    async fn append_to_draft(&self, record: &DraftRecord) -> LedgerResult<()> {
        let mut state = self.state.borrow_mut();
        if state.draft.contains_key(&record.seq) {
            return Err(LedgerError::duplicate("draft record", record.seq));
        }
        let body = Self::encode(record)?;
        state.draft_log.append(RecordKind::DraftAppend, body)?;
        state.draft.insert(record.seq, record.clone());
        Ok(())
    }

    async fn remove_from_draft(&self, seq: u64) -> LedgerResult<()> {
        let mut state = self.state.borrow_mut();
        if state.draft.remove(&seq).is_some() {
            state
                .draft_log
                .append(RecordKind::DraftRemove, seq.to_le_bytes().to_vec())?;
        }
        Ok(())
    }

    async fn fetch_draft(&self) -> LedgerResult<Vec<DraftRecord>> {
        Ok(self.state.borrow().draft.values().cloned().collect())
    }

    async fn clear_draft(&self) -> LedgerResult<()> {
        let mut state = self.state.borrow_mut();
        if state.draft.is_empty() {
            return Ok(());
        }
        state.draft_log.append(RecordKind::DraftClear, Vec::new())?;
        state.draft.clear();
        Ok(())
    }

    async fn requires_sync(&self) -> LedgerResult<bool> {
        Ok(self.state.borrow().meta.requires_sync)
    }

    async fn set_requires_sync(&self, requires_sync: bool) -> LedgerResult<()> {
        let mut state = self.state.borrow_mut();
        if state.meta.requires_sync == requires_sync {
            return Ok(());
        }
        let meta = LedgerMeta { requires_sync };
        self.write_meta(meta)?;
        state.meta = meta;
        Ok(())
    }

    fn supports_blob(&self) -> bool {
        true
    }
}
