//! Draft persistence
//!
//! Uncommitted buffer changes are mirrored into the ledger's draft area so
//! that they survive a restart. Every head manipulation owns one draft record
//! keyed by a sequence number: recording or redoing pushes a record, undoing
//! pops it, and extending a manipulation in place rewrites its record under
//! the same sequence number.
//!
//! Buffer events only enqueue work. A single local task drains the queue,
//! scheduled on the first enqueue and on resume; deferring persistence leaves
//! entries queued until it is resumed. Draft management therefore needs a
//! `tokio::task::LocalSet` around every edit.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::buffer::{BufferEvent, BufferListenerId, ManipulationBuffer};
use crate::crypto::Encryption;
use crate::ledger::{DraftRecord, LedgerStore};
use crate::manipulation::{decode_manipulations, marshal_manipulations, Manipulation};
use crate::model::{ManipulationMode, TypeRegistry};

use super::errors::{StoreError, StoreResult};

const DRAFT_RECORD_VERSION: u32 = 1;

#[derive(Debug)]
enum DraftOp {
    Push(Manipulation),
    Pop(u64),
    Rewrite { old: u64, new: Manipulation },
}

struct DraftInner {
    registry: Arc<TypeRegistry>,
    buffer: ManipulationBuffer,
    ledger: Rc<dyn LedgerStore>,
    encryption: Option<Rc<dyn Encryption>>,
    queue: RefCell<VecDeque<DraftOp>>,
    /// Persisted head manipulations as (manipulation id, seq), oldest first
    records: RefCell<Vec<(u64, u64)>>,
    next_seq: Cell<u64>,
    loading: Cell<bool>,
    deferred: Cell<bool>,
    scheduled: Cell<bool>,
    encryption_enabled: Cell<bool>,
    failure: RefCell<Option<StoreError>>,
    drained: Notify,
    listener: Cell<Option<BufferListenerId>>,
}

impl Drop for DraftInner {
    fn drop(&mut self) {
        if let Some(id) = self.listener.take() {
            self.buffer.remove_listener(id);
        }
    }
}

#[derive(Clone)]
pub struct Draft {
    inner: Rc<DraftInner>,
}

impl Draft {
    pub(crate) fn new(
        registry: Arc<TypeRegistry>,
        buffer: ManipulationBuffer,
        ledger: Rc<dyn LedgerStore>,
        encryption: Option<Rc<dyn Encryption>>,
    ) -> Self {
        let inner = Rc::new(DraftInner {
            registry,
            buffer: buffer.clone(),
            ledger,
            encryption,
            queue: RefCell::new(VecDeque::new()),
            records: RefCell::new(Vec::new()),
            next_seq: Cell::new(0),
            loading: Cell::new(false),
            deferred: Cell::new(false),
            scheduled: Cell::new(false),
            encryption_enabled: Cell::new(true),
            failure: RefCell::new(None),
            drained: Notify::new(),
            listener: Cell::new(None),
        });

        let weak: Weak<DraftInner> = Rc::downgrade(&inner);
        let id = buffer.add_listener(move |event| {
            if let Some(inner) = weak.upgrade() {
                Draft { inner }.on_buffer_event(event);
            }
        });
        inner.listener.set(Some(id));

        Self { inner }
    }

    fn on_buffer_event(&self, event: &BufferEvent) {
        if self.inner.loading.get() {
            // Replayed records are already persisted under the current seq
            if let BufferEvent::Added(m) = event {
                self.inner
                    .records
                    .borrow_mut()
                    .push((m.id(), self.inner.next_seq.get()));
            }
            return;
        }
        match event {
            BufferEvent::Added(m) => self.enqueue(DraftOp::Push(m.clone())),
            BufferEvent::Removed(m) => self.enqueue(DraftOp::Pop(m.id())),
            BufferEvent::Replaced { old, new } => self.enqueue(DraftOp::Rewrite {
                old: old.id(),
                new: new.clone(),
            }),
            BufferEvent::Cleared => {}
        }
    }

    fn enqueue(&self, op: DraftOp) {
        self.inner.queue.borrow_mut().push_back(op);
        self.schedule();
    }

    fn schedule(&self) {
        let inner = &self.inner;
        if inner.deferred.get() || inner.scheduled.get() || inner.queue.borrow().is_empty() {
            return;
        }
        inner.scheduled.set(true);
        let draft = self.clone();
        tokio::task::spawn_local(async move { draft.process_queue().await });
    }

    /// Pauses or resumes persistence. Entries recorded while paused stay
    /// queued and are drained on resume.
    pub fn defer_persistence(&self, defer: bool) {
        self.inner.deferred.set(defer);
        self.schedule();
    }

    pub fn is_deferred(&self) -> bool {
        self.inner.deferred.get()
    }

    /// Controls encryption of records written from now on.
    pub fn enable_encryption(&self, enabled: bool) {
        self.inner.encryption_enabled.set(enabled);
    }

    pub fn queue_len(&self) -> usize {
        self.inner.queue.borrow().len()
    }

    /// Resolves once the queue is empty and no drain is in flight. Stays
    /// pending while persistence is deferred with entries queued. A failure
    /// of the background drain is reported here.
    pub async fn wait_for_empty_queue(&self) -> StoreResult<()> {
        loop {
            if let Some(error) = self.inner.failure.borrow_mut().take() {
                return Err(error);
            }
            if !self.inner.scheduled.get() && self.inner.queue.borrow().is_empty() {
                return Ok(());
            }
            let drained = self.inner.drained.notified();
            self.schedule();
            drained.await;
        }
    }

    async fn process_queue(&self) {
        let mut persisted = 0usize;
        while !self.inner.deferred.get() {
            let Some(op) = self.inner.queue.borrow_mut().pop_front() else {
                break;
            };
            if let Err(error) = self.persist(op).await {
                warn!(event = "draft_persist_failed", error = %error);
                *self.inner.failure.borrow_mut() = Some(error);
                break;
            }
            persisted += 1;
        }
        self.inner.scheduled.set(false);
        debug!(event = "draft_drain", persisted, next_seq = self.inner.next_seq.get());
        self.inner.drained.notify_waiters();
    }

    async fn persist(&self, op: DraftOp) -> StoreResult<()> {
        match op {
            DraftOp::Push(manipulation) => self.push(&manipulation).await,
            DraftOp::Pop(id) => {
                let entry = {
                    let mut records = self.inner.records.borrow_mut();
                    records
                        .iter()
                        .rposition(|(m, _)| *m == id)
                        .map(|position| records.remove(position))
                };
                let Some((_, seq)) = entry else {
                    debug!(event = "draft_pop_unknown", manipulation = id);
                    return Ok(());
                };
                self.inner.ledger.remove_from_draft(seq).await?;
                if seq + 1 == self.inner.next_seq.get() {
                    self.inner.next_seq.set(seq);
                }
                Ok(())
            }
            DraftOp::Rewrite { old, new } => {
                let position = self
                    .inner
                    .records
                    .borrow()
                    .iter()
                    .rposition(|(m, _)| *m == old);
                let Some(position) = position else {
                    return self.push(&new).await;
                };
                let seq = self.inner.records.borrow()[position].1;
                self.inner.ledger.remove_from_draft(seq).await?;
                self.write(seq, &new).await?;
                self.inner.records.borrow_mut()[position] = (new.id(), seq);
                Ok(())
            }
        }
    }

    async fn push(&self, manipulation: &Manipulation) -> StoreResult<()> {
        let seq = self.inner.next_seq.get();
        self.write(seq, manipulation).await?;
        self.inner.records.borrow_mut().push((manipulation.id(), seq));
        self.inner.next_seq.set(seq + 1);
        Ok(())
    }

    async fn write(&self, seq: u64, manipulation: &Manipulation) -> StoreResult<()> {
        let mut data = marshal_manipulations(&self.inner.registry, std::slice::from_ref(manipulation))?;
        let mut encrypted = false;
        if let Some(encryption) = &self.inner.encryption {
            if self.inner.encryption_enabled.get() {
                data = encryption.encrypt(&data).await?;
                encrypted = true;
            }
        }

        self.inner
            .ledger
            .append_to_draft(&DraftRecord {
                version: DRAFT_RECORD_VERSION,
                seq,
                data,
                encrypted,
            })
            .await?;
        Ok(())
    }

    /// Replays persisted draft records in sequence order. Replayed
    /// manipulations are recorded by the buffer again but not re-persisted.
    pub(crate) async fn load(&self) -> StoreResult<usize> {
        self.inner.loading.set(true);
        let result = self.replay().await;
        self.inner.loading.set(false);
        result
    }

    async fn replay(&self) -> StoreResult<usize> {
        let mut records = self.inner.ledger.fetch_draft().await?;
        records.sort_by_key(|r| r.seq);
        self.inner.records.borrow_mut().clear();
        self.inner.next_seq.set(0);

        let session = self.inner.buffer.session();
        for record in &records {
            let text = match &self.inner.encryption {
                Some(encryption) if record.encrypted => {
                    let text = encryption.decrypt(&record.data).await;
                    if text.is_empty() {
                        return Err(StoreError::WrongDecryptionKey);
                    }
                    text
                }
                _ => record.data.clone(),
            };

            self.inner.next_seq.set(record.seq);
            decode_manipulations(&self.inner.registry, &text)?
                .apply(session, ManipulationMode::RemoteGlobal)?;
            self.inner.next_seq.set(record.seq + 1);
        }

        if !records.is_empty() {
            info!(event = "draft_replayed", records = records.len());
        }
        Ok(records.len())
    }

    /// Discards the persisted draft after a commit. Queued entries are
    /// persisted first unless persistence is deferred; head entries the
    /// commit did not take are then mirrored again.
    pub(crate) async fn clear(&self) -> StoreResult<()> {
        if self.inner.deferred.get() {
            while self.inner.scheduled.get() {
                self.inner.drained.notified().await;
            }
        } else {
            self.wait_for_empty_queue().await?;
        }
        self.inner.queue.borrow_mut().clear();
        self.inner.records.borrow_mut().clear();
        self.inner.next_seq.set(0);
        self.inner.ledger.clear_draft().await?;

        for manipulation in self.inner.buffer.commit_manipulations() {
            self.enqueue(DraftOp::Push(manipulation));
        }
        Ok(())
    }
}
