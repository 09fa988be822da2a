//! Entity store
//!
//! Ties an [`EntitySession`], its [`ManipulationBuffer`] and a
//! [`LedgerStore`] together:
//! - `load` rebuilds the session by replaying the ledger in sorted order
//! - `commit` turns the buffer head into a signed, hashed, optionally
//!   encrypted transaction
//! - `merge` validates and appends transactions received from elsewhere
//!
//! Integrity failures abort the whole operation. `load` validates and decodes
//! every transaction before applying the first one, and resets the session
//! if an apply fails.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::try_join_all;
use tracing::{debug, info};
use uuid::Uuid;

use crate::buffer::{BufferState, ManipulationBuffer, ManipulationFrame};
use crate::continuation::TimeSlicer;
use crate::crypto::{hash_sha256, Encryption, TransactionAuth};
use crate::ledger::{LedgerStore, Payload, Signer, Transaction};
use crate::manipulation::{decode_manipulations, marshal_manipulations, DecodedManipulations, Manipulation};
use crate::model::{Entity, EntitySession, ManipulationMode, TypeRegistry, Value};
use crate::observability::OperationScope;
use crate::sorter::sort_transactions;

use super::config::{Initializer, StoreConfig};
use super::draft::Draft;
use super::envelope::{build_envelope, CURRENT_VERSION};
use super::errors::{StoreError, StoreResult};
use super::validation::{signing_message, TransactionValidator};

pub struct EntityStore {
    registry: Arc<TypeRegistry>,
    session: EntitySession,
    buffer: ManipulationBuffer,
    ledger: Rc<dyn LedgerStore>,
    auth: Option<Rc<dyn TransactionAuth>>,
    encryption: Option<Rc<dyn Encryption>>,
    initializers: Vec<Initializer>,
    draft: Option<Draft>,
    time_slice: Duration,
    transaction_ids: RefCell<HashSet<String>>,
    leaf_ids: RefCell<Vec<String>>,
}

impl EntityStore {
    /// Creates a store over `ledger`. Call [`EntityStore::load`] before use.
    pub fn open(
        registry: Arc<TypeRegistry>,
        ledger: impl LedgerStore + 'static,
        config: StoreConfig,
    ) -> Self {
        Self::open_shared(registry, Rc::new(ledger), config)
    }

    pub fn open_shared(
        registry: Arc<TypeRegistry>,
        ledger: Rc<dyn LedgerStore>,
        config: StoreConfig,
    ) -> Self {
        let session = EntitySession::new(Arc::clone(&registry));
        let buffer = ManipulationBuffer::new(session.clone());
        let draft = config.manage_draft.then(|| {
            Draft::new(
                Arc::clone(&registry),
                buffer.clone(),
                Rc::clone(&ledger),
                config.encryption.clone(),
            )
        });

        Self {
            registry,
            session,
            buffer,
            ledger,
            auth: config.auth,
            encryption: config.encryption,
            initializers: config.initializers,
            draft,
            time_slice: config.time_slice,
            transaction_ids: RefCell::new(HashSet::new()),
            leaf_ids: RefCell::new(Vec::new()),
        }
    }

    // ==================
    // Accessors
    // ==================

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn session(&self) -> &EntitySession {
        &self.session
    }

    pub fn buffer(&self) -> &ManipulationBuffer {
        &self.buffer
    }

    pub fn ledger(&self) -> &Rc<dyn LedgerStore> {
        &self.ledger
    }

    pub fn state(&self) -> BufferState {
        self.buffer.state()
    }

    /// Ids of every transaction applied by `load`, committed, or merged.
    pub fn persisted_transaction_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.transaction_ids.borrow().iter().cloned().collect();
        ids.sort();
        ids
    }

    /// Dependencies of the next commit.
    pub fn leaf_transaction_ids(&self) -> Vec<String> {
        self.leaf_ids.borrow().clone()
    }

    fn validator(&self) -> TransactionValidator<'_> {
        TransactionValidator::new(self.auth.as_deref(), self.encryption.as_deref())
    }

    // ==================
    // Load
    // ==================

    /// Rebuilds the session from the ledger, then replays the draft.
    pub async fn load(&self) -> StoreResult<()> {
        let scope = OperationScope::new("load");
        match self.load_ledger().await {
            Ok(count) => {
                scope.complete(count);
                Ok(())
            }
            Err(e) => {
                scope.fail(&e);
                Err(e)
            }
        }
    }

    async fn load_ledger(&self) -> StoreResult<usize> {
        self.buffer.clear();
        let count = {
            let _suspension = self.buffer.suspend();
            self.session.reset();

            let ordering = sort_transactions(self.ledger.fetch().await?)?;
            if !ordering.excluded.is_empty() {
                debug!(
                    event = "load_unreachable",
                    excluded = ordering.excluded.len()
                );
            }

            for initializer in &self.initializers {
                initializer(self)?;
            }

            let validator = self.validator();
            let mut decoded: Vec<DecodedManipulations> = Vec::with_capacity(ordering.transactions.len());
            for tx in &ordering.transactions {
                let envelope = validator.validate(tx).await?;
                decoded.push(decode_manipulations(&self.registry, envelope.diff())?);
            }

            let mut slicer = TimeSlicer::new(self.time_slice);
            let applied = slicer
                .for_each(&decoded, |manipulations| {
                    manipulations
                        .apply(&self.session, ManipulationMode::RemoteGlobal)
                        .map(|_| ())
                })
                .await;
            if let Err(e) = applied {
                self.session.reset();
                return Err(e.into());
            }

            *self.transaction_ids.borrow_mut() = ordering.ids().into_iter().collect();
            *self.leaf_ids.borrow_mut() = ordering.leaf_ids();
            ordering.transactions.len()
        };

        if let Some(draft) = &self.draft {
            draft.load().await?;
        }
        Ok(count)
    }

    // ==================
    // Commit
    // ==================

    /// Commits the buffer head as a new transaction depending on every
    /// current leaf.
    ///
    /// With signing configured, `signer` is required and `withdrawn` is
    /// consulted before and after the signature is requested; a withdrawn
    /// commit appends nothing.
    pub async fn commit(
        &self,
        signer: Option<&Signer>,
        withdrawn: Option<&dyn Fn() -> bool>,
    ) -> StoreResult<Transaction> {
        let is_withdrawn = || withdrawn.is_some_and(|f| f());

        let manipulations = self.buffer.commit_manipulations();
        let diff = marshal_manipulations(&self.registry, &manipulations)?;

        let id = Uuid::new_v4().to_string();
        let date = Utc::now().timestamp_millis();
        let deps = self.leaf_transaction_ids();
        let envelope = build_envelope(CURRENT_VERSION, &id, date, &deps, signer, &diff)?;
        let hash = hash_sha256(&envelope);

        let signature = match &self.auth {
            Some(auth) => {
                let signer = signer.ok_or(StoreError::MissingSigner)?;
                if is_withdrawn() {
                    return Err(StoreError::SigningWithdrawn);
                }
                let message =
                    signing_message(CURRENT_VERSION, auth.signing_context_name(), &id, &envelope)?;
                let signed = auth.sign(&message, &signer.address).await;
                if is_withdrawn() {
                    return Err(StoreError::SigningWithdrawn);
                }
                Some(signed?)
            }
            None => None,
        };

        let text = match &self.encryption {
            Some(encryption) => encryption.encrypt(&envelope).await?,
            None => envelope,
        };
        let payload = if self.ledger.supports_blob() {
            Payload::Blob(text.into_bytes())
        } else {
            Payload::Text(text)
        };

        let transaction = Transaction {
            id,
            date,
            deps,
            version: CURRENT_VERSION,
            signer: signer.cloned(),
            hash,
            signature,
            payload,
        };
        self.ledger.append(&transaction).await?;

        // Edits recorded while signing or encrypting stay for the next commit
        self.buffer.discard_committed(&manipulations);
        self.transaction_ids
            .borrow_mut()
            .insert(transaction.id.clone());
        *self.leaf_ids.borrow_mut() = vec![transaction.id.clone()];
        if let Some(draft) = &self.draft {
            draft.clear().await?;
        }

        info!(
            event = "commit",
            id = %transaction.id,
            manipulations = manipulations.len(),
            deps = transaction.deps.len(),
            signed = transaction.signature.is_some()
        );
        Ok(transaction)
    }

    // ==================
    // Merge
    // ==================

    /// Validates transactions received from another replica and appends the
    /// unknown ones. Nothing is applied; call [`EntityStore::load`] to
    /// materialize them. Returns the ids appended.
    pub async fn merge(&self, incoming: Vec<Transaction>) -> StoreResult<Vec<String>> {
        let existing: HashSet<String> = self
            .ledger
            .fetch()
            .await?
            .into_iter()
            .map(|tx| tx.id)
            .collect();

        let mut seen = HashSet::new();
        let fresh: Vec<Transaction> = incoming
            .into_iter()
            .filter(|tx| !existing.contains(&tx.id) && seen.insert(tx.id.clone()))
            .collect();

        let validator = self.validator();
        try_join_all(fresh.iter().map(|tx| validator.validate(tx))).await?;

        self.ledger.append_many(&fresh).await?;

        let ids: Vec<String> = fresh.into_iter().map(|tx| tx.id).collect();
        self.transaction_ids
            .borrow_mut()
            .extend(ids.iter().cloned());
        info!(event = "merge", appended = ids.len());
        Ok(ids)
    }

    // ==================
    // Entities
    // ==================

    /// Creates an entity with a random globalId, applies declared defaults,
    /// then sets `properties`. Recorded as one compound.
    pub fn create(&self, signature: &str, properties: &[(&str, Value)]) -> StoreResult<Entity> {
        self.create_x(signature).with_random_id(properties)
    }

    /// Like [`EntityStore::create`] without applying declared defaults.
    pub fn create_raw(&self, signature: &str, properties: &[(&str, Value)]) -> StoreResult<Entity> {
        self.create_x(signature).raw().with_random_id(properties)
    }

    pub fn create_x<'a>(&'a self, signature: &'a str) -> EntityCreation<'a> {
        EntityCreation {
            store: self,
            signature,
            raw: false,
        }
    }

    fn init_and_attach(
        &self,
        signature: &str,
        raw: bool,
        properties: &[(&str, Value)],
        global_id: Option<&str>,
    ) -> StoreResult<Entity> {
        self.buffer.open_nested_frame(None).run(|| -> StoreResult<Entity> {
            let entity = match global_id {
                Some(id) => self.session.create_entity_with_id(signature, id)?,
                None => self.session.create_entity(signature)?,
            };

            if !raw {
                let defaults: Vec<(String, Value)> = entity
                    .entity_type()
                    .properties()
                    .iter()
                    .filter_map(|p| p.default_value().map(|v| (p.name().to_string(), v.clone())))
                    .collect();
                for (name, value) in defaults {
                    self.session.set(&entity, &name, value)?;
                }
            }

            for (name, value) in properties {
                self.session.set(&entity, name, value.clone())?;
            }
            Ok(entity)
        })
    }

    pub fn delete(&self, entity: &Entity) -> StoreResult<()> {
        self.session.delete_entity(entity)?;
        Ok(())
    }

    pub fn find(&self, global_id: &str) -> Option<Entity> {
        self.session.find(global_id)
    }

    pub fn get(&self, global_id: &str) -> StoreResult<Entity> {
        self.find(global_id)
            .ok_or_else(|| StoreError::EntityNotFound(global_id.to_string()))
    }

    /// Attached entities assignable to `signature`.
    pub fn list(&self, signature: &str) -> Vec<Entity> {
        self.session.list(signature)
    }

    /// Applies manipulations received from elsewhere without recording them.
    pub fn apply(&self, manipulations: &[Manipulation]) -> StoreResult<()> {
        let _suspension = self.buffer.suspend();
        for manipulation in manipulations {
            self.session.apply(manipulation, ManipulationMode::Remote)?;
        }
        Ok(())
    }

    pub fn open_nested_frame(&self, extend_on: Option<Manipulation>) -> ManipulationFrame {
        self.buffer.open_nested_frame(extend_on)
    }

    pub fn is_part_of_commit(&self, entity: &Entity) -> bool {
        self.buffer.is_part_of_commit(entity)
    }

    // ==================
    // Sync flag
    // ==================

    pub async fn requires_sync(&self) -> StoreResult<bool> {
        Ok(self.ledger.requires_sync().await?)
    }

    pub async fn set_requires_sync(&self, requires_sync: bool) -> StoreResult<()> {
        Ok(self.ledger.set_requires_sync(requires_sync).await?)
    }

    // ==================
    // Draft
    // ==================

    pub fn defer_persistence(&self, defer: bool) {
        if let Some(draft) = &self.draft {
            draft.defer_persistence(defer);
        }
    }

    pub fn enable_encryption(&self, enabled: bool) {
        if let Some(draft) = &self.draft {
            draft.enable_encryption(enabled);
        }
    }

    /// Resolves once every queued draft change is persisted. Stays pending
    /// while persistence is deferred; resolves immediately without draft
    /// management.
    pub async fn wait_for_empty_queue(&self) -> StoreResult<()> {
        match &self.draft {
            Some(draft) => draft.wait_for_empty_queue().await,
            None => Ok(()),
        }
    }
}

/// Builder returned by [`EntityStore::create_x`].
pub struct EntityCreation<'a> {
    store: &'a EntityStore,
    signature: &'a str,
    raw: bool,
}

impl<'a> EntityCreation<'a> {
    /// Skips declared defaults.
    pub fn raw(mut self) -> Self {
        self.raw = true;
        self
    }

    pub fn with_id(self, global_id: &str, properties: &[(&str, Value)]) -> StoreResult<Entity> {
        self.store
            .init_and_attach(self.signature, self.raw, properties, Some(global_id))
    }

    pub fn with_random_id(self, properties: &[(&str, Value)]) -> StoreResult<Entity> {
        self.store
            .init_and_attach(self.signature, self.raw, properties, None)
    }
}
