use std::rc::Rc;
use std::time::Duration;

use crate::continuation::DEFAULT_TIME_SLICE;
use crate::crypto::{Encryption, TransactionAuth};

use super::entity_store::EntityStore;
use super::errors::StoreResult;

/// Seeds a freshly loaded store, e.g. with reference data. Runs on every
/// load, before the ledger is replayed, with tracking suspended.
pub type Initializer = Rc<dyn Fn(&EntityStore) -> StoreResult<()>>;

/// Programmatic configuration of an [`EntityStore`].
#[derive(Clone)]
pub struct StoreConfig {
    pub auth: Option<Rc<dyn TransactionAuth>>,
    pub encryption: Option<Rc<dyn Encryption>>,
    pub initializers: Vec<Initializer>,
    /// Persist uncommitted changes to the ledger's draft area. Persistence
    /// runs as a local task, so edits must happen inside a `LocalSet`.
    pub manage_draft: bool,
    /// Work budget between cooperative yields during replay
    pub time_slice: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            auth: None,
            encryption: None,
            initializers: Vec::new(),
            manage_draft: false,
            time_slice: DEFAULT_TIME_SLICE,
        }
    }
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("auth", &self.auth.is_some())
            .field("encryption", &self.encryption.is_some())
            .field("initializers", &self.initializers.len())
            .field("manage_draft", &self.manage_draft)
            .field("time_slice", &self.time_slice)
            .finish()
    }
}

impl StoreConfig {
    pub fn with_auth(mut self, auth: impl TransactionAuth + 'static) -> Self {
        self.auth = Some(Rc::new(auth));
        self
    }

    pub fn with_encryption(mut self, encryption: impl Encryption + 'static) -> Self {
        self.encryption = Some(Rc::new(encryption));
        self
    }

    pub fn with_initializer(
        mut self,
        initializer: impl Fn(&EntityStore) -> StoreResult<()> + 'static,
    ) -> Self {
        self.initializers.push(Rc::new(initializer));
        self
    }

    pub fn with_draft(mut self, manage_draft: bool) -> Self {
        self.manage_draft = manage_draft;
        self
    }

    pub fn with_time_slice(mut self, time_slice: Duration) -> Self {
        self.time_slice = time_slice;
        self
    }
}
