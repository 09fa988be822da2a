//! Store orchestration
//!
//! - `envelope`: byte-stable transaction envelope
//! - `validation`: decryption, signature and consistency checks
//! - `draft`: crash recovery of uncommitted changes
//! - `entity_store`: load, commit, merge and the entity API

mod config;
mod draft;
mod entity_store;
mod envelope;
mod errors;
mod validation;

pub use config::{Initializer, StoreConfig};
pub use draft::Draft;
pub use entity_store::{EntityCreation, EntityStore};
pub use envelope::{build_envelope, TransactionEnvelope, CURRENT_VERSION};
pub use errors::{StoreError, StoreResult};
pub use validation::{signing_message, TransactionValidator};
