//! entity-ledger - a local-first, event-sourced entity store
//!
//! Edits to a typed entity graph are captured as manipulations, grouped into
//! signed and optionally encrypted transactions, and appended to a ledger.
//! Replicas rebuild state by replaying the ledger in a deterministic
//! topological order.
//!
//! - `model`: entity types, values and the tracked session
//! - `manipulation`: reversible change records and their wire form
//! - `buffer`: undo/redo buffer with nested frames and a commit index
//! - `codec`: object-graph JSON marshalling
//! - `sorter`: transaction DAG ordering
//! - `ledger`: ledger stores (memory, file)
//! - `crypto`: passphrase encryption, hashing, signing
//! - `store`: load, commit, merge and draft recovery

pub mod buffer;
pub mod cli;
pub mod codec;
pub mod config;
pub mod continuation;
pub mod crypto;
pub mod ledger;
pub mod manipulation;
pub mod model;
pub mod observability;
pub mod sorter;
pub mod store;
pub mod testing;
