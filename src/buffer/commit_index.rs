//! Entity → head-range manipulation index
//!
//! Compounds are indexed through their leaves. The index answers whether an
//! entity has uncommitted changes.

use std::collections::{HashMap, HashSet};

use crate::manipulation::Manipulation;
use crate::model::Entity;

#[derive(Debug, Default)]
pub(crate) struct CommitIndex {
    by_entity: HashMap<u64, HashSet<u64>>,
}

impl CommitIndex {
    pub(crate) fn add(&mut self, manipulation: &Manipulation) {
        for leaf in manipulation.leaves() {
            if let Some(entity) = leaf.kind().touched_entity() {
                self.by_entity
                    .entry(entity.runtime_id())
                    .or_default()
                    .insert(leaf.id());
            }
        }
    }

    pub(crate) fn remove(&mut self, manipulation: &Manipulation) {
        for leaf in manipulation.leaves() {
            let Some(entity) = leaf.kind().touched_entity() else {
                continue;
            };
            let key = entity.runtime_id();
            if let Some(ids) = self.by_entity.get_mut(&key) {
                ids.remove(&leaf.id());
                if ids.is_empty() {
                    self.by_entity.remove(&key);
                }
            }
        }
    }

    pub(crate) fn contains(&self, entity: &Entity) -> bool {
        self.by_entity.contains_key(&entity.runtime_id())
    }

    pub(crate) fn clear(&mut self) {
        self.by_entity.clear();
    }
}
