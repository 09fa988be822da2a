//! Entity handles
//!
//! An `Entity` is a shared, single-threaded handle onto a property slot map.
//! Handles compare and hash by a process-unique runtime id, never by content.
//! Slot writes through this type are untracked; tracked mutation goes
//! through [`EntitySession`](super::EntitySession).

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::builtin::GLOBAL_ID_PROPERTY;
use super::types::EntityType;
use super::value::Value;

static NEXT_RUNTIME_ID: AtomicU64 = AtomicU64::new(1);

struct EntityCell {
    runtime_id: u64,
    entity_type: Arc<EntityType>,
    slots: RefCell<HashMap<String, Value>>,
    absence: RefCell<HashMap<String, Entity>>,
}

#[derive(Clone)]
pub struct Entity {
    inner: Rc<EntityCell>,
}

impl Entity {
    /// Creates a detached entity. Collection properties start out empty.
    pub fn new(entity_type: Arc<EntityType>) -> Self {
        let slots = entity_type
            .properties()
            .iter()
            .filter(|p| p.ty().is_collection())
            .map(|p| (p.name().to_string(), p.ty().empty_value()))
            .collect();

        Self {
            inner: Rc::new(EntityCell {
                runtime_id: NEXT_RUNTIME_ID.fetch_add(1, Ordering::Relaxed),
                entity_type,
                slots: RefCell::new(slots),
                absence: RefCell::new(HashMap::new()),
            }),
        }
    }

    /// Process-unique id, also used as the codec's arena key.
    pub fn runtime_id(&self) -> u64 {
        self.inner.runtime_id
    }

    pub fn entity_type(&self) -> &Arc<EntityType> {
        &self.inner.entity_type
    }

    pub fn type_signature(&self) -> &str {
        self.inner.entity_type.signature()
    }

    pub fn global_id(&self) -> Option<String> {
        match self.get_direct(GLOBAL_ID_PROPERTY) {
            Value::String(id) => Some(id),
            _ => None,
        }
    }

    /// Reads a property, falling back to its declared default when unset.
    pub fn get(&self, property: &str) -> Value {
        if let Some(value) = self.inner.slots.borrow().get(property) {
            if !value.is_null() {
                return value.clone();
            }
        }
        self.inner
            .entity_type
            .find_property(property)
            .and_then(|p| p.default_value().cloned())
            .unwrap_or(Value::Null)
    }

    /// Reads the raw slot.
    pub fn get_direct(&self, property: &str) -> Value {
        self.inner
            .slots
            .borrow()
            .get(property)
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Writes the raw slot without emitting a manipulation.
    pub fn set_direct(&self, property: &str, value: Value) {
        let mut slots = self.inner.slots.borrow_mut();
        if value.is_null() {
            slots.remove(property);
        } else {
            slots.insert(property.to_string(), value);
        }
    }

    /// Mutates the raw slot in place, starting from `Null` when unset.
    pub(crate) fn with_slot_mut<R>(&self, property: &str, f: impl FnOnce(&mut Value) -> R) -> R {
        let mut slots = self.inner.slots.borrow_mut();
        let slot = slots.entry(property.to_string()).or_insert(Value::Null);
        f(slot)
    }

    pub fn absence_information(&self, property: &str) -> Option<Entity> {
        self.inner.absence.borrow().get(property).cloned()
    }

    pub fn set_absence_information(&self, property: &str, information: Option<Entity>) {
        let mut absence = self.inner.absence.borrow_mut();
        match information {
            Some(info) => {
                absence.insert(property.to_string(), info);
            }
            None => {
                absence.remove(property);
            }
        }
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.inner.runtime_id == other.inner.runtime_id
    }
}

impl Eq for Entity {}

impl Hash for Entity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.runtime_id.hash(state);
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.type_signature(), self.runtime_id())?;
        if let Some(global_id) = self.global_id() {
            write!(f, "({})", global_id)?;
        }
        Ok(())
    }
}
