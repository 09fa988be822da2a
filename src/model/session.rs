//! Entity session
//!
//! The session owns the set of attached entities and is the only tracked
//! mutation path: every change is expressed as a [`Manipulation`], applied to
//! the entity graph and then delivered to listeners.
//!
//! Listener delivery:
//! - global listeners receive the manipulation as applied (compounds whole)
//! - entity and entity-property listeners receive each touching leaf
//! - callbacks run synchronously after the mutation, with no internal borrow held

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use indexmap::IndexMap;
use uuid::Uuid;

use crate::manipulation::{Manipulation, ManipulationKind, PropertyOwner};

use super::builtin::GLOBAL_ID_PROPERTY;
use super::entity::Entity;
use super::errors::{ModelError, ModelResult};
use super::registry::TypeRegistry;
use super::types::{GenericModelType, Property};
use super::value::{Value, ValueMap};

/// Origin of an applied manipulation, delivered to listeners so that
/// reactive code can refrain from re-firing on replayed changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManipulationMode {
    /// Direct mutation by the application
    Normal,
    /// Undo/redo of a locally recorded manipulation
    Local,
    /// Replay of a manipulation whose entities are already resolved
    Remote,
    /// Replay of a manipulation whose references were resolved by globalId
    RemoteGlobal,
}

#[derive(Debug, Clone)]
pub struct ManipulationEvent {
    pub manipulation: Manipulation,
    pub mode: ManipulationMode,
}

pub type ManipulationListener = Rc<dyn Fn(&ManipulationEvent)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
struct Listeners {
    global: Vec<(ListenerId, ManipulationListener)>,
    by_entity: HashMap<u64, Vec<(ListenerId, ManipulationListener)>>,
    by_property: HashMap<(u64, String), Vec<(ListenerId, ManipulationListener)>>,
}

struct SessionInner {
    registry: Arc<TypeRegistry>,
    entities: RefCell<IndexMap<u64, Entity>>,
    by_global_id: RefCell<HashMap<String, Entity>>,
    listeners: RefCell<Listeners>,
    next_listener_id: Cell<u64>,
}

#[derive(Clone)]
pub struct EntitySession {
    inner: Rc<SessionInner>,
}

impl EntitySession {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self {
            inner: Rc::new(SessionInner {
                registry,
                entities: RefCell::new(IndexMap::new()),
                by_global_id: RefCell::new(HashMap::new()),
                listeners: RefCell::new(Listeners::default()),
                next_listener_id: Cell::new(1),
            }),
        }
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.inner.registry
    }

    // ==================
    // Queries
    // ==================

    pub fn len(&self) -> usize {
        self.inner.entities.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, entity: &Entity) -> bool {
        self.inner
            .entities
            .borrow()
            .contains_key(&entity.runtime_id())
    }

    pub fn find(&self, global_id: &str) -> Option<Entity> {
        self.inner.by_global_id.borrow().get(global_id).cloned()
    }

    pub fn get(&self, global_id: &str) -> ModelResult<Entity> {
        self.find(global_id)
            .ok_or_else(|| ModelError::EntityNotFound(global_id.to_string()))
    }

    /// Attached entities assignable to `signature`, in attachment order.
    pub fn list(&self, signature: &str) -> Vec<Entity> {
        self.inner
            .entities
            .borrow()
            .values()
            .filter(|e| e.entity_type().is_assignable_to(signature))
            .cloned()
            .collect()
    }

    // ==================
    // Tracked mutation
    // ==================

    /// Creates and attaches an entity with a random globalId.
    pub fn create_entity(&self, signature: &str) -> ModelResult<Entity> {
        self.create_entity_with_id(signature, &Uuid::new_v4().to_string())
    }

    pub fn create_entity_with_id(&self, signature: &str, global_id: &str) -> ModelResult<Entity> {
        let entity_type = self.inner.registry.require_entity_type(signature)?;
        if entity_type.is_abstract() {
            return Err(ModelError::AbstractType(signature.to_string()));
        }
        if self.find(global_id).is_some() {
            return Err(ModelError::DuplicateGlobalId(global_id.to_string()));
        }
        let entity = Entity::new(entity_type);
        entity.set_direct(GLOBAL_ID_PROPERTY, Value::String(global_id.to_string()));

        self.apply(
            &Manipulation::instantiation(entity.clone()),
            ManipulationMode::Normal,
        )?;
        Ok(entity)
    }

    pub fn delete_entity(&self, entity: &Entity) -> ModelResult<Manipulation> {
        if !self.contains(entity) {
            return Err(ModelError::EntityNotFound(describe(entity)));
        }
        let manipulation = Manipulation::delete(entity.clone());
        self.apply(&manipulation, ManipulationMode::Normal)?;
        Ok(manipulation)
    }

    /// Sets a property and returns the emitted manipulation.
    pub fn set(
        &self,
        entity: &Entity,
        property: &str,
        value: impl Into<Value>,
    ) -> ModelResult<Manipulation> {
        let value = value.into();
        let declared = self.property(entity, property)?;
        self.check_instance(property, declared.ty(), &value)?;
        if declared.is_global_id() {
            if let Value::String(id) = &value {
                if self.find(id).is_some_and(|other| &other != entity) {
                    return Err(ModelError::DuplicateGlobalId(id.clone()));
                }
            }
        }

        let old_value = entity.get_direct(property);
        let manipulation = Manipulation::change_value(
            PropertyOwner::new(entity.clone(), property),
            value,
            old_value,
        );
        self.apply(&manipulation, ManipulationMode::Normal)?;
        Ok(manipulation)
    }

    /// Adds collection items (list index → element, set element → element,
    /// map key → value). Returns `None` when nothing changes.
    pub fn add(
        &self,
        entity: &Entity,
        property: &str,
        items: ValueMap,
    ) -> ModelResult<Option<Manipulation>> {
        let declared = self.property(entity, property)?;
        let owner = PropertyOwner::new(entity.clone(), property);
        let current = entity.get_direct(property);

        let manipulation = match declared.ty() {
            GenericModelType::List(element) => {
                for (index, item) in &items {
                    self.check_list_index(property, index)?;
                    self.check_instance(property, element, item)?;
                }
                Manipulation::add(owner, items)
            }
            GenericModelType::Set(element) => {
                let present = current.as_set();
                let mut fresh = ValueMap::new();
                for item in items.into_values() {
                    self.check_instance(property, element, &item)?;
                    if !present.is_some_and(|s| s.contains(&item)) {
                        fresh.insert(item.clone(), item);
                    }
                }
                Manipulation::add(owner, fresh)
            }
            GenericModelType::Map(key_type, value_type) => {
                let present = current.as_map();
                let mut overwritten = ValueMap::new();
                for (key, value) in &items {
                    self.check_instance(property, key_type, key)?;
                    self.check_instance(property, value_type, value)?;
                    if let Some(old) = present.and_then(|m| m.get(key)) {
                        overwritten.insert(key.clone(), old.clone());
                    }
                }
                if overwritten.is_empty() {
                    Manipulation::add(owner, items)
                } else {
                    let inverse = ManipulationKind::Compound {
                        manipulations: vec![
                            Manipulation::remove(owner.clone(), items.clone()),
                            Manipulation::add(owner.clone(), overwritten),
                        ],
                    };
                    Manipulation::with_inverse(ManipulationKind::Add { owner, items }, inverse)
                }
            }
            _ => return Err(self.not_a_collection(entity, property)),
        };

        self.apply_if_effective(manipulation)
    }

    /// Removes collection items. Keys select what to remove (list index, set
    /// element, map key); the manipulation records the removed values.
    pub fn remove(
        &self,
        entity: &Entity,
        property: &str,
        keys: impl IntoIterator<Item = Value>,
    ) -> ModelResult<Option<Manipulation>> {
        let declared = self.property(entity, property)?;
        let owner = PropertyOwner::new(entity.clone(), property);
        let current = entity.get_direct(property);

        let mut removed = ValueMap::new();
        match (declared.ty(), &current) {
            (GenericModelType::List(_), Value::List(list)) => {
                for key in keys {
                    let index = self.check_list_index(property, &key)?;
                    if let Some(item) = list.get(index) {
                        removed.insert(key, item.clone());
                    }
                }
            }
            (GenericModelType::Set(_), Value::Set(set)) => {
                for key in keys {
                    if set.contains(&key) {
                        removed.insert(key.clone(), key);
                    }
                }
            }
            (GenericModelType::Map(_, _), Value::Map(map)) => {
                for key in keys {
                    if let Some(value) = map.get(&key) {
                        removed.insert(key, value.clone());
                    }
                }
            }
            (ty, _) if ty.is_collection() => {}
            _ => return Err(self.not_a_collection(entity, property)),
        }

        self.apply_if_effective(Manipulation::remove(owner, removed))
    }

    pub fn list_push(
        &self,
        entity: &Entity,
        property: &str,
        item: impl Into<Value>,
    ) -> ModelResult<Option<Manipulation>> {
        let len = entity.get_direct(property).as_list().map_or(0, Vec::len);
        self.list_insert(entity, property, len, item)
    }

    pub fn list_insert(
        &self,
        entity: &Entity,
        property: &str,
        index: usize,
        item: impl Into<Value>,
    ) -> ModelResult<Option<Manipulation>> {
        let mut items = ValueMap::new();
        items.insert(index_value(index), item.into());
        self.add(entity, property, items)
    }

    pub fn list_remove_at(
        &self,
        entity: &Entity,
        property: &str,
        index: usize,
    ) -> ModelResult<Option<Manipulation>> {
        self.remove(entity, property, [index_value(index)])
    }

    pub fn set_insert(
        &self,
        entity: &Entity,
        property: &str,
        item: impl Into<Value>,
    ) -> ModelResult<Option<Manipulation>> {
        let item = item.into();
        let mut items = ValueMap::new();
        items.insert(item.clone(), item);
        self.add(entity, property, items)
    }

    pub fn set_remove(
        &self,
        entity: &Entity,
        property: &str,
        item: impl Into<Value>,
    ) -> ModelResult<Option<Manipulation>> {
        self.remove(entity, property, [item.into()])
    }

    pub fn map_put(
        &self,
        entity: &Entity,
        property: &str,
        key: impl Into<Value>,
        value: impl Into<Value>,
    ) -> ModelResult<Option<Manipulation>> {
        let mut items = ValueMap::new();
        items.insert(key.into(), value.into());
        self.add(entity, property, items)
    }

    pub fn map_remove(
        &self,
        entity: &Entity,
        property: &str,
        key: impl Into<Value>,
    ) -> ModelResult<Option<Manipulation>> {
        self.remove(entity, property, [key.into()])
    }

    /// Applies a manipulation to the entity graph and notifies listeners.
    pub fn apply(&self, manipulation: &Manipulation, mode: ManipulationMode) -> ModelResult<()> {
        let leaves = manipulation.leaves();
        for leaf in &leaves {
            self.apply_leaf(leaf.kind())?;
        }
        self.notify(manipulation, &leaves, mode);
        Ok(())
    }

    /// Detaches every entity without notifying listeners.
    pub fn reset(&self) {
        self.inner.entities.borrow_mut().clear();
        self.inner.by_global_id.borrow_mut().clear();
    }

    // ==================
    // Listeners
    // ==================

    pub fn add_listener(&self, listener: impl Fn(&ManipulationEvent) + 'static) -> ListenerId {
        let id = self.next_listener_id();
        self.inner
            .listeners
            .borrow_mut()
            .global
            .push((id, Rc::new(listener)));
        id
    }

    pub fn add_entity_listener(
        &self,
        entity: &Entity,
        listener: impl Fn(&ManipulationEvent) + 'static,
    ) -> ListenerId {
        let id = self.next_listener_id();
        self.inner
            .listeners
            .borrow_mut()
            .by_entity
            .entry(entity.runtime_id())
            .or_default()
            .push((id, Rc::new(listener)));
        id
    }

    pub fn add_property_listener(
        &self,
        entity: &Entity,
        property: &str,
        listener: impl Fn(&ManipulationEvent) + 'static,
    ) -> ListenerId {
        let id = self.next_listener_id();
        self.inner
            .listeners
            .borrow_mut()
            .by_property
            .entry((entity.runtime_id(), property.to_string()))
            .or_default()
            .push((id, Rc::new(listener)));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) {
        let mut listeners = self.inner.listeners.borrow_mut();
        listeners.global.retain(|(lid, _)| *lid != id);
        for entries in listeners.by_entity.values_mut() {
            entries.retain(|(lid, _)| *lid != id);
        }
        for entries in listeners.by_property.values_mut() {
            entries.retain(|(lid, _)| *lid != id);
        }
    }

    fn next_listener_id(&self) -> ListenerId {
        let id = self.inner.next_listener_id.get();
        self.inner.next_listener_id.set(id + 1);
        ListenerId(id)
    }

    fn notify(&self, manipulation: &Manipulation, leaves: &[Manipulation], mode: ManipulationMode) {
        let mut scoped: Vec<(ManipulationListener, Manipulation)> = Vec::new();
        let global: Vec<ManipulationListener> = {
            let listeners = self.inner.listeners.borrow();
            for leaf in leaves {
                let Some(entity) = leaf.kind().touched_entity() else {
                    continue;
                };
                if let Some(entries) = listeners.by_entity.get(&entity.runtime_id()) {
                    scoped.extend(entries.iter().map(|(_, l)| (Rc::clone(l), leaf.clone())));
                }
                if let Some(property) = leaf_property(leaf.kind()) {
                    let key = (entity.runtime_id(), property.to_string());
                    if let Some(entries) = listeners.by_property.get(&key) {
                        scoped.extend(entries.iter().map(|(_, l)| (Rc::clone(l), leaf.clone())));
                    }
                }
            }
            listeners.global.iter().map(|(_, l)| Rc::clone(l)).collect()
        };

        let event = ManipulationEvent {
            manipulation: manipulation.clone(),
            mode,
        };
        for listener in global {
            listener(&event);
        }
        for (listener, leaf) in scoped {
            listener(&ManipulationEvent {
                manipulation: leaf,
                mode,
            });
        }
    }

    // ==================
    // Application
    // ==================

    fn apply_leaf(&self, kind: &ManipulationKind) -> ModelResult<()> {
        match kind {
            ManipulationKind::Instantiation { entity } => self.attach(entity),
            ManipulationKind::Delete { entity } => {
                self.detach(entity);
                Ok(())
            }
            ManipulationKind::ChangeValue { owner, new_value } => {
                if owner.property == GLOBAL_ID_PROPERTY && self.contains(&owner.entity) {
                    self.reindex_global_id(&owner.entity, new_value);
                }
                owner.entity.set_direct(&owner.property, new_value.clone());
                Ok(())
            }
            ManipulationKind::Add { owner, items } => {
                let ty = self.property(&owner.entity, &owner.property)?.ty().clone();
                owner
                    .entity
                    .with_slot_mut(&owner.property, |slot| add_items(slot, &ty, items));
                Ok(())
            }
            ManipulationKind::Remove { owner, items } => {
                self.property(&owner.entity, &owner.property)?;
                owner
                    .entity
                    .with_slot_mut(&owner.property, |slot| remove_items(slot, items));
                Ok(())
            }
            // leaves() never yields compounds
            ManipulationKind::Compound { .. } => Ok(()),
        }
    }

    fn attach(&self, entity: &Entity) -> ModelResult<()> {
        if let Some(global_id) = entity.global_id() {
            let mut by_global_id = self.inner.by_global_id.borrow_mut();
            if let Some(existing) = by_global_id.get(&global_id) {
                if existing != entity {
                    return Err(ModelError::DuplicateGlobalId(global_id));
                }
            }
            by_global_id.insert(global_id, entity.clone());
        }
        self.inner
            .entities
            .borrow_mut()
            .insert(entity.runtime_id(), entity.clone());
        Ok(())
    }

    fn detach(&self, entity: &Entity) {
        self.inner
            .entities
            .borrow_mut()
            .shift_remove(&entity.runtime_id());
        if let Some(global_id) = entity.global_id() {
            let mut by_global_id = self.inner.by_global_id.borrow_mut();
            if by_global_id.get(&global_id) == Some(entity) {
                by_global_id.remove(&global_id);
            }
        }
    }

    fn reindex_global_id(&self, entity: &Entity, new_value: &Value) {
        let mut by_global_id = self.inner.by_global_id.borrow_mut();
        if let Some(old) = entity.global_id() {
            by_global_id.remove(&old);
        }
        if let Value::String(new_id) = new_value {
            by_global_id.insert(new_id.clone(), entity.clone());
        }
    }

    fn apply_if_effective(&self, manipulation: Manipulation) -> ModelResult<Option<Manipulation>> {
        let empty = match manipulation.kind() {
            ManipulationKind::Add { items, .. } | ManipulationKind::Remove { items, .. } => {
                items.is_empty()
            }
            _ => false,
        };
        if empty {
            return Ok(None);
        }
        self.apply(&manipulation, ManipulationMode::Normal)?;
        Ok(Some(manipulation))
    }

    fn property<'a>(&self, entity: &'a Entity, property: &str) -> ModelResult<&'a Property> {
        entity
            .entity_type()
            .find_property(property)
            .ok_or_else(|| ModelError::UnknownProperty {
                type_signature: entity.type_signature().to_string(),
                property: property.to_string(),
            })
    }

    fn check_instance(
        &self,
        property: &str,
        declared: &GenericModelType,
        value: &Value,
    ) -> ModelResult<()> {
        if self.inner.registry.is_instance(declared, value) {
            Ok(())
        } else {
            Err(ModelError::TypeMismatch {
                property: property.to_string(),
                expected: declared.type_signature(),
                actual: value.actual_type().type_signature(),
            })
        }
    }

    fn check_list_index(&self, property: &str, key: &Value) -> ModelResult<usize> {
        match key {
            Value::Integer(i) if *i >= 0 => Ok(*i as usize),
            other => Err(ModelError::TypeMismatch {
                property: property.to_string(),
                expected: "list index".to_string(),
                actual: other.actual_type().type_signature(),
            }),
        }
    }

    fn not_a_collection(&self, entity: &Entity, property: &str) -> ModelError {
        ModelError::NotACollection {
            type_signature: entity.type_signature().to_string(),
            property: property.to_string(),
        }
    }
}

fn describe(entity: &Entity) -> String {
    entity
        .global_id()
        .unwrap_or_else(|| format!("{:?}", entity))
}

fn index_value(index: usize) -> Value {
    Value::Integer(i32::try_from(index).unwrap_or(i32::MAX))
}

fn leaf_property(kind: &ManipulationKind) -> Option<&str> {
    match kind {
        ManipulationKind::ChangeValue { owner, .. }
        | ManipulationKind::Add { owner, .. }
        | ManipulationKind::Remove { owner, .. } => Some(&owner.property),
        _ => None,
    }
}

fn list_index(key: &Value) -> Option<usize> {
    match key {
        Value::Integer(i) if *i >= 0 => Some(*i as usize),
        Value::Long(l) if *l >= 0 => usize::try_from(*l).ok(),
        _ => None,
    }
}

fn add_items(slot: &mut Value, ty: &GenericModelType, items: &ValueMap) {
    if slot.is_null() {
        *slot = ty.empty_value();
    }
    match slot {
        Value::List(list) => {
            let mut indexed: Vec<(usize, &Value)> = items
                .iter()
                .filter_map(|(k, v)| list_index(k).map(|i| (i, v)))
                .collect();
            indexed.sort_by_key(|(i, _)| *i);
            for (index, item) in indexed {
                let at = index.min(list.len());
                list.insert(at, item.clone());
            }
        }
        Value::Set(set) => {
            for item in items.values() {
                set.insert(item.clone());
            }
        }
        Value::Map(map) => {
            for (key, value) in items {
                map.insert(key.clone(), value.clone());
            }
        }
        _ => {}
    }
}

fn remove_items(slot: &mut Value, items: &ValueMap) {
    match slot {
        Value::List(list) => {
            let mut indexes: Vec<usize> = items.keys().filter_map(list_index).collect();
            indexes.sort_unstable_by(|a, b| b.cmp(a));
            for index in indexes {
                if index < list.len() {
                    list.remove(index);
                }
            }
        }
        Value::Set(set) => {
            for item in items.keys() {
                set.shift_remove(item);
            }
        }
        Value::Map(map) => {
            for key in items.keys() {
                map.shift_remove(key);
            }
        }
        _ => {}
    }
}
