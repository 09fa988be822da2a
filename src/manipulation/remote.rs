//! Wire JSON → live manipulations
//!
//! Decoding happens in two steps. [`decode_manipulations`] parses and type
//! checks the document without touching any session. [`DecodedManipulations::apply`]
//! then resolves entity references by globalId against the session, one
//! manipulation at a time, so that later manipulations can refer to
//! entities instantiated by earlier ones.

use std::collections::HashMap;
use std::sync::Arc;

use crate::codec::JsonUnmarshaller;
use crate::model::builtin::{
    ADD_MANIPULATION, CHANGE_VALUE_MANIPULATION, COMPOUND_MANIPULATION, DELETE_MANIPULATION,
    ENTITY_REFERENCE, GLOBAL_ID_PROPERTY, INSTANTIATION_MANIPULATION, PROP_COMPOUND_LIST,
    PROP_ENTITY, PROP_ITEMS_TO_ADD, PROP_ITEMS_TO_REMOVE, PROP_NEW_VALUE, PROP_OWNER,
    PROP_PROPERTY_NAME, REFERENCE_REF_ID, REFERENCE_TYPE_SIGNATURE, REMOVE_MANIPULATION,
};
use crate::model::{
    Entity, EntitySession, ManipulationMode, TypeRegistry, Value, ValueMap,
};

use super::errors::{WireError, WireResult};
use super::manipulation::{Manipulation, PropertyOwner};
use super::marshal::wire_root_type;

/// Type-checked wire manipulations awaiting resolution.
#[derive(Debug, Clone)]
pub struct DecodedManipulations {
    wire: Vec<Entity>,
}

/// Parses a marshalled manipulation list.
pub fn decode_manipulations(
    registry: &Arc<TypeRegistry>,
    json: &str,
) -> WireResult<DecodedManipulations> {
    let value = JsonUnmarshaller::new(Arc::clone(registry)).unmarshal_as(json, &wire_root_type())?;
    let items = match value {
        Value::List(items) => items,
        other => {
            return Err(WireError::Malformed(format!(
                "expected a manipulation list, got {:?}",
                other.actual_type()
            )))
        }
    };

    let wire = items
        .into_iter()
        .map(|item| match item {
            Value::Entity(entity) => Ok(entity),
            other => Err(WireError::Malformed(format!(
                "expected a manipulation entity, got {:?}",
                other.actual_type()
            ))),
        })
        .collect::<WireResult<Vec<_>>>()?;
    Ok(DecodedManipulations { wire })
}

impl DecodedManipulations {
    pub fn len(&self) -> usize {
        self.wire.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wire.is_empty()
    }

    /// Resolves and applies each manipulation in order, returning the
    /// applied manipulations.
    pub fn apply(
        &self,
        session: &EntitySession,
        mode: ManipulationMode,
    ) -> WireResult<Vec<Manipulation>> {
        let mut resolver = ReferenceResolver::new(session);
        let mut applied = Vec::with_capacity(self.wire.len());
        for wire in &self.wire {
            resolver.shadow.clear();
            let manipulation = resolver.manipulation(wire)?;
            session.apply(&manipulation, mode)?;
            applied.push(manipulation);
        }
        Ok(applied)
    }
}

struct ReferenceResolver<'a> {
    session: &'a EntitySession,
    /// Entities instantiated in this batch, by globalId
    pending: HashMap<String, Entity>,
    /// Values written by earlier members of the current compound
    shadow: HashMap<(u64, String), Value>,
}

fn string_property(wire: &Entity, property: &str) -> WireResult<String> {
    match wire.get_direct(property) {
        Value::String(s) => Ok(s),
        other => Err(WireError::Malformed(format!(
            "{} of {} must be a string, got {:?}",
            property,
            wire.type_signature(),
            other
        ))),
    }
}

fn entity_property(wire: &Entity, property: &str) -> WireResult<Entity> {
    match wire.get_direct(property) {
        Value::Entity(e) => Ok(e),
        other => Err(WireError::Malformed(format!(
            "{} of {} must be an entity reference, got {:?}",
            property,
            wire.type_signature(),
            other
        ))),
    }
}

fn map_property(wire: &Entity, property: &str) -> WireResult<ValueMap> {
    match wire.get_direct(property) {
        Value::Map(m) => Ok(m),
        Value::Null => Ok(ValueMap::new()),
        other => Err(WireError::Malformed(format!(
            "{} of {} must be a map, got {:?}",
            property,
            wire.type_signature(),
            other
        ))),
    }
}

impl<'a> ReferenceResolver<'a> {
    fn new(session: &'a EntitySession) -> Self {
        Self {
            session,
            pending: HashMap::new(),
            shadow: HashMap::new(),
        }
    }

    fn lookup(&self, global_id: &str) -> Option<Entity> {
        self.session
            .find(global_id)
            .or_else(|| self.pending.get(global_id).cloned())
    }

    fn resolve(&self, reference: &Entity) -> WireResult<Entity> {
        if reference.type_signature() != ENTITY_REFERENCE {
            return Err(WireError::Malformed(format!(
                "expected {}, got {}",
                ENTITY_REFERENCE,
                reference.type_signature()
            )));
        }
        let ref_id = string_property(reference, REFERENCE_REF_ID)?;
        self.lookup(&ref_id)
            .ok_or(WireError::UnresolvedReference(ref_id))
    }

    /// Instantiation is idempotent: an already known globalId resolves to
    /// the existing entity.
    fn instantiate(&mut self, reference: &Entity) -> WireResult<Entity> {
        let ref_id = string_property(reference, REFERENCE_REF_ID)?;
        if let Some(existing) = self.lookup(&ref_id) {
            return Ok(existing);
        }
        let signature = string_property(reference, REFERENCE_TYPE_SIGNATURE)?;
        let entity_type = self.session.registry().require_entity_type(&signature)?;
        let entity = Entity::new(entity_type);
        entity.set_direct(GLOBAL_ID_PROPERTY, Value::String(ref_id.clone()));
        self.pending.insert(ref_id, entity.clone());
        Ok(entity)
    }

    fn value(&self, value: &Value) -> WireResult<Value> {
        Ok(match value {
            Value::Entity(reference) => Value::Entity(self.resolve(reference)?),
            Value::List(items) => Value::List(
                items
                    .iter()
                    .map(|v| self.value(v))
                    .collect::<WireResult<_>>()?,
            ),
            Value::Set(items) => Value::Set(
                items
                    .iter()
                    .map(|v| self.value(v))
                    .collect::<WireResult<_>>()?,
            ),
            Value::Map(entries) => Value::Map(self.items(entries)?),
            other => other.clone(),
        })
    }

    fn items(&self, items: &ValueMap) -> WireResult<ValueMap> {
        items
            .iter()
            .map(|(k, v)| Ok((self.value(k)?, self.value(v)?)))
            .collect()
    }

    fn owner(&self, wire: &Entity) -> WireResult<PropertyOwner> {
        let entity = self.resolve(&entity_property(wire, PROP_OWNER)?)?;
        let property = string_property(wire, PROP_PROPERTY_NAME)?;
        Ok(PropertyOwner::new(entity, property))
    }

    fn manipulation(&mut self, wire: &Entity) -> WireResult<Manipulation> {
        match wire.type_signature() {
            INSTANTIATION_MANIPULATION => {
                let reference = entity_property(wire, PROP_ENTITY)?;
                Ok(Manipulation::instantiation(self.instantiate(&reference)?))
            }
            DELETE_MANIPULATION => {
                let reference = entity_property(wire, PROP_ENTITY)?;
                Ok(Manipulation::delete(self.resolve(&reference)?))
            }
            CHANGE_VALUE_MANIPULATION => {
                let owner = self.owner(wire)?;
                let new_value = self.value(&wire.get_direct(PROP_NEW_VALUE))?;
                let slot = (owner.entity.runtime_id(), owner.property.clone());
                let old_value = match self.shadow.get(&slot) {
                    Some(value) => value.clone(),
                    None => owner.entity.get_direct(&owner.property),
                };
                self.shadow.insert(slot, new_value.clone());
                Ok(Manipulation::change_value(owner, new_value, old_value))
            }
            ADD_MANIPULATION => {
                let owner = self.owner(wire)?;
                let items = self.items(&map_property(wire, PROP_ITEMS_TO_ADD)?)?;
                Ok(Manipulation::add(owner, items))
            }
            REMOVE_MANIPULATION => {
                let owner = self.owner(wire)?;
                let items = self.items(&map_property(wire, PROP_ITEMS_TO_REMOVE)?)?;
                Ok(Manipulation::remove(owner, items))
            }
            COMPOUND_MANIPULATION => {
                let members = match wire.get_direct(PROP_COMPOUND_LIST) {
                    Value::List(members) => members,
                    Value::Null => Vec::new(),
                    other => {
                        return Err(WireError::Malformed(format!(
                            "compound members must be a list, got {:?}",
                            other
                        )))
                    }
                };
                let members = members
                    .iter()
                    .map(|member| match member {
                        Value::Entity(member) => self.manipulation(member),
                        other => Err(WireError::Malformed(format!(
                            "compound member must be a manipulation, got {:?}",
                            other
                        ))),
                    })
                    .collect::<WireResult<Vec<_>>>()?;
                Ok(Manipulation::compound(members))
            }
            other => Err(WireError::Malformed(format!(
                "unknown manipulation type {}",
                other
            ))),
        }
    }
}
