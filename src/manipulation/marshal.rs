//! Manipulations → wire JSON
//!
//! Each manipulation becomes an entity of the built-in manipulation model.
//! Entities touched by a manipulation, or appearing inside its values, are
//! replaced by `EntityReference`s naming their type and globalId.

use std::collections::HashMap;

use crate::codec::{marshal, MarshallingOptions};
use crate::model::builtin::{
    ADD_MANIPULATION, CHANGE_VALUE_MANIPULATION, COMPOUND_MANIPULATION, DELETE_MANIPULATION,
    ENTITY_REFERENCE, INSTANTIATION_MANIPULATION, MANIPULATION, PROP_COMPOUND_LIST, PROP_ENTITY,
    PROP_ITEMS_TO_ADD, PROP_ITEMS_TO_REMOVE, PROP_NEW_VALUE, PROP_OWNER, PROP_PROPERTY_NAME,
    REFERENCE_REF_ID, REFERENCE_TYPE_SIGNATURE, REMOVE_MANIPULATION,
};
use crate::model::{Entity, GenericModelType, TypeRegistry, Value, ValueMap};

use super::errors::{WireError, WireResult};
use super::manipulation::{Manipulation, ManipulationKind, PropertyOwner};

/// Declared root type of a marshalled manipulation list.
pub fn wire_root_type() -> GenericModelType {
    GenericModelType::list_of(GenericModelType::entity(MANIPULATION))
}

/// Marshals `manipulations` in order into one JSON document.
pub fn marshal_manipulations(
    registry: &TypeRegistry,
    manipulations: &[Manipulation],
) -> WireResult<String> {
    let mut encoder = WireEncoder::new(registry);
    let list = manipulations
        .iter()
        .map(|m| encoder.manipulation(m).map(Value::Entity))
        .collect::<WireResult<Vec<_>>>()?;

    let options = MarshallingOptions {
        inferred_root_type: Some(wire_root_type()),
        ..Default::default()
    };
    Ok(marshal(&Value::List(list), &options)?)
}

struct WireEncoder<'a> {
    registry: &'a TypeRegistry,
    /// runtime id → reference entity, one per entity per document
    references: HashMap<u64, Entity>,
}

impl<'a> WireEncoder<'a> {
    fn new(registry: &'a TypeRegistry) -> Self {
        Self {
            registry,
            references: HashMap::new(),
        }
    }

    fn instance(&self, signature: &str) -> WireResult<Entity> {
        Ok(Entity::new(self.registry.require_entity_type(signature)?))
    }

    fn reference(&mut self, entity: &Entity) -> WireResult<Entity> {
        if let Some(reference) = self.references.get(&entity.runtime_id()) {
            return Ok(reference.clone());
        }
        let global_id = entity
            .global_id()
            .ok_or_else(|| WireError::Unreferenceable(entity.type_signature().to_string()))?;

        let reference = self.instance(ENTITY_REFERENCE)?;
        reference.set_direct(
            REFERENCE_TYPE_SIGNATURE,
            Value::String(entity.type_signature().to_string()),
        );
        reference.set_direct(REFERENCE_REF_ID, Value::String(global_id));
        self.references.insert(entity.runtime_id(), reference.clone());
        Ok(reference)
    }

    fn value(&mut self, value: &Value) -> WireResult<Value> {
        Ok(match value {
            Value::Entity(entity) => Value::Entity(self.reference(entity)?),
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

    fn items(&mut self, items: &ValueMap) -> WireResult<ValueMap> {
        items
            .iter()
            .map(|(k, v)| Ok((self.value(k)?, self.value(v)?)))
            .collect()
    }

    fn owned(&mut self, signature: &str, owner: &PropertyOwner) -> WireResult<Entity> {
        let wire = self.instance(signature)?;
        wire.set_direct(PROP_OWNER, Value::Entity(self.reference(&owner.entity)?));
        wire.set_direct(PROP_PROPERTY_NAME, Value::String(owner.property.clone()));
        Ok(wire)
    }

    fn manipulation(&mut self, manipulation: &Manipulation) -> WireResult<Entity> {
        match manipulation.kind() {
            ManipulationKind::Instantiation { entity } => {
                let wire = self.instance(INSTANTIATION_MANIPULATION)?;
                wire.set_direct(PROP_ENTITY, Value::Entity(self.reference(entity)?));
                Ok(wire)
            }
            ManipulationKind::Delete { entity } => {
                let wire = self.instance(DELETE_MANIPULATION)?;
                wire.set_direct(PROP_ENTITY, Value::Entity(self.reference(entity)?));
                Ok(wire)
            }
            ManipulationKind::ChangeValue { owner, new_value } => {
                let wire = self.owned(CHANGE_VALUE_MANIPULATION, owner)?;
                wire.set_direct(PROP_NEW_VALUE, self.value(new_value)?);
                Ok(wire)
            }
            ManipulationKind::Add { owner, items } => {
                let wire = self.owned(ADD_MANIPULATION, owner)?;
                wire.set_direct(PROP_ITEMS_TO_ADD, Value::Map(self.items(items)?));
                Ok(wire)
            }
            ManipulationKind::Remove { owner, items } => {
                let wire = self.owned(REMOVE_MANIPULATION, owner)?;
                wire.set_direct(PROP_ITEMS_TO_REMOVE, Value::Map(self.items(items)?));
                Ok(wire)
            }
            ManipulationKind::Compound { manipulations } => {
                let wire = self.instance(COMPOUND_MANIPULATION)?;
                let members = manipulations
                    .iter()
                    .map(|m| self.manipulation(m).map(Value::Entity))
                    .collect::<WireResult<Vec<_>>>()?;
                wire.set_direct(PROP_COMPOUND_LIST, Value::List(members));
                Ok(wire)
            }
        }
    }
}
