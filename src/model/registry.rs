//! Type registry
//!
//! Holds every entity and enum type known to a store. Registration flattens
//! inherited properties so that an `EntityType` answers property lookups on
//! its own. A registry is built once and then shared read-only (`Arc`).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::builtin::{self, GENERIC_ENTITY};
use super::errors::{ModelError, ModelResult};
use super::types::{EntityType, EntityTypeBuilder, EnumType, GenericModelType, Property};
use super::value::Value;

#[derive(Debug)]
pub struct TypeRegistry {
    entity_types: HashMap<String, Arc<EntityType>>,
    enum_types: HashMap<String, Arc<EnumType>>,
    /// Registration order, for deterministic iteration
    order: Vec<String>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    /// Creates a registry holding the built-in types.
    pub fn new() -> Self {
        let mut registry = Self {
            entity_types: HashMap::new(),
            enum_types: HashMap::new(),
            order: Vec::new(),
        };
        // Built-ins are static and well-formed; a failure here is unreachable.
        let _ = builtin::register_builtin_types(&mut registry);
        registry
    }

    pub(crate) fn register_root_type(
        &mut self,
        builder: EntityTypeBuilder,
    ) -> ModelResult<Arc<EntityType>> {
        self.insert_entity_type(builder, false)
    }

    /// Registers an entity type. Supertypes must already be registered; the
    /// root entity type is an implicit supertype of every type.
    pub fn register_entity_type(
        &mut self,
        builder: EntityTypeBuilder,
    ) -> ModelResult<Arc<EntityType>> {
        self.insert_entity_type(builder, true)
    }

    fn insert_entity_type(
        &mut self,
        mut builder: EntityTypeBuilder,
        derive_root: bool,
    ) -> ModelResult<Arc<EntityType>> {
        if self.is_known(&builder.signature) {
            return Err(ModelError::DuplicateType(builder.signature));
        }
        if derive_root && !builder.supertypes.iter().any(|s| s == GENERIC_ENTITY) {
            builder.supertypes.insert(0, GENERIC_ENTITY.to_string());
        }

        let mut ancestry = HashSet::new();
        ancestry.insert(builder.signature.clone());
        let mut properties: Vec<Property> = Vec::new();

        for supertype in &builder.supertypes {
            let parent = self
                .entity_types
                .get(supertype)
                .ok_or_else(|| ModelError::UnknownType(supertype.clone()))?;
            ancestry.extend(parent.ancestry().iter().cloned());
            for property in parent.properties() {
                if !properties.iter().any(|p| p.name() == property.name()) {
                    properties.push(property.clone());
                }
            }
        }
        for property in builder.properties {
            match properties.iter_mut().find(|p| p.name() == property.name()) {
                Some(existing) => *existing = property,
                None => properties.push(property),
            }
        }

        let entity_type = Arc::new(EntityType::new(
            builder.signature.clone(),
            builder.is_abstract,
            builder.supertypes,
            ancestry,
            properties,
        ));
        self.order.push(builder.signature.clone());
        self.entity_types
            .insert(builder.signature, Arc::clone(&entity_type));
        Ok(entity_type)
    }

    pub fn register_enum_type<I, S>(
        &mut self,
        signature: impl Into<String>,
        constants: I,
    ) -> ModelResult<Arc<EnumType>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let signature = signature.into();
        if self.is_known(&signature) {
            return Err(ModelError::DuplicateType(signature));
        }
        let enum_type = Arc::new(EnumType::new(
            signature.clone(),
            constants.into_iter().map(Into::into).collect(),
        ));
        self.enum_types.insert(signature, Arc::clone(&enum_type));
        Ok(enum_type)
    }

    fn is_known(&self, signature: &str) -> bool {
        self.entity_types.contains_key(signature)
            || self.enum_types.contains_key(signature)
            || GenericModelType::parse_simple(signature).is_some()
    }

    pub fn entity_type(&self, signature: &str) -> Option<Arc<EntityType>> {
        self.entity_types.get(signature).cloned()
    }

    pub fn enum_type(&self, signature: &str) -> Option<Arc<EnumType>> {
        self.enum_types.get(signature).cloned()
    }

    pub fn require_entity_type(&self, signature: &str) -> ModelResult<Arc<EntityType>> {
        self.entity_type(signature)
            .ok_or_else(|| ModelError::UnknownType(signature.to_string()))
    }

    /// Resolves a type signature: simple type names, entity and enum signatures.
    pub fn find_type(&self, signature: &str) -> Option<GenericModelType> {
        if let Some(simple) = GenericModelType::parse_simple(signature) {
            return Some(simple);
        }
        if self.entity_types.contains_key(signature) {
            return Some(GenericModelType::Entity(signature.to_string()));
        }
        if self.enum_types.contains_key(signature) {
            return Some(GenericModelType::Enum(signature.to_string()));
        }
        None
    }

    /// Registered entity types in registration order.
    pub fn entity_types(&self) -> impl Iterator<Item = &Arc<EntityType>> {
        self.order.iter().filter_map(|sig| self.entity_types.get(sig))
    }

    /// Non-abstract types assignable to `signature`, in registration order.
    pub fn instantiable_subtypes(&self, signature: &str) -> Vec<Arc<EntityType>> {
        self.entity_types()
            .filter(|t| !t.is_abstract() && t.is_assignable_to(signature))
            .cloned()
            .collect()
    }

    /// Maps each property declared by exactly one instantiable subtype of an
    /// abstract type to that subtype. Usable as a codec disambiguation table.
    pub fn type_specific_properties(&self, abstract_signature: &str) -> HashMap<String, String> {
        let mut owners: HashMap<String, Vec<String>> = HashMap::new();
        for subtype in self.instantiable_subtypes(abstract_signature) {
            for property in subtype.properties() {
                owners
                    .entry(property.name().to_string())
                    .or_default()
                    .push(subtype.signature().to_string());
            }
        }
        owners
            .into_iter()
            .filter_map(|(property, mut types)| {
                if types.len() == 1 {
                    types.pop().map(|t| (property, t))
                } else {
                    None
                }
            })
            .collect()
    }

    /// Whether a value of type `actual` may be stored where `target` is declared.
    pub fn is_assignable(&self, target: &GenericModelType, actual: &GenericModelType) -> bool {
        match (target, actual) {
            (GenericModelType::Object, _) => true,
            (GenericModelType::Entity(sig), GenericModelType::Entity(actual_sig)) => self
                .entity_types
                .get(actual_sig)
                .map(|t| t.is_assignable_to(sig))
                .unwrap_or(false),
            (GenericModelType::List(a), GenericModelType::List(b))
            | (GenericModelType::Set(a), GenericModelType::Set(b)) => self.is_assignable(a, b),
            (GenericModelType::Map(ak, av), GenericModelType::Map(bk, bv)) => {
                self.is_assignable(ak, bk) && self.is_assignable(av, bv)
            }
            _ => target == actual,
        }
    }

    /// Deep instance check of a value against a declared type.
    pub fn is_instance(&self, ty: &GenericModelType, value: &Value) -> bool {
        match (ty, value) {
            (_, Value::Null) => true,
            (GenericModelType::Object, _) => true,
            (GenericModelType::Boolean, Value::Boolean(_))
            | (GenericModelType::String, Value::String(_))
            | (GenericModelType::Integer, Value::Integer(_))
            | (GenericModelType::Long, Value::Long(_))
            | (GenericModelType::Float, Value::Float(_))
            | (GenericModelType::Double, Value::Double(_))
            | (GenericModelType::Decimal, Value::Decimal(_))
            | (GenericModelType::Date, Value::Date(_)) => true,
            (GenericModelType::Enum(sig), Value::Enum(e)) => &e.type_signature == sig,
            (GenericModelType::Entity(sig), Value::Entity(e)) => {
                e.entity_type().is_assignable_to(sig)
            }
            (GenericModelType::List(el), Value::List(items)) => {
                items.iter().all(|v| self.is_instance(el, v))
            }
            (GenericModelType::Set(el), Value::Set(items)) => {
                items.iter().all(|v| self.is_instance(el, v))
            }
            (GenericModelType::Map(k, v), Value::Map(entries)) => entries
                .iter()
                .all(|(key, value)| self.is_instance(k, key) && self.is_instance(v, value)),
            _ => false,
        }
    }
}
