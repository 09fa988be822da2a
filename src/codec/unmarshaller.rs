//! Conversion of parsed JSON into model values
//!
//! A [`ParsedJson`] is converted against a requested type. Objects become
//! entities when they carry `_type` or when the requested type is an entity
//! type; `_id`/`_ref` pairs and `id`/`globalId` properties link repeated
//! occurrences of the same entity. `id` is scoped by entity type, `globalId`
//! is not. Identities established under `id` mode persist across
//! calls on the same unmarshaller, and are only recorded once a whole
//! document converted successfully.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use crate::model::builtin::{ABSENCE_INFORMATION, GLOBAL_ID_PROPERTY, ID_PROPERTY};
use crate::model::{
    Entity, EntityType, GenericModelType, TypeRegistry, Value, ValueMap, ValueSet,
};

use super::coercion::coerce_scalar;
use super::errors::{CodecError, CodecResult, ReasonKind};
use super::json_value::{
    JsonArray, JsonField, JsonLiteral, JsonObject, JsonScalar, JsonValue, ABSENCE_PREFIX,
    VALUE_KEY,
};
use super::location::JsonSpan;
use super::options::{IdentityManagementMode, UnmarshallingOptions};
use super::parser::{parse, ParsedJson};

/// Creates entities for decoded objects.
pub trait EntityFactory {
    fn create(&self, entity_type: &Arc<EntityType>) -> Entity;
}

/// Creates plain detached entities.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedEntityFactory;

impl EntityFactory for DetachedEntityFactory {
    fn create(&self, entity_type: &Arc<EntityType>) -> Entity {
        Entity::new(Arc::clone(entity_type))
    }
}

pub struct JsonUnmarshaller {
    registry: Arc<TypeRegistry>,
    options: UnmarshallingOptions,
    factory: Rc<dyn EntityFactory>,
    identities: RefCell<HashMap<IdentityKey, Entity>>,
}

/// Durable identity of a decoded entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum IdentityKey {
    /// `id` property, unique per entity type
    Typed { signature: String, id: String },
    /// `globalId` property, unique across types
    Global(String),
}

impl JsonUnmarshaller {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self::with_options(registry, UnmarshallingOptions::default())
    }

    pub fn with_options(registry: Arc<TypeRegistry>, options: UnmarshallingOptions) -> Self {
        Self {
            registry,
            options,
            factory: Rc::new(DetachedEntityFactory),
            identities: RefCell::new(HashMap::new()),
        }
    }

    pub fn with_entity_factory(mut self, factory: Rc<dyn EntityFactory>) -> Self {
        self.factory = factory;
        self
    }

    pub fn options(&self) -> &UnmarshallingOptions {
        &self.options
    }

    /// Parses and converts against the inferred root type, or `object`.
    pub fn unmarshal(&self, json: &str) -> CodecResult<Value> {
        let target = self
            .options
            .inferred_root_type
            .clone()
            .unwrap_or(GenericModelType::Object);
        self.unmarshal_as(json, &target)
    }

    pub fn unmarshal_as(&self, json: &str, target: &GenericModelType) -> CodecResult<Value> {
        let parsed = parse(json)?;
        self.convert(&parsed, target)
    }

    /// Converts an already parsed document. All-or-nothing with respect to
    /// identities registered under `id` mode.
    pub fn convert(&self, parsed: &ParsedJson, target: &GenericModelType) -> CodecResult<Value> {
        let mode = match self.options.identity_management_mode {
            IdentityManagementMode::Auto => parsed
                .inferred_identity_mode
                .unwrap_or(IdentityManagementMode::Off),
            explicit => explicit,
        };

        let converted = {
            let durable = self.identities.borrow();
            let mut ctx = ConversionContext {
                registry: &self.registry,
                options: &self.options,
                mode,
                factory: self.factory.as_ref(),
                short_ids: HashMap::new(),
                durable: &durable,
                staged: HashMap::new(),
            };
            let value = ctx.convert(&parsed.root, target)?;
            (value, ctx.staged)
        };

        let (value, staged) = converted;
        self.identities.borrow_mut().extend(staged);
        Ok(value)
    }

    /// Number of `id`/`globalId` keys remembered across calls.
    pub fn known_identities(&self) -> usize {
        self.identities.borrow().len()
    }

    pub fn clear_identities(&self) {
        self.identities.borrow_mut().clear();
    }
}

struct ConversionContext<'a> {
    registry: &'a TypeRegistry,
    options: &'a UnmarshallingOptions,
    mode: IdentityManagementMode,
    factory: &'a dyn EntityFactory,
    short_ids: HashMap<String, Entity>,
    durable: &'a HashMap<IdentityKey, Entity>,
    staged: HashMap<IdentityKey, Entity>,
}

fn mismatch(found: &str, target: &GenericModelType, span: JsonSpan) -> CodecError {
    CodecError::conversion(
        ReasonKind::TypeMismatch,
        format!("Cannot convert {} to {}", found, target),
        span,
    )
}

fn snake_to_camel(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for c in name.chars() {
        if c == '_' && !out.is_empty() {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn identity_key(literal: &JsonLiteral) -> Option<String> {
    match literal {
        JsonLiteral::String(s) => Some(s.clone()),
        JsonLiteral::Integer(i) => Some(i.to_string()),
        JsonLiteral::Long(l) => Some(l.to_string()),
        _ => None,
    }
}

impl<'a> ConversionContext<'a> {
    fn convert(&mut self, value: &JsonValue, target: &GenericModelType) -> CodecResult<Value> {
        match value {
            JsonValue::Scalar(scalar) => {
                coerce_scalar(&scalar.literal, target, self.registry, scalar.span)
            }
            JsonValue::Array(array) => self.convert_array(array, target),
            JsonValue::Object(object) => self.convert_object(object, target),
        }
    }

    fn convert_array(&mut self, array: &JsonArray, target: &GenericModelType) -> CodecResult<Value> {
        match target {
            GenericModelType::List(element) => Ok(Value::List(self.convert_all(array, element)?)),
            GenericModelType::Object => Ok(Value::List(
                self.convert_all(array, &GenericModelType::Object)?,
            )),
            GenericModelType::Set(element) => {
                let mut set = ValueSet::with_capacity(array.values.len());
                for value in &array.values {
                    set.insert(self.convert(value, element)?);
                }
                Ok(Value::Set(set))
            }
            GenericModelType::Map(key, value) => self.convert_flat_map(array, key, value),
            _ => Err(mismatch("array", target, array.span)),
        }
    }

    fn convert_all(
        &mut self,
        array: &JsonArray,
        element: &GenericModelType,
    ) -> CodecResult<Vec<Value>> {
        array
            .values
            .iter()
            .map(|value| self.convert(value, element))
            .collect()
    }

    /// `[k1, v1, k2, v2, ...]`
    fn convert_flat_map(
        &mut self,
        array: &JsonArray,
        key_type: &GenericModelType,
        value_type: &GenericModelType,
    ) -> CodecResult<Value> {
        if array.values.len() % 2 != 0 {
            return Err(CodecError::conversion(
                ReasonKind::InvalidArgument,
                "Flat map requires an even number of elements",
                array.span,
            ));
        }
        let mut map = ValueMap::with_capacity(array.values.len() / 2);
        for pair in array.values.chunks(2) {
            let key = self.convert(&pair[0], key_type)?;
            let value = self.convert(&pair[1], value_type)?;
            map.insert(key, value);
        }
        Ok(Value::Map(map))
    }

    /// `[{"key": k1, "value": v1}, ...]`
    fn convert_entry_map(
        &mut self,
        array: &JsonArray,
        key_type: &GenericModelType,
        value_type: &GenericModelType,
    ) -> CodecResult<Value> {
        let mut map = ValueMap::with_capacity(array.values.len());
        for entry in &array.values {
            let object = entry.as_object().ok_or_else(|| {
                mismatch(entry.kind_name(), &GenericModelType::Object, entry.span())
            })?;
            let key = match object.get("key") {
                Some(key) => self.convert(key, key_type)?,
                None => Value::Null,
            };
            let value = match object.get(VALUE_KEY) {
                Some(value) => self.convert(value, value_type)?,
                None => Value::Null,
            };
            map.insert(key, value);
        }
        Ok(Value::Map(map))
    }

    fn convert_object(
        &mut self,
        object: &JsonObject,
        target: &GenericModelType,
    ) -> CodecResult<Value> {
        if let Some(field) = object.ref_field() {
            return self.resolve_reference(field, target);
        }

        if let Some(field) = object.type_field() {
            let name = field.value.as_str().ok_or_else(|| {
                CodecError::conversion(
                    ReasonKind::InvalidArgument,
                    "_type must be a string",
                    field.value.span(),
                )
            })?;
            return self.convert_typed_object(object, name, field.value.span(), target);
        }

        match target {
            GenericModelType::Entity(signature) => {
                let entity_type = self.resolve_implicit_type(object, signature)?;
                self.build_entity(object, &entity_type)
            }
            GenericModelType::Map(key, value) => self.convert_object_map(object, key, value),
            GenericModelType::Object => {
                if object.id_field().is_some() {
                    return Err(CodecError::conversion(
                        ReasonKind::InvalidArgument,
                        "Cannot determine the type of an identified object without _type",
                        object.span,
                    ));
                }
                self.convert_object_map(
                    object,
                    &GenericModelType::String,
                    &GenericModelType::Object,
                )
            }
            _ => Err(mismatch("object", target, object.span)),
        }
    }

    fn convert_object_map(
        &mut self,
        object: &JsonObject,
        key_type: &GenericModelType,
        value_type: &GenericModelType,
    ) -> CodecResult<Value> {
        let mut map = ValueMap::with_capacity(object.fields.len());
        for field in &object.fields {
            let key = coerce_scalar(
                &JsonLiteral::String(field.name.clone()),
                key_type,
                self.registry,
                field.name_span,
            )?;
            let value = self.convert(&field.value, value_type)?;
            map.insert(key, value);
        }
        Ok(Value::Map(map))
    }

    fn resolve_reference(
        &mut self,
        field: &JsonField,
        target: &GenericModelType,
    ) -> CodecResult<Value> {
        let span = field.value.span();
        if self.mode == IdentityManagementMode::Off {
            return Err(CodecError::conversion(
                ReasonKind::InvalidArgument,
                "_ref is not allowed without identity management",
                span,
            ));
        }
        let id = match &field.value {
            JsonValue::Scalar(JsonScalar { literal, .. }) => identity_key(literal),
            _ => None,
        }
        .ok_or_else(|| {
            CodecError::conversion(ReasonKind::InvalidArgument, "_ref must be a string", span)
        })?;

        let entity = self.short_ids.get(&id).cloned().ok_or_else(|| {
            CodecError::conversion(
                ReasonKind::NotFound,
                format!("Unresolved entity reference {}", id),
                span,
            )
        })?;
        self.check_assignable(&entity, target, span)?;
        Ok(Value::Entity(entity))
    }

    fn convert_typed_object(
        &mut self,
        object: &JsonObject,
        name: &str,
        span: JsonSpan,
        target: &GenericModelType,
    ) -> CodecResult<Value> {
        let boxed = || {
            object.get(VALUE_KEY).ok_or_else(|| {
                CodecError::conversion(
                    ReasonKind::InvalidArgument,
                    format!("Missing value of boxed {}", name),
                    object.span,
                )
            })
        };

        let element_or_object = |ty: Option<&GenericModelType>| {
            ty.cloned().unwrap_or(GenericModelType::Object)
        };

        match name {
            "set" | "list" | "flatmap" | "map" => {
                let (explicit, expected_code) = match name {
                    "set" => (
                        GenericModelType::set_of(element_or_object(match target {
                            GenericModelType::Set(e) => Some(e),
                            _ => None,
                        })),
                        "set",
                    ),
                    "list" => (
                        GenericModelType::list_of(element_or_object(match target {
                            GenericModelType::List(e) => Some(e),
                            _ => None,
                        })),
                        "list",
                    ),
                    _ => match target {
                        GenericModelType::Map(k, v) => {
                            (GenericModelType::Map(k.clone(), v.clone()), "map")
                        }
                        _ => (
                            GenericModelType::map_of(
                                GenericModelType::Object,
                                GenericModelType::Object,
                            ),
                            "map",
                        ),
                    },
                };
                if !target.is_base() && !self.registry.is_assignable(target, &explicit) {
                    return Err(mismatch(expected_code, target, span));
                }

                let value = boxed()?;
                let array = match value {
                    JsonValue::Array(array) => array,
                    other => return Err(mismatch(other.kind_name(), &explicit, other.span())),
                };
                match (&explicit, name) {
                    (GenericModelType::Map(k, v), "map") => self.convert_entry_map(array, k, v),
                    (GenericModelType::Map(k, v), _) => self.convert_flat_map(array, k, v),
                    _ => self.convert_array(array, &explicit),
                }
            }
            _ => match self.registry.find_type(name) {
                Some(GenericModelType::Entity(signature)) => {
                    let entity_type = self
                        .registry
                        .entity_type(&signature)
                        .ok_or_else(|| unknown_type(name, span))?;
                    if !target.is_base()
                        && !self
                            .registry
                            .is_assignable(target, &GenericModelType::Entity(signature))
                    {
                        return Err(mismatch(name, target, span));
                    }
                    self.build_entity(object, &entity_type)
                }
                Some(explicit) => {
                    if !self.registry.is_assignable(target, &explicit) {
                        return Err(mismatch(name, target, span));
                    }
                    let value = boxed()?;
                    self.convert(value, &explicit)
                }
                None => Err(unknown_type(name, span)),
            },
        }
    }

    fn resolve_implicit_type(
        &self,
        object: &JsonObject,
        signature: &str,
    ) -> CodecResult<Arc<EntityType>> {
        let entity_type = self
            .registry
            .entity_type(signature)
            .ok_or_else(|| unknown_type(signature, object.span))?;
        if !entity_type.is_abstract() {
            return Ok(entity_type);
        }

        if let Some(table) = self.options.type_disambiguation.get(signature) {
            for field in object.property_fields() {
                let name = self.property_name(&field.name);
                if let Some(concrete) = table.get(&name) {
                    return self
                        .registry
                        .entity_type(concrete)
                        .ok_or_else(|| unknown_type(concrete, field.name_span));
                }
            }
        }

        let mut candidates = self.registry.instantiable_subtypes(signature);
        if candidates.len() == 1 {
            if let Some(only) = candidates.pop() {
                return Ok(only);
            }
        }
        Err(CodecError::conversion(
            ReasonKind::InvalidArgument,
            format!("Cannot determine a concrete type for abstract {}", signature),
            object.span,
        ))
    }

    fn build_entity(
        &mut self,
        object: &JsonObject,
        entity_type: &Arc<EntityType>,
    ) -> CodecResult<Value> {
        if entity_type.is_abstract() {
            return Err(CodecError::conversion(
                ReasonKind::InvalidArgument,
                format!("Cannot instantiate abstract type {}", entity_type.signature()),
                object.span,
            ));
        }

        let entity = self.identify(object, entity_type)?;
        for field in object.property_fields() {
            self.assign_field(&entity, entity_type, field)?;
        }
        Ok(Value::Entity(entity))
    }

    /// Returns the entity an object denotes, registering new identities.
    fn identify(
        &mut self,
        object: &JsonObject,
        entity_type: &Arc<EntityType>,
    ) -> CodecResult<Entity> {
        match self.mode {
            IdentityManagementMode::ShortId => {
                let entity = self.factory.create(entity_type);
                if let Some(field) = object.id_field() {
                    let id = match &field.value {
                        JsonValue::Scalar(scalar) => identity_key(&scalar.literal),
                        _ => None,
                    }
                    .ok_or_else(|| {
                        CodecError::conversion(
                            ReasonKind::InvalidArgument,
                            "_id must be a string",
                            field.value.span(),
                        )
                    })?;
                    if self.short_ids.insert(id.clone(), entity.clone()).is_some() {
                        return Err(CodecError::conversion(
                            ReasonKind::InvalidArgument,
                            format!("Duplicate _id {}", id),
                            field.value.span(),
                        ));
                    }
                }
                Ok(entity)
            }
            IdentityManagementMode::Id => {
                let scalar_key = |name: &str| match object.get(name) {
                    Some(JsonValue::Scalar(scalar)) => identity_key(&scalar.literal),
                    _ => None,
                };
                let keys: Vec<IdentityKey> = [
                    scalar_key(ID_PROPERTY).map(|id| IdentityKey::Typed {
                        signature: entity_type.signature().to_string(),
                        id,
                    }),
                    scalar_key(GLOBAL_ID_PROPERTY).map(IdentityKey::Global),
                ]
                .into_iter()
                .flatten()
                .collect();

                let known = keys
                    .iter()
                    .find_map(|key| self.staged.get(key).or_else(|| self.durable.get(key)))
                    .cloned();
                let entity = known.unwrap_or_else(|| self.factory.create(entity_type));
                for key in keys {
                    if !self.durable.contains_key(&key) {
                        self.staged.entry(key).or_insert_with(|| entity.clone());
                    }
                }
                Ok(entity)
            }
            IdentityManagementMode::Off | IdentityManagementMode::Auto => {
                Ok(self.factory.create(entity_type))
            }
        }
    }

    fn property_name(&self, raw: &str) -> String {
        if self.options.snake_case_properties && raw.contains('_') {
            snake_to_camel(raw)
        } else {
            raw.to_string()
        }
    }

    fn assign_field(
        &mut self,
        entity: &Entity,
        entity_type: &EntityType,
        field: &JsonField,
    ) -> CodecResult<()> {
        let (raw_name, is_absence) = match field.name.strip_prefix(ABSENCE_PREFIX) {
            Some(rest) => (rest, true),
            None => (field.name.as_str(), false),
        };
        let name = self.property_name(raw_name);
        let property = match entity_type.find_property(&name) {
            Some(property) => property,
            None if self.options.lenient_properties => return Ok(()),
            None => {
                return Err(CodecError::mapping(
                    ReasonKind::NotFound,
                    format!(
                        "Unknown property [{}] of type {}",
                        name,
                        entity_type.signature()
                    ),
                    field.name_span,
                ))
            }
        };

        let within = |err: CodecError| {
            err.within_property(property.name(), entity_type.signature(), field.name_span)
        };

        if is_absence {
            let information = self
                .convert(
                    &field.value,
                    &GenericModelType::entity(ABSENCE_INFORMATION),
                )
                .map_err(within)?;
            entity.set_absence_information(property.name(), information.as_entity().cloned());
            return Ok(());
        }

        let value = if property.is_identifier() {
            self.convert_identifier(&field.value).map_err(within)?
        } else {
            self.convert(&field.value, property.ty()).map_err(within)?
        };
        entity.set_direct(property.name(), value);
        Ok(())
    }

    /// Identifiers are scalars; integers widen to long.
    fn convert_identifier(&mut self, value: &JsonValue) -> CodecResult<Value> {
        match value {
            JsonValue::Scalar(JsonScalar {
                literal: JsonLiteral::Integer(i),
                ..
            }) => Ok(Value::Long(i64::from(*i))),
            JsonValue::Scalar(scalar) => coerce_scalar(
                &scalar.literal,
                &GenericModelType::Object,
                self.registry,
                scalar.span,
            ),
            JsonValue::Object(_) => self.convert(value, &GenericModelType::Object),
            JsonValue::Array(array) => Err(mismatch("array", &GenericModelType::Object, array.span)),
        }
    }

    fn check_assignable(
        &self,
        entity: &Entity,
        target: &GenericModelType,
        span: JsonSpan,
    ) -> CodecResult<()> {
        let actual = GenericModelType::Entity(entity.type_signature().to_string());
        if self.registry.is_assignable(target, &actual) {
            Ok(())
        } else {
            Err(mismatch(entity.type_signature(), target, span))
        }
    }
}

fn unknown_type(name: &str, span: JsonSpan) -> CodecError {
    CodecError::conversion(ReasonKind::NotFound, format!("Unknown type {}", name), span)
}
