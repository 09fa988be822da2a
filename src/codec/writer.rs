//! JSON writer
//!
//! Values are written against the type declared at their position. Where
//! the declared type already determines how to read a value back, scalars
//! and sets are written in simplified form; in `object` context they are
//! wrapped with their type. Entities are written once with an `_id` and
//! referenced with `_ref` afterwards unless a recurrence depth is set.

use std::collections::HashMap;

use chrono::SecondsFormat;

use crate::model::builtin::ABSENCE_INFORMATION;
use crate::model::{Entity, GenericModelType, Property, TypeCode, Value};

use super::errors::{CodecError, CodecResult};
use super::json_value::{ABSENCE_PREFIX, ID_KEY, REF_KEY, TYPE_KEY};
use super::options::{MarshallingOptions, TypeExplicitness};

/// Identity of an entity within one marshal call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum EntityKey {
    Global(String),
    Arena(u64),
}

impl EntityKey {
    fn of(entity: &Entity) -> Self {
        match entity.global_id() {
            Some(id) => EntityKey::Global(id),
            None => EntityKey::Arena(entity.runtime_id()),
        }
    }
}

type Encoder = fn(&mut JsonWriter<'_>, &GenericModelType, &Value, bool) -> CodecResult<()>;

fn value_code(value: &Value) -> TypeCode {
    match value {
        Value::Null => TypeCode::Object,
        Value::Boolean(_) => TypeCode::Boolean,
        Value::String(_) => TypeCode::String,
        Value::Integer(_) => TypeCode::Integer,
        Value::Long(_) => TypeCode::Long,
        Value::Float(_) => TypeCode::Float,
        Value::Double(_) => TypeCode::Double,
        Value::Decimal(_) => TypeCode::Decimal,
        Value::Date(_) => TypeCode::Date,
        Value::Enum(_) => TypeCode::Enum,
        Value::List(_) => TypeCode::List,
        Value::Set(_) => TypeCode::Set,
        Value::Map(_) => TypeCode::Map,
        Value::Entity(_) => TypeCode::Entity,
    }
}

fn encoder_for(code: TypeCode) -> Encoder {
    match code {
        TypeCode::Object => encode_null,
        TypeCode::Boolean => encode_boolean,
        TypeCode::String => encode_string,
        TypeCode::Integer => encode_integer,
        TypeCode::Long => encode_long,
        TypeCode::Float => encode_float,
        TypeCode::Double => encode_double,
        TypeCode::Decimal => encode_decimal,
        TypeCode::Date => encode_date,
        TypeCode::Enum => encode_enum,
        TypeCode::List => encode_list,
        TypeCode::Set => encode_set,
        TypeCode::Map => encode_map,
        TypeCode::Entity => encode_entity,
    }
}

pub struct JsonWriter<'a> {
    options: &'a MarshallingOptions,
    out: String,
    simplified: bool,
    ids: HashMap<EntityKey, u64>,
    next_id: u64,
    active: HashMap<EntityKey, i32>,
    indent: usize,
}

/// Writes `value` as JSON.
pub fn marshal(value: &Value, options: &MarshallingOptions) -> CodecResult<String> {
    let root = options
        .inferred_root_type
        .clone()
        .unwrap_or(GenericModelType::Object);
    let mut writer = JsonWriter::new(options);
    writer.encode(&root, value, false)?;
    Ok(writer.finish())
}

impl<'a> JsonWriter<'a> {
    pub fn new(options: &'a MarshallingOptions) -> Self {
        Self {
            options,
            out: String::new(),
            simplified: options.type_explicitness.write_simplified_values(),
            ids: HashMap::new(),
            next_id: 0,
            active: HashMap::new(),
            indent: 0,
        }
    }

    pub fn finish(self) -> String {
        self.out
    }

    /// Encodes `value` declared as `context`. Identifier values are always
    /// simplified.
    pub fn encode(
        &mut self,
        context: &GenericModelType,
        value: &Value,
        is_identifier: bool,
    ) -> CodecResult<()> {
        let simplified = if context.is_base() {
            is_identifier || self.options.type_explicitness == TypeExplicitness::Never
        } else {
            self.simplified
        };
        let encoder = encoder_for(value_code(value));
        encoder(self, context, value, simplified)
    }

    fn push_str(&mut self, text: &str) {
        self.out.push_str(text);
    }

    fn push_quoted(&mut self, text: &str) -> CodecResult<()> {
        let quoted =
            serde_json::to_string(text).map_err(|e| CodecError::Marshal(e.to_string()))?;
        self.out.push_str(&quoted);
        Ok(())
    }

    fn push_key(&mut self, key: &str) -> CodecResult<()> {
        self.push_quoted(key)?;
        self.out.push_str(": ");
        Ok(())
    }

    fn newline(&mut self, max_indent: usize) {
        self.out.push('\n');
        for _ in 0..self.indent.min(max_indent) {
            self.out.push('\t');
        }
    }

    fn open(&mut self, bracket: char) {
        self.out.push(bracket);
        self.indent += 1;
    }

    fn separator(&mut self, first: bool) {
        match self.options.prettiness.max_indent() {
            None => {
                if !first {
                    self.out.push_str(", ");
                }
            }
            Some(max) => {
                if !first {
                    self.out.push(',');
                }
                self.newline(max);
            }
        }
    }

    fn close(&mut self, bracket: char, empty: bool) {
        self.indent = self.indent.saturating_sub(1);
        if let Some(max) = self.options.prettiness.max_indent() {
            if !empty {
                self.newline(max);
            }
        }
        self.out.push(bracket);
    }

    fn write_array<'v>(
        &mut self,
        element: &GenericModelType,
        values: impl Iterator<Item = &'v Value>,
    ) -> CodecResult<()> {
        self.open('[');
        let mut first = true;
        for value in values {
            self.separator(first);
            first = false;
            self.encode(element, value, false)?;
        }
        self.close(']', first);
        Ok(())
    }

    fn typed_wrapper_start(&mut self) {
        self.push_str("{\"value\":");
    }

    fn typed_wrapper_end(&mut self, type_signature: &str) -> CodecResult<()> {
        self.push_str(", \"_type\":");
        self.push_quoted(type_signature)?;
        self.out.push('}');
        Ok(())
    }

    fn mismatch(&self, value: &Value) -> CodecError {
        CodecError::Marshal(format!("no encoder for value {:?}", value))
    }

    fn property_key(&self, property: &Property) -> String {
        match &self.options.property_name_supplier {
            Some(supplier) => supplier(property),
            None => property.name().to_string(),
        }
    }

    fn ordered_properties(&self, entity: &Entity) -> Vec<Property> {
        let properties = entity.entity_type().properties();
        if !self.options.scalars_first {
            return properties.to_vec();
        }
        let (scalars, structured): (Vec<&Property>, Vec<&Property>) =
            properties.iter().partition(|p| p.ty().is_scalar());
        scalars.into_iter().chain(structured).cloned().collect()
    }

    /// Writes the entity's properties, returning whether nothing was written.
    fn write_properties(
        &mut self,
        entity: &Entity,
        scalars_only: bool,
        mut first: bool,
    ) -> CodecResult<bool> {
        for property in self.ordered_properties(entity) {
            if scalars_only && !(property.ty().is_scalar() || property.is_identifier()) {
                continue;
            }
            let value = if self.options.use_direct_property_access {
                entity.get_direct(property.name())
            } else {
                entity.get(property.name())
            };

            if value.is_empty() {
                if self.options.write_absence_information {
                    if let Some(information) = entity.absence_information(property.name()) {
                        self.separator(first);
                        first = false;
                        let key = format!("{}{}", ABSENCE_PREFIX, self.property_key(&property));
                        self.push_key(&key)?;
                        self.encode(
                            &GenericModelType::entity(ABSENCE_INFORMATION),
                            &Value::Entity(information),
                            false,
                        )?;
                        continue;
                    }
                }
                if !self.options.write_empty_properties {
                    continue;
                }
            }

            self.separator(first);
            first = false;
            let key = self.property_key(&property);
            self.push_key(&key)?;
            self.encode(property.ty(), &value, property.is_identifier())?;
        }
        Ok(first)
    }

    fn writes_type_of(&self, context: &GenericModelType, entity: &Entity) -> bool {
        let explicitness = self.options.type_explicitness;
        if explicitness == TypeExplicitness::Never {
            return false;
        }
        let declared = matches!(
            context,
            GenericModelType::Entity(sig) if sig == entity.type_signature()
        );
        !(declared && explicitness.can_skip_non_polymorphic_type())
    }
}

fn encode_null(
    w: &mut JsonWriter<'_>,
    _: &GenericModelType,
    _: &Value,
    _: bool,
) -> CodecResult<()> {
    w.push_str("null");
    Ok(())
}

fn encode_boolean(
    w: &mut JsonWriter<'_>,
    _: &GenericModelType,
    value: &Value,
    _: bool,
) -> CodecResult<()> {
    let Value::Boolean(b) = value else {
        return Err(w.mismatch(value));
    };
    w.push_str(if *b { "true" } else { "false" });
    Ok(())
}

fn encode_string(
    w: &mut JsonWriter<'_>,
    _: &GenericModelType,
    value: &Value,
    _: bool,
) -> CodecResult<()> {
    let Value::String(s) = value else {
        return Err(w.mismatch(value));
    };
    w.push_quoted(s)
}

fn encode_integer(
    w: &mut JsonWriter<'_>,
    _: &GenericModelType,
    value: &Value,
    _: bool,
) -> CodecResult<()> {
    let Value::Integer(i) = value else {
        return Err(w.mismatch(value));
    };
    w.push_str(&i.to_string());
    Ok(())
}

fn encode_long(
    w: &mut JsonWriter<'_>,
    _: &GenericModelType,
    value: &Value,
    simplified: bool,
) -> CodecResult<()> {
    let Value::Long(l) = value else {
        return Err(w.mismatch(value));
    };
    if simplified {
        if w.options.stringify_numbers {
            w.push_quoted(&l.to_string())
        } else {
            w.push_str(&l.to_string());
            Ok(())
        }
    } else {
        w.typed_wrapper_start();
        w.push_quoted(&l.to_string())?;
        w.typed_wrapper_end("long")
    }
}

fn finite_text(value: &Value, number: f64, text: String) -> CodecResult<String> {
    if number.is_finite() {
        Ok(text)
    } else {
        Err(CodecError::Marshal(format!(
            "cannot write non-finite number {:?}",
            value
        )))
    }
}

fn encode_float(
    w: &mut JsonWriter<'_>,
    _: &GenericModelType,
    value: &Value,
    simplified: bool,
) -> CodecResult<()> {
    let Value::Float(f) = value else {
        return Err(w.mismatch(value));
    };
    let text = finite_text(value, f64::from(*f), f.to_string())?;
    if simplified {
        w.push_str(&text);
        Ok(())
    } else {
        w.typed_wrapper_start();
        w.push_str(&text);
        w.typed_wrapper_end("float")
    }
}

fn encode_double(
    w: &mut JsonWriter<'_>,
    _: &GenericModelType,
    value: &Value,
    simplified: bool,
) -> CodecResult<()> {
    let Value::Double(d) = value else {
        return Err(w.mismatch(value));
    };
    let text = finite_text(value, *d, d.to_string())?;
    if simplified {
        w.push_str(&text);
        Ok(())
    } else {
        w.typed_wrapper_start();
        w.push_str(&text);
        w.typed_wrapper_end("double")
    }
}

/// Decimals are written as strings so that no precision is lost.
fn encode_decimal(
    w: &mut JsonWriter<'_>,
    _: &GenericModelType,
    value: &Value,
    simplified: bool,
) -> CodecResult<()> {
    let Value::Decimal(d) = value else {
        return Err(w.mismatch(value));
    };
    if simplified {
        w.push_quoted(d.as_str())
    } else {
        w.typed_wrapper_start();
        w.push_quoted(d.as_str())?;
        w.typed_wrapper_end("decimal")
    }
}

fn encode_date(
    w: &mut JsonWriter<'_>,
    _: &GenericModelType,
    value: &Value,
    simplified: bool,
) -> CodecResult<()> {
    let Value::Date(date) = value else {
        return Err(w.mismatch(value));
    };
    let text = date.to_rfc3339_opts(SecondsFormat::Millis, true);
    if simplified {
        w.push_quoted(&text)
    } else {
        w.typed_wrapper_start();
        w.push_quoted(&text)?;
        w.typed_wrapper_end("date")
    }
}

fn encode_enum(
    w: &mut JsonWriter<'_>,
    _: &GenericModelType,
    value: &Value,
    simplified: bool,
) -> CodecResult<()> {
    let Value::Enum(constant) = value else {
        return Err(w.mismatch(value));
    };
    if simplified {
        w.push_quoted(&constant.constant)
    } else {
        w.typed_wrapper_start();
        w.push_quoted(&constant.constant)?;
        w.typed_wrapper_end(&constant.type_signature)
    }
}

fn element_context(context: &GenericModelType) -> GenericModelType {
    match context {
        GenericModelType::List(e) | GenericModelType::Set(e) => (**e).clone(),
        _ => GenericModelType::Object,
    }
}

fn encode_list(
    w: &mut JsonWriter<'_>,
    context: &GenericModelType,
    value: &Value,
    _: bool,
) -> CodecResult<()> {
    let Value::List(items) = value else {
        return Err(w.mismatch(value));
    };
    w.write_array(&element_context(context), items.iter())
}

fn encode_set(
    w: &mut JsonWriter<'_>,
    context: &GenericModelType,
    value: &Value,
    simplified: bool,
) -> CodecResult<()> {
    let Value::Set(items) = value else {
        return Err(w.mismatch(value));
    };
    let element = element_context(context);
    if simplified {
        w.write_array(&element, items.iter())
    } else {
        w.push_str("{\"_type\": \"set\", \"value\":");
        w.write_array(&element, items.iter())?;
        w.out.push('}');
        Ok(())
    }
}

fn encode_map(
    w: &mut JsonWriter<'_>,
    context: &GenericModelType,
    value: &Value,
    simplified: bool,
) -> CodecResult<()> {
    let Value::Map(map) = value else {
        return Err(w.mismatch(value));
    };
    let (key_type, value_type) = match context {
        GenericModelType::Map(k, v) => ((**k).clone(), (**v).clone()),
        _ => (GenericModelType::Object, GenericModelType::Object),
    };

    let string_keys = matches!(key_type, GenericModelType::String | GenericModelType::Object)
        && map.keys().all(|k| {
            matches!(k, Value::String(s) if !matches!(s.as_str(), TYPE_KEY | ID_KEY | REF_KEY))
        });

    if simplified && string_keys {
        w.open('{');
        let mut first = true;
        for (key, item) in map {
            w.separator(first);
            first = false;
            w.push_key(key.as_str().unwrap_or_default())?;
            w.encode(&value_type, item, false)?;
        }
        w.close('}', first);
        return Ok(());
    }

    let flat = |w: &mut JsonWriter<'_>| -> CodecResult<()> {
        w.open('[');
        let mut first = true;
        for (key, item) in map {
            w.separator(first);
            w.encode(&key_type, key, false)?;
            w.separator(false);
            w.encode(&value_type, item, false)?;
            first = false;
        }
        w.close(']', first);
        Ok(())
    };

    if simplified {
        flat(w)
    } else {
        w.push_str("{\"_type\": \"flatmap\", \"value\":");
        flat(w)?;
        w.out.push('}');
        Ok(())
    }
}

fn encode_entity(
    w: &mut JsonWriter<'_>,
    context: &GenericModelType,
    value: &Value,
    _: bool,
) -> CodecResult<()> {
    let Value::Entity(entity) = value else {
        return Err(w.mismatch(value));
    };
    let key = EntityKey::of(entity);
    let depth = w.options.entity_recurrence_depth;
    let with_type = w.writes_type_of(context, entity);

    if depth == 0 {
        if let Some(id) = w.ids.get(&key) {
            let reference = format!("{{\"{}\": \"{}\"}}", REF_KEY, id);
            w.push_str(&reference);
            return Ok(());
        }
        let id = w.next_id;
        w.next_id += 1;
        w.ids.insert(key, id);
        if let Some(visitor) = w.options.entity_visitor.clone() {
            visitor(entity);
        }

        w.open('{');
        w.separator(true);
        if with_type {
            w.push_key(TYPE_KEY)?;
            w.push_quoted(entity.type_signature())?;
            w.push_str(", ");
        }
        w.push_key(ID_KEY)?;
        w.push_quoted(&id.to_string())?;
        w.write_properties(entity, false, false)?;
        w.close('}', false);
        return Ok(());
    }

    let active = w.active.get(&key).copied().unwrap_or(0);
    let scalars_only = if depth > 0 { active > depth } else { active > 0 };
    if active == 0 {
        if let Some(visitor) = w.options.entity_visitor.clone() {
            visitor(entity);
        }
    }

    *w.active.entry(key.clone()).or_insert(0) += 1;
    w.open('{');
    let mut first = true;
    if with_type {
        w.separator(true);
        w.push_key(TYPE_KEY)?;
        w.push_quoted(entity.type_signature())?;
        first = false;
    }
    let result = w.write_properties(entity, scalars_only, first);
    if let Some(count) = w.active.get_mut(&key) {
        *count -= 1;
    }
    let empty = result?;
    w.close('}', empty);
    Ok(())
}

/// Writes an entity graph rooted at `entity` with the given declared type.
pub fn marshal_entity(
    entity: &Entity,
    declared: &GenericModelType,
    options: &MarshallingOptions,
) -> CodecResult<String> {
    let mut writer = JsonWriter::new(options);
    writer.encode(declared, &Value::Entity(entity.clone()), false)?;
    Ok(writer.finish())
}
