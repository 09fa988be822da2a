//! Parsed JSON tree
//!
//! The tree is structural only: it records literals, field order, spans and
//! the positions of the codec's special keys. Conversion to model values
//! happens later against a requested type.

use super::location::JsonSpan;

pub const TYPE_KEY: &str = "_type";
pub const ID_KEY: &str = "_id";
pub const REF_KEY: &str = "_ref";
pub const VALUE_KEY: &str = "value";
/// Prefix of property keys carrying absence information.
pub const ABSENCE_PREFIX: char = '?';

#[derive(Debug, Clone, PartialEq)]
pub enum JsonLiteral {
    Null,
    Boolean(bool),
    String(String),
    Integer(i32),
    Long(i64),
    Double(f64),
}

impl JsonLiteral {
    pub fn kind_name(&self) -> &'static str {
        match self {
            JsonLiteral::Null => "null",
            JsonLiteral::Boolean(_) => "boolean",
            JsonLiteral::String(_) => "string",
            JsonLiteral::Integer(_) => "integer",
            JsonLiteral::Long(_) => "long",
            JsonLiteral::Double(_) => "double",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JsonScalar {
    pub literal: JsonLiteral,
    pub span: JsonSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JsonField {
    pub name: String,
    pub name_span: JsonSpan,
    pub value: JsonValue,
}

/// Indices of the special keys within an object's fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct SpecialFields {
    pub(crate) type_field: Option<usize>,
    pub(crate) id_field: Option<usize>,
    pub(crate) ref_field: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JsonObject {
    pub fields: Vec<JsonField>,
    pub span: JsonSpan,
    pub(crate) special: SpecialFields,
}

impl JsonObject {
    pub(crate) fn new(fields: Vec<JsonField>, span: JsonSpan) -> Self {
        let mut special = SpecialFields::default();
        for (index, field) in fields.iter().enumerate() {
            let slot = match field.name.as_str() {
                TYPE_KEY => &mut special.type_field,
                ID_KEY => &mut special.id_field,
                REF_KEY => &mut special.ref_field,
                _ => continue,
            };
            // first occurrence wins
            if slot.is_none() {
                *slot = Some(index);
            }
        }
        Self {
            fields,
            span,
            special,
        }
    }

    pub fn field(&self, name: &str) -> Option<&JsonField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&JsonValue> {
        self.field(name).map(|f| &f.value)
    }

    pub fn type_field(&self) -> Option<&JsonField> {
        self.special.type_field.map(|i| &self.fields[i])
    }

    pub fn id_field(&self) -> Option<&JsonField> {
        self.special.id_field.map(|i| &self.fields[i])
    }

    pub fn ref_field(&self) -> Option<&JsonField> {
        self.special.ref_field.map(|i| &self.fields[i])
    }

    /// Fields other than `_type`, `_id` and `_ref`.
    pub fn property_fields(&self) -> impl Iterator<Item = &JsonField> {
        self.fields
            .iter()
            .filter(|f| !matches!(f.name.as_str(), TYPE_KEY | ID_KEY | REF_KEY))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JsonArray {
    pub values: Vec<JsonValue>,
    pub span: JsonSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JsonValue {
    Scalar(JsonScalar),
    Object(JsonObject),
    Array(JsonArray),
}

impl JsonValue {
    pub fn span(&self) -> JsonSpan {
        match self {
            JsonValue::Scalar(s) => s.span,
            JsonValue::Object(o) => o.span,
            JsonValue::Array(a) => a.span,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            JsonValue::Scalar(s) => s.literal.kind_name(),
            JsonValue::Object(_) => "object",
            JsonValue::Array(_) => "array",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            JsonValue::Scalar(JsonScalar {
                literal: JsonLiteral::String(s),
                ..
            }) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&JsonObject> {
        match self {
            JsonValue::Object(o) => Some(o),
            _ => None,
        }
    }
}
