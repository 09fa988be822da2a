//! Type descriptors
//!
//! Entities are accessed reflectively through these descriptors: every entity
//! carries its `EntityType`, and every property declares a `GenericModelType`.
//! Entity and enum types are referenced by signature so that descriptors may
//! refer to each other cyclically.

use std::collections::HashSet;
use std::fmt;

use super::value::Value;

/// Discriminant of a [`GenericModelType`]. Used to select codec encoders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeCode {
    Object,
    Boolean,
    String,
    Integer,
    Long,
    Float,
    Double,
    Decimal,
    Date,
    Enum,
    Entity,
    List,
    Set,
    Map,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GenericModelType {
    /// Base type: any value is assignable
    Object,
    Boolean,
    String,
    Integer,
    Long,
    Float,
    Double,
    Decimal,
    Date,
    Enum(String),
    Entity(String),
    List(Box<GenericModelType>),
    Set(Box<GenericModelType>),
    Map(Box<GenericModelType>, Box<GenericModelType>),
}

impl GenericModelType {
    pub fn list_of(element: GenericModelType) -> Self {
        GenericModelType::List(Box::new(element))
    }

    pub fn set_of(element: GenericModelType) -> Self {
        GenericModelType::Set(Box::new(element))
    }

    pub fn map_of(key: GenericModelType, value: GenericModelType) -> Self {
        GenericModelType::Map(Box::new(key), Box::new(value))
    }

    pub fn entity(signature: impl Into<String>) -> Self {
        GenericModelType::Entity(signature.into())
    }

    pub fn enumeration(signature: impl Into<String>) -> Self {
        GenericModelType::Enum(signature.into())
    }

    pub fn type_code(&self) -> TypeCode {
        match self {
            GenericModelType::Object => TypeCode::Object,
            GenericModelType::Boolean => TypeCode::Boolean,
            GenericModelType::String => TypeCode::String,
            GenericModelType::Integer => TypeCode::Integer,
            GenericModelType::Long => TypeCode::Long,
            GenericModelType::Float => TypeCode::Float,
            GenericModelType::Double => TypeCode::Double,
            GenericModelType::Decimal => TypeCode::Decimal,
            GenericModelType::Date => TypeCode::Date,
            GenericModelType::Enum(_) => TypeCode::Enum,
            GenericModelType::Entity(_) => TypeCode::Entity,
            GenericModelType::List(_) => TypeCode::List,
            GenericModelType::Set(_) => TypeCode::Set,
            GenericModelType::Map(_, _) => TypeCode::Map,
        }
    }

    /// Simple types: the scalar value types without enums.
    pub fn parse_simple(signature: &str) -> Option<Self> {
        Some(match signature {
            "object" => GenericModelType::Object,
            "boolean" => GenericModelType::Boolean,
            "string" => GenericModelType::String,
            "integer" => GenericModelType::Integer,
            "long" => GenericModelType::Long,
            "float" => GenericModelType::Float,
            "double" => GenericModelType::Double,
            "decimal" => GenericModelType::Decimal,
            "date" => GenericModelType::Date,
            _ => return None,
        })
    }

    pub fn type_signature(&self) -> String {
        match self {
            GenericModelType::Object => "object".to_string(),
            GenericModelType::Boolean => "boolean".to_string(),
            GenericModelType::String => "string".to_string(),
            GenericModelType::Integer => "integer".to_string(),
            GenericModelType::Long => "long".to_string(),
            GenericModelType::Float => "float".to_string(),
            GenericModelType::Double => "double".to_string(),
            GenericModelType::Decimal => "decimal".to_string(),
            GenericModelType::Date => "date".to_string(),
            GenericModelType::Enum(sig) | GenericModelType::Entity(sig) => sig.clone(),
            GenericModelType::List(e) => format!("list<{}>", e.type_signature()),
            GenericModelType::Set(e) => format!("set<{}>", e.type_signature()),
            GenericModelType::Map(k, v) => {
                format!("map<{},{}>", k.type_signature(), v.type_signature())
            }
        }
    }

    pub fn is_base(&self) -> bool {
        matches!(self, GenericModelType::Object)
    }

    pub fn is_simple(&self) -> bool {
        matches!(
            self,
            GenericModelType::Boolean
                | GenericModelType::String
                | GenericModelType::Integer
                | GenericModelType::Long
                | GenericModelType::Float
                | GenericModelType::Double
                | GenericModelType::Decimal
                | GenericModelType::Date
        )
    }

    /// Simple types and enums
    pub fn is_scalar(&self) -> bool {
        self.is_simple() || matches!(self, GenericModelType::Enum(_))
    }

    pub fn is_entity(&self) -> bool {
        matches!(self, GenericModelType::Entity(_))
    }

    pub fn is_collection(&self) -> bool {
        matches!(
            self,
            GenericModelType::List(_) | GenericModelType::Set(_) | GenericModelType::Map(_, _)
        )
    }

    /// Element type of lists and sets, value type of maps.
    pub fn collection_element_type(&self) -> Option<&GenericModelType> {
        match self {
            GenericModelType::List(e) | GenericModelType::Set(e) => Some(e),
            GenericModelType::Map(_, v) => Some(v),
            _ => None,
        }
    }

    /// Empty collection value for collection types, `Null` otherwise.
    pub fn empty_value(&self) -> Value {
        match self {
            GenericModelType::List(_) => Value::List(Vec::new()),
            GenericModelType::Set(_) => Value::Set(Default::default()),
            GenericModelType::Map(_, _) => Value::Map(Default::default()),
            _ => Value::Null,
        }
    }
}

impl fmt::Display for GenericModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_signature())
    }
}

/// Declared property of an entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    name: String,
    ty: GenericModelType,
    default: Option<Value>,
}

impl Property {
    pub fn new(name: impl Into<String>, ty: GenericModelType) -> Self {
        Self {
            name: name.into(),
            ty,
            default: None,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &GenericModelType {
        &self.ty
    }

    /// Initializer value applied by non-raw creation and by non-direct reads.
    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// The `id` property is the entity's identifier.
    pub fn is_identifier(&self) -> bool {
        self.name == super::builtin::ID_PROPERTY
    }

    pub fn is_global_id(&self) -> bool {
        self.name == super::builtin::GLOBAL_ID_PROPERTY
    }
}

/// Descriptor of an entity type with its flattened (inherited + own) properties.
#[derive(Debug)]
pub struct EntityType {
    signature: String,
    is_abstract: bool,
    supertypes: Vec<String>,
    /// Own signature plus every transitive supertype
    ancestry: HashSet<String>,
    properties: Vec<Property>,
}

impl EntityType {
    pub(crate) fn new(
        signature: String,
        is_abstract: bool,
        supertypes: Vec<String>,
        ancestry: HashSet<String>,
        properties: Vec<Property>,
    ) -> Self {
        Self {
            signature,
            is_abstract,
            supertypes,
            ancestry,
            properties,
        }
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Signature without the package prefix.
    pub fn short_name(&self) -> &str {
        self.signature
            .rsplit('.')
            .next()
            .unwrap_or(self.signature.as_str())
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    pub fn supertypes(&self) -> &[String] {
        &self.supertypes
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn find_property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name() == name)
    }

    pub fn is_assignable_to(&self, signature: &str) -> bool {
        self.ancestry.contains(signature)
    }

    pub(crate) fn ancestry(&self) -> &HashSet<String> {
        &self.ancestry
    }
}

/// Descriptor of an enum type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumType {
    signature: String,
    constants: Vec<String>,
}

impl EnumType {
    pub(crate) fn new(signature: String, constants: Vec<String>) -> Self {
        Self {
            signature,
            constants,
        }
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn constants(&self) -> &[String] {
        &self.constants
    }

    pub fn has_constant(&self, name: &str) -> bool {
        self.constants.iter().any(|c| c == name)
    }
}

/// Declarative input for [`TypeRegistry::register_entity_type`](super::TypeRegistry::register_entity_type).
#[derive(Debug, Clone)]
pub struct EntityTypeBuilder {
    pub(crate) signature: String,
    pub(crate) is_abstract: bool,
    pub(crate) supertypes: Vec<String>,
    pub(crate) properties: Vec<Property>,
}

impl EntityTypeBuilder {
    pub fn new(signature: impl Into<String>) -> Self {
        Self {
            signature: signature.into(),
            is_abstract: false,
            supertypes: Vec::new(),
            properties: Vec::new(),
        }
    }

    pub fn abstract_type(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn derives(mut self, supertype: impl Into<String>) -> Self {
        self.supertypes.push(supertype.into());
        self
    }

    pub fn property(mut self, name: impl Into<String>, ty: GenericModelType) -> Self {
        self.properties.push(Property::new(name, ty));
        self
    }

    pub fn property_with_default(
        mut self,
        name: impl Into<String>,
        ty: GenericModelType,
        default: Value,
    ) -> Self {
        self.properties.push(Property::new(name, ty).with_default(default));
        self
    }
}
