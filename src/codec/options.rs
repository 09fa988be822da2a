//! Marshalling and unmarshalling options

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::model::{Entity, GenericModelType, Property};

/// How entity identity is expressed in a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdentityManagementMode {
    /// Every object is a fresh entity
    Off,
    /// Infer from the first identity key in the document
    #[default]
    Auto,
    /// `_id` / `_ref` document-local ids
    ShortId,
    /// The `id` property, stable across unmarshal calls
    Id,
}

#[derive(Clone, Default)]
pub struct UnmarshallingOptions {
    pub identity_management_mode: IdentityManagementMode,
    /// Fold `snake_case` keys onto `camelCase` property names
    pub snake_case_properties: bool,
    /// Skip unknown properties instead of failing
    pub lenient_properties: bool,
    /// Abstract type signature → (property name → concrete type signature).
    /// Used for objects without `_type` whose expected type is abstract.
    pub type_disambiguation: HashMap<String, HashMap<String, String>>,
    pub inferred_root_type: Option<GenericModelType>,
}

impl fmt::Debug for UnmarshallingOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnmarshallingOptions")
            .field("identity_management_mode", &self.identity_management_mode)
            .field("snake_case_properties", &self.snake_case_properties)
            .field("lenient_properties", &self.lenient_properties)
            .field("type_disambiguation", &self.type_disambiguation)
            .field("inferred_root_type", &self.inferred_root_type)
            .finish()
    }
}

/// When the writer emits `_type` and typed scalar wrappers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TypeExplicitness {
    #[default]
    Auto,
    Never,
    Entities,
    Polymorphic,
    Always,
}

impl TypeExplicitness {
    /// Whether an entity may omit `_type` when its type equals the declared one.
    pub(crate) fn can_skip_non_polymorphic_type(self) -> bool {
        matches!(self, TypeExplicitness::Never | TypeExplicitness::Polymorphic)
    }

    /// Whether scalars and sets are written without type wrappers.
    pub(crate) fn write_simplified_values(self) -> bool {
        !matches!(self, TypeExplicitness::Always)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputPrettiness {
    #[default]
    None,
    Low,
    Mid,
    High,
}

impl OutputPrettiness {
    pub(crate) fn max_indent(self) -> Option<usize> {
        match self {
            OutputPrettiness::None => None,
            OutputPrettiness::Low => Some(0),
            OutputPrettiness::Mid => Some(10),
            OutputPrettiness::High => Some(20),
        }
    }
}

pub type PropertyNameSupplier = Rc<dyn Fn(&Property) -> String>;
pub type EntityVisitor = Rc<dyn Fn(&Entity)>;

#[derive(Clone)]
pub struct MarshallingOptions {
    pub type_explicitness: TypeExplicitness,
    /// Write scalar properties before structured ones
    pub scalars_first: bool,
    pub write_empty_properties: bool,
    pub write_absence_information: bool,
    /// 0 writes `_id`/`_ref` identity; positive bounds re-inlining of an
    /// entity along the current path; negative only stops at cycles.
    pub entity_recurrence_depth: i32,
    /// Read raw slots instead of applying property defaults
    pub use_direct_property_access: bool,
    pub stringify_numbers: bool,
    pub prettiness: OutputPrettiness,
    pub inferred_root_type: Option<GenericModelType>,
    pub property_name_supplier: Option<PropertyNameSupplier>,
    pub entity_visitor: Option<EntityVisitor>,
}

impl Default for MarshallingOptions {
    fn default() -> Self {
        Self {
            type_explicitness: TypeExplicitness::Auto,
            scalars_first: false,
            write_empty_properties: false,
            write_absence_information: true,
            entity_recurrence_depth: 0,
            use_direct_property_access: false,
            stringify_numbers: false,
            prettiness: OutputPrettiness::None,
            inferred_root_type: None,
            property_name_supplier: None,
            entity_visitor: None,
        }
    }
}

impl fmt::Debug for MarshallingOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarshallingOptions")
            .field("type_explicitness", &self.type_explicitness)
            .field("scalars_first", &self.scalars_first)
            .field("write_empty_properties", &self.write_empty_properties)
            .field("write_absence_information", &self.write_absence_information)
            .field("entity_recurrence_depth", &self.entity_recurrence_depth)
            .field("use_direct_property_access", &self.use_direct_property_access)
            .field("stringify_numbers", &self.stringify_numbers)
            .field("prettiness", &self.prettiness)
            .field("inferred_root_type", &self.inferred_root_type)
            .finish_non_exhaustive()
    }
}
