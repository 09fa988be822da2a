//! Typed entity model
//!
//! - `types`, `registry`: type descriptors and their registry
//! - `value`: boxed property values
//! - `entity`: shared entity handles
//! - `session`: attached entity set, tracked mutation, listeners
//! - `builtin`: root, absence, reference and manipulation types

pub mod builtin;
mod entity;
mod errors;
mod registry;
mod session;
mod types;
mod value;

pub use entity::Entity;
pub use errors::{ModelError, ModelResult};
pub use registry::TypeRegistry;
pub use session::{
    EntitySession, ListenerId, ManipulationEvent, ManipulationListener, ManipulationMode,
};
pub use types::{EntityType, EntityTypeBuilder, EnumType, GenericModelType, Property, TypeCode};
pub use value::{Decimal, DecimalParseError, EnumValue, Value, ValueMap, ValueSet};
