//! Fixture model shared by unit and integration tests
//!
//! `test.Resource` exercises every value kind; `test.Source` is an abstract
//! type with two concrete subtypes for polymorphic codec paths.

use std::sync::Arc;

use crate::model::{EntityTypeBuilder, GenericModelType, ModelResult, TypeRegistry, Value};

pub const RESOURCE: &str = "test.Resource";
pub const SOURCE: &str = "test.Source";
pub const FILE_SOURCE: &str = "test.FileSource";
pub const URL_SOURCE: &str = "test.UrlSource";
pub const COLOR: &str = "test.Color";

/// Registers the fixture types into `registry`.
pub fn register_fixture_types(registry: &mut TypeRegistry) -> ModelResult<()> {
    registry.register_enum_type(COLOR, ["RED", "GREEN", "BLUE"])?;
    registry.register_entity_type(
        EntityTypeBuilder::new(SOURCE)
            .abstract_type()
            .property("name", GenericModelType::String),
    )?;
    registry.register_entity_type(
        EntityTypeBuilder::new(FILE_SOURCE)
            .derives(SOURCE)
            .property("path", GenericModelType::String),
    )?;
    registry.register_entity_type(
        EntityTypeBuilder::new(URL_SOURCE)
            .derives(SOURCE)
            .property("url", GenericModelType::String),
    )?;
    registry.register_entity_type(
        EntityTypeBuilder::new(RESOURCE)
            .property("name", GenericModelType::String)
            .property("mimeType", GenericModelType::String)
            .property("creator", GenericModelType::String)
            .property("tags", GenericModelType::set_of(GenericModelType::String))
            .property(
                "attributes",
                GenericModelType::map_of(GenericModelType::String, GenericModelType::String),
            )
            .property("notes", GenericModelType::list_of(GenericModelType::String))
            .property("created", GenericModelType::Date)
            .property("size", GenericModelType::Long)
            .property("weight", GenericModelType::Float)
            .property("rating", GenericModelType::Double)
            .property("price", GenericModelType::Decimal)
            .property("color", GenericModelType::enumeration(COLOR))
            .property("source", GenericModelType::entity(SOURCE))
            .property("parent", GenericModelType::entity(RESOURCE))
            .property(
                "related",
                GenericModelType::list_of(GenericModelType::entity(RESOURCE)),
            )
            .property_with_default("archived", GenericModelType::Boolean, Value::Boolean(false)),
    )?;
    Ok(())
}

/// A fresh registry with built-in and fixture types.
pub fn fixture_registry() -> Arc<TypeRegistry> {
    let mut registry = TypeRegistry::new();
    let registered = register_fixture_types(&mut registry);
    debug_assert!(registered.is_ok(), "fixture registration failed: {:?}", registered);
    Arc::new(registry)
}
