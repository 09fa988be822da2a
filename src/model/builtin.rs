//! Built-in entity types
//!
//! Every registry carries these: the root entity type, absence information,
//! entity references and the manipulation model used for the wire form of
//! manipulations.

use super::errors::ModelResult;
use super::registry::TypeRegistry;
use super::types::{EntityTypeBuilder, GenericModelType};

pub const GENERIC_ENTITY: &str = "model.GenericEntity";
pub const ID_PROPERTY: &str = "id";
pub const GLOBAL_ID_PROPERTY: &str = "globalId";

pub const ABSENCE_INFORMATION: &str = "absence.AbsenceInformation";

pub const ENTITY_REFERENCE: &str = "reference.EntityReference";
pub const REFERENCE_TYPE_SIGNATURE: &str = "typeSignature";
pub const REFERENCE_REF_ID: &str = "refId";

pub const MANIPULATION: &str = "manipulation.Manipulation";
pub const INSTANTIATION_MANIPULATION: &str = "manipulation.InstantiationManipulation";
pub const DELETE_MANIPULATION: &str = "manipulation.DeleteManipulation";
pub const CHANGE_VALUE_MANIPULATION: &str = "manipulation.ChangeValueManipulation";
pub const ADD_MANIPULATION: &str = "manipulation.AddManipulation";
pub const REMOVE_MANIPULATION: &str = "manipulation.RemoveManipulation";
pub const COMPOUND_MANIPULATION: &str = "manipulation.CompoundManipulation";

pub const PROP_ENTITY: &str = "entity";
pub const PROP_OWNER: &str = "owner";
pub const PROP_PROPERTY_NAME: &str = "propertyName";
pub const PROP_NEW_VALUE: &str = "newValue";
pub const PROP_ITEMS_TO_ADD: &str = "itemsToAdd";
pub const PROP_ITEMS_TO_REMOVE: &str = "itemsToRemove";
pub const PROP_COMPOUND_LIST: &str = "compoundManipulationList";

pub(crate) fn register_builtin_types(registry: &mut TypeRegistry) -> ModelResult<()> {
    let reference = GenericModelType::entity(ENTITY_REFERENCE);
    let items = GenericModelType::map_of(GenericModelType::Object, GenericModelType::Object);

    registry.register_root_type(
        EntityTypeBuilder::new(GENERIC_ENTITY)
            .abstract_type()
            .property(ID_PROPERTY, GenericModelType::Object)
            .property(GLOBAL_ID_PROPERTY, GenericModelType::String),
    )?;

    registry.register_entity_type(
        EntityTypeBuilder::new(ABSENCE_INFORMATION).property("size", GenericModelType::Integer),
    )?;

    registry.register_entity_type(
        EntityTypeBuilder::new(ENTITY_REFERENCE)
            .property(REFERENCE_TYPE_SIGNATURE, GenericModelType::String)
            .property(REFERENCE_REF_ID, GenericModelType::String),
    )?;

    registry.register_entity_type(EntityTypeBuilder::new(MANIPULATION).abstract_type())?;
    registry.register_entity_type(
        EntityTypeBuilder::new(INSTANTIATION_MANIPULATION)
            .derives(MANIPULATION)
            .property(PROP_ENTITY, reference.clone()),
    )?;
    registry.register_entity_type(
        EntityTypeBuilder::new(DELETE_MANIPULATION)
            .derives(MANIPULATION)
            .property(PROP_ENTITY, reference.clone()),
    )?;
    registry.register_entity_type(
        EntityTypeBuilder::new(CHANGE_VALUE_MANIPULATION)
            .derives(MANIPULATION)
            .property(PROP_OWNER, reference.clone())
            .property(PROP_PROPERTY_NAME, GenericModelType::String)
            .property(PROP_NEW_VALUE, GenericModelType::Object),
    )?;
    registry.register_entity_type(
        EntityTypeBuilder::new(ADD_MANIPULATION)
            .derives(MANIPULATION)
            .property(PROP_OWNER, reference.clone())
            .property(PROP_PROPERTY_NAME, GenericModelType::String)
            .property(PROP_ITEMS_TO_ADD, items.clone()),
    )?;
    registry.register_entity_type(
        EntityTypeBuilder::new(REMOVE_MANIPULATION)
            .derives(MANIPULATION)
            .property(PROP_OWNER, reference)
            .property(PROP_PROPERTY_NAME, GenericModelType::String)
            .property(PROP_ITEMS_TO_REMOVE, items),
    )?;
    registry.register_entity_type(
        EntityTypeBuilder::new(COMPOUND_MANIPULATION)
            .derives(MANIPULATION)
            .property(
                PROP_COMPOUND_LIST,
                GenericModelType::list_of(GenericModelType::entity(MANIPULATION)),
            ),
    )?;

    Ok(())
}
