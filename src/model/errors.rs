//! Entity model errors

use thiserror::Error;

/// Result type for entity model operations
pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    // ==================
    // Type registry
    // ==================
    #[error("unknown type: {0}")]
    UnknownType(String),

    #[error("type already registered: {0}")]
    DuplicateType(String),

    #[error("type {0} is abstract and cannot be instantiated")]
    AbstractType(String),

    // ==================
    // Property access
    // ==================
    #[error("property {property} not found in type {type_signature}")]
    UnknownProperty {
        type_signature: String,
        property: String,
    },

    #[error("value of type {actual} is not assignable to property {property} of type {expected}")]
    TypeMismatch {
        property: String,
        expected: String,
        actual: String,
    },

    #[error("property {property} of type {type_signature} is not a collection")]
    NotACollection {
        type_signature: String,
        property: String,
    },

    // ==================
    // Session
    // ==================
    #[error("entity not found: {0}")]
    EntityNotFound(String),

    #[error("an entity with globalId {0} is already attached")]
    DuplicateGlobalId(String),
}
