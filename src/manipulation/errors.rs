use thiserror::Error;

use crate::codec::CodecError;
use crate::model::ModelError;

pub type WireResult<T> = Result<T, WireError>;

/// Failures converting manipulations to and from their wire form.
#[derive(Debug, Error)]
pub enum WireError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("entity of type {0} has no globalId and cannot be referenced")]
    Unreferenceable(String),

    #[error("unresolved entity reference {0}")]
    UnresolvedReference(String),

    #[error("malformed manipulation: {0}")]
    Malformed(String),
}
