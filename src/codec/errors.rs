//! Codec errors
//!
//! Conversion and mapping failures carry a chain of [`Reason`]s. Each level
//! of the object graph that a failure bubbles through adds a reason naming
//! the property and type it occurred in.

use std::fmt;

use thiserror::Error;

use super::location::{JsonLocation, JsonSpan};

pub type CodecResult<T> = Result<T, CodecError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasonKind {
    InvalidArgument,
    NotFound,
    TypeMismatch,
}

/// A failure description with optional location and causes.
#[derive(Debug, Clone, PartialEq)]
pub struct Reason {
    pub kind: ReasonKind,
    pub text: String,
    pub location: Option<JsonSpan>,
    pub causes: Vec<Reason>,
}

impl Reason {
    pub fn new(kind: ReasonKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            location: None,
            causes: Vec::new(),
        }
    }

    pub fn at(mut self, span: JsonSpan) -> Self {
        self.location = Some(span);
        self
    }

    pub fn caused_by(mut self, cause: Reason) -> Self {
        self.causes.push(cause);
        self
    }

    /// The innermost reason along the first cause chain.
    pub fn root_cause(&self) -> &Reason {
        match self.causes.first() {
            Some(cause) => cause.root_cause(),
            None => self,
        }
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, level: usize) -> fmt::Result {
        write!(f, "{}", self.text)?;
        if let Some(span) = self.location {
            write!(f, " {}", span)?;
        }
        for cause in &self.causes {
            write!(f, "\n{}caused by: ", "  ".repeat(level + 1))?;
            cause.fmt_indented(f, level + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}

/// A scalar or structure could not be coerced to the requested type.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{0}")]
pub struct ConversionError(pub Reason);

/// A JSON field could not be assigned to an entity property.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{0}")]
pub struct MappingError(pub Reason);

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodecError {
    #[error("structural parse error: {message} at {location}")]
    StructuralParse {
        message: String,
        location: JsonLocation,
    },

    #[error("conversion error: {0}")]
    Conversion(ConversionError),

    #[error("mapping error: {0}")]
    Mapping(MappingError),

    #[error("marshalling error: {0}")]
    Marshal(String),
}

impl CodecError {
    pub fn structural(message: impl Into<String>, location: JsonLocation) -> Self {
        CodecError::StructuralParse {
            message: message.into(),
            location,
        }
    }

    pub fn conversion(kind: ReasonKind, text: impl Into<String>, span: JsonSpan) -> Self {
        CodecError::Conversion(ConversionError(Reason::new(kind, text).at(span)))
    }

    pub fn mapping(kind: ReasonKind, text: impl Into<String>, span: JsonSpan) -> Self {
        CodecError::Mapping(MappingError(Reason::new(kind, text).at(span)))
    }

    /// Wraps the error as a mapping failure of `property` within `type_signature`.
    pub fn within_property(self, property: &str, type_signature: &str, span: JsonSpan) -> Self {
        let reason = Reason::new(
            ReasonKind::InvalidArgument,
            format!(
                "Invalid value for property [{}] within type {}",
                property, type_signature
            ),
        )
        .at(span);
        match self.into_reason() {
            Ok(cause) => CodecError::Mapping(MappingError(reason.caused_by(cause))),
            Err(other) => other,
        }
    }

    pub fn reason(&self) -> Option<&Reason> {
        match self {
            CodecError::Conversion(ConversionError(r)) | CodecError::Mapping(MappingError(r)) => {
                Some(r)
            }
            _ => None,
        }
    }

    fn into_reason(self) -> Result<Reason, CodecError> {
        match self {
            CodecError::Conversion(ConversionError(r)) | CodecError::Mapping(MappingError(r)) => {
                Ok(r)
            }
            other => Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_within_property_chains_reasons() {
        let err = CodecError::conversion(
            ReasonKind::TypeMismatch,
            "Cannot convert string to integer",
            JsonSpan::default(),
        )
        .within_property("size", "test.Resource", JsonSpan::default());

        let reason = err.reason().unwrap();
        assert!(matches!(err, CodecError::Mapping(_)));
        assert!(reason.text.contains("[size]"));
        assert_eq!(reason.root_cause().kind, ReasonKind::TypeMismatch);

        let rendered = err.to_string();
        assert!(rendered.contains("caused by: Cannot convert string to integer"));
    }

    #[test]
    fn test_structural_errors_pass_through_unchanged() {
        let err = CodecError::structural("unexpected end", JsonLocation::default())
            .within_property("x", "t", JsonSpan::default());
        assert!(matches!(err, CodecError::StructuralParse { .. }));
    }
}
