//! Object-graph JSON codec
//!
//! - `lexer`, `parser`: streaming tokenizer and structural tree builder
//! - `json_value`: the parsed tree, converted lazily against a requested type
//! - `coercion`: scalar conversion table
//! - `unmarshaller`: tree → model values, entity identity
//! - `writer`: model values → JSON
//!
//! Round-trip property: `unmarshal(marshal(v))` yields a value graph
//! equivalent to `v` when the same registry is used on both sides.

mod coercion;
mod errors;
mod json_value;
mod lexer;
mod location;
mod options;
mod parser;
mod unmarshaller;
mod writer;

pub use errors::{CodecError, CodecResult, ConversionError, MappingError, Reason, ReasonKind};
pub use json_value::{JsonArray, JsonField, JsonLiteral, JsonObject, JsonScalar, JsonValue};
pub use location::{JsonLocation, JsonSpan};
pub use options::{
    EntityVisitor, IdentityManagementMode, MarshallingOptions, OutputPrettiness,
    PropertyNameSupplier, TypeExplicitness, UnmarshallingOptions,
};
pub use parser::{parse, ParsedJson};
pub use unmarshaller::{DetachedEntityFactory, EntityFactory, JsonUnmarshaller};
pub use writer::{marshal, marshal_entity, JsonWriter};
