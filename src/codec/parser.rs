//! Streaming JSON parser
//!
//! The parser drives a [`JsonHandler`] with structural events. The
//! [`TreeBuilder`] handler assembles them into a [`JsonValue`] tree on an
//! explicit stack, so nesting depth is bounded by memory, not call depth.

use crate::model::builtin::{GLOBAL_ID_PROPERTY, ID_PROPERTY};

use super::errors::{CodecError, CodecResult};
use super::json_value::{
    JsonArray, JsonField, JsonLiteral, JsonObject, JsonScalar, JsonValue, ID_KEY, REF_KEY,
};
use super::lexer::{Lexer, Token};
use super::location::JsonSpan;
use super::options::IdentityManagementMode;

/// Receiver of structural parse events.
pub(crate) trait JsonHandler {
    fn open_object(&mut self, span: JsonSpan) -> CodecResult<()>;
    fn key(&mut self, name: String, span: JsonSpan) -> CodecResult<()>;
    fn close_object(&mut self, span: JsonSpan) -> CodecResult<()>;
    fn open_array(&mut self, span: JsonSpan) -> CodecResult<()>;
    fn close_array(&mut self, span: JsonSpan) -> CodecResult<()>;
    fn scalar(&mut self, literal: JsonLiteral, span: JsonSpan) -> CodecResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    Object,
    Array,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Value,
    ValueOrEndArray,
    KeyOrEndObject,
    Key,
    Colon,
    CommaOrEnd,
    Done,
}

/// Tokenizes `input` and feeds the events to `handler`.
pub(crate) fn parse_events(input: &str, handler: &mut impl JsonHandler) -> CodecResult<()> {
    let mut lexer = Lexer::new(input);
    let mut stack: Vec<Container> = Vec::new();
    let mut expect = Expect::Value;

    loop {
        let (token, span) = match lexer.next_token()? {
            Some(next) => next,
            None if expect == Expect::Done => return Ok(()),
            None => {
                return Err(CodecError::structural(
                    "unexpected end of input",
                    lexer.location(),
                ))
            }
        };

        let unexpected = |token: &Token| {
            CodecError::structural(format!("unexpected token {:?}", token), span.start)
        };

        expect = match (expect, token) {
            (Expect::Value | Expect::ValueOrEndArray, Token::BeginObject) => {
                handler.open_object(span)?;
                stack.push(Container::Object);
                Expect::KeyOrEndObject
            }
            (Expect::Value | Expect::ValueOrEndArray, Token::BeginArray) => {
                handler.open_array(span)?;
                stack.push(Container::Array);
                Expect::ValueOrEndArray
            }
            (Expect::Value | Expect::ValueOrEndArray, Token::Literal(literal)) => {
                handler.scalar(literal, span)?;
                after_value(&stack)
            }
            (Expect::ValueOrEndArray, Token::EndArray) => {
                stack.pop();
                handler.close_array(span)?;
                after_value(&stack)
            }
            (Expect::KeyOrEndObject | Expect::Key, Token::Literal(JsonLiteral::String(name))) => {
                handler.key(name, span)?;
                Expect::Colon
            }
            (Expect::KeyOrEndObject, Token::EndObject) => {
                stack.pop();
                handler.close_object(span)?;
                after_value(&stack)
            }
            (Expect::Colon, Token::Colon) => Expect::Value,
            (Expect::CommaOrEnd, Token::Comma) => match stack.last() {
                Some(Container::Object) => Expect::Key,
                _ => Expect::Value,
            },
            (Expect::CommaOrEnd, Token::EndObject) if stack.last() == Some(&Container::Object) => {
                stack.pop();
                handler.close_object(span)?;
                after_value(&stack)
            }
            (Expect::CommaOrEnd, Token::EndArray) if stack.last() == Some(&Container::Array) => {
                stack.pop();
                handler.close_array(span)?;
                after_value(&stack)
            }
            (_, token) => return Err(unexpected(&token)),
        };
    }
}

fn after_value(stack: &[Container]) -> Expect {
    if stack.is_empty() {
        Expect::Done
    } else {
        Expect::CommaOrEnd
    }
}

enum Frame {
    Object {
        start: JsonSpan,
        fields: Vec<JsonField>,
        key: Option<(String, JsonSpan)>,
    },
    Array {
        start: JsonSpan,
        values: Vec<JsonValue>,
    },
}

/// Builds the value tree and infers the identity mode from the first
/// identity key seen in document order.
#[derive(Default)]
pub(crate) struct TreeBuilder {
    stack: Vec<Frame>,
    root: Option<JsonValue>,
    inferred_mode: Option<IdentityManagementMode>,
}

impl TreeBuilder {
    fn attach(&mut self, value: JsonValue) -> CodecResult<()> {
        match self.stack.last_mut() {
            None => {
                if self.root.is_some() {
                    return Err(CodecError::structural(
                        "unexpected number of root values",
                        value.span().start,
                    ));
                }
                self.root = Some(value);
            }
            Some(Frame::Object { fields, key, .. }) => {
                let (name, name_span) = key.take().ok_or_else(|| {
                    CodecError::structural("object value without key", value.span().start)
                })?;
                fields.push(JsonField {
                    name,
                    name_span,
                    value,
                });
            }
            Some(Frame::Array { values, .. }) => values.push(value),
        }
        Ok(())
    }

    pub(crate) fn finish(self) -> CodecResult<ParsedJson> {
        match (self.stack.is_empty(), self.root) {
            (true, Some(root)) => Ok(ParsedJson {
                root,
                inferred_identity_mode: self.inferred_mode,
            }),
            (_, root) => Err(CodecError::structural(
                "incomplete document",
                root.map(|r| r.span().end).unwrap_or_default(),
            )),
        }
    }
}

impl JsonHandler for TreeBuilder {
    fn open_object(&mut self, span: JsonSpan) -> CodecResult<()> {
        self.stack.push(Frame::Object {
            start: span,
            fields: Vec::new(),
            key: None,
        });
        Ok(())
    }

    fn key(&mut self, name: String, span: JsonSpan) -> CodecResult<()> {
        if self.inferred_mode.is_none() {
            self.inferred_mode = match name.as_str() {
                ID_KEY | REF_KEY => Some(IdentityManagementMode::ShortId),
                ID_PROPERTY | GLOBAL_ID_PROPERTY => Some(IdentityManagementMode::Id),
                _ => None,
            };
        }
        match self.stack.last_mut() {
            Some(Frame::Object { key, .. }) => {
                *key = Some((name, span));
                Ok(())
            }
            _ => Err(CodecError::structural("key outside of object", span.start)),
        }
    }

    fn close_object(&mut self, span: JsonSpan) -> CodecResult<()> {
        match self.stack.pop() {
            Some(Frame::Object { start, fields, .. }) => self.attach(JsonValue::Object(
                JsonObject::new(fields, JsonSpan::new(start.start, span.end)),
            )),
            _ => Err(CodecError::structural("mismatched '}'", span.start)),
        }
    }

    fn open_array(&mut self, span: JsonSpan) -> CodecResult<()> {
        self.stack.push(Frame::Array {
            start: span,
            values: Vec::new(),
        });
        Ok(())
    }

    fn close_array(&mut self, span: JsonSpan) -> CodecResult<()> {
        match self.stack.pop() {
            Some(Frame::Array { start, values }) => self.attach(JsonValue::Array(JsonArray {
                values,
                span: JsonSpan::new(start.start, span.end),
            })),
            _ => Err(CodecError::structural("mismatched ']'", span.start)),
        }
    }

    fn scalar(&mut self, literal: JsonLiteral, span: JsonSpan) -> CodecResult<()> {
        self.attach(JsonValue::Scalar(JsonScalar { literal, span }))
    }
}

/// A structurally valid document awaiting conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedJson {
    pub root: JsonValue,
    /// Identity mode implied by the first `_id`/`_ref`/`id` key, if any.
    pub inferred_identity_mode: Option<IdentityManagementMode>,
}

/// Parses `input` into a tree without interpreting it.
pub fn parse(input: &str) -> CodecResult<ParsedJson> {
    let mut builder = TreeBuilder::default();
    parse_events(input, &mut builder)?;
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builds_nested_tree() {
        let parsed = parse(r#"{"a": [1, {"b": null}], "c": "x"}"#).unwrap();
        let root = parsed.root.as_object().unwrap();
        assert_eq!(root.fields.len(), 2);
        match root.get("a") {
            Some(JsonValue::Array(arr)) => {
                assert_eq!(arr.values.len(), 2);
                assert!(matches!(arr.values[1], JsonValue::Object(_)));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(root.get("c").and_then(|v| v.as_str()), Some("x"));
        assert_eq!(parsed.inferred_identity_mode, None);
    }

    #[test]
    fn test_infers_identity_mode_from_first_key() {
        let parsed = parse(r#"{"_type": "t", "_id": "0", "id": 5}"#).unwrap();
        assert_eq!(
            parsed.inferred_identity_mode,
            Some(IdentityManagementMode::ShortId)
        );

        let parsed = parse(r#"{"id": 5, "other": {"_ref": "0"}}"#).unwrap();
        assert_eq!(parsed.inferred_identity_mode, Some(IdentityManagementMode::Id));

        let parsed = parse(r#"{"globalId": "g1", "_ref": "0"}"#).unwrap();
        assert_eq!(parsed.inferred_identity_mode, Some(IdentityManagementMode::Id));
    }

    #[test]
    fn test_special_fields_are_indexed() {
        let parsed = parse(r#"{"name": "n", "_type": "t", "_id": "3"}"#).unwrap();
        let root = parsed.root.as_object().unwrap();
        assert_eq!(root.type_field().unwrap().value.as_str(), Some("t"));
        assert_eq!(root.id_field().unwrap().value.as_str(), Some("3"));
        assert_eq!(root.property_fields().count(), 1);
    }

    #[test]
    fn test_structural_errors() {
        for input in ["", "{", "[1,]", "{\"a\" 1}", "{\"a\": 1,}", "1 2", "]", "{1: 2}"] {
            match parse(input) {
                Err(CodecError::StructuralParse { .. }) => {}
                other => panic!("expected structural error for {:?}, got {:?}", input, other),
            }
        }
    }

    #[test]
    fn test_spans_cover_containers() {
        let parsed = parse("[\n  {}\n]").unwrap();
        let span = parsed.root.span();
        assert_eq!(span.start.line, 1);
        assert_eq!(span.end.line, 3);
    }
}
