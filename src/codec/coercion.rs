//! Scalar coercion table
//!
//! | target  | accepted JSON literals              |
//! |---------|-------------------------------------|
//! | object  | any (natural mapping)               |
//! | boolean | boolean                             |
//! | string  | string                              |
//! | integer | integer                             |
//! | long    | integer, long, numeric string       |
//! | float   | integer, double                     |
//! | double  | integer, long, double               |
//! | decimal | integer, long, double, string       |
//! | date    | integer, long (epoch ms), string    |
//! | enum    | string naming a constant            |
//!
//! `null` converts to `Null` for every target.

use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::model::{Decimal, EnumValue, GenericModelType, TypeRegistry, Value};

use super::errors::{CodecError, CodecResult, ReasonKind};
use super::json_value::JsonLiteral;
use super::location::JsonSpan;

fn natural(literal: &JsonLiteral) -> Value {
    match literal {
        JsonLiteral::Null => Value::Null,
        JsonLiteral::Boolean(b) => Value::Boolean(*b),
        JsonLiteral::String(s) => Value::String(s.clone()),
        JsonLiteral::Integer(i) => Value::Integer(*i),
        JsonLiteral::Long(l) => Value::Long(*l),
        JsonLiteral::Double(d) => Value::Double(*d),
    }
}

fn mismatch(literal: &JsonLiteral, target: &GenericModelType, span: JsonSpan) -> CodecError {
    CodecError::conversion(
        ReasonKind::TypeMismatch,
        format!("Cannot convert {} to {}", literal.kind_name(), target),
        span,
    )
}

fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

pub(crate) fn coerce_scalar(
    literal: &JsonLiteral,
    target: &GenericModelType,
    registry: &TypeRegistry,
    span: JsonSpan,
) -> CodecResult<Value> {
    use GenericModelType as T;
    use JsonLiteral as L;

    if let L::Null = literal {
        return Ok(Value::Null);
    }

    let converted = match (target, literal) {
        (T::Object, _) => Some(natural(literal)),
        (T::Boolean, L::Boolean(b)) => Some(Value::Boolean(*b)),
        (T::String, L::String(s)) => Some(Value::String(s.clone())),
        (T::Integer, L::Integer(i)) => Some(Value::Integer(*i)),
        (T::Long, L::Integer(i)) => Some(Value::Long(i64::from(*i))),
        (T::Long, L::Long(l)) => Some(Value::Long(*l)),
        (T::Long, L::String(s)) => s.trim().parse::<i64>().ok().map(Value::Long),
        (T::Float, L::Integer(i)) => Some(Value::Float(*i as f32)),
        (T::Float, L::Double(d)) => Some(Value::Float(*d as f32)),
        (T::Double, L::Integer(i)) => Some(Value::Double(f64::from(*i))),
        (T::Double, L::Long(l)) => Some(Value::Double(*l as f64)),
        (T::Double, L::Double(d)) => Some(Value::Double(*d)),
        (T::Decimal, L::Integer(i)) => Some(Value::Decimal(Decimal::from_i64(i64::from(*i)))),
        (T::Decimal, L::Long(l)) => Some(Value::Decimal(Decimal::from_i64(*l))),
        (T::Decimal, L::Double(d)) => Decimal::from_f64(*d).map(Value::Decimal),
        (T::Decimal, L::String(s)) => Decimal::from_str(s).ok().map(Value::Decimal),
        (T::Date, L::Integer(i)) => Value::date_from_millis(i64::from(*i)),
        (T::Date, L::Long(l)) => Value::date_from_millis(*l),
        (T::Date, L::String(s)) => parse_date(s).map(Value::Date),
        (T::Enum(signature), L::String(s)) => {
            let enum_type = registry.enum_type(signature).ok_or_else(|| {
                CodecError::conversion(
                    ReasonKind::NotFound,
                    format!("Unknown enum type {}", signature),
                    span,
                )
            })?;
            if !enum_type.has_constant(s) {
                return Err(CodecError::conversion(
                    ReasonKind::InvalidArgument,
                    format!("Unknown constant {} of enum type {}", s, signature),
                    span,
                ));
            }
            Some(Value::Enum(EnumValue::new(signature.clone(), s.clone())))
        }
        _ => None,
    };

    converted.ok_or_else(|| mismatch(literal, target, span))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixture_registry, COLOR};

    fn coerce(literal: JsonLiteral, target: GenericModelType) -> CodecResult<Value> {
        coerce_scalar(&literal, &target, &fixture_registry(), JsonSpan::default())
    }

    #[test]
    fn test_numeric_widening() {
        assert_eq!(
            coerce(JsonLiteral::Integer(5), GenericModelType::Long).unwrap(),
            Value::Long(5)
        );
        assert_eq!(
            coerce(JsonLiteral::Long(1 << 40), GenericModelType::Double).unwrap(),
            Value::Double((1i64 << 40) as f64)
        );
        assert_eq!(
            coerce(JsonLiteral::String("42".into()), GenericModelType::Long).unwrap(),
            Value::Long(42)
        );
        assert!(coerce(JsonLiteral::Long(1 << 40), GenericModelType::Integer).is_err());
        assert!(coerce(JsonLiteral::Double(1.5), GenericModelType::Integer).is_err());
    }

    #[test]
    fn test_null_and_object_targets() {
        assert_eq!(
            coerce(JsonLiteral::Null, GenericModelType::Date).unwrap(),
            Value::Null
        );
        assert_eq!(
            coerce(JsonLiteral::Double(2.5), GenericModelType::Object).unwrap(),
            Value::Double(2.5)
        );
    }

    #[test]
    fn test_dates() {
        let from_millis = coerce(JsonLiteral::Integer(1000), GenericModelType::Date).unwrap();
        let from_text = coerce(
            JsonLiteral::String("1970-01-01T00:00:01.000Z".into()),
            GenericModelType::Date,
        )
        .unwrap();
        assert_eq!(from_millis, from_text);
        assert!(coerce(JsonLiteral::String("yesterday".into()), GenericModelType::Date).is_err());
    }

    #[test]
    fn test_enum_constants() {
        let ty = GenericModelType::enumeration(COLOR);
        assert_eq!(
            coerce(JsonLiteral::String("RED".into()), ty.clone()).unwrap(),
            Value::Enum(EnumValue::new(COLOR, "RED"))
        );
        assert!(coerce(JsonLiteral::String("PINK".into()), ty).is_err());
    }

    #[test]
    fn test_mismatch_is_conversion_error() {
        let err = coerce(JsonLiteral::Boolean(true), GenericModelType::String).unwrap_err();
        assert!(matches!(err, CodecError::Conversion(_)));
        assert_eq!(err.reason().unwrap().kind, ReasonKind::TypeMismatch);
    }
}
