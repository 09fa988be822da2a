//! Object-graph codec behavior across marshal and unmarshal

use entity_ledger::codec::{
    marshal, CodecError, JsonUnmarshaller, MarshallingOptions, OutputPrettiness, ReasonKind,
};
use entity_ledger::model::{
    Decimal, Entity, EnumValue, GenericModelType, Value, ValueMap, ValueSet,
};
use entity_ledger::testing::{fixture_registry, COLOR, FILE_SOURCE, RESOURCE};

// =============================================================================
// Test Utilities
// =============================================================================

fn new_entity(signature: &str) -> Entity {
    let registry = fixture_registry();
    Entity::new(registry.require_entity_type(signature).unwrap())
}

fn as_entity(value: Value) -> Entity {
    match value {
        Value::Entity(entity) => entity,
        other => panic!("expected entity, got {:?}", other),
    }
}

fn rich_graph() -> Entity {
    let source = new_entity(FILE_SOURCE);
    source.set_direct("name", Value::from("disk"));
    source.set_direct("path", Value::from("/var/logo.png"));

    let mut tags = ValueSet::new();
    tags.insert(Value::from("brand"));
    tags.insert(Value::from("svg"));

    let mut attributes = ValueMap::new();
    attributes.insert(Value::from("width"), Value::from("64"));
    attributes.insert(Value::from("height"), Value::from("32"));

    let child = new_entity(RESOURCE);
    child.set_direct("name", Value::from("child"));

    let root = new_entity(RESOURCE);
    root.set_direct("name", Value::from("logo"));
    root.set_direct("size", Value::Long(1 << 40));
    root.set_direct("weight", Value::Float(0.5));
    root.set_direct("rating", Value::Double(4.25));
    root.set_direct("price", Value::Decimal("19.99".parse::<Decimal>().unwrap()));
    root.set_direct("created", Value::date_from_millis(1_700_000_000_123).unwrap());
    root.set_direct("color", Value::Enum(EnumValue::new(COLOR, "BLUE")));
    root.set_direct("tags", Value::Set(tags));
    root.set_direct("attributes", Value::Map(attributes));
    root.set_direct("notes", Value::List(vec![Value::from("b"), Value::from("a")]));
    root.set_direct("source", Value::Entity(source));
    root.set_direct(
        "related",
        Value::List(vec![Value::Entity(child.clone()), Value::Entity(root.clone())]),
    );
    child.set_direct("parent", Value::Entity(root.clone()));
    root
}

const SCALARS: [&str; 10] = [
    "name", "size", "weight", "rating", "price", "created", "color", "tags", "attributes", "notes",
];

fn assert_same_graph(original: &Entity, decoded: &Entity) {
    assert_eq!(decoded.type_signature(), original.type_signature());
    for property in SCALARS {
        assert_eq!(
            decoded.get(property),
            original.get(property),
            "property {} differs",
            property
        );
    }

    let source = decoded.get("source");
    let source = source.as_entity().unwrap();
    assert_eq!(source.type_signature(), FILE_SOURCE);
    assert_eq!(source.get("path"), Value::from("/var/logo.png"));

    let related = decoded.get("related");
    let related = related.as_list().unwrap();
    assert_eq!(related.len(), 2);
    let child = related[0].as_entity().unwrap();
    assert_eq!(child.get("name"), Value::from("child"));
    assert_eq!(child.get("parent"), Value::Entity(decoded.clone()));
    assert_eq!(related[1], Value::Entity(decoded.clone()));
}

// =============================================================================
// Round trips
// =============================================================================

#[test]
fn test_cyclic_graph_round_trips() {
    let root = rich_graph();
    let json = marshal(&Value::Entity(root.clone()), &MarshallingOptions::default()).unwrap();

    let decoded = JsonUnmarshaller::new(fixture_registry())
        .unmarshal(&json)
        .unwrap();
    assert_same_graph(&root, &as_entity(decoded));
}

#[test]
fn test_pretty_output_decodes_to_the_same_graph() {
    let root = rich_graph();
    let options = MarshallingOptions {
        prettiness: OutputPrettiness::High,
        ..MarshallingOptions::default()
    };
    let json = marshal(&Value::Entity(root.clone()), &options).unwrap();
    assert!(json.contains('\n'));

    let decoded = JsonUnmarshaller::new(fixture_registry())
        .unmarshal(&json)
        .unwrap();
    assert_same_graph(&root, &as_entity(decoded));
}

#[test]
fn test_marshalling_is_deterministic() {
    let root = rich_graph();
    let options = MarshallingOptions::default();
    let first = marshal(&Value::Entity(root.clone()), &options).unwrap();
    let second = marshal(&Value::Entity(root), &options).unwrap();
    assert_eq!(first, second);
}

// =============================================================================
// Coercion
// =============================================================================

#[test]
fn test_integer_literal_widens_to_declared_type() {
    let codec = JsonUnmarshaller::new(fixture_registry());
    assert_eq!(
        codec.unmarshal_as("5", &GenericModelType::Long).unwrap(),
        Value::Long(5)
    );
    assert_eq!(
        codec.unmarshal_as("5", &GenericModelType::Float).unwrap(),
        Value::Float(5.0)
    );
    assert_eq!(
        codec.unmarshal_as("5", &GenericModelType::Double).unwrap(),
        Value::Double(5.0)
    );
    assert_eq!(codec.unmarshal("5").unwrap(), Value::Integer(5));
}

#[test]
fn test_string_for_integer_is_conversion_error() {
    let codec = JsonUnmarshaller::new(fixture_registry());
    let err = codec
        .unmarshal_as(r#""five""#, &GenericModelType::Integer)
        .unwrap_err();
    assert!(matches!(err, CodecError::Conversion(_)));
    assert_eq!(err.reason().unwrap().kind, ReasonKind::TypeMismatch);
}

#[test]
fn test_bad_property_value_reports_property_chain() {
    let codec = JsonUnmarshaller::new(fixture_registry());
    let err = codec
        .unmarshal(r#"{"_type": "test.Resource", "_id": "0", "size": true}"#)
        .unwrap_err();
    assert!(matches!(err, CodecError::Mapping(_)));
    assert_eq!(
        err.reason().unwrap().root_cause().kind,
        ReasonKind::TypeMismatch
    );
}

#[test]
fn test_truncated_document_is_structural_error() {
    let codec = JsonUnmarshaller::new(fixture_registry());
    let err = codec.unmarshal(r#"{"_type": "test.Resource", "#).unwrap_err();
    assert!(matches!(err, CodecError::StructuralParse { .. }));
}
