//! `#[derive(StreamObject)]` against the stream engine.

mod common;

use std::sync::Arc;

use objstream_core::{
    DescribeType, Heap, StreamError, StreamObject, TypeRegistry, Value,
};
use objstream_derive::StreamObject;

use common::{read_all, write_all};

#[derive(Debug, Clone, PartialEq, StreamObject)]
#[objstream(name = "com.example.Person", serial_version_uid = 1)]
struct Person {
    name: String,
    age: i32,
    #[objstream(rename = "emailAddress")]
    email: Option<String>,
    active: bool,
    score: f64,
    #[objstream(transient)]
    cached_hash: i32,
    #[objstream(skip)]
    scratch: Vec<u8>,
}

#[derive(Debug, PartialEq, StreamObject)]
#[objstream(serial_version_uid = -3)]
struct Sample {
    level: i8,
    initial: u16,
    delta: i16,
    total: i64,
    ratio: f32,
}

fn person() -> Person {
    Person {
        name: "Ada".to_string(),
        age: 36,
        email: Some("ada@example.com".to_string()),
        active: true,
        score: 99.5,
        cached_hash: 0,
        scratch: Vec::new(),
    }
}

fn registry() -> Arc<TypeRegistry> {
    let registry = TypeRegistry::new();
    Person::register(&registry).unwrap();
    Sample::register(&registry).unwrap();
    Arc::new(registry)
}

#[test]
fn test_type_def_shape() {
    let def = Person::type_def();
    assert_eq!(def.name(), "com.example.Person");
    let names: Vec<&str> = def.fields().iter().map(|f| f.name()).collect();
    assert_eq!(
        names,
        vec!["name", "age", "emailAddress", "active", "score", "cached_hash"]
    );
    let email = &def.fields()[2];
    assert_eq!(email.signature(), "Ljava/lang/String;");
    assert!(def.fields()[5].is_transient());
    assert_eq!(def.fields()[1].signature(), "I");
}

#[test]
fn test_derived_round_trip() {
    let registry = registry();
    let mut heap = Heap::new(Arc::clone(&registry));
    let mut original = person();
    original.cached_hash = 77;
    original.scratch = vec![1, 2, 3];
    let id = original.to_heap(&mut heap).unwrap();
    assert_eq!(
        heap.string(heap.field_of(id, "com.example.Person", "emailAddress").unwrap()),
        Some("ada@example.com")
    );

    let bytes = write_all(&mut heap, &[Value::Ref(id)]);
    let mut target = Heap::new(registry);
    let copy = read_all(&mut target, &bytes, 1).remove(0).unwrap();
    let restored = Person::from_heap(&target, copy.as_object().unwrap()).unwrap();

    assert_eq!(restored, person());
}

#[test]
fn test_missing_optional_string_reads_as_none() {
    let registry = registry();
    let mut heap = Heap::new(Arc::clone(&registry));
    let original = Person {
        email: None,
        ..person()
    };
    let id = original.to_heap(&mut heap).unwrap();
    assert!(heap.field(id, "emailAddress").unwrap().is_null());

    let bytes = write_all(&mut heap, &[Value::Ref(id)]);
    let mut target = Heap::new(registry);
    let copy = read_all(&mut target, &bytes, 1).remove(0).unwrap();
    let restored = Person::from_heap(&target, copy.as_object().unwrap()).unwrap();
    assert_eq!(restored.email, None);
}

#[test]
fn test_primitive_fields_round_trip() {
    let registry = registry();
    let mut heap = Heap::new(Arc::clone(&registry));
    let sample = Sample {
        level: -8,
        initial: 'Z' as u16,
        delta: -300,
        total: i64::MAX,
        ratio: 0.25,
    };
    let def = Sample::type_def();
    assert_eq!(def.name(), "Sample");

    let id = sample.to_heap(&mut heap).unwrap();
    let bytes = write_all(&mut heap, &[Value::Ref(id)]);
    let mut target = Heap::new(registry);
    let copy = read_all(&mut target, &bytes, 1).remove(0).unwrap();
    assert_eq!(
        Sample::from_heap(&target, copy.as_object().unwrap()).unwrap(),
        sample
    );
}

#[test]
fn test_from_heap_rejects_other_class() {
    let registry = registry();
    let mut heap = Heap::new(registry);
    let sample = Sample {
        level: 0,
        initial: 0,
        delta: 0,
        total: 0,
        ratio: 0.0,
    };
    let id = sample.to_heap(&mut heap).unwrap();
    let err = Person::from_heap(&heap, id).unwrap_err();
    assert!(matches!(err, StreamError::IllegalState(ref msg) if msg.contains("com.example.Person")));
}
