//! Shared helpers for objstream integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use objstream_core::{
    FieldDef, FieldType, Heap, ObjectReader, ObjectWriter, Result, TypeDef, TypeRegistry, Value,
};

/// A registry with `com.example.Node { int value; Node next; String label }`.
pub fn node_registry() -> Arc<TypeRegistry> {
    let registry = TypeRegistry::new();
    registry.register(node_def()).unwrap();
    Arc::new(registry)
}

pub fn node_def() -> TypeDef {
    TypeDef::builder("com.example.Node")
        .serializable()
        .serial_version_uid(1)
        .field(FieldDef::new("value", FieldType::Int))
        .field(FieldDef::of_class("next", "com.example.Node"))
        .field(FieldDef::of_class("label", "java.lang.String"))
        .build()
}

pub fn new_node(heap: &mut Heap, value: i32) -> Value {
    let id = heap.new_instance("com.example.Node").unwrap();
    heap.set_field(id, "value", Value::Int(value)).unwrap();
    Value::Ref(id)
}

/// Writes every value with one writer and returns the stream bytes.
pub fn write_all(heap: &mut Heap, values: &[Value]) -> Vec<u8> {
    let mut writer = ObjectWriter::new(Vec::new()).unwrap();
    for value in values {
        writer.write_object(heap, *value).unwrap();
    }
    writer.into_inner().unwrap()
}

/// Reads `count` top-level objects, keeping each outcome.
pub fn read_all(heap: &mut Heap, bytes: &[u8], count: usize) -> Vec<Result<Value>> {
    let mut reader = ObjectReader::new(bytes).unwrap();
    (0..count).map(|_| reader.read_object(heap)).collect()
}

/// Writes one value and reads it back into a fresh heap over `registry`.
pub fn round_trip(heap: &mut Heap, value: Value, registry: Arc<TypeRegistry>) -> (Heap, Value) {
    let bytes = write_all(heap, &[value]);
    let mut target = Heap::new(registry);
    let mut reader = ObjectReader::new(bytes.as_slice()).unwrap();
    let copy = reader.read_object(&mut target).unwrap();
    (target, copy)
}

pub fn count_occurrences(haystack: &[u8], needle: &[u8]) -> usize {
    haystack.windows(needle.len()).filter(|w| *w == needle).count()
}
