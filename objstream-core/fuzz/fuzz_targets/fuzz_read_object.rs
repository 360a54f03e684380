#![no_main]

use std::sync::Arc;

use libfuzzer_sys::fuzz_target;

use objstream_core::{FieldDef, FieldType, Heap, ObjectReader, StreamConfig, TypeDef, TypeRegistry};

fn registry() -> Arc<TypeRegistry> {
    let registry = TypeRegistry::new();
    let _ = registry.register(
        TypeDef::builder("fuzz.Node")
            .serializable()
            .serial_version_uid(1)
            .field(FieldDef::new("value", FieldType::Int))
            .field(FieldDef::of_class("next", "fuzz.Node"))
            .field(FieldDef::of_class("label", "java.lang.String"))
            .build(),
    );
    let _ = registry.register(TypeDef::enumeration("fuzz.Color", ["RED", "GREEN"]).build());
    Arc::new(registry)
}

fuzz_target!(|data: &[u8]| {
    let Ok(config) = StreamConfig::builder()
        .serial_filter("maxdepth=64;maxarray=65536;maxrefs=10000")
        .build()
    else {
        return;
    };
    let mut heap = Heap::new(registry());
    let Ok(mut reader) = ObjectReader::with_config(data, &config) else {
        return;
    };
    for _ in 0..16 {
        if reader.read_object(&mut heap).is_err() {
            break;
        }
    }
});
