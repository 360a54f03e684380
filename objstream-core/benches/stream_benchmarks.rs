//! Object stream write/read throughput benchmarks.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use objstream_core::{
    ArrayElements, FieldDef, FieldType, Heap, ObjectId, ObjectReader, ObjectWriter, TypeDef,
    TypeRegistry,
};

fn registry() -> Arc<TypeRegistry> {
    let registry = TypeRegistry::new();
    registry
        .register(
            TypeDef::builder("bench.Node")
                .serializable()
                .serial_version_uid(1)
                .field(FieldDef::new("value", FieldType::Int))
                .field(FieldDef::of_class("label", "java.lang.String"))
                .field(FieldDef::of_class("next", "bench.Node"))
                .build(),
        )
        .unwrap();
    Arc::new(registry)
}

fn build_list(heap: &mut Heap, len: usize) -> ObjectId {
    let label = heap.alloc_string("node");
    let mut next = None;
    for i in 0..len {
        let node = heap.new_instance("bench.Node").unwrap();
        heap.set_field(node, "value", (i as i32).into()).unwrap();
        heap.set_field(node, "label", label.into()).unwrap();
        heap.set_field(node, "next", next.into()).unwrap();
        next = Some(node);
    }
    next.unwrap()
}

fn write_graph(heap: &mut Heap, root: ObjectId) -> Vec<u8> {
    let mut writer = ObjectWriter::new(Vec::new()).unwrap();
    writer.write_object(heap, root).unwrap();
    writer.into_inner().unwrap()
}

fn bench_linked_list(c: &mut Criterion) {
    let mut group = c.benchmark_group("linked_list");
    let registry = registry();

    for len in [10usize, 100, 400] {
        let mut heap = Heap::new(Arc::clone(&registry));
        let root = build_list(&mut heap, len);
        let bytes = write_graph(&mut heap, root);
        group.throughput(Throughput::Bytes(bytes.len() as u64));

        group.bench_with_input(BenchmarkId::new("write", len), &len, |b, _| {
            b.iter(|| black_box(write_graph(&mut heap, root)))
        });

        group.bench_with_input(BenchmarkId::new("read", len), &len, |b, _| {
            b.iter(|| {
                let mut target = Heap::new(Arc::clone(&registry));
                let mut reader = ObjectReader::new(bytes.as_slice()).unwrap();
                black_box(reader.read_object(&mut target).unwrap())
            })
        });
    }

    group.finish();
}

fn bench_primitive_array(c: &mut Criterion) {
    let mut group = c.benchmark_group("int_array");
    let registry = registry();

    for len in [1024usize, 65536] {
        let mut heap = Heap::new(Arc::clone(&registry));
        let values: Vec<i32> = (0..len as i32).collect();
        let array = heap.alloc_array("[I", ArrayElements::Int(values)).unwrap();
        let bytes = write_graph(&mut heap, array);
        group.throughput(Throughput::Bytes(bytes.len() as u64));

        group.bench_with_input(BenchmarkId::new("write", len), &len, |b, _| {
            b.iter(|| black_box(write_graph(&mut heap, array)))
        });

        group.bench_with_input(BenchmarkId::new("read", len), &len, |b, _| {
            b.iter(|| {
                let mut target = Heap::new(Arc::clone(&registry));
                let mut reader = ObjectReader::new(bytes.as_slice()).unwrap();
                black_box(reader.read_object(&mut target).unwrap())
            })
        });
    }

    group.finish();
}

fn bench_strings(c: &mut Criterion) {
    let mut group = c.benchmark_group("strings");
    let registry = registry();

    let mut heap = Heap::new(Arc::clone(&registry));
    let short = heap.alloc_string("hello, world");
    let long = heap.alloc_string("x".repeat(70_000));

    group.bench_function("short_write", |b| {
        b.iter(|| black_box(write_graph(&mut heap, short)))
    });

    group.bench_function("long_write", |b| {
        b.iter(|| black_box(write_graph(&mut heap, long)))
    });

    let long_bytes = write_graph(&mut heap, long);
    group.bench_function("long_read", |b| {
        b.iter(|| {
            let mut target = Heap::new(Arc::clone(&registry));
            let mut reader = ObjectReader::new(long_bytes.as_slice()).unwrap();
            black_box(reader.read_object(&mut target).unwrap())
        })
    });

    group.finish();
}

criterion_group!(benches, bench_linked_list, bench_primitive_array, bench_strings);

criterion_main!(benches);
