//! Array Storage Benchmarks
//!
//! Compares element access on fast-mode arrays with the same workload
//! after conversion to dictionary mode.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use marten_vm_core::object::{AttributeIntent, PropertyKey};
use marten_vm_core::{JsObject, Value};
use std::hint::black_box;

fn filled(len: u32) -> JsObject {
    let arr = JsObject::new_array(None);
    for i in 0..len {
        let _ = arr.set(PropertyKey::index(i), Value::int32(i as i32));
    }
    arr
}

/// Benchmark: appending elements one by one
fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("array_append");
    for len in [16u32, 1024] {
        group.bench_with_input(BenchmarkId::new("fast", len), &len, |b, &len| {
            b.iter(|| black_box(filled(len)));
        });
        group.bench_with_input(BenchmarkId::new("dictionary", len), &len, |b, &len| {
            b.iter(|| {
                let arr = JsObject::new_array(None);
                arr.convert_into_non_fast_mode();
                for i in 0..len {
                    let _ = arr.set(PropertyKey::index(i), Value::int32(i as i32));
                }
                black_box(arr)
            });
        });
    }
    group.finish();
}

/// Benchmark: reading every element
fn bench_read(c: &mut Criterion) {
    let fast = filled(1024);
    let slow = filled(1024);
    slow.convert_into_non_fast_mode();

    c.bench_function("array_read_fast_1024", |b| {
        b.iter(|| {
            let mut sum = 0.0;
            for i in 0..1024 {
                if let Some(desc) = fast.array_fast_get(i) {
                    sum += desc.value().map_or(0.0, Value::to_number);
                }
            }
            black_box(sum)
        });
    });

    c.bench_function("array_read_dictionary_1024", |b| {
        b.iter(|| {
            let mut sum = 0.0;
            for i in 0..1024 {
                if let Some(v) = slow.get(&PropertyKey::index(i)) {
                    sum += v.to_number();
                }
            }
            black_box(sum)
        });
    });
}

/// Benchmark: overwriting occupied slots through the fast path
fn bench_overwrite(c: &mut Criterion) {
    let arr = filled(1024);
    c.bench_function("array_overwrite_fast_1024", |b| {
        b.iter(|| {
            for i in 0..1024 {
                let _ = arr.array_fast_set(i, Value::int32(0), AttributeIntent::Unspecified);
            }
        });
    });
}

criterion_group!(benches, bench_append, bench_read, bench_overwrite);
criterion_main!(benches);
