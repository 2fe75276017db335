//! Benchmarks for hexstash read and write paths
//!
//! Compares windowed lazy reads against materializing the whole array first.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use hexstash::{Array, Entity, Field, OpenMode, Store};
use tempfile::TempDir;

const SIDE: usize = 128;
const ENTITIES: usize = 32;

fn matrix() -> Array {
    let data: Vec<i64> = (0..(SIDE * SIDE) as i64).collect();
    Array::from_shape_vec(vec![SIDE, SIDE], data).unwrap()
}

fn populated_store(dir: &TempDir) -> (Store, Vec<String>) {
    let mut store = Store::open_path(dir.path().join("bench.hxs"), OpenMode::Append, 0).unwrap();
    let keys: Vec<String> = (0..ENTITIES).map(|i| format!("key{}", i)).collect();
    for key in &keys {
        let entity = Entity::builder().field("m", matrix()).build();
        store.add(key, &entity, false).unwrap();
    }
    store.flush().unwrap();
    (store, keys)
}

fn slice_benchmarks(c: &mut Criterion) {
    let window = [32..36, 32..36];

    c.bench_function("eager_field_slice", |b| {
        let field = Field::new(matrix());
        b.iter(|| black_box(field.slice(&window).unwrap()))
    });

    let dir = TempDir::new().unwrap();
    let (mut store, keys) = populated_store(&dir);

    c.bench_function("lazy_field_slice", |b| {
        let mut i = 0;
        b.iter(|| {
            let entity = store.get(&keys[i % keys.len()]).unwrap();
            i += 1;
            black_box(entity["m"].slice(&window).unwrap())
        })
    });

    c.bench_function("lazy_field_value_then_slice", |b| {
        let mut i = 0;
        b.iter(|| {
            let entity = store.get(&keys[i % keys.len()]).unwrap();
            i += 1;
            black_box(entity.get("m").unwrap().slice(&window).unwrap())
        })
    });
}

fn write_benchmarks(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let (mut store, keys) = populated_store(&dir);
    let entity = Entity::builder().field("m", matrix()).build();

    c.bench_function("store_overwrite", |b| {
        let mut i = 0;
        b.iter(|| {
            store.add(&keys[i % keys.len()], &entity, true).unwrap();
            i += 1;
        })
    });
}

criterion_group!(benches, slice_benchmarks, write_benchmarks);
criterion_main!(benches);
