//! Benchmarks for the character vault persistence paths
//!
//! Run with: cargo bench -p cccg-core
//!
//! Baselines for:
//! - Sanitizing records before upload
//! - Local save/load through redb
//! - Full coordinator saves against the in-memory cloud

use std::sync::Arc;

use cccg_core::{
    sanitize_for_cloud, MemoryCloud, MemoryStore, PersistenceAdapter, Record, SaveCoordinator,
    SaveKey, Storage,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use tempfile::TempDir;

fn sheet(powers: usize) -> Record {
    let powers: Vec<_> = (0..powers)
        .map(|i| json!({ "name": format!("Power {}", i), "cost": i, "tags": ["melee", "ranged"] }))
        .collect();
    Record::from_value(json!({
        "name": "Nova",
        "stats": { "hp": 30, "sp": 12 },
        "powers": powers,
        "ui": {
            "inputs": { "#augment-search": "visor" },
            "scroll": { "panels": { "#player-tools-drawer .pt-app__viewport": 42 } }
        }
    }))
    .expect("object")
}

// ============================================================================
// Sanitizer Benchmarks
// ============================================================================

fn bench_sanitize(c: &mut Criterion) {
    let mut group = c.benchmark_group("sanitize_for_cloud");
    for size in [0usize, 50, 500] {
        let record = sheet(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &record, |b, record| {
            b.iter(|| black_box(sanitize_for_cloud(record)))
        });
    }
    group.finish();
}

// ============================================================================
// Local Store Benchmarks
// ============================================================================

fn bench_local_roundtrip(c: &mut Criterion) {
    let temp_dir = TempDir::new().unwrap();
    let storage = Storage::new(temp_dir.path().join("bench.redb")).unwrap();
    let adapter = PersistenceAdapter::new(Arc::new(storage), Arc::new(MemoryCloud::new()));
    let key = SaveKey::player("Nova").unwrap();
    let record = sheet(50);

    c.bench_function("redb_save_local", |b| {
        b.iter(|| adapter.save_local(&key, black_box(&record)).unwrap())
    });

    adapter.save_local(&key, &record).unwrap();
    c.bench_function("redb_load_local", |b| {
        b.iter(|| black_box(adapter.load_local(&key).unwrap()))
    });
}

// ============================================================================
// Coordinator Benchmarks
// ============================================================================

fn bench_save_character(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let coordinator = SaveCoordinator::new(
        PersistenceAdapter::new(Arc::new(MemoryStore::new()), Arc::new(MemoryCloud::new())),
        cccg_core::events::event_channel(),
    );
    let key = SaveKey::player("Nova").unwrap();
    let record = sheet(50);

    c.bench_function("save_character_memory_cloud", |b| {
        b.to_async(&rt)
            .iter(|| async { black_box(coordinator.save_character(&key, &record).await.unwrap()) })
    });
}

criterion_group!(
    benches,
    bench_sanitize,
    bench_local_roundtrip,
    bench_save_character,
);
criterion_main!(benches);
