// Probstat
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Throughput benchmarks for the sketches and the engine hot path

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use probstat_core::sketches::PersistentSketch;
use probstat_core::{CountMinSketch, Dimension, EngineConfig, HashFamily, HyperLogLog, StatsEngine, TopK};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn create_benchmark_keys(count: usize) -> Vec<Vec<u8>> {
    (0..count).map(|i| format!("profile{}", i).into_bytes()).collect()
}

fn bench_sketch_add(c: &mut Criterion) {
    let keys = create_benchmark_keys(10_000);
    let mut group = c.benchmark_group("sketch_add");
    group.throughput(Throughput::Elements(keys.len() as u64));

    group.bench_function("hyperloglog", |b| {
        let mut hll = HyperLogLog::new(0.02, HashFamily::default()).unwrap();
        b.iter(|| {
            for key in &keys {
                hll.add(black_box(key));
            }
        })
    });

    group.bench_function("count_min", |b| {
        let mut cms = CountMinSketch::new(0.001, 0.01, HashFamily::default()).unwrap();
        b.iter(|| {
            for key in &keys {
                cms.add(black_box(key));
            }
        })
    });

    for k in [5, 50] {
        group.bench_with_input(BenchmarkId::new("top_k", k), &k, |b, &k| {
            let mut top = TopK::new(k, 0.001, 0.01, HashFamily::default()).unwrap();
            b.iter(|| {
                for key in &keys {
                    top.add(black_box(key));
                }
            })
        });
    }

    group.finish();
}

fn bench_engine_collect(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_collect");
    group.measurement_time(Duration::from_secs(5));

    let entities: Vec<String> = (0..1_000).map(|i| format!("profile{}", i)).collect();
    group.throughput(Throughput::Elements(entities.len() as u64));

    group.bench_function("single_thread", |b| {
        let engine = StatsEngine::new(EngineConfig::default()).unwrap();
        b.iter(|| {
            for entity in &entities {
                engine.collect(black_box(entity), "social", "fun_blackfriday");
            }
        })
    });

    for threads in [2, 4] {
        group.bench_with_input(BenchmarkId::new("contended", threads), &threads, |b, &threads| {
            let engine = Arc::new(StatsEngine::new(EngineConfig::default()).unwrap());
            b.iter(|| {
                let handles: Vec<_> = (0..threads)
                    .map(|_| {
                        let engine = Arc::clone(&engine);
                        let entities = entities.clone();
                        thread::spawn(move || {
                            for entity in &entities {
                                engine.collect(entity, "social", "fun_blackfriday");
                            }
                        })
                    })
                    .collect();
                for handle in handles {
                    handle.join().unwrap();
                }
            })
        });
    }

    group.finish();
}

fn bench_queries(c: &mut Criterion) {
    let engine = StatsEngine::new(EngineConfig::default()).unwrap();
    for i in 0..100_000 {
        engine.collect(&format!("profile{}", i % 5_000), if i % 3 == 0 { "social" } else { "fb" }, "fun_new");
    }

    let mut group = c.benchmark_group("engine_queries");
    group.bench_function("count", |b| b.iter(|| engine.count(black_box("social"))));
    group.bench_function("count_unique_entities", |b| b.iter(|| engine.count_unique_entities()));
    group.bench_function("top", |b| b.iter(|| engine.top(black_box(Dimension::Entity))));
    group.bench_function("snapshot", |b| b.iter(|| engine.snapshot().unwrap()));
    group.finish();
}

fn bench_serialization(c: &mut Criterion) {
    let mut cms = CountMinSketch::new(0.001, 0.01, HashFamily::default()).unwrap();
    for key in create_benchmark_keys(10_000) {
        cms.add(&key);
    }
    let bytes = cms.to_bytes().unwrap();

    let mut group = c.benchmark_group("count_min_serialization");
    group.throughput(Throughput::Bytes(bytes.len() as u64));
    group.bench_function("encode", |b| b.iter(|| cms.to_bytes().unwrap()));
    group.bench_function("decode", |b| b.iter(|| CountMinSketch::from_bytes(black_box(&bytes)).unwrap()));
    group.finish();
}

criterion_group!(benches, bench_sketch_add, bench_engine_collect, bench_queries, bench_serialization);
criterion_main!(benches);
