//! Throughput benchmarks for the cache engine.
//!
//! Run with: cargo bench --bench throughput

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use std::thread;

use talon_cache::Cache;

fn bench_single_thread_baseline(c: &mut Criterion) {
    let mut group = c.benchmark_group("Cache-Baseline");

    for size in [100, 1_000, 10_000] {
        group.throughput(Throughput::Elements(1000));

        group.bench_with_input(BenchmarkId::new("insert", size), &size, |b, &size| {
            let cache: Cache<u64, String> = Cache::builder().max_size(size).build().unwrap();
            let mut i = 0u64;
            b.iter(|| {
                cache.insert(i, format!("value_{i}"));
                i = (i + 1) % (size * 2);
            });
        });

        group.bench_with_input(BenchmarkId::new("get_hit", size), &size, |b, &size| {
            let cache: Cache<u64, String> = Cache::builder().max_size(size).build().unwrap();
            for i in 0..size {
                cache.insert(i, format!("value_{i}"));
            }
            let mut i = 0u64;
            b.iter(|| {
                let _ = black_box(cache.get(&i));
                i = (i + 1) % size;
            });
        });

        group.bench_with_input(BenchmarkId::new("get_miss", size), &size, |b, &size| {
            let cache: Cache<u64, String> = Cache::builder().max_size(size).build().unwrap();
            for i in 0..size {
                cache.insert(i, format!("value_{i}"));
            }
            let miss_key = size + 1_000;
            b.iter(|| {
                let _ = black_box(cache.get(&miss_key));
            });
        });
    }

    group.finish();
}

fn bench_concurrent_mixed(c: &mut Criterion) {
    let mut group = c.benchmark_group("Cache-Concurrent");

    for num_threads in [1, 2, 4, 8] {
        let ops_per_thread = 1_000u64;
        group.throughput(Throughput::Elements(num_threads * ops_per_thread));

        group.bench_with_input(
            BenchmarkId::new("mixed_read_write", num_threads),
            &num_threads,
            |b, &n_threads| {
                b.iter(|| {
                    let cache: Cache<u64, String> =
                        Cache::builder().max_size(1_000).build().unwrap();
                    for i in 0..500 {
                        cache.insert(i, format!("value_{i}"));
                    }

                    let mut handles = vec![];
                    for t in 0..n_threads {
                        let cache = cache.clone();
                        handles.push(thread::spawn(move || {
                            for i in 0..ops_per_thread {
                                let key = t * 1_000 + i;
                                if i % 4 == 0 {
                                    cache.insert(key, format!("v_{key}"));
                                } else {
                                    let _ = cache.get(&(i % 500));
                                }
                            }
                        }));
                    }
                    for h in handles {
                        h.join().unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_contention(c: &mut Criterion) {
    let mut group = c.benchmark_group("Cache-Contention");

    group.bench_function("high_contention_8_threads", |b| {
        b.iter(|| {
            let cache: Cache<u64, String> = Cache::builder().max_size(100).build().unwrap();
            for i in 0..10 {
                cache.insert(i, format!("value_{i}"));
            }

            let mut handles = vec![];
            for _ in 0..8 {
                let cache = cache.clone();
                handles.push(thread::spawn(move || {
                    for i in 0..100u64 {
                        let key = i % 10;
                        let _ = cache.get(&key);
                        cache.insert(key, format!("updated_{key}"));
                    }
                }));
            }
            for h in handles {
                h.join().unwrap();
            }
        });
    });

    group.finish();
}

fn bench_single_flight(c: &mut Criterion) {
    use talon_cache::{Error, FnLoader};

    let mut group = c.benchmark_group("Cache-SingleFlight");

    group.bench_function("get_with_contended", |b| {
        b.iter(|| {
            let cache: Arc<Cache<u64, String>> =
                Arc::new(Cache::builder().max_size(100).build().unwrap());
            let loader = Arc::new(FnLoader(|key: &u64| -> Result<String, Error> {
                Ok(format!("computed-{key}"))
            }));

            let mut handles = vec![];
            for _ in 0..8 {
                let cache = Arc::clone(&cache);
                let loader = Arc::clone(&loader);
                handles.push(thread::spawn(move || {
                    for i in 0..20u64 {
                        let _ = cache.get_with(&(i % 5), loader.as_ref());
                    }
                }));
            }
            for h in handles {
                h.join().unwrap();
            }
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_single_thread_baseline,
    bench_concurrent_mixed,
    bench_contention,
    bench_single_flight,
);

criterion_main!(benches);
