//! Benchmarks for the pool checkout path.
//!
//! Run with: cargo bench --package duckdb-pool

#![allow(missing_docs, clippy::unwrap_used)]

use std::hint::black_box;
use std::sync::Arc;
use std::thread;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use duckdb_client::Config as ClientConfig;
use duckdb_pool::{ConnectionLifecycle, Pool, PoolConfig, PoolError, create_duckdb_pool};

struct Noop;

impl ConnectionLifecycle for Noop {
    type Connection = u64;

    fn create(&self) -> Result<u64, PoolError> {
        Ok(0)
    }
}

fn bench_acquire_release(c: &mut Criterion) {
    let mut group = c.benchmark_group("acquire_release");
    group.throughput(Throughput::Elements(1));

    group.bench_function("noop_lifecycle", |b| {
        let pool = Pool::new(
            PoolConfig::new().initial_connections(4).test_on_release(false),
            Noop,
        )
        .unwrap();
        b.iter(|| {
            let conn = pool.acquire().unwrap();
            black_box(*conn);
        });
    });

    group.bench_function("with_health_check", |b| {
        let pool = Pool::new(PoolConfig::new().initial_connections(4), Noop).unwrap();
        b.iter(|| {
            let conn = pool.acquire().unwrap();
            black_box(*conn);
        });
    });

    group.bench_function("try_acquire", |b| {
        let pool = Pool::new(PoolConfig::new().initial_connections(4), Noop).unwrap();
        b.iter(|| black_box(pool.try_acquire().unwrap().is_some()));
    });

    group.finish();
}

fn bench_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended_checkout");

    for threads in [2usize, 4, 8] {
        group.throughput(Throughput::Elements((threads * 100) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            let pool = Arc::new(
                Pool::new(
                    PoolConfig::new()
                        .initial_connections(2)
                        .acquire_timeout(std::time::Duration::from_secs(5)),
                    Noop,
                )
                .unwrap(),
            );
            b.iter(|| {
                let handles: Vec<_> = (0..threads)
                    .map(|_| {
                        let pool = Arc::clone(&pool);
                        thread::spawn(move || {
                            for _ in 0..100 {
                                black_box(*pool.acquire().unwrap());
                            }
                        })
                    })
                    .collect();
                for handle in handles {
                    handle.join().unwrap();
                }
            });
        });
    }

    group.finish();
}

fn bench_duckdb_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("duckdb");
    let pool = create_duckdb_pool(&ClientConfig::new(), PoolConfig::new().initial_connections(2))
        .unwrap();

    group.bench_function("select_1", |b| {
        b.iter(|| {
            let mut conn = pool.acquire().unwrap();
            black_box(conn.execute("select 1").row_count());
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_acquire_release,
    bench_contended,
    bench_duckdb_query
);
criterion_main!(benches);
