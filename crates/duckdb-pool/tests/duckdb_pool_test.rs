//! End-to-end tests against real DuckDB databases.

#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Once};
use std::thread;
use std::time::Duration;

use duckdb_client::{Config as ClientConfig, Value};
use duckdb_pool::{
    ApplicationContext, DataTemplate, DatabaseRegistry, DbMigration, PoolComponent, PoolConfig,
    PoolError, create_duckdb_pool,
};
use serde_json::json;

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

const SCHEMA: &str = "create sequence id_sequence start 1; \
    create table message (id integer default nextval('id_sequence'), role varchar not null, content varchar not null);";

#[test]
fn test_concurrent_writers_share_file_database() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let pool = create_duckdb_pool(
        &ClientConfig::new().path(dir.path().join("chat.duckdb")),
        PoolConfig::new()
            .initial_connections(3)
            .acquire_timeout(Duration::from_secs(10)),
    )
    .unwrap();

    let mut context = ApplicationContext::new();
    context
        .manage(Arc::new(PoolComponent::new("chat-db", pool.clone())))
        .manage(Arc::new(DbMigration::new(pool.clone(), SCHEMA)));
    context.startup().unwrap();

    let data = DataTemplate::new(pool.clone());
    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let data = data.clone();
            thread::spawn(move || {
                for i in 0..10 {
                    data.insert_one(
                        "insert into message(role, content) values ({{text(role)}}, {{text(content)}}) returning (id);",
                        &json!({"role": format!("worker-{worker}"), "content": format!("message {i}")}),
                    )
                    .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let counts = data
        .aggregate(
            "select count(*) as total, count(distinct role) as roles from message",
            &json!({}),
        )
        .unwrap();
    assert_eq!(counts[0].get("total"), Some(&Value::Int(40)));
    assert_eq!(counts[0].get("roles"), Some(&Value::Int(4)));
    assert_eq!(pool.status().in_use, 0);

    context.shutdown().unwrap();
    assert!(matches!(pool.acquire(), Err(PoolError::PoolClosed)));
}

#[test]
fn test_exhausted_duckdb_pool_fails_fast() {
    init_tracing();
    let pool = create_duckdb_pool(&ClientConfig::new(), PoolConfig::new().initial_connections(1))
        .unwrap();

    let held = pool.acquire().unwrap();
    let err = pool.acquire().unwrap_err();
    assert!(matches!(err, PoolError::Exhausted { capacity: 1 }));

    drop(held);
    assert!(pool.acquire().is_ok());
}

#[test]
fn test_registry_separates_databases() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let registry = DatabaseRegistry::new();

    let first = registry
        .open(
            "first",
            &ClientConfig::new().path(dir.path().join("first.duckdb")),
            PoolConfig::new().initial_connections(1),
        )
        .unwrap();
    let second = registry
        .open(
            "second",
            &ClientConfig::from_connection_string("database=:memory:;threads=1").unwrap(),
            PoolConfig::new().initial_connections(1),
        )
        .unwrap();

    assert!(first.acquire().unwrap().execute_batch("create table only_here (x integer)").is_ok());
    assert!(!second.acquire().unwrap().execute("select * from only_here").is_ok());

    registry.close_all();
    assert!(first.is_closed() && second.is_closed());
}
