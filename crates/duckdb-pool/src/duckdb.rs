//! DuckDB-backed pools.

use std::sync::Arc;

use duckdb_client::{Config as ClientConfig, Connection, ManagedConnection, SqlTemplates};
use parking_lot::Mutex;

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::lifecycle::{ConnectionLifecycle, HealthCheckResult};
use crate::pool::Pool;

/// A pool of [`ManagedConnection`]s to one DuckDB database.
pub type DuckDbPool = Pool<DuckDbLifecycle>;

/// Creates pooled connections by cloning a root connection to one database.
///
/// Every connection shares the same database instance, so data written
/// through one is visible through the others.
pub struct DuckDbLifecycle {
    root: Mutex<Connection>,
    templates: Arc<SqlTemplates>,
    location: String,
}

impl DuckDbLifecycle {
    /// Open the database described by `config`.
    pub fn open(config: &ClientConfig, templates: Arc<SqlTemplates>) -> Result<Self, PoolError> {
        let root = Connection::open(config)?;
        Ok(Self {
            location: root.location().to_string(),
            root: Mutex::new(root),
            templates,
        })
    }

    /// Database location (`:memory:` or the file path).
    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    /// The template environment handed to every connection.
    #[must_use]
    pub fn templates(&self) -> &Arc<SqlTemplates> {
        &self.templates
    }
}

impl ConnectionLifecycle for DuckDbLifecycle {
    type Connection = ManagedConnection;

    fn create(&self) -> Result<ManagedConnection, PoolError> {
        let conn = self
            .root
            .lock()
            .try_clone()
            .map_err(|e| PoolError::Factory(e.to_string()))?;
        Ok(ManagedConnection::new(conn, Arc::clone(&self.templates)))
    }

    fn check(&self, conn: &mut ManagedConnection) -> HealthCheckResult {
        let result = conn.execute("select 1");
        match result.error() {
            None => HealthCheckResult::Healthy,
            Some(err) => HealthCheckResult::Unhealthy(err.to_string()),
        }
    }

    fn describe(&self, conn: &ManagedConnection) -> String {
        format!("{}@{}", conn.id(), self.location)
    }
}

/// Open a DuckDB database and build an initialized pool over it.
///
/// Returned connections are not health checked: an in-process connection
/// stays usable after a failed statement, so `test_on_release` is turned
/// off. Enable `test_on_acquire` to run `select 1` on every checkout.
pub fn create_duckdb_pool(
    config: &ClientConfig,
    pool_config: PoolConfig,
) -> Result<DuckDbPool, PoolError> {
    let lifecycle = DuckDbLifecycle::open(config, Arc::new(SqlTemplates::new()))?;
    tracing::info!(
        location = %lifecycle.location(),
        application = %config.application_name,
        "creating DuckDB connection pool"
    );
    Pool::new(pool_config.test_on_release(false), lifecycle)
}

/// Run a multi-statement SQL script on a pooled connection.
///
/// The connection is returned to the pool afterwards, also when the script
/// fails. A failing script is reported as [`PoolError::Client`].
pub fn execute_sql(pool: &DuckDbPool, sql: &str) -> Result<(), PoolError> {
    let mut conn = pool.acquire()?;
    let result = conn.execute_batch(sql);
    if let Some(err) = result.error() {
        tracing::warn!(error = %err, "SQL script failed");
    }
    result.into_result()?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use duckdb_client::Value;

    fn memory_pool(size: u32) -> DuckDbPool {
        create_duckdb_pool(
            &ClientConfig::new(),
            PoolConfig::new().initial_connections(size),
        )
        .unwrap()
    }

    #[test]
    fn test_connections_share_database() {
        let pool = memory_pool(2);
        execute_sql(&pool, "create table t (id integer); insert into t values (1), (2), (3);")
            .unwrap();

        let mut a = pool.acquire().unwrap();
        let mut b = pool.acquire().unwrap();
        assert_ne!(a.id(), b.id());

        assert_eq!(
            a.execute("select count(*) from t").first_value(),
            Some(&Value::Int(3))
        );
        assert_eq!(
            b.execute("select sum(id) from t").first_value(),
            Some(&Value::Int(6))
        );
    }

    #[test]
    fn test_health_check() {
        let pool = memory_pool(1);
        let mut conn = pool.acquire().unwrap();
        assert!(pool.lifecycle().check(&mut conn).is_healthy());
        assert!(pool.lifecycle().describe(&conn).ends_with("@:memory:"));
    }

    #[test]
    fn test_release_skips_health_check() {
        let pool = memory_pool(1);
        for _ in 0..3 {
            let mut conn = pool.acquire().unwrap();
            assert!(conn.execute("select 1").is_ok());
        }

        let metrics = pool.metrics();
        assert_eq!(metrics.health_checks_performed, 0);
        assert!(!pool.config().test_on_release);
    }

    #[test]
    fn test_aborted_transaction_keeps_connection() {
        let pool = memory_pool(1);
        let id = {
            let mut conn = pool.acquire().unwrap();
            assert!(conn.execute_batch("begin transaction").is_ok());
            assert!(!conn.execute("insert into no_such_table values (1)").is_ok());
            conn.id().to_string()
        };

        let conn = pool.acquire().unwrap();
        assert_eq!(conn.id(), id);
        let metrics = pool.metrics();
        assert_eq!(metrics.connections_replaced, 0);
        assert_eq!(metrics.connections_created, 1);
    }

    #[test]
    fn test_checkout_check_when_enabled() {
        let pool = create_duckdb_pool(
            &ClientConfig::new(),
            PoolConfig::new().initial_connections(1).test_on_acquire(true),
        )
        .unwrap();

        drop(pool.acquire().unwrap());
        drop(pool.acquire().unwrap());
        let metrics = pool.metrics();
        assert_eq!(metrics.health_checks_performed, 2);
        assert_eq!(metrics.health_checks_failed, 0);
    }

    #[test]
    fn test_execute_sql_failure_releases_connection() {
        let pool = memory_pool(1);
        let err = execute_sql(&pool, "select * from no_such_table").unwrap_err();
        assert!(matches!(err, PoolError::Client(_)));
        assert_eq!(pool.status().available, 1);
    }

    #[test]
    fn test_file_backed_pool() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::new().path(dir.path().join("pool.duckdb"));
        let pool = create_duckdb_pool(&config, PoolConfig::new().initial_connections(2)).unwrap();

        execute_sql(&pool, "create table kv (k varchar); insert into kv values ('a');").unwrap();
        let mut conn = pool.acquire().unwrap();
        assert_eq!(
            conn.execute("select k from kv").first_value(),
            Some(&Value::Text("a".into()))
        );
    }
}
