//! Named DuckDB pools shared across an application.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use duckdb_client::Config as ClientConfig;
use parking_lot::{Condvar, Mutex};

use crate::config::PoolConfig;
use crate::duckdb::{DuckDbPool, create_duckdb_pool};
use crate::error::PoolError;

#[derive(Debug, Default)]
struct Registry {
    pools: HashMap<String, DuckDbPool>,
    files: HashMap<PathBuf, DuckDbPool>,
    opening_keys: HashSet<String>,
    opening_files: HashSet<PathBuf>,
}

impl Registry {
    fn open_file(&self, file: Option<&PathBuf>) -> Option<DuckDbPool> {
        file.and_then(|f| self.files.get(f))
            .filter(|pool| !pool.is_closed())
            .cloned()
    }

    fn is_opening(&self, key: &str, file: Option<&PathBuf>) -> bool {
        self.opening_keys.contains(key) || file.is_some_and(|f| self.opening_files.contains(f))
    }
}

/// Keeps one pool per database key and one database per file.
///
/// Keys naming the same database file share a single pool, so every key
/// sees the same data. In-memory databases are private to their key.
/// Construct one at application startup and pass it around by `Arc`.
#[derive(Debug, Default)]
pub struct DatabaseRegistry {
    state: Mutex<Registry>,
    opened: Condvar,
}

/// Identity of a file-backed database, `None` for in-memory ones.
fn database_file(config: &ClientConfig) -> Option<PathBuf> {
    let path = config.path.as_ref()?;
    Some(std::path::absolute(path).unwrap_or_else(|_| path.clone()))
}

impl DatabaseRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the pool registered under `key`, creating it if missing.
    ///
    /// A file already opened under another key is reused and `key` becomes
    /// an alias for its pool; `pool_config` is ignored in that case. The
    /// database is opened without holding the registry lock, and concurrent
    /// callers for the same key or file wait for that open to finish.
    pub fn open(
        &self,
        key: &str,
        client_config: &ClientConfig,
        pool_config: PoolConfig,
    ) -> Result<DuckDbPool, PoolError> {
        let file = database_file(client_config);

        let mut state = self.state.lock();
        loop {
            if let Some(pool) = state.pools.get(key).filter(|pool| !pool.is_closed()) {
                return Ok(pool.clone());
            }
            if let Some(pool) = state.open_file(file.as_ref()) {
                tracing::info!(key, location = %client_config.location(), "sharing database pool");
                state.pools.insert(key.to_string(), pool.clone());
                return Ok(pool);
            }
            if !state.is_opening(key, file.as_ref()) {
                break;
            }
            self.opened.wait(&mut state);
        }

        state.opening_keys.insert(key.to_string());
        if let Some(f) = &file {
            state.opening_files.insert(f.clone());
        }
        drop(state);

        let created = create_duckdb_pool(client_config, pool_config);

        let mut state = self.state.lock();
        state.opening_keys.remove(key);
        if let Some(f) = &file {
            state.opening_files.remove(f);
        }
        if let Ok(pool) = &created {
            state.pools.insert(key.to_string(), pool.clone());
            if let Some(f) = file {
                state.files.insert(f, pool.clone());
            }
            tracing::info!(key, location = %client_config.location(), "registered database pool");
        }
        drop(state);
        self.opened.notify_all();
        created
    }

    /// Get the pool registered under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<DuckDbPool> {
        self.state.lock().pools.get(key).cloned()
    }

    /// Remove and return the pool registered under `key` without closing it.
    ///
    /// Other keys sharing the same database file keep their pool.
    pub fn remove(&self, key: &str) -> Option<DuckDbPool> {
        self.state.lock().pools.remove(key)
    }

    /// Number of registered keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().pools.len()
    }

    /// Whether no pools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().pools.is_empty()
    }

    /// Close every registered pool and clear the registry.
    pub fn close_all(&self) {
        let pools: Vec<_> = {
            let mut state = self.state.lock();
            state.files.clear();
            state.pools.drain().collect()
        };
        for (key, pool) in pools {
            tracing::debug!(key = %key, "closing database pool");
            pool.close();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use duckdb_client::Value;
    use std::sync::Arc;

    #[test]
    fn test_open_reuses_pool() {
        let registry = DatabaseRegistry::new();
        let config = ClientConfig::new();

        let a = registry.open("main", &config, PoolConfig::new().initial_connections(1)).unwrap();
        let mut conn = a.acquire().unwrap();
        assert!(conn.execute_batch("create table t (x integer)").is_ok());
        drop(conn);

        let b = registry.open("main", &config, PoolConfig::new().initial_connections(1)).unwrap();
        let mut conn = b.acquire().unwrap();
        assert!(conn.execute("select * from t").is_ok());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_and_close_all() {
        let registry = DatabaseRegistry::new();
        let config = ClientConfig::new();
        let a = registry.open("a", &config, PoolConfig::new().initial_connections(1)).unwrap();
        registry.open("b", &config, PoolConfig::new().initial_connections(1)).unwrap();

        let removed = registry.remove("b").unwrap();
        assert!(!removed.is_closed());
        assert!(registry.get("b").is_none());

        registry.close_all();
        assert!(registry.is_empty());
        assert!(a.is_closed());
    }

    #[test]
    fn test_concurrent_open_yields_one_pool() {
        let registry = Arc::new(DatabaseRegistry::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    let pool = registry
                        .open("shared", &ClientConfig::new(), PoolConfig::new().initial_connections(1))
                        .unwrap();
                    !pool.is_closed()
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_same_file_shares_database() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::new().path(dir.path().join("shared.duckdb"));
        let registry = DatabaseRegistry::new();

        let a = registry.open("a", &config, PoolConfig::new().initial_connections(1)).unwrap();
        let b = registry.open("b", &config, PoolConfig::new().initial_connections(1)).unwrap();

        let mut conn = a.acquire().unwrap();
        assert!(conn.execute_batch("create table t (x integer); insert into t values (7);").is_ok());
        drop(conn);

        let mut conn = b.acquire().unwrap();
        assert_eq!(conn.execute("select x from t").first_value(), Some(&Value::Int(7)));
        drop(conn);
        assert_eq!(registry.len(), 2);

        registry.close_all();
        assert!(a.is_closed() && b.is_closed());
    }

    #[test]
    fn test_concurrent_open_of_one_file_shares_database() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::new().path(dir.path().join("race.duckdb"));
        let registry = Arc::new(DatabaseRegistry::new());

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let registry = Arc::clone(&registry);
                let config = config.clone();
                std::thread::spawn(move || {
                    registry
                        .open(&format!("key-{i}"), &config, PoolConfig::new().initial_connections(1))
                        .unwrap()
                })
            })
            .collect();
        let pools: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let mut conn = pools[0].acquire().unwrap();
        assert!(conn.execute_batch("create table t (x integer)").is_ok());
        drop(conn);
        for pool in &pools {
            assert!(!pool.is_closed());
            assert!(pool.acquire().unwrap().execute("select * from t").is_ok());
        }
        for pool in &pools {
            assert_eq!(pool.metrics().checkouts_successful, 5);
        }
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn test_memory_databases_stay_per_key() {
        let registry = DatabaseRegistry::new();
        let config = ClientConfig::new();
        let a = registry.open("a", &config, PoolConfig::new().initial_connections(1)).unwrap();
        let b = registry.open("b", &config, PoolConfig::new().initial_connections(1)).unwrap();

        assert!(a.acquire().unwrap().execute_batch("create table t (x integer)").is_ok());
        assert!(!b.acquire().unwrap().execute("select * from t").is_ok());
    }
}
