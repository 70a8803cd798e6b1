//! # duckdb-pool
//!
//! Bounded, thread-safe connection pool for embedded DuckDB databases.
//!
//! The pool is generic over a [`ConnectionLifecycle`], which supplies the
//! factory and health-check hooks; [`DuckDbLifecycle`] plugs in DuckDB
//! connections with SQL templating.
//!
//! ## Features
//!
//! - Fixed or growable capacity with fail-fast or bounded-wait acquisition
//! - Scope-bound [`PooledConnection`] guards that always return their connection
//! - Health checks on checkout and return, with automatic replacement
//! - Idle timeout for long-unused connections
//! - Pool status and metrics for observability
//! - Ordered component startup/shutdown and schema migrations
//!
//! ## Example
//!
//! ```rust,ignore
//! use duckdb_client::Config;
//! use duckdb_pool::{create_duckdb_pool, DataTemplate, PoolConfig};
//! use serde_json::json;
//! use std::time::Duration;
//!
//! let pool = create_duckdb_pool(
//!     &Config::new().path("app.duckdb"),
//!     PoolConfig::new()
//!         .initial_connections(4)
//!         .acquire_timeout(Duration::from_secs(3)),
//! )?;
//!
//! // Connection automatically returned to pool on drop
//! let mut conn = pool.acquire()?;
//! conn.execute_batch("create table if not exists message (role varchar, content varchar)");
//! drop(conn);
//!
//! let data = DataTemplate::new(pool.clone());
//! let rows = data.select_many(
//!     "select * from message where role = {{text(role)}}",
//!     &json!({ "role": "human" }),
//! )?;
//!
//! let status = pool.status();
//! println!("Pool utilization: {:.1}%", status.utilization());
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod context;
pub mod data_template;
pub mod duckdb;
pub mod error;
pub mod lifecycle;
pub mod migration;
pub mod pool;
pub mod registry;

// Configuration
pub use config::PoolConfig;

// Error types
pub use error::PoolError;

// Pool types
pub use pool::{Pool, PoolBuilder, PoolMetrics, PoolStatus, PooledConnection};

// Lifecycle management
pub use lifecycle::{
    ConnectionLifecycle, ConnectionMetadata, ConnectionState, DynConnectionLifecycle,
    HealthCheckResult,
};

// DuckDB
pub use self::duckdb::{DuckDbLifecycle, DuckDbPool, create_duckdb_pool, execute_sql};
pub use data_template::{Aggregation, DataError, DataTemplate};
pub use registry::DatabaseRegistry;

// Application components
pub use context::{
    ApplicationContext, ComponentError, HIGH_PRIORITY, HIGHEST_PRIORITY, LOW_PRIORITY,
    LOWEST_PRIORITY, MEDIUM_PRIORITY, ManagedComponent, PoolComponent, STANDARD_PRIORITY,
};
pub use migration::DbMigration;
