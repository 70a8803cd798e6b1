//! # duckdb-client
//!
//! Embedded DuckDB connection handle with SQL templating.
//!
//! This crate wraps one physical DuckDB connection behind a small API that
//! keeps engine-level statement failures separate from connectivity errors,
//! and adds MiniJinja-based templating for parameterized SQL.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use duckdb_client::{Config, Connection, ManagedConnection, SqlTemplates};
//! use serde_json::json;
//!
//! let conn = Connection::open(&Config::new())?;
//! let mut conn = ManagedConnection::new(conn, Arc::new(SqlTemplates::new()));
//!
//! let result = conn.query(
//!     "select * from message where role = {{ text(role) }}",
//!     &json!({ "role": "human" }),
//! )?;
//! if let Some(err) = result.error() {
//!     eprintln!("statement failed: {err}");
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod error;
pub mod instrumentation;
pub mod managed;
pub mod result;
pub mod template;

pub use config::Config;
pub use connection::Connection;
pub use error::ClientError;
pub use instrumentation::SanitizationConfig;
pub use managed::ManagedConnection;
pub use result::{Column, QueryResult, Row, Value};
pub use template::SqlTemplates;
