//! Client error types.

use thiserror::Error;

/// Errors raised while opening, templating, or querying a connection.
///
/// Engine-level failures of a single statement are not reported through this
/// type by [`Connection::query`](crate::Connection::query); they travel inside
/// the returned [`QueryResult`](crate::QueryResult). Use
/// [`QueryResult::into_result`](crate::QueryResult::into_result) to turn such a
/// result into [`ClientError::Query`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// Error reported by the DuckDB engine while opening or cloning a connection.
    #[error("database error: {0}")]
    Database(#[from] duckdb::Error),

    /// SQL template could not be parsed or rendered.
    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),

    /// A statement failed inside the engine.
    #[error("query failed: {0}")]
    Query(String),

    /// Invalid client configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
