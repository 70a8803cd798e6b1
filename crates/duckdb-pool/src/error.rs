//! Pool error types.

use std::time::Duration;

use duckdb_client::ClientError;
use thiserror::Error;

/// Errors raised by pool operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PoolError {
    /// Every connection is checked out and the pool may not grow.
    #[error("connection pool exhausted: all {capacity} connections are in use")]
    Exhausted {
        /// Pool capacity.
        capacity: u32,
    },

    /// No connection was released within the acquire timeout.
    #[error("timed out after {waited:?} waiting for a pooled connection")]
    Timeout {
        /// How long the caller waited.
        waited: Duration,
    },

    /// The pool has been closed.
    #[error("connection pool is closed")]
    PoolClosed,

    /// The factory hook could not produce a connection.
    #[error("failed to create connection: {0}")]
    Factory(String),

    /// Invalid pool configuration.
    #[error("invalid pool configuration: {0}")]
    Configuration(String),

    /// Error from the underlying client.
    #[error(transparent)]
    Client(#[from] ClientError),
}

impl PoolError {
    /// Whether the error means "no capacity right now" rather than a failure.
    ///
    /// Callers may retry these later.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. } | Self::Timeout { .. })
    }
}
