//! Pool configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::PoolError;

/// Configuration for a connection pool.
///
/// By default the pool is fixed-size (capacity equals
/// `initial_connections`) and `acquire` fails immediately with
/// [`PoolError::Exhausted`] when every connection is checked out. Set
/// [`acquire_timeout`](Self::acquire_timeout) to wait for a release instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Connections created by `initialize`.
    pub initial_connections: u32,

    /// Upper bound on connections; `None` means `initial_connections`.
    pub max_connections: Option<u32>,

    /// How long `acquire` waits for a release. `None` fails fast.
    pub acquire_timeout: Option<Duration>,

    /// Idle connections unused for longer than this are replaced on checkout.
    pub idle_timeout: Duration,

    /// Run the health check on every checkout.
    pub test_on_acquire: bool,

    /// Run the health check when a connection is returned.
    pub test_on_release: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            initial_connections: 5,
            max_connections: None,
            acquire_timeout: None,
            idle_timeout: Duration::from_secs(60 * 60),
            test_on_acquire: false,
            test_on_release: true,
        }
    }
}

impl PoolConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of connections created up front.
    #[must_use]
    pub fn initial_connections(mut self, count: u32) -> Self {
        self.initial_connections = count;
        self
    }

    /// Allow the pool to grow up to `count` connections.
    #[must_use]
    pub fn max_connections(mut self, count: u32) -> Self {
        self.max_connections = Some(count);
        self
    }

    /// Wait up to `timeout` in `acquire` instead of failing fast.
    #[must_use]
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    /// Fail `acquire` immediately when no connection is available.
    #[must_use]
    pub fn fail_fast(mut self) -> Self {
        self.acquire_timeout = None;
        self
    }

    /// Set the idle timeout.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Enable or disable health checks on checkout.
    #[must_use]
    pub fn test_on_acquire(mut self, enabled: bool) -> Self {
        self.test_on_acquire = enabled;
        self
    }

    /// Enable or disable health checks on return.
    #[must_use]
    pub fn test_on_release(mut self, enabled: bool) -> Self {
        self.test_on_release = enabled;
        self
    }

    /// Maximum number of connections that may be checked out at once.
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.max_connections.unwrap_or(self.initial_connections)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.capacity() == 0 {
            return Err(PoolError::Configuration(
                "pool capacity must be greater than 0".into(),
            ));
        }

        if self.initial_connections > self.capacity() {
            return Err(PoolError::Configuration(format!(
                "initial_connections ({}) cannot exceed max_connections ({})",
                self.initial_connections,
                self.capacity()
            )));
        }

        if self.acquire_timeout == Some(Duration::ZERO) {
            return Err(PoolError::Configuration(
                "acquire_timeout must be non-zero; use fail_fast() instead".into(),
            ));
        }

        Ok(())
    }
}
