//! Connection lifecycle hooks and per-connection metadata.

use std::sync::Arc;
use std::time::Instant;

use crate::error::PoolError;

/// Factory and health hooks a [`Pool`](crate::Pool) uses to manage its
/// connections.
///
/// The pool never constructs or inspects connections itself; it asks the
/// lifecycle to `create` one when it needs to grow or replace a slot, and to
/// `check` one when health testing is enabled.
pub trait ConnectionLifecycle: Send + Sync + 'static {
    /// The connection type handed out by the pool.
    type Connection: Send + 'static;

    /// Create a new connection.
    fn create(&self) -> Result<Self::Connection, PoolError>;

    /// Check whether a connection is still usable.
    ///
    /// The default treats every connection as healthy.
    fn check(&self, conn: &mut Self::Connection) -> HealthCheckResult {
        let _ = conn;
        HealthCheckResult::Healthy
    }

    /// Short description of a connection for log output.
    fn describe(&self, conn: &Self::Connection) -> String {
        let _ = conn;
        std::any::type_name::<Self::Connection>().to_string()
    }
}

impl<L: ConnectionLifecycle + ?Sized> ConnectionLifecycle for Arc<L> {
    type Connection = L::Connection;

    fn create(&self) -> Result<Self::Connection, PoolError> {
        (**self).create()
    }

    fn check(&self, conn: &mut Self::Connection) -> HealthCheckResult {
        (**self).check(conn)
    }

    fn describe(&self, conn: &Self::Connection) -> String {
        (**self).describe(conn)
    }
}

/// Type-erased lifecycle for pools whose factory is chosen at runtime.
pub type DynConnectionLifecycle<C> = Arc<dyn ConnectionLifecycle<Connection = C>>;

/// Outcome of a connection health check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthCheckResult {
    /// The connection can be reused.
    Healthy,
    /// The connection must be discarded.
    Unhealthy(String),
}

impl HealthCheckResult {
    /// Whether the check passed.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

/// Where a pooled connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Available for checkout.
    Idle,
    /// Checked out by a caller.
    InUse,
    /// Discarded or detached; never returns to the pool.
    Closed,
}

/// Bookkeeping the pool keeps for every connection it owns.
#[derive(Debug, Clone)]
pub struct ConnectionMetadata {
    /// Pool-assigned identifier, unique within one pool.
    pub id: u64,
    /// When the connection was created.
    pub created_at: Instant,
    /// When the connection was last checked out or returned.
    pub last_used_at: Instant,
    /// Current state.
    pub state: ConnectionState,
    /// Number of times the connection has been checked out.
    pub checkouts: u64,
}

impl ConnectionMetadata {
    /// Metadata for a freshly created idle connection.
    #[must_use]
    pub fn new(id: u64) -> Self {
        let now = Instant::now();
        Self {
            id,
            created_at: now,
            last_used_at: now,
            state: ConnectionState::Idle,
            checkouts: 0,
        }
    }

    /// Time since the connection was created.
    #[must_use]
    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }

    /// Time since the connection was last used.
    #[must_use]
    pub fn idle_time(&self) -> std::time::Duration {
        self.last_used_at.elapsed()
    }

    pub(crate) fn mark_in_use(&mut self) {
        self.state = ConnectionState::InUse;
        self.last_used_at = Instant::now();
        self.checkouts += 1;
    }

    pub(crate) fn mark_idle(&mut self) {
        self.state = ConnectionState::Idle;
        self.last_used_at = Instant::now();
    }
}
