//! Connection pool implementation.
//!
//! The pool hands out exclusively owned connections wrapped in a
//! [`PooledConnection`] guard and takes them back when the guard is released
//! or dropped. Bookkeeping lives behind one mutex; callers that are allowed
//! to wait park on a condition variable until a connection is returned.

use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::lifecycle::{
    ConnectionLifecycle, ConnectionMetadata, ConnectionState, HealthCheckResult,
};

/// A bounded pool of connections produced by a [`ConnectionLifecycle`].
///
/// At most [`PoolConfig::capacity`] connections exist at any time. When all
/// of them are checked out, [`acquire`](Pool::acquire) either fails
/// immediately with [`PoolError::Exhausted`] or, with an acquire timeout
/// configured, waits for one to be returned.
///
/// `Pool` is cheap to clone; clones share the same connections.
///
/// # Example
///
/// ```rust,ignore
/// use duckdb_pool::{Pool, PoolConfig};
///
/// let pool = Pool::builder()
///     .initial_connections(2)
///     .lifecycle(lifecycle)
///     .build()?;
///
/// let mut conn = pool.acquire()?;
/// conn.execute("select 1");
/// pool.release(conn);
/// ```
pub struct Pool<M: ConnectionLifecycle> {
    inner: Arc<PoolInner<M>>,
}

pub(crate) struct PoolInner<M: ConnectionLifecycle> {
    config: PoolConfig,

    lifecycle: M,

    state: Mutex<PoolState<M::Connection>>,

    /// Signalled whenever a slot is freed or the pool closes.
    available: Condvar,

    closed: AtomicBool,

    next_connection_id: AtomicU64,

    created_at: Instant,

    metrics: Mutex<PoolMetricsInner>,
}

struct IdleConnection<C> {
    conn: C,
    metadata: ConnectionMetadata,
}

struct PoolState<C> {
    idle: VecDeque<IdleConnection<C>>,
    /// Checked-out connections plus slots reserved for a connection being
    /// created.
    in_use: u32,
    waiting: u32,
}

impl<C> PoolState<C> {
    fn total(&self) -> u32 {
        self.idle.len() as u32 + self.in_use
    }
}

/// What a caller got hold of while the state lock was held.
enum Slot<C> {
    Idle(IdleConnection<C>),
    Reserved,
}

#[derive(Debug, Default)]
struct PoolMetricsInner {
    connections_created: u64,
    connections_closed: u64,
    connections_replaced: u64,
    checkouts_successful: u64,
    checkouts_failed: u64,
    exhausted: u64,
    timeouts: u64,
    health_checks_performed: u64,
    health_checks_failed: u64,
}

impl<M: ConnectionLifecycle> Pool<M> {
    /// Create a new pool builder.
    #[must_use]
    pub fn builder() -> PoolBuilder<M> {
        PoolBuilder::new()
    }

    /// Create a pool and open its initial connections.
    ///
    /// Fails if the configuration is invalid or any initial connection cannot
    /// be created.
    pub fn new(config: PoolConfig, lifecycle: M) -> Result<Self, PoolError> {
        config.validate()?;

        let inner = Arc::new(PoolInner {
            config: config.clone(),
            lifecycle,
            state: Mutex::new(PoolState {
                idle: VecDeque::with_capacity(config.capacity() as usize),
                in_use: 0,
                waiting: 0,
            }),
            available: Condvar::new(),
            closed: AtomicBool::new(false),
            next_connection_id: AtomicU64::new(1),
            created_at: Instant::now(),
            metrics: Mutex::new(PoolMetricsInner::default()),
        });

        let pool = Self { inner };
        pool.initialize()?;

        tracing::info!(
            initial = config.initial_connections,
            max = config.capacity(),
            fail_fast = config.acquire_timeout.is_none(),
            "connection pool created"
        );

        Ok(pool)
    }

    /// Top the idle set up to `initial_connections`.
    ///
    /// Never creates more connections than the pool's capacity allows. The
    /// first factory failure is returned; connections created before it stay
    /// in the pool.
    pub fn initialize(&self) -> Result<(), PoolError> {
        let target = self.inner.config.initial_connections;

        loop {
            {
                let mut state = self.inner.state.lock();
                if self.is_closed() {
                    return Err(PoolError::PoolClosed);
                }
                if state.idle.len() as u32 >= target
                    || state.total() >= self.inner.config.capacity()
                {
                    return Ok(());
                }
                state.in_use += 1;
            }

            match self.inner.open_connection() {
                Ok(idle) => self.inner.push_idle(idle),
                Err(e) => {
                    self.inner.free_slot();
                    tracing::warn!(error = %e, "failed to create initial connection");
                    return Err(e);
                }
            }
        }
    }

    /// Check out a connection.
    ///
    /// Reuses an idle connection, or creates one while the pool is below
    /// capacity. Otherwise fails with [`PoolError::Exhausted`], or waits up
    /// to the configured acquire timeout and fails with
    /// [`PoolError::Timeout`].
    pub fn acquire(&self) -> Result<PooledConnection<M>, PoolError> {
        match self.inner.config.acquire_timeout {
            Some(timeout) => self.acquire_timeout(timeout),
            None => self.try_acquire()?.ok_or_else(|| {
                self.inner.metrics.lock().exhausted += 1;
                self.inner.record_checkout_failure();
                tracing::debug!(
                    capacity = self.inner.config.capacity(),
                    "connection pool exhausted"
                );
                PoolError::Exhausted {
                    capacity: self.inner.config.capacity(),
                }
            }),
        }
    }

    /// Check out a connection, waiting at most `timeout` for one to be
    /// returned.
    pub fn acquire_timeout(&self, timeout: Duration) -> Result<PooledConnection<M>, PoolError> {
        match self.inner.take_slot(Some(timeout)) {
            Ok(Some(slot)) => self.inner.checkout(slot),
            // A wait never yields an empty slot; it times out instead.
            Ok(None) => Err(PoolError::Timeout { waited: timeout }),
            Err(e) => {
                if matches!(e, PoolError::Timeout { .. }) {
                    self.inner.metrics.lock().timeouts += 1;
                }
                self.inner.record_checkout_failure();
                Err(e)
            }
        }
    }

    /// Check out a connection without waiting.
    ///
    /// Returns `Ok(None)` when every connection is in use and the pool is at
    /// capacity.
    pub fn try_acquire(&self) -> Result<Option<PooledConnection<M>>, PoolError> {
        match self.inner.take_slot(None) {
            Ok(Some(slot)) => self.inner.checkout(slot).map(Some),
            Ok(None) => Ok(None),
            Err(e) => {
                self.inner.record_checkout_failure();
                Err(e)
            }
        }
    }

    /// Return a connection to the pool.
    ///
    /// Equivalent to dropping the guard.
    pub fn release(&self, conn: PooledConnection<M>) {
        if !Arc::ptr_eq(&self.inner, &conn.pool) {
            tracing::warn!(
                connection_id = conn.metadata.id,
                "connection released to a pool that does not own it"
            );
        }
        drop(conn);
    }

    /// Get the current pool status.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let state = self.inner.state.lock();
        PoolStatus {
            available: state.idle.len() as u32,
            in_use: state.in_use,
            total: state.total(),
            max: self.inner.config.capacity(),
            waiting: state.waiting,
        }
    }

    /// Get pool metrics.
    #[must_use]
    pub fn metrics(&self) -> PoolMetrics {
        let inner = self.inner.metrics.lock();
        PoolMetrics {
            connections_created: inner.connections_created,
            connections_closed: inner.connections_closed,
            connections_replaced: inner.connections_replaced,
            checkouts_successful: inner.checkouts_successful,
            checkouts_failed: inner.checkouts_failed,
            exhausted: inner.exhausted,
            timeouts: inner.timeouts,
            health_checks_performed: inner.health_checks_performed,
            health_checks_failed: inner.health_checks_failed,
            uptime: self.inner.created_at.elapsed(),
        }
    }

    /// Close the pool.
    ///
    /// Idle connections are dropped immediately, waiters fail with
    /// [`PoolError::PoolClosed`], and checked-out connections are dropped
    /// when their guards are released.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let drained: Vec<_> = self.inner.state.lock().idle.drain(..).collect();
        self.inner.available.notify_all();

        let count = drained.len() as u64;
        drop(drained);
        self.inner.metrics.lock().connections_closed += count;

        tracing::info!(closed_idle = count, "connection pool closed");
    }

    /// Check if the pool is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Get the pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// The lifecycle this pool creates connections through.
    #[must_use]
    pub fn lifecycle(&self) -> &M {
        &self.inner.lifecycle
    }
}

impl<M: ConnectionLifecycle> Clone for Pool<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: ConnectionLifecycle> fmt::Debug for Pool<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("status", &self.status())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<M: ConnectionLifecycle> PoolInner<M> {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Take an idle connection or reserve a slot for a new one.
    ///
    /// With `wait == None` this never blocks and returns `Ok(None)` when the
    /// pool is exhausted.
    fn take_slot(&self, wait: Option<Duration>) -> Result<Option<Slot<M::Connection>>, PoolError> {
        let start = Instant::now();
        let deadline = wait.map(|w| start + w);
        let capacity = self.config.capacity();

        let mut state = self.state.lock();
        loop {
            if self.is_closed() {
                return Err(PoolError::PoolClosed);
            }

            if let Some(idle) = state.idle.pop_front() {
                state.in_use += 1;
                return Ok(Some(Slot::Idle(idle)));
            }

            if state.total() < capacity {
                state.in_use += 1;
                return Ok(Some(Slot::Reserved));
            }

            let Some(deadline) = deadline else {
                return Ok(None);
            };
            if Instant::now() >= deadline {
                tracing::debug!(
                    waited_ms = start.elapsed().as_millis() as u64,
                    "timed out waiting for a connection"
                );
                return Err(PoolError::Timeout {
                    waited: start.elapsed(),
                });
            }

            state.waiting += 1;
            self.available.wait_until(&mut state, deadline);
            state.waiting -= 1;
        }
    }

    /// Turn a slot into a handed-out connection, replacing stale or
    /// unhealthy idle connections.
    fn checkout(self: &Arc<Self>, slot: Slot<M::Connection>) -> Result<PooledConnection<M>, PoolError> {
        let idle = match slot {
            Slot::Idle(mut idle) => {
                if let Some(reason) = self.reject_reason(&mut idle) {
                    tracing::debug!(
                        connection_id = idle.metadata.id,
                        reason = %reason,
                        "replacing idle connection"
                    );
                    self.discard(idle);
                    let fresh = self.open_or_free()?;
                    self.metrics.lock().connections_replaced += 1;
                    fresh
                } else {
                    idle
                }
            }
            Slot::Reserved => self.open_or_free()?,
        };

        let IdleConnection { conn, mut metadata } = idle;
        metadata.mark_in_use();
        self.metrics.lock().checkouts_successful += 1;

        tracing::debug!(
            connection_id = metadata.id,
            connection = %self.lifecycle.describe(&conn),
            "connection acquired"
        );

        Ok(PooledConnection {
            conn: Some(conn),
            metadata,
            pool: Arc::clone(self),
        })
    }

    fn reject_reason(&self, idle: &mut IdleConnection<M::Connection>) -> Option<String> {
        if idle.metadata.idle_time() > self.config.idle_timeout {
            return Some("idle timeout exceeded".into());
        }
        if self.config.test_on_acquire {
            if let Err(reason) = self.health_check(&mut idle.conn) {
                return Some(reason);
            }
        }
        None
    }

    fn health_check(&self, conn: &mut M::Connection) -> Result<(), String> {
        let result = self.lifecycle.check(conn);
        let mut metrics = self.metrics.lock();
        metrics.health_checks_performed += 1;
        match result {
            HealthCheckResult::Healthy => Ok(()),
            HealthCheckResult::Unhealthy(reason) => {
                metrics.health_checks_failed += 1;
                Err(reason)
            }
        }
    }

    fn open_connection(&self) -> Result<IdleConnection<M::Connection>, PoolError> {
        let conn = self.lifecycle.create()?;
        let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let metadata = ConnectionMetadata::new(id);
        self.metrics.lock().connections_created += 1;

        tracing::debug!(
            connection_id = metadata.id,
            connection = %self.lifecycle.describe(&conn),
            "connection created"
        );
        Ok(IdleConnection { conn, metadata })
    }

    /// Create a connection for an already reserved slot, freeing the slot if
    /// creation fails.
    fn open_or_free(&self) -> Result<IdleConnection<M::Connection>, PoolError> {
        self.open_connection().map_err(|e| {
            self.free_slot();
            self.record_checkout_failure();
            tracing::warn!(error = %e, "failed to create connection");
            e
        })
    }

    fn discard(&self, mut idle: IdleConnection<M::Connection>) {
        idle.metadata.state = ConnectionState::Closed;
        drop(idle);
        self.metrics.lock().connections_closed += 1;
    }

    /// Put a connection back in the idle set and free its slot.
    fn push_idle(&self, mut idle: IdleConnection<M::Connection>) {
        idle.metadata.mark_idle();
        let rejected = {
            let mut state = self.state.lock();
            state.in_use = state.in_use.saturating_sub(1);
            if self.is_closed() {
                Some(idle)
            } else {
                state.idle.push_back(idle);
                None
            }
        };
        self.available.notify_one();

        if let Some(idle) = rejected {
            tracing::trace!(connection_id = idle.metadata.id, "pool closed, dropping connection");
            self.discard(idle);
        }
    }

    /// Release a slot without returning a connection to it.
    fn free_slot(&self) {
        {
            let mut state = self.state.lock();
            state.in_use = state.in_use.saturating_sub(1);
        }
        self.available.notify_one();
    }

    fn record_checkout_failure(&self) {
        self.metrics.lock().checkouts_failed += 1;
    }

    /// Take back a connection from a guard.
    fn reclaim(&self, mut conn: M::Connection, metadata: ConnectionMetadata) {
        if self.is_closed() {
            self.free_slot();
            self.discard(IdleConnection { conn, metadata });
            return;
        }

        if self.config.test_on_release {
            if let Err(reason) = self.health_check(&mut conn) {
                tracing::warn!(
                    connection_id = metadata.id,
                    reason = %reason,
                    "returned connection failed health check, replacing"
                );
                self.discard(IdleConnection { conn, metadata });
                match self.open_connection() {
                    Ok(fresh) => {
                        self.metrics.lock().connections_replaced += 1;
                        self.push_idle(fresh);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to replace connection");
                        self.free_slot();
                    }
                }
                return;
            }
        }

        tracing::debug!(connection_id = metadata.id, "connection released");
        self.push_idle(IdleConnection { conn, metadata });
    }
}

/// Builder for creating a connection pool.
///
/// # Example
///
/// ```rust,ignore
/// let pool = Pool::builder()
///     .initial_connections(4)
///     .acquire_timeout(Duration::from_secs(3))
///     .lifecycle(lifecycle)
///     .build()?;
/// ```
pub struct PoolBuilder<M: ConnectionLifecycle> {
    pool_config: PoolConfig,
    lifecycle: Option<M>,
}

impl<M: ConnectionLifecycle> PoolBuilder<M> {
    /// Create a new pool builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pool_config: PoolConfig::default(),
            lifecycle: None,
        }
    }

    /// Set the pool configuration.
    #[must_use]
    pub fn pool_config(mut self, config: PoolConfig) -> Self {
        self.pool_config = config;
        self
    }

    /// Set the connection lifecycle.
    #[must_use]
    pub fn lifecycle(mut self, lifecycle: M) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    /// Set the number of connections created up front.
    #[must_use]
    pub fn initial_connections(mut self, count: u32) -> Self {
        self.pool_config.initial_connections = count;
        self
    }

    /// Set the maximum number of connections.
    #[must_use]
    pub fn max_connections(mut self, count: u32) -> Self {
        self.pool_config.max_connections = Some(count);
        self
    }

    /// Wait up to `timeout` when the pool is exhausted.
    #[must_use]
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.pool_config.acquire_timeout = Some(timeout);
        self
    }

    /// Set the idle connection timeout.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_config.idle_timeout = timeout;
        self
    }

    /// Enable or disable health checks on checkout.
    #[must_use]
    pub fn test_on_acquire(mut self, enabled: bool) -> Self {
        self.pool_config.test_on_acquire = enabled;
        self
    }

    /// Enable or disable health checks on return.
    #[must_use]
    pub fn test_on_release(mut self, enabled: bool) -> Self {
        self.pool_config.test_on_release = enabled;
        self
    }

    /// Build the pool.
    pub fn build(self) -> Result<Pool<M>, PoolError> {
        let lifecycle = self.lifecycle.ok_or_else(|| {
            PoolError::Configuration("no connection lifecycle configured".into())
        })?;
        Pool::new(self.pool_config, lifecycle)
    }
}

impl<M: ConnectionLifecycle> Default for PoolBuilder<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// Status information about the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Number of idle connections available.
    pub available: u32,
    /// Number of connections currently in use.
    pub in_use: u32,
    /// Total number of connections.
    pub total: u32,
    /// Maximum allowed connections.
    pub max: u32,
    /// Callers currently blocked in `acquire`.
    pub waiting: u32,
}

impl PoolStatus {
    /// Calculate the utilization percentage.
    #[must_use]
    pub fn utilization(&self) -> f64 {
        if self.max == 0 {
            return 0.0;
        }
        (self.in_use as f64 / self.max as f64) * 100.0
    }

    /// Check if the pool is at capacity.
    #[must_use]
    pub fn is_at_capacity(&self) -> bool {
        self.total >= self.max
    }
}

/// Metrics collected from the pool.
#[derive(Debug, Clone)]
pub struct PoolMetrics {
    /// Total connections created since pool start.
    pub connections_created: u64,
    /// Total connections closed since pool start.
    pub connections_closed: u64,
    /// Connections discarded and recreated after failing a check or going
    /// stale.
    pub connections_replaced: u64,
    /// Successful connection checkouts.
    pub checkouts_successful: u64,
    /// Failed connection checkouts (exhaustion, timeouts, pool closed, etc.).
    pub checkouts_failed: u64,
    /// Fail-fast acquires rejected because the pool was exhausted.
    pub exhausted: u64,
    /// Acquires that gave up waiting.
    pub timeouts: u64,
    /// Health checks performed.
    pub health_checks_performed: u64,
    /// Health checks that failed.
    pub health_checks_failed: u64,
    /// Time since pool creation.
    pub uptime: Duration,
}

impl PoolMetrics {
    /// Calculate checkout success rate (0.0 to 1.0).
    #[must_use]
    pub fn checkout_success_rate(&self) -> f64 {
        let total = self.checkouts_successful + self.checkouts_failed;
        if total == 0 {
            return 1.0;
        }
        self.checkouts_successful as f64 / total as f64
    }

    /// Calculate health check success rate (0.0 to 1.0).
    #[must_use]
    pub fn health_check_success_rate(&self) -> f64 {
        if self.health_checks_performed == 0 {
            return 1.0;
        }
        let successful = self.health_checks_performed - self.health_checks_failed;
        successful as f64 / self.health_checks_performed as f64
    }
}

/// A connection checked out of the pool.
///
/// Dereferences to the underlying connection. When dropped, the connection is
/// returned to the pool. Use [`detach()`](PooledConnection::detach) to take
/// it out of the pool for good.
pub struct PooledConnection<M: ConnectionLifecycle> {
    /// Only `None` after `detach` or while dropping.
    conn: Option<M::Connection>,
    metadata: ConnectionMetadata,
    pool: Arc<PoolInner<M>>,
}

impl<M: ConnectionLifecycle> PooledConnection<M> {
    /// Get the connection metadata.
    #[must_use]
    pub fn metadata(&self) -> &ConnectionMetadata {
        &self.metadata
    }

    /// Detach the connection from the pool.
    ///
    /// The connection is not returned to the pool; its slot is freed so the
    /// pool may create a replacement later. Returns `None` only if the
    /// connection has already left the guard.
    #[must_use]
    pub fn detach(mut self) -> Option<M::Connection> {
        let Some(conn) = self.conn.take() else {
            tracing::trace!(connection_id = self.metadata.id, "guard already empty");
            return None;
        };
        self.metadata.state = ConnectionState::Closed;
        self.pool.free_slot();

        tracing::debug!(connection_id = self.metadata.id, "connection detached from pool");
        Some(conn)
    }
}

impl<M: ConnectionLifecycle> Deref for PooledConnection<M> {
    type Target = M::Connection;

    fn deref(&self) -> &Self::Target {
        match &self.conn {
            Some(conn) => conn,
            None => unreachable!("pooled connection already taken"),
        }
    }
}

impl<M: ConnectionLifecycle> DerefMut for PooledConnection<M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.conn {
            Some(conn) => conn,
            None => unreachable!("pooled connection already taken"),
        }
    }
}

impl<M: ConnectionLifecycle> fmt::Debug for PooledConnection<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

impl<M: ConnectionLifecycle> Drop for PooledConnection<M> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            tracing::trace!(
                connection_id = self.metadata.id,
                "returning connection to pool"
            );
            self.pool.reclaim(conn, self.metadata.clone());
        }
    }
}
