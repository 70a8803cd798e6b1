//! Ordered startup and shutdown of long-lived components.
//!
//! Components are started in ascending [`priority`](ManagedComponent::priority)
//! and stopped in the reverse order, so a component can rely on everything
//! with a lower priority being up while it runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

use crate::error::PoolError;
use crate::lifecycle::ConnectionLifecycle;
use crate::pool::Pool;

/// Lowest priority: started first, stopped last.
pub const LOWEST_PRIORITY: u32 = 0;
/// Low priority.
pub const LOW_PRIORITY: u32 = 1;
/// Default priority for ordinary components.
pub const STANDARD_PRIORITY: u32 = 10;
/// Medium priority.
pub const MEDIUM_PRIORITY: u32 = 100;
/// High priority.
pub const HIGH_PRIORITY: u32 = 1000;
/// Highest priority: started last, stopped first.
pub const HIGHEST_PRIORITY: u32 = u32::MAX;

/// Errors raised while starting or stopping components.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ComponentError {
    /// A component failed to start.
    #[error("failed to start component {name}: {source}")]
    Start {
        /// Component name.
        name: String,
        /// Underlying failure.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// One or more components failed to stop.
    #[error("{failed} component(s) failed to stop")]
    Stop {
        /// Number of failures.
        failed: usize,
    },

    /// Pool error from a pool-backed component.
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// A component with an explicit start/stop lifecycle.
pub trait ManagedComponent: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Start the component.
    fn start(&self) -> Result<(), ComponentError>;

    /// Stop the component.
    fn stop(&self) -> Result<(), ComponentError>;

    /// Startup order; lower starts earlier.
    fn priority(&self) -> u32 {
        STANDARD_PRIORITY
    }

    /// Whether the component is currently running.
    fn is_running(&self) -> bool;
}

/// Owns a set of components and starts and stops them in priority order.
#[derive(Default)]
pub struct ApplicationContext {
    components: Vec<Arc<dyn ManagedComponent>>,
    started: usize,
}

impl ApplicationContext {
    /// Create an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component.
    pub fn manage(&mut self, component: Arc<dyn ManagedComponent>) -> &mut Self {
        self.components.push(component);
        self
    }

    /// Number of registered components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Whether no components are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Start every component in ascending priority.
    ///
    /// Components with equal priority start in registration order. The first
    /// failure aborts startup and is returned; components already started
    /// stay running until [`shutdown`](Self::shutdown).
    pub fn startup(&mut self) -> Result<(), ComponentError> {
        // Stable sort keeps registration order for ties.
        self.components.sort_by_key(|c| c.priority());
        self.started = 0;

        for component in &self.components {
            tracing::info!(
                component = component.name(),
                priority = component.priority(),
                "starting component"
            );
            if let Err(e) = component.start() {
                tracing::error!(component = component.name(), error = %e, "component failed to start");
                return Err(e);
            }
            self.started += 1;
        }

        tracing::info!(components = self.started, "application context started");
        Ok(())
    }

    /// Stop started components in descending priority.
    ///
    /// A failing component does not prevent the rest from stopping; the
    /// number of failures is returned as [`ComponentError::Stop`].
    pub fn shutdown(&mut self) -> Result<(), ComponentError> {
        let mut failed = 0;

        for component in self.components[..self.started].iter().rev() {
            tracing::info!(component = component.name(), "stopping component");
            if let Err(e) = component.stop() {
                failed += 1;
                tracing::warn!(component = component.name(), error = %e, "component failed to stop");
            }
        }
        self.started = 0;

        if failed > 0 {
            return Err(ComponentError::Stop { failed });
        }
        tracing::info!("application context stopped");
        Ok(())
    }
}

impl std::fmt::Debug for ApplicationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.components.iter().map(|c| c.name()).collect();
        f.debug_struct("ApplicationContext")
            .field("components", &names)
            .field("started", &self.started)
            .finish()
    }
}

/// Exposes a [`Pool`] as a component; stopping it closes the pool.
pub struct PoolComponent<M: ConnectionLifecycle> {
    name: String,
    pool: Pool<M>,
    priority: u32,
    running: AtomicBool,
}

impl<M: ConnectionLifecycle> PoolComponent<M> {
    /// Wrap `pool` under `name` with the lowest priority.
    #[must_use]
    pub fn new(name: impl Into<String>, pool: Pool<M>) -> Self {
        Self {
            name: name.into(),
            pool,
            priority: LOWEST_PRIORITY,
            running: AtomicBool::new(false),
        }
    }

    /// Override the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// The wrapped pool.
    #[must_use]
    pub fn pool(&self) -> &Pool<M> {
        &self.pool
    }
}

impl<M: ConnectionLifecycle> ManagedComponent for PoolComponent<M> {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&self) -> Result<(), ComponentError> {
        self.pool.initialize()?;
        self.running.store(true, Ordering::Release);
        Ok(())
    }

    fn stop(&self) -> Result<(), ComponentError> {
        self.pool.close();
        self.running.store(false, Ordering::Release);
        Ok(())
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}
