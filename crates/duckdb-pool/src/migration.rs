//! Schema migration component.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::context::{ComponentError, LOW_PRIORITY, ManagedComponent};
use crate::duckdb::{DuckDbPool, execute_sql};

/// Runs a SQL script through a pool when the application starts.
pub struct DbMigration {
    name: String,
    pool: DuckDbPool,
    script: String,
    running: AtomicBool,
}

impl DbMigration {
    /// Create a migration that runs `script` on `pool`.
    #[must_use]
    pub fn new(pool: DuckDbPool, script: impl Into<String>) -> Self {
        Self {
            name: "db-migration".to_string(),
            pool,
            script: script.into(),
            running: AtomicBool::new(false),
        }
    }

    /// Override the component name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl ManagedComponent for DbMigration {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&self) -> Result<(), ComponentError> {
        tracing::info!(migration = %self.name, "running database migration");
        execute_sql(&self.pool, &self.script).map_err(|e| ComponentError::Start {
            name: self.name.clone(),
            source: Box::new(e),
        })?;
        self.running.store(true, Ordering::Release);
        Ok(())
    }

    fn stop(&self) -> Result<(), ComponentError> {
        self.running.store(false, Ordering::Release);
        Ok(())
    }

    fn priority(&self) -> u32 {
        LOW_PRIORITY
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for DbMigration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbMigration")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}
