//! Connection wrapper that renders SQL templates.

use std::sync::Arc;
use std::time::Instant;

use crate::connection::Connection;
use crate::error::Result;
use crate::result::QueryResult;
use crate::template::SqlTemplates;

/// A [`Connection`] paired with the shared template environment.
///
/// This is the unit a pool hands out: callers pass a SQL template and a JSON
/// context, the connection renders and executes it.
#[derive(Debug)]
pub struct ManagedConnection {
    conn: Connection,
    templates: Arc<SqlTemplates>,
    last_active: Instant,
}

impl ManagedConnection {
    /// Wrap `conn`, rendering through `templates`.
    #[must_use]
    pub fn new(conn: Connection, templates: Arc<SqlTemplates>) -> Self {
        Self {
            conn,
            templates,
            last_active: Instant::now(),
        }
    }

    /// Unique identifier of the underlying connection.
    #[must_use]
    pub fn id(&self) -> &str {
        self.conn.id()
    }

    /// Render `template` against `context` and execute the statement.
    ///
    /// A template that fails to render is an `Err`; a statement that fails in
    /// the engine is an `Ok` result carrying the error.
    pub fn query(&mut self, template: &str, context: &serde_json::Value) -> Result<QueryResult> {
        let sql = self.templates.render(template, context)?;
        Ok(self.execute(&sql))
    }

    /// Execute an already rendered statement.
    pub fn execute(&mut self, sql: &str) -> QueryResult {
        self.touch();
        self.conn.query(sql)
    }

    /// Execute an already rendered multi-statement script.
    pub fn execute_batch(&mut self, sql: &str) -> QueryResult {
        self.touch();
        self.conn.execute_batch(sql)
    }

    /// When this connection last ran a statement.
    #[must_use]
    pub fn last_active(&self) -> Instant {
        self.last_active
    }

    /// Mark the connection as active now.
    pub fn touch(&mut self) {
        self.last_active = Instant::now();
    }

    /// The template environment this connection renders through.
    #[must_use]
    pub fn templates(&self) -> &Arc<SqlTemplates> {
        &self.templates
    }

    /// Borrow the underlying connection.
    #[must_use]
    pub fn inner(&self) -> &Connection {
        &self.conn
    }

    /// Mutably borrow the underlying connection.
    pub fn inner_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Unwrap into the underlying connection.
    #[must_use]
    pub fn into_inner(self) -> Connection {
        self.conn
    }
}
