//! Physical DuckDB connection.

use std::fmt;
use std::time::Instant;

use duckdb::types::ValueRef;
use uuid::Uuid;

use crate::config::Config;
use crate::error::Result;
use crate::instrumentation::{SanitizationConfig, TRACE_TARGET, extract_operation};
use crate::result::{Column, QueryResult, Row, Value};

/// One live handle to an embedded DuckDB database.
///
/// The handle is exclusively owned and is not meant to be shared between
/// threads while a statement runs; pools hand it to one caller at a time.
pub struct Connection {
    id: String,
    location: String,
    inner: duckdb::Connection,
    sanitization: SanitizationConfig,
}

impl Connection {
    /// Open the database described by `config` and connect to it.
    pub fn open(config: &Config) -> Result<Self> {
        let flags = config.to_duckdb_config()?;
        let inner = match &config.path {
            Some(path) => duckdb::Connection::open_with_flags(path, flags)?,
            None => duckdb::Connection::open_in_memory_with_flags(flags)?,
        };

        let conn = Self::wrap(inner, config.location());
        tracing::info!(
            id = %conn.id,
            location = %conn.location,
            application = %config.application_name,
            read_only = config.read_only,
            "opened DuckDB database"
        );
        Ok(conn)
    }

    /// Open another connection to the same database instance.
    ///
    /// Every clone gets a fresh identifier.
    pub fn try_clone(&self) -> Result<Self> {
        let inner = self.inner.try_clone()?;
        let conn = Self::wrap(inner, self.location.clone());
        tracing::debug!(id = %conn.id, from = %self.id, "cloned connection");
        Ok(conn)
    }

    fn wrap(inner: duckdb::Connection, location: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            location,
            inner,
            sanitization: SanitizationConfig::default(),
        }
    }

    /// Unique identifier of this connection.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Database location (`:memory:` or the file path).
    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Replace the sanitization settings used for statement logging.
    pub fn set_sanitization(&mut self, config: SanitizationConfig) {
        self.sanitization = config;
    }

    /// Execute one statement and materialize its rows.
    ///
    /// Engine failures are returned inside the [`QueryResult`].
    pub fn query(&mut self, sql: &str) -> QueryResult {
        let start = Instant::now();
        let result = self.run(sql).unwrap_or_else(|e| QueryResult::failed(e.to_string()));

        tracing::debug!(
            target: TRACE_TARGET,
            connection_id = %self.id,
            operation = extract_operation(sql),
            statement = %self.sanitization.sanitize(sql),
            rows = result.row_count(),
            ok = result.is_ok(),
            duration_ms = start.elapsed().as_millis() as u64,
            "query completed"
        );
        result
    }

    /// Execute one or more `;`-separated statements, discarding any rows.
    pub fn execute_batch(&mut self, sql: &str) -> QueryResult {
        let start = Instant::now();
        let result = match self.inner.execute_batch(sql) {
            Ok(()) => QueryResult::empty(),
            Err(e) => QueryResult::failed(e.to_string()),
        };

        tracing::debug!(
            target: TRACE_TARGET,
            connection_id = %self.id,
            statement = %self.sanitization.sanitize(sql),
            ok = result.is_ok(),
            duration_ms = start.elapsed().as_millis() as u64,
            "batch completed"
        );
        result
    }

    fn run(&mut self, sql: &str) -> std::result::Result<QueryResult, duckdb::Error> {
        let mut stmt = self.inner.prepare(sql)?;
        let mut rows = stmt.query([])?;

        // Column names are only known once the statement has executed.
        let names: Vec<String> = rows
            .as_ref()
            .map(|s| s.column_names())
            .unwrap_or_default();

        let mut collected = Vec::new();
        while let Some(row) = rows.next()? {
            let values = (0..names.len()).map(|i| column_value(row, i)).collect();
            collected.push(Row::new(names.clone(), values));
        }

        let columns = names
            .into_iter()
            .enumerate()
            .map(|(index, name)| Column { name, index })
            .collect();
        Ok(QueryResult::new(columns, collected))
    }
}

fn column_value(row: &duckdb::Row<'_>, idx: usize) -> Value {
    match row.get_ref(idx) {
        Ok(ValueRef::Null) => Value::Null,
        Ok(ValueRef::Boolean(b)) => Value::Bool(b),
        Ok(ValueRef::TinyInt(n)) => Value::Int(n.into()),
        Ok(ValueRef::SmallInt(n)) => Value::Int(n.into()),
        Ok(ValueRef::Int(n)) => Value::Int(n.into()),
        Ok(ValueRef::BigInt(n)) => Value::Int(n),
        Ok(ValueRef::UTinyInt(n)) => Value::Int(n.into()),
        Ok(ValueRef::USmallInt(n)) => Value::Int(n.into()),
        Ok(ValueRef::UInt(n)) => Value::Int(n.into()),
        Ok(ValueRef::UBigInt(n)) => i64::try_from(n).map_or(Value::Float(n as f64), Value::Int),
        Ok(ValueRef::HugeInt(n)) => i64::try_from(n).map_or(Value::Float(n as f64), Value::Int),
        Ok(ValueRef::Float(f)) => Value::Float(f.into()),
        Ok(ValueRef::Double(f)) => Value::Float(f),
        Ok(ValueRef::Decimal(d)) => d
            .to_string()
            .parse()
            .map_or_else(|_| Value::Text(d.to_string()), Value::Float),
        Ok(ValueRef::Text(bytes)) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        Ok(ValueRef::Blob(bytes)) => Value::Blob(bytes.to_vec()),
        Ok(other) => {
            tracing::trace!(column = idx, value = ?other, "unsupported column type, reading as NULL");
            Value::Null
        }
        Err(e) => {
            tracing::trace!(column = idx, error = %e, "failed to read column");
            Value::Null
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("location", &self.location)
            .finish()
    }
}
