//! Row mapping helpers over a DuckDB pool.
//!
//! Every call checks out a connection, renders and runs one statement, and
//! returns the connection before reporting the outcome.

use std::collections::{BTreeMap, HashMap};

use duckdb_client::{ClientError, QueryResult, Row, Value};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::duckdb::DuckDbPool;
use crate::error::PoolError;

/// Errors raised by [`DataTemplate`] operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DataError {
    /// No connection could be checked out.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// The statement could not be rendered.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// The database rejected the statement.
    #[error("query failed: {0}")]
    Query(String),

    /// `select_one` matched more than one row.
    #[error("expected at most one row, got {0}")]
    TooManyRows(usize),

    /// A statement returned a different number of rows than required.
    #[error("expected {expected} rows, got {actual}")]
    UnexpectedRowCount {
        /// Rows required.
        expected: usize,
        /// Rows returned.
        actual: usize,
    },

    /// A row could not be converted into the requested type.
    #[error("failed to decode row: {0}")]
    Decode(#[from] serde_json::Error),
}

/// One row of an aggregation query: numeric columns by name.
pub type Aggregation = BTreeMap<String, Value>;

/// Runs templated statements through a pool and maps their rows.
#[derive(Debug, Clone)]
pub struct DataTemplate {
    pool: DuckDbPool,
    column_mapping: HashMap<String, String>,
}

impl DataTemplate {
    /// Create a template over `pool`.
    #[must_use]
    pub fn new(pool: DuckDbPool) -> Self {
        Self {
            pool,
            column_mapping: HashMap::new(),
        }
    }

    /// Rename `column` to `field` when decoding rows with the `_as` methods.
    #[must_use]
    pub fn map_column(mut self, column: impl Into<String>, field: impl Into<String>) -> Self {
        self.column_mapping.insert(column.into(), field.into());
        self
    }

    /// The pool statements run on.
    #[must_use]
    pub fn pool(&self) -> &DuckDbPool {
        &self.pool
    }

    fn run(&self, template: &str, context: &JsonValue) -> Result<QueryResult, DataError> {
        let mut conn = self.pool.acquire()?;
        let result = conn.query(template, context)?;
        match result.error() {
            Some(err) => Err(DataError::Query(err.to_string())),
            None => Ok(result),
        }
    }

    /// Fetch at most one row.
    pub fn select_one(&self, template: &str, context: &JsonValue) -> Result<Option<Row>, DataError> {
        let mut rows = self.run(template, context)?.into_rows();
        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop()),
            n => Err(DataError::TooManyRows(n)),
        }
    }

    /// Fetch every row.
    pub fn select_many(&self, template: &str, context: &JsonValue) -> Result<Vec<Row>, DataError> {
        Ok(self.run(template, context)?.into_rows())
    }

    /// Fetch at most one row and decode it into `T`.
    pub fn select_one_as<T: DeserializeOwned>(
        &self,
        template: &str,
        context: &JsonValue,
    ) -> Result<Option<T>, DataError> {
        self.select_one(template, context)?
            .map(|row| self.decode(&row))
            .transpose()
    }

    /// Fetch every row and decode each into `T`.
    pub fn select_many_as<T: DeserializeOwned>(
        &self,
        template: &str,
        context: &JsonValue,
    ) -> Result<Vec<T>, DataError> {
        self.select_many(template, context)?
            .iter()
            .map(|row| self.decode(row))
            .collect()
    }

    /// Run a statement and return the affected row count it reports.
    ///
    /// Statements that report nothing count as zero.
    pub fn execute(&self, template: &str, context: &JsonValue) -> Result<u64, DataError> {
        let result = self.run(template, context)?;
        match result.first_value() {
            None | Some(Value::Null) => Ok(0),
            Some(value) => value
                .as_i64()
                .and_then(|n| u64::try_from(n).ok())
                .ok_or_else(|| DataError::Query(format!("expected a row count, got {value}"))),
        }
    }

    /// Run an insert and return the first column of every returned row.
    ///
    /// Intended for `insert ... returning (id)` statements.
    pub fn insert_many(&self, template: &str, context: &JsonValue) -> Result<Vec<Value>, DataError> {
        let rows = self.run(template, context)?.into_rows();
        Ok(rows
            .into_iter()
            .filter_map(|row| row.get(0).cloned())
            .collect())
    }

    /// Run an insert that must return exactly one key.
    pub fn insert_one(&self, template: &str, context: &JsonValue) -> Result<Value, DataError> {
        let mut keys = self.insert_many(template, context)?;
        if keys.len() != 1 {
            return Err(DataError::UnexpectedRowCount {
                expected: 1,
                actual: keys.len(),
            });
        }
        keys.pop().ok_or(DataError::UnexpectedRowCount {
            expected: 1,
            actual: 0,
        })
    }

    /// Run an aggregation query, keeping the numeric columns of each row.
    ///
    /// Null cells are skipped; non-numeric columns are dropped with a warning.
    pub fn aggregate(&self, template: &str, context: &JsonValue) -> Result<Vec<Aggregation>, DataError> {
        let rows = self.run(template, context)?.into_rows();
        let mut aggregations = Vec::with_capacity(rows.len());

        for row in &rows {
            let mut aggregation = Aggregation::new();
            for (name, value) in row.iter() {
                if value.is_null() {
                    tracing::debug!(column = name, "null value in aggregation row");
                } else if value.is_numeric() {
                    aggregation.insert(name.to_string(), value.clone());
                } else {
                    tracing::warn!(column = name, "discarding non-numeric aggregation column");
                }
            }
            aggregations.push(aggregation);
        }

        Ok(aggregations)
    }

    fn decode<T: DeserializeOwned>(&self, row: &Row) -> Result<T, DataError> {
        let object: serde_json::Map<String, JsonValue> = row
            .iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(name, value)| {
                let field = self
                    .column_mapping
                    .get(name)
                    .map_or(name, String::as_str)
                    .to_string();
                serde_json::to_value(value).map(|v| (field, v))
            })
            .collect::<Result<_, _>>()?;
        Ok(serde_json::from_value(JsonValue::Object(object))?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::duckdb::{create_duckdb_pool, execute_sql};
    use duckdb_client::Config as ClientConfig;
    use serde::Deserialize;
    use serde_json::json;

    const SCHEMA: &str = "create sequence id_sequence start 1; \
        create table message (id integer default nextval('id_sequence'), role varchar not null, content varchar not null, tokens integer);";

    #[derive(Debug, Deserialize, PartialEq)]
    struct Message {
        id: i64,
        role: String,
        text: String,
        tokens: Option<i64>,
    }

    fn template() -> DataTemplate {
        let pool = create_duckdb_pool(&ClientConfig::new(), PoolConfig::new().initial_connections(2))
            .unwrap();
        execute_sql(&pool, SCHEMA).unwrap();
        DataTemplate::new(pool).map_column("content", "text")
    }

    const INSERT: &str = "insert into message(role, content, tokens) values \
        {% for m in messages %}({{text(m.role)}}, {{text(m.content)}}, {{m.tokens}}){% if not loop.last %},{% endif %}{% endfor %} \
        returning (id);";

    #[test]
    fn test_insert_and_select() {
        let template = template();
        let ids = template
            .insert_many(
                INSERT,
                &json!({"messages": [
                    {"role": "human", "content": "hi", "tokens": 3},
                    {"role": "assistant", "content": "hello", "tokens": 5},
                ]}),
            )
            .unwrap();
        assert_eq!(ids, vec![Value::Int(1), Value::Int(2)]);

        let row = template
            .select_one("select * from message where id = {{id}}", &json!({"id": 2}))
            .unwrap()
            .unwrap();
        assert_eq!(row.get_by_name("role"), Some(&Value::Text("assistant".into())));

        let rows = template
            .select_many("select * from message order by id", &json!({}))
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(template.pool().status().in_use, 0);
    }

    #[test]
    fn test_select_one_rejects_many_rows() {
        let template = template();
        template
            .insert_many(
                INSERT,
                &json!({"messages": [
                    {"role": "human", "content": "a", "tokens": 1},
                    {"role": "human", "content": "b", "tokens": 1},
                ]}),
            )
            .unwrap();

        let err = template
            .select_one("select * from message", &json!({}))
            .unwrap_err();
        assert!(matches!(err, DataError::TooManyRows(2)));
        assert!(
            template
                .select_one("select * from message where id = 42", &json!({}))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_select_as_applies_column_mapping() {
        let template = template();
        let id = template
            .insert_one(
                "insert into message(role, content) values ({{text(role)}}, {{text(content)}}) returning (id);",
                &json!({"role": "human", "content": "why is the sky blue?"}),
            )
            .unwrap();
        assert_eq!(id, Value::Int(1));

        let message: Message = template
            .select_one_as("select * from message where id = 1", &json!({}))
            .unwrap()
            .unwrap();
        assert_eq!(
            message,
            Message {
                id: 1,
                role: "human".into(),
                text: "why is the sky blue?".into(),
                tokens: None,
            }
        );

        let all: Vec<Message> = template
            .select_many_as("select * from message", &json!({}))
            .unwrap();
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn test_execute_returns_count() {
        let template = template();
        template
            .insert_many(
                INSERT,
                &json!({"messages": [
                    {"role": "human", "content": "a", "tokens": 1},
                    {"role": "human", "content": "b", "tokens": 2},
                    {"role": "assistant", "content": "c", "tokens": 3},
                ]}),
            )
            .unwrap();

        let deleted = template
            .execute("delete from message where role = {{text(role)}}", &json!({"role": "human"}))
            .unwrap();
        assert_eq!(deleted, 2);
    }

    #[test]
    fn test_aggregate_keeps_numeric_columns() {
        let template = template();
        template
            .insert_many(
                INSERT,
                &json!({"messages": [
                    {"role": "human", "content": "a", "tokens": 1},
                    {"role": "human", "content": "b", "tokens": 2},
                ]}),
            )
            .unwrap();

        let rows = template
            .aggregate(
                "select role, count(*) as total, avg(tokens) as mean, sum(case when role = 'nobody' then tokens end) as nothing from message group by role",
                &json!({}),
            )
            .unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.get("total"), Some(&Value::Int(2)));
        assert_eq!(row.get("mean"), Some(&Value::Float(1.5)));
        assert!(!row.contains_key("role"));
        assert!(!row.contains_key("nothing"));
    }

    #[test]
    fn test_query_error_releases_connection() {
        let template = template();
        let err = template
            .select_many("select * from missing", &json!({}))
            .unwrap_err();
        assert!(matches!(err, DataError::Query(_)));

        let err = template.select_many("select {% if %}", &json!({})).unwrap_err();
        assert!(matches!(err, DataError::Client(_)));
        assert_eq!(template.pool().status().in_use, 0);
    }
}
