//! SQL template environment.
//!
//! Statements are written as MiniJinja templates and rendered against a JSON
//! context before they are sent to the engine. Values are inlined as SQL
//! literals through the helper functions registered here, e.g.
//!
//! ```text
//! insert into message(role, content)
//! values ({{ text(role) }}, {{ text(content) }}) returning (id);
//! ```

use minijinja::value::{Value as TemplateValue, ValueKind};
use minijinja::{Environment, Error as TemplateError, ErrorKind};

use crate::error::Result;

/// Shared template environment with the SQL helper functions installed.
///
/// Build one per application and share it behind an `Arc`; every
/// [`ManagedConnection`](crate::ManagedConnection) renders through it.
#[derive(Debug)]
pub struct SqlTemplates {
    env: Environment<'static>,
}

impl SqlTemplates {
    /// Create an environment with the standard SQL helpers.
    #[must_use]
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);

        env.add_function("text", text);
        env.add_function("stringify", stringify);
        env.add_function("is_blank", |v: TemplateValue| is_blank(&v));
        env.add_function("is_not_blank", |v: TemplateValue| !is_blank(&v));
        env.add_function("timestamp", timestamp);

        Self { env }
    }

    /// Render `template` with `context`.
    pub fn render(&self, template: &str, context: &serde_json::Value) -> Result<String> {
        Ok(self.env.render_str(template, context)?)
    }
}

impl Default for SqlTemplates {
    fn default() -> Self {
        Self::new()
    }
}

/// Quote `text` as a SQL string literal, doubling embedded quotes.
#[must_use]
pub fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

fn text(value: TemplateValue) -> String {
    match value.as_str() {
        Some(s) if !s.is_empty() => quote_literal(s),
        _ => "NULL".to_string(),
    }
}

fn stringify(value: TemplateValue) -> std::result::Result<String, TemplateError> {
    if !matches!(value.kind(), ValueKind::Seq | ValueKind::Map) {
        return Ok("NULL".to_string());
    }
    let json = serde_json::to_string(&value).map_err(|e| {
        TemplateError::new(ErrorKind::InvalidOperation, "cannot serialize value").with_source(e)
    })?;
    Ok(quote_literal(&json))
}

fn is_blank(value: &TemplateValue) -> bool {
    if value.is_undefined() || value.is_none() {
        return true;
    }
    value.as_str().is_some_and(|s| s.trim().is_empty())
}

// DuckDB TIMESTAMP has microsecond precision.
fn timestamp(micros: i64) -> std::result::Result<String, TemplateError> {
    let ts = chrono::DateTime::from_timestamp_micros(micros).ok_or_else(|| {
        TemplateError::new(
            ErrorKind::InvalidOperation,
            format!("timestamp out of range: {micros}"),
        )
    })?;
    Ok(quote_literal(
        &ts.naive_utc().format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
    ))
}
