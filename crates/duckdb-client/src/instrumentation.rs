//! Statement instrumentation helpers for log output.
//!
//! Rendered SQL frequently embeds user data (template contexts are inlined as
//! literals), so statements are sanitized before they reach a log line.

/// Tracing target used for statement logging.
pub const TRACE_TARGET: &str = "duckdb_client::statement";

/// Configuration for SQL statement sanitization.
#[derive(Debug, Clone)]
pub struct SanitizationConfig {
    /// Whether to replace literals with placeholders.
    pub enabled: bool,
    /// Maximum length of statement to record.
    pub max_length: usize,
    /// Placeholder to use for sanitized values.
    pub placeholder: String,
}

impl Default for SanitizationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_length: 2048,
            placeholder: "?".to_string(),
        }
    }
}

impl SanitizationConfig {
    /// A configuration that records statements verbatim.
    #[must_use]
    pub fn no_sanitization() -> Self {
        Self {
            enabled: false,
            max_length: usize::MAX,
            placeholder: String::new(),
        }
    }

    /// Sanitize a SQL statement according to the configuration.
    #[must_use]
    pub fn sanitize(&self, sql: &str) -> String {
        if self.enabled {
            truncate(&replace_literals(sql, &self.placeholder), self.max_length)
        } else {
            truncate(sql, self.max_length)
        }
    }
}

/// Replace quoted strings and bare numeric literals with `placeholder`.
fn replace_literals(sql: &str, placeholder: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                // '' inside a literal is an escaped quote
                loop {
                    match chars.next() {
                        Some('\'') if chars.peek() == Some(&'\'') => {
                            chars.next();
                        }
                        Some('\'') | None => break,
                        Some(_) => {}
                    }
                }
                out.push_str(placeholder);
            }
            d if d.is_ascii_digit()
                && !out.ends_with(|p: char| p.is_alphanumeric() || p == '_' || p == '"') =>
            {
                while chars
                    .peek()
                    .is_some_and(|n| n.is_ascii_digit() || *n == '.')
                {
                    chars.next();
                }
                out.push_str(placeholder);
            }
            other => out.push(other),
        }
    }

    out
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let keep = max_len.saturating_sub(3);
    let cut = s
        .char_indices()
        .map(|(i, _)| i)
        .take_while(|i| *i <= keep)
        .last()
        .unwrap_or(0);
    format!("{}...", &s[..cut])
}

/// Extract the leading operation keyword of a statement.
#[must_use]
pub fn extract_operation(sql: &str) -> &'static str {
    const OPERATIONS: &[&str] = &[
        "SELECT", "INSERT", "UPDATE", "DELETE", "WITH", "CREATE", "ALTER", "DROP", "COPY",
        "ATTACH", "DETACH", "PRAGMA", "BEGIN", "COMMIT", "ROLLBACK", "INSTALL", "LOAD",
    ];

    let head = sql
        .trim_start()
        .split(|c: char| c.is_whitespace() || c == '(' || c == ';')
        .next()
        .unwrap_or_default();

    OPERATIONS
        .iter()
        .find(|op| head.eq_ignore_ascii_case(op))
        .copied()
        .unwrap_or("OTHER")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_operation() {
        assert_eq!(extract_operation("SELECT * FROM message"), "SELECT");
        assert_eq!(extract_operation("  select id from message"), "SELECT");
        assert_eq!(extract_operation("insert into message values (1)"), "INSERT");
        assert_eq!(extract_operation("WITH t AS (SELECT 1) SELECT * FROM t"), "WITH");
        assert_eq!(extract_operation("CREATE SEQUENCE id_sequence START 1;"), "CREATE");
        assert_eq!(extract_operation("copy t to 'out.parquet'"), "COPY");
        assert_eq!(extract_operation("SUMMARIZE t"), "OTHER");
    }

    #[test]
    fn test_replace_literals() {
        assert_eq!(
            replace_literals("select * from message where role = 'human'", "?"),
            "select * from message where role = ?"
        );
        assert_eq!(
            replace_literals("values ('it''s', 42, 3.5)", "?"),
            "values (?, ?, ?)"
        );
        assert_eq!(
            replace_literals("select col1 from t2 where id = 9", "?"),
            "select col1 from t2 where id = ?"
        );
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world", 8), "hello...");
        assert_eq!(truncate("héllo wörld", 6), "hé...");
    }

    #[test]
    fn test_no_sanitization() {
        let config = SanitizationConfig::no_sanitization();
        let sql = "select * from message where content = 'secret'";
        assert_eq!(config.sanitize(sql), sql);
        assert_eq!(
            SanitizationConfig::default().sanitize(sql),
            "select * from message where content = ?"
        );
    }
}
