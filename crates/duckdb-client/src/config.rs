//! Client configuration.

use std::path::PathBuf;

use crate::error::{ClientError, Result};

/// Configuration for opening an embedded DuckDB database.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database file path. `None` opens a private in-memory database.
    pub path: Option<PathBuf>,

    /// Open the database in read-only access mode.
    pub read_only: bool,

    /// Number of worker threads DuckDB may use per query.
    pub threads: Option<u32>,

    /// Application name, used in log output.
    pub application_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: None,
            read_only: false,
            threads: None,
            application_name: "duckdb-client".to_string(),
        }
    }
}

impl Config {
    /// Create a new configuration for an in-memory database.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a connection string into configuration.
    ///
    /// Keys are case-insensitive and separated by `;`:
    /// ```text
    /// Path=/var/lib/app/data.duckdb;Access Mode=read_only;Threads=4;
    /// ```
    /// `:memory:` as the path selects an in-memory database.
    pub fn from_connection_string(conn_str: &str) -> Result<Self> {
        let mut config = Self::default();

        for part in conn_str.split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }

            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| ClientError::Config(format!("invalid key-value: {part}")))?;

            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "path" | "database" | "data source" => {
                    config.path = if value.is_empty() || value == ":memory:" {
                        None
                    } else {
                        Some(PathBuf::from(value))
                    };
                }
                "access mode" | "access_mode" => {
                    config.read_only = match value.to_lowercase().as_str() {
                        "read_only" | "readonly" => true,
                        "read_write" | "readwrite" | "automatic" => false,
                        _ => {
                            return Err(ClientError::Config(format!(
                                "invalid access mode: {value}"
                            )));
                        }
                    };
                }
                "threads" => {
                    let threads: u32 = value.parse().map_err(|_| {
                        ClientError::Config(format!("invalid thread count: {value}"))
                    })?;
                    if threads == 0 {
                        return Err(ClientError::Config(
                            "thread count must be greater than 0".into(),
                        ));
                    }
                    config.threads = Some(threads);
                }
                "application name" | "app" => {
                    config.application_name = value.to_string();
                }
                _ => {
                    tracing::debug!(
                        key = key,
                        value = value,
                        "ignoring unknown connection string option"
                    );
                }
            }
        }

        Ok(config)
    }

    /// Set the database file path.
    #[must_use]
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Use a private in-memory database.
    #[must_use]
    pub fn in_memory(mut self) -> Self {
        self.path = None;
        self
    }

    /// Open in read-only access mode.
    #[must_use]
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Limit DuckDB worker threads.
    #[must_use]
    pub fn threads(mut self, threads: u32) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Set the application name.
    #[must_use]
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = name.into();
        self
    }

    /// Whether this configuration targets an in-memory database.
    #[must_use]
    pub fn is_memory(&self) -> bool {
        self.path.is_none()
    }

    /// Human-readable location of the database, for logs.
    #[must_use]
    pub fn location(&self) -> String {
        self.path
            .as_ref()
            .map_or_else(|| ":memory:".to_string(), |p| p.display().to_string())
    }

    pub(crate) fn to_duckdb_config(&self) -> Result<duckdb::Config> {
        let mut config = duckdb::Config::default();
        if self.read_only {
            config = config.access_mode(duckdb::AccessMode::ReadOnly)?;
        }
        if let Some(threads) = self.threads {
            config = config.threads(i64::from(threads))?;
        }
        Ok(config)
    }
}
