//! Configuration file parsing for `schemasync.toml`.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{SchemaError, SchemaResult};

/// Main configuration structure for `schemasync.toml`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SchemasyncConfig {
    /// Database connection settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Reconciliation behaviour.
    #[serde(default)]
    pub sync: SyncConfig,
}

impl SchemasyncConfig {
    /// Load configuration from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> SchemaResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| SchemaError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string, expanding `${VAR}` references.
    pub fn parse(content: &str) -> SchemaResult<Self> {
        let expanded = expand_env_vars(content);
        toml::from_str(&expanded).map_err(|e| SchemaError::TomlError { source: e })
    }

    /// The database URL, if configured.
    pub fn database_url(&self) -> Option<&str> {
        self.database.url.as_deref()
    }
}

/// Database configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Connection URL (supports `${ENV_VAR}` interpolation).
    pub url: Option<String>,

    /// Connection pool settings.
    #[serde(default)]
    pub pool: PoolConfig,
}

/// Connection pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PoolConfig {
    /// Maximum number of connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Seconds to wait when opening or acquiring a connection.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

fn default_max_connections() -> usize { 4 }
fn default_connect_timeout_secs() -> u64 { 30 }

/// Reconciliation settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// Allow destructive type rebuilds and drop unlisted columns.
    #[serde(default)]
    pub force: bool,

    /// Drop live columns that are not declared.
    #[serde(default, alias = "drop_not_exist_col")]
    pub drop_unlisted_columns: bool,

    /// Log every statement before it runs.
    #[serde(default)]
    pub debug: bool,

    /// Override the namespace of every table.
    #[serde(default)]
    pub schema: Option<String>,

    /// Restrict a full run to one model.
    #[serde(default)]
    pub model: Option<String>,

    /// Guess the table of an unregistered reference target by lowercasing it.
    #[serde(default)]
    pub guess_references: bool,

    /// Render statements without executing them.
    #[serde(default)]
    pub dry_run: bool,
}

/// Expand environment variables in the format `${VAR_NAME}`.
///
/// Unset variables are left untouched.
fn expand_env_vars(content: &str) -> String {
    let re = match regex_lite::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}") {
        Ok(re) => re,
        Err(_) => return content.to_string(),
    };

    re.replace_all(content, |caps: &regex_lite::Captures<'_>| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}
