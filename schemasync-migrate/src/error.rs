//! Error types for the reconciliation engine.

use schemasync_schema::SchemaError;
use thiserror::Error;

/// Result type alias for reconciliation operations.
pub type MigrateResult<T> = Result<T, MigrationError>;

/// Errors that can occur while inspecting or altering a database.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Catalog query or other database error.
    #[error("Database error: {0}")]
    Database(String),

    /// The connection is unusable.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Invalid declaration.
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// A DDL statement was rejected.
    #[error("Statement failed: {message} (sql: {sql})")]
    Statement {
        /// The rejected statement.
        sql: String,
        /// Database message.
        message: String,
    },

    /// Model not present in the registry.
    #[error("Model '{0}' is not registered")]
    UnknownModel(String),

    /// Invalid engine configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// General error.
    #[error("Sync error: {0}")]
    Other(String),
}

impl MigrationError {
    /// Create a database error.
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a statement error.
    pub fn statement(sql: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Statement {
            sql: sql.into(),
            message: message.into(),
        }
    }

    /// Create an unknown model error.
    pub fn unknown_model(model: impl Into<String>) -> Self {
        Self::UnknownModel(model.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Check if the connection itself failed.
    ///
    /// Such errors are never skipped over: every later statement would fail
    /// the same way.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MigrationError::unknown_model("Team");
        assert!(err.to_string().contains("Team"));
    }

    #[test]
    fn test_statement_display() {
        let err = MigrationError::statement("alter table \"t\" add column \"x\" integer", "boom");
        let msg = err.to_string();
        assert!(msg.contains("boom"));
        assert!(msg.contains("add column"));
    }

    #[test]
    fn test_is_connection() {
        assert!(MigrationError::connection("reset by peer").is_connection());
        assert!(!MigrationError::database("permission denied").is_connection());
    }

    #[test]
    fn test_from_schema_error() {
        let err: MigrationError = SchemaError::MissingName.into();
        assert!(matches!(err, MigrationError::Schema(_)));
    }
}
