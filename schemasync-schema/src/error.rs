//! Error types for table declarations and configuration.

// These warnings are false positives - the fields are used by derive macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors raised while normalizing declarations or loading configuration.
///
/// Every variant is fatal: a declaration that produces one is rejected before
/// any DDL is attempted.
#[derive(Error, Debug, Diagnostic)]
pub enum SchemaError {
    /// Error reading a file.
    #[error("failed to read file: {path}")]
    #[diagnostic(code(schemasync::schema::io_error))]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Neither a table name nor a model name was declared.
    #[error("table declaration has neither a table name nor a model name")]
    #[diagnostic(code(schemasync::schema::missing_name))]
    MissingName,

    /// The table has no primary key.
    #[error("table `{table}` does not declare a primary key")]
    #[diagnostic(code(schemasync::schema::missing_primary_key))]
    MissingPrimaryKey { table: String },

    /// Invalid table-level definition.
    #[error("invalid table `{table}`: {message}")]
    #[diagnostic(code(schemasync::schema::invalid_table))]
    InvalidTable { table: String, message: String },

    /// Invalid column definition.
    #[error("invalid column `{table}.{column}`: {message}")]
    #[diagnostic(code(schemasync::schema::invalid_field))]
    InvalidField {
        table: String,
        column: String,
        message: String,
    },

    /// Duplicate definition.
    #[error("duplicate {kind} `{name}`")]
    #[diagnostic(code(schemasync::schema::duplicate))]
    Duplicate { kind: String, name: String },

    /// Configuration error.
    #[error("configuration error: {message}")]
    #[diagnostic(code(schemasync::schema::config_error))]
    ConfigError { message: String },

    /// TOML parsing error.
    #[error("failed to parse TOML")]
    #[diagnostic(code(schemasync::schema::toml_error))]
    TomlError {
        #[source]
        source: toml::de::Error,
    },
}

impl SchemaError {
    /// Create an invalid table error.
    pub fn invalid_table(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidTable {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create an invalid column error.
    pub fn invalid_field(
        table: impl Into<String>,
        column: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidField {
            table: table.into(),
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a duplicate definition error.
    pub fn duplicate(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Duplicate {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }
}

#[cfg(test)]
#[allow(unused_assignments)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_field_display() {
        let err = SchemaError::invalid_field("user", "Name", "must be lowercase");
        assert_eq!(
            err.to_string(),
            "invalid column `user.Name`: must be lowercase"
        );
    }

    #[test]
    fn test_duplicate_display() {
        let err = SchemaError::duplicate("model", "User");
        assert_eq!(err.to_string(), "duplicate model `User`");
    }

    #[test]
    fn test_missing_primary_key_display() {
        let err = SchemaError::MissingPrimaryKey {
            table: "post".to_string(),
        };
        assert!(err.to_string().contains("post"));
    }
}
