//! Error types for PostgreSQL sessions.

use schemasync_migrate::MigrationError;
use thiserror::Error;

/// Result type for PostgreSQL operations.
pub type PgResult<T> = Result<T, PgError>;

/// Errors that can occur while talking to PostgreSQL.
#[derive(Error, Debug)]
pub enum PgError {
    /// Connection pool error.
    #[error("pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// PostgreSQL error.
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Connection error.
    #[error("connection error: {0}")]
    Connection(String),

    /// Unexpected catalog row.
    #[error("catalog error: {0}")]
    Catalog(String),
}

/// SQLSTATE classes and codes that mean the session is gone.
fn is_connection_state(code: &str) -> bool {
    code.starts_with("08") || matches!(code, "57P01" | "57P02" | "57P03")
}

impl PgError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a catalog error.
    pub fn catalog(message: impl Into<String>) -> Self {
        Self::Catalog(message.into())
    }

    /// The SQLSTATE code, if the server reported one.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Postgres(e) => e.code().map(|code| code.code()),
            _ => None,
        }
    }

    /// Check if the connection is unusable.
    ///
    /// Pool failures, closed sockets and connection-class SQLSTATEs count.
    /// A statement the server rejected does not.
    pub fn is_connection_error(&self) -> bool {
        match self {
            Self::Pool(_) | Self::Connection(_) => true,
            Self::Postgres(e) => {
                e.is_closed()
                    || match e.code() {
                        Some(code) => is_connection_state(code.code()),
                        None => e.as_db_error().is_none(),
                    }
            }
            Self::Config(_) | Self::Catalog(_) => false,
        }
    }

    /// Convert a failed DDL statement, keeping the SQL.
    pub fn into_statement_error(self, sql: &str) -> MigrationError {
        if self.is_connection_error() {
            return self.into();
        }
        let message = match &self {
            Self::Postgres(e) => match e.as_db_error() {
                Some(db) => format!("{} ({})", db.message(), db.code().code()),
                None => e.to_string(),
            },
            other => other.to_string(),
        };
        MigrationError::statement(sql, message)
    }
}

impl From<PgError> for MigrationError {
    fn from(err: PgError) -> Self {
        if err.is_connection_error() {
            return MigrationError::connection(err.to_string());
        }
        match err {
            PgError::Config(msg) => MigrationError::config(msg),
            other => MigrationError::database(other.to_string()),
        }
    }
}
