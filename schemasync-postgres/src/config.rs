//! PostgreSQL connection configuration.

use std::time::Duration;

use crate::error::{PgError, PgResult};

/// Application name reported in `pg_stat_activity` unless overridden.
pub const DEFAULT_APPLICATION_NAME: &str = "schemasync";

/// PostgreSQL connection configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgConfig {
    /// Host name or socket directory.
    pub host: String,
    /// Port (default: 5432).
    pub port: u16,
    /// Database name.
    pub database: String,
    /// Username.
    pub user: String,
    /// Password.
    pub password: Option<String>,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Application name.
    pub application_name: String,
}

impl PgConfig {
    /// Parse a `postgres://` or `postgresql://` URL.
    ///
    /// Recognized query parameters are `connect_timeout` (seconds) and
    /// `application_name`. TLS is not supported, so an `sslmode` other than
    /// `disable` or `prefer` is rejected.
    pub fn from_url(url: &str) -> PgResult<Self> {
        let parsed = url::Url::parse(url)
            .map_err(|e| PgError::config(format!("invalid database URL: {}", e)))?;

        if parsed.scheme() != "postgresql" && parsed.scheme() != "postgres" {
            return Err(PgError::config(format!(
                "invalid scheme: expected 'postgresql' or 'postgres', got '{}'",
                parsed.scheme()
            )));
        }

        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| PgError::config("missing host in URL"))?
            .to_string();

        let database = parsed.path().trim_start_matches('/').to_string();
        if database.is_empty() {
            return Err(PgError::config("missing database name in URL"));
        }

        let mut builder = Self::builder()
            .host(host)
            .port(parsed.port().unwrap_or(5432))
            .database(database);
        if !parsed.username().is_empty() {
            builder = builder.user(parsed.username());
        }
        if let Some(password) = parsed.password() {
            builder = builder.password(password);
        }

        for (key, value) in parsed.query_pairs() {
            match key.as_ref() {
                "connect_timeout" => {
                    let secs: u64 = value
                        .parse()
                        .map_err(|_| PgError::config("invalid connect_timeout"))?;
                    builder = builder.connect_timeout(Duration::from_secs(secs));
                }
                "application_name" => builder = builder.application_name(value.as_ref()),
                "sslmode" => match value.as_ref() {
                    "disable" | "prefer" => {}
                    other => {
                        return Err(PgError::config(format!(
                            "unsupported sslmode: {}",
                            other
                        )));
                    }
                },
                other => {
                    tracing::debug!(parameter = %other, "Ignoring unknown URL parameter");
                }
            }
        }

        builder.build()
    }

    /// Create a builder.
    pub fn builder() -> PgConfigBuilder {
        PgConfigBuilder::new()
    }

    /// The URL without its password, for logs.
    pub fn redacted_url(&self) -> String {
        format!(
            "postgresql://{}{}@{}:{}/{}",
            self.user,
            if self.password.is_some() { ":***" } else { "" },
            self.host,
            self.port,
            self.database
        )
    }

    /// Convert to a tokio-postgres config.
    pub fn to_pg_config(&self) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .dbname(&self.database)
            .user(&self.user)
            .application_name(&self.application_name)
            .connect_timeout(self.connect_timeout);
        if let Some(password) = &self.password {
            config.password(password);
        }
        config
    }
}

/// Builder for [`PgConfig`].
#[derive(Debug, Default)]
pub struct PgConfigBuilder {
    host: Option<String>,
    port: Option<u16>,
    database: Option<String>,
    user: Option<String>,
    password: Option<String>,
    connect_timeout: Option<Duration>,
    application_name: Option<String>,
}

impl PgConfigBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the database name.
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the username.
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Set the password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the application name.
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    /// Build the configuration.
    pub fn build(self) -> PgResult<PgConfig> {
        let database = self
            .database
            .ok_or_else(|| PgError::config("database name is required"))?;
        Ok(PgConfig {
            host: self.host.unwrap_or_else(|| "localhost".to_string()),
            port: self.port.unwrap_or(5432),
            database,
            user: self.user.unwrap_or_else(|| "postgres".to_string()),
            password: self.password,
            connect_timeout: self.connect_timeout.unwrap_or(Duration::from_secs(30)),
            application_name: self
                .application_name
                .unwrap_or_else(|| DEFAULT_APPLICATION_NAME.to_string()),
        })
    }
}
