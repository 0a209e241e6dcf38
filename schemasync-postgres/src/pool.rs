//! Connection pool for PostgreSQL.

use std::sync::Arc;
use std::time::Duration;

use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use schemasync_schema::{DatabaseConfig, PoolConfig};
use tokio_postgres::NoTls;
use tracing::{debug, info};

use crate::config::PgConfig;
use crate::connection::PgConnection;
use crate::error::{PgError, PgResult};

/// A connection pool for PostgreSQL.
///
/// A reconciliation run holds one connection for its whole duration, so a
/// small pool is enough.
#[derive(Clone)]
pub struct PgPool {
    inner: Pool,
    config: Arc<PgConfig>,
}

impl PgPool {
    /// Create a pool with default sizing.
    pub fn new(config: PgConfig) -> PgResult<Self> {
        Self::with_pool_config(config, &PoolConfig::default())
    }

    /// Create a pool from a URL with default sizing.
    pub fn connect(url: &str) -> PgResult<Self> {
        Self::new(PgConfig::from_url(url)?)
    }

    /// Create a pool from the `[database]` section of a config file.
    pub fn from_database_config(database: &DatabaseConfig) -> PgResult<Self> {
        let url = database
            .url
            .as_deref()
            .ok_or_else(|| PgError::config("database.url is not set"))?;
        let mut config = PgConfig::from_url(url)?;
        config.connect_timeout = Duration::from_secs(database.pool.connect_timeout_secs);
        Self::with_pool_config(config, &database.pool)
    }

    /// Create a pool with explicit sizing.
    pub fn with_pool_config(config: PgConfig, pool_config: &PoolConfig) -> PgResult<Self> {
        if pool_config.max_connections == 0 {
            return Err(PgError::config("pool.max_connections must be at least 1"));
        }

        let manager = Manager::from_config(
            config.to_pg_config(),
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );

        let timeout = Some(Duration::from_secs(pool_config.connect_timeout_secs));
        let pool = Pool::builder(manager)
            .max_size(pool_config.max_connections)
            .wait_timeout(timeout)
            .create_timeout(timeout)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| PgError::config(format!("failed to create pool: {}", e)))?;

        info!(
            url = %config.redacted_url(),
            max_connections = pool_config.max_connections,
            "PostgreSQL connection pool created"
        );

        Ok(Self {
            inner: pool,
            config: Arc::new(config),
        })
    }

    /// Get a connection from the pool.
    pub async fn get(&self) -> PgResult<PgConnection> {
        debug!("Acquiring connection from pool");
        let client = self.inner.get().await?;
        Ok(PgConnection::new(client))
    }

    /// Number of connections currently open and idle.
    pub fn status(&self) -> (usize, usize) {
        let status = self.inner.status();
        (status.size as usize, status.available as usize)
    }

    /// Get the connection configuration.
    pub fn config(&self) -> &PgConfig {
        &self.config
    }

    /// Check that a connection can be acquired and answers a query.
    pub async fn is_healthy(&self) -> bool {
        match self.inner.get().await {
            Ok(client) => client.query_one("select 1", &[]).await.is_ok(),
            Err(_) => false,
        }
    }

    /// Close the pool and all connections.
    pub fn close(&self) {
        self.inner.close();
        info!("PostgreSQL connection pool closed");
    }
}
