//! # schemasync-postgres
//!
//! PostgreSQL session for schemasync.
//!
//! This crate provides:
//! - Connection pool management using `deadpool-postgres`
//! - [`PgConnection`], which implements the catalog [`Introspector`] and the
//!   [`DdlExecutor`] used by the reconciler
//! - Classification of driver errors into connection failures, which end a
//!   run, and rejected statements, which skip one change
//!
//! ## Example
//!
//! ```rust,ignore
//! use schemasync_migrate::Reconciler;
//! use schemasync_postgres::PgPool;
//!
//! let pool = PgPool::connect("postgresql://app@localhost/app")?;
//! let conn = pool.get().await?;
//! let report = Reconciler::new(&conn, &registry).sync_all().await?;
//! ```
//!
//! [`Introspector`]: schemasync_migrate::Introspector
//! [`DdlExecutor`]: schemasync_migrate::DdlExecutor

pub mod config;
pub mod connection;
pub mod error;
pub mod pool;

pub use config::{DEFAULT_APPLICATION_NAME, PgConfig, PgConfigBuilder};
pub use connection::PgConnection;
pub use error::{PgError, PgResult};
pub use pool::PgPool;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::PgConfig;
    pub use crate::connection::PgConnection;
    pub use crate::error::{PgError, PgResult};
    pub use crate::pool::PgPool;
}
