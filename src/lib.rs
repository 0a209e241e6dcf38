//! # schemasync
//!
//! Declarative PostgreSQL table reconciliation.
//!
//! Declare the tables an application needs; schemasync inspects the live
//! database and issues the DDL that brings it in line. Changes are additive
//! by default: columns, indexes and foreign keys are created, types widened,
//! defaults and `not null` applied. Destructive changes need an explicit
//! `force`.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use schemasync::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), schemasync::Error> {
//!     let mut registry = ModelRegistry::new();
//!     registry.register(
//!         TableDeclaration::new("user")
//!             .primary_key("id")
//!             .column("id", ColumnDeclaration::new("varchar(12)"))
//!             .column("age", ColumnDeclaration::new("integer").default(18)),
//!     )?;
//!
//!     let config = SchemasyncConfig::from_file("schemasync.toml")?;
//!     let report = schemasync::sync_with_config(&config, &registry).await?;
//!     println!("{} statements", report.statements.len());
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

use thiserror::Error;
use tracing::info;

/// Declared table structure, types and configuration.
pub mod schema {
    pub use schemasync_schema::*;
}

/// The reconciliation engine.
pub mod migrate {
    pub use schemasync_migrate::*;
}

/// The PostgreSQL session.
pub mod postgres {
    pub use schemasync_postgres::*;
}

pub use schemasync_migrate::{
    MemoryCatalog, MigrationError, Reconciler, SyncOptions, SyncReport, logging,
};
pub use schemasync_postgres::{PgConfig, PgError, PgPool};
pub use schemasync_schema::{
    ColumnDeclaration, ModelRegistry, SchemaError, SchemasyncConfig, TableDeclaration,
    TableDescriptor,
};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use schemasync_migrate::prelude::*;
    pub use schemasync_postgres::PgPool;
    pub use schemasync_schema::{
        ColumnDeclaration, DefaultValue, ForeignKeyRef, IndexSpec, ModelRegistry, PrimaryKey,
        ReferentialAction, SchemasyncConfig, TableDeclaration, TimestampRole, ValidationRule,
    };
}

/// Any error schemasync can return.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid declaration or configuration file.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Reconciliation failed.
    #[error(transparent)]
    Migration(#[from] MigrationError),

    /// Connection setup failed.
    #[error(transparent)]
    Postgres(#[from] PgError),
}

/// Result type for the convenience entry points.
pub type Result<T> = std::result::Result<T, Error>;

/// Connect with a parsed configuration and reconcile every registered model.
///
/// The `[database]` section selects the connection and pool, the `[sync]`
/// section becomes the [`SyncOptions`].
pub async fn sync_with_config(
    config: &SchemasyncConfig,
    registry: &ModelRegistry,
) -> Result<SyncReport> {
    let options = SyncOptions::from(&config.sync);
    if options.debug {
        info!(models = registry.len(), options = ?options, "Syncing with configuration");
    }

    let pool = PgPool::from_database_config(&config.database)?;
    let connection = pool.get().await?;
    let report = Reconciler::new(&connection, registry)
        .with_options(options)
        .sync_all()
        .await;
    pool.close();
    Ok(report?)
}
