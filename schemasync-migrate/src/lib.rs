//! # schemasync-migrate
//!
//! Reconciliation engine for schemasync.
//!
//! This crate provides:
//! - Live catalog inspection through the [`Introspector`] trait
//! - Declared-versus-live comparison producing structured DDL
//! - Safe DDL rendering with quoted identifiers and dollar-quoted literals
//! - The [`Reconciler`], which executes changes one statement at a time and
//!   reconciles foreign key targets before the constraints that need them
//! - An in-memory catalog, [`MemoryCatalog`], for tests and offline planning
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌─────────────┐
//! │ Descriptor   │────▶│ Diff         │────▶│ DdlStatement│
//! └──────────────┘     └──────────────┘     └─────────────┘
//!                             ▲                    │
//!                             │                    ▼
//!                      ┌──────────────┐     ┌─────────────┐
//!                      │ Introspector │     │ DdlExecutor │
//!                      └──────────────┘     └─────────────┘
//! ```
//!
//! Nothing here is transactional: every statement is committed on its own,
//! and a failed alteration is logged and skipped rather than undone.
//!
//! ## Example
//!
//! ```rust,ignore
//! use schemasync_migrate::{MemoryCatalog, Reconciler, SyncOptions};
//!
//! let catalog = MemoryCatalog::new();
//! let report = Reconciler::new(&catalog, &registry)
//!     .with_options(SyncOptions::new().dry_run(true))
//!     .sync_all()
//!     .await?;
//! for sql in report.sql() {
//!     println!("{sql}");
//! }
//! ```

pub mod dependency;
pub mod diff;
pub mod engine;
pub mod error;
pub mod introspect;
pub mod logging;
pub mod memory;
pub mod sql;

pub use dependency::{GUESSED_TARGET_COLUMN, ReferenceTarget, Traversal, resolve_target};
pub use diff::{
    ColumnChange, ColumnPlan, IndexPlan, SkippedChange, create_table, default_matches,
    normalize_default, plan_columns, plan_indexes, type_matches,
};
pub use engine::{Reconciler, SyncOptions, SyncReport};
pub use error::{MigrateResult, MigrationError};
pub use introspect::{Introspector, LiveColumn, LiveIndex, LiveTable, queries};
pub use memory::MemoryCatalog;
pub use sql::{
    ColumnClause, DdlExecutor, DdlStatement, Session, Statement, TableRef, foreign_key_name,
    index_name, quote_ident, quote_literal,
};

/// Commonly used types.
pub mod prelude {
    pub use crate::engine::{Reconciler, SyncOptions, SyncReport};
    pub use crate::error::{MigrateResult, MigrationError};
    pub use crate::introspect::Introspector;
    pub use crate::memory::MemoryCatalog;
    pub use crate::sql::{DdlExecutor, Session};
}
