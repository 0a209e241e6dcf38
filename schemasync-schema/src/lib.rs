//! # schemasync-schema
//!
//! Declared table structure for schemasync.
//!
//! This crate provides:
//! - Table and column declarations, written in code or deserialized from TOML
//! - Normalization into a validated [`TableDescriptor`]
//! - The parsed column type model ([`PgType`])
//! - An explicit [`ModelRegistry`] of descriptors keyed by model name
//! - Configuration parser for `schemasync.toml` files
//!
//! ## Example
//!
//! ```rust,ignore
//! use schemasync_schema::{ColumnDeclaration, ModelRegistry, TableDeclaration};
//!
//! let mut registry = ModelRegistry::new();
//! registry.register(
//!     TableDeclaration::new("user")
//!         .primary_key("id")
//!         .column("id", ColumnDeclaration::new("varchar(12)"))
//!         .column("age", ColumnDeclaration::new("integer").default(18)),
//! )?;
//! ```

pub mod column;
pub mod config;
pub mod error;
pub mod registry;
pub mod table;
pub mod types;
pub mod validator;

pub use column::{
    ColumnDeclaration, ColumnDefinition, DefaultValue, ForeignKeyRef, ReferentialAction,
    TimestampRole,
};
pub use config::{DatabaseConfig, PoolConfig, SchemasyncConfig, SyncConfig};
pub use error::{SchemaError, SchemaResult};
pub use registry::ModelRegistry;
pub use table::{
    DEFAULT_RANDOM_ID_LENGTH, DEFAULT_SCHEMA, IndexSpec, PrimaryKey, PrimaryKeyStrategy,
    TableDeclaration, TableDescriptor,
};
pub use types::{BaseType, PgType, TypeParams};
pub use validator::{MAX_IDENTIFIER_LEN, ValidationRule, ValueValidator, check_column_name};
