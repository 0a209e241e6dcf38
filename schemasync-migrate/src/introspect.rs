//! Live catalog inspection.
//!
//! Metadata is fetched fresh for every table pass and never cached between
//! passes: the tables being reconciled are exactly the ones that change.

use std::collections::HashSet;

use async_trait::async_trait;
use indexmap::IndexMap;
use tracing::debug;

use crate::error::MigrateResult;
use crate::sql::{TableRef, foreign_key_name};

/// A column as reported by `information_schema.columns`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveColumn {
    /// Column name.
    pub name: String,
    /// Data type (e.g. "integer", "character varying", "ARRAY").
    pub data_type: String,
    /// Internal type name (e.g. "int4", "_text").
    pub udt_name: String,
    /// Default expression as stored by the database.
    pub default: Option<String>,
    /// Whether NULL is allowed.
    pub is_nullable: bool,
    /// Declared length for character types.
    pub char_max_length: Option<i32>,
    /// Numeric precision.
    pub numeric_precision: Option<i32>,
    /// Numeric scale.
    pub numeric_scale: Option<i32>,
    /// Generated (computed) column.
    pub is_generated: bool,
}

impl LiveColumn {
    /// Create a nullable column without default or type parameters.
    pub fn new(
        name: impl Into<String>,
        data_type: impl Into<String>,
        udt_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            udt_name: udt_name.into(),
            default: None,
            is_nullable: true,
            char_max_length: None,
            numeric_precision: None,
            numeric_scale: None,
            is_generated: false,
        }
    }

    /// Whether the live type is `char`, `varchar` or `text`.
    pub fn is_string_family(&self) -> bool {
        matches!(
            self.data_type.as_str(),
            "character" | "character varying" | "text"
        )
    }
}

/// A non-primary-key index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveIndex {
    /// Index name.
    pub name: String,
    /// Indexed columns, in order.
    pub columns: Vec<String>,
    /// Unique index.
    pub is_unique: bool,
}

/// Catalog access needed by the reconciler.
///
/// Every method is a single catalog query. Errors are returned as-is: a
/// failing catalog query means the connection or its permissions are
/// unusable, so callers do not retry.
#[async_trait]
pub trait Introspector: Send + Sync {
    /// Internal identifier of a schema, if it exists.
    async fn namespace_oid(&self, schema: &str) -> MigrateResult<Option<u32>>;

    /// Whether a base table exists.
    async fn table_exists(&self, schema: &str, table: &str) -> MigrateResult<bool>;

    /// Columns of a table, in ordinal order.
    async fn columns(&self, schema: &str, table: &str) -> MigrateResult<Vec<LiveColumn>>;

    /// Indexes of a table, excluding the primary key index.
    async fn indexes(&self, schema: &str, table: &str) -> MigrateResult<Vec<LiveIndex>>;

    /// Names of the foreign key constraints on a table.
    async fn foreign_keys(&self, namespace: u32, table: &str) -> MigrateResult<Vec<String>>;
}

/// Everything known about an existing table.
#[derive(Debug, Clone, Default)]
pub struct LiveTable {
    /// Columns by name, in ordinal order.
    pub columns: IndexMap<String, LiveColumn>,
    /// Indexes by name.
    pub indexes: IndexMap<String, LiveIndex>,
    /// Foreign key constraint names.
    pub foreign_keys: HashSet<String>,
}

impl LiveTable {
    /// Fetch a table's metadata, or `None` if the table does not exist.
    pub async fn fetch<I: Introspector + ?Sized>(
        introspector: &I,
        namespace: u32,
        table: &TableRef,
    ) -> MigrateResult<Option<Self>> {
        if !introspector.table_exists(&table.schema, &table.table).await? {
            debug!(table = %table, "Table does not exist");
            return Ok(None);
        }

        let columns = introspector.columns(&table.schema, &table.table).await?;
        let indexes = introspector.indexes(&table.schema, &table.table).await?;
        let foreign_keys = introspector.foreign_keys(namespace, &table.table).await?;

        debug!(
            table = %table,
            columns = columns.len(),
            indexes = indexes.len(),
            foreign_keys = foreign_keys.len(),
            "Fetched live table"
        );

        Ok(Some(Self {
            columns: columns.into_iter().map(|c| (c.name.clone(), c)).collect(),
            indexes: indexes.into_iter().map(|i| (i.name.clone(), i)).collect(),
            foreign_keys: foreign_keys.into_iter().collect(),
        }))
    }

    /// Look up a column.
    pub fn column(&self, name: &str) -> Option<&LiveColumn> {
        self.columns.get(name)
    }

    /// Check if an index exists.
    pub fn has_index(&self, name: &str) -> bool {
        self.indexes.contains_key(name)
    }

    /// Check if a foreign key constraint exists.
    pub fn has_foreign_key(&self, name: &str) -> bool {
        self.foreign_keys.contains(name)
    }

    /// Forget what the database drops along with a column: the indexes
    /// covering it and its foreign key.
    pub fn forget_column(&mut self, table: &str, column: &str) {
        self.indexes
            .retain(|_, index| !index.columns.iter().any(|c| c == column));
        self.foreign_keys.remove(&foreign_key_name(table, column));
    }
}

/// Catalog queries for PostgreSQL.
///
/// Selected values, and parameters compared against information_schema
/// columns, are cast to plain types so neither side has to handle the
/// information_schema domains.
pub mod queries {
    /// Internal identifier of a schema.
    pub const NAMESPACE_OID: &str = r#"
        select oid
        from pg_catalog.pg_namespace
        where nspname = $1
    "#;

    /// Whether a base table exists.
    pub const TABLE_EXISTS: &str = r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema = $1::text
              and table_name = $2::text
              and table_type = 'BASE TABLE'
        )
    "#;

    /// Columns of a table.
    pub const COLUMNS: &str = r#"
        select
            column_name::text,
            data_type::text,
            udt_name::text,
            column_default::text,
            is_nullable::text = 'YES' as is_nullable,
            character_maximum_length::int4,
            numeric_precision::int4,
            numeric_scale::int4,
            is_generated::text = 'ALWAYS' as is_generated
        from information_schema.columns
        where table_schema = $1::text and table_name = $2::text
        order by ordinal_position
    "#;

    /// Non-primary-key indexes of a table.
    pub const INDEXES: &str = r#"
        select
            i.relname::text as index_name,
            array_agg(a.attname::text order by array_position(ix.indkey::int2[], a.attnum)) as columns,
            ix.indisunique as is_unique
        from pg_catalog.pg_index ix
        join pg_catalog.pg_class i on i.oid = ix.indexrelid
        join pg_catalog.pg_class t on t.oid = ix.indrelid
        join pg_catalog.pg_namespace n on n.oid = t.relnamespace
        join pg_catalog.pg_attribute a on a.attrelid = t.oid and a.attnum = any(ix.indkey)
        where n.nspname = $1 and t.relname = $2 and not ix.indisprimary
        group by i.relname, ix.indisunique
        order by i.relname
    "#;

    /// Foreign key constraint names on a table, within a namespace.
    pub const FOREIGN_KEYS: &str = r#"
        select c.conname::text
        from pg_catalog.pg_constraint c
        join pg_catalog.pg_class t on t.oid = c.conrelid
        where c.connamespace = $1 and c.contype = 'f' and t.relname = $2
        order by c.conname
    "#;

    /// Name of the connected database.
    pub const DATABASE_NAME: &str = "select current_database()::text";
}
