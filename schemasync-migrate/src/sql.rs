//! DDL generation.
//!
//! Every change the engine makes is first built as a [`DdlStatement`] and
//! then rendered to SQL. Identifiers are always double-quoted and literals go
//! through [`quote_literal`], so nothing declared by the user is spliced into
//! a statement unescaped.

use std::fmt;

use async_trait::async_trait;
use schemasync_schema::validator::MAX_IDENTIFIER_LEN;
use schemasync_schema::{ColumnDefinition, DefaultValue, PgType, ReferentialAction};
use smol_str::SmolStr;

use crate::error::MigrateResult;
use crate::introspect::Introspector;

/// Quote an identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a literal value.
///
/// Plain values are single-quoted. Anything containing a quote, a backslash
/// or a dollar sign is dollar-quoted with a tag drawn fresh for this literal,
/// so the value can never close the quote early.
pub fn quote_literal(value: &str) -> String {
    if !value.contains(['\'', '\\', '$']) {
        return format!("'{}'", value);
    }
    loop {
        let tag = dollar_tag();
        // The tag must first appear where we put it, not inside the value or
        // straddling the value's end.
        let probe = format!("{}{}", value, tag);
        if probe.find(&tag) == Some(value.len()) {
            return format!("{tag}{value}{tag}");
        }
    }
}

fn dollar_tag() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("$q{}$", &id[..12])
}

/// Truncate a generated name to the identifier limit.
fn truncate_ident(mut name: String) -> String {
    if name.len() > MAX_IDENTIFIER_LEN {
        let mut end = MAX_IDENTIFIER_LEN;
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        name.truncate(end);
    }
    name
}

/// Deterministic index name: `<table>_<col1>_..._<colN>_idx`.
///
/// Plain and unique indexes share the scheme, so the name identifies the
/// column list only.
pub fn index_name<S: AsRef<str>>(table: &str, columns: &[S]) -> String {
    let mut name = String::from(table);
    for column in columns {
        name.push('_');
        name.push_str(column.as_ref());
    }
    name.push_str("_idx");
    truncate_ident(name)
}

/// Deterministic foreign key name: `<table>_<column>_fkey`.
pub fn foreign_key_name(table: &str, column: &str) -> String {
    truncate_ident(format!("{}_{}_fkey", table, column))
}

/// A schema-qualified table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    /// Owning schema.
    pub schema: SmolStr,
    /// Table name.
    pub table: SmolStr,
}

impl TableRef {
    /// Create a table reference.
    pub fn new(schema: impl Into<SmolStr>, table: impl Into<SmolStr>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }

    /// Unquoted `schema.table`, for logs and reports.
    pub fn name(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", quote_ident(&self.schema), quote_ident(&self.table))
    }
}

/// One column in a `create table` or `add column` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnClause {
    /// Column name.
    pub name: SmolStr,
    /// Declared type.
    pub ty: PgType,
    /// Inline `primary key`.
    pub primary_key: bool,
    /// `not null`.
    pub not_null: bool,
    /// `default <literal>`.
    pub default: Option<DefaultValue>,
}

impl ColumnClause {
    /// Build the clause for a declared column.
    pub fn new(column: &ColumnDefinition, default: Option<DefaultValue>, primary_key: bool) -> Self {
        Self {
            name: column.name.clone(),
            ty: column.ty.clone(),
            primary_key,
            not_null: column.not_null,
            default,
        }
    }

    fn to_sql(&self) -> String {
        let mut sql = format!("{} {}", quote_ident(&self.name), self.ty.to_sql());
        if self.primary_key {
            sql.push_str(" primary key");
        } else if self.not_null {
            sql.push_str(" not null");
        }
        if let Some(default) = &self.default {
            sql.push_str(" default ");
            sql.push_str(&quote_literal(&default.literal_text()));
        }
        sql
    }
}

/// A structural change, before rendering.
#[derive(Debug, Clone, PartialEq)]
pub enum DdlStatement {
    /// `create schema if not exists`.
    CreateSchema {
        /// Schema to create.
        schema: SmolStr,
    },
    /// `create table`.
    CreateTable {
        /// Table to create.
        table: TableRef,
        /// Column clauses in declaration order.
        columns: Vec<ColumnClause>,
        /// Trailing composite key; empty for inline keys.
        primary_key: Vec<SmolStr>,
    },
    /// `alter table ... add column`.
    AddColumn {
        /// Target table.
        table: TableRef,
        /// Column to add.
        column: ColumnClause,
    },
    /// `alter table ... drop column if exists`.
    DropColumn {
        /// Target table.
        table: TableRef,
        /// Column to drop.
        column: SmolStr,
    },
    /// `alter table ... rename column`.
    RenameColumn {
        /// Target table.
        table: TableRef,
        /// Current name.
        from: SmolStr,
        /// New name.
        to: SmolStr,
    },
    /// `alter table ... alter column ... type ... using`.
    AlterColumnType {
        /// Target table.
        table: TableRef,
        /// Column to change.
        column: SmolStr,
        /// New type.
        ty: PgType,
    },
    /// `alter table ... alter column ... set default`.
    SetDefault {
        /// Target table.
        table: TableRef,
        /// Column to change.
        column: SmolStr,
        /// New default.
        default: DefaultValue,
    },
    /// `alter table ... alter column ... set not null`.
    SetNotNull {
        /// Target table.
        table: TableRef,
        /// Column to change.
        column: SmolStr,
    },
    /// `create [unique] index if not exists`.
    CreateIndex {
        /// Indexed table.
        table: TableRef,
        /// Index name.
        name: String,
        /// Indexed columns, in order.
        columns: Vec<SmolStr>,
        /// Unique index.
        unique: bool,
    },
    /// `drop index if exists`.
    DropIndex {
        /// Indexed table; the index lives in its schema.
        table: TableRef,
        /// Index name.
        name: String,
    },
    /// `alter table ... add constraint ... foreign key`.
    AddForeignKey {
        /// Referencing table.
        table: TableRef,
        /// Constraint name.
        name: String,
        /// Referencing column.
        column: SmolStr,
        /// Referenced table.
        target: TableRef,
        /// Referenced column.
        target_column: SmolStr,
        /// `on update` action.
        on_update: ReferentialAction,
        /// `on delete` action.
        on_delete: ReferentialAction,
    },
    /// `alter table ... drop constraint if exists`.
    DropForeignKey {
        /// Referencing table.
        table: TableRef,
        /// Constraint name.
        name: String,
    },
}

impl DdlStatement {
    /// Render to SQL.
    pub fn to_sql(&self) -> String {
        match self {
            Self::CreateSchema { schema } => {
                format!("create schema if not exists {}", quote_ident(schema))
            }
            Self::CreateTable {
                table,
                columns,
                primary_key,
            } => {
                let mut clauses: Vec<String> = columns.iter().map(ColumnClause::to_sql).collect();
                if !primary_key.is_empty() {
                    let keys: Vec<String> = primary_key.iter().map(|k| quote_ident(k)).collect();
                    clauses.push(format!("primary key ({})", keys.join(", ")));
                }
                format!("create table {} ({})", table, clauses.join(", "))
            }
            Self::AddColumn { table, column } => {
                format!("alter table {} add column {}", table, column.to_sql())
            }
            Self::DropColumn { table, column } => {
                format!(
                    "alter table {} drop column if exists {}",
                    table,
                    quote_ident(column)
                )
            }
            Self::RenameColumn { table, from, to } => format!(
                "alter table {} rename column {} to {}",
                table,
                quote_ident(from),
                quote_ident(to)
            ),
            Self::AlterColumnType { table, column, ty } => {
                let ty = ty.to_sql();
                format!(
                    "alter table {} alter column {} type {} using {}::{}",
                    table,
                    quote_ident(column),
                    ty,
                    quote_ident(column),
                    ty
                )
            }
            Self::SetDefault {
                table,
                column,
                default,
            } => format!(
                "alter table {} alter column {} set default {}",
                table,
                quote_ident(column),
                quote_literal(&default.literal_text())
            ),
            Self::SetNotNull { table, column } => format!(
                "alter table {} alter column {} set not null",
                table,
                quote_ident(column)
            ),
            Self::CreateIndex {
                table,
                name,
                columns,
                unique,
            } => {
                let cols: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
                format!(
                    "create {}index if not exists {} on {} ({})",
                    if *unique { "unique " } else { "" },
                    quote_ident(name),
                    table,
                    cols.join(", ")
                )
            }
            Self::DropIndex { table, name } => format!(
                "drop index if exists {}.{}",
                quote_ident(&table.schema),
                quote_ident(name)
            ),
            Self::AddForeignKey {
                table,
                name,
                column,
                target,
                target_column,
                on_update,
                on_delete,
            } => format!(
                "alter table {} add constraint {} foreign key ({}) references {} ({}) on update {} on delete {}",
                table,
                quote_ident(name),
                quote_ident(column),
                target,
                quote_ident(target_column),
                on_update.as_sql(),
                on_delete.as_sql()
            ),
            Self::DropForeignKey { table, name } => format!(
                "alter table {} drop constraint if exists {}",
                table,
                quote_ident(name)
            ),
        }
    }

    /// Render into an executable statement.
    pub fn render(self) -> Statement {
        let sql = self.to_sql();
        Statement { ddl: self, sql }
    }

    /// The table a statement changes; `None` for schema statements.
    pub fn table(&self) -> Option<&TableRef> {
        match self {
            Self::CreateSchema { .. } => None,
            Self::CreateTable { table, .. }
            | Self::AddColumn { table, .. }
            | Self::DropColumn { table, .. }
            | Self::RenameColumn { table, .. }
            | Self::AlterColumnType { table, .. }
            | Self::SetDefault { table, .. }
            | Self::SetNotNull { table, .. }
            | Self::CreateIndex { table, .. }
            | Self::DropIndex { table, .. }
            | Self::AddForeignKey { table, .. }
            | Self::DropForeignKey { table, .. } => Some(table),
        }
    }

    /// Whether failure of this statement is expected to leave the desired
    /// state in place anyway.
    pub fn is_best_effort(&self) -> bool {
        matches!(self, Self::DropColumn { .. })
    }
}

impl fmt::Display for DdlStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

/// A rendered statement, keeping the structured form alongside the SQL.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// Structured form.
    pub ddl: DdlStatement,
    /// Rendered SQL.
    pub sql: String,
}

/// Runs DDL against a database.
#[async_trait]
pub trait DdlExecutor: Send + Sync {
    /// Execute one statement.
    async fn execute(&self, statement: &Statement) -> MigrateResult<()>;

    /// Name of the connected database.
    async fn database_name(&self) -> MigrateResult<String>;
}

/// A connection that can both read the catalog and run DDL.
pub trait Session: Introspector + DdlExecutor {}

impl<T: Introspector + DdlExecutor + ?Sized> Session for T {}
