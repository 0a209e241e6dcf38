//! In-memory catalog for tests and offline planning.
//!
//! [`MemoryCatalog`] implements both halves of a [`Session`](crate::sql::Session):
//! it answers catalog lookups from its own tables and applies executed
//! statements to them the way PostgreSQL would, including the errors
//! PostgreSQL raises for impossible changes.

use std::collections::HashMap;

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use schemasync_schema::{DefaultValue, PgType, TypeParams};

use crate::error::{MigrateResult, MigrationError};
use crate::introspect::{Introspector, LiveColumn, LiveIndex, LiveTable};
use crate::sql::{ColumnClause, DdlExecutor, DdlStatement, Statement, TableRef};

const PUBLIC_NAMESPACE: u32 = 2200;

#[derive(Debug, Clone, Default)]
struct MemoryTable {
    columns: IndexMap<String, LiveColumn>,
    indexes: IndexMap<String, LiveIndex>,
    /// Constraint name to referencing column.
    foreign_keys: IndexMap<String, String>,
}

#[derive(Debug)]
struct CatalogState {
    database: String,
    namespaces: HashMap<String, u32>,
    next_oid: u32,
    tables: IndexMap<(String, String), MemoryTable>,
    statements: Vec<String>,
    lookups: Vec<String>,
    failures: Vec<String>,
    disconnected: bool,
}

impl Default for CatalogState {
    fn default() -> Self {
        Self {
            database: "memory".to_string(),
            namespaces: HashMap::from([("public".to_string(), PUBLIC_NAMESPACE)]),
            next_oid: 16384,
            tables: IndexMap::new(),
            statements: Vec::new(),
            lookups: Vec::new(),
            failures: Vec::new(),
            disconnected: false,
        }
    }
}

/// A catalog held in memory.
///
/// Starts with an empty `public` schema.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    state: Mutex<CatalogState>,
}

impl MemoryCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the reported database name.
    pub fn with_database_name(self, name: impl Into<String>) -> Self {
        self.state.lock().database = name.into();
        self
    }

    /// Make every statement containing `fragment` fail.
    pub fn fail_on(&self, fragment: impl Into<String>) {
        self.state.lock().failures.push(fragment.into());
    }

    /// Make every later call fail with a connection error.
    pub fn disconnect(&self) {
        self.state.lock().disconnected = true;
    }

    /// SQL of every statement applied so far.
    pub fn statements(&self) -> Vec<String> {
        self.state.lock().statements.clone()
    }

    /// Forget applied statements.
    pub fn clear_statements(&self) {
        self.state.lock().statements.clear();
    }

    /// Catalog lookups made so far, as `"<lookup> <subject>"`.
    pub fn lookups(&self) -> Vec<String> {
        self.state.lock().lookups.clone()
    }

    /// Forget recorded lookups.
    pub fn clear_lookups(&self) {
        self.state.lock().lookups.clear();
    }

    /// Create a schema directly.
    pub fn create_schema(&self, schema: &str) {
        let mut state = self.state.lock();
        state.ensure_namespace(schema);
    }

    /// Seed a table directly, creating its schema if needed.
    pub fn create_table(&self, schema: &str, table: &str, columns: Vec<LiveColumn>) {
        let mut state = self.state.lock();
        state.ensure_namespace(schema);
        state.tables.insert(
            (schema.to_string(), table.to_string()),
            MemoryTable {
                columns: columns.into_iter().map(|c| (c.name.clone(), c)).collect(),
                ..Default::default()
            },
        );
    }

    /// Seed an index on an existing table.
    pub fn add_index(&self, schema: &str, table: &str, index: LiveIndex) {
        let mut state = self.state.lock();
        if let Some(t) = state.tables.get_mut(&(schema.to_string(), table.to_string())) {
            t.indexes.insert(index.name.clone(), index);
        }
    }

    /// Snapshot of a table.
    pub fn table(&self, schema: &str, table: &str) -> Option<LiveTable> {
        let state = self.state.lock();
        state
            .tables
            .get(&(schema.to_string(), table.to_string()))
            .map(|t| LiveTable {
                columns: t.columns.clone(),
                indexes: t.indexes.clone(),
                foreign_keys: t.foreign_keys.keys().cloned().collect(),
            })
    }

    /// Check if a table exists.
    pub fn has_table(&self, schema: &str, table: &str) -> bool {
        self.state
            .lock()
            .tables
            .contains_key(&(schema.to_string(), table.to_string()))
    }

    /// Index names of a table, sorted.
    pub fn index_names(&self, schema: &str, table: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .table(schema, table)
            .map(|t| t.indexes.into_keys().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Foreign key names of a table, sorted.
    pub fn foreign_key_names(&self, schema: &str, table: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .table(schema, table)
            .map(|t| t.foreign_keys.into_iter().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Apply a statement without recording it.
    pub fn apply(&self, ddl: &DdlStatement) -> MigrateResult<()> {
        self.state
            .lock()
            .apply(ddl)
            .map_err(|message| MigrationError::statement(ddl.to_sql(), message))
    }

    fn lookup(&self, what: String) -> MigrateResult<()> {
        let mut state = self.state.lock();
        if state.disconnected {
            return Err(MigrationError::connection("connection closed"));
        }
        state.lookups.push(what);
        Ok(())
    }
}

impl CatalogState {
    fn ensure_namespace(&mut self, schema: &str) -> u32 {
        if let Some(oid) = self.namespaces.get(schema) {
            return *oid;
        }
        let oid = self.next_oid;
        self.next_oid += 1;
        self.namespaces.insert(schema.to_string(), oid);
        oid
    }

    fn table_mut(&mut self, table: &TableRef) -> Result<&mut MemoryTable, String> {
        self.tables
            .get_mut(&(table.schema.to_string(), table.table.to_string()))
            .ok_or_else(|| format!("relation {} does not exist", table))
    }

    fn apply(&mut self, ddl: &DdlStatement) -> Result<(), String> {
        match ddl {
            DdlStatement::CreateSchema { schema } => {
                self.ensure_namespace(schema);
            }
            DdlStatement::CreateTable {
                table,
                columns,
                primary_key,
            } => {
                if !self.namespaces.contains_key(table.schema.as_str()) {
                    return Err(format!("schema \"{}\" does not exist", table.schema));
                }
                let key = (table.schema.to_string(), table.table.to_string());
                if self.tables.contains_key(&key) {
                    return Err(format!("relation {} already exists", table));
                }
                let mut created = MemoryTable::default();
                for clause in columns {
                    let mut column = live_column(&table.table, clause);
                    if primary_key.contains(&clause.name) {
                        column.is_nullable = false;
                    }
                    created.columns.insert(column.name.clone(), column);
                }
                self.tables.insert(key, created);
            }
            DdlStatement::AddColumn { table, column } => {
                let t = self.table_mut(table)?;
                if t.columns.contains_key(column.name.as_str()) {
                    return Err(format!("column \"{}\" already exists", column.name));
                }
                let live = live_column(&table.table, column);
                t.columns.insert(live.name.clone(), live);
            }
            DdlStatement::DropColumn { table, column } => {
                let t = self.table_mut(table)?;
                if t.columns.shift_remove(column.as_str()).is_some() {
                    t.indexes
                        .retain(|_, index| !index.columns.iter().any(|c| c.as_str() == column.as_str()));
                    t.foreign_keys.retain(|_, c| c.as_str() != column.as_str());
                }
            }
            DdlStatement::RenameColumn { table, from, to } => {
                let t = self.table_mut(table)?;
                if t.columns.contains_key(to.as_str()) {
                    return Err(format!("column \"{}\" already exists", to));
                }
                let Some(index) = t.columns.get_index_of(from.as_str()) else {
                    return Err(format!("column \"{}\" does not exist", from));
                };
                t.columns = t
                    .columns
                    .drain(..)
                    .enumerate()
                    .map(|(i, (name, mut column))| {
                        if i == index {
                            column.name = to.to_string();
                            (to.to_string(), column)
                        } else {
                            (name, column)
                        }
                    })
                    .collect();
                for live in t.indexes.values_mut() {
                    for c in live.columns.iter_mut() {
                        if c.as_str() == from.as_str() {
                            *c = to.to_string();
                        }
                    }
                }
                for c in t.foreign_keys.values_mut() {
                    if c.as_str() == from.as_str() {
                        *c = to.to_string();
                    }
                }
            }
            DdlStatement::AlterColumnType { table, column, ty } => {
                let t = self.table_mut(table)?;
                let live = t
                    .columns
                    .get_mut(column.as_str())
                    .ok_or_else(|| format!("column \"{}\" does not exist", column))?;
                if live.is_string_family() && !ty.is_string_family() {
                    return Err(format!(
                        "column \"{}\" cannot be cast automatically to type {}",
                        column, ty
                    ));
                }
                set_type(live, ty);
            }
            DdlStatement::SetDefault {
                table,
                column,
                default,
            } => {
                let t = self.table_mut(table)?;
                let live = t
                    .columns
                    .get_mut(column.as_str())
                    .ok_or_else(|| format!("column \"{}\" does not exist", column))?;
                live.default = Some(stored_default(default, live));
            }
            DdlStatement::SetNotNull { table, column } => {
                let t = self.table_mut(table)?;
                let live = t
                    .columns
                    .get_mut(column.as_str())
                    .ok_or_else(|| format!("column \"{}\" does not exist", column))?;
                live.is_nullable = false;
            }
            DdlStatement::CreateIndex {
                table,
                name,
                columns,
                unique,
            } => {
                let schema = table.schema.as_str();
                if self
                    .tables
                    .iter()
                    .any(|((s, _), t)| s == schema && t.indexes.contains_key(name))
                {
                    return Ok(());
                }
                let t = self.table_mut(table)?;
                if let Some(missing) = columns.iter().find(|c| !t.columns.contains_key(c.as_str())) {
                    return Err(format!("column \"{}\" does not exist", missing));
                }
                t.indexes.insert(
                    name.clone(),
                    LiveIndex {
                        name: name.clone(),
                        columns: columns.iter().map(|c| c.to_string()).collect(),
                        is_unique: *unique,
                    },
                );
            }
            DdlStatement::DropIndex { table, name } => {
                let schema = table.schema.as_str();
                for ((s, _), t) in self.tables.iter_mut() {
                    if s == schema {
                        t.indexes.shift_remove(name);
                    }
                }
            }
            DdlStatement::AddForeignKey {
                table,
                name,
                column,
                target,
                target_column,
                ..
            } => {
                let target_key = (target.schema.to_string(), target.table.to_string());
                let Some(referenced) = self.tables.get(&target_key) else {
                    return Err(format!("relation {} does not exist", target));
                };
                if !referenced.columns.contains_key(target_column.as_str()) {
                    return Err(format!(
                        "column \"{}\" referenced in foreign key constraint does not exist",
                        target_column
                    ));
                }
                let t = self.table_mut(table)?;
                if !t.columns.contains_key(column.as_str()) {
                    return Err(format!("column \"{}\" does not exist", column));
                }
                if t.foreign_keys.contains_key(name) {
                    return Err(format!("constraint \"{}\" already exists", name));
                }
                t.foreign_keys.insert(name.clone(), column.to_string());
            }
            DdlStatement::DropForeignKey { table, name } => {
                let t = self.table_mut(table)?;
                t.foreign_keys.shift_remove(name);
            }
        }
        Ok(())
    }
}

fn set_type(live: &mut LiveColumn, ty: &PgType) {
    let storage = ty.storage_type();
    if storage.array {
        live.data_type = "ARRAY".to_string();
        live.udt_name = format!("_{}", storage.base.udt_name());
    } else {
        live.data_type = storage.base.catalog_name().to_string();
        live.udt_name = storage.base.udt_name().to_string();
    }
    live.char_max_length = None;
    live.numeric_precision = None;
    live.numeric_scale = None;
    match storage.params {
        TypeParams::None => {}
        TypeParams::Length(length) => live.char_max_length = i32::try_from(length).ok(),
        TypeParams::Precision { precision, scale } => {
            live.numeric_precision = i32::try_from(precision).ok();
            live.numeric_scale = i32::try_from(scale).ok();
        }
    }
}

/// A default as the catalog would report it: a quoted literal cast to the
/// column type.
fn stored_default(default: &DefaultValue, live: &LiveColumn) -> String {
    let ty = if live.data_type == "ARRAY" {
        format!("{}[]", live.udt_name.trim_start_matches('_'))
    } else {
        live.data_type.clone()
    };
    format!("'{}'::{}", default.literal_text().replace('\'', "''"), ty)
}

fn live_column(table: &str, clause: &ColumnClause) -> LiveColumn {
    let mut live = LiveColumn::new(clause.name.as_str(), "", "");
    set_type(&mut live, &clause.ty);
    live.is_nullable = !(clause.not_null || clause.primary_key);
    live.default = if clause.ty.base.is_serial() {
        Some(format!("nextval('{}_{}_seq'::regclass)", table, clause.name))
    } else {
        clause.default.as_ref().map(|d| stored_default(d, &live))
    };
    live
}

#[async_trait]
impl Introspector for MemoryCatalog {
    async fn namespace_oid(&self, schema: &str) -> MigrateResult<Option<u32>> {
        self.lookup(format!("namespace_oid {}", schema))?;
        Ok(self.state.lock().namespaces.get(schema).copied())
    }

    async fn table_exists(&self, schema: &str, table: &str) -> MigrateResult<bool> {
        self.lookup(format!("table_exists {}.{}", schema, table))?;
        Ok(self.has_table(schema, table))
    }

    async fn columns(&self, schema: &str, table: &str) -> MigrateResult<Vec<LiveColumn>> {
        self.lookup(format!("columns {}.{}", schema, table))?;
        Ok(self
            .table(schema, table)
            .map(|t| t.columns.into_values().collect())
            .unwrap_or_default())
    }

    async fn indexes(&self, schema: &str, table: &str) -> MigrateResult<Vec<LiveIndex>> {
        self.lookup(format!("indexes {}.{}", schema, table))?;
        Ok(self
            .table(schema, table)
            .map(|t| t.indexes.into_values().collect())
            .unwrap_or_default())
    }

    async fn foreign_keys(&self, namespace: u32, table: &str) -> MigrateResult<Vec<String>> {
        self.lookup(format!("foreign_keys {}", table))?;
        let state = self.state.lock();
        let Some(schema) = state
            .namespaces
            .iter()
            .find(|(_, oid)| **oid == namespace)
            .map(|(name, _)| name.clone())
        else {
            return Ok(Vec::new());
        };
        Ok(state
            .tables
            .get(&(schema, table.to_string()))
            .map(|t| t.foreign_keys.keys().cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl DdlExecutor for MemoryCatalog {
    async fn execute(&self, statement: &Statement) -> MigrateResult<()> {
        let mut state = self.state.lock();
        if state.disconnected {
            return Err(MigrationError::connection("connection closed"));
        }
        if state.failures.iter().any(|f| statement.sql.contains(f.as_str())) {
            return Err(MigrationError::statement(
                statement.sql.clone(),
                "injected failure",
            ));
        }
        state
            .apply(&statement.ddl)
            .map_err(|message| MigrationError::statement(statement.sql.clone(), message))?;
        state.statements.push(statement.sql.clone());
        Ok(())
    }

    async fn database_name(&self) -> MigrateResult<String> {
        self.lookup("database_name".to_string())?;
        Ok(self.state.lock().database.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use schemasync_schema::{ColumnDeclaration, ColumnDefinition};

    fn users() -> TableRef {
        TableRef::new("public", "user")
    }

    fn clause(name: &str, decl: ColumnDeclaration) -> ColumnClause {
        let column = ColumnDefinition::from_declaration("user", name, decl).unwrap();
        let default = column.effective_default();
        ColumnClause::new(&column, default, false)
    }

    async fn run(catalog: &MemoryCatalog, ddl: DdlStatement) -> MigrateResult<()> {
        catalog.execute(&ddl.render()).await
    }

    #[tokio::test]
    async fn test_create_table_reports_catalog_shape() {
        let catalog = MemoryCatalog::new();
        run(
            &catalog,
            DdlStatement::CreateTable {
                table: users(),
                columns: vec![
                    ColumnClause::new(
                        &ColumnDefinition::from_declaration("user", "id", ColumnDeclaration::new("serial"))
                            .unwrap(),
                        None,
                        true,
                    ),
                    clause("name", ColumnDeclaration::new("varchar(40)")),
                    clause("tags", ColumnDeclaration::new("text[]").nullable()),
                ],
                primary_key: vec![],
            },
        )
        .await
        .unwrap();

        let columns = catalog.columns("public", "user").await.unwrap();
        assert_eq!(columns[0].data_type, "integer");
        assert_eq!(
            columns[0].default.as_deref(),
            Some("nextval('user_id_seq'::regclass)")
        );
        assert!(!columns[0].is_nullable);
        assert_eq!(columns[1].data_type, "character varying");
        assert_eq!(columns[1].char_max_length, Some(40));
        assert_eq!(columns[1].default.as_deref(), Some("''::character varying"));
        assert_eq!(columns[2].data_type, "ARRAY");
        assert_eq!(columns[2].udt_name, "_text");
        assert_eq!(columns[2].default.as_deref(), Some("'{}'::text[]"));
        assert!(columns[2].is_nullable);
        assert_eq!(
            catalog.lookups(),
            vec!["columns public.user".to_string()]
        );
    }

    #[tokio::test]
    async fn test_string_to_number_cast_fails() {
        let catalog = MemoryCatalog::new();
        catalog.create_table(
            "public",
            "user",
            vec![LiveColumn::new("score", "text", "text")],
        );
        let err = run(
            &catalog,
            DdlStatement::AlterColumnType {
                table: users(),
                column: "score".into(),
                ty: PgType::parse("integer").unwrap(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, MigrationError::Statement { .. }));
        assert!(catalog.statements().is_empty());
    }

    #[tokio::test]
    async fn test_drop_column_cascades() {
        let catalog = MemoryCatalog::new();
        catalog.create_table(
            "public",
            "user",
            vec![
                LiveColumn::new("id", "integer", "int4"),
                LiveColumn::new("email", "text", "text"),
            ],
        );
        catalog.add_index(
            "public",
            "user",
            LiveIndex {
                name: "user_email_idx".into(),
                columns: vec!["email".into()],
                is_unique: false,
            },
        );
        run(
            &catalog,
            DdlStatement::DropColumn {
                table: users(),
                column: "email".into(),
            },
        )
        .await
        .unwrap();
        assert!(catalog.index_names("public", "user").is_empty());

        // Dropping again is a no-op thanks to `if exists`.
        run(
            &catalog,
            DdlStatement::DropColumn {
                table: users(),
                column: "email".into(),
            },
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_rename_keeps_position() {
        let catalog = MemoryCatalog::new();
        catalog.create_table(
            "public",
            "user",
            vec![
                LiveColumn::new("id", "integer", "int4"),
                LiveColumn::new("nick", "text", "text"),
                LiveColumn::new("age", "integer", "int4"),
            ],
        );
        catalog
            .apply(&DdlStatement::RenameColumn {
                table: users(),
                from: "nick".into(),
                to: "nickname".into(),
            })
            .unwrap();
        let live = catalog.table("public", "user").unwrap();
        let names: Vec<&str> = live.columns.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["id", "nickname", "age"]);
    }

    #[tokio::test]
    async fn test_schemas_and_foreign_keys() {
        let catalog = MemoryCatalog::new().with_database_name("app");
        assert_eq!(catalog.namespace_oid("public").await.unwrap(), Some(2200));
        assert_eq!(catalog.namespace_oid("audit").await.unwrap(), None);
        catalog.create_schema("audit");
        let audit = catalog.namespace_oid("audit").await.unwrap().unwrap();
        assert_ne!(audit, 2200);

        catalog.create_table("audit", "log", vec![LiveColumn::new("id", "integer", "int4")]);
        catalog.create_table(
            "audit",
            "entry",
            vec![LiveColumn::new("log_id", "integer", "int4")],
        );
        catalog
            .apply(&DdlStatement::AddForeignKey {
                table: TableRef::new("audit", "entry"),
                name: "entry_log_id_fkey".into(),
                column: "log_id".into(),
                target: TableRef::new("audit", "log"),
                target_column: "id".into(),
                on_update: Default::default(),
                on_delete: Default::default(),
            })
            .unwrap();
        assert_eq!(
            catalog.foreign_keys(audit, "entry").await.unwrap(),
            vec!["entry_log_id_fkey".to_string()]
        );
        assert!(catalog.foreign_keys(2200, "entry").await.unwrap().is_empty());
        assert_eq!(catalog.database_name().await.unwrap(), "app");
    }

    #[tokio::test]
    async fn test_disconnect_and_injected_failures() {
        let catalog = MemoryCatalog::new();
        catalog.fail_on("create schema");
        let err = run(
            &catalog,
            DdlStatement::CreateSchema {
                schema: "audit".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(!err.is_connection());

        catalog.disconnect();
        let err = catalog.table_exists("public", "user").await.unwrap_err();
        assert!(err.is_connection());
    }
}
