//! Declared-versus-live comparison.
//!
//! Planning is pure: it reads a [`TableDescriptor`] and a [`LiveTable`] and
//! returns the statements that would converge them. The engine decides how
//! to execute them and what to do when one fails.

use std::collections::HashSet;
use std::fmt;

use schemasync_schema::{
    ColumnDefinition, DefaultValue, PgType, TableDescriptor, TypeParams,
};
use smol_str::SmolStr;
use tracing::{debug, error, trace, warn};

use crate::engine::SyncOptions;
use crate::introspect::{LiveColumn, LiveTable};
use crate::sql::{ColumnClause, DdlStatement, TableRef, index_name};

/// A change that was not made, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedChange {
    /// Qualified table name.
    pub table: String,
    /// Column, index or constraint concerned.
    pub subject: String,
    /// Reason the change was skipped.
    pub reason: String,
}

impl SkippedChange {
    /// Create a skipped change record.
    pub fn new(table: &TableRef, subject: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            table: table.name(),
            subject: subject.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for SkippedChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.table, self.subject, self.reason)
    }
}

/// The statements for one column, executed in order.
///
/// A failure stops the remaining statements of the same column only.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnChange {
    /// Column concerned.
    pub column: SmolStr,
    /// Statements in execution order.
    pub statements: Vec<DdlStatement>,
    /// The column's type changes (or the column is rebuilt).
    pub retypes: bool,
}

impl ColumnChange {
    fn new(column: &SmolStr, statements: Vec<DdlStatement>) -> Self {
        Self {
            column: column.clone(),
            statements,
            retypes: false,
        }
    }

    /// Whether every statement is a drop whose failure can be ignored.
    pub fn is_best_effort(&self) -> bool {
        self.statements.iter().all(DdlStatement::is_best_effort)
    }
}

/// Column changes for an existing table.
#[derive(Debug, Clone, Default)]
pub struct ColumnPlan {
    /// Per-column changes, declared columns first, then unlisted drops.
    pub changes: Vec<ColumnChange>,
    /// Changes refused during planning.
    pub skipped: Vec<SkippedChange>,
    /// Live columns renamed away in this pass.
    pub renamed: HashSet<String>,
}

impl ColumnPlan {
    /// Check if nothing needs to change.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Index changes for a table.
#[derive(Debug, Clone, Default)]
pub struct IndexPlan {
    /// Indexes to create. A live index of the same name but another shape is
    /// dropped first, in the same group.
    pub create: Vec<Vec<DdlStatement>>,
    /// Live indexes outside the keep-set.
    pub drop: Vec<DdlStatement>,
    /// Index specs that were refused.
    pub skipped: Vec<SkippedChange>,
    /// Names of every index that should exist.
    pub keep: HashSet<String>,
}

/// The default a column is created with.
///
/// Key columns only get an explicit default; every other column falls back
/// to the inferred one.
pub fn declared_default(desc: &TableDescriptor, column: &ColumnDefinition) -> Option<DefaultValue> {
    if desc.is_key_column(&column.name) {
        column.default.clone()
    } else {
        column.effective_default()
    }
}

/// Compare a declared type with a live column.
///
/// Unparameterized types compare by base type only. Character types compare
/// their length and numeric types their precision and scale. Arrays compare
/// the element type.
pub fn type_matches(declared: &PgType, live: &LiveColumn) -> bool {
    let storage = declared.storage_type();
    if storage.array {
        return live.data_type == "ARRAY"
            && live.udt_name.strip_prefix('_') == Some(storage.base.udt_name());
    }
    if live.data_type != storage.base.catalog_name() {
        return false;
    }
    match storage.params {
        TypeParams::None => true,
        TypeParams::Length(length) => live.char_max_length == i32::try_from(length).ok(),
        TypeParams::Precision { precision, scale } => {
            live.numeric_precision == i32::try_from(precision).ok()
                && live.numeric_scale == i32::try_from(scale).ok()
        }
    }
}

/// Reduce a stored default expression to its literal text.
///
/// Handles `'text'::type` casts, doubled quotes and wrapping parentheses.
/// Returns `None` for anything that is not a plain literal, such as function
/// calls or operators.
pub fn normalize_default(expr: &str) -> Option<String> {
    let text = strip_parens(expr.trim());

    if let Some(rest) = text.strip_prefix('\'') {
        let mut value = String::new();
        let mut end = None;
        let mut chars = rest.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            if c != '\'' {
                value.push(c);
            } else if matches!(chars.peek(), Some((_, '\''))) {
                value.push('\'');
                chars.next();
            } else {
                end = Some(i + 1);
                break;
            }
        }
        let tail = rest[end?..].trim();
        let only_casts = tail.is_empty()
            || (tail.starts_with("::")
                && tail
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || " _:[](),\".".contains(c)));
        return only_casts.then_some(value);
    }

    let bare = strip_parens(text.split("::").next().unwrap_or(text).trim());
    if bare == "true" || bare == "false" || bare.parse::<f64>().is_ok() {
        Some(bare.to_string())
    } else {
        None
    }
}

fn strip_parens(mut text: &str) -> &str {
    while let Some(inner) = text.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
        text = inner.trim();
    }
    text
}

/// Check whether a live default already equals the declared literal.
pub fn default_matches(declared: &DefaultValue, live: Option<&str>) -> bool {
    let Some(live) = live.and_then(normalize_default) else {
        return false;
    };
    let expected = declared.literal_text();
    match declared {
        DefaultValue::Array(_) => expected.replace('"', "") == live.replace('"', ""),
        DefaultValue::Integer(_) | DefaultValue::Float(_) => {
            expected == live
                || matches!(
                    (expected.parse::<f64>(), live.parse::<f64>()),
                    (Ok(a), Ok(b)) if a == b
                )
        }
        _ => expected == live,
    }
}

/// Build the `create table` statement for a table that does not exist.
pub fn create_table(desc: &TableDescriptor, table: &TableRef) -> DdlStatement {
    let columns = desc
        .active_columns()
        .map(|c| ColumnClause::new(c, declared_default(desc, c), desc.is_single_key(&c.name)))
        .collect();
    let primary_key = if desc.has_composite_key() {
        desc.primary_key.clone()
    } else {
        Vec::new()
    };
    DdlStatement::CreateTable {
        table: table.clone(),
        columns,
        primary_key,
    }
}

/// Plan column changes for an existing table.
///
/// Per declared column, in order of precedence: ignore, drop, rename, add,
/// type, default, nullability. Unlisted live columns are dropped afterwards
/// when the options ask for it.
pub fn plan_columns(
    desc: &TableDescriptor,
    table: &TableRef,
    live: &LiveTable,
    options: &SyncOptions,
) -> ColumnPlan {
    let mut plan = ColumnPlan::default();

    for column in desc.columns.values() {
        if column.ignore {
            trace!(table = %table, column = %column.name, "Ignoring column");
            continue;
        }

        if column.drop {
            if live.column(&column.name).is_some() {
                plan.changes.push(ColumnChange::new(
                    &column.name,
                    vec![DdlStatement::DropColumn {
                        table: table.clone(),
                        column: column.name.clone(),
                    }],
                ));
            }
            continue;
        }

        let mut statements = Vec::new();
        let mut current = live.column(&column.name);

        if current.is_none() {
            if let Some(old) = &column.old_name {
                if let Some(source) = live.column(old) {
                    debug!(table = %table, from = %old, to = %column.name, "Renaming column");
                    statements.push(DdlStatement::RenameColumn {
                        table: table.clone(),
                        from: old.clone(),
                        to: column.name.clone(),
                    });
                    plan.renamed.insert(old.to_string());
                    current = Some(source);
                }
            }
        }

        let clause = || ColumnClause::new(column, declared_default(desc, column), false);

        let Some(current) = current else {
            statements.push(DdlStatement::AddColumn {
                table: table.clone(),
                column: clause(),
            });
            plan.changes.push(ColumnChange::new(&column.name, statements));
            continue;
        };

        if column.type_lock || column.ty.is_unknown() {
            if !statements.is_empty() {
                plan.changes.push(ColumnChange::new(&column.name, statements));
            }
            continue;
        }

        let mut retypes = false;
        if !type_matches(&column.ty, current) {
            if current.is_string_family() && !column.ty.is_string_family() {
                if column.force || options.force {
                    warn!(
                        table = %table,
                        column = %column.name,
                        from = %current.data_type,
                        to = %column.ty,
                        "Rebuilding column, existing values are lost"
                    );
                    statements.push(DdlStatement::DropColumn {
                        table: table.clone(),
                        column: column.name.clone(),
                    });
                    statements.push(DdlStatement::AddColumn {
                        table: table.clone(),
                        column: clause(),
                    });
                    plan.changes.push(ColumnChange {
                        column: column.name.clone(),
                        statements,
                        retypes: true,
                    });
                } else {
                    error!(
                        table = %table,
                        column = %column.name,
                        from = %current.data_type,
                        to = %column.ty,
                        "Cannot convert column type without force"
                    );
                    plan.skipped.push(SkippedChange::new(
                        table,
                        column.name.as_str(),
                        format!(
                            "cannot convert {} to {} without force",
                            current.data_type, column.ty
                        ),
                    ));
                    if !statements.is_empty() {
                        plan.changes.push(ColumnChange::new(&column.name, statements));
                    }
                }
                continue;
            }

            statements.push(DdlStatement::AlterColumnType {
                table: table.clone(),
                column: column.name.clone(),
                ty: column.ty.storage_type(),
            });
            retypes = true;
        }

        if let Some(default) = declared_default(desc, column) {
            if !default_matches(&default, current.default.as_deref()) {
                statements.push(DdlStatement::SetDefault {
                    table: table.clone(),
                    column: column.name.clone(),
                    default,
                });
            }
        }

        if column.not_null && current.is_nullable {
            statements.push(DdlStatement::SetNotNull {
                table: table.clone(),
                column: column.name.clone(),
            });
        }

        if !statements.is_empty() {
            plan.changes.push(ColumnChange {
                column: column.name.clone(),
                statements,
                retypes,
            });
        }
    }

    if options.drops_unlisted() {
        for current in live.columns.values() {
            if desc.columns.contains_key(current.name.as_str())
                || plan.renamed.contains(&current.name)
            {
                continue;
            }
            if current.is_generated {
                debug!(table = %table, column = %current.name, "Keeping generated column");
                continue;
            }
            warn!(table = %table, column = %current.name, "Dropping unlisted column");
            let name = SmolStr::new(&current.name);
            plan.changes.push(ColumnChange::new(
                &name,
                vec![DdlStatement::DropColumn {
                    table: table.clone(),
                    column: name.clone(),
                }],
            ));
        }
    }

    plan
}

/// Plan index changes.
///
/// Plain and unique specs on the same columns share one name; the unique
/// spec wins. `live` is `None` for a table created in this pass; nothing is
/// swept then.
pub fn plan_indexes(
    desc: &TableDescriptor,
    table: &TableRef,
    live: Option<&LiveTable>,
) -> IndexPlan {
    let mut plan = IndexPlan::default();

    let specs = desc
        .unique
        .iter()
        .map(|spec| (spec, true))
        .chain(desc.indexes.iter().map(|spec| (spec, false)));

    for (spec, unique) in specs {
        let name = index_name(&desc.table, &spec.columns);
        if spec.removed {
            continue;
        }

        if let Some(missing) = spec
            .columns
            .iter()
            .find(|c| !desc.column(c).is_some_and(|c| !c.drop))
        {
            error!(table = %table, index = %name, column = %missing, "Index references an undeclared column");
            plan.skipped.push(SkippedChange::new(
                table,
                name,
                format!("column `{}` is not declared", missing),
            ));
            continue;
        }

        if unique && spec.columns == desc.primary_key {
            debug!(table = %table, index = %name, "Unique index duplicates the primary key");
            continue;
        }

        if !plan.keep.insert(name.clone()) {
            trace!(table = %table, index = %name, "Index already planned");
            continue;
        }

        let mut group = Vec::new();
        if let Some(current) = live.and_then(|live| live.indexes.get(&name)) {
            let same_columns = current
                .columns
                .iter()
                .map(String::as_str)
                .eq(spec.columns.iter().map(SmolStr::as_str));
            if same_columns && current.is_unique == unique {
                continue;
            }
            debug!(table = %table, index = %name, unique, "Replacing index with a different shape");
            group.push(DdlStatement::DropIndex {
                table: table.clone(),
                name: name.clone(),
            });
        }
        group.push(DdlStatement::CreateIndex {
            table: table.clone(),
            name,
            columns: spec.columns.clone(),
            unique,
        });
        plan.create.push(group);
    }

    if let Some(live) = live {
        for name in live.indexes.keys() {
            if !plan.keep.contains(name) {
                debug!(table = %table, index = %name, "Index is no longer declared");
                plan.drop.push(DdlStatement::DropIndex {
                    table: table.clone(),
                    name: name.clone(),
                });
            }
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::introspect::LiveIndex;
    use pretty_assertions::assert_eq;
    use schemasync_schema::{ColumnDeclaration, IndexSpec, PrimaryKey, TableDeclaration};

    fn live_column(name: &str, data_type: &str, udt: &str) -> LiveColumn {
        let mut column = LiveColumn::new(name, data_type, udt);
        column.is_nullable = false;
        column
    }

    fn users() -> TableRef {
        TableRef::new("public", "user")
    }

    fn live_user() -> LiveTable {
        let mut id = live_column("id", "character varying", "varchar");
        id.char_max_length = Some(12);
        let mut age = live_column("age", "integer", "int4");
        age.default = Some("18".into());
        let mut table = LiveTable::default();
        table.columns.insert("id".into(), id);
        table.columns.insert("age".into(), age);
        table
    }

    fn user_decl() -> TableDeclaration {
        TableDeclaration::new("user")
            .primary_key("id")
            .column("id", ColumnDeclaration::new("varchar(12)"))
            .column("age", ColumnDeclaration::new("integer").default(18))
    }

    fn sql(plan: &ColumnPlan) -> Vec<String> {
        plan.changes
            .iter()
            .flat_map(|c| c.statements.iter().map(DdlStatement::to_sql))
            .collect()
    }

    #[test]
    fn test_type_matches() {
        let mut varchar = live_column("name", "character varying", "varchar");
        varchar.char_max_length = Some(20);
        assert!(type_matches(&PgType::parse("varchar(20)").unwrap(), &varchar));
        assert!(!type_matches(&PgType::parse("varchar(30)").unwrap(), &varchar));
        assert!(type_matches(&PgType::parse("varchar").unwrap(), &varchar));
        assert!(!type_matches(&PgType::parse("text").unwrap(), &varchar));

        let serial = live_column("id", "integer", "int4");
        assert!(type_matches(&PgType::parse("serial").unwrap(), &serial));
        assert!(!type_matches(&PgType::parse("bigint").unwrap(), &serial));

        let mut money = live_column("price", "numeric", "numeric");
        assert!(!type_matches(&PgType::parse("numeric(10,2)").unwrap(), &money));
        assert!(type_matches(&PgType::parse("numeric").unwrap(), &money));
        money.numeric_precision = Some(10);
        money.numeric_scale = Some(2);
        assert!(type_matches(&PgType::parse("decimal(10, 2)").unwrap(), &money));

        let tags = live_column("tags", "ARRAY", "_text");
        assert!(type_matches(&PgType::parse("text[]").unwrap(), &tags));
        assert!(!type_matches(&PgType::parse("integer[]").unwrap(), &tags));
        assert!(!type_matches(&PgType::parse("text").unwrap(), &tags));
    }

    #[test]
    fn test_normalize_default() {
        assert_eq!(normalize_default("18").as_deref(), Some("18"));
        assert_eq!(normalize_default("'18'::integer").as_deref(), Some("18"));
        assert_eq!(normalize_default("(-1)").as_deref(), Some("-1"));
        assert_eq!(
            normalize_default("'it''s'::character varying").as_deref(),
            Some("it's")
        );
        assert_eq!(normalize_default("''::text").as_deref(), Some(""));
        assert_eq!(normalize_default("'{}'::integer[]").as_deref(), Some("{}"));
        assert_eq!(normalize_default("true").as_deref(), Some("true"));
        assert_eq!(normalize_default("now()"), None);
        assert_eq!(normalize_default("nextval('user_id_seq'::regclass)"), None);
        assert_eq!(normalize_default("'a'::text || 'b'::text"), None);
    }

    #[test]
    fn test_default_matches() {
        assert!(default_matches(&DefaultValue::Integer(18), Some("18")));
        assert!(default_matches(&DefaultValue::Integer(0), Some("0.00")));
        assert!(default_matches(&DefaultValue::Text(String::new()), Some("''::character varying")));
        assert!(default_matches(
            &DefaultValue::Array(vec!["a".into(), "b".into()]),
            Some("'{a,b}'::text[]")
        ));
        assert!(!default_matches(&DefaultValue::Integer(18), Some("21")));
        assert!(!default_matches(&DefaultValue::Integer(18), None));
        assert!(!default_matches(&DefaultValue::Text("1.0".into()), Some("'1'::text")));
    }

    #[test]
    fn test_create_table_uses_declaration_order() {
        let desc = user_decl().build().unwrap();
        let ddl = create_table(&desc, &users());
        assert_eq!(
            ddl.to_sql(),
            "create table \"public\".\"user\" (\"id\" varchar(12) primary key, \"age\" integer not null default '18')"
        );
    }

    #[test]
    fn test_create_table_skips_dropped_and_ignored() {
        let desc = user_decl()
            .column("legacy", ColumnDeclaration::new("text").drop())
            .column("external", ColumnDeclaration::new("text").ignore())
            .build()
            .unwrap();
        let sql = create_table(&desc, &users()).to_sql();
        assert!(!sql.contains("legacy"));
        assert!(!sql.contains("external"));
    }

    #[test]
    fn test_create_table_composite_key() {
        let desc = TableDeclaration::new("membership")
            .primary_key(PrimaryKey::composite(["user_id", "team_id"]))
            .column("user_id", ColumnDeclaration::new("varchar(12)"))
            .column("team_id", ColumnDeclaration::new("varchar(12)"))
            .build()
            .unwrap();
        let sql = create_table(&desc, &TableRef::new("public", "membership")).to_sql();
        assert_eq!(
            sql,
            "create table \"public\".\"membership\" (\"user_id\" varchar(12) not null, \"team_id\" varchar(12) not null, primary key (\"user_id\", \"team_id\"))"
        );
    }

    #[test]
    fn test_matching_table_plans_nothing() {
        let desc = user_decl().build().unwrap();
        let plan = plan_columns(&desc, &users(), &live_user(), &SyncOptions::new());
        assert!(plan.is_empty());
        assert!(plan.skipped.is_empty());
    }

    #[test]
    fn test_added_column() {
        let desc = user_decl()
            .column("email", ColumnDeclaration::new("varchar(100)"))
            .build()
            .unwrap();
        let plan = plan_columns(&desc, &users(), &live_user(), &SyncOptions::new());
        assert_eq!(
            sql(&plan),
            vec![
                "alter table \"public\".\"user\" add column \"email\" varchar(100) not null default ''"
            ]
        );
    }

    #[test]
    fn test_rename_protects_source_from_unlisted_drop() {
        let mut live = live_user();
        live.columns
            .insert("nick".into(), live_column("nick", "text", "text"));
        live.columns.get_mut("nick").unwrap().default = Some("''::text".into());
        live.columns
            .insert("stale".into(), live_column("stale", "text", "text"));

        let desc = user_decl()
            .column("nickname", ColumnDeclaration::new("text").old_name("nick"))
            .build()
            .unwrap();
        let plan = plan_columns(
            &desc,
            &users(),
            &live,
            &SyncOptions::new().drop_unlisted_columns(true),
        );
        assert_eq!(
            sql(&plan),
            vec![
                "alter table \"public\".\"user\" rename column \"nick\" to \"nickname\"",
                "alter table \"public\".\"user\" drop column if exists \"stale\"",
            ]
        );
        assert!(plan.renamed.contains("nick"));
    }

    #[test]
    fn test_dropped_column_only_when_live() {
        let desc = user_decl()
            .column("legacy", ColumnDeclaration::new("text").drop())
            .build()
            .unwrap();
        let plan = plan_columns(&desc, &users(), &live_user(), &SyncOptions::new());
        assert!(plan.is_empty());

        let mut live = live_user();
        live.columns
            .insert("legacy".into(), live_column("legacy", "text", "text"));
        let plan = plan_columns(&desc, &users(), &live, &SyncOptions::new());
        assert_eq!(plan.changes.len(), 1);
        assert!(plan.changes[0].is_best_effort());
    }

    #[test]
    fn test_string_to_number_needs_force() {
        let mut live = live_user();
        live.columns.insert(
            "score".into(),
            live_column("score", "character varying", "varchar"),
        );
        let desc = user_decl()
            .column("score", ColumnDeclaration::new("integer"))
            .build()
            .unwrap();

        let plan = plan_columns(&desc, &users(), &live, &SyncOptions::new());
        assert!(plan.is_empty());
        assert_eq!(plan.skipped.len(), 1);
        assert_eq!(plan.skipped[0].subject, "score");

        let plan = plan_columns(&desc, &users(), &live, &SyncOptions::new().force(true));
        assert_eq!(
            sql(&plan),
            vec![
                "alter table \"public\".\"user\" drop column if exists \"score\"",
                "alter table \"public\".\"user\" add column \"score\" integer not null default '0'",
            ]
        );
        assert!(plan.changes[0].retypes);
        assert!(!plan.changes[0].is_best_effort());
    }

    #[test]
    fn test_widening_alters_type() {
        let desc = TableDeclaration::new("user")
            .primary_key("id")
            .column("id", ColumnDeclaration::new("varchar(12)"))
            .column("age", ColumnDeclaration::new("bigint").default(18))
            .build()
            .unwrap();
        let plan = plan_columns(&desc, &users(), &live_user(), &SyncOptions::new());
        assert_eq!(
            sql(&plan),
            vec!["alter table \"public\".\"user\" alter column \"age\" type bigint using \"age\"::bigint"]
        );
        assert!(plan.changes[0].retypes);
    }

    #[test]
    fn test_type_lock_skips_everything_else() {
        let mut live = live_user();
        live.columns.get_mut("age").unwrap().is_nullable = true;
        let desc = TableDeclaration::new("user")
            .primary_key("id")
            .column("id", ColumnDeclaration::new("varchar(12)"))
            .column("age", ColumnDeclaration::new("bigint").default(21).type_lock())
            .build()
            .unwrap();
        let plan = plan_columns(&desc, &users(), &live, &SyncOptions::new());
        assert!(plan.is_empty());
    }

    #[test]
    fn test_default_and_not_null() {
        let mut live = live_user();
        let age = live.columns.get_mut("age").unwrap();
        age.default = Some("21".into());
        age.is_nullable = true;
        let desc = user_decl().build().unwrap();
        let plan = plan_columns(&desc, &users(), &live, &SyncOptions::new());
        assert_eq!(
            sql(&plan),
            vec![
                "alter table \"public\".\"user\" alter column \"age\" set default '18'",
                "alter table \"public\".\"user\" alter column \"age\" set not null",
            ]
        );
    }

    #[test]
    fn test_nullable_is_not_relaxed() {
        let desc = TableDeclaration::new("user")
            .primary_key("id")
            .column("id", ColumnDeclaration::new("varchar(12)"))
            .column("age", ColumnDeclaration::new("integer").default(18).nullable())
            .build()
            .unwrap();
        let plan = plan_columns(&desc, &users(), &live_user(), &SyncOptions::new());
        assert!(plan.is_empty());
    }

    #[test]
    fn test_generated_columns_survive_force() {
        let mut live = live_user();
        let mut total = live_column("total", "integer", "int4");
        total.is_generated = true;
        live.columns.insert("total".into(), total);
        live.columns
            .insert("extra".into(), live_column("extra", "text", "text"));

        let desc = user_decl().build().unwrap();
        let plan = plan_columns(&desc, &users(), &live, &SyncOptions::new().force(true));
        assert_eq!(
            sql(&plan),
            vec!["alter table \"public\".\"user\" drop column if exists \"extra\""]
        );

        let plan = plan_columns(&desc, &users(), &live, &SyncOptions::new());
        assert!(plan.is_empty());
    }

    #[test]
    fn test_index_plan_for_new_table() {
        let desc = user_decl()
            .column("email", ColumnDeclaration::new("text"))
            .index("age")
            .unique("email")
            .unique("id")
            .index(IndexSpec::on(["email", "age"]).removed())
            .build()
            .unwrap();
        let plan = plan_indexes(&desc, &users(), None);
        let sql: Vec<String> = plan.create.iter().flatten().map(DdlStatement::to_sql).collect();
        assert_eq!(
            sql,
            vec![
                "create unique index if not exists \"user_email_idx\" on \"public\".\"user\" (\"email\")",
                "create index if not exists \"user_age_idx\" on \"public\".\"user\" (\"age\")",
            ]
        );
        assert!(plan.drop.is_empty());
    }

    #[test]
    fn test_index_sweep() {
        let mut live = live_user();
        for (name, column) in [("user_age_idx", "age"), ("user_id_age_idx", "id")] {
            live.indexes.insert(
                name.into(),
                LiveIndex {
                    name: name.into(),
                    columns: vec![column.into()],
                    is_unique: false,
                },
            );
        }
        let desc = user_decl().index("age").build().unwrap();
        let plan = plan_indexes(&desc, &users(), Some(&live));
        assert!(plan.create.is_empty());
        let sql: Vec<String> = plan.drop.iter().map(DdlStatement::to_sql).collect();
        assert_eq!(sql, vec!["drop index if exists \"public\".\"user_id_age_idx\""]);
    }

    #[test]
    fn test_index_on_undeclared_column() {
        let desc = user_decl().index("missing").build().unwrap();
        let plan = plan_indexes(&desc, &users(), None);
        assert!(plan.create.is_empty());
        assert_eq!(plan.skipped.len(), 1);
        assert!(plan.skipped[0].reason.contains("missing"));
    }

    #[test]
    fn test_unique_spec_wins_shared_name() {
        let desc = user_decl().index("age").unique("age").build().unwrap();
        let plan = plan_indexes(&desc, &users(), None);
        let sql: Vec<String> = plan.create.iter().flatten().map(DdlStatement::to_sql).collect();
        assert_eq!(
            sql,
            vec!["create unique index if not exists \"user_age_idx\" on \"public\".\"user\" (\"age\")"]
        );
        assert_eq!(plan.keep.len(), 1);
    }

    #[test]
    fn test_index_with_other_shape_is_replaced() {
        let mut live = live_user();
        live.indexes.insert(
            "user_age_idx".into(),
            LiveIndex {
                name: "user_age_idx".into(),
                columns: vec!["age".into()],
                is_unique: false,
            },
        );
        let desc = user_decl().unique("age").build().unwrap();
        let plan = plan_indexes(&desc, &users(), Some(&live));
        assert_eq!(plan.create.len(), 1);
        let sql: Vec<String> = plan.create[0].iter().map(DdlStatement::to_sql).collect();
        assert_eq!(
            sql,
            vec![
                "drop index if exists \"public\".\"user_age_idx\"",
                "create unique index if not exists \"user_age_idx\" on \"public\".\"user\" (\"age\")",
            ]
        );
        assert!(plan.drop.is_empty());

        let desc = user_decl().index("age").build().unwrap();
        assert!(plan_indexes(&desc, &users(), Some(&live)).create.is_empty());
    }
}
