//! Table declarations and the normalized [`TableDescriptor`].

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;
use tracing::trace;

use crate::column::{ColumnDeclaration, ColumnDefinition, ForeignKeyRef, TimestampRole};
use crate::error::{SchemaError, SchemaResult};
use crate::types::PgType;
use crate::validator::check_relation_name;

/// Namespace used when a declaration does not name one.
pub const DEFAULT_SCHEMA: &str = "public";

/// Length of generated random identifiers when the key type has no length.
pub const DEFAULT_RANDOM_ID_LENGTH: u32 = 16;

/// A primary key declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryKey {
    /// A single column.
    Single(SmolStr),
    /// Several columns, in key order.
    Composite(Vec<SmolStr>),
}

impl PrimaryKey {
    /// Composite key over the given columns.
    pub fn composite<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SmolStr>,
    {
        Self::Composite(columns.into_iter().map(Into::into).collect())
    }

    /// Key columns in order.
    pub fn columns(&self) -> Vec<SmolStr> {
        match self {
            Self::Single(name) => vec![name.clone()],
            Self::Composite(names) => names.clone(),
        }
    }
}

impl From<&str> for PrimaryKey {
    fn from(value: &str) -> Self {
        Self::Single(SmolStr::new(value))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IndexSpecRepr {
    Single(SmolStr),
    Columns(Vec<SmolStr>),
    Full {
        columns: Vec<SmolStr>,
        #[serde(default)]
        removed: bool,
    },
}

/// An index or unique specification: one column or an ordered column list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "IndexSpecRepr")]
pub struct IndexSpec {
    /// Indexed columns, in order.
    pub columns: Vec<SmolStr>,
    /// Marked as removed: never created, and swept if present.
    #[serde(default)]
    pub removed: bool,
}

impl From<IndexSpecRepr> for IndexSpec {
    fn from(repr: IndexSpecRepr) -> Self {
        match repr {
            IndexSpecRepr::Single(column) => Self::on([column]),
            IndexSpecRepr::Columns(columns) => Self::on(columns),
            IndexSpecRepr::Full { columns, removed } => Self { columns, removed },
        }
    }
}

impl IndexSpec {
    /// Index over the given columns.
    pub fn on<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SmolStr>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            removed: false,
        }
    }

    /// Mark the index as removed.
    pub fn removed(mut self) -> Self {
        self.removed = true;
        self
    }
}

impl From<&str> for IndexSpec {
    fn from(value: &str) -> Self {
        Self::on([value])
    }
}

impl<const N: usize> From<[&str; N]> for IndexSpec {
    fn from(value: [&str; N]) -> Self {
        Self::on(value)
    }
}

/// How primary key values are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrimaryKeyStrategy {
    /// Fixed-length random identifier generated by the application.
    RandomId {
        /// Identifier length.
        length: u32,
    },
    /// Numeric identifier generated by the application.
    AutoIncrement,
    /// Database-native `serial` sequence.
    Serial,
}

impl PrimaryKeyStrategy {
    /// Derive the strategy from the key column's type.
    pub fn for_type(ty: &PgType) -> Option<Self> {
        if ty.array {
            None
        } else if ty.base.is_string_family() {
            Some(Self::RandomId {
                length: ty.length().unwrap_or(DEFAULT_RANDOM_ID_LENGTH),
            })
        } else if ty.base.is_serial() {
            Some(Self::Serial)
        } else if ty.base.is_integer() {
            Some(Self::AutoIncrement)
        } else {
            None
        }
    }
}

/// A table as written by the user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableDeclaration {
    /// Table name; the lowercased model name when absent.
    #[serde(default)]
    pub table: Option<String>,
    /// Model name; the table name when absent.
    #[serde(default)]
    pub model: Option<String>,
    /// Primary key.
    #[serde(default)]
    pub primary_key: Option<PrimaryKey>,
    /// Columns, in declaration order.
    #[serde(default)]
    pub columns: IndexMap<String, ColumnDeclaration>,
    /// Plain indexes.
    #[serde(default)]
    pub indexes: Vec<IndexSpec>,
    /// Unique indexes.
    #[serde(default)]
    pub unique: Vec<IndexSpec>,
    /// Owning schema.
    #[serde(default)]
    pub schema: Option<String>,
}

impl TableDeclaration {
    /// Start a declaration for a table.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            ..Default::default()
        }
    }

    /// Start a declaration for a model; the table name is derived from it.
    pub fn for_model(model: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
            ..Default::default()
        }
    }

    /// Set the model name.
    pub fn model_name(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the primary key.
    pub fn primary_key(mut self, key: impl Into<PrimaryKey>) -> Self {
        self.primary_key = Some(key.into());
        self
    }

    /// Add a column.
    pub fn column(mut self, name: impl Into<String>, column: ColumnDeclaration) -> Self {
        self.columns.insert(name.into(), column);
        self
    }

    /// Add an index.
    pub fn index(mut self, spec: impl Into<IndexSpec>) -> Self {
        self.indexes.push(spec.into());
        self
    }

    /// Add a unique index.
    pub fn unique(mut self, spec: impl Into<IndexSpec>) -> Self {
        self.unique.push(spec.into());
        self
    }

    /// Set the owning schema.
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Normalize into a descriptor.
    pub fn build(self) -> SchemaResult<TableDescriptor> {
        TableDescriptor::from_declaration(self)
    }
}

/// The normalized description of a table's intended structure.
#[derive(Debug, Clone)]
pub struct TableDescriptor {
    /// Table name.
    pub table: SmolStr,
    /// Model name, used for registry lookups.
    pub model: SmolStr,
    /// Owning schema.
    pub schema: SmolStr,
    /// Primary key columns, in key order.
    pub primary_key: Vec<SmolStr>,
    /// Columns in declaration order.
    pub columns: IndexMap<SmolStr, ColumnDefinition>,
    /// Plain indexes.
    pub indexes: Vec<IndexSpec>,
    /// Unique indexes.
    pub unique: Vec<IndexSpec>,
    /// How key values are produced; `None` for composite or unmanaged keys.
    pub key_strategy: Option<PrimaryKeyStrategy>,
}

impl TableDescriptor {
    /// Normalize a declaration, rejecting it entirely on the first violation.
    pub fn from_declaration(decl: TableDeclaration) -> SchemaResult<Self> {
        let (table, model) = match (decl.table, decl.model) {
            (Some(table), Some(model)) => (table, model),
            (Some(table), None) => (table.clone(), table),
            (None, Some(model)) => (model.to_lowercase(), model),
            (None, None) => return Err(SchemaError::MissingName),
        };
        check_relation_name(&table).map_err(|msg| SchemaError::invalid_table(&table, msg))?;
        if model.is_empty() {
            return Err(SchemaError::invalid_table(&table, "model name must not be empty"));
        }

        let schema = decl.schema.unwrap_or_else(|| DEFAULT_SCHEMA.to_string());
        check_relation_name(&schema)
            .map_err(|msg| SchemaError::invalid_table(&table, format!("schema: {}", msg)))?;

        if decl.columns.is_empty() {
            return Err(SchemaError::invalid_table(&table, "no columns declared"));
        }

        let mut columns = IndexMap::with_capacity(decl.columns.len());
        for (name, column) in decl.columns {
            let definition = ColumnDefinition::from_declaration(&table, &name, column)?;
            columns.insert(definition.name.clone(), definition);
        }

        let primary_key = decl
            .primary_key
            .ok_or_else(|| SchemaError::MissingPrimaryKey {
                table: table.clone(),
            })?
            .columns();
        if primary_key.is_empty() {
            return Err(SchemaError::MissingPrimaryKey { table });
        }
        for (i, key) in primary_key.iter().enumerate() {
            if primary_key[..i].contains(key) {
                return Err(SchemaError::invalid_table(
                    &table,
                    format!("primary key lists `{}` twice", key),
                ));
            }
            match columns.get(key) {
                Some(column) if column.is_active() => {}
                Some(_) => {
                    return Err(SchemaError::invalid_table(
                        &table,
                        format!("primary key column `{}` is dropped or ignored", key),
                    ));
                }
                None => {
                    return Err(SchemaError::invalid_table(
                        &table,
                        format!("primary key column `{}` is not declared", key),
                    ));
                }
            }
        }

        for spec in decl.indexes.iter().chain(decl.unique.iter()) {
            if spec.columns.is_empty() {
                return Err(SchemaError::invalid_table(&table, "index with no columns"));
            }
        }

        let key_strategy = match primary_key.as_slice() {
            [single] => columns
                .get(single)
                .and_then(|c: &ColumnDefinition| PrimaryKeyStrategy::for_type(&c.ty)),
            _ => None,
        };

        trace!(table = %table, model = %model, columns = columns.len(), "Normalized table declaration");

        Ok(Self {
            table: SmolStr::new(table),
            model: SmolStr::new(model),
            schema: SmolStr::new(schema),
            primary_key,
            columns,
            indexes: decl.indexes,
            unique: decl.unique,
            key_strategy,
        })
    }

    /// Look up a column.
    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.get(name)
    }

    /// Whether the key spans more than one column.
    pub fn has_composite_key(&self) -> bool {
        self.primary_key.len() > 1
    }

    /// Whether `column` is the single-column primary key.
    pub fn is_single_key(&self, column: &str) -> bool {
        matches!(self.primary_key.as_slice(), [key] if key == column)
    }

    /// Whether `column` is part of the primary key.
    pub fn is_key_column(&self, column: &str) -> bool {
        self.primary_key.iter().any(|k| k == column)
    }

    /// Columns that are neither dropped nor ignored.
    pub fn active_columns(&self) -> impl Iterator<Item = &ColumnDefinition> {
        self.columns.values().filter(|c| c.is_active())
    }

    /// Active columns with a foreign-key reference.
    pub fn references(&self) -> impl Iterator<Item = (&ColumnDefinition, &ForeignKeyRef)> {
        self.active_columns()
            .filter_map(|c| c.references.as_ref().map(|r| (c, r)))
    }

    /// Columns filled automatically with the given timestamp role.
    pub fn timestamp_columns(&self, role: TimestampRole) -> impl Iterator<Item = &SmolStr> {
        self.active_columns()
            .filter(move |c| c.timestamp == Some(role))
            .map(|c| &c.name)
    }

    /// Check a value destined for `column`.
    pub fn validate_value(&self, column: &str, value: &Value) -> SchemaResult<()> {
        let definition = self.column(column).ok_or_else(|| {
            SchemaError::invalid_field(self.table.as_str(), column, "column is not declared")
        })?;
        if definition.validate(value) {
            Ok(())
        } else {
            Err(SchemaError::invalid_field(
                self.table.as_str(),
                column,
                format!("value {} was rejected", value),
            ))
        }
    }
}
