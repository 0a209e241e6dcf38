//! Column declarations and their normalized definitions.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;

use crate::error::{SchemaError, SchemaResult};
use crate::types::PgType;
use crate::validator::{ValidationRule, ValueValidator, check_column_name};

/// A literal default value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefaultValue {
    /// Boolean literal.
    Bool(bool),
    /// Integer literal.
    Integer(i64),
    /// Floating point literal.
    Float(f64),
    /// Text literal.
    Text(String),
    /// Array literal.
    Array(Vec<DefaultValue>),
}

impl DefaultValue {
    /// The text of the literal as PostgreSQL would read it inside quotes.
    ///
    /// Arrays use the `{a,b}` input syntax with text elements double-quoted.
    pub fn literal_text(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Integer(n) => n.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Text(s) => s.clone(),
            Self::Array(items) => {
                let parts: Vec<String> = items
                    .iter()
                    .map(|item| match item {
                        Self::Text(s) => {
                            format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
                        }
                        other => other.literal_text(),
                    })
                    .collect();
                format!("{{{}}}", parts.join(","))
            }
        }
    }

    /// The default used when a column declares none.
    ///
    /// Arrays get an empty array, integer and numeric types zero, character
    /// types the empty string. Every other type gets no default.
    pub fn inferred_for(ty: &PgType) -> Option<Self> {
        if ty.array {
            Some(Self::Array(Vec::new()))
        } else if ty.base.is_numeric_family() {
            Some(Self::Integer(0))
        } else if ty.base.is_string_family() {
            Some(Self::Text(String::new()))
        } else {
            None
        }
    }
}

impl From<&str> for DefaultValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for DefaultValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for DefaultValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for DefaultValue {
    fn from(value: i32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<f64> for DefaultValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for DefaultValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// When a timestamp column is filled automatically by the write path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampRole {
    /// Set once when the row is inserted.
    OnInsert,
    /// Set on insert and refreshed on every update.
    OnInsertAndUpdate,
}

/// Referential action for foreign keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferentialAction {
    /// Propagate the change.
    #[default]
    Cascade,
    /// Reject the change.
    Restrict,
    /// Reject at end of statement.
    NoAction,
    /// Set the referencing column to NULL.
    SetNull,
    /// Set the referencing column to its default.
    SetDefault,
}

impl ReferentialAction {
    /// SQL spelling.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Cascade => "cascade",
            Self::Restrict => "restrict",
            Self::NoAction => "no action",
            Self::SetNull => "set null",
            Self::SetDefault => "set default",
        }
    }
}

/// A column's reference to another model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForeignKeyRef {
    /// Target model name.
    pub model: SmolStr,
    /// Target column; the target's primary key when omitted.
    #[serde(default)]
    pub column: Option<SmolStr>,
    /// Action on update of the referenced key.
    #[serde(default)]
    pub on_update: ReferentialAction,
    /// Action on delete of the referenced row.
    #[serde(default)]
    pub on_delete: ReferentialAction,
}

impl ForeignKeyRef {
    /// Reference the primary key of `model`.
    pub fn to(model: impl Into<SmolStr>) -> Self {
        Self {
            model: model.into(),
            column: None,
            on_update: ReferentialAction::Cascade,
            on_delete: ReferentialAction::Cascade,
        }
    }

    /// Reference a specific column.
    pub fn column(mut self, column: impl Into<SmolStr>) -> Self {
        self.column = Some(column.into());
        self
    }

    /// Set the on update action.
    pub fn on_update(mut self, action: ReferentialAction) -> Self {
        self.on_update = action;
        self
    }

    /// Set the on delete action.
    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = action;
        self
    }
}

fn default_true() -> bool {
    true
}

/// A column as written by the user, before normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnDeclaration {
    /// Raw type string.
    #[serde(rename = "type")]
    pub ty: String,
    /// Columns are NOT NULL unless this is explicitly false.
    #[serde(default = "default_true")]
    pub not_null: bool,
    /// Explicit default value.
    #[serde(default)]
    pub default: Option<DefaultValue>,
    /// Automatic timestamp handling.
    #[serde(default)]
    pub timestamp: Option<TimestampRole>,
    /// Declarative validation rule.
    #[serde(default)]
    pub validate: Option<ValidationRule>,
    /// Code-level validation predicate.
    #[serde(skip)]
    pub predicate: Option<ValueValidator>,
    /// Foreign-key reference.
    #[serde(default)]
    pub references: Option<ForeignKeyRef>,
    /// Remove the column from the database.
    #[serde(default)]
    pub drop: bool,
    /// Leave the column entirely alone.
    #[serde(default)]
    pub ignore: bool,
    /// Never alter the column type.
    #[serde(default)]
    pub type_lock: bool,
    /// Allow a destructive rebuild when the type cannot be converted.
    #[serde(default)]
    pub force: bool,
    /// Previous name to rename from.
    #[serde(default)]
    pub old_name: Option<String>,
}

impl ColumnDeclaration {
    /// Declare a column of the given type.
    pub fn new(ty: impl Into<String>) -> Self {
        Self {
            ty: ty.into(),
            not_null: true,
            default: None,
            timestamp: None,
            validate: None,
            predicate: None,
            references: None,
            drop: false,
            ignore: false,
            type_lock: false,
            force: false,
            old_name: None,
        }
    }

    /// Allow NULL values.
    pub fn nullable(mut self) -> Self {
        self.not_null = false;
        self
    }

    /// Set an explicit default.
    pub fn default(mut self, value: impl Into<DefaultValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Mark as an automatic timestamp.
    pub fn timestamp(mut self, role: TimestampRole) -> Self {
        self.timestamp = Some(role);
        self
    }

    /// Attach a declarative validation rule.
    pub fn validate(mut self, rule: ValidationRule) -> Self {
        self.validate = Some(rule);
        self
    }

    /// Attach a validation predicate.
    pub fn predicate(mut self, f: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        self.predicate = Some(ValueValidator::predicate(f));
        self
    }

    /// Reference another model.
    pub fn references(mut self, reference: ForeignKeyRef) -> Self {
        self.references = Some(reference);
        self
    }

    /// Drop this column.
    pub fn drop(mut self) -> Self {
        self.drop = true;
        self
    }

    /// Skip this column entirely.
    pub fn ignore(mut self) -> Self {
        self.ignore = true;
        self
    }

    /// Never alter the type.
    pub fn type_lock(mut self) -> Self {
        self.type_lock = true;
        self
    }

    /// Permit a destructive rebuild on incompatible type changes.
    pub fn force(mut self) -> Self {
        self.force = true;
        self
    }

    /// Rename from a previous column name.
    pub fn old_name(mut self, name: impl Into<String>) -> Self {
        self.old_name = Some(name.into());
        self
    }
}

/// A normalized column.
#[derive(Debug, Clone)]
pub struct ColumnDefinition {
    /// Column name.
    pub name: SmolStr,
    /// Parsed type.
    pub ty: PgType,
    /// NOT NULL constraint.
    pub not_null: bool,
    /// Explicit default.
    pub default: Option<DefaultValue>,
    /// Automatic timestamp role.
    pub timestamp: Option<TimestampRole>,
    /// Compiled validator.
    pub validator: Option<ValueValidator>,
    /// Foreign-key reference.
    pub references: Option<ForeignKeyRef>,
    /// Remove the column.
    pub drop: bool,
    /// Skip entirely.
    pub ignore: bool,
    /// Never alter the type.
    pub type_lock: bool,
    /// Allow destructive rebuilds.
    pub force: bool,
    /// Rename source.
    pub old_name: Option<SmolStr>,
}

impl ColumnDefinition {
    /// Normalize a declaration.
    pub fn from_declaration(
        table: &str,
        name: &str,
        decl: ColumnDeclaration,
    ) -> SchemaResult<Self> {
        check_column_name(name).map_err(|msg| SchemaError::invalid_field(table, name, msg))?;

        if let Some(old) = &decl.old_name {
            check_column_name(old).map_err(|msg| {
                SchemaError::invalid_field(table, name, format!("old name: {}", msg))
            })?;
            if old == name {
                return Err(SchemaError::invalid_field(
                    table,
                    name,
                    "old name is the same as the column name",
                ));
            }
        }

        let ty = PgType::parse(&decl.ty).map_err(|msg| SchemaError::invalid_field(table, name, msg))?;

        let validator = match (&decl.validate, decl.predicate) {
            (Some(_), Some(_)) => {
                return Err(SchemaError::invalid_field(
                    table,
                    name,
                    "declare either a validation rule or a predicate, not both",
                ));
            }
            (Some(rule), None) => Some(
                ValueValidator::compile(rule)
                    .map_err(|msg| SchemaError::invalid_field(table, name, msg))?,
            ),
            (None, predicate) => predicate,
        };

        Ok(Self {
            name: SmolStr::new(name),
            ty,
            not_null: decl.not_null,
            default: decl.default,
            timestamp: decl.timestamp,
            validator,
            references: decl.references,
            drop: decl.drop,
            ignore: decl.ignore,
            type_lock: decl.type_lock,
            force: decl.force,
            old_name: decl.old_name.map(SmolStr::from),
        })
    }

    /// Whether the column takes part in reconciliation as a live column.
    pub fn is_active(&self) -> bool {
        !self.drop && !self.ignore
    }

    /// The explicit default, falling back to the inferred one.
    pub fn effective_default(&self) -> Option<DefaultValue> {
        self.default
            .clone()
            .or_else(|| DefaultValue::inferred_for(&self.ty))
    }

    /// Validate a value against nullability and the column's validator.
    pub fn validate(&self, value: &Value) -> bool {
        if value.is_null() {
            return !self.not_null;
        }
        self.validator.as_ref().is_none_or(|v| v.validate(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn define(name: &str, decl: ColumnDeclaration) -> SchemaResult<ColumnDefinition> {
        ColumnDefinition::from_declaration("user", name, decl)
    }

    #[test]
    fn test_not_null_by_default() {
        let col = define("age", ColumnDeclaration::new("integer")).unwrap();
        assert!(col.not_null);
        let col = define("bio", ColumnDeclaration::new("text").nullable()).unwrap();
        assert!(!col.not_null);
    }

    #[test]
    fn test_inferred_defaults() {
        let col = define("age", ColumnDeclaration::new("integer")).unwrap();
        assert_eq!(col.effective_default(), Some(DefaultValue::Integer(0)));

        let col = define("price", ColumnDeclaration::new("numeric(10,2)")).unwrap();
        assert_eq!(col.effective_default(), Some(DefaultValue::Integer(0)));

        let col = define("name", ColumnDeclaration::new("varchar(20)")).unwrap();
        assert_eq!(col.effective_default(), Some(DefaultValue::Text(String::new())));

        let col = define("tags", ColumnDeclaration::new("integer[]")).unwrap();
        assert_eq!(col.effective_default(), Some(DefaultValue::Array(vec![])));

        let col = define("seen_at", ColumnDeclaration::new("timestamptz")).unwrap();
        assert_eq!(col.effective_default(), None);

        let col = define("ratio", ColumnDeclaration::new("real")).unwrap();
        assert_eq!(col.effective_default(), None);
    }

    #[test]
    fn test_explicit_default_wins() {
        let col = define("age", ColumnDeclaration::new("integer").default(18)).unwrap();
        assert_eq!(col.effective_default(), Some(DefaultValue::Integer(18)));
    }

    #[test]
    fn test_literal_text() {
        assert_eq!(DefaultValue::Integer(18).literal_text(), "18");
        assert_eq!(DefaultValue::Bool(true).literal_text(), "true");
        assert_eq!(DefaultValue::Array(vec![]).literal_text(), "{}");
        assert_eq!(
            DefaultValue::Array(vec!["a".into(), "b\"c".into()]).literal_text(),
            r#"{"a","b\"c"}"#
        );
        assert_eq!(
            DefaultValue::Array(vec![1.into(), 2.into()]).literal_text(),
            "{1,2}"
        );
    }

    #[test]
    fn test_illegal_name_rejected() {
        let err = define("Name", ColumnDeclaration::new("text")).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidField { .. }));
        assert!(define("order", ColumnDeclaration::new("text")).is_err());
    }

    #[test]
    fn test_bad_type_rejected() {
        assert!(define("name", ColumnDeclaration::new("varchar(x)")).is_err());
    }

    #[test]
    fn test_old_name_validated() {
        assert!(define("nickname", ColumnDeclaration::new("text").old_name("Nick")).is_err());
        assert!(define("nickname", ColumnDeclaration::new("text").old_name("nickname")).is_err());
        let col = define("nickname", ColumnDeclaration::new("text").old_name("nick")).unwrap();
        assert_eq!(col.old_name.as_deref(), Some("nick"));
    }

    #[test]
    fn test_validate_value() {
        let col = define(
            "status",
            ColumnDeclaration::new("text").validate(ValidationRule::OneOf(vec![json!("on"), json!("off")])),
        )
        .unwrap();
        assert!(col.validate(&json!("on")));
        assert!(!col.validate(&json!("maybe")));
        assert!(!col.validate(&Value::Null));

        let col = define(
            "age",
            ColumnDeclaration::new("integer")
                .nullable()
                .predicate(|v| v.as_i64().is_some_and(|n| n >= 0)),
        )
        .unwrap();
        assert!(col.validate(&Value::Null));
        assert!(col.validate(&json!(3)));
        assert!(!col.validate(&json!(-3)));
    }

    #[test]
    fn test_rule_and_predicate_conflict() {
        let decl = ColumnDeclaration::new("text")
            .validate(ValidationRule::Pattern("^a".into()))
            .predicate(|_| true);
        assert!(define("code", decl).is_err());
    }

    #[test]
    fn test_deserialize_declaration() {
        let decl: ColumnDeclaration = serde_json::from_value(json!({
            "type": "integer",
            "default": 18,
            "references": { "model": "Team", "on_delete": "set_null" }
        }))
        .unwrap();
        assert!(decl.not_null);
        assert_eq!(decl.default, Some(DefaultValue::Integer(18)));
        let fk = decl.references.unwrap();
        assert_eq!(fk.on_delete, ReferentialAction::SetNull);
        assert_eq!(fk.on_update, ReferentialAction::Cascade);
    }
}
