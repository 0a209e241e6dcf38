//! Identifier rules and per-column value validators.

use std::fmt;
use std::sync::Arc;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Words that may not be used as column names, even though quoting would
/// technically allow them.
pub const RESERVED_WORDS: &[&str] = &[
    "all", "analyse", "analyze", "and", "any", "array", "as", "asc", "asymmetric", "both",
    "case", "cast", "check", "collate", "column", "constraint", "create", "current_catalog",
    "current_date", "current_role", "current_time", "current_timestamp", "current_user",
    "default", "deferrable", "desc", "distinct", "do", "else", "end", "except", "false",
    "fetch", "for", "foreign", "from", "grant", "group", "having", "in", "initially",
    "intersect", "into", "lateral", "leading", "limit", "localtime", "localtimestamp", "not",
    "null", "offset", "on", "only", "or", "order", "placing", "primary", "references",
    "returning", "select", "session_user", "some", "symmetric", "table", "then", "to",
    "trailing", "true", "union", "unique", "user", "using", "variadic", "when", "where",
    "window", "with", "oid", "tableoid", "xmin", "xmax", "cmin", "cmax", "ctid",
];

/// Maximum identifier length PostgreSQL keeps before truncating.
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Check that `name` matches `^[a-z][a-z0-9_]*$`, fits in an identifier and
/// is not reserved.
///
/// Returns the reason on failure.
pub fn check_column_name(name: &str) -> Result<(), String> {
    let mut chars = name.chars();
    match chars.next() {
        None => return Err("column name must not be empty".to_string()),
        Some(c) if !c.is_ascii_lowercase() => {
            return Err("column name must start with a lowercase letter".to_string());
        }
        Some(_) => {}
    }
    if let Some(bad) = chars.find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_')) {
        return Err(format!(
            "column name may only contain lowercase letters, digits and underscores (found `{}`)",
            bad
        ));
    }
    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(format!(
            "column name exceeds {} characters",
            MAX_IDENTIFIER_LEN
        ));
    }
    if RESERVED_WORDS.contains(&name) {
        return Err(format!("`{}` is a reserved word", name));
    }
    Ok(())
}

/// Check a table or schema name. These are always quoted in DDL, so only
/// emptiness, length and embedded NULs are rejected.
pub fn check_relation_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("name must not be empty".to_string());
    }
    if name.contains('\0') {
        return Err("name must not contain NUL characters".to_string());
    }
    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(format!("name exceeds {} characters", MAX_IDENTIFIER_LEN));
    }
    Ok(())
}

/// Serializable form of a validation rule, as found in declarations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationRule {
    /// String values must match this regular expression.
    Pattern(String),
    /// Values must be one of the listed values.
    OneOf(Vec<Value>),
}

/// A predicate over a column value.
pub type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// A compiled validator attached to a column.
#[derive(Clone)]
pub enum ValueValidator {
    /// Regular expression match (non-string values are matched on their JSON text).
    Pattern(Regex),
    /// Allow-list.
    OneOf(Vec<Value>),
    /// Arbitrary predicate.
    Predicate(Predicate),
}

impl ValueValidator {
    /// Compile a declared rule.
    pub fn compile(rule: &ValidationRule) -> Result<Self, String> {
        match rule {
            ValidationRule::Pattern(pattern) => Regex::new(pattern)
                .map(Self::Pattern)
                .map_err(|e| format!("invalid pattern `{}`: {}", pattern, e)),
            ValidationRule::OneOf(values) => Ok(Self::OneOf(values.clone())),
        }
    }

    /// Wrap a predicate.
    pub fn predicate(f: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        Self::Predicate(Arc::new(f))
    }

    /// Check a value.
    pub fn validate(&self, value: &Value) -> bool {
        match self {
            Self::Pattern(re) => match value {
                Value::String(s) => re.is_match(s),
                other => re.is_match(&other.to_string()),
            },
            Self::OneOf(allowed) => allowed.contains(value),
            Self::Predicate(f) => f(value),
        }
    }
}

impl fmt::Debug for ValueValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pattern(re) => f.debug_tuple("Pattern").field(&re.as_str()).finish(),
            Self::OneOf(values) => f.debug_tuple("OneOf").field(values).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}
