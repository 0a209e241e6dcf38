//! Column type model.
//!
//! Declared types arrive as free-form strings (`varchar(100)`, `numeric(10,2)`,
//! `text[]`, `timestamp with time zone`). They are parsed once into a
//! [`PgType`] so that comparisons against catalog metadata work on structured
//! fields instead of re-parsing strings.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Recognized PostgreSQL base types.
///
/// Anything outside this set is kept verbatim as [`BaseType::Unknown`] and is
/// passed through to DDL without type comparison.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BaseType {
    /// `smallint` / `int2`.
    SmallInt,
    /// `integer` / `int` / `int4`.
    Integer,
    /// `bigint` / `int8`.
    BigInt,
    /// `smallserial`.
    SmallSerial,
    /// `serial`.
    Serial,
    /// `bigserial`.
    BigSerial,
    /// `numeric` / `decimal`.
    Numeric,
    /// `real` / `float4`.
    Real,
    /// `double precision` / `float8`.
    DoublePrecision,
    /// `boolean` / `bool`.
    Boolean,
    /// `char(n)` / `character(n)`.
    Char,
    /// `varchar(n)` / `character varying(n)`.
    Varchar,
    /// `text`.
    Text,
    /// `date`.
    Date,
    /// `time without time zone`.
    Time,
    /// `timestamp without time zone`.
    Timestamp,
    /// `timestamp with time zone`.
    Timestamptz,
    /// `interval`.
    Interval,
    /// `uuid`.
    Uuid,
    /// `json`.
    Json,
    /// `jsonb`.
    Jsonb,
    /// `bytea`.
    Bytea,
    /// An unrecognized type, kept as declared.
    Unknown(SmolStr),
}

impl BaseType {
    /// Resolve a normalized (lowercase, single-spaced) type name.
    pub fn from_name(name: &str) -> Self {
        match name {
            "smallint" | "int2" => Self::SmallInt,
            "integer" | "int" | "int4" => Self::Integer,
            "bigint" | "int8" => Self::BigInt,
            "smallserial" | "serial2" => Self::SmallSerial,
            "serial" | "serial4" => Self::Serial,
            "bigserial" | "serial8" => Self::BigSerial,
            "numeric" | "decimal" => Self::Numeric,
            "real" | "float4" => Self::Real,
            "double precision" | "float8" | "float" => Self::DoublePrecision,
            "boolean" | "bool" => Self::Boolean,
            "char" | "character" | "bpchar" => Self::Char,
            "varchar" | "character varying" => Self::Varchar,
            "text" => Self::Text,
            "date" => Self::Date,
            "time" | "time without time zone" => Self::Time,
            "timestamp" | "timestamp without time zone" => Self::Timestamp,
            "timestamptz" | "timestamp with time zone" => Self::Timestamptz,
            "interval" => Self::Interval,
            "uuid" => Self::Uuid,
            "json" => Self::Json,
            "jsonb" => Self::Jsonb,
            "bytea" => Self::Bytea,
            other => Self::Unknown(SmolStr::new(other)),
        }
    }

    /// The spelling used when rendering DDL.
    pub fn sql_name(&self) -> &str {
        match self {
            Self::SmallInt => "smallint",
            Self::Integer => "integer",
            Self::BigInt => "bigint",
            Self::SmallSerial => "smallserial",
            Self::Serial => "serial",
            Self::BigSerial => "bigserial",
            Self::Numeric => "numeric",
            Self::Real => "real",
            Self::DoublePrecision => "double precision",
            Self::Boolean => "boolean",
            Self::Char => "char",
            Self::Varchar => "varchar",
            Self::Text => "text",
            Self::Date => "date",
            Self::Time => "time",
            Self::Timestamp => "timestamp",
            Self::Timestamptz => "timestamptz",
            Self::Interval => "interval",
            Self::Uuid => "uuid",
            Self::Json => "json",
            Self::Jsonb => "jsonb",
            Self::Bytea => "bytea",
            Self::Unknown(name) => name.as_str(),
        }
    }

    /// The `data_type` reported by `information_schema.columns`.
    pub fn catalog_name(&self) -> &str {
        match self {
            Self::SmallInt | Self::SmallSerial => "smallint",
            Self::Integer | Self::Serial => "integer",
            Self::BigInt | Self::BigSerial => "bigint",
            Self::Char => "character",
            Self::Varchar => "character varying",
            Self::DoublePrecision => "double precision",
            Self::Time => "time without time zone",
            Self::Timestamp => "timestamp without time zone",
            Self::Timestamptz => "timestamp with time zone",
            other => other.sql_name(),
        }
    }

    /// The internal `udt_name`, used to compare array element types.
    pub fn udt_name(&self) -> &str {
        match self {
            Self::SmallInt | Self::SmallSerial => "int2",
            Self::Integer | Self::Serial => "int4",
            Self::BigInt | Self::BigSerial => "int8",
            Self::Real => "float4",
            Self::DoublePrecision => "float8",
            Self::Boolean => "bool",
            Self::Char => "bpchar",
            other => other.sql_name(),
        }
    }

    /// Whether this type accepts a bracketed parameter list.
    pub fn is_parameterized(&self) -> bool {
        matches!(self, Self::Char | Self::Varchar | Self::Numeric)
    }

    /// `char`, `varchar` and `text`.
    pub fn is_string_family(&self) -> bool {
        matches!(self, Self::Char | Self::Varchar | Self::Text)
    }

    /// Types that receive a zero default when none is declared.
    pub fn is_numeric_family(&self) -> bool {
        matches!(
            self,
            Self::SmallInt | Self::Integer | Self::BigInt | Self::Numeric
        )
    }

    /// Database-generated integer sequences.
    pub fn is_serial(&self) -> bool {
        matches!(self, Self::SmallSerial | Self::Serial | Self::BigSerial)
    }

    /// Integer types that are not serial.
    pub fn is_integer(&self) -> bool {
        matches!(self, Self::SmallInt | Self::Integer | Self::BigInt)
    }

    /// Check if this is the unknown pass-through variant.
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown(_))
    }

    /// Serial pseudo-types are stored as plain integers.
    pub fn storage(&self) -> Self {
        match self {
            Self::SmallSerial => Self::SmallInt,
            Self::Serial => Self::Integer,
            Self::BigSerial => Self::BigInt,
            other => other.clone(),
        }
    }
}

impl std::fmt::Display for BaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.sql_name())
    }
}

/// Bracketed type parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TypeParams {
    /// No parameters declared.
    #[default]
    None,
    /// `(length)` for character types.
    Length(u32),
    /// `(precision, scale)` for numeric types.
    Precision {
        /// Total number of digits.
        precision: u32,
        /// Digits after the decimal point.
        scale: u32,
    },
}

impl std::fmt::Display for TypeParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => Ok(()),
            Self::Length(n) => write!(f, "({})", n),
            Self::Precision { precision, scale } => write!(f, "({},{})", precision, scale),
        }
    }
}

/// A parsed column type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PgType {
    /// Base type.
    pub base: BaseType,
    /// Parsed parameters.
    pub params: TypeParams,
    /// Whether the column is an array of `base`.
    pub array: bool,
}

impl PgType {
    /// Create an unparameterized scalar type.
    pub fn new(base: BaseType) -> Self {
        Self {
            base,
            params: TypeParams::None,
            array: false,
        }
    }

    /// Parse a declared type string.
    ///
    /// Returns a message describing the problem when the string cannot be
    /// embedded safely or its parameters are malformed.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
        if normalized.is_empty() {
            return Err("type must not be empty".to_string());
        }
        if normalized
            .chars()
            .any(|c| matches!(c, ';' | '\'' | '"' | '\\') || c.is_control())
            || normalized.contains("--")
            || normalized.contains("/*")
        {
            return Err(format!("type `{}` contains forbidden characters", raw.trim()));
        }

        let mut body = normalized.as_str();
        let mut array = false;
        while let Some(stripped) = body.strip_suffix("[]") {
            array = true;
            body = stripped.trim_end();
        }

        let (name, params_text) = match body.find('(') {
            Some(open) => {
                let close = body[open..]
                    .find(')')
                    .map(|i| open + i)
                    .ok_or_else(|| format!("unbalanced parentheses in type `{}`", raw.trim()))?;
                let name = format!("{} {}", body[..open].trim(), body[close + 1..].trim());
                (name.trim().to_string(), Some(&body[open + 1..close]))
            }
            None => (body.to_string(), None),
        };

        let base = BaseType::from_name(&name);
        let Some(params_text) = params_text else {
            return Ok(Self {
                base,
                params: TypeParams::None,
                array,
            });
        };

        if !base.is_parameterized() {
            // e.g. `timestamp(3)` or a user type with modifiers: keep verbatim.
            return Ok(Self {
                base: BaseType::Unknown(SmolStr::new(body)),
                params: TypeParams::None,
                array,
            });
        }

        let numbers = params_text
            .split(',')
            .map(|p| p.trim().parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| format!("invalid parameters `({})` for type `{}`", params_text, name))?;

        let params = match (&base, numbers.as_slice()) {
            (BaseType::Char | BaseType::Varchar, [length]) => TypeParams::Length(*length),
            (BaseType::Numeric, [precision]) => TypeParams::Precision {
                precision: *precision,
                scale: 0,
            },
            (BaseType::Numeric, [precision, scale]) if scale <= precision => {
                TypeParams::Precision {
                    precision: *precision,
                    scale: *scale,
                }
            }
            _ => {
                return Err(format!(
                    "invalid parameters `({})` for type `{}`",
                    params_text, name
                ));
            }
        };

        Ok(Self {
            base,
            params,
            array,
        })
    }

    /// Render the type for DDL.
    pub fn to_sql(&self) -> String {
        let mut sql = format!("{}{}", self.base.sql_name(), self.params);
        if self.array {
            sql.push_str("[]");
        }
        sql
    }

    /// The type used for `alter column ... type`, where serial pseudo-types
    /// are not accepted.
    pub fn storage_type(&self) -> PgType {
        Self {
            base: self.base.storage(),
            params: self.params,
            array: self.array,
        }
    }

    /// Check if the base type is unrecognized.
    pub fn is_unknown(&self) -> bool {
        self.base.is_unknown()
    }

    /// String-family scalar (arrays of strings are not).
    pub fn is_string_family(&self) -> bool {
        !self.array && self.base.is_string_family()
    }

    /// Declared length for character types.
    pub fn length(&self) -> Option<u32> {
        match self.params {
            TypeParams::Length(n) => Some(n),
            _ => None,
        }
    }
}

impl std::str::FromStr for PgType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for PgType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_sql())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_simple() {
        let ty = PgType::parse("INT").unwrap();
        assert_eq!(ty.base, BaseType::Integer);
        assert_eq!(ty.params, TypeParams::None);
        assert!(!ty.array);
        assert_eq!(ty.to_sql(), "integer");
    }

    #[test]
    fn test_parse_varchar_length() {
        let ty = PgType::parse("character  varying(100)").unwrap();
        assert_eq!(ty.base, BaseType::Varchar);
        assert_eq!(ty.params, TypeParams::Length(100));
        assert_eq!(ty.to_sql(), "varchar(100)");
        assert_eq!(ty.base.catalog_name(), "character varying");
    }

    #[test]
    fn test_parse_numeric() {
        let ty = PgType::parse("decimal(10, 2)").unwrap();
        assert_eq!(ty.base, BaseType::Numeric);
        assert_eq!(
            ty.params,
            TypeParams::Precision {
                precision: 10,
                scale: 2
            }
        );
        assert_eq!(ty.to_sql(), "numeric(10,2)");

        let ty = PgType::parse("numeric(8)").unwrap();
        assert_eq!(
            ty.params,
            TypeParams::Precision {
                precision: 8,
                scale: 0
            }
        );
    }

    #[test]
    fn test_parse_array() {
        let ty = PgType::parse("text[]").unwrap();
        assert!(ty.array);
        assert_eq!(ty.base, BaseType::Text);
        assert_eq!(ty.to_sql(), "text[]");
        assert!(!ty.is_string_family());
    }

    #[test]
    fn test_parse_multiword() {
        let ty = PgType::parse("timestamp with time zone").unwrap();
        assert_eq!(ty.base, BaseType::Timestamptz);
        assert_eq!(ty.base.catalog_name(), "timestamp with time zone");
    }

    #[test]
    fn test_parse_unknown_passthrough() {
        let ty = PgType::parse("citext").unwrap();
        assert!(ty.is_unknown());
        assert_eq!(ty.to_sql(), "citext");

        let ty = PgType::parse("timestamp(3)").unwrap();
        assert!(ty.is_unknown());
        assert_eq!(ty.to_sql(), "timestamp(3)");
    }

    #[test]
    fn test_parse_rejects_injection() {
        assert!(PgType::parse("text; drop table user").is_err());
        assert!(PgType::parse("text -- comment").is_err());
        assert!(PgType::parse("").is_err());
    }

    #[test]
    fn test_parse_rejects_bad_params() {
        assert!(PgType::parse("varchar(abc)").is_err());
        assert!(PgType::parse("varchar(1,2)").is_err());
        assert!(PgType::parse("numeric(2,5)").is_err());
        assert!(PgType::parse("varchar(10").is_err());
    }

    #[test]
    fn test_serial_storage() {
        let ty = PgType::parse("bigserial").unwrap();
        assert!(ty.base.is_serial());
        assert_eq!(ty.storage_type().to_sql(), "bigint");
        assert_eq!(ty.base.catalog_name(), "bigint");
    }

    #[test]
    fn test_families() {
        assert!(BaseType::Text.is_string_family());
        assert!(BaseType::Numeric.is_numeric_family());
        assert!(!BaseType::Real.is_numeric_family());
        assert!(!BaseType::Serial.is_numeric_family());
        assert_eq!(BaseType::Char.udt_name(), "bpchar");
    }
}
