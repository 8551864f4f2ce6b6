use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// PostgreSQL column types.
///
/// Serialized as its DDL spelling (`"VARCHAR(255)"`, `"TIMESTAMP"`) so schema
/// files read like SQL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SqlType {
    /// Auto-incrementing 32-bit integer
    Serial,
    /// 16-bit integer
    SmallInt,
    /// 32-bit integer
    Integer,
    /// 64-bit integer
    BigInt,
    /// 32-bit floating point
    Real,
    /// 64-bit floating point
    DoublePrecision,
    /// Decimal with precision and scale
    Decimal(u8, u8),
    /// Variable-length string with optional max length
    Varchar(Option<u32>),
    /// Unlimited text
    Text,
    /// Boolean
    Boolean,
    /// Timestamp without timezone
    Timestamp,
    /// Timestamp with timezone
    Timestamptz,
    /// Date without time
    Date,
    /// Time of day without timezone
    Time,
    /// JSON stored as text
    Json,
    /// JSONB for structured data
    Jsonb,
    /// UUID type
    Uuid,
    /// Byte array
    Bytea,
    /// Introspected type this crate has no variant for
    Other(String),
}

impl SqlType {
    /// Generate the SQL type declaration.
    pub fn to_sql(&self) -> String {
        match self {
            SqlType::Serial => "SERIAL".to_string(),
            SqlType::SmallInt => "SMALLINT".to_string(),
            SqlType::Integer => "INTEGER".to_string(),
            SqlType::BigInt => "BIGINT".to_string(),
            SqlType::Real => "REAL".to_string(),
            SqlType::DoublePrecision => "DOUBLE PRECISION".to_string(),
            SqlType::Decimal(p, s) => format!("DECIMAL({}, {})", p, s),
            SqlType::Varchar(None) => "VARCHAR".to_string(),
            SqlType::Varchar(Some(len)) => format!("VARCHAR({})", len),
            SqlType::Text => "TEXT".to_string(),
            SqlType::Boolean => "BOOLEAN".to_string(),
            SqlType::Timestamp => "TIMESTAMP".to_string(),
            SqlType::Timestamptz => "TIMESTAMPTZ".to_string(),
            SqlType::Date => "DATE".to_string(),
            SqlType::Time => "TIME".to_string(),
            SqlType::Json => "JSON".to_string(),
            SqlType::Jsonb => "JSONB".to_string(),
            SqlType::Uuid => "UUID".to_string(),
            SqlType::Bytea => "BYTEA".to_string(),
            SqlType::Other(name) => name.to_uppercase(),
        }
    }

    /// Map an `information_schema.columns` row back to a type.
    ///
    /// An `integer` column whose default draws from a sequence is reported
    /// as `Serial`, which is how PostgreSQL expands that pseudo-type.
    pub fn from_information_schema(
        data_type: &str,
        char_max_length: Option<i32>,
        numeric_precision: Option<i32>,
        numeric_scale: Option<i32>,
        column_default: Option<&str>,
    ) -> Self {
        let is_sequence = column_default
            .map(|d| d.trim_start().starts_with("nextval("))
            .unwrap_or(false);

        match data_type.trim().to_lowercase().as_str() {
            "integer" if is_sequence => SqlType::Serial,
            "integer" => SqlType::Integer,
            "smallint" => SqlType::SmallInt,
            "bigint" => SqlType::BigInt,
            "real" => SqlType::Real,
            "double precision" => SqlType::DoublePrecision,
            "numeric" => match (numeric_precision, numeric_scale) {
                (Some(p), Some(s)) => match (u8::try_from(p), u8::try_from(s)) {
                    (Ok(p), Ok(s)) => SqlType::Decimal(p, s),
                    _ => SqlType::Other(format!("NUMERIC({}, {})", p, s)),
                },
                _ => SqlType::Other("numeric".to_string()),
            },
            "character varying" => {
                SqlType::Varchar(char_max_length.and_then(|l| u32::try_from(l).ok()))
            }
            "text" => SqlType::Text,
            "boolean" => SqlType::Boolean,
            "timestamp without time zone" => SqlType::Timestamp,
            "timestamp with time zone" => SqlType::Timestamptz,
            "date" => SqlType::Date,
            "time without time zone" => SqlType::Time,
            "json" => SqlType::Json,
            "jsonb" => SqlType::Jsonb,
            "uuid" => SqlType::Uuid,
            "bytea" => SqlType::Bytea,
            other => SqlType::Other(other.to_string()),
        }
    }

    /// Whether an existing column of type `actual` can hold every value the
    /// application writes for a column declared as `self`.
    pub fn accepts(&self, actual: &SqlType) -> bool {
        match (self, actual) {
            (expected, actual) if expected == actual => true,
            (SqlType::Serial, SqlType::Integer) | (SqlType::Integer, SqlType::Serial) => true,
            (SqlType::Varchar(_), SqlType::Text)
            | (SqlType::Varchar(_), SqlType::Varchar(None)) => true,
            (SqlType::Varchar(Some(wanted)), SqlType::Varchar(Some(have))) => have >= wanted,
            _ => false,
        }
    }

    /// Literal used when a NOT NULL column without a declared default is
    /// added to a table that may already hold rows.
    pub fn zero_value(&self) -> Option<&'static str> {
        match self {
            SqlType::SmallInt
            | SqlType::Integer
            | SqlType::BigInt
            | SqlType::Real
            | SqlType::DoublePrecision
            | SqlType::Decimal(_, _) => Some("0"),
            SqlType::Varchar(_) | SqlType::Text => Some("''"),
            SqlType::Boolean => Some("FALSE"),
            SqlType::Timestamp | SqlType::Timestamptz => Some("NOW()"),
            SqlType::Date => Some("CURRENT_DATE"),
            SqlType::Time => Some("CURRENT_TIME"),
            SqlType::Json => Some("'{}'::json"),
            SqlType::Jsonb => Some("'{}'::jsonb"),
            SqlType::Uuid => Some("gen_random_uuid()"),
            SqlType::Bytea => Some("''::bytea"),
            SqlType::Serial | SqlType::Other(_) => None,
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

impl FromStr for SqlType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase();
        let (base, args) = match normalized.find('(') {
            Some(open) => {
                let close = normalized
                    .rfind(')')
                    .filter(|close| *close > open)
                    .ok_or_else(|| format!("unbalanced parentheses in type '{}'", s))?;
                (
                    normalized[..open].trim().to_string(),
                    Some(normalized[open + 1..close].to_string()),
                )
            }
            None => (normalized.clone(), None),
        };

        let parse_num = |value: &str| {
            value
                .trim()
                .parse::<u32>()
                .map_err(|_| format!("invalid type argument '{}' in '{}'", value.trim(), s))
        };

        let sql_type = match (base.as_str(), args.as_deref()) {
            ("SERIAL", None) => SqlType::Serial,
            ("SMALLINT", None) => SqlType::SmallInt,
            ("INTEGER" | "INT" | "INT4", None) => SqlType::Integer,
            ("BIGINT" | "INT8", None) => SqlType::BigInt,
            ("REAL", None) => SqlType::Real,
            ("DOUBLE PRECISION", None) => SqlType::DoublePrecision,
            ("DECIMAL" | "NUMERIC", Some(args)) => {
                let (p, scale) = args
                    .split_once(',')
                    .ok_or_else(|| format!("expected precision and scale in '{}'", s))?;
                let precision = decimal_arg(parse_num(p)?, s)?;
                let scale = decimal_arg(parse_num(scale)?, s)?;
                if precision == 0 || scale > precision {
                    return Err(format!("invalid precision and scale in '{}'", s));
                }
                SqlType::Decimal(precision, scale)
            }
            ("VARCHAR" | "CHARACTER VARYING", None) => SqlType::Varchar(None),
            ("VARCHAR" | "CHARACTER VARYING", Some(len)) => SqlType::Varchar(Some(parse_num(len)?)),
            ("TEXT", None) => SqlType::Text,
            ("BOOLEAN" | "BOOL", None) => SqlType::Boolean,
            ("TIMESTAMP", None) => SqlType::Timestamp,
            ("TIMESTAMPTZ", None) => SqlType::Timestamptz,
            ("DATE", None) => SqlType::Date,
            ("TIME", None) => SqlType::Time,
            ("JSON", None) => SqlType::Json,
            ("JSONB", None) => SqlType::Jsonb,
            ("UUID", None) => SqlType::Uuid,
            ("BYTEA", None) => SqlType::Bytea,
            _ => return Err(format!("unsupported column type '{}'", s)),
        };

        Ok(sql_type)
    }
}

impl TryFrom<String> for SqlType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SqlType> for String {
    fn from(value: SqlType) -> Self {
        value.to_sql()
    }
}

fn decimal_arg(value: u32, ty: &str) -> Result<u8, String> {
    u8::try_from(value)
        .map_err(|_| format!("precision or scale {} out of range in '{}'", value, ty))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_type_to_sql() {
        assert_eq!(SqlType::Serial.to_sql(), "SERIAL");
        assert_eq!(SqlType::Varchar(Some(100)).to_sql(), "VARCHAR(100)");
        assert_eq!(SqlType::Decimal(10, 2).to_sql(), "DECIMAL(10, 2)");
        assert_eq!(SqlType::Timestamp.to_sql(), "TIMESTAMP");
    }

    #[test]
    fn test_from_information_schema() {
        assert_eq!(
            SqlType::from_information_schema(
                "integer",
                None,
                Some(32),
                Some(0),
                Some("nextval('users_id_seq'::regclass)")
            ),
            SqlType::Serial
        );
        assert_eq!(
            SqlType::from_information_schema("integer", None, Some(32), Some(0), Some("1")),
            SqlType::Integer
        );
        assert_eq!(
            SqlType::from_information_schema("character varying", Some(20), None, None, None),
            SqlType::Varchar(Some(20))
        );
        assert_eq!(
            SqlType::from_information_schema("timestamp without time zone", None, None, None, None),
            SqlType::Timestamp
        );
        assert_eq!(
            SqlType::from_information_schema("numeric", None, Some(10), Some(2), None),
            SqlType::Decimal(10, 2)
        );
        assert_eq!(
            SqlType::from_information_schema("numeric", None, Some(1000), Some(2), None),
            SqlType::Other("NUMERIC(1000, 2)".to_string())
        );
        assert_eq!(
            SqlType::from_information_schema("interval", None, None, None, None),
            SqlType::Other("interval".to_string())
        );
    }

    #[test]
    fn test_accepts() {
        assert!(SqlType::Serial.accepts(&SqlType::Integer));
        assert!(SqlType::Varchar(Some(20)).accepts(&SqlType::Varchar(Some(50))));
        assert!(SqlType::Varchar(Some(20)).accepts(&SqlType::Text));
        assert!(!SqlType::Varchar(Some(50)).accepts(&SqlType::Varchar(Some(20))));
        assert!(!SqlType::Integer.accepts(&SqlType::Text));
        assert!(!SqlType::Timestamp.accepts(&SqlType::Timestamptz));
        assert!(!SqlType::Json.accepts(&SqlType::Jsonb));
    }

    #[test]
    fn test_parse_ddl_spelling() {
        assert_eq!("varchar(255)".parse::<SqlType>(), Ok(SqlType::Varchar(Some(255))));
        assert_eq!("VARCHAR".parse::<SqlType>(), Ok(SqlType::Varchar(None)));
        assert_eq!("int".parse::<SqlType>(), Ok(SqlType::Integer));
        assert_eq!("Decimal(10, 2)".parse::<SqlType>(), Ok(SqlType::Decimal(10, 2)));
        assert_eq!("double precision".parse::<SqlType>(), Ok(SqlType::DoublePrecision));
        assert!("VARCHAR(abc)".parse::<SqlType>().is_err());
        assert!("GEOMETRY".parse::<SqlType>().is_err());
        assert!("VARCHAR(10".parse::<SqlType>().is_err());
    }

    #[test]
    fn test_parse_rejects_out_of_range_decimal() {
        assert!("DECIMAL(300, 2)".parse::<SqlType>().is_err());
        assert!("NUMERIC(10, 256)".parse::<SqlType>().is_err());
        assert!("DECIMAL(4, 6)".parse::<SqlType>().is_err());
        assert!("DECIMAL(0, 0)".parse::<SqlType>().is_err());
        assert_eq!("DECIMAL(255, 2)".parse::<SqlType>(), Ok(SqlType::Decimal(255, 2)));
    }

    #[test]
    fn test_zero_value() {
        assert_eq!(SqlType::Integer.zero_value(), Some("0"));
        assert_eq!(SqlType::Varchar(Some(20)).zero_value(), Some("''"));
        assert_eq!(SqlType::Serial.zero_value(), None);
    }
}
