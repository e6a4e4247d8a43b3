use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::schema::ColumnType;

/// A single typed cell.
///
/// Ordered and hashable so rows can be grouped and deduplicated on any combination of
/// columns. `Null` compares equal to `Null`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Value {
    Null,
    Integer(i64),
    Text(String),
    Decimal(Decimal),
}

impl Value {
    /// Parse a stored cell as `column_type`.
    ///
    /// Never fails: a missing or empty cell, or one that does not parse as its declared
    /// type, becomes `Null`. Text and currency cells are kept verbatim.
    pub fn parse(cell: Option<&str>, column_type: ColumnType) -> Value {
        let raw = match cell {
            Some(raw) if !raw.is_empty() => raw,
            _ => return Value::Null,
        };

        match column_type {
            ColumnType::Integer => raw
                .trim()
                .parse::<i64>()
                .map(Value::Integer)
                .unwrap_or(Value::Null),
            ColumnType::Text | ColumnType::Currency => Value::Text(raw.to_string()),
            ColumnType::Decimal => parse_decimal(raw.trim())
                .map(Value::Decimal)
                .unwrap_or(Value::Null),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Decimal(v) => Some(*v),
            Value::Integer(v) => Some(Decimal::from(*v)),
            _ => None,
        }
    }

    /// Stored form of the cell; `None` for null.
    pub fn render(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Integer(v) => Some(v.to_string()),
            Value::Text(v) => Some(v.clone()),
            Value::Decimal(v) => Some(v.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(v) => write!(f, "{v}"),
            Value::Text(v) => write!(f, "{v}"),
            Value::Decimal(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Plain (`1234.50`) or scientific (`1.2345e3`) decimal text.
pub(crate) fn parse_decimal(text: &str) -> Option<Decimal> {
    if text.is_empty() {
        return None;
    }
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}
