use serde::{Deserialize, Serialize};
use std::fmt;

/// Semantic type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// Whole number. Cells that do not parse become null.
    Integer,
    /// Free text.
    Text,
    /// Text holding a currency-formatted amount such as `"$1,234.50"`. Read as text,
    /// coerced to a decimal during cleaning.
    Currency,
    /// Exact decimal number.
    Decimal,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => write!(f, "integer"),
            Self::Text => write!(f, "text"),
            Self::Currency => write!(f, "currency"),
            Self::Decimal => write!(f, "decimal"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
}

/// Ordered column declarations for one table. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    columns: Vec<ColumnDef>,
}

impl TableSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a nullable column.
    pub fn column(mut self, name: &str, column_type: ColumnType) -> Self {
        self.columns.push(ColumnDef {
            name: name.to_string(),
            column_type,
            nullable: true,
        });
        self
    }

    /// Append a column that never holds null.
    pub fn non_null(mut self, name: &str, column_type: ColumnType) -> Self {
        self.columns.push(ColumnDef {
            name: name.to_string(),
            column_type,
            nullable: false,
        });
        self
    }

    pub fn integer(self, name: &str) -> Self {
        self.column(name, ColumnType::Integer)
    }

    pub fn text(self, name: &str) -> Self {
        self.column(name, ColumnType::Text)
    }

    pub fn currency(self, name: &str) -> Self {
        self.column(name, ColumnType::Currency)
    }

    pub fn decimal(self, name: &str) -> Self {
        self.column(name, ColumnType::Decimal)
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn get(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Copy of this schema with per-column declarations rewritten by `f`.
    pub fn map_columns(&self, f: impl Fn(&ColumnDef) -> ColumnDef) -> Self {
        Self {
            columns: self.columns.iter().map(f).collect(),
        }
    }
}
