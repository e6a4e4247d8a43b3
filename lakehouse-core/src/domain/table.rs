use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use super::schema::TableSchema;
use super::value::Value;
use crate::common::error::{PipelineError, Result};

/// One typed row, aligned to its table's schema.
pub type Record = Vec<Value>;

/// Storage layer a table lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    /// Unvalidated source tables as received.
    Bronze,
    /// Cleaned, deduplicated tables written by the cleaner.
    Silver,
    /// Analytical tables written by the aggregator.
    Gold,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bronze => write!(f, "bronze"),
            Self::Silver => write!(f, "silver"),
            Self::Gold => write!(f, "gold"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableLocation {
    pub layer: Layer,
    pub name: String,
}

impl TableLocation {
    pub fn new(layer: Layer, name: impl Into<String>) -> Self {
        Self {
            layer,
            name: name.into(),
        }
    }

    pub fn bronze(name: impl Into<String>) -> Self {
        Self::new(Layer::Bronze, name)
    }

    pub fn silver(name: impl Into<String>) -> Self {
        Self::new(Layer::Silver, name)
    }

    pub fn gold(name: impl Into<String>) -> Self {
        Self::new(Layer::Gold, name)
    }
}

impl fmt::Display for TableLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.layer, self.name)
    }
}

/// Rows as read from storage: untyped cells aligned to `schema`, `None` where the stored
/// table has no such column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTable {
    pub name: String,
    pub schema: TableSchema,
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    pub fn new(name: impl Into<String>, schema: TableSchema) -> Self {
        Self {
            name: name.into(),
            schema,
            rows: Vec::new(),
        }
    }

    /// Append a row of literal cells; an empty string stands for an empty stored cell.
    pub fn push_row(&mut self, cells: &[&str]) {
        self.rows.push(cells.iter().map(|c| Some(c.to_string())).collect());
    }

    pub fn with_rows(mut self, rows: &[&[&str]]) -> Self {
        for row in rows {
            self.push_row(row);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Typed rows plus their schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub name: String,
    pub schema: TableSchema,
    pub rows: Vec<Record>,
}

impl Table {
    pub fn new(name: impl Into<String>, schema: TableSchema, rows: Vec<Record>) -> Self {
        Self {
            name: name.into(),
            schema,
            rows,
        }
    }

    /// Type every cell of `raw` against its schema. Cells that do not parse become null.
    pub fn parse(raw: &RawTable) -> Self {
        let rows = raw
            .rows
            .iter()
            .map(|cells| {
                raw.schema
                    .columns()
                    .iter()
                    .enumerate()
                    .map(|(i, col)| {
                        let cell = cells.get(i).and_then(|c| c.as_deref());
                        Value::parse(cell, col.column_type)
                    })
                    .collect()
            })
            .collect();

        Self::new(raw.name.clone(), raw.schema.clone(), rows)
    }

    /// Index of `column`, or a schema violation naming this table.
    pub fn column_index(&self, column: &str) -> Result<usize> {
        self.schema.index_of(column).ok_or_else(|| {
            PipelineError::schema_violation(&self.name, format!("column '{column}' is not declared"))
        })
    }

    /// Cells in stored form, row by row.
    pub fn render_rows(&self) -> Vec<Vec<Option<String>>> {
        self.rows
            .iter()
            .map(|row| row.iter().map(Value::render).collect())
            .collect()
    }

    /// SHA-256 over the header and every rendered cell. Two tables with the same stored
    /// representation share a fingerprint.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for name in self.schema.names() {
            hasher.update(name.as_bytes());
            hasher.update(b"\x1f");
        }
        hasher.update(b"\x1e");
        for row in self.render_rows() {
            for cell in row {
                match cell {
                    Some(text) => {
                        hasher.update(b"\x01");
                        hasher.update(text.as_bytes());
                    }
                    None => hasher.update(b"\x00"),
                }
                hasher.update(b"\x1f");
            }
            hasher.update(b"\x1e");
        }
        hex::encode(hasher.finalize())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn orders_schema() -> TableSchema {
        TableSchema::new().integer("OrderID").text("Status").decimal("Amount")
    }

    #[test]
    fn parse_types_cells_and_nulls_malformed_ones() {
        let raw = RawTable::new("orders", orders_schema())
            .with_rows(&[&["1", " Paid ", "20.00"], &["x", "", "abc"]]);
        let table = Table::parse(&raw);

        assert_eq!(table.rows[0], vec![Value::Integer(1), Value::from(" Paid "), Value::Decimal(Decimal::new(2000, 2))]);
        assert_eq!(table.rows[1], vec![Value::Null, Value::Null, Value::Null]);
    }

    #[test]
    fn short_rows_read_missing_cells_as_null() {
        let mut raw = RawTable::new("orders", orders_schema());
        raw.rows.push(vec![Some("5".into())]);
        let table = Table::parse(&raw);
        assert_eq!(table.rows[0], vec![Value::Integer(5), Value::Null, Value::Null]);
    }

    #[test]
    fn column_index_reports_schema_violation() {
        let table = Table::new("orders", orders_schema(), Vec::new());
        assert_eq!(table.column_index("Amount").unwrap(), 2);
        let err = table.column_index("Missing").unwrap_err();
        assert!(matches!(err, PipelineError::SchemaViolation { .. }));
        assert!(err.to_string().contains("Missing"));
    }

    #[test]
    fn fingerprint_tracks_stored_representation() {
        let a = Table::new("t", orders_schema(), vec![vec![Value::Integer(1), Value::Null, Value::Decimal(Decimal::new(5, 0))]]);
        let b = a.clone();
        let mut c = a.clone();
        c.rows[0][1] = Value::from("");

        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn location_display_includes_layer() {
        assert_eq!(TableLocation::silver("Products").to_string(), "silver/Products");
    }
}
