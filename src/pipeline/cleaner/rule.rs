use lakehouse_core::{ColumnDef, ColumnType, PipelineError, Result, TableSchema};
use serde::Serialize;

/// How one source table is turned into its validated form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleaningRule {
    pub table: String,
    pub schema: TableSchema,
    /// Columns that identify a row; one row survives per distinct key.
    pub dedup_key: Vec<String>,
    /// Columns that must be non-null in the validated table.
    pub required: Vec<String>,
    /// Columns stripped of `$`/`,` and coerced to decimals.
    pub currency: Vec<String>,
}

impl CleaningRule {
    pub fn new(table: &str, schema: TableSchema) -> Self {
        Self {
            table: table.to_string(),
            schema,
            dedup_key: Vec::new(),
            required: Vec::new(),
            currency: Vec::new(),
        }
    }

    pub fn dedup_on(mut self, columns: &[&str]) -> Self {
        self.dedup_key = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn require(mut self, columns: &[&str]) -> Self {
        self.required = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn coerce_currency(mut self, columns: &[&str]) -> Self {
        self.currency = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Check that every column the rule names is declared with a usable type.
    pub fn validate(&self) -> Result<()> {
        if self.dedup_key.is_empty() {
            return Err(self.violation("dedup key must name at least one column"));
        }

        for (role, columns) in [
            ("dedup key", &self.dedup_key),
            ("required", &self.required),
            ("currency", &self.currency),
        ] {
            for column in columns {
                if !self.schema.contains(column) {
                    return Err(self.violation(format!(
                        "{role} column '{column}' is not declared in the schema"
                    )));
                }
            }
        }

        for column in &self.currency {
            if let Some(def) = self.schema.get(column) {
                if matches!(def.column_type, ColumnType::Integer | ColumnType::Decimal) {
                    return Err(self.violation(format!(
                        "currency column '{column}' is declared as {}, not text",
                        def.column_type
                    )));
                }
            }
        }

        for def in self.schema.columns() {
            if def.column_type == ColumnType::Currency && !self.currency.contains(&def.name) {
                return Err(self.violation(format!(
                    "column '{}' is declared as currency but is not coerced",
                    def.name
                )));
            }
        }

        Ok(())
    }

    /// Schema of the validated table: currency columns become decimals and required columns
    /// become non-null.
    pub fn validated_schema(&self) -> TableSchema {
        self.schema.map_columns(|def| ColumnDef {
            name: def.name.clone(),
            column_type: if self.currency.contains(&def.name) {
                ColumnType::Decimal
            } else {
                def.column_type
            },
            nullable: def.nullable && !self.required.contains(&def.name),
        })
    }

    fn violation(&self, message: impl Into<String>) -> PipelineError {
        PipelineError::schema_violation(&self.table, message)
    }
}
