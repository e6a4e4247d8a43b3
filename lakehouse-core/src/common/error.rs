use thiserror::Error;

use crate::domain::TableLocation;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// A cleaning rule or derivation names a column its schema does not declare.
    #[error("Schema violation in '{table}': {message}")]
    SchemaViolation { table: String, message: String },

    /// A derivation's validated input was never produced.
    #[error("Missing input table '{table}' for derivation '{derivation}'")]
    MissingInputTable { derivation: String, table: String },

    /// A running total in a derivation left the representable decimal range.
    #[error("Decimal overflow summing '{column}' for derivation '{derivation}'")]
    DecimalOverflow { derivation: String, column: String },

    #[error("Table not found: {0}")]
    TableNotFound(TableLocation),

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Query execution failed: {message}")]
    Query { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn schema_violation(table: impl Into<String>, message: impl Into<String>) -> Self {
        PipelineError::SchemaViolation {
            table: table.into(),
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        PipelineError::Storage {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
