use crate::common::error::Result;
use crate::domain::{Layer, RawTable, Table, TableLocation, TableSchema};
use async_trait::async_trait;

/// Storage for whole tables, addressed by layer and name.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Read the table at `location` with its columns aligned to `schema` by name.
    ///
    /// Columns the stored table lacks read as `None`; stored columns the schema does not
    /// declare are ignored. A table that was never written yields `TableNotFound`.
    async fn read_table(&self, location: &TableLocation, schema: &TableSchema) -> Result<RawTable>;

    /// Replace whatever is stored at `location` with `table`.
    ///
    /// Readers observe either the previous table or the new one, never a mix, and a failed
    /// write leaves the previous table in place.
    async fn write_table(&self, location: &TableLocation, table: &Table) -> Result<()>;

    async fn exists(&self, location: &TableLocation) -> Result<bool>;

    /// Names of the tables stored in `layer`, sorted.
    async fn list_tables(&self, layer: Layer) -> Result<Vec<String>>;
}

/// A declarative statement that materializes `output` from tables already written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryStatement {
    pub output: TableLocation,
    pub sql: String,
}

/// Execution engine that runs declarative statements against stored tables.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    async fn run_query(&self, statement: &QueryStatement) -> Result<()>;
}
