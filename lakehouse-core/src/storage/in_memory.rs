use super::traits::TableStore;
use crate::common::error::{PipelineError, Result};
use crate::domain::{Layer, RawTable, Table, TableLocation, TableSchema};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// A table as it would sit in a file: a header row and untyped cells.
#[derive(Debug, Clone, PartialEq, Eq)]
struct StoredTable {
    headers: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

/// In-memory table storage for development/testing.
///
/// Tables are kept in stored (string) form so reads go through the same header alignment
/// and cell parsing as a file-backed store.
#[derive(Clone, Default)]
pub struct InMemoryTableStore {
    tables: Arc<Mutex<BTreeMap<TableLocation, StoredTable>>>,
}

impl InMemoryTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store literal rows under `headers` at `location`, as an upstream landing process would.
    pub fn seed(&self, location: TableLocation, headers: &[&str], rows: &[&[&str]]) -> Result<()> {
        let stored = StoredTable {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: rows
                .iter()
                .map(|row| row.iter().map(|c| Some(c.to_string())).collect())
                .collect(),
        };
        self.lock()?.insert(location, stored);
        Ok(())
    }

    /// Stored cells of the table at `location`, if any.
    pub fn stored_rows(&self, location: &TableLocation) -> Result<Option<Vec<Vec<Option<String>>>>> {
        Ok(self.lock()?.get(location).map(|t| t.rows.clone()))
    }

    pub fn remove(&self, location: &TableLocation) -> Result<bool> {
        Ok(self.lock()?.remove(location).is_some())
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<TableLocation, StoredTable>>> {
        self.tables
            .lock()
            .map_err(|_| PipelineError::storage("in-memory table store lock poisoned"))
    }
}

#[async_trait]
impl TableStore for InMemoryTableStore {
    async fn read_table(&self, location: &TableLocation, schema: &TableSchema) -> Result<RawTable> {
        let tables = self.lock()?;
        let stored = tables
            .get(location)
            .ok_or_else(|| PipelineError::TableNotFound(location.clone()))?;

        let positions: Vec<Option<usize>> = schema
            .names()
            .map(|name| stored.headers.iter().position(|h| h == name))
            .collect();

        let rows = stored
            .rows
            .iter()
            .map(|cells| {
                positions
                    .iter()
                    .map(|pos| pos.and_then(|i| cells.get(i).cloned().flatten()))
                    .collect()
            })
            .collect();

        debug!("Read {} rows from {}", stored.rows.len(), location);
        Ok(RawTable {
            name: location.name.clone(),
            schema: schema.clone(),
            rows,
        })
    }

    async fn write_table(&self, location: &TableLocation, table: &Table) -> Result<()> {
        let stored = StoredTable {
            headers: table.schema.names().map(str::to_string).collect(),
            rows: table.render_rows(),
        };
        self.lock()?.insert(location.clone(), stored);

        debug!("Replaced {} with {} rows", location, table.len());
        Ok(())
    }

    async fn exists(&self, location: &TableLocation) -> Result<bool> {
        Ok(self.lock()?.contains_key(location))
    }

    async fn list_tables(&self, layer: Layer) -> Result<Vec<String>> {
        Ok(self
            .lock()?
            .keys()
            .filter(|loc| loc.layer == layer)
            .map(|loc| loc.name.clone())
            .collect())
    }
}
