use async_trait::async_trait;
use lakehouse_core::{
    Layer, PipelineError, RawTable, Result, Table, TableLocation, TableSchema, TableStore,
};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::config::StorageConfig;
use crate::constants::VALIDATED_SUFFIX;

const EXTENSION: &str = "csv";

/// Tables as CSV files with a header row, one directory per layer.
///
/// Bronze and gold tables are `<name>.csv`; silver tables are `<name>_cleaned.csv`.
/// Writes land in a temporary file beside the target and are renamed over it.
#[derive(Debug, Clone)]
pub struct CsvTableStore {
    bronze_dir: PathBuf,
    silver_dir: PathBuf,
    gold_dir: PathBuf,
}

impl CsvTableStore {
    pub fn new(
        bronze_dir: impl Into<PathBuf>,
        silver_dir: impl Into<PathBuf>,
        gold_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            bronze_dir: bronze_dir.into(),
            silver_dir: silver_dir.into(),
            gold_dir: gold_dir.into(),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(&config.bronze_dir, &config.silver_dir, &config.gold_dir)
    }

    fn dir(&self, layer: Layer) -> &Path {
        match layer {
            Layer::Bronze => &self.bronze_dir,
            Layer::Silver => &self.silver_dir,
            Layer::Gold => &self.gold_dir,
        }
    }

    pub fn path_for(&self, location: &TableLocation) -> PathBuf {
        let stem = match location.layer {
            Layer::Silver => format!("{}{}", location.name, VALIDATED_SUFFIX),
            Layer::Bronze | Layer::Gold => location.name.clone(),
        };
        self.dir(location.layer).join(format!("{stem}.{EXTENSION}"))
    }

    /// Table name for a file in `layer`, if the file belongs to that layer.
    fn table_name(layer: Layer, file_name: &str) -> Option<String> {
        let stem = file_name.strip_suffix(&format!(".{EXTENSION}"))?;
        match layer {
            Layer::Silver => stem.strip_suffix(VALIDATED_SUFFIX).map(str::to_string),
            Layer::Bronze | Layer::Gold => Some(stem.to_string()),
        }
    }
}

fn csv_error(path: &Path, e: csv::Error) -> PipelineError {
    PipelineError::storage(format!("{}: {}", path.display(), e))
}

fn read_csv(path: &Path, location: &TableLocation, schema: &TableSchema) -> Result<RawTable> {
    if !path.is_file() {
        return Err(PipelineError::TableNotFound(location.clone()));
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|e| csv_error(path, e))?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| csv_error(path, e))?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();
    let positions: Vec<Option<usize>> = schema
        .names()
        .map(|name| headers.iter().position(|h| h == name))
        .collect();

    let mut table = RawTable::new(location.name.clone(), schema.clone());
    // Cells that are not valid UTF-8 read as null.
    for record in reader.byte_records() {
        let record = record.map_err(|e| csv_error(path, e))?;
        table.rows.push(
            positions
                .iter()
                .map(|pos| {
                    pos.and_then(|i| record.get(i))
                        .and_then(|cell| std::str::from_utf8(cell).ok())
                        .map(str::to_string)
                })
                .collect(),
        );
    }
    Ok(table)
}

fn write_csv(dir: &Path, path: &Path, headers: &[String], rows: &[Vec<Option<String>>]) -> Result<()> {
    fs::create_dir_all(dir)?;
    let mut file = NamedTempFile::new_in(dir)?;
    {
        let mut writer = csv::Writer::from_writer(file.as_file_mut());
        writer.write_record(headers).map_err(|e| csv_error(path, e))?;
        for row in rows {
            writer
                .write_record(row.iter().map(|cell| cell.as_deref().unwrap_or("")))
                .map_err(|e| csv_error(path, e))?;
        }
        writer.flush()?;
    }
    file.as_file_mut().sync_all()?;
    file.persist(path).map_err(|e| PipelineError::Io(e.error))?;
    Ok(())
}

async fn blocking<T, F>(task: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| PipelineError::storage(format!("storage task failed: {e}")))?
}

#[async_trait]
impl TableStore for CsvTableStore {
    async fn read_table(&self, location: &TableLocation, schema: &TableSchema) -> Result<RawTable> {
        let path = self.path_for(location);
        let location = location.clone();
        let schema = schema.clone();
        let table = blocking(move || read_csv(&path, &location, &schema)).await?;
        debug!("Read {} rows from {}", table.len(), table.name);
        Ok(table)
    }

    async fn write_table(&self, location: &TableLocation, table: &Table) -> Result<()> {
        let dir = self.dir(location.layer).to_path_buf();
        let path = self.path_for(location);
        let headers: Vec<String> = table.schema.names().map(str::to_string).collect();
        let rows = table.render_rows();
        let count = rows.len();

        blocking(move || write_csv(&dir, &path, &headers, &rows)).await?;
        debug!("Replaced {} with {} rows", location, count);
        Ok(())
    }

    async fn exists(&self, location: &TableLocation) -> Result<bool> {
        Ok(self.path_for(location).is_file())
    }

    async fn list_tables(&self, layer: Layer) -> Result<Vec<String>> {
        let dir = self.dir(layer).to_path_buf();
        blocking(move || {
            if !dir.is_dir() {
                return Ok(Vec::new());
            }
            let mut names = Vec::new();
            for entry in fs::read_dir(&dir)? {
                let entry = entry?;
                if !entry.file_type()?.is_file() {
                    continue;
                }
                if let Some(name) = entry
                    .file_name()
                    .to_str()
                    .and_then(|f| CsvTableStore::table_name(layer, f))
                {
                    names.push(name);
                }
            }
            names.sort();
            Ok(names)
        })
        .await
    }
}
