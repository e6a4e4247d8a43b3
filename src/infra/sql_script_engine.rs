use async_trait::async_trait;
use lakehouse_core::{PipelineError, QueryEngine, QueryStatement, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::info;

/// A [`QueryEngine`] that leaves each statement as `<dir>/<Output>.sql` for a warehouse job
/// to pick up. Re-running a derivation replaces its script.
#[derive(Debug, Clone)]
pub struct SqlScriptQueryEngine {
    dir: PathBuf,
}

impl SqlScriptQueryEngine {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn script_path(&self, statement: &QueryStatement) -> PathBuf {
        self.dir.join(format!("{}.sql", statement.output.name))
    }
}

fn write_script(dir: &Path, path: &Path, sql: &str) -> Result<()> {
    fs::create_dir_all(dir)?;
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(sql.as_bytes())?;
    file.as_file_mut().sync_all()?;
    file.persist(path).map_err(|e| PipelineError::Io(e.error))?;
    Ok(())
}

#[async_trait]
impl QueryEngine for SqlScriptQueryEngine {
    async fn run_query(&self, statement: &QueryStatement) -> Result<()> {
        let dir = self.dir.clone();
        let path = self.script_path(statement);
        let sql = statement.sql.clone();

        let target = path.clone();
        tokio::task::spawn_blocking(move || write_script(&dir, &target, &sql))
            .await
            .map_err(|e| PipelineError::Query {
                message: format!("script task failed: {e}"),
            })??;

        info!("📝 Wrote statement for {} to {}", statement.output, path.display());
        Ok(())
    }
}
