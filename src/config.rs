use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::constants::{CHAMPION_TIERS, DEFAULT_SPEND_BUCKETS};
use crate::error::{ConfigError, Result};

pub const DEFAULT_CONFIG_PATH: &str = "lakehouse.toml";

/// Pipeline configuration, loaded from TOML. Every section is optional.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub segmentation: SegmentationConfig,
    #[serde(default)]
    pub sql: SqlConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_bronze_dir")]
    pub bronze_dir: PathBuf,
    #[serde(default = "default_silver_dir")]
    pub silver_dir: PathBuf,
    #[serde(default = "default_gold_dir")]
    pub gold_dir: PathBuf,
    /// Where rendered statements are written in `sql` execution mode.
    #[serde(default = "default_sql_dir")]
    pub sql_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub mode: ExecutionMode,
    /// Upper bound on concurrently running table-cleans and derivations.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
    #[serde(default)]
    pub error_handling: ErrorHandlingStrategy,
}

/// How derived tables are produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Evaluate derivations in this process over the validated tables.
    #[default]
    InProcess,
    /// Render each derivation to SQL and hand it to the configured query engine.
    Sql,
}

/// Strategy for handling table-clean failures before the aggregation phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorHandlingStrategy {
    /// Skip the aggregation phase if any table failed to clean
    StopOnFirstError,
    /// Run the aggregation phase; derivations whose inputs failed to clean fail on their own
    #[default]
    ContinueOnError,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SegmentationConfig {
    #[serde(default = "default_buckets")]
    pub buckets: u32,
    #[serde(default = "default_champion_tiers")]
    pub champion_tiers: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SqlConfig {
    #[serde(default = "default_silver_dataset")]
    pub silver_dataset: String,
    #[serde(default = "default_gold_dataset")]
    pub gold_dataset: String,
}

fn default_name() -> String {
    "lakehouse".to_string()
}

fn default_bronze_dir() -> PathBuf {
    PathBuf::from("data/bronze")
}

fn default_silver_dir() -> PathBuf {
    PathBuf::from("data/silver")
}

fn default_gold_dir() -> PathBuf {
    PathBuf::from("data/gold")
}

fn default_sql_dir() -> PathBuf {
    PathBuf::from("data/sql")
}

fn default_max_parallel() -> usize {
    4
}

fn default_buckets() -> u32 {
    DEFAULT_SPEND_BUCKETS
}

fn default_champion_tiers() -> Vec<String> {
    CHAMPION_TIERS.iter().map(|t| t.to_string()).collect()
}

fn default_silver_dataset() -> String {
    "silverlayer".to_string()
}

fn default_gold_dataset() -> String {
    "goldlayer".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bronze_dir: default_bronze_dir(),
            silver_dir: default_silver_dir(),
            gold_dir: default_gold_dir(),
            sql_dir: default_sql_dir(),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::default(),
            max_parallel: default_max_parallel(),
            error_handling: ErrorHandlingStrategy::default(),
        }
    }
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            buckets: default_buckets(),
            champion_tiers: default_champion_tiers(),
        }
    }
}

impl Default for SqlConfig {
    fn default() -> Self {
        Self {
            silver_dataset: default_silver_dataset(),
            gold_dataset: default_gold_dataset(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: default_name(),
            storage: StorageConfig::default(),
            execution: ExecutionConfig::default(),
            segmentation: SegmentationConfig::default(),
            sql: SqlConfig::default(),
        }
    }
}

impl Config {
    pub fn from_toml(input: &str) -> Result<Self> {
        let config: Config = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path`, apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut config = Self::from_toml(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        info!("Loaded configuration '{}' from {}", config.name, path.display());
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }
        warn!("Config file {} not found, using defaults", path.display());
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("LAKEHOUSE_BRONZE_DIR") {
            self.storage.bronze_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("LAKEHOUSE_SILVER_DIR") {
            self.storage.silver_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("LAKEHOUSE_GOLD_DIR") {
            self.storage.gold_dir = PathBuf::from(dir);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.segmentation.buckets == 0 {
            return Err(ConfigError::Invalid(
                "segmentation.buckets must be at least 1".into(),
            ));
        }
        if self.execution.max_parallel == 0 {
            return Err(ConfigError::Invalid(
                "execution.max_parallel must be at least 1".into(),
            ));
        }
        if self.sql.silver_dataset.trim().is_empty() || self.sql.gold_dataset.trim().is_empty() {
            return Err(ConfigError::Invalid("sql datasets must not be empty".into()));
        }
        Ok(())
    }
}
