use anyhow::{anyhow, Result};
use async_trait::async_trait;
use lakehouse_core::{PipelineError, Table, TableLocation, TableSchema};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Instant;
use tracing::{debug, info};

use super::aggregator::{self, DerivationPlan, SqlRenderer, ValidatedLayer};
use super::cleaner::{self, CleaningRule};
use super::context::RunContext;
use crate::config::ExecutionMode;
use crate::metrics::{AggregatorMetrics, CleanerMetrics};

/// Common trait for all pipeline steps
#[async_trait]
pub trait PipelineStep: Send + Sync {
    async fn execute(&self, ctx: &RunContext) -> Result<StepResult>;

    fn step_name(&self) -> &str;
}

/// Result of executing a pipeline step
#[derive(Debug, Clone)]
pub struct StepResult {
    pub success: bool,
    pub processed_count: usize,
    pub failed_count: usize,
    pub error_count: usize,
    pub message: String,
    pub metadata: HashMap<String, String>,
}

impl StepResult {
    pub fn success(processed: usize, message: String) -> Self {
        Self {
            success: true,
            processed_count: processed,
            failed_count: 0,
            error_count: 0,
            message,
            metadata: HashMap::new(),
        }
    }

    pub fn failure(message: String) -> Self {
        Self {
            success: false,
            processed_count: 0,
            failed_count: 0,
            error_count: 1,
            message,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl ToString) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}

/// Reads one bronze table, cleans it and replaces its silver table.
pub struct CleanStep {
    rule: CleaningRule,
    name: String,
}

impl CleanStep {
    pub fn new(rule: CleaningRule) -> Self {
        let name = format!("clean:{}", rule.table);
        Self { rule, name }
    }
}

#[async_trait]
impl PipelineStep for CleanStep {
    async fn execute(&self, ctx: &RunContext) -> Result<StepResult> {
        let started = Instant::now();
        let source = TableLocation::bronze(&self.rule.table);
        let target = TableLocation::silver(&self.rule.table);
        debug!("Cleaning {} into {}", source, target);

        let raw = ctx.store.read_table(&source, &self.rule.schema).await?;
        let (validated, report) = cleaner::clean_with_report(&raw, &self.rule)?;
        ctx.store.write_table(&target, validated.table()).await?;

        CleanerMetrics::record_table_cleaned(&report, started.elapsed().as_secs_f64());
        let message = format!(
            "{}: {} rows read, {} duplicates dropped, {} rows missing required fields, {} written",
            self.rule.table,
            report.rows_read,
            report.duplicates_dropped,
            report.required_field_drops,
            report.rows_written
        );
        info!("✅ {}", message);

        Ok(StepResult::success(report.rows_written, message)
            .with_metadata("rows_read", report.rows_read)
            .with_metadata("duplicates_dropped", report.duplicates_dropped)
            .with_metadata("malformed_cells", report.malformed_cells)
            .with_metadata("currency_coercion_failures", report.currency_coercion_failures)
            .with_metadata("required_field_drops", report.required_field_drops)
            .with_metadata("fingerprint", validated.fingerprint()))
    }

    fn step_name(&self) -> &str {
        &self.name
    }
}

/// Produces one gold table from the silver layer, in process or through the query engine.
pub struct DeriveStep {
    plan: DerivationPlan,
    /// Validated schema of every table the catalog can produce.
    schemas: BTreeMap<String, TableSchema>,
    /// Inputs whose clean failed in this run; their silver tables must not be used.
    unavailable: BTreeSet<String>,
    name: String,
}

impl DeriveStep {
    pub fn new(
        plan: DerivationPlan,
        schemas: BTreeMap<String, TableSchema>,
        unavailable: BTreeSet<String>,
    ) -> Self {
        let name = format!("derive:{}", plan.output());
        Self {
            plan,
            schemas,
            unavailable,
            name,
        }
    }

    fn missing(&self, table: &str) -> PipelineError {
        PipelineError::MissingInputTable {
            derivation: self.plan.output().to_string(),
            table: table.to_string(),
        }
    }

    /// Load every input from the silver layer, typed against its validated schema.
    async fn load_inputs(&self, ctx: &RunContext) -> Result<ValidatedLayer> {
        let mut layer = ValidatedLayer::new();
        for input in self.plan.inputs() {
            if self.unavailable.contains(input) {
                return Err(self.missing(input).into());
            }
            let schema = self.schemas.get(input).ok_or_else(|| self.missing(input))?;
            let raw = match ctx.store.read_table(&TableLocation::silver(input), schema).await {
                Ok(raw) => raw,
                Err(PipelineError::TableNotFound(_)) => return Err(self.missing(input).into()),
                Err(e) => return Err(e.into()),
            };
            layer.insert(Table::parse(&raw));
        }
        Ok(layer)
    }

    async fn check_inputs_exist(&self, ctx: &RunContext) -> Result<()> {
        for input in self.plan.inputs() {
            if self.unavailable.contains(input)
                || !ctx.store.exists(&TableLocation::silver(input)).await?
            {
                return Err(self.missing(input).into());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PipelineStep for DeriveStep {
    async fn execute(&self, ctx: &RunContext) -> Result<StepResult> {
        let derivation = self.plan.derivation();
        let output = TableLocation::gold(self.plan.output());

        match ctx.config.execution.mode {
            ExecutionMode::InProcess => {
                let layer = self.load_inputs(ctx).await?;
                let (derived, report) = aggregator::evaluate_with_report(&self.plan, &layer)?;
                ctx.store.write_table(&output, &derived.table).await?;

                AggregatorMetrics::record_derivation(&report);
                let message = format!("{}: {} rows written", output, report.rows_written);
                info!("✅ {}", message);
                Ok(StepResult::success(report.rows_written, message)
                    .with_metadata("duration_ms", report.duration_ms))
            }
            ExecutionMode::Sql => {
                let engine = ctx
                    .query_engine
                    .as_ref()
                    .ok_or_else(|| anyhow!("sql execution mode requires a query engine"))?;
                self.check_inputs_exist(ctx).await?;

                let statement = SqlRenderer::from_config(&ctx.config.sql).render(&self.plan);
                engine.run_query(&statement).await?;

                AggregatorMetrics::record_statement_submitted(derivation.slug());
                let message = format!("{}: statement submitted", output);
                info!("✅ {}", message);
                Ok(StepResult::success(1, message).with_metadata("sql_bytes", statement.sql.len()))
            }
        }
    }

    fn step_name(&self) -> &str {
        &self.name
    }
}
