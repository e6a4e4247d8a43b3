use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::aggregator::{default_plans, Derivation, DerivationPlan};
use super::cleaner::{catalog, CleaningRule};
use super::context::RunContext;
use super::steps::{CleanStep, DeriveStep, PipelineStep, StepResult};
use crate::config::{Config, ErrorHandlingStrategy};
use crate::metrics::{AggregatorMetrics, CleanerMetrics};

/// Runs the clean phase, then the aggregation phase, over one [`RunContext`].
pub struct PipelineOrchestrator {
    rules: Vec<CleaningRule>,
    plans: Vec<DerivationPlan>,
}

impl PipelineOrchestrator {
    /// Every catalog table and every derivation.
    pub fn new(config: &Config) -> Self {
        Self {
            rules: catalog::default_rules(),
            plans: default_plans(&config.segmentation),
        }
    }

    pub fn with_rules(mut self, rules: Vec<CleaningRule>) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_plans(mut self, plans: Vec<DerivationPlan>) -> Self {
        self.plans = plans;
        self
    }

    pub fn rules(&self) -> &[CleaningRule] {
        &self.rules
    }

    pub fn plans(&self) -> &[DerivationPlan] {
        &self.plans
    }

    /// Restrict the clean phase to `tables`. An empty list keeps every rule.
    pub fn select_tables(mut self, tables: &[String]) -> Result<Self> {
        if tables.is_empty() {
            return Ok(self);
        }
        for table in tables {
            if !self.rules.iter().any(|r| &r.table == table) {
                bail!("no cleaning rule for table '{}'", table);
            }
        }
        self.rules.retain(|r| tables.contains(&r.table));
        Ok(self)
    }

    /// Restrict the aggregation phase to the named derivations. An empty list keeps every plan.
    pub fn select_derivations(mut self, names: &[String]) -> Result<Self> {
        if names.is_empty() {
            return Ok(self);
        }
        let mut selected = BTreeSet::new();
        for name in names {
            match Derivation::from_name(name) {
                Some(d) => {
                    selected.insert(d);
                }
                None => bail!("unknown derivation '{}'", name),
            }
        }
        self.plans.retain(|p| selected.contains(&p.derivation()));
        Ok(self)
    }

    /// Clean every table, wait for all of them, then derive the gold tables.
    pub async fn run(&self, ctx: &RunContext) -> Result<PipelineExecutionResult> {
        info!(
            "🚀 Starting pipeline '{}' (run {}): {} tables, {} derivations",
            ctx.config.name,
            ctx.run_id,
            self.rules.len(),
            self.plans.len()
        );
        let mut result = PipelineExecutionResult::new(&ctx.config.name, ctx);

        let failed_tables = self.clean_into(ctx, &mut result).await?;

        if !failed_tables.is_empty()
            && ctx.config.execution.error_handling == ErrorHandlingStrategy::StopOnFirstError
        {
            error!(
                "⏹️ Skipping aggregation: {} table(s) failed to clean: {}",
                failed_tables.len(),
                failed_tables.iter().cloned().collect::<Vec<_>>().join(", ")
            );
            result.aggregation_skipped = true;
        } else {
            self.derive_into(ctx, &failed_tables, &mut result).await?;
        }

        result.complete();
        result.log_summary();
        crate::metrics::record_run(result.success);
        Ok(result)
    }

    /// Only the clean phase.
    pub async fn run_clean(&self, ctx: &RunContext) -> Result<PipelineExecutionResult> {
        let mut result = PipelineExecutionResult::new(&ctx.config.name, ctx);
        self.clean_into(ctx, &mut result).await?;
        result.complete();
        result.log_summary();
        Ok(result)
    }

    /// Only the aggregation phase, over whatever the silver layer currently holds.
    pub async fn run_aggregate(&self, ctx: &RunContext) -> Result<PipelineExecutionResult> {
        let mut result = PipelineExecutionResult::new(&ctx.config.name, ctx);
        self.derive_into(ctx, &BTreeSet::new(), &mut result).await?;
        result.complete();
        result.log_summary();
        Ok(result)
    }

    /// Returns the tables whose clean failed.
    async fn clean_into(
        &self,
        ctx: &RunContext,
        result: &mut PipelineExecutionResult,
    ) -> Result<BTreeSet<String>> {
        info!("🧹 Cleaning {} source tables", self.rules.len());
        let steps: Vec<Arc<dyn PipelineStep>> = self
            .rules
            .iter()
            .map(|rule| Arc::new(CleanStep::new(rule.clone())) as Arc<dyn PipelineStep>)
            .collect();

        let outcomes = run_bounded(ctx, steps).await;

        let mut failed = BTreeSet::new();
        for (rule, (name, outcome)) in self.rules.iter().zip(outcomes) {
            if !outcome.success {
                CleanerMetrics::record_table_failed(&rule.table);
                failed.insert(rule.table.clone());
            }
            result.add_step_result(name, outcome);
        }
        Ok(failed)
    }

    async fn derive_into(
        &self,
        ctx: &RunContext,
        failed_tables: &BTreeSet<String>,
        result: &mut PipelineExecutionResult,
    ) -> Result<()> {
        info!("📊 Deriving {} gold tables", self.plans.len());
        let schemas: BTreeMap<String, _> = catalog::default_rules()
            .into_iter()
            .chain(self.rules.iter().cloned())
            .map(|rule| (rule.table.clone(), rule.validated_schema()))
            .collect();

        let steps: Vec<Arc<dyn PipelineStep>> = self
            .plans
            .iter()
            .map(|plan| {
                Arc::new(DeriveStep::new(plan.clone(), schemas.clone(), failed_tables.clone()))
                    as Arc<dyn PipelineStep>
            })
            .collect();

        let outcomes = run_bounded(ctx, steps).await;

        for (plan, (name, outcome)) in self.plans.iter().zip(outcomes) {
            if !outcome.success {
                AggregatorMetrics::record_failure(plan.derivation().slug());
            }
            result.add_step_result(name, outcome);
        }
        Ok(())
    }
}

/// Run `steps` concurrently, at most `max_parallel` at a time, and return their results in
/// the order given. A step that errors or panics becomes a failed [`StepResult`]; it does not
/// stop its siblings.
async fn run_bounded(
    ctx: &RunContext,
    steps: Vec<Arc<dyn PipelineStep>>,
) -> Vec<(String, StepResult)> {
    let semaphore = Arc::new(Semaphore::new(ctx.config.execution.max_parallel.max(1)));
    let names: Vec<String> = steps.iter().map(|s| s.step_name().to_string()).collect();
    let mut tasks = JoinSet::new();

    for (index, step) in steps.into_iter().enumerate() {
        let ctx = ctx.clone();
        let semaphore = Arc::clone(&semaphore);
        let name = names[index].clone();
        tasks.spawn(async move {
            let outcome = match semaphore.acquire_owned().await {
                Ok(_permit) => match tokio::spawn(async move { step.execute(&ctx).await }).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(e)) => {
                        error!("❌ Step '{}' failed: {:#}", name, e);
                        StepResult::failure(format!("{:#}", e))
                    }
                    Err(e) => {
                        error!("❌ Step '{}' aborted: {}", name, e);
                        StepResult::failure(format!("step aborted: {}", e))
                    }
                },
                Err(e) => StepResult::failure(format!("could not schedule step: {}", e)),
            };
            (index, outcome)
        });
    }

    let mut outcomes: Vec<Option<StepResult>> = vec![None; names.len()];
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, outcome)) => outcomes[index] = Some(outcome),
            Err(e) => error!("❌ Step task did not complete: {}", e),
        }
    }

    names
        .into_iter()
        .zip(outcomes)
        .map(|(name, outcome)| {
            let outcome =
                outcome.unwrap_or_else(|| StepResult::failure("step did not complete".to_string()));
            (name, outcome)
        })
        .collect()
}

/// Result of executing a complete pipeline
#[derive(Debug, Clone)]
pub struct PipelineExecutionResult {
    pub pipeline_name: String,
    pub run_id: uuid::Uuid,
    pub success: bool,
    pub total_processed: usize,
    pub total_failed: usize,
    /// Step results in execution order: table-cleans first, then derivations.
    pub step_results: Vec<(String, StepResult)>,
    pub aggregation_skipped: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PipelineExecutionResult {
    pub fn new(pipeline_name: &str, ctx: &RunContext) -> Self {
        Self {
            pipeline_name: pipeline_name.to_string(),
            run_id: ctx.run_id,
            success: true,
            total_processed: 0,
            total_failed: 0,
            step_results: Vec::new(),
            aggregation_skipped: false,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn add_step_result(&mut self, step_name: String, result: StepResult) {
        self.total_processed += result.processed_count;
        if !result.success {
            self.success = false;
            self.total_failed += 1;
        }
        self.step_results.push((step_name, result));
    }

    pub fn step(&self, step_name: &str) -> Option<&StepResult> {
        self.step_results
            .iter()
            .find(|(name, _)| name == step_name)
            .map(|(_, result)| result)
    }

    pub fn failed_steps(&self) -> impl Iterator<Item = &(String, StepResult)> {
        self.step_results.iter().filter(|(_, r)| !r.success)
    }

    pub fn complete(&mut self) {
        if self.aggregation_skipped {
            self.success = false;
        }
        self.completed_at = Some(Utc::now());
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        self.completed_at.map(|end| end - self.started_at)
    }

    fn log_summary(&self) {
        let elapsed = self.duration().map(|d| d.num_milliseconds()).unwrap_or_default();
        if self.success {
            info!(
                "🎉 Pipeline '{}' completed in {}ms: {} steps, {} rows written",
                self.pipeline_name,
                elapsed,
                self.step_results.len(),
                self.total_processed
            );
        } else {
            for (name, result) in self.failed_steps() {
                warn!("⚠️ {}: {}", name, result.message);
            }
            error!(
                "💥 Pipeline '{}' failed in {}ms: {} of {} steps failed",
                self.pipeline_name,
                elapsed,
                self.total_failed,
                self.step_results.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecutionMode;
    use crate::constants::*;
    use async_trait::async_trait;
    use lakehouse_core::{
        InMemoryTableStore, Layer, QueryEngine, QueryStatement, TableLocation, TableStore,
    };
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct RecordingQueryEngine {
        statements: Arc<Mutex<Vec<QueryStatement>>>,
    }

    #[async_trait]
    impl QueryEngine for RecordingQueryEngine {
        async fn run_query(&self, statement: &QueryStatement) -> lakehouse_core::Result<()> {
            self.statements.lock().unwrap().push(statement.clone());
            Ok(())
        }
    }

    fn seed_sources(store: &InMemoryTableStore) {
        store
            .seed(
                TableLocation::bronze(PRODUCTS),
                &["ProductID", "Name", "Category", "Price"],
                &[&["10", " Widget ", "Tools", "$5.00"], &["11", "Gadget", "Toys", "$7.50"]],
            )
            .unwrap();
        store
            .seed(
                TableLocation::bronze(ONLINE_TRANSACTIONS),
                &["OrderID", "CustomerID", "ProductID", "DateTime", "PaymentMethod", "Amount", "Status"],
                &[
                    &["1", "100", "10", "2024-03-04 09:10", "Card", "$20.00", "Paid"],
                    &["1", "100", "10", "2024-03-04 09:10", "Card", "$20.00", "Paid"],
                    &["2", "101", "10", "2024-03-04 10:00", "Card", "$1,000.00", "Paid"],
                ],
            )
            .unwrap();
        store
            .seed(
                TableLocation::bronze(IN_STORE_TRANSACTIONS),
                &["TransactionID", "CustomerID", "StoreID", "DateTime", "Amount", "PaymentMethod"],
                &[&["1", "100", "3", "2024-03-03 08:00", "$5.00", "Cash"]],
            )
            .unwrap();
        store
            .seed(
                TableLocation::bronze(LOYALTY_ACCOUNTS),
                &["LoyaltyID", "CustomerID", "PointsEarned", "TierLevel", "JoinDate"],
                &[&["1", "100", "500", "Gold", "2023-01-01"]],
            )
            .unwrap();
        store
            .seed(
                TableLocation::bronze(AGENTS),
                &["AgentID", "Name", "Department", "Shift"],
                &[&["1", "Ann", "Support", "Day"]],
            )
            .unwrap();
        store
            .seed(
                TableLocation::bronze(CUSTOMER_SERVICE_INTERACTIONS),
                &["InteractionID", "CustomerID", "DateTime", "AgentID", "IssueType", "ResolutionStatus"],
                &[
                    &["1", "100", "", "1", "Billing", "Resolved"],
                    &["2", "101", "", "1", "Billing", "Open"],
                ],
            )
            .unwrap();
    }

    fn orchestrator(config: &Config) -> PipelineOrchestrator {
        let tables: Vec<String> = [
            PRODUCTS,
            ONLINE_TRANSACTIONS,
            IN_STORE_TRANSACTIONS,
            LOYALTY_ACCOUNTS,
            AGENTS,
            CUSTOMER_SERVICE_INTERACTIONS,
        ]
        .iter()
        .map(|t| t.to_string())
        .collect();
        PipelineOrchestrator::new(config).select_tables(&tables).unwrap()
    }

    #[tokio::test]
    async fn full_run_writes_silver_and_gold() {
        let store = InMemoryTableStore::new();
        seed_sources(&store);
        let config = Config::default();
        let ctx = RunContext::acquire(config.clone(), Arc::new(store.clone()));

        let result = orchestrator(&config).run(&ctx).await.unwrap();
        ctx.finish();

        assert!(result.success, "failed steps: {:?}", result.failed_steps().collect::<Vec<_>>());
        assert_eq!(result.step_results.len(), 10);
        assert_eq!(
            result.step("clean:OnlineTransactions").unwrap().metadata["duplicates_dropped"],
            "1"
        );

        let silver = store.list_tables(Layer::Silver).await.unwrap();
        assert_eq!(silver.len(), 6);
        let gold = store.list_tables(Layer::Gold).await.unwrap();
        assert_eq!(gold.len(), 4);

        let aov = store
            .stored_rows(&TableLocation::gold(AOV_PRODUCT_CATEGORY_LOCATION))
            .unwrap()
            .unwrap();
        assert_eq!(aov.len(), 2);
        assert_eq!(aov[0][0].as_deref(), Some("10"));
        assert_eq!(aov[0][1].as_deref(), Some("Widget"));
        assert_eq!(aov[0][5].as_deref(), Some("2"));
        assert_eq!(aov[1][5].as_deref(), Some("0"));
        assert_eq!(aov[1][6], None);
    }

    #[tokio::test]
    async fn failed_clean_only_fails_dependent_derivations() {
        let store = InMemoryTableStore::new();
        seed_sources(&store);
        // the agents table never landed
        store.remove(&TableLocation::bronze(AGENTS)).unwrap();
        let config = Config::default();
        let ctx = RunContext::acquire(config.clone(), Arc::new(store.clone()));

        let result = orchestrator(&config).run(&ctx).await.unwrap();

        assert!(!result.success);
        assert!(!result.step("clean:Agents").unwrap().success);
        let summary = result.step("derive:Agent_Interaction_Summary").unwrap();
        assert!(!summary.success);
        assert!(summary.message.contains("Missing input table 'Agents'"));
        assert!(result.step("derive:AOV_Product_Category_Location").unwrap().success);
        assert!(result.step("derive:Customer_Segmentation").unwrap().success);
        assert!(!store.exists(&TableLocation::gold(AGENT_INTERACTION_SUMMARY)).await.unwrap());
    }

    #[tokio::test]
    async fn stale_silver_table_is_not_used_after_failed_clean() {
        let store = InMemoryTableStore::new();
        seed_sources(&store);
        let config = Config::default();
        let first = RunContext::acquire(config.clone(), Arc::new(store.clone()));
        orchestrator(&config).run(&first).await.unwrap();

        store.remove(&TableLocation::bronze(AGENTS)).unwrap();
        store.remove(&TableLocation::gold(AGENT_INTERACTION_SUMMARY)).unwrap();
        let second = RunContext::acquire(config.clone(), Arc::new(store.clone()));
        let result = orchestrator(&config).run(&second).await.unwrap();

        assert!(store.exists(&TableLocation::silver(AGENTS)).await.unwrap());
        assert!(!result.step("derive:Agent_Interaction_Summary").unwrap().success);
        assert!(!store.exists(&TableLocation::gold(AGENT_INTERACTION_SUMMARY)).await.unwrap());
    }

    #[tokio::test]
    async fn stop_on_first_error_skips_aggregation() {
        let store = InMemoryTableStore::new();
        seed_sources(&store);
        store.remove(&TableLocation::bronze(AGENTS)).unwrap();
        let mut config = Config::default();
        config.execution.error_handling = ErrorHandlingStrategy::StopOnFirstError;
        let ctx = RunContext::acquire(config.clone(), Arc::new(store.clone()));

        let result = orchestrator(&config).run(&ctx).await.unwrap();

        assert!(result.aggregation_skipped);
        assert!(!result.success);
        assert_eq!(result.step_results.len(), 6);
        assert!(store.list_tables(Layer::Gold).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sql_mode_hands_statements_to_the_engine() {
        let store = InMemoryTableStore::new();
        seed_sources(&store);
        let engine = RecordingQueryEngine::default();
        let mut config = Config::default();
        config.execution.mode = ExecutionMode::Sql;
        let ctx = RunContext::acquire(config.clone(), Arc::new(store.clone()))
            .with_query_engine(Arc::new(engine.clone()));

        let result = orchestrator(&config).run(&ctx).await.unwrap();

        assert!(result.success);
        let statements = engine.statements.lock().unwrap();
        assert_eq!(statements.len(), 4);
        assert!(statements
            .iter()
            .any(|s| s.output == TableLocation::gold(CUSTOMER_SEGMENTATION)));
        assert!(store.list_tables(Layer::Gold).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sql_mode_without_engine_fails_each_derivation() {
        let store = InMemoryTableStore::new();
        seed_sources(&store);
        let mut config = Config::default();
        config.execution.mode = ExecutionMode::Sql;
        let ctx = RunContext::acquire(config.clone(), Arc::new(store));

        let result = orchestrator(&config).run(&ctx).await.unwrap();
        assert_eq!(result.failed_steps().count(), 4);
    }

    #[tokio::test]
    async fn aggregate_alone_reads_existing_silver_tables() {
        let store = InMemoryTableStore::new();
        seed_sources(&store);
        let config = Config::default();
        let ctx = RunContext::acquire(config.clone(), Arc::new(store.clone()));
        orchestrator(&config).run_clean(&ctx).await.unwrap();

        let result = PipelineOrchestrator::new(&config)
            .select_derivations(&["peak".to_string()])
            .unwrap()
            .run_aggregate(&ctx)
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.step_results.len(), 1);
        assert!(store.exists(&TableLocation::gold(PEAK_DAY_HOUR_BY_CHANNEL)).await.unwrap());
    }

    #[tokio::test]
    async fn overflowing_derivation_fails_alone() {
        let store = InMemoryTableStore::new();
        seed_sources(&store);
        let max = "$79,228,162,514,264,337,593,543,950,335";
        store
            .seed(
                TableLocation::bronze(ONLINE_TRANSACTIONS),
                &["OrderID", "CustomerID", "ProductID", "DateTime", "PaymentMethod", "Amount", "Status"],
                &[
                    &["1", "200", "10", "2024-03-04 09:10", "Card", max, "Paid"],
                    &["2", "201", "10", "2024-03-04 10:00", "Card", max, "Paid"],
                ],
            )
            .unwrap();
        let config = Config::default();
        let ctx = RunContext::acquire(config.clone(), Arc::new(store.clone()));

        let result = orchestrator(&config).run(&ctx).await.unwrap();

        let aov = result.step("derive:AOV_Product_Category_Location").unwrap();
        assert!(!aov.success);
        assert!(aov.message.contains("overflow"));
        assert_eq!(result.total_failed, 1);
        assert!(result.step("derive:Customer_Segmentation").unwrap().success);
        assert!(!store.exists(&TableLocation::gold(AOV_PRODUCT_CATEGORY_LOCATION)).await.unwrap());
        assert!(store.exists(&TableLocation::gold(PEAK_DAY_HOUR_BY_CHANNEL)).await.unwrap());
    }

    struct PanickingStep;

    #[async_trait]
    impl PipelineStep for PanickingStep {
        async fn execute(&self, _ctx: &RunContext) -> anyhow::Result<StepResult> {
            panic!("step blew up");
        }

        fn step_name(&self) -> &str {
            "panicking"
        }
    }

    struct CountingStep;

    #[async_trait]
    impl PipelineStep for CountingStep {
        async fn execute(&self, _ctx: &RunContext) -> anyhow::Result<StepResult> {
            Ok(StepResult::success(3, "counted".to_string()))
        }

        fn step_name(&self) -> &str {
            "counting"
        }
    }

    #[tokio::test]
    async fn panicking_step_becomes_a_failed_result() {
        let ctx = RunContext::acquire(Config::default(), Arc::new(InMemoryTableStore::new()));
        let steps: Vec<Arc<dyn PipelineStep>> =
            vec![Arc::new(PanickingStep), Arc::new(CountingStep)];

        let outcomes = run_bounded(&ctx, steps).await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].0, "panicking");
        assert!(!outcomes[0].1.success);
        assert!(outcomes[0].1.message.contains("step aborted"));
        assert_eq!(outcomes[1].0, "counting");
        assert!(outcomes[1].1.success);
        assert_eq!(outcomes[1].1.processed_count, 3);
    }

    #[test]
    fn unknown_selection_is_rejected() {
        let config = Config::default();
        assert!(PipelineOrchestrator::new(&config)
            .select_tables(&["Suppliers".to_string()])
            .is_err());
        assert!(PipelineOrchestrator::new(&config)
            .select_derivations(&["forecast".to_string()])
            .is_err());
    }
}
