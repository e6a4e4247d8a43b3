use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

use lakehouse::config::{Config, ExecutionMode, DEFAULT_CONFIG_PATH};
use lakehouse::infra::{CsvTableStore, SqlScriptQueryEngine};
use lakehouse::pipeline::aggregator::SqlRenderer;
use lakehouse::pipeline::{PipelineExecutionResult, PipelineOrchestrator, RunContext};
use lakehouse::{logging, metrics};

#[derive(Parser)]
#[command(name = "lakehouse")]
#[command(about = "Clean raw retail tables and derive the analytical layer")]
#[command(version)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean every source table, then derive every gold table
    Run,
    /// Clean source tables into the validated layer
    Clean {
        /// Only clean these tables (repeatable)
        #[arg(long = "table")]
        tables: Vec<String>,
    },
    /// Derive gold tables from the current validated layer
    Aggregate {
        /// Only run these derivations, by short name or output table (repeatable)
        #[arg(long = "only")]
        only: Vec<String>,
    },
    /// Print the SQL statement for each derivation
    Sql {
        #[arg(long)]
        derivation: Option<String>,
    },
    /// Print the cleaning rule catalog as JSON
    Rules,
}

fn build_context(config: Config) -> RunContext {
    let store = Arc::new(CsvTableStore::from_config(&config.storage));
    let sql_dir = config.storage.sql_dir.clone();
    let sql_mode = config.execution.mode == ExecutionMode::Sql;

    let ctx = RunContext::acquire(config, store);
    if sql_mode {
        ctx.with_query_engine(Arc::new(SqlScriptQueryEngine::new(sql_dir)))
    } else {
        ctx
    }
}

fn print_result(result: &PipelineExecutionResult) {
    println!("\n📊 Pipeline results for '{}' (run {}):", result.pipeline_name, result.run_id);
    for (name, step) in &result.step_results {
        let marker = if step.success { "✅" } else { "❌" };
        println!("   {} {}: {}", marker, name, step.message);
    }
    if result.aggregation_skipped {
        println!("   ⏹️  Aggregation skipped after clean failures");
    }
    println!(
        "   Steps: {}, failed: {}, rows written: {}",
        result.step_results.len(),
        result.total_failed,
        result.total_processed
    );
}

async fn execute(cli: Cli) -> Result<bool> {
    let config = Config::load_or_default(&cli.config)?;
    let orchestrator = PipelineOrchestrator::new(&config);

    match cli.command {
        Commands::Run => {
            let ctx = build_context(config);
            let result = orchestrator.run(&ctx).await?;
            ctx.finish();
            print_result(&result);
            Ok(result.success)
        }
        Commands::Clean { tables } => {
            let orchestrator = orchestrator.select_tables(&tables)?;
            let ctx = build_context(config);
            let result = orchestrator.run_clean(&ctx).await?;
            ctx.finish();
            print_result(&result);
            Ok(result.success)
        }
        Commands::Aggregate { only } => {
            let orchestrator = orchestrator.select_derivations(&only)?;
            let ctx = build_context(config);
            let result = orchestrator.run_aggregate(&ctx).await?;
            ctx.finish();
            print_result(&result);
            Ok(result.success)
        }
        Commands::Sql { derivation } => {
            let selection: Vec<String> = derivation.into_iter().collect();
            let orchestrator = orchestrator.select_derivations(&selection)?;
            let renderer = SqlRenderer::from_config(&config.sql);
            for plan in orchestrator.plans() {
                println!("-- {}\n{}", plan.derivation(), renderer.render(plan).sql);
            }
            Ok(true)
        }
        Commands::Rules => {
            println!("{}", serde_json::to_string_pretty(orchestrator.rules())?);
            Ok(true)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let _guard = logging::init_logging("logs");
    metrics::init_metrics();

    let cli = Cli::parse();
    info!("Starting lakehouse");

    match execute(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            error!("Pipeline finished with failures");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("{:#}", e);
            eprintln!("❌ {:#}", e);
            ExitCode::FAILURE
        }
    }
}
