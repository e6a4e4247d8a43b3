use anyhow::Result;
use lakehouse::config::{Config, ExecutionMode, SegmentationConfig};
use lakehouse::infra::{CsvTableStore, SqlScriptQueryEngine};
use lakehouse::pipeline::aggregator::{Derivation, DerivationPlan};
use lakehouse::pipeline::cleaner::catalog;
use lakehouse::pipeline::{PipelineOrchestrator, RunContext};
use rust_decimal::Decimal;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tempfile::tempdir;

fn write(path: &Path, content: &str) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, content)?;
    Ok(())
}

/// Config rooted at `root`, with every layer in its own directory.
fn config_in(root: &Path) -> Config {
    let mut config = Config::default();
    config.name = "integration".to_string();
    config.storage.bronze_dir = root.join("bronze");
    config.storage.silver_dir = root.join("silver");
    config.storage.gold_dir = root.join("gold");
    config.storage.sql_dir = root.join("sql");
    config
}

fn seed_landing_zone(bronze: &Path) -> Result<()> {
    write(
        &bronze.join("Products.csv"),
        "ProductID,Name,Category,Price\n10,Widget,Tools,$5.00\n11,  Gadget  ,Toys,\"$1,250.00\"\n12,Broken,Toys,n/a\n",
    )?;
    write(
        &bronze.join("OnlineTransactions.csv"),
        "OrderID,CustomerID,ProductID,DateTime,PaymentMethod,Amount,Status\n\
         1,100,10,2024-03-04 09:10:00,Card,$20.00,Paid\n\
         1,100,10,2024-03-04 09:10:00,Card,$20.00,Paid\n\
         2,101,11,2024-03-04 09:45:00,Card,\"$1,250.00\",Paid\n\
         3,,11,2024-03-05 18:00:00,Card,$3.00,Paid\n",
    )?;
    write(
        &bronze.join("InStoreTransactions.csv"),
        "TransactionID,CustomerID,StoreID,DateTime,Amount,PaymentMethod\n\
         1,100,1,2024-03-03 08:00:00,$5.00,Cash\n\
         2,102,1,2024-03-03 08:30:00,$7.00,Cash\n",
    )?;
    write(
        &bronze.join("LoyaltyAccounts.csv"),
        "LoyaltyID,CustomerID,PointsEarned,TierLevel,JoinDate\n1,100,900,Gold,2023-01-01\n2,102,50,Platinum,2023-06-01\n",
    )?;
    write(
        &bronze.join("Agents.csv"),
        "AgentID,Name,Department,Shift\n1,Ann,Support,Day\n2,Bo,Billing,Night\n",
    )?;
    write(
        &bronze.join("CustomerServiceInteractions.csv"),
        "InteractionID,CustomerID,DateTime,AgentID,IssueType,ResolutionStatus\n\
         1,100,2024-03-04 10:00:00,1,Billing,Resolved\n\
         2,101,2024-03-04 11:00:00,1,Login,Open\n\
         3,102,2024-03-04 12:00:00,2,Login,Resolved\n",
    )?;
    write(
        &bronze.join("Customers.csv"),
        "CustomerID,Name,Email,Address\n100, Ann ,ann@example.com,1 Elm St\n101,Bo,bo@example.com,\n102,Cy,,3 Oak Ave\n",
    )?;
    write(
        &bronze.join("Stores.csv"),
        "StoreID,Location,Manager,OpenHours\n1,Seattle,Dee,9-5\n",
    )?;
    write(
        &bronze.join("LoyaltyTransactions.csv"),
        "LoyaltyID,DateTime,PointsChange,Reason\n1,2024-01-01 10:00,50,Purchase\n1,2024-01-01 10:00,50,Purchase\n1,2024-01-02 10:00,-20,Redeem\n",
    )?;
    Ok(())
}

fn gold_rows(root: &Path, table: &str) -> Result<Vec<Vec<String>>> {
    let mut reader = csv::Reader::from_path(root.join("gold").join(format!("{table}.csv")))?;
    let mut rows = Vec::new();
    for record in reader.records() {
        rows.push(record?.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

#[tokio::test]
async fn test_full_run_over_csv_layers() -> Result<()> {
    let temp_dir = tempdir()?;
    let root = temp_dir.path();
    seed_landing_zone(&root.join("bronze"))?;

    let config = config_in(root);
    let store = Arc::new(CsvTableStore::from_config(&config.storage));
    let ctx = RunContext::acquire(config.clone(), store);
    let result = PipelineOrchestrator::new(&config).run(&ctx).await?;
    ctx.finish();

    assert!(result.success, "failed: {:?}", result.failed_steps().collect::<Vec<_>>());
    assert_eq!(result.step_results.len(), 13);

    // Silver: one file per source table, carrying the cleaned suffix
    for table in lakehouse::constants::source_tables() {
        assert!(root.join("silver").join(format!("{table}_cleaned.csv")).is_file(), "{table}");
    }
    let products = fs::read_to_string(root.join("silver/Products_cleaned.csv"))?;
    assert_eq!(products, "ProductID,Name,Category,Price\n10,Widget,Tools,5.00\n11,Gadget,Toys,1250.00\n");
    let customers = fs::read_to_string(root.join("silver/Customers_cleaned.csv"))?;
    assert_eq!(customers, "CustomerID,Name,Email,Address\n100,Ann,ann@example.com,1 Elm St\n101,Bo,bo@example.com,\n");

    // Gold: AOV keeps products without orders and divides safely
    let aov = gold_rows(root, "AOV_Product_Category_Location")?;
    assert_eq!(aov[0][0..6], ["10", "Widget", "Tools", "", "20.00", "1"]);
    assert_eq!(Decimal::from_str(&aov[0][6])?, Decimal::from(20));
    assert_eq!(aov[1][0], "11");
    assert_eq!(aov[1][5], "1");

    let segmentation = gold_rows(root, "Customer_Segmentation")?;
    let labels: Vec<(&str, &str)> = segmentation
        .iter()
        .map(|r| (r[0].as_str(), r[5].as_str()))
        .collect();
    assert_eq!(
        labels,
        vec![
            ("101", "High-Value Customers"),
            ("100", "Loyalty Champions"),
            ("102", "One-Time Buyers"),
        ]
    );

    let peak = gold_rows(root, "Peak_DayHour_By_Channel")?;
    assert_eq!(peak[0], vec!["InStore", "1", "8", "2"]);
    assert_eq!(peak[1][0], "Online");

    let agents = gold_rows(root, "Agent_Interaction_Summary")?;
    assert_eq!(agents[0][0..4], ["1", "Ann", "2", "1"]);
    assert_eq!(agents[1][0..4], ["2", "Bo", "1", "1"]);
    Ok(())
}

#[tokio::test]
async fn test_cleaning_twice_is_byte_identical() -> Result<()> {
    let temp_dir = tempdir()?;
    let root = temp_dir.path();
    seed_landing_zone(&root.join("bronze"))?;
    let config = config_in(root);

    let mut snapshots = Vec::new();
    for _ in 0..2 {
        let ctx = RunContext::acquire(config.clone(), Arc::new(CsvTableStore::from_config(&config.storage)));
        let result = PipelineOrchestrator::new(&config).run_clean(&ctx).await?;
        assert!(result.success);
        snapshots.push(fs::read(root.join("silver/OnlineTransactions_cleaned.csv"))?);
    }
    assert_eq!(snapshots[0], snapshots[1]);
    Ok(())
}

#[tokio::test]
async fn test_sql_mode_writes_scripts() -> Result<()> {
    let temp_dir = tempdir()?;
    let root = temp_dir.path();
    seed_landing_zone(&root.join("bronze"))?;

    let mut config = config_in(root);
    config.execution.mode = ExecutionMode::Sql;
    let ctx = RunContext::acquire(config.clone(), Arc::new(CsvTableStore::from_config(&config.storage)))
        .with_query_engine(Arc::new(SqlScriptQueryEngine::new(&config.storage.sql_dir)));
    let result = PipelineOrchestrator::new(&config).run(&ctx).await?;

    assert!(result.success);
    let script = fs::read_to_string(root.join("sql/Customer_Segmentation.sql"))?;
    assert!(script.starts_with("CREATE OR REPLACE TABLE goldlayer.Customer_Segmentation AS"));
    assert_eq!(fs::read_dir(root.join("sql"))?.count(), 4);
    assert!(!root.join("gold").exists());
    Ok(())
}

#[tokio::test]
async fn test_missing_landing_file_fails_only_its_dependents() -> Result<()> {
    let temp_dir = tempdir()?;
    let root = temp_dir.path();
    seed_landing_zone(&root.join("bronze"))?;
    fs::remove_file(root.join("bronze/LoyaltyAccounts.csv"))?;

    let config = config_in(root);
    let ctx = RunContext::acquire(config.clone(), Arc::new(CsvTableStore::from_config(&config.storage)));
    let result = PipelineOrchestrator::new(&config).run(&ctx).await?;

    assert!(!result.success);
    assert_eq!(result.total_failed, 2);
    assert!(!result.step("derive:Customer_Segmentation").unwrap().success);
    assert!(root.join("gold/AOV_Product_Category_Location.csv").is_file());
    assert!(!root.join("gold/Customer_Segmentation.csv").exists());
    Ok(())
}

#[tokio::test]
async fn test_custom_rules_and_plans() -> Result<()> {
    let temp_dir = tempdir()?;
    let root = temp_dir.path();
    seed_landing_zone(&root.join("bronze"))?;

    let config = config_in(root);
    let single_bucket = SegmentationConfig {
        buckets: 1,
        champion_tiers: Vec::new(),
    };
    let orchestrator = PipelineOrchestrator::new(&config)
        .with_rules(vec![
            catalog::online_transactions(),
            catalog::in_store_transactions(),
            catalog::loyalty_accounts(),
        ])
        .with_plans(vec![DerivationPlan::build(
            Derivation::CustomerSegmentation,
            &single_bucket,
        )]);
    let ctx = RunContext::acquire(config.clone(), Arc::new(CsvTableStore::from_config(&config.storage)));
    let result = orchestrator.run(&ctx).await?;

    assert!(result.success);
    assert_eq!(result.step_results.len(), 4);
    assert!(!root.join("silver/Products_cleaned.csv").exists());

    let segmentation = gold_rows(root, "Customer_Segmentation")?;
    assert_eq!(segmentation.len(), 3);
    assert!(segmentation.iter().all(|r| r[5] == "High-Value Customers"));
    Ok(())
}
