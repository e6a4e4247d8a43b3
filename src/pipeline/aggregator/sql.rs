//! Renders derivation plans as BigQuery `CREATE OR REPLACE TABLE` statements.
//!
//! The statements follow the same join, grouping and ordering rules as the in-process
//! evaluator, so either path produces the same gold table.

use lakehouse_core::{QueryStatement, TableLocation};

use super::plan::{AgentSummaryPlan, AovPlan, DerivationPlan, PeakPlan, SegmentationPlan};
use crate::config::SqlConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlRenderer {
    silver_dataset: String,
    gold_dataset: String,
}

impl SqlRenderer {
    pub fn new(silver_dataset: impl Into<String>, gold_dataset: impl Into<String>) -> Self {
        Self {
            silver_dataset: silver_dataset.into(),
            gold_dataset: gold_dataset.into(),
        }
    }

    pub fn from_config(config: &SqlConfig) -> Self {
        Self::new(&config.silver_dataset, &config.gold_dataset)
    }

    pub fn render(&self, plan: &DerivationPlan) -> QueryStatement {
        let body = match plan {
            DerivationPlan::Aov(p) => self.aov(p),
            DerivationPlan::Segmentation(p) => self.segmentation(p),
            DerivationPlan::Peak(p) => self.peak(p),
            DerivationPlan::AgentSummary(p) => self.agent_summary(p),
        };
        QueryStatement {
            output: TableLocation::gold(plan.output()),
            sql: format!(
                "CREATE OR REPLACE TABLE {}.{} AS\n{};\n",
                self.gold_dataset,
                plan.output(),
                body
            ),
        }
    }

    fn silver(&self, table: &str) -> String {
        format!("{}.{}", self.silver_dataset, table)
    }

    fn aov(&self, plan: &AovPlan) -> String {
        format!(
            "SELECT
  p.ProductID,
  p.Name AS ProductName,
  p.Category,
  CAST(NULL AS STRING) AS Location,
  SUM(o.Amount) AS TotalAmount,
  COUNT(o.OrderID) AS TotalOrders,
  SAFE_DIVIDE(SUM(o.Amount), COUNT(o.OrderID)) AS AverageOrderValue
FROM {products} p
LEFT JOIN {orders} o ON o.ProductID = p.ProductID
GROUP BY p.ProductID, ProductName, p.Category
ORDER BY p.ProductID",
            products = self.silver(&plan.products),
            orders = self.silver(&plan.orders),
        )
    }

    fn segmentation(&self, plan: &SegmentationPlan) -> String {
        let union = plan
            .transaction_sources
            .iter()
            .map(|t| format!("  SELECT CustomerID, Amount FROM {}", self.silver(t)))
            .collect::<Vec<_>>()
            .join("\n  UNION ALL\n");
        let tiers = plan
            .champion_tiers
            .iter()
            .map(|t| quote_literal(t))
            .collect::<Vec<_>>()
            .join(", ");
        let champion_case = if tiers.is_empty() {
            String::new()
        } else {
            format!(
                "\n    WHEN l.TierLevel IN ({tiers}) THEN {}",
                quote_literal(crate::constants::SEGMENT_LOYALTY_CHAMPIONS)
            )
        };

        format!(
            "WITH all_txns AS (
{union}
),
agg AS (
  SELECT
    CustomerID,
    SUM(Amount) AS TotalSpend,
    COUNT(*) AS PurchaseFrequency
  FROM all_txns
  GROUP BY CustomerID
),
ranked AS (
  SELECT
    *,
    ROW_NUMBER() OVER (ORDER BY TotalSpend DESC NULLS LAST, CustomerID) AS SpendRank,
    NTILE({buckets}) OVER (ORDER BY TotalSpend DESC NULLS LAST, CustomerID) AS SpendDecile
  FROM agg
),
loyalty AS (
  SELECT CustomerID, TierLevel
  FROM {loyalty}
  WHERE CustomerID IS NOT NULL
  QUALIFY ROW_NUMBER() OVER (PARTITION BY CustomerID ORDER BY LoyaltyID) = 1
)
SELECT
  r.CustomerID,
  r.TotalSpend,
  r.PurchaseFrequency,
  r.SpendDecile,
  l.TierLevel,
  CASE
    WHEN r.SpendDecile = 1 THEN {high_value}
    WHEN r.PurchaseFrequency = 1 THEN {one_time}{champion_case}
    ELSE {regular}
  END AS Segment
FROM ranked r
LEFT JOIN loyalty l ON r.CustomerID = l.CustomerID
ORDER BY r.SpendRank",
            buckets = plan.buckets,
            loyalty = self.silver(&plan.loyalty_accounts),
            high_value = quote_literal(crate::constants::SEGMENT_HIGH_VALUE),
            one_time = quote_literal(crate::constants::SEGMENT_ONE_TIME),
            regular = quote_literal(crate::constants::SEGMENT_REGULAR),
        )
    }

    fn peak(&self, plan: &PeakPlan) -> String {
        let per_channel = plan
            .channels
            .iter()
            .map(|c| {
                format!(
                    "  SELECT
    {channel} AS Channel,
    EXTRACT(DAYOFWEEK FROM SAFE_CAST({ts} AS TIMESTAMP)) AS DayOfWeek,
    EXTRACT(HOUR FROM SAFE_CAST({ts} AS TIMESTAMP)) AS HourOfDay,
    COUNT(*) AS NumTransactions
  FROM {table}
  GROUP BY Channel, DayOfWeek, HourOfDay",
                    channel = quote_literal(&c.channel),
                    ts = c.timestamp_column,
                    table = self.silver(&c.table),
                )
            })
            .collect::<Vec<_>>()
            .join("\n  UNION ALL\n");

        format!(
            "SELECT * FROM (
{per_channel}
)
ORDER BY Channel, NumTransactions DESC, DayOfWeek NULLS LAST, HourOfDay NULLS LAST"
        )
    }

    fn agent_summary(&self, plan: &AgentSummaryPlan) -> String {
        let resolved = quote_literal(&plan.resolved_status);
        format!(
            "SELECT
  i.AgentID,
  a.Name AS AgentName,
  COUNT(*) AS NumInteractions,
  COUNTIF(i.ResolutionStatus = {resolved}) AS NumResolved,
  SAFE_DIVIDE(COUNTIF(i.ResolutionStatus = {resolved}), COUNT(*)) AS ResolutionRate
FROM {interactions} i
LEFT JOIN {agents} a ON i.AgentID = a.AgentID
GROUP BY i.AgentID, AgentName
ORDER BY NumInteractions DESC, i.AgentID",
            interactions = self.silver(&plan.interactions),
            agents = self.silver(&plan.agents),
        )
    }
}

/// Single-quoted string literal with embedded quotes and backslashes escaped.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}
