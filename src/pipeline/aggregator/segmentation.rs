//! Customer segmentation over the union of online and in-store spend.

use lakehouse_core::{ColumnType, Result, Table, TableSchema, Value};
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use super::plan::{Derivation, SegmentationPlan};
use super::{add_nullable, ValidatedLayer};
use crate::constants::{
    SEGMENT_HIGH_VALUE, SEGMENT_LOYALTY_CHAMPIONS, SEGMENT_ONE_TIME, SEGMENT_REGULAR,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentRow {
    pub customer_id: Option<i64>,
    pub total_spend: Option<Decimal>,
    pub purchase_frequency: i64,
    /// 1 holds the highest spenders.
    pub spend_decile: u32,
    pub tier_level: Option<String>,
    pub segment: String,
}

pub fn schema() -> TableSchema {
    TableSchema::new()
        .integer("CustomerID")
        .decimal("TotalSpend")
        .non_null("PurchaseFrequency", ColumnType::Integer)
        .non_null("SpendDecile", ColumnType::Integer)
        .text("TierLevel")
        .non_null("Segment", ColumnType::Text)
}

/// 1-based bucket of the row at `position` when `population` ranked rows are split into
/// `buckets` groups whose sizes differ by at most one, larger groups first.
pub fn ntile(position: usize, population: usize, buckets: u32) -> u32 {
    let buckets = buckets.max(1) as usize;
    let base = population / buckets;
    let larger = population % buckets;
    let in_larger = larger * (base + 1);

    let bucket = if position < in_larger {
        position / (base + 1)
    } else {
        larger + (position - in_larger) / base
    };
    bucket as u32 + 1
}

/// First matching label wins: top bucket, then single purchase, then champion tier.
pub fn segment_for(
    decile: u32,
    purchase_frequency: i64,
    tier: Option<&str>,
    champion_tiers: &[String],
) -> &'static str {
    if decile == 1 {
        SEGMENT_HIGH_VALUE
    } else if purchase_frequency == 1 {
        SEGMENT_ONE_TIME
    } else if tier.is_some_and(|t| champion_tiers.iter().any(|c| c == t)) {
        SEGMENT_LOYALTY_CHAMPIONS
    } else {
        SEGMENT_REGULAR
    }
}

/// Spend descending with nulls last, then customer ascending.
fn rank_order(a: &(Value, Option<Decimal>), b: &(Value, Option<Decimal>)) -> Ordering {
    let spend = match (a.1, b.1) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    spend.then_with(|| a.0.cmp(&b.0))
}

pub fn compute(plan: &SegmentationPlan, layer: &ValidatedLayer) -> Result<Vec<SegmentRow>> {
    let derivation = Derivation::CustomerSegmentation;

    let mut spend: BTreeMap<Value, (Option<Decimal>, i64)> = BTreeMap::new();
    for source in &plan.transaction_sources {
        let table = layer.require(derivation, source)?;
        let customer = table.column_index("CustomerID")?;
        let amount = table.column_index("Amount")?;
        for row in &table.rows {
            let entry = spend.entry(row[customer].clone()).or_insert((None, 0));
            entry.0 = add_nullable(derivation, "Amount", entry.0, row[amount].as_decimal())?;
            entry.1 += 1;
        }
    }

    let tiers = loyalty_tiers(layer.require(derivation, &plan.loyalty_accounts)?)?;

    let mut ranked: Vec<(Value, Option<Decimal>)> =
        spend.iter().map(|(customer, (total, _))| (customer.clone(), *total)).collect();
    ranked.sort_by(rank_order);

    let population = ranked.len();
    Ok(ranked
        .into_iter()
        .enumerate()
        .map(|(position, (customer, total_spend))| {
            let purchase_frequency = spend.get(&customer).map(|(_, n)| *n).unwrap_or(0);
            let spend_decile = ntile(position, population, plan.buckets);
            let tier_level = customer.as_i64().and_then(|id| tiers.get(&id).cloned()).flatten();
            let segment = segment_for(
                spend_decile,
                purchase_frequency,
                tier_level.as_deref(),
                &plan.champion_tiers,
            );
            SegmentRow {
                customer_id: customer.as_i64(),
                total_spend,
                purchase_frequency,
                spend_decile,
                tier_level,
                segment: segment.to_string(),
            }
        })
        .collect())
}

/// Tier per customer, taken from the account with the smallest `LoyaltyID`.
fn loyalty_tiers(accounts: &Table) -> Result<HashMap<i64, Option<String>>> {
    let loyalty_id = accounts.column_index("LoyaltyID")?;
    let customer = accounts.column_index("CustomerID")?;
    let tier = accounts.column_index("TierLevel")?;

    let mut best: HashMap<i64, (Value, Option<String>)> = HashMap::new();
    for row in &accounts.rows {
        let Some(customer_id) = row[customer].as_i64() else {
            continue;
        };
        let candidate = (row[loyalty_id].clone(), row[tier].as_str().map(str::to_string));
        let replace = best
            .get(&customer_id)
            .map_or(true, |(current, _)| candidate.0 < *current);
        if replace {
            best.insert(customer_id, candidate);
        }
    }
    Ok(best.into_iter().map(|(id, (_, tier))| (id, tier)).collect())
}

pub fn to_table(output: &str, rows: Vec<SegmentRow>) -> Table {
    let rows = rows
        .into_iter()
        .map(|r| {
            vec![
                Value::from(r.customer_id),
                Value::from(r.total_spend),
                Value::from(r.purchase_frequency),
                Value::from(i64::from(r.spend_decile)),
                Value::from(r.tier_level),
                Value::from(r.segment),
            ]
        })
        .collect();
    Table::new(output, schema(), rows)
}

pub fn evaluate(plan: &SegmentationPlan, layer: &ValidatedLayer) -> Result<Table> {
    Ok(to_table(&plan.output, compute(plan, layer)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SegmentationConfig;
    use crate::pipeline::aggregator::plan::DerivationPlan;
    use crate::pipeline::aggregator::test_support::with_clean;
    use crate::pipeline::cleaner::catalog;

    fn plan() -> SegmentationPlan {
        match DerivationPlan::build(Derivation::CustomerSegmentation, &SegmentationConfig::default()) {
            DerivationPlan::Segmentation(plan) => plan,
            other => panic!("unexpected plan {other:?}"),
        }
    }

    fn layer() -> ValidatedLayer {
        let layer = with_clean(
            ValidatedLayer::new(),
            catalog::online_transactions(),
            &[
                &["1", "1", "10", "", "", "$100.00", ""],
                &["2", "2", "10", "", "", "$50.00", ""],
                &["3", "3", "10", "", "", "$10.00", ""],
            ],
        );
        let layer = with_clean(
            layer,
            catalog::in_store_transactions(),
            &[
                &["1", "1", "7", "", "$5.00", ""],
                &["2", "3", "7", "", "$10.00", ""],
                &["3", "4", "7", "", "$1.00", ""],
                &["4", "4", "7", "", "$1.00", ""],
            ],
        );
        with_clean(
            layer,
            catalog::loyalty_accounts(),
            &[
                &["1", "3", "100", "Gold", ""],
                &["2", "1", "10", "Silver", ""],
                &["3", "3", "5", "Bronze", ""],
                &["4", "4", "0", "Silver", ""],
            ],
        )
    }

    #[test]
    fn spend_overflow_across_channels_fails_the_derivation() {
        let max = "$79,228,162,514,264,337,593,543,950,335";
        let layer = with_clean(
            ValidatedLayer::new(),
            catalog::online_transactions(),
            &[&["1", "1", "10", "", "", max, ""]],
        );
        let layer = with_clean(layer, catalog::in_store_transactions(), &[&["1", "1", "7", "", max, ""]]);
        let layer = with_clean(layer, catalog::loyalty_accounts(), &[]);

        let err = compute(&plan(), &layer).unwrap_err();
        assert!(err.to_string().contains("Customer_Segmentation"));
    }

    #[test]
    fn ntile_spreads_remainder_over_leading_buckets() {
        let buckets: Vec<u32> = (0..25).map(|i| ntile(i, 25, 10)).collect();
        assert_eq!(
            buckets,
            vec![1, 1, 1, 2, 2, 2, 3, 3, 3, 4, 4, 4, 5, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10]
        );
        assert_eq!((0..20).map(|i| ntile(i, 20, 10)).filter(|&b| b == 1).count(), 2);
    }

    #[test]
    fn ntile_with_fewer_rows_than_buckets() {
        assert_eq!((0..3).map(|i| ntile(i, 3, 10)).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn top_bucket_wins_over_other_labels() {
        let tiers = vec!["Gold".to_string()];
        assert_eq!(segment_for(1, 1, Some("Gold"), &tiers), SEGMENT_HIGH_VALUE);
        assert_eq!(segment_for(2, 1, Some("Gold"), &tiers), SEGMENT_ONE_TIME);
        assert_eq!(segment_for(2, 3, Some("Gold"), &tiers), SEGMENT_LOYALTY_CHAMPIONS);
        assert_eq!(segment_for(2, 3, Some("gold"), &tiers), SEGMENT_REGULAR);
        assert_eq!(segment_for(2, 3, None, &tiers), SEGMENT_REGULAR);
    }

    #[test]
    fn customers_are_ranked_and_labeled() {
        let rows = compute(&plan(), &layer()).unwrap();
        let summary: Vec<(Option<i64>, i64, u32, &str)> = rows
            .iter()
            .map(|r| (r.customer_id, r.purchase_frequency, r.spend_decile, r.segment.as_str()))
            .collect();

        assert_eq!(
            summary,
            vec![
                (Some(1), 2, 1, SEGMENT_HIGH_VALUE),
                (Some(2), 1, 2, SEGMENT_ONE_TIME),
                (Some(3), 2, 3, SEGMENT_LOYALTY_CHAMPIONS),
                (Some(4), 2, 4, SEGMENT_REGULAR),
            ]
        );
        assert_eq!(rows[0].total_spend, Some(Decimal::from(105)));
        assert_eq!(rows[0].tier_level.as_deref(), Some("Silver"));
    }

    #[test]
    fn smallest_loyalty_id_supplies_the_tier() {
        let rows = compute(&plan(), &layer()).unwrap();
        let customer_three = rows.iter().find(|r| r.customer_id == Some(3)).unwrap();
        assert_eq!(customer_three.tier_level.as_deref(), Some("Gold"));
    }

    #[test]
    fn customer_without_account_has_null_tier() {
        let rows = compute(&plan(), &layer()).unwrap();
        let customer_two = rows.iter().find(|r| r.customer_id == Some(2)).unwrap();
        assert_eq!(customer_two.tier_level, None);
    }

    #[test]
    fn equal_spend_ranks_lower_customer_first() {
        let layer = with_clean(
            ValidatedLayer::new(),
            catalog::online_transactions(),
            &[&["1", "9", "10", "", "", "$10", ""], &["2", "4", "10", "", "", "$10", ""]],
        );
        let layer = with_clean(layer, catalog::in_store_transactions(), &[]);
        let layer = with_clean(layer, catalog::loyalty_accounts(), &[]);

        let mut plan = plan();
        plan.buckets = 2;
        let rows = compute(&plan, &layer).unwrap();
        assert_eq!(rows[0].customer_id, Some(4));
        assert_eq!(rows[0].spend_decile, 1);
        assert_eq!(rows[1].customer_id, Some(9));
        assert_eq!(rows[1].spend_decile, 2);
    }

    #[test]
    fn missing_loyalty_table_fails() {
        let layer = with_clean(ValidatedLayer::new(), catalog::online_transactions(), &[]);
        let layer = with_clean(layer, catalog::in_store_transactions(), &[]);
        let err = compute(&plan(), &layer).unwrap_err();
        assert!(err.to_string().contains("LoyaltyAccounts"));
    }
}
