//! Average order value per product and category.

use lakehouse_core::{ColumnType, Result, Table, TableSchema, Value};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};

use super::plan::{AovPlan, Derivation};
use super::{add_nullable, safe_divide, ValidatedLayer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AovRow {
    pub product_id: Option<i64>,
    pub product_name: Option<String>,
    pub category: Option<String>,
    /// Always null: online orders carry no store location.
    pub location: Option<String>,
    pub total_amount: Option<Decimal>,
    pub total_orders: i64,
    pub average_order_value: Option<Decimal>,
}

#[derive(Default)]
struct OrderTotals {
    amount: Option<Decimal>,
    orders: i64,
}

pub fn schema() -> TableSchema {
    TableSchema::new()
        .integer("ProductID")
        .text("ProductName")
        .text("Category")
        .text("Location")
        .decimal("TotalAmount")
        .non_null("TotalOrders", ColumnType::Integer)
        .decimal("AverageOrderValue")
}

/// Every product, with its online orders left-joined on `ProductID`, ordered by `ProductID`.
pub fn compute(plan: &AovPlan, layer: &ValidatedLayer) -> Result<Vec<AovRow>> {
    let products = layer.require(Derivation::AovByProductCategory, &plan.products)?;
    let orders = layer.require(Derivation::AovByProductCategory, &plan.orders)?;

    let order_product = orders.column_index("ProductID")?;
    let order_id = orders.column_index("OrderID")?;
    let order_amount = orders.column_index("Amount")?;

    // Null join keys never match.
    let mut totals: HashMap<i64, OrderTotals> = HashMap::new();
    for row in &orders.rows {
        let Some(product_id) = row[order_product].as_i64() else {
            continue;
        };
        let entry = totals.entry(product_id).or_default();
        entry.amount = add_nullable(
            Derivation::AovByProductCategory,
            "Amount",
            entry.amount,
            row[order_amount].as_decimal(),
        )?;
        if !row[order_id].is_null() {
            entry.orders += 1;
        }
    }

    let product_id = products.column_index("ProductID")?;
    let name = products.column_index("Name")?;
    let category = products.column_index("Category")?;

    // Group key (ProductID, Name, Category); one product row contributes its orders once.
    let mut groups: BTreeMap<(Value, Value, Value), OrderTotals> = BTreeMap::new();
    for row in &products.rows {
        let key = (row[product_id].clone(), row[name].clone(), row[category].clone());
        let group = groups.entry(key).or_default();
        if let Some(matched) = row[product_id].as_i64().and_then(|id| totals.get(&id)) {
            group.amount = add_nullable(
                Derivation::AovByProductCategory,
                "Amount",
                group.amount,
                matched.amount,
            )?;
            group.orders += matched.orders;
        }
    }

    Ok(groups
        .into_iter()
        .map(|((id, name, category), totals)| AovRow {
            product_id: id.as_i64(),
            product_name: name.as_str().map(str::to_string),
            category: category.as_str().map(str::to_string),
            location: None,
            total_amount: totals.amount,
            total_orders: totals.orders,
            average_order_value: safe_divide(totals.amount, totals.orders),
        })
        .collect())
}

pub fn to_table(output: &str, rows: Vec<AovRow>) -> Table {
    let rows = rows
        .into_iter()
        .map(|r| {
            vec![
                Value::from(r.product_id),
                Value::from(r.product_name),
                Value::from(r.category),
                Value::from(r.location),
                Value::from(r.total_amount),
                Value::from(r.total_orders),
                Value::from(r.average_order_value),
            ]
        })
        .collect();
    Table::new(output, schema(), rows)
}

pub fn evaluate(plan: &AovPlan, layer: &ValidatedLayer) -> Result<Table> {
    Ok(to_table(&plan.output, compute(plan, layer)?))
}
