use lakehouse_core::{ColumnType, Result, Table, TableSchema, Value};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};

use super::plan::{AgentSummaryPlan, Derivation};
use super::{safe_divide, ValidatedLayer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSummaryRow {
    pub agent_id: Option<i64>,
    pub agent_name: Option<String>,
    pub num_interactions: i64,
    pub num_resolved: i64,
    pub resolution_rate: Option<Decimal>,
}

pub fn schema() -> TableSchema {
    TableSchema::new()
        .integer("AgentID")
        .text("AgentName")
        .non_null("NumInteractions", ColumnType::Integer)
        .non_null("NumResolved", ColumnType::Integer)
        .decimal("ResolutionRate")
}

/// Interactions grouped per agent, busiest agent first.
pub fn compute(plan: &AgentSummaryPlan, layer: &ValidatedLayer) -> Result<Vec<AgentSummaryRow>> {
    let interactions = layer.require(Derivation::AgentInteractionSummary, &plan.interactions)?;
    let agents = layer.require(Derivation::AgentInteractionSummary, &plan.agents)?;

    let agent_key = agents.column_index("AgentID")?;
    let agent_name = agents.column_index("Name")?;
    let mut names: HashMap<i64, Vec<Value>> = HashMap::new();
    for row in &agents.rows {
        if let Some(id) = row[agent_key].as_i64() {
            names.entry(id).or_default().push(row[agent_name].clone());
        }
    }

    let agent_id = interactions.column_index("AgentID")?;
    let status = interactions.column_index("ResolutionStatus")?;

    let no_match = [Value::Null];
    let mut groups: BTreeMap<(Value, Value), (i64, i64)> = BTreeMap::new();
    for row in &interactions.rows {
        let resolved = row[status].as_str() == Some(plan.resolved_status.as_str());
        let matched = row[agent_id]
            .as_i64()
            .and_then(|id| names.get(&id))
            .map(Vec::as_slice)
            .unwrap_or(&no_match);
        for name in matched {
            let counts = groups
                .entry((row[agent_id].clone(), name.clone()))
                .or_insert((0, 0));
            counts.0 += 1;
            if resolved {
                counts.1 += 1;
            }
        }
    }

    let mut rows: Vec<AgentSummaryRow> = groups
        .into_iter()
        .map(|((id, name), (total, resolved))| AgentSummaryRow {
            agent_id: id.as_i64(),
            agent_name: name.as_str().map(str::to_string),
            num_interactions: total,
            num_resolved: resolved,
            resolution_rate: safe_divide(Some(Decimal::from(resolved)), total),
        })
        .collect();
    // groups iterate in AgentID order, so a stable sort leaves ties ascending
    rows.sort_by(|a, b| b.num_interactions.cmp(&a.num_interactions));
    Ok(rows)
}

pub fn to_table(output: &str, rows: Vec<AgentSummaryRow>) -> Table {
    let rows = rows
        .into_iter()
        .map(|r| {
            vec![
                Value::from(r.agent_id),
                Value::from(r.agent_name),
                Value::from(r.num_interactions),
                Value::from(r.num_resolved),
                Value::from(r.resolution_rate),
            ]
        })
        .collect();
    Table::new(output, schema(), rows)
}

pub fn evaluate(plan: &AgentSummaryPlan, layer: &ValidatedLayer) -> Result<Table> {
    Ok(to_table(&plan.output, compute(plan, layer)?))
}
