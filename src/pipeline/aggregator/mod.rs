//! Derived (gold) tables computed from the validated layer.
//!
//! Each derivation is a pure function of the validated tables it names. Derivations share no
//! state, so the orchestrator may run them in any order or concurrently.

pub mod agent_summary;
pub mod aov;
pub mod peak;
pub mod plan;
pub mod segmentation;
pub mod sql;

pub use plan::{default_plans, Derivation, DerivationPlan};
pub use sql::SqlRenderer;

use lakehouse_core::{PipelineError, Result, Table};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::debug;

use crate::pipeline::cleaner::ValidatedTable;

/// Validated tables visible to the aggregation phase, keyed by source table name.
#[derive(Debug, Clone, Default)]
pub struct ValidatedLayer {
    tables: BTreeMap<String, Table>,
}

impl ValidatedLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, table: Table) {
        self.tables.insert(table.name.clone(), table);
    }

    pub fn insert_validated(&mut self, validated: ValidatedTable) {
        self.insert(validated.into_table());
    }

    /// The validated table `name`, or `MissingInputTable` attributed to `derivation`.
    pub fn require(&self, derivation: Derivation, name: &str) -> Result<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| PipelineError::MissingInputTable {
                derivation: derivation.output_table().to_string(),
                table: name.to_string(),
            })
    }
}

/// One gold table produced by a derivation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedTable {
    pub derivation: Derivation,
    pub table: Table,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DerivationReport {
    pub derivation: Derivation,
    pub output: String,
    pub rows_written: usize,
    pub duration_ms: u128,
}

/// Evaluate `plan` over `layer`.
pub fn evaluate(plan: &DerivationPlan, layer: &ValidatedLayer) -> Result<DerivedTable> {
    evaluate_with_report(plan, layer).map(|(derived, _)| derived)
}

pub fn evaluate_with_report(
    plan: &DerivationPlan,
    layer: &ValidatedLayer,
) -> Result<(DerivedTable, DerivationReport)> {
    let started = Instant::now();
    let table = match plan {
        DerivationPlan::Aov(p) => aov::evaluate(p, layer)?,
        DerivationPlan::Segmentation(p) => segmentation::evaluate(p, layer)?,
        DerivationPlan::Peak(p) => peak::evaluate(p, layer)?,
        DerivationPlan::AgentSummary(p) => agent_summary::evaluate(p, layer)?,
    };

    let report = DerivationReport {
        derivation: plan.derivation(),
        output: plan.output().to_string(),
        rows_written: table.len(),
        duration_ms: started.elapsed().as_millis(),
    };
    debug!(
        derivation = %report.derivation,
        rows = report.rows_written,
        "evaluated derivation"
    );

    Ok((
        DerivedTable {
            derivation: plan.derivation(),
            table,
        },
        report,
    ))
}

/// SQL-style sum: nulls are skipped; all-null (or empty) sums to null. A total that overflows
/// fails the derivation instead of the process.
pub(crate) fn add_nullable(
    derivation: Derivation,
    column: &str,
    acc: Option<Decimal>,
    value: Option<Decimal>,
) -> Result<Option<Decimal>> {
    match (acc, value) {
        (Some(a), Some(v)) => a
            .checked_add(v)
            .map(Some)
            .ok_or_else(|| PipelineError::DecimalOverflow {
                derivation: derivation.output_table().to_string(),
                column: column.to_string(),
            }),
        (acc, value) => Ok(acc.or(value)),
    }
}

/// Division that yields null instead of failing on a zero or null denominator.
pub(crate) fn safe_divide(numerator: Option<Decimal>, denominator: i64) -> Option<Decimal> {
    numerator?.checked_div(Decimal::from(denominator))
}
