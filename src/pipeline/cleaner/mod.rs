//! Rule-driven cleaning of raw source tables into the validated layer.
//!
//! Every table goes through the same five steps, in this order:
//! parse, deduplicate, trim text, coerce currency, enforce required fields.
//! Malformed cells never fail a clean; they become null and are caught by the
//! required-field filter when the column is required.

pub mod catalog;
pub mod rule;

pub use rule::CleaningRule;

use lakehouse_core::{ColumnType, PipelineError, RawTable, Record, Result, Table, Value};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashSet;
use std::str::FromStr;
use tracing::debug;

/// A cleaned table together with the rule that produced it. Read-only once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedTable {
    rule: CleaningRule,
    table: Table,
}

impl ValidatedTable {
    pub fn rule(&self) -> &CleaningRule {
        &self.rule
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn name(&self) -> &str {
        &self.rule.table
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn fingerprint(&self) -> String {
        self.table.fingerprint()
    }

    pub fn into_table(self) -> Table {
        self.table
    }
}

/// Row and cell counts from one clean, for logs and metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleaningReport {
    pub table: String,
    pub rows_read: usize,
    pub duplicates_dropped: usize,
    /// Non-empty cells that did not parse as their declared type.
    pub malformed_cells: usize,
    pub currency_coercion_failures: usize,
    pub required_field_drops: usize,
    pub rows_written: usize,
}

/// Clean `raw` according to `rule`.
pub fn clean(raw: &RawTable, rule: &CleaningRule) -> Result<ValidatedTable> {
    clean_with_report(raw, rule).map(|(validated, _)| validated)
}

/// Clean `raw` according to `rule`, also returning what each step did.
///
/// Fails with a schema violation before touching any row when the rule names an undeclared
/// column or the raw table was read against a different schema.
pub fn clean_with_report(
    raw: &RawTable,
    rule: &CleaningRule,
) -> Result<(ValidatedTable, CleaningReport)> {
    rule.validate()?;
    if raw.schema != rule.schema {
        return Err(PipelineError::schema_violation(
            &rule.table,
            format!("raw table '{}' was not read against the rule schema", raw.name),
        ));
    }

    let mut report = CleaningReport {
        table: rule.table.clone(),
        rows_read: raw.len(),
        ..Default::default()
    };

    let parsed = Table::parse(raw);
    report.malformed_cells = count_malformed(raw, &parsed);

    let rows = deduplicate(&parsed, rule, &mut report)?;
    let rows = normalize_text(&parsed, rows);
    let rows = coerce_currency_columns(&parsed, rule, rows, &mut report)?;
    let rows = enforce_required(&parsed, rule, rows, &mut report)?;

    report.rows_written = rows.len();
    debug!(
        table = %rule.table,
        rows_read = report.rows_read,
        duplicates_dropped = report.duplicates_dropped,
        malformed_cells = report.malformed_cells,
        currency_coercion_failures = report.currency_coercion_failures,
        required_field_drops = report.required_field_drops,
        rows_written = report.rows_written,
        "cleaned table"
    );

    let table = Table::new(rule.table.clone(), rule.validated_schema(), rows);
    Ok((
        ValidatedTable {
            rule: rule.clone(),
            table,
        },
        report,
    ))
}

fn count_malformed(raw: &RawTable, parsed: &Table) -> usize {
    raw.rows
        .iter()
        .zip(&parsed.rows)
        .map(|(cells, values)| {
            cells
                .iter()
                .zip(values)
                .filter(|(cell, value)| {
                    cell.as_deref().is_some_and(|c| !c.is_empty()) && value.is_null()
                })
                .count()
        })
        .sum()
}

/// Keep the first row seen for each distinct key. Null key parts compare equal.
fn deduplicate(parsed: &Table, rule: &CleaningRule, report: &mut CleaningReport) -> Result<Vec<Record>> {
    let key_columns = rule
        .dedup_key
        .iter()
        .map(|c| parsed.column_index(c))
        .collect::<Result<Vec<_>>>()?;

    let mut seen: HashSet<Vec<Value>> = HashSet::with_capacity(parsed.len());
    let mut survivors = Vec::with_capacity(parsed.len());
    for row in &parsed.rows {
        let key: Vec<Value> = key_columns.iter().map(|&i| row[i].clone()).collect();
        if seen.insert(key) {
            survivors.push(row.clone());
        } else {
            report.duplicates_dropped += 1;
        }
    }
    Ok(survivors)
}

fn normalize_text(parsed: &Table, mut rows: Vec<Record>) -> Vec<Record> {
    let text_columns: Vec<usize> = parsed
        .schema
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, def)| def.column_type == ColumnType::Text)
        .map(|(i, _)| i)
        .collect();

    for row in &mut rows {
        for &i in &text_columns {
            if let Value::Text(text) = &row[i] {
                let trimmed = text.trim();
                if trimmed.len() != text.len() {
                    row[i] = Value::Text(trimmed.to_string());
                }
            }
        }
    }
    rows
}

fn coerce_currency_columns(
    parsed: &Table,
    rule: &CleaningRule,
    mut rows: Vec<Record>,
    report: &mut CleaningReport,
) -> Result<Vec<Record>> {
    let currency_columns = rule
        .currency
        .iter()
        .map(|c| parsed.column_index(c))
        .collect::<Result<Vec<_>>>()?;

    for row in &mut rows {
        for &i in &currency_columns {
            let coerced = match &row[i] {
                Value::Null => continue,
                Value::Text(text) => coerce_currency(text),
                Value::Decimal(d) => Some(*d),
                Value::Integer(v) => Some(Decimal::from(*v)),
            };
            if coerced.is_none() {
                report.currency_coercion_failures += 1;
            }
            row[i] = Value::from(coerced);
        }
    }
    Ok(rows)
}

fn enforce_required(
    parsed: &Table,
    rule: &CleaningRule,
    rows: Vec<Record>,
    report: &mut CleaningReport,
) -> Result<Vec<Record>> {
    let required_columns = rule
        .required
        .iter()
        .map(|c| parsed.column_index(c))
        .collect::<Result<Vec<_>>>()?;

    let before = rows.len();
    let kept: Vec<Record> = rows
        .into_iter()
        .filter(|row| required_columns.iter().all(|&i| !row[i].is_null()))
        .collect();
    report.required_field_drops = before - kept.len();
    Ok(kept)
}

/// Strip `$` and `,` from a formatted amount and parse what remains.
pub fn coerce_currency(text: &str) -> Option<Decimal> {
    let stripped: String = text.chars().filter(|c| !matches!(c, '$' | ',')).collect();
    let stripped = stripped.trim();
    if stripped.is_empty() {
        return None;
    }
    Decimal::from_str(stripped)
        .or_else(|_| Decimal::from_scientific(stripped))
        .ok()
}
