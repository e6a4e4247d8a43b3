//! Transaction counts per channel, day of week and hour of day.
//!
//! All timestamps are bucketed in UTC. Offsets are converted; timestamps without one are taken
//! to already be UTC. Day of week runs 1 (Sunday) to 7 (Saturday).

use chrono::{DateTime, Datelike, NaiveDateTime, Timelike, Utc};
use lakehouse_core::{ColumnType, Result, Table, TableSchema, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use super::plan::{Derivation, PeakPlan};
use super::ValidatedLayer;

const NAIVE_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeakRow {
    pub channel: String,
    pub day_of_week: Option<u32>,
    pub hour_of_day: Option<u32>,
    pub num_transactions: i64,
}

pub fn schema() -> TableSchema {
    TableSchema::new()
        .non_null("Channel", ColumnType::Text)
        .integer("DayOfWeek")
        .integer("HourOfDay")
        .non_null("NumTransactions", ColumnType::Integer)
}

pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|naive| naive.and_utc())
}

/// (day of week, hour of day) of a timestamp cell; both null when it does not parse.
pub fn day_and_hour(value: &Value) -> (Option<u32>, Option<u32>) {
    match value.as_str().and_then(parse_timestamp) {
        Some(ts) => (Some(ts.weekday().number_from_sunday()), Some(ts.hour())),
        None => (None, None),
    }
}

fn nulls_last(a: Option<u32>, b: Option<u32>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Channel, then busiest first, then day and hour.
fn peak_order(a: &PeakRow, b: &PeakRow) -> Ordering {
    a.channel
        .cmp(&b.channel)
        .then_with(|| b.num_transactions.cmp(&a.num_transactions))
        .then_with(|| nulls_last(a.day_of_week, b.day_of_week))
        .then_with(|| nulls_last(a.hour_of_day, b.hour_of_day))
}

pub fn compute(plan: &PeakPlan, layer: &ValidatedLayer) -> Result<Vec<PeakRow>> {
    let mut rows = Vec::new();
    for source in &plan.channels {
        let table = layer.require(Derivation::PeakDayHourByChannel, &source.table)?;
        let timestamp = table.column_index(&source.timestamp_column)?;

        let mut counts: BTreeMap<(Option<u32>, Option<u32>), i64> = BTreeMap::new();
        for row in &table.rows {
            *counts.entry(day_and_hour(&row[timestamp])).or_insert(0) += 1;
        }

        rows.extend(counts.into_iter().map(|((day, hour), n)| PeakRow {
            channel: source.channel.clone(),
            day_of_week: day,
            hour_of_day: hour,
            num_transactions: n,
        }));
    }
    rows.sort_by(peak_order);
    Ok(rows)
}

pub fn to_table(output: &str, rows: Vec<PeakRow>) -> Table {
    let rows = rows
        .into_iter()
        .map(|r| {
            vec![
                Value::from(r.channel),
                Value::from(r.day_of_week.map(i64::from)),
                Value::from(r.hour_of_day.map(i64::from)),
                Value::from(r.num_transactions),
            ]
        })
        .collect();
    Table::new(output, schema(), rows)
}

pub fn evaluate(plan: &PeakPlan, layer: &ValidatedLayer) -> Result<Table> {
    Ok(to_table(&plan.output, compute(plan, layer)?))
}
