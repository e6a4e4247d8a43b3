//! Cleaner phase metrics: rows in and out of each table-clean and what was dropped on the way.

use crate::metrics::phase_metric;
use crate::pipeline::cleaner::CleaningReport;

pub struct CleanerMetrics;

impl CleanerMetrics {
    pub fn record_table_cleaned(report: &CleaningReport, duration_secs: f64) {
        let table = report.table.clone();
        ::metrics::counter!(phase_metric!(counter, "cleaner", "tables_cleaned"), "table" => table.clone())
            .increment(1);
        ::metrics::counter!(phase_metric!(counter, "cleaner", "rows_read"), "table" => table.clone())
            .increment(report.rows_read as u64);
        ::metrics::counter!(phase_metric!(counter, "cleaner", "rows_written"), "table" => table.clone())
            .increment(report.rows_written as u64);
        ::metrics::counter!(phase_metric!(counter, "cleaner", "duplicates_dropped"), "table" => table.clone())
            .increment(report.duplicates_dropped as u64);
        ::metrics::counter!(phase_metric!(counter, "cleaner", "malformed_cells"), "table" => table.clone())
            .increment(report.malformed_cells as u64);
        ::metrics::counter!(phase_metric!(counter, "cleaner", "currency_coercion_failures"), "table" => table.clone())
            .increment(report.currency_coercion_failures as u64);
        ::metrics::counter!(phase_metric!(counter, "cleaner", "required_field_drops"), "table" => table.clone())
            .increment(report.required_field_drops as u64);
        ::metrics::histogram!(phase_metric!(histogram, "cleaner", "duration_seconds"), "table" => table)
            .record(duration_secs);
    }

    /// A table whose clean failed and wrote nothing.
    pub fn record_table_failed(table: &str) {
        ::metrics::counter!(phase_metric!(counter, "cleaner", "tables_failed"), "table" => table.to_string())
            .increment(1);
    }
}
