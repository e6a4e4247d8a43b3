//! Aggregator phase metrics

use crate::metrics::phase_metric;
use crate::pipeline::aggregator::DerivationReport;

pub struct AggregatorMetrics;

impl AggregatorMetrics {
    pub fn record_derivation(report: &DerivationReport) {
        let derivation = report.derivation.slug();
        ::metrics::counter!(phase_metric!(counter, "aggregator", "derivations_completed"), "derivation" => derivation)
            .increment(1);
        ::metrics::gauge!(phase_metric!(gauge, "aggregator", "rows_written"), "derivation" => derivation)
            .set(report.rows_written as f64);
        ::metrics::histogram!(phase_metric!(histogram, "aggregator", "duration_seconds"), "derivation" => derivation)
            .record(report.duration_ms as f64 / 1000.0);
    }

    /// A statement handed to the query engine instead of evaluated here.
    pub fn record_statement_submitted(derivation: &'static str) {
        ::metrics::counter!(phase_metric!(counter, "aggregator", "statements_submitted"), "derivation" => derivation)
            .increment(1);
    }

    pub fn record_failure(derivation: &'static str) {
        ::metrics::counter!(phase_metric!(counter, "aggregator", "derivations_failed"), "derivation" => derivation)
            .increment(1);
    }
}
