//! Pipeline metrics
//!
//! Each phase records through its own submodule so metric names stay owned by one place.
//! Without an installed recorder every call is a no-op, which keeps library use and tests
//! free of global state.

pub mod aggregator;
pub mod cleaner;

pub use aggregator::AggregatorMetrics;
pub use cleaner::CleanerMetrics;

use std::net::SocketAddr;
use std::sync::Once;
use tracing::{info, warn};

static INIT: Once = Once::new();

/// Builds metric names following `lakehouse_{phase}_{name}[_total]`.
macro_rules! phase_metric {
    (counter, $phase:literal, $name:literal) => {
        concat!("lakehouse_", $phase, "_", $name, "_total")
    };
    (histogram, $phase:literal, $name:literal) => {
        concat!("lakehouse_", $phase, "_", $name)
    };
    (gauge, $phase:literal, $name:literal) => {
        concat!("lakehouse_", $phase, "_", $name)
    };
}

pub(crate) use phase_metric;

/// Install the Prometheus exporter when `LAKEHOUSE_METRICS_ADDR` is set. Idempotent.
pub fn init_metrics() {
    INIT.call_once(|| {
        let addr_str = match std::env::var("LAKEHOUSE_METRICS_ADDR") {
            Ok(v) if !v.trim().is_empty() => v,
            _ => {
                info!("metrics: LAKEHOUSE_METRICS_ADDR not set, exporter disabled");
                return;
            }
        };

        let addr: SocketAddr = match addr_str.parse() {
            Ok(addr) => addr,
            Err(e) => {
                warn!("metrics: invalid LAKEHOUSE_METRICS_ADDR '{}': {}", addr_str, e);
                return;
            }
        };

        match metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
        {
            Ok(()) => info!("Prometheus exporter listening on http://{}/metrics", addr),
            Err(e) => warn!("Failed to install Prometheus exporter: {}", e),
        }
    });
}

/// Bump a counter once per pipeline run.
pub fn record_run(success: bool) {
    if success {
        ::metrics::counter!(phase_metric!(counter, "pipeline", "runs_succeeded")).increment(1);
    } else {
        ::metrics::counter!(phase_metric!(counter, "pipeline", "runs_failed")).increment(1);
    }
}
