//! Metrics for the ETL pipeline
//!
//! Each pipeline phase defines its own metrics in a dedicated submodule.
//! Recording goes through the `metrics` facade and is a no-op until a
//! recorder is installed by [`init_metrics`].

pub mod fetch;
pub mod load;
pub mod registry;
pub mod transform;

pub use fetch::FetchMetrics;
pub use load::LoadMetrics;
pub use transform::TransformMetrics;

use std::sync::Once;
use tracing::{info, warn};

static INIT: Once = Once::new();

/// Install the Prometheus exporter when a listen address is configured.
///
/// Idempotent. Must be called from inside a tokio runtime because the
/// exporter serves `/metrics` on a background task.
pub fn init_metrics(listen_addr: Option<&str>) {
    let Some(addr_str) = listen_addr else {
        return;
    };
    INIT.call_once(|| {
        let addr = match addr_str.parse::<std::net::SocketAddr>() {
            Ok(addr) => addr,
            Err(e) => {
                warn!("Invalid metrics addr '{}': {}; exporter disabled", addr_str, e);
                return;
            }
        };
        match metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
        {
            Ok(()) => {
                info!("Prometheus exporter listening on http://{}/metrics", addr);
                registry::register_all_metrics();
            }
            Err(e) => warn!("Failed to install Prometheus exporter: {}", e),
        }
    });
}

/// Per-phase metric registration and documentation.
pub trait PhaseMetrics {
    fn register_metrics();

    fn phase_name() -> &'static str;

    fn metrics_documentation() -> Vec<MetricDoc>;
}

#[derive(Debug, Clone)]
pub struct MetricDoc {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub help: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Histogram,
}

/// Naming convention: taxi_{phase}_{metric_name}[_total]
macro_rules! phase_metric {
    (counter, $phase:literal, $name:literal) => {
        concat!("taxi_", $phase, "_", $name, "_total")
    };
    (histogram, $phase:literal, $name:literal) => {
        concat!("taxi_", $phase, "_", $name)
    };
}

pub(crate) use phase_metric;
