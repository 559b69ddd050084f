//! Load Phase Metrics

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

pub struct LoadMetrics;

pub fn documents_inserted(count: usize, duration_secs: f64) {
    ::metrics::counter!(phase_metric!(counter, "load", "documents_inserted")).increment(count as u64);
    ::metrics::histogram!(phase_metric!(histogram, "load", "duration_seconds")).record(duration_secs);
}

pub fn load_failed(error_kind: &'static str) {
    ::metrics::counter!(phase_metric!(counter, "load", "failures"), "kind" => error_kind).increment(1);
}

pub fn file_processed() {
    ::metrics::counter!(phase_metric!(counter, "load", "files_processed")).increment(1);
}

impl PhaseMetrics for LoadMetrics {
    fn register_metrics() {
        use metrics::{counter, histogram};

        let _ = counter!(phase_metric!(counter, "load", "documents_inserted"));
        let _ = counter!(phase_metric!(counter, "load", "failures"));
        let _ = counter!(phase_metric!(counter, "load", "files_processed"));
        let _ = histogram!(phase_metric!(histogram, "load", "duration_seconds"));
    }

    fn phase_name() -> &'static str {
        "load"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "load", "documents_inserted"),
                metric_type: MetricType::Counter,
                help: "Documents appended to the collection",
            },
            MetricDoc {
                name: phase_metric!(counter, "load", "failures"),
                metric_type: MetricType::Counter,
                help: "Loads that failed or were only partially written",
            },
            MetricDoc {
                name: phase_metric!(counter, "load", "files_processed"),
                metric_type: MetricType::Counter,
                help: "Files marked processed after a complete load",
            },
            MetricDoc {
                name: phase_metric!(histogram, "load", "duration_seconds"),
                metric_type: MetricType::Histogram,
                help: "Time to bulk insert one file's documents",
            },
        ]
    }
}
