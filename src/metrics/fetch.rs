//! Fetch Phase Metrics
//!
//! Downloads attempted, skipped and failed, plus bytes written.

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

pub struct FetchMetrics;

pub fn download_success(bytes: u64, duration_secs: f64) {
    ::metrics::counter!(phase_metric!(counter, "fetch", "downloads_success")).increment(1);
    ::metrics::counter!(phase_metric!(counter, "fetch", "bytes")).increment(bytes);
    ::metrics::histogram!(phase_metric!(histogram, "fetch", "duration_seconds")).record(duration_secs);
}

pub fn download_error(error_kind: &'static str) {
    ::metrics::counter!(phase_metric!(counter, "fetch", "downloads_error"), "kind" => error_kind)
        .increment(1);
}

pub fn download_skipped(reason: &'static str) {
    ::metrics::counter!(phase_metric!(counter, "fetch", "downloads_skipped"), "reason" => reason)
        .increment(1);
}

impl PhaseMetrics for FetchMetrics {
    fn register_metrics() {
        use metrics::{counter, histogram};

        let _ = counter!(phase_metric!(counter, "fetch", "downloads_success"));
        let _ = counter!(phase_metric!(counter, "fetch", "downloads_error"));
        let _ = counter!(phase_metric!(counter, "fetch", "downloads_skipped"));
        let _ = counter!(phase_metric!(counter, "fetch", "bytes"));
        let _ = histogram!(phase_metric!(histogram, "fetch", "duration_seconds"));
    }

    fn phase_name() -> &'static str {
        "fetch"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "fetch", "downloads_success"),
                metric_type: MetricType::Counter,
                help: "Files downloaded and recorded in the downloaded checkpoint",
            },
            MetricDoc {
                name: phase_metric!(counter, "fetch", "downloads_error"),
                metric_type: MetricType::Counter,
                help: "Downloads that failed (transport error, non-2xx status, local write)",
            },
            MetricDoc {
                name: phase_metric!(counter, "fetch", "downloads_skipped"),
                metric_type: MetricType::Counter,
                help: "Catalog entries skipped because they were recorded or already on disk",
            },
            MetricDoc {
                name: phase_metric!(counter, "fetch", "bytes"),
                metric_type: MetricType::Counter,
                help: "Bytes written to the raw directory",
            },
            MetricDoc {
                name: phase_metric!(histogram, "fetch", "duration_seconds"),
                metric_type: MetricType::Histogram,
                help: "Time to download and write one file",
            },
        ]
    }
}
