//! Transform Phase Metrics

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};
use crate::pipeline::transform::TransformStats;

pub struct TransformMetrics;

pub fn record_rows(stats: &TransformStats) {
    ::metrics::counter!(phase_metric!(counter, "transform", "rows_read")).increment(stats.rows_read);
    ::metrics::counter!(phase_metric!(counter, "transform", "rows_kept")).increment(stats.rows_kept);
    ::metrics::counter!(phase_metric!(counter, "transform", "rows_dropped"), "filter" => "amounts")
        .increment(stats.dropped_amounts);
    ::metrics::counter!(phase_metric!(counter, "transform", "rows_dropped"), "filter" => "timing")
        .increment(stats.dropped_timing);
}

pub fn record_durations(read_secs: f64, transform_secs: f64) {
    ::metrics::histogram!(phase_metric!(histogram, "transform", "read_seconds")).record(read_secs);
    ::metrics::histogram!(phase_metric!(histogram, "transform", "duration_seconds")).record(transform_secs);
}

pub fn file_failed(error_kind: &'static str) {
    ::metrics::counter!(phase_metric!(counter, "transform", "files_failed"), "kind" => error_kind)
        .increment(1);
}

impl PhaseMetrics for TransformMetrics {
    fn register_metrics() {
        use metrics::{counter, histogram};

        let _ = counter!(phase_metric!(counter, "transform", "rows_read"));
        let _ = counter!(phase_metric!(counter, "transform", "rows_kept"));
        let _ = counter!(phase_metric!(counter, "transform", "rows_dropped"));
        let _ = counter!(phase_metric!(counter, "transform", "files_failed"));
        let _ = histogram!(phase_metric!(histogram, "transform", "read_seconds"));
        let _ = histogram!(phase_metric!(histogram, "transform", "duration_seconds"));
    }

    fn phase_name() -> &'static str {
        "transform"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "transform", "rows_read"),
                metric_type: MetricType::Counter,
                help: "Rows decoded from trip files",
            },
            MetricDoc {
                name: phase_metric!(counter, "transform", "rows_kept"),
                metric_type: MetricType::Counter,
                help: "Rows that passed both filters and were enriched",
            },
            MetricDoc {
                name: phase_metric!(counter, "transform", "rows_dropped"),
                metric_type: MetricType::Counter,
                help: "Rows removed by a filter, labelled by filter",
            },
            MetricDoc {
                name: phase_metric!(counter, "transform", "files_failed"),
                metric_type: MetricType::Counter,
                help: "Files whose read or transform failed",
            },
            MetricDoc {
                name: phase_metric!(histogram, "transform", "read_seconds"),
                metric_type: MetricType::Histogram,
                help: "Time to open and schema-check one file",
            },
            MetricDoc {
                name: phase_metric!(histogram, "transform", "duration_seconds"),
                metric_type: MetricType::Histogram,
                help: "Time to filter and derive one file",
            },
        ]
    }
}
