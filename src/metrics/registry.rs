//! Metrics registry for coordinating phase-specific metrics

use crate::metrics::{MetricDoc, PhaseMetrics};
use std::collections::HashMap;
use tracing::{info, warn};

/// Register every phase and warn about name collisions.
pub fn register_all_metrics() {
    let mut all_metrics = HashMap::new();

    register_phase_metrics::<super::FetchMetrics>(&mut all_metrics);
    register_phase_metrics::<super::TransformMetrics>(&mut all_metrics);
    register_phase_metrics::<super::LoadMetrics>(&mut all_metrics);

    info!("Registered {} total metrics across all phases", all_metrics.len());
}

fn register_phase_metrics<T: PhaseMetrics>(all_metrics: &mut HashMap<&'static str, (&'static str, MetricDoc)>) {
    T::register_metrics();
    let phase_name = T::phase_name();

    for doc in T::metrics_documentation() {
        if let Some((existing_phase, _)) = all_metrics.get(doc.name) {
            warn!(
                "Metric name conflict detected: '{}' is defined in both '{}' and '{}'",
                doc.name, existing_phase, phase_name
            );
        } else {
            all_metrics.insert(doc.name, (phase_name, doc));
        }
    }
}

/// All documented metrics, for `--help`-style listings and tests.
pub fn all_documentation() -> Vec<MetricDoc> {
    let mut docs = super::FetchMetrics::metrics_documentation();
    docs.extend(super::TransformMetrics::metrics_documentation());
    docs.extend(super::LoadMetrics::metrics_documentation());
    docs
}
