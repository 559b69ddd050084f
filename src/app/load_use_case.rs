use crate::app::ports::DocumentSinkPort;
use crate::domain::TripDocument;
use crate::error::{EtlError, Result};
use crate::metrics::load as load_metrics;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Appends one file's documents to the collection.
pub struct LoadUseCase {
    sink: Arc<dyn DocumentSinkPort>,
}

impl LoadUseCase {
    pub fn new(sink: Arc<dyn DocumentSinkPort>) -> Self {
        Self { sink }
    }

    /// Returns the number of documents inserted. Anything short of all of
    /// them is a `PartialWrite` so the caller leaves the file unprocessed.
    pub async fn load(&self, documents: &[TripDocument]) -> Result<usize> {
        if documents.is_empty() {
            debug!("Nothing to load");
            return Ok(0);
        }

        let values = documents
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let started = Instant::now();
        let report = self.sink.insert_many(&values).await.map_err(|e| {
            load_metrics::load_failed(e.kind());
            e
        })?;

        if !report.is_complete() {
            warn!(
                inserted = report.inserted,
                attempted = report.attempted,
                "Bulk insert incomplete: {}",
                report.error.as_deref().unwrap_or("documents rejected")
            );
            load_metrics::load_failed("partial_write");
            return Err(EtlError::PartialWrite {
                inserted: report.inserted,
                attempted: report.attempted,
            });
        }

        load_metrics::documents_inserted(report.inserted, started.elapsed().as_secs_f64());
        Ok(report.inserted)
    }
}
