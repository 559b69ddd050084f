use crate::app::ports::{CollectionInspectPort, CollectionStats, DocumentSinkPort, InsertReport};
use crate::error::{EtlError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// In-memory document sink for development/testing.
///
/// `accept_limit` caps how many documents a single `insert_many` accepts,
/// which simulates a partially failed bulk write.
#[derive(Clone, Default)]
pub struct InMemorySink {
    documents: Arc<Mutex<Vec<serde_json::Value>>>,
    calls: Arc<AtomicUsize>,
    accept_limit: Arc<Mutex<Option<usize>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_accept_limit(&self, limit: Option<usize>) {
        *self.accept_limit.lock().unwrap_or_else(|p| p.into_inner()) = limit;
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn documents(&self) -> Vec<serde_json::Value> {
        self.documents.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn insert_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentSinkPort for InMemorySink {
    async fn insert_many(&self, documents: &[serde_json::Value]) -> Result<InsertReport> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(EtlError::SinkUnavailable("in-memory sink marked unavailable".into()));
        }
        let limit = *self.accept_limit.lock().unwrap_or_else(|p| p.into_inner());
        let accepted = limit.map_or(documents.len(), |l| l.min(documents.len()));

        self.documents
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .extend_from_slice(&documents[..accepted]);

        let error = (accepted < documents.len())
            .then(|| format!("{} documents rejected", documents.len() - accepted));
        Ok(InsertReport { attempted: documents.len(), inserted: accepted, error })
    }
}

#[async_trait]
impl CollectionInspectPort for InMemorySink {
    async fn stats(&self) -> Result<CollectionStats> {
        let docs = self.documents();
        let data_bytes: usize = docs.iter().map(|d| d.to_string().len()).sum();
        Ok(CollectionStats {
            collection: "memory".to_string(),
            documents: docs.len() as u64,
            data_bytes: data_bytes as u64,
            storage_bytes: data_bytes as u64,
        })
    }

    async fn count_documents(&self) -> Result<u64> {
        Ok(self.documents().len() as u64)
    }

    async fn sample(&self, limit: usize) -> Result<Vec<serde_json::Value>> {
        Ok(self.documents().into_iter().take(limit).collect())
    }
}
