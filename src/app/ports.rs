use crate::error::Result;
use crate::pipeline::transform::TransformOutput;
use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;

// Fetch-side ports
#[async_trait]
pub trait HttpClientPort: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpGetResult>;
}

#[derive(Clone, Debug)]
pub struct HttpGetResult {
    pub status: u16,
    /// Empty unless the status is a success.
    pub bytes: Vec<u8>,
    /// `Content-Length` as advertised by the server, if any.
    pub content_length: Option<u64>,
}

impl HttpGetResult {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Columnar read + filter/derive. Runs synchronously on the blocking pool.
pub trait TransformerPort: Send + Sync {
    fn transform(&self, path: &Path) -> Result<TransformOutput>;
}

// Sink-side ports
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InsertReport {
    pub attempted: usize,
    pub inserted: usize,
    /// First rejection reason, if any documents were rejected.
    pub error: Option<String>,
}

impl InsertReport {
    pub fn is_complete(&self) -> bool {
        self.inserted == self.attempted && self.error.is_none()
    }
}

/// Bulk append of independent JSON documents into the configured collection.
#[async_trait]
pub trait DocumentSinkPort: Send + Sync {
    /// `Err` only when the store cannot be reached at all; rejected
    /// documents are reported through `InsertReport`.
    async fn insert_many(&self, documents: &[serde_json::Value]) -> Result<InsertReport>;
}

#[derive(Clone, Debug, Serialize)]
pub struct CollectionStats {
    pub collection: String,
    pub documents: u64,
    /// Sum of serialized document sizes.
    pub data_bytes: u64,
    /// On-disk size of the backing store.
    pub storage_bytes: u64,
}

/// Read-only observability over the collection; not used on the write path.
#[async_trait]
pub trait CollectionInspectPort: Send + Sync {
    async fn stats(&self) -> Result<CollectionStats>;
    async fn count_documents(&self) -> Result<u64>;
    async fn sample(&self, limit: usize) -> Result<Vec<serde_json::Value>>;
}
