use crate::app::ports::HttpClientPort;
use crate::catalog::{Catalog, CatalogEntry};
use crate::checkpoint::{CheckpointSet, MetadataStore};
use crate::error::{EtlError, Result};
use crate::metrics::fetch as fetch_metrics;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// What happened to one catalog entry during a fetch pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Downloaded { bytes: u64 },
    /// Already in the downloaded checkpoint.
    AlreadyRecorded,
    /// Present in the raw directory but never recorded; left alone until `reconcile`.
    PresentUnrecorded,
    Failed { reason: String },
}

#[derive(Debug, Default, Clone)]
pub struct FetchReport {
    pub downloaded: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<(String, String)>,
    pub bytes: u64,
}

impl FetchReport {
    fn push(&mut self, key: &str, outcome: FetchOutcome) {
        match outcome {
            FetchOutcome::Downloaded { bytes } => {
                self.bytes += bytes;
                self.downloaded.push(key.to_string());
            }
            FetchOutcome::AlreadyRecorded | FetchOutcome::PresentUnrecorded => {
                self.skipped.push(key.to_string())
            }
            FetchOutcome::Failed { reason } => self.failed.push((key.to_string(), reason)),
        }
    }
}

/// Downloads catalog entries that are neither recorded nor on disk.
pub struct FetchUseCase {
    http: Arc<dyn HttpClientPort>,
    downloaded: Arc<dyn MetadataStore>,
    raw_dir: PathBuf,
    base_url: String,
}

impl FetchUseCase {
    pub fn new(
        http: Arc<dyn HttpClientPort>,
        downloaded: Arc<dyn MetadataStore>,
        raw_dir: impl Into<PathBuf>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            downloaded,
            raw_dir: raw_dir.into(),
            base_url: base_url.into(),
        }
    }

    pub fn raw_dir(&self) -> &Path {
        &self.raw_dir
    }

    /// One pass over the catalog. Only a checkpoint failure aborts; every
    /// other failure is logged and the next entry is tried.
    #[instrument(skip(self, catalog), fields(entries = catalog.len()))]
    pub async fn fetch_missing(&self, catalog: &Catalog) -> Result<FetchReport> {
        let mut recorded = self.downloaded.load()?;
        let mut report = FetchReport::default();

        // Without a raw directory every download fails; report that per file
        // and let processing of earlier downloads go ahead.
        if let Err(e) = tokio::fs::create_dir_all(&self.raw_dir).await {
            error!("Cannot create {}: {}; skipping downloads", self.raw_dir.display(), e);
            let reason = format!("raw directory {} unavailable: {e}", self.raw_dir.display());
            for entry in catalog {
                let outcome = if recorded.contains(entry.key()) {
                    FetchOutcome::AlreadyRecorded
                } else {
                    fetch_metrics::download_error("raw_dir");
                    FetchOutcome::Failed { reason: reason.clone() }
                };
                report.push(entry.key(), outcome);
            }
            return Ok(report);
        }

        for entry in catalog {
            let outcome = self.fetch_entry(entry, &mut recorded).await?;
            report.push(entry.key(), outcome);
        }

        info!(
            "Fetch pass complete: {} downloaded, {} skipped, {} failed",
            report.downloaded.len(),
            report.skipped.len(),
            report.failed.len()
        );
        Ok(report)
    }

    async fn fetch_entry(&self, entry: &CatalogEntry, recorded: &mut CheckpointSet) -> Result<FetchOutcome> {
        let key = entry.key();
        if recorded.contains(key) {
            debug!("{} already downloaded. Skipping.", key);
            fetch_metrics::download_skipped("recorded");
            return Ok(FetchOutcome::AlreadyRecorded);
        }

        let target = self.raw_dir.join(key);
        let on_disk = match tokio::fs::try_exists(&target).await {
            Ok(exists) => exists,
            Err(e) => {
                error!("Cannot check {}: {}", target.display(), e);
                fetch_metrics::download_error("io");
                return Ok(FetchOutcome::Failed { reason: format!("cannot check {}: {e}", target.display()) });
            }
        };
        if on_disk {
            warn!(
                "{} exists on disk but is not recorded as downloaded; run `reconcile` to adopt it",
                key
            );
            fetch_metrics::download_skipped("on_disk");
            return Ok(FetchOutcome::PresentUnrecorded);
        }

        let url = entry.url(&self.base_url);
        let started = Instant::now();
        let bytes = match self.download(&url, &target).await {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Failed to download {}: {}", key, e);
                fetch_metrics::download_error(e.kind());
                return Ok(FetchOutcome::Failed { reason: e.to_string() });
            }
        };

        // Persist immediately so a crash later in the pass keeps this download.
        recorded.insert(key.to_string());
        self.downloaded.save(recorded)?;

        let elapsed = started.elapsed().as_secs_f64();
        fetch_metrics::download_success(bytes, elapsed);
        info!("Downloaded: {} ({} bytes in {:.2}s)", key, bytes, elapsed);
        Ok(FetchOutcome::Downloaded { bytes })
    }

    /// GET the file and write it under `.{key}.part`, renaming into place on success.
    async fn download(&self, url: &str, target: &Path) -> Result<u64> {
        let response = self.http.get(url).await?;
        if !response.is_success() {
            return Err(EtlError::Transport {
                url: url.to_string(),
                reason: format!("HTTP {}", response.status),
            });
        }
        if let Some(expected) = response.content_length {
            if expected != response.bytes.len() as u64 {
                return Err(EtlError::Transport {
                    url: url.to_string(),
                    reason: format!("truncated body: {} of {} bytes", response.bytes.len(), expected),
                });
            }
        }

        let partial = partial_path(target);
        let write = async {
            tokio::fs::write(&partial, &response.bytes).await?;
            tokio::fs::rename(&partial, target).await
        };
        if let Err(e) = write.await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(EtlError::SourceUnavailable {
                path: target.to_path_buf(),
                reason: format!("write failed: {e}"),
            });
        }
        Ok(response.bytes.len() as u64)
    }
}

fn partial_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{name}.part"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::HttpGetResult;
    use crate::checkpoint::InMemoryStore;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct MockHttp {
        responses: HashMap<String, u16>,
        /// Advertised length that disagrees with the body.
        short_bodies: Vec<String>,
        requests: Mutex<Vec<String>>,
    }

    impl MockHttp {
        fn new(responses: &[(&str, u16)]) -> Self {
            Self {
                responses: responses.iter().map(|(u, s)| (u.to_string(), *s)).collect(),
                short_bodies: Vec::new(),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl HttpClientPort for MockHttp {
        async fn get(&self, url: &str) -> Result<HttpGetResult> {
            self.requests.lock().unwrap().push(url.to_string());
            let status = self.responses.get(url).copied().unwrap_or(200);
            let bytes = if (200..300).contains(&status) { b"PAR1".to_vec() } else { Vec::new() };
            let mut content_length = bytes.len() as u64;
            if self.short_bodies.iter().any(|u| u == url) {
                content_length += 100;
            }
            Ok(HttpGetResult { status, content_length: Some(content_length), bytes })
        }
    }

    fn catalog() -> Catalog {
        Catalog::for_years("yellow_tripdata", 2023, 2023)
    }

    #[tokio::test]
    async fn downloads_everything_then_nothing_on_rerun() {
        let dir = tempfile::tempdir().unwrap();
        let http = Arc::new(MockHttp::new(&[]));
        let store = Arc::new(InMemoryStore::new("downloaded"));
        let use_case = FetchUseCase::new(http.clone(), store.clone(), dir.path(), "http://host/trip-data");

        let first = use_case.fetch_missing(&catalog()).await.unwrap();
        assert_eq!(first.downloaded.len(), 12);
        assert_eq!(store.load().unwrap().len(), 12);
        assert!(dir.path().join("yellow_tripdata_2023-07.parquet").exists());
        assert!(!dir.path().join(".yellow_tripdata_2023-07.parquet.part").exists());

        let second = use_case.fetch_missing(&catalog()).await.unwrap();
        assert!(second.downloaded.is_empty());
        assert_eq!(second.skipped.len(), 12);
        assert_eq!(http.request_count(), 12);
    }

    #[tokio::test]
    async fn non_success_status_is_logged_and_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let missing = "http://host/trip-data/yellow_tripdata_2023-03.parquet";
        let http = Arc::new(MockHttp::new(&[(missing, 404)]));
        let store = Arc::new(InMemoryStore::new("downloaded"));
        let use_case = FetchUseCase::new(http, store.clone(), dir.path(), "http://host/trip-data");

        let report = use_case.fetch_missing(&catalog()).await.unwrap();
        assert_eq!(report.downloaded.len(), 11);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "yellow_tripdata_2023-03.parquet");
        assert!(!store.load().unwrap().contains("yellow_tripdata_2023-03.parquet"));
        assert!(!dir.path().join("yellow_tripdata_2023-03.parquet").exists());
    }

    #[tokio::test]
    async fn truncated_body_is_not_written_or_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let mut http = MockHttp::new(&[]);
        http.short_bodies.push("http://host/trip-data/yellow_tripdata_2023-05.parquet".to_string());
        let store = Arc::new(InMemoryStore::new("downloaded"));
        let use_case = FetchUseCase::new(Arc::new(http), store.clone(), dir.path(), "http://host/trip-data");

        let report = use_case.fetch_missing(&catalog()).await.unwrap();
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].1.contains("truncated"));
        assert!(!store.load().unwrap().contains("yellow_tripdata_2023-05.parquet"));
        assert!(!dir.path().join("yellow_tripdata_2023-05.parquet").exists());
    }

    #[tokio::test]
    async fn missing_raw_dir_fails_each_unrecorded_entry() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the raw directory should be
        let raw_dir = dir.path().join("raw");
        std::fs::write(&raw_dir, b"not a directory").unwrap();
        let http = Arc::new(MockHttp::new(&[]));
        let store = Arc::new(InMemoryStore::with_keys("downloaded", ["yellow_tripdata_2023-01.parquet"]));
        let use_case = FetchUseCase::new(http.clone(), store, &raw_dir, "http://host/trip-data");

        let report = use_case.fetch_missing(&catalog()).await.unwrap();
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.failed.len(), 11);
        assert_eq!(http.request_count(), 0);
    }

    #[tokio::test]
    async fn failed_existence_check_is_not_downloaded_over() {
        let dir = tempfile::tempdir().unwrap();
        // File name longer than any filesystem allows, so the check itself errors
        let entry = CatalogEntry::new(&"y".repeat(300), 2023, 1);
        let http = Arc::new(MockHttp::new(&[]));
        let store = Arc::new(InMemoryStore::new("downloaded"));
        let use_case = FetchUseCase::new(http.clone(), store.clone(), dir.path(), "http://host/trip-data");

        let report = use_case.fetch_missing(&Catalog::from_entries(vec![entry])).await.unwrap();
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].1.contains("cannot check"));
        assert_eq!(http.request_count(), 0);
        assert!(store.load().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unrecorded_file_on_disk_is_not_fetched_or_recorded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("yellow_tripdata_2023-01.parquet"), b"local").unwrap();
        let http = Arc::new(MockHttp::new(&[]));
        let store = Arc::new(InMemoryStore::new("downloaded"));
        let use_case = FetchUseCase::new(http.clone(), store.clone(), dir.path(), "http://host/trip-data");

        let report = use_case.fetch_missing(&catalog()).await.unwrap();
        assert_eq!(report.skipped, vec!["yellow_tripdata_2023-01.parquet".to_string()]);
        assert_eq!(http.request_count(), 11);
        assert!(!store.load().unwrap().contains("yellow_tripdata_2023-01.parquet"));
        assert_eq!(
            std::fs::read(dir.path().join("yellow_tripdata_2023-01.parquet")).unwrap(),
            b"local"
        );
    }
}
