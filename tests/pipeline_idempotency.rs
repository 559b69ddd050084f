use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use taxi_etl::app::ports::{HttpClientPort, HttpGetResult, TransformerPort};
use taxi_etl::catalog::{Catalog, CatalogEntry};
use taxi_etl::config::EtlConfig;
use taxi_etl::checkpoint::{CheckpointSet, InMemoryStore, JsonFileStore, MetadataStore};
use taxi_etl::domain::{TripDocument, TripRecord};
use taxi_etl::error::{EtlError, Result};
use taxi_etl::infra::{InMemorySink, SqliteDocumentStore};
use taxi_etl::pipeline::{FileOutcome, Phase, PipelineDriver, TransformOutput, TransformStats};
use tempfile::tempdir;

const BASE_URL: &str = "http://tlc.test/trip-data";

#[derive(Default)]
struct CountingHttp {
    requests: Mutex<Vec<String>>,
}

impl CountingHttp {
    fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpClientPort for CountingHttp {
    async fn get(&self, url: &str) -> Result<HttpGetResult> {
        self.requests.lock().unwrap().push(url.to_string());
        Ok(HttpGetResult {
            status: 200,
            bytes: b"PAR1".to_vec(),
            content_length: Some(4),
        })
    }
}

/// Produces `docs_per_file` documents per file and fails for chosen keys.
struct FakeTransformer {
    docs_per_file: usize,
    failing: Vec<String>,
    calls: Mutex<HashMap<String, usize>>,
}

impl FakeTransformer {
    fn new(docs_per_file: usize) -> Self {
        Self { docs_per_file, failing: Vec::new(), calls: Mutex::new(HashMap::new()) }
    }

    fn failing_on(mut self, key: &str) -> Self {
        self.failing.push(key.to_string());
        self
    }

    fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

fn trip_document(i: usize) -> TripDocument {
    let pickup = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap().and_hms_opt(8, 0, 0).unwrap();
    TripRecord {
        vendor_id: Some(1),
        pickup,
        dropoff: pickup + chrono::Duration::seconds(125 + i as i64),
        trip_distance: 1.5,
        pu_location_id: Some(1),
        do_location_id: Some(2),
        tip_amount: Some(2.0),
        total_amount: 10.0,
    }
    .enrich()
    .unwrap()
}

impl TransformerPort for FakeTransformer {
    fn transform(&self, path: &Path) -> Result<TransformOutput> {
        let key = path.file_name().unwrap().to_string_lossy().to_string();
        *self.calls.lock().unwrap().entry(key.clone()).or_default() += 1;
        if self.failing.contains(&key) {
            return Err(EtlError::Schema { file: key, message: "missing required columns: VendorID".into() });
        }
        let n = self.docs_per_file as u64;
        Ok(TransformOutput {
            documents: (0..self.docs_per_file).map(trip_document).collect(),
            stats: TransformStats { rows_read: n, rows_kept: n, ..Default::default() },
            read_secs: 0.0,
            transform_secs: 0.0,
        })
    }
}

/// Processed store whose saves always fail.
struct BrokenStore;

impl MetadataStore for BrokenStore {
    fn load(&self) -> Result<CheckpointSet> {
        Ok(CheckpointSet::new())
    }

    fn save(&self, _set: &CheckpointSet) -> Result<()> {
        Err(EtlError::Checkpoint {
            path: "processed_files.json".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
        })
    }

    fn location(&self) -> String {
        "broken".to_string()
    }
}

fn quarter() -> Catalog {
    Catalog::from_entries(Catalog::for_years("yellow_tripdata", 2023, 2023).entries()[..3].to_vec())
}

fn assert_subset(processed: &CheckpointSet, downloaded: &CheckpointSet) {
    assert!(processed.is_subset(downloaded), "{processed:?} not within {downloaded:?}");
}

#[tokio::test]
async fn second_run_does_no_work() {
    let dir = tempdir().unwrap();
    let http = Arc::new(CountingHttp::default());
    let transformer = Arc::new(FakeTransformer::new(4));
    let sink = InMemorySink::new();
    let downloaded = Arc::new(InMemoryStore::new("downloaded"));
    let processed = Arc::new(InMemoryStore::new("processed"));
    let driver = PipelineDriver::new(
        http.clone(),
        transformer.clone(),
        Arc::new(sink.clone()),
        downloaded.clone(),
        processed.clone(),
        dir.path(),
        BASE_URL,
    );

    let first = driver.run(&quarter()).await.unwrap();
    assert_eq!(first.fetch.downloaded.len(), 3);
    assert_eq!(first.process.processed().count(), 3);
    assert_eq!(first.process.documents_loaded(), 12);
    assert_eq!(first.process.totals.rows_kept, 12);

    let second = driver.run(&quarter()).await.unwrap();
    assert!(second.fetch.downloaded.is_empty());
    assert!(second.process.outcomes.is_empty());
    assert_eq!(http.count(), 3);
    assert_eq!(transformer.total_calls(), 3);
    assert_eq!(sink.documents().len(), 12);
    assert_subset(&processed.load().unwrap(), &downloaded.load().unwrap());
}

#[tokio::test]
async fn failing_file_is_isolated_and_retried() {
    let dir = tempdir().unwrap();
    let bad = "yellow_tripdata_2023-02.parquet";
    let transformer = Arc::new(FakeTransformer::new(2).failing_on(bad));
    let sink = InMemorySink::new();
    let downloaded = Arc::new(InMemoryStore::new("downloaded"));
    let processed = Arc::new(InMemoryStore::new("processed"));
    let driver = PipelineDriver::new(
        Arc::new(CountingHttp::default()),
        transformer.clone(),
        Arc::new(sink.clone()),
        downloaded.clone(),
        processed.clone(),
        dir.path(),
        BASE_URL,
    );

    let report = driver.run(&quarter()).await.unwrap();
    let failed: Vec<_> = report.process.failed().collect();
    assert_eq!(failed.len(), 1);
    assert!(matches!(failed[0], FileOutcome::Failed { phase: Phase::Transform, .. }));
    assert_eq!(failed[0].key(), bad);
    assert_eq!(report.process.processed().count(), 2);

    let done = processed.load().unwrap();
    assert!(!done.contains(bad));
    assert!(done.contains("yellow_tripdata_2023-03.parquet"));

    // Only the failed file is attempted again.
    let retry = driver.process_pending(&quarter()).await.unwrap();
    assert_eq!(retry.outcomes.len(), 1);
    assert_eq!(retry.outcomes[0].key(), bad);
    assert_eq!(transformer.total_calls(), 4);
}

#[tokio::test]
async fn partial_load_leaves_file_unprocessed() {
    let dir = tempdir().unwrap();
    let sink = InMemorySink::new();
    sink.set_accept_limit(Some(8));
    let downloaded = Arc::new(InMemoryStore::with_keys("downloaded", ["yellow_tripdata_2023-01.parquet"]));
    let processed = Arc::new(InMemoryStore::new("processed"));
    let driver = PipelineDriver::new(
        Arc::new(CountingHttp::default()),
        Arc::new(FakeTransformer::new(10)),
        Arc::new(sink.clone()),
        downloaded,
        processed.clone(),
        dir.path(),
        BASE_URL,
    );

    let report = driver.process_pending(&quarter()).await.unwrap();
    match &report.outcomes[0] {
        FileOutcome::Failed { phase, error, .. } => {
            assert_eq!(*phase, Phase::Load);
            assert!(error.contains("8 of 10"));
        }
        other => panic!("expected load failure, got {other:?}"),
    }
    assert!(processed.load().unwrap().is_empty());
    assert_eq!(sink.documents().len(), 8);
}

#[tokio::test]
async fn unavailable_sink_fails_each_file_without_marking() {
    let dir = tempdir().unwrap();
    let sink = InMemorySink::new();
    sink.set_unavailable(true);
    let downloaded = Arc::new(InMemoryStore::with_keys(
        "downloaded",
        ["yellow_tripdata_2023-01.parquet", "yellow_tripdata_2023-02.parquet"],
    ));
    let processed = Arc::new(InMemoryStore::new("processed"));
    let driver = PipelineDriver::new(
        Arc::new(CountingHttp::default()),
        Arc::new(FakeTransformer::new(1)),
        Arc::new(sink),
        downloaded,
        processed.clone(),
        dir.path(),
        BASE_URL,
    );

    let report = driver.process_pending(&quarter()).await.unwrap();
    assert_eq!(report.failed().count(), 2);
    assert_eq!(processed.save_count(), 0);
}

#[tokio::test]
async fn checkpoint_failure_aborts_the_batch() {
    let dir = tempdir().unwrap();
    let transformer = Arc::new(FakeTransformer::new(1));
    let downloaded = Arc::new(InMemoryStore::with_keys(
        "downloaded",
        ["yellow_tripdata_2023-01.parquet", "yellow_tripdata_2023-02.parquet"],
    ));
    let driver = PipelineDriver::new(
        Arc::new(CountingHttp::default()),
        transformer.clone(),
        Arc::new(InMemorySink::new()),
        downloaded,
        Arc::new(BrokenStore),
        dir.path(),
        BASE_URL,
    );

    let err = driver.process_pending(&quarter()).await.unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(transformer.total_calls(), 1);
}

#[tokio::test]
async fn interrupted_run_resumes_from_disk_checkpoints() {
    let raw = tempdir().unwrap();
    let fixed = tempdir().unwrap();
    let downloaded_path = raw.path().join("downloaded_files.json");
    let processed_path = fixed.path().join("processed_files.json");
    let bad = "yellow_tripdata_2023-03.parquet";

    // First process: downloads everything, then fails on the last file as if it died there.
    {
        let driver = PipelineDriver::new(
            Arc::new(CountingHttp::default()),
            Arc::new(FakeTransformer::new(3).failing_on(bad)),
            Arc::new(InMemorySink::new()),
            Arc::new(JsonFileStore::new(&downloaded_path)),
            Arc::new(JsonFileStore::new(&processed_path)),
            raw.path(),
            BASE_URL,
        );
        driver.run(&quarter()).await.unwrap();
    }

    let downloaded = JsonFileStore::new(&downloaded_path).load().unwrap();
    let processed = JsonFileStore::new(&processed_path).load().unwrap();
    assert_eq!(downloaded.len(), 3);
    assert_eq!(processed.len(), 2);
    assert_subset(&processed, &downloaded);

    // Fresh process with the same directories picks up only the remainder.
    let http = Arc::new(CountingHttp::default());
    let transformer = Arc::new(FakeTransformer::new(3));
    let driver = PipelineDriver::new(
        http.clone(),
        transformer.clone(),
        Arc::new(InMemorySink::new()),
        Arc::new(JsonFileStore::new(&downloaded_path)),
        Arc::new(JsonFileStore::new(&processed_path)),
        raw.path(),
        BASE_URL,
    );
    let report = driver.run(&quarter()).await.unwrap();
    assert_eq!(http.count(), 0);
    assert_eq!(transformer.total_calls(), 1);
    assert_eq!(report.process.outcomes[0].key(), bad);
    assert_eq!(JsonFileStore::new(&processed_path).load().unwrap(), downloaded);
}

#[tokio::test]
async fn unreachable_store_does_not_block_fetching() {
    let server = httpmock::MockServer::start();
    server.mock(|when, then| {
        when.method(httpmock::Method::GET).path("/trip-data/yellow_tripdata_2023-01.parquet");
        then.status(200).body("PAR1");
    });
    let dir = tempdir().unwrap();
    let mut config = EtlConfig::default();
    config.source.base_url = server.url("/trip-data");
    config.paths.raw_dir = dir.path().join("raw");
    config.paths.processed_dir = dir.path().join("fixed");
    // A directory where the database file should be
    config.sink.database_path = dir.path().to_path_buf();

    let driver = PipelineDriver::from_config(&config).unwrap();
    let catalog = Catalog::from_entries(vec![CatalogEntry::new("yellow_tripdata", 2023, 1)]);
    let report = driver.run(&catalog).await.unwrap();

    assert_eq!(report.fetch.downloaded, vec!["yellow_tripdata_2023-01.parquet".to_string()]);
    let downloaded = JsonFileStore::new(config.paths.downloaded_checkpoint()).load().unwrap();
    assert!(downloaded.contains("yellow_tripdata_2023-01.parquet"));
}

#[tokio::test]
async fn store_that_cannot_open_fails_the_load_phase() {
    let dir = tempdir().unwrap();
    let downloaded = Arc::new(InMemoryStore::with_keys(
        "downloaded",
        ["yellow_tripdata_2023-01.parquet", "yellow_tripdata_2023-02.parquet"],
    ));
    let processed = Arc::new(InMemoryStore::new("processed"));
    let driver = PipelineDriver::new(
        Arc::new(CountingHttp::default()),
        Arc::new(FakeTransformer::new(2)),
        Arc::new(SqliteDocumentStore::deferred(dir.path(), "processed_trips", 100)),
        downloaded,
        processed.clone(),
        dir.path(),
        BASE_URL,
    );

    let report = driver.process_pending(&quarter()).await.unwrap();
    assert_eq!(report.outcomes.len(), 2);
    assert!(report
        .outcomes
        .iter()
        .all(|o| matches!(o, FileOutcome::Failed { phase: Phase::Load, .. })));
    assert!(processed.load().unwrap().is_empty());
}
