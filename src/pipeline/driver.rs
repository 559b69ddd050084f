//! Incremental batch: fetch what is missing, then process what is pending.
//!
//! A file moves `downloaded -> processed` only after every one of its
//! documents is in the collection. Failures of one file are logged and the
//! batch moves on; a checkpoint write failure stops the run.

use crate::app::ports::{DocumentSinkPort, HttpClientPort, TransformerPort};
use crate::app::{FetchReport, FetchUseCase, LoadUseCase};
use crate::catalog::Catalog;
use crate::checkpoint::{CheckpointSet, JsonFileStore, MetadataStore};
use crate::config::EtlConfig;
use crate::error::{EtlError, Result};
use crate::infra::{ReqwestHttp, SqliteDocumentStore};
use crate::metrics::{load as load_metrics, transform as transform_metrics};
use crate::pipeline::transform::{ParquetTransformer, TransformOutput, TransformStats};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Transform,
    Load,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Transform => f.write_str("transform"),
            Phase::Load => f.write_str("load"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum FileOutcome {
    Processed {
        key: String,
        documents: usize,
        stats: TransformStats,
        read_secs: f64,
        transform_secs: f64,
        load_secs: f64,
    },
    Failed {
        key: String,
        phase: Phase,
        error: String,
    },
}

impl FileOutcome {
    pub fn key(&self) -> &str {
        match self {
            FileOutcome::Processed { key, .. } | FileOutcome::Failed { key, .. } => key,
        }
    }

    pub fn is_processed(&self) -> bool {
        matches!(self, FileOutcome::Processed { .. })
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub outcomes: Vec<FileOutcome>,
    pub totals: TransformStats,
}

impl BatchReport {
    pub fn processed(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes.iter().filter(|o| o.is_processed())
    }

    pub fn failed(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes.iter().filter(|o| !o.is_processed())
    }

    pub fn documents_loaded(&self) -> usize {
        self.outcomes
            .iter()
            .map(|o| match o {
                FileOutcome::Processed { documents, .. } => *documents,
                FileOutcome::Failed { .. } => 0,
            })
            .sum()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub fetch: FetchReport,
    pub process: BatchReport,
}

pub struct PipelineDriver {
    fetcher: FetchUseCase,
    transformer: Arc<dyn TransformerPort>,
    loader: LoadUseCase,
    downloaded: Arc<dyn MetadataStore>,
    processed: Arc<dyn MetadataStore>,
    raw_dir: PathBuf,
}

impl PipelineDriver {
    pub fn new(
        http: Arc<dyn HttpClientPort>,
        transformer: Arc<dyn TransformerPort>,
        sink: Arc<dyn DocumentSinkPort>,
        downloaded: Arc<dyn MetadataStore>,
        processed: Arc<dyn MetadataStore>,
        raw_dir: impl Into<PathBuf>,
        base_url: &str,
    ) -> Self {
        let raw_dir = raw_dir.into();
        Self {
            fetcher: FetchUseCase::new(http, downloaded.clone(), raw_dir.clone(), base_url),
            transformer,
            loader: LoadUseCase::new(sink),
            downloaded,
            processed,
            raw_dir,
        }
    }

    /// Wire the production adapters: reqwest, Parquet, SQLite, JSON checkpoints.
    pub fn from_config(config: &EtlConfig) -> Result<Self> {
        let http = ReqwestHttp::new(config.source.timeout_seconds.map(Duration::from_secs))?;
        // Opened on first insert; fetch never touches it.
        let sink = SqliteDocumentStore::deferred(
            &config.sink.database_path,
            &config.sink.collection,
            config.sink.batch_size,
        );
        Ok(Self::new(
            Arc::new(http),
            Arc::new(ParquetTransformer::default()),
            Arc::new(sink),
            Arc::new(JsonFileStore::new(config.paths.downloaded_checkpoint())),
            Arc::new(JsonFileStore::new(config.paths.processed_checkpoint())),
            &config.paths.raw_dir,
            &config.source.base_url,
        ))
    }

    pub async fn fetch(&self, catalog: &Catalog) -> Result<FetchReport> {
        self.fetcher.fetch_missing(catalog).await
    }

    pub async fn run(&self, catalog: &Catalog) -> Result<RunReport> {
        let fetch = self.fetch(catalog).await?;
        let process = self.process_pending(catalog).await?;
        Ok(RunReport { fetch, process })
    }

    /// Files recorded downloaded but not processed. Catalog order first, then
    /// any other recorded keys in lexical order.
    pub fn pending(&self, catalog: &Catalog) -> Result<Vec<String>> {
        let downloaded = self.downloaded.load()?;
        let processed = self.processed.load()?;
        Ok(pending_keys(catalog, &downloaded, &processed))
    }

    #[instrument(skip(self, catalog))]
    pub async fn process_pending(&self, catalog: &Catalog) -> Result<BatchReport> {
        let downloaded = self.downloaded.load()?;
        let mut processed = self.processed.load()?;
        let pending = pending_keys(catalog, &downloaded, &processed);

        let mut report = BatchReport::default();
        if pending.is_empty() {
            info!("No new files to process.");
            return Ok(report);
        }
        info!("{} file(s) pending processing", pending.len());

        for key in pending {
            let outcome = self.process_file(&key, &mut processed).await?;
            if let FileOutcome::Processed { stats, .. } = &outcome {
                report.totals += stats;
            }
            report.outcomes.push(outcome);
        }
        Ok(report)
    }

    async fn process_file(&self, key: &str, processed: &mut CheckpointSet) -> Result<FileOutcome> {
        info!("Processing {}...", key);

        let output = match self.transform(key).await {
            Ok(output) => output,
            Err(e) => {
                error!("Failed to process {}: {}", key, e);
                transform_metrics::file_failed(e.kind());
                return Ok(FileOutcome::Failed { key: key.to_string(), phase: Phase::Transform, error: e.to_string() });
            }
        };
        info!("Read {} in {:.2} seconds", key, output.read_secs);
        info!("Transformed {} in {:.2} seconds", key, output.transform_secs);
        info!(
            rows_read = output.stats.rows_read,
            rows_kept = output.stats.rows_kept,
            dropped_amounts = output.stats.dropped_amounts,
            dropped_timing = output.stats.dropped_timing,
            "Filtered {}",
            key
        );
        transform_metrics::record_durations(output.read_secs, output.transform_secs);

        let load_started = Instant::now();
        let documents = match self.loader.load(&output.documents).await {
            Ok(n) => n,
            Err(e) => {
                error!("Failed to load {}: {}", key, e);
                return Ok(FileOutcome::Failed { key: key.to_string(), phase: Phase::Load, error: e.to_string() });
            }
        };
        let load_secs = load_started.elapsed().as_secs_f64();
        info!("Loaded {} documents from {} in {:.2} seconds", documents, key, load_secs);

        if documents == 0 {
            warn!("{} produced no documents after filtering", key);
        }

        processed.insert(key.to_string());
        self.processed.save(processed)?;
        load_metrics::file_processed();

        Ok(FileOutcome::Processed {
            key: key.to_string(),
            documents,
            stats: output.stats,
            read_secs: output.read_secs,
            transform_secs: output.transform_secs,
            load_secs,
        })
    }

    async fn transform(&self, key: &str) -> Result<TransformOutput> {
        let transformer = self.transformer.clone();
        let path = self.raw_dir.join(key);
        tokio::task::spawn_blocking(move || transformer.transform(&path))
            .await
            .map_err(|e| EtlError::Transform(format!("transform task failed: {e}")))?
    }
}

fn pending_keys(catalog: &Catalog, downloaded: &CheckpointSet, processed: &CheckpointSet) -> Vec<String> {
    let is_pending = |key: &str| downloaded.contains(key) && !processed.contains(key);

    let mut keys: Vec<String> = catalog
        .iter()
        .map(|e| e.key())
        .filter(|key| is_pending(*key))
        .map(str::to_string)
        .collect();
    keys.extend(
        downloaded
            .iter()
            .filter(|key| !catalog.contains_key(key.as_str()) && is_pending(key.as_str()))
            .cloned(),
    );
    keys
}
