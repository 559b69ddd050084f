use crate::catalog::Catalog;
use crate::checkpoint::MetadataStore;
use crate::error::Result;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    PendingDownload,
    /// Recorded downloaded and not yet processed.
    PendingProcess,
    Processed,
}

impl fmt::Display for FileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FileState::PendingDownload => "pending download",
            FileState::PendingProcess => "pending process",
            FileState::Processed => "processed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileStatus {
    pub key: String,
    pub state: FileState,
    pub on_disk: bool,
}

/// Read-only view of both checkpoints, plus `reconcile` to adopt stray files.
pub struct StatusUseCase {
    downloaded: Arc<dyn MetadataStore>,
    processed: Arc<dyn MetadataStore>,
    raw_dir: PathBuf,
}

impl StatusUseCase {
    pub fn new(
        downloaded: Arc<dyn MetadataStore>,
        processed: Arc<dyn MetadataStore>,
        raw_dir: impl Into<PathBuf>,
    ) -> Self {
        Self { downloaded, processed, raw_dir: raw_dir.into() }
    }

    pub fn status(&self, catalog: &Catalog) -> Result<Vec<FileStatus>> {
        let downloaded = self.downloaded.load()?;
        let processed = self.processed.load()?;

        Ok(catalog
            .iter()
            .map(|entry| {
                let key = entry.key();
                let state = if processed.contains(key) {
                    FileState::Processed
                } else if downloaded.contains(key) {
                    FileState::PendingProcess
                } else {
                    FileState::PendingDownload
                };
                FileStatus {
                    key: key.to_string(),
                    state,
                    on_disk: self.raw_dir.join(key).is_file(),
                }
            })
            .collect())
    }

    /// Record catalog files that exist in the raw directory but are missing
    /// from the downloaded checkpoint. Saves once; returns the adopted keys.
    pub fn reconcile(&self, catalog: &Catalog) -> Result<Vec<String>> {
        let mut downloaded = self.downloaded.load()?;
        let adopted: Vec<String> = catalog
            .iter()
            .map(|e| e.key())
            .filter(|key| !downloaded.contains(*key) && self.raw_dir.join(key).is_file())
            .map(str::to_string)
            .collect();

        if adopted.is_empty() {
            info!("Nothing to reconcile in {}", self.raw_dir.display());
            return Ok(adopted);
        }

        downloaded.extend(adopted.iter().cloned());
        self.downloaded.save(&downloaded)?;
        info!("Adopted {} file(s) into {}", adopted.len(), self.downloaded.location());
        Ok(adopted)
    }
}
