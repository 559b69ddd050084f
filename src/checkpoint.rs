//! Persisted progress sets (downloaded files, processed files).
//!
//! Each store owns one location and holds a set of file keys. The set is
//! written as a JSON array of strings. Writes go to a sibling temp file that is
//! fsynced and then renamed over the target, so a crash leaves either the old
//! or the new set on disk.

use crate::error::{EtlError, Result};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

pub type CheckpointSet = BTreeSet<String>;

/// Load/save contract for one progress set. Any error is fatal to the run.
pub trait MetadataStore: Send + Sync {
    /// Empty set when nothing has been persisted yet.
    fn load(&self) -> Result<CheckpointSet>;

    fn save(&self, set: &CheckpointSet) -> Result<()>;

    /// Human-readable location for logs.
    fn location(&self) -> String;

    /// Load, insert, save. Returns whether the key was new.
    fn record(&self, key: &str) -> Result<bool> {
        let mut set = self.load()?;
        let inserted = set.insert(key.to_string());
        if inserted {
            self.save(&set)?;
        }
        Ok(inserted)
    }
}

/// JSON file on local disk.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn fail(&self, source: std::io::Error) -> EtlError {
        EtlError::Checkpoint { path: self.path.clone(), source }
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "checkpoint".to_string());
        self.path.with_file_name(format!(".{name}.tmp"))
    }
}

impl MetadataStore for JsonFileStore {
    fn load(&self) -> Result<CheckpointSet> {
        let bytes = match fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(CheckpointSet::new()),
            Err(e) => return Err(self.fail(e)),
        };
        let keys: Vec<String> = serde_json::from_slice(&bytes)
            .map_err(|e| self.fail(std::io::Error::new(ErrorKind::InvalidData, e)))?;
        Ok(keys.into_iter().collect())
    }

    fn save(&self, set: &CheckpointSet) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| self.fail(e))?;
            }
        }
        let keys: Vec<&String> = set.iter().collect();
        let body = serde_json::to_vec(&keys)
            .map_err(|e| self.fail(std::io::Error::new(ErrorKind::InvalidData, e)))?;

        let tmp = self.temp_path();
        let mut file = File::create(&tmp).map_err(|e| self.fail(e))?;
        file.write_all(&body).map_err(|e| self.fail(e))?;
        file.sync_all().map_err(|e| self.fail(e))?;
        drop(file);
        fs::rename(&tmp, &self.path).map_err(|e| self.fail(e))?;

        debug!(path = %self.path.display(), entries = set.len(), "Checkpoint saved");
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-process store for tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    name: String,
    set: Mutex<CheckpointSet>,
    saves: Mutex<usize>,
}

impl InMemoryStore {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), ..Default::default() }
    }

    pub fn with_keys<I, S>(name: &str, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::new(name);
        *store.set.lock().unwrap_or_else(|p| p.into_inner()) = keys.into_iter().map(Into::into).collect();
        store
    }

    /// Number of `save` calls observed.
    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl MetadataStore for InMemoryStore {
    fn load(&self) -> Result<CheckpointSet> {
        Ok(self.set.lock().unwrap_or_else(|p| p.into_inner()).clone())
    }

    fn save(&self, set: &CheckpointSet) -> Result<()> {
        *self.set.lock().unwrap_or_else(|p| p.into_inner()) = set.clone();
        *self.saves.lock().unwrap_or_else(|p| p.into_inner()) += 1;
        Ok(())
    }

    fn location(&self) -> String {
        format!("memory:{}", self.name)
    }
}
