use crate::constants;
use crate::error::{EtlError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const ENV_PREFIX: &str = "TAXI_ETL_";

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct EtlConfig {
    pub source: SourceConfig,
    pub paths: PathsConfig,
    pub sink: SinkConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: String,
    pub dataset: String,
    pub start_year: i32,
    pub end_year: i32,
    /// Request timeout handed to the HTTP client; `None` keeps the client default.
    pub timeout_seconds: Option<u64>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: constants::DEFAULT_BASE_URL.to_string(),
            dataset: constants::DEFAULT_DATASET.to_string(),
            start_year: constants::DEFAULT_START_YEAR,
            end_year: constants::DEFAULT_END_YEAR,
            timeout_seconds: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub raw_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from(constants::DEFAULT_RAW_DIR),
            processed_dir: PathBuf::from(constants::DEFAULT_PROCESSED_DIR),
            log_dir: PathBuf::from(constants::DEFAULT_LOG_DIR),
        }
    }
}

impl PathsConfig {
    pub fn downloaded_checkpoint(&self) -> PathBuf {
        self.raw_dir.join(constants::DOWNLOADED_CHECKPOINT)
    }

    pub fn processed_checkpoint(&self) -> PathBuf {
        self.processed_dir.join(constants::PROCESSED_CHECKPOINT)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub database_path: PathBuf,
    pub collection: String,
    pub batch_size: usize,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(constants::DEFAULT_DATABASE_PATH),
            collection: constants::DEFAULT_COLLECTION.to_string(),
            batch_size: constants::DEFAULT_INSERT_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus listen address, e.g. `127.0.0.1:9898`. Unset disables the exporter.
    pub listen_addr: Option<String>,
}

/// Abstraction over environment lookups so tests can supply overrides
/// without touching the process environment.
pub trait EnvSource {
    fn get(&self, key: &str) -> Option<String>;
}

pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(format!("{ENV_PREFIX}{key}")).ok()
    }
}

impl EtlConfig {
    /// Load from a TOML file (missing file means defaults), apply env overrides, validate.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = fs::read_to_string(path).map_err(|e| {
                EtlError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
            })?;
            Self::from_toml(&content)?
        } else {
            debug!("Config file {} not found, using defaults", path.display());
            Self::default()
        };
        config.apply_env_overrides(&ProcessEnv)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn apply_env_overrides<E: EnvSource>(&mut self, env: &E) -> Result<()> {
        if let Some(v) = env.get("BASE_URL") {
            self.source.base_url = v;
        }
        if let Some(v) = env.get("DATASET") {
            self.source.dataset = v;
        }
        if let Some(v) = env.get("START_YEAR") {
            self.source.start_year = parse_env("START_YEAR", &v)?;
        }
        if let Some(v) = env.get("END_YEAR") {
            self.source.end_year = parse_env("END_YEAR", &v)?;
        }
        if let Some(v) = env.get("TIMEOUT_SECONDS") {
            self.source.timeout_seconds = Some(parse_env("TIMEOUT_SECONDS", &v)?);
        }
        if let Some(v) = env.get("RAW_DIR") {
            self.paths.raw_dir = PathBuf::from(v);
        }
        if let Some(v) = env.get("PROCESSED_DIR") {
            self.paths.processed_dir = PathBuf::from(v);
        }
        if let Some(v) = env.get("LOG_DIR") {
            self.paths.log_dir = PathBuf::from(v);
        }
        if let Some(v) = env.get("DATABASE_PATH") {
            self.sink.database_path = PathBuf::from(v);
        }
        if let Some(v) = env.get("COLLECTION") {
            self.sink.collection = v;
        }
        if let Some(v) = env.get("BATCH_SIZE") {
            self.sink.batch_size = parse_env("BATCH_SIZE", &v)?;
        }
        if let Some(v) = env.get("METRICS_ADDR") {
            self.metrics.listen_addr = Some(v);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.source.start_year > self.source.end_year {
            return Err(EtlError::Config(format!(
                "source.start_year ({}) is after source.end_year ({})",
                self.source.start_year, self.source.end_year
            )));
        }
        if self.source.base_url.trim().is_empty() {
            return Err(EtlError::Config("source.base_url must not be empty".into()));
        }
        if self.source.dataset.trim().is_empty() {
            return Err(EtlError::Config("source.dataset must not be empty".into()));
        }
        if self.sink.collection.trim().is_empty() {
            return Err(EtlError::Config("sink.collection must not be empty".into()));
        }
        if self.sink.batch_size == 0 {
            return Err(EtlError::Config("sink.batch_size must be greater than 0".into()));
        }
        if self.source.end_year - self.source.start_year > 50 {
            warn!(
                start = self.source.start_year,
                end = self.source.end_year,
                "Year range is very wide; most catalog entries will not exist upstream"
            );
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| EtlError::Config(format!("Invalid {ENV_PREFIX}{key} value '{value}': {e}")))
}
