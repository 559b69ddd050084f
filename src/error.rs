use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Download failed for {url}: {reason}")]
    Transport { url: String, reason: String },

    #[error("Schema violation in {file}: {message}")]
    Schema { file: String, message: String },

    #[error("Source unavailable {path}: {reason}")]
    SourceUnavailable { path: PathBuf, reason: String },

    #[error("Transform failed: {0}")]
    Transform(String),

    #[error("Document store unavailable: {0}")]
    SinkUnavailable(String),

    #[error("Partial write: {inserted} of {attempted} documents inserted")]
    PartialWrite { inserted: usize, attempted: usize },

    #[error("Checkpoint store failure at {path}: {source}")]
    Checkpoint {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl EtlError {
    /// Only a lost checkpoint write stops the run; everything else is scoped to one file.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EtlError::Checkpoint { .. })
    }

    /// Short label used for logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            EtlError::Transport { .. } => "transport",
            EtlError::Schema { .. } => "schema",
            EtlError::SourceUnavailable { .. } => "source_unavailable",
            EtlError::Transform(_) => "transform",
            EtlError::SinkUnavailable(_) => "sink_unavailable",
            EtlError::PartialWrite { .. } => "partial_write",
            EtlError::Checkpoint { .. } => "checkpoint",
            EtlError::Json(_) => "json",
            EtlError::Toml(_) => "toml",
            EtlError::Io(_) => "io",
            EtlError::Config(_) => "config",
        }
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;
