//! Fatal pipeline errors.
//!
//! Data-quality problems are never errors: they are logged and coerced to a
//! safe default by the stage that meets them.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Error type for stage I/O. Every variant aborts the running stage.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed CSV in {source_name}: {source}")]
    Csv {
        source_name: String,
        #[source]
        source: csv::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{source_name} has no header row after skipping {skipped} title row(s)")]
    MissingHeader { source_name: String, skipped: usize },

    #[error("backup to {path} failed, refusing to modify input: {source}")]
    Backup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP request for {url} failed with status {status}")]
    HttpStatus { url: String, status: u16 },
}

pub type Result<T> = std::result::Result<T, PipelineError>;
