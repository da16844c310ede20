//! Error types for every pipeline stage.
//!
//! Each stage has its own enum so callers (and tests) can match on the exact
//! failure. [`PipelineError`] wraps them without discarding the cause.

use std::fmt;
use std::io;
use std::path::PathBuf;

use aws_sdk_s3::primitives::ByteStreamError;
use thiserror::Error;
use zip::result::ZipError;

use crate::pipeline::Stage;

/// Boxed error used for collaborator failures whose concrete type depends on
/// the backing store.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("destination bucket is not configured (set DEST_BUCKET)")]
    MissingDestination,

    #[error("upload concurrency must be between 1 and {}", crate::config::MAX_UPLOAD_CONCURRENCY)]
    InvalidConcurrency,
}

/// Failure reported by a retrieval or publish collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to get object s3://{bucket}/{key}: {source}")]
    Get {
        bucket: String,
        key: String,
        source: BoxError,
    },

    #[error("failed to read body of s3://{bucket}/{key}: {source}")]
    Body {
        bucket: String,
        key: String,
        source: BoxError,
    },

    #[error("failed to put object s3://{bucket}/{key}: {source}")]
    Put {
        bucket: String,
        key: String,
        source: BoxError,
    },

    #[error("failed to write '{}': {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("failed to open archive '{}': {source}", path.display())]
    OpenFailed { path: PathBuf, source: ZipError },

    #[error("failed to read archive entry '{entry}': {source}")]
    EntryReadFailed { entry: String, source: ZipError },

    #[error("failed to write '{}': {source}", path.display())]
    WriteFailed { path: PathBuf, source: io::Error },

    #[error("archive entry '{entry}' escapes the extraction root")]
    PathTraversalRejected { entry: String },
}

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("'{}' is not under '{}'", path.display(), root.display())]
    OutsideRoot { root: PathBuf, path: PathBuf },

    #[error("'{}' is the extraction root itself", path.display())]
    Empty { path: PathBuf },

    #[error("'{}' is not valid UTF-8", path.display())]
    NonUtf8 { path: PathBuf },
}

/// Why a single file could not be published.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to walk directory: {source}")]
    Walk {
        #[from]
        source: walkdir::Error,
    },

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error("failed to open file: {source}")]
    Open { source: ByteStreamError },

    #[error(transparent)]
    Transport(#[from] StoreError),

    #[error("upload task ended without reporting a result")]
    Aborted,
}

/// One failed publish task, tagged with the local file it was for.
#[derive(Debug)]
pub struct UploadFailure {
    pub path: PathBuf,
    pub key: Option<String>,
    pub cause: PublishError,
}

impl fmt::Display for UploadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.cause)
    }
}

/// Every per-file failure of one fan-out, plus how many files did make it.
#[derive(Debug)]
pub struct AggregateUploadError {
    pub failures: Vec<UploadFailure>,
    pub uploaded: usize,
}

impl AggregateUploadError {
    /// Failed local paths, in report order.
    pub fn failed_paths(&self) -> impl Iterator<Item = &std::path::Path> {
        self.failures.iter().map(|f| f.path.as_path())
    }
}

impl fmt::Display for AggregateUploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} upload(s) failed, {} succeeded",
            self.failures.len(),
            self.uploaded
        )?;
        for failure in &self.failures {
            write!(f, "; {failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateUploadError {}

#[derive(Debug, Error)]
pub enum EventError {
    #[error("failed to parse trigger event: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("trigger event contains no records")]
    NoRecords,

    #[error("object key '{key}' is not valid percent-encoded UTF-8")]
    InvalidKey { key: String },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to prepare working area under '{}': {source}", path.display())]
    Workspace { path: PathBuf, source: io::Error },

    #[error("failed to retrieve s3://{bucket}/{key}: {source}")]
    Retrieval {
        bucket: String,
        key: String,
        source: StoreError,
    },

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Upload(#[from] AggregateUploadError),

    #[error("{stage} stage did not complete: {source}")]
    Aborted {
        stage: Stage,
        source: tokio::task::JoinError,
    },
}
