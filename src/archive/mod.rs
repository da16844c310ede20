pub mod sanitize;
pub mod zip;

use std::path::{Path, PathBuf};

use crate::error::ExtractionError;

pub use self::zip::ZipExtractor;

/// A regular file written during extraction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFile {
    /// Absolute local path of the written file
    pub path: PathBuf,
    /// Number of bytes written
    pub size: u64,
    /// Permission bits stored in the archive, if any
    pub mode: Option<u32>,
}

/// Trait for handling different archive formats
///
/// Extraction is blocking; async callers run it on a blocking thread.
pub trait ArchiveExtractor: Send + Sync {
    /// Unpack the archive at `archive` beneath `destination`, creating
    /// `destination` if needed. Fails on the first entry that cannot be
    /// read, written, or confined to `destination`.
    fn extract(&self, archive: &Path, destination: &Path)
    -> Result<Vec<ExtractedFile>, ExtractionError>;
}
