use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

/// File name the archive is staged under
const ARCHIVE_FILE: &str = "archive.zip";

/// Directory the archive is extracted into
const EXTRACT_DIR: &str = "extracted";

/// Per-invocation scratch directory.
///
/// The directory name carries a nanosecond timestamp plus a random suffix,
/// so concurrent invocations sharing a base directory never collide. It is
/// deleted when the value is dropped, whatever path the pipeline took out.
#[derive(Debug)]
pub struct WorkArea {
    dir: TempDir,
}

impl WorkArea {
    /// Create a fresh work area beneath `base`, creating `base` if needed
    pub fn allocate(base: &Path) -> io::Result<Self> {
        fs::create_dir_all(base)?;

        let stamp = chrono::Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or_default();
        let dir = tempfile::Builder::new()
            .prefix(&format!("s3unzip-{stamp}-"))
            .tempdir_in(base)?;

        debug!(path = %dir.path().display(), "allocated work area");
        Ok(WorkArea { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Where the downloaded archive is staged
    pub fn archive_path(&self) -> PathBuf {
        self.dir.path().join(ARCHIVE_FILE)
    }

    /// Where the archive contents are extracted
    pub fn extraction_root(&self) -> PathBuf {
        self.dir.path().join(EXTRACT_DIR)
    }

    /// Remove the work area, logging instead of failing if cleanup errors
    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => debug!(path = %path.display(), "removed work area"),
            Err(err) => warn!(path = %path.display(), error = %err, "failed to remove work area"),
        }
    }
}
