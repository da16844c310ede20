use std::fs::{self, File};
use std::io::{BufReader, ErrorKind, Read, Write};
use std::path::Path;

use ::zip::ZipArchive;
use ::zip::result::ZipError;
use tracing::debug;

use super::sanitize::resolve_entry_path;
use super::{ArchiveExtractor, ExtractedFile};
use crate::error::ExtractionError;

/// Copy buffer size for entry bodies
const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Mode for files whose entry carries no unix permissions
const DEFAULT_FILE_MODE: u32 = 0o644;

/// Owner bits forced onto extracted directories so the tree can be
/// populated and later removed
const OWNER_RWX: u32 = 0o700;

/// Permission bits kept from an entry's stored mode (drops file type bits)
const PERMISSION_MASK: u32 = 0o7777;

/// Extracts zip archives to a local directory tree
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipExtractor;

impl ZipExtractor {
    pub fn new() -> Self {
        ZipExtractor
    }
}

impl ArchiveExtractor for ZipExtractor {
    fn extract(
        &self,
        archive_path: &Path,
        destination: &Path,
    ) -> Result<Vec<ExtractedFile>, ExtractionError> {
        let open_failed = |source| ExtractionError::OpenFailed {
            path: archive_path.to_path_buf(),
            source,
        };

        let file = File::open(archive_path).map_err(|e| open_failed(ZipError::Io(e)))?;
        let mut archive = ZipArchive::new(BufReader::new(file)).map_err(open_failed)?;

        fs::create_dir_all(destination).map_err(|source| ExtractionError::WriteFailed {
            path: destination.to_path_buf(),
            source,
        })?;

        let mut extracted = Vec::new();

        for index in 0..archive.len() {
            let mut entry =
                archive
                    .by_index(index)
                    .map_err(|source| ExtractionError::EntryReadFailed {
                        entry: format!("#{index}"),
                        source,
                    })?;

            let name = entry.name().to_string();
            let target = resolve_entry_path(destination, &name)?;
            let mode = entry.unix_mode().map(|m| m & PERMISSION_MASK);

            if entry.is_dir() {
                debug!(entry = %name, "create directory");
                fs::create_dir_all(&target).map_err(|source| ExtractionError::WriteFailed {
                    path: target.clone(),
                    source,
                })?;
                if let Some(mode) = mode {
                    set_mode(&target, mode | OWNER_RWX)?;
                }
                continue;
            }

            // Archives may omit explicit directory entries
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|source| ExtractionError::WriteFailed {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }

            let size = copy_entry(&mut entry, &name, &target)?;
            set_mode(&target, mode.unwrap_or(DEFAULT_FILE_MODE))?;
            debug!(entry = %name, size, "extracted file");

            extracted.push(ExtractedFile {
                path: target,
                size,
                mode,
            });
        }

        Ok(extracted)
    }
}

/// Copy an entry body into `target` verbatim. Read and write failures are
/// reported separately.
fn copy_entry(reader: &mut impl Read, name: &str, target: &Path) -> Result<u64, ExtractionError> {
    let write_failed = |source| ExtractionError::WriteFailed {
        path: target.to_path_buf(),
        source,
    };

    let mut out = File::create(target).map_err(write_failed)?;
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut written = 0u64;

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(ExtractionError::EntryReadFailed {
                    entry: name.to_string(),
                    source: ZipError::Io(e),
                });
            }
        };
        out.write_all(&buf[..n]).map_err(write_failed)?;
        written += n as u64;
    }

    out.flush().map_err(write_failed)?;
    Ok(written)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<(), ExtractionError> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|source| {
        ExtractionError::WriteFailed {
            path: path.to_path_buf(),
            source,
        }
    })
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<(), ExtractionError> {
    Ok(())
}
