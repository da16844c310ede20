use std::path::{Component, Path, PathBuf};

use crate::error::ExtractionError;

/// Resolve an archive entry name against the extraction root.
///
/// Absolute names, drive prefixes and `..` segments are rejected, never
/// clamped. `.` and empty segments are dropped.
pub fn resolve_entry_path(root: &Path, entry_name: &str) -> Result<PathBuf, ExtractionError> {
    if entry_name.contains('\0') {
        return Err(rejected(entry_name));
    }

    let mut relative = PathBuf::new();
    for component in Path::new(entry_name).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(rejected(entry_name));
            }
        }
    }

    Ok(root.join(relative))
}

fn rejected(entry_name: &str) -> ExtractionError {
    ExtractionError::PathTraversalRejected {
        entry: entry_name.to_string(),
    }
}
