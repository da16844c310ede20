use std::path::{Component, Path};

use crate::error::KeyError;

/// Derive the object key for `file` from its position beneath `root`.
///
/// Path components are joined with `/` in order; case and spelling are left
/// alone. Only paths discovered under `root` are valid input.
pub fn derive_key(root: &Path, file: &Path) -> Result<String, KeyError> {
    let outside = || KeyError::OutsideRoot {
        root: root.to_path_buf(),
        path: file.to_path_buf(),
    };

    let relative = file.strip_prefix(root).map_err(|_| outside())?;

    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                let part = part.to_str().ok_or_else(|| KeyError::NonUtf8 {
                    path: file.to_path_buf(),
                })?;
                segments.push(part);
            }
            Component::CurDir => {}
            _ => return Err(outside()),
        }
    }

    if segments.is_empty() {
        return Err(KeyError::Empty {
            path: file.to_path_buf(),
        });
    }

    Ok(segments.join("/"))
}
