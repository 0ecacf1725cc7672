use std::io::Write;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use super::ImportError;

/// Longest file name (in bytes) common filesystems accept.
const MAX_NAME_BYTES: usize = 255;

/// Extensions longer than this are not kept apart when shortening a name.
const MAX_EXTENSION_BYTES: usize = 16;

/// Write an upload to `<uploads_dir>/<uuid>_<file_name>`.
///
/// The bytes go to a temp file in the same directory first and are
/// renamed into place, so a crash never leaves a partial upload behind.
pub fn store_upload(
    uploads_dir: &Path,
    file_name: &str,
    bytes: &[u8],
) -> Result<PathBuf, ImportError> {
    std::fs::create_dir_all(uploads_dir)?;

    let prefix = format!("{}_", Uuid::new_v4());
    let stored = fit_name(file_name, MAX_NAME_BYTES - prefix.len());
    let target_path = uploads_dir.join(format!("{prefix}{stored}"));

    let mut staged = tempfile::NamedTempFile::new_in(uploads_dir)?;
    staged.write_all(bytes)?;
    staged.as_file().sync_all()?;
    staged.persist(&target_path).map_err(|e| e.error)?;

    tracing::debug!(
        path = %target_path.display(),
        size = bytes.len(),
        "Upload stored"
    );

    Ok(target_path)
}

/// Shorten `name` to at most `max_bytes`, keeping its extension.
fn fit_name(name: &str, max_bytes: usize) -> String {
    if name.len() <= max_bytes {
        return name.to_string();
    }
    let (stem, ext) = match name.rfind('.') {
        Some(dot) if dot > 0 && name.len() - dot <= MAX_EXTENSION_BYTES => name.split_at(dot),
        _ => (name, ""),
    };
    let stem = truncate_at_char_boundary(stem, max_bytes.saturating_sub(ext.len()));
    format!("{stem}{ext}")
}

fn truncate_at_char_boundary(value: &str, max_bytes: usize) -> &str {
    if value.len() <= max_bytes {
        return value;
    }
    let mut end = max_bytes;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

/// Remove a stored upload after a failed ingestion. A file that is already
/// gone is not an error.
pub fn remove_staged(path: &Path) -> Result<(), ImportError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
