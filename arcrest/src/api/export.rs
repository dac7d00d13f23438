//! Dump any response value to a local JSON file

use serde::Serialize;
use std::path::{Path, PathBuf};

use super::error::Result;

/// Pretty-print `value` to `path`, adding a `.json` extension when the path has none.
pub fn write_json<T: Serialize + ?Sized>(path: impl AsRef<Path>, value: &T) -> Result<PathBuf> {
    let mut path = path.as_ref().to_path_buf();
    if path.extension().is_none() {
        path.set_extension("json");
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let body = serde_json::to_string_pretty(value)?;
    std::fs::write(&path, body)?;
    tracing::debug!("Wrote {}", path.display());
    Ok(path)
}
