use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

const FALLBACK_FILENAME: &str = "report.pdf";

/// Only the last path component of a suggested name is used, so a server
/// cannot direct the file outside `dir`.
pub fn document_filename(suggested: Option<&str>) -> String {
    suggested
        .and_then(|name| Path::new(name.trim()).file_name())
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty() && *name != "..")
        .map(str::to_string)
        .unwrap_or_else(|| FALLBACK_FILENAME.to_string())
}

pub async fn save_document(dir: &Path, suggested: Option<&str>, bytes: &[u8]) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join(document_filename(suggested));
    tokio::fs::write(&path, bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}
