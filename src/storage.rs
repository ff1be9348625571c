//! Storage-directory primitives. The directory listing is the database:
//! all metadata is derived from the on-disk name and size.

use std::io;
use std::path::{Path, PathBuf};

use uuid::Uuid;

/// One directory entry as shown in the listing.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredFile {
    /// On-disk name, `<token>_<sanitized original name>`. Also the public
    /// identifier for download and delete.
    pub unique_name: String,
    /// Presentational name, recovered by stripping the token prefix.
    pub original_name: String,
    /// Size in KiB, rounded to two decimals.
    pub size_kb: f64,
    /// Upper-cased extension of the original name; empty without one.
    pub kind: String,
}

/// Create the storage directory if it is missing. Runs at the start of
/// every request, before any branch.
pub async fn ensure_dir(dir: &Path) -> io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o777)).await?;
    }
    Ok(())
}

/// Strip every character outside `[A-Za-z0-9.]`, preserving order. An empty
/// result is accepted and stored as-is.
pub fn sanitize_name(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '.')
        .collect()
}

/// Opaque per-upload token. Contains no `_`, so stripping through the first
/// one always recovers the sanitized original name.
pub fn new_token() -> String {
    Uuid::new_v4().simple().to_string()
}

pub fn storage_name(token: &str, sanitized: &str) -> String {
    format!("{token}_{sanitized}")
}

/// Everything after the first `_`; names without one come back unchanged.
pub fn display_name(unique_name: &str) -> &str {
    unique_name
        .split_once('_')
        .map_or(unique_name, |(_, rest)| rest)
}

/// Identifier joined onto the storage dir verbatim. No traversal check;
/// see DESIGN.md for the trade-off.
pub fn file_path(dir: &Path, unique_name: &str) -> PathBuf {
    dir.join(unique_name)
}

fn file_kind(original_name: &str) -> String {
    original_name
        .rsplit_once('.')
        .map_or_else(String::new, |(_, ext)| ext.to_uppercase())
}

fn round_kb(bytes: u64) -> f64 {
    (bytes as f64 / 1024.0 * 100.0).round() / 100.0
}

/// Flat scan of the storage directory. No sort: filesystem order is
/// surfaced as-is.
pub async fn list_files(dir: &Path) -> io::Result<Vec<StoredFile>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let unique_name = entry.file_name().to_string_lossy().into_owned();
        let metadata = entry.metadata().await?;
        let original_name = display_name(&unique_name).to_string();
        let kind = file_kind(&original_name);
        files.push(StoredFile {
            unique_name,
            original_name,
            size_kb: round_kb(metadata.len()),
            kind,
        });
    }
    Ok(files)
}
