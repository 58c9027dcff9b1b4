use chrono::{DateTime, Local, NaiveDateTime};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Extensions (without the dot) the extractor knows how to read
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "pdf", "docx", "pptx", "txt", "md", "markdown", "html", "htm",
];

/// Get file extension from path (without the dot)
pub fn get_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|s| s.to_lowercase())
}

/// Whether the file has an extension we index
pub fn is_supported(path: &Path) -> bool {
    get_extension(path)
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Whether the final path component starts with a dot
pub fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

/// Name of the immediate parent directory, empty for root-level paths
pub fn parent_folder_name(path: &Path) -> String {
    path.parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Blake3 fingerprint of a chunk: whitespace-normalized text, source path and page
pub fn chunk_fingerprint(text: &str, path: &str, page: Option<u32>) -> String {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let page = page.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string());

    let mut hasher = blake3::Hasher::new();
    hasher.update(normalized.as_bytes());
    hasher.update(b"|");
    hasher.update(path.as_bytes());
    hasher.update(b"|");
    hasher.update(page.as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Local-time ISO-8601 rendering of a modification time
pub fn mtime_iso(mtime: SystemTime) -> String {
    let local: DateTime<Local> = mtime.into();
    local.naive_local().format("%Y-%m-%dT%H:%M:%S%.f").to_string()
}

/// Best-effort ISO-8601 parse; offsets are converted to local wall-clock time
pub fn parse_iso(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Local).naive_local());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(dt);
    }
    chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Expand `~` and environment variables in a configured path
pub fn expand_path(path: &str) -> PathBuf {
    match shellexpand::full(path) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(shellexpand::tilde(path).as_ref()),
    }
}
