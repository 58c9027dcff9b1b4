use crate::utils;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::warn;
use walkdir::{DirEntry, WalkDir};

fn is_pruned_dir(entry: &DirEntry, excludes: &[String]) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || excludes.iter().any(|ex| ex == name.as_ref())
}

/// Supported, non-hidden files under each root, in file-name order, each path once.
///
/// Roots are canonicalized so stored paths match the absolute paths reported
/// by the file watcher. A root that is itself a file is taken as is.
pub fn collect_files(roots: &[PathBuf], excludes: &[String]) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for root in roots {
        let root = std::fs::canonicalize(root).unwrap_or_else(|_| root.clone());
        if root.is_file() {
            if utils::is_supported(&root) {
                files.push(root);
            }
            continue;
        }

        let walker = WalkDir::new(&root)
            .sort_by_file_name()
            .into_iter()
            // never prune the root itself, even when it is a dot directory
            .filter_entry(|e| e.depth() == 0 || !is_pruned_dir(e, excludes));

        for entry in walker {
            match entry {
                Ok(e) if e.file_type().is_file() => {
                    let path = e.path();
                    if !utils::is_hidden(path) && utils::is_supported(path) {
                        files.push(path.to_path_buf());
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("Error accessing entry: {}", e),
            }
        }
    }

    // overlapping roots reach the same file twice; keep the first sighting
    let mut seen = HashSet::new();
    files.retain(|path| seen.insert(path.clone()));
    files
}
