use crate::error::{RagError, Result};
use crate::indexer::walk;
use crate::models::IndexSummary;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Called before each file of a folder walk with (position, total, path)
pub type ProgressFn<'a> = dyn Fn(usize, usize, &Path) + Send + Sync + 'a;

/// Trait for indexers that keep a searchable copy of files on disk
#[async_trait::async_trait]
pub trait Indexer: Send + Sync {
    /// Replace everything indexed for `path` with its current contents
    async fn index_file(&self, path: &Path) -> Result<IndexSummary>;

    /// Index every supported file under `roots`.
    ///
    /// Directories named in `excludes` or starting with `.` are pruned. A file
    /// that fails is logged and skipped; the summary only counts files that
    /// were processed successfully.
    async fn index_folders(
        &self,
        roots: &[PathBuf],
        excludes: &[String],
        progress: Option<&ProgressFn<'_>>,
    ) -> Result<IndexSummary> {
        let roots = roots.to_vec();
        let excludes = excludes.to_vec();
        let files = tokio::task::spawn_blocking(move || walk::collect_files(&roots, &excludes))
            .await
            .map_err(|e| RagError::Io(std::io::Error::other(e)))?;

        let mut total = IndexSummary::default();
        for (n, file) in files.iter().enumerate() {
            if let Some(report) = progress {
                report(n + 1, files.len(), file);
            }
            match self.index_file(file).await {
                Ok(summary) => total += summary,
                Err(e) => warn!("Failed to index {}: {}", file.display(), e),
            }
        }

        info!(
            "Indexed {} files: {} chunks added, {} removed",
            files.len(),
            total.added,
            total.deleted
        );
        Ok(total)
    }
}
