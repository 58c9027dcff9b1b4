use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

/// One indexed chunk, stored as a line of the metadata sidecar.
///
/// `id` is the row offset of the chunk's vector in the flat index. Rows are never
/// reused: a re-indexed file gets fresh ids and its old entries are tombstoned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkMeta {
    pub id: u64,
    /// Absolute path of the source file
    pub path: String,
    /// Name of the immediate parent directory
    pub folder: String,
    /// Source modification time at index time (local, ISO-8601)
    pub mtime_iso: String,
    /// 1-indexed page or slide number for paginated formats
    #[serde(default)]
    pub page: Option<u32>,
    pub text_hash: String,
    pub text: String,
    #[serde(default)]
    pub deleted: bool,
}

/// Counts returned by indexing operations
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexSummary {
    pub added: usize,
    pub deleted: usize,
}

impl IndexSummary {
    pub fn new(added: usize, deleted: usize) -> Self {
        Self { added, deleted }
    }
}

impl AddAssign for IndexSummary {
    fn add_assign(&mut self, other: Self) {
        self.added += other.added;
        self.deleted += other.deleted;
    }
}

/// Row counts before and after a compaction pass
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompactionStats {
    pub rows_before: usize,
    pub rows_after: usize,
}

impl CompactionStats {
    pub fn reclaimed(&self) -> usize {
        self.rows_before.saturating_sub(self.rows_after)
    }
}

/// A ranked search result: similarity score plus the joined chunk metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Hit {
    pub score: f32,
    pub meta: ChunkMeta,
}

impl Hit {
    pub fn new(score: f32, meta: ChunkMeta) -> Self {
        Self { score, meta }
    }

    /// `path` or `path:pN` when the chunk came from a page
    pub fn citation_tag(&self) -> String {
        match self.meta.page {
            Some(page) if page > 0 => format!("{}:p{}", self.meta.path, page),
            _ => self.meta.path.clone(),
        }
    }
}

/// Snapshot of the service state shown by callers as progress/status
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IndexStatus {
    pub watching: bool,
    pub folders: Vec<String>,
    /// Rows in the vector store, tombstoned rows included
    pub chunks: usize,
    /// Non-deleted metadata entries
    pub active_chunks: usize,
    pub last_update: Option<IndexSummary>,
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(page: Option<u32>) -> ChunkMeta {
        ChunkMeta {
            id: 7,
            path: "/docs/report.pdf".to_string(),
            folder: "docs".to_string(),
            mtime_iso: "2024-01-01T00:00:00".to_string(),
            page,
            text_hash: "abc".to_string(),
            text: "Revenue grew.".to_string(),
            deleted: false,
        }
    }

    #[test]
    fn test_citation_tag() {
        assert_eq!(Hit::new(0.5, meta(Some(3))).citation_tag(), "/docs/report.pdf:p3");
        assert_eq!(Hit::new(0.5, meta(None)).citation_tag(), "/docs/report.pdf");
    }

    #[test]
    fn test_chunk_meta_json_line_shape() {
        let line = serde_json::to_string(&meta(None)).unwrap();
        assert!(line.contains("\"page\":null"));
        assert!(line.contains("\"deleted\":false"));
        assert!(!line.contains('\n'));
    }

    #[test]
    fn test_chunk_meta_missing_deleted_defaults_false() {
        let line = r#"{"id":1,"path":"/a.txt","folder":"","mtime_iso":"x","text_hash":"h","text":"t"}"#;
        let parsed: ChunkMeta = serde_json::from_str(line).unwrap();
        assert!(!parsed.deleted);
        assert_eq!(parsed.page, None);
    }

    #[test]
    fn test_summary_accumulates() {
        let mut total = IndexSummary::default();
        total += IndexSummary::new(3, 1);
        total += IndexSummary::new(2, 0);
        assert_eq!(total, IndexSummary::new(5, 1));
    }
}
