use crate::chunker;
use crate::config::ChunkingConfig;
use crate::embeddings::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::extractor::{ExtractedText, ExtractorRegistry};
use crate::indexer::Indexer;
use crate::models::{ChunkMeta, CompactionStats, IndexSummary};
use crate::store::{FlatIndex, LoadOutcome, MetaStore, StorePaths};
use crate::utils;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Persistent retrieval index: a flat vector file plus its metadata sidecar.
///
/// All writes go through `writer`, which owns the in-memory copy of the vector
/// index. Holding it across a whole `index_file` call keeps the vector append
/// and the metadata append one logical transaction: metadata ids start at the
/// row count observed before the append.
pub struct RagIndex {
    paths: StorePaths,
    meta: MetaStore,
    embedder: Arc<dyn EmbeddingProvider>,
    extractors: ExtractorRegistry,
    chunking: ChunkingConfig,
    writer: Mutex<FlatIndex>,
    recovery: Option<String>,
}

impl RagIndex {
    /// Open (or create) the index stored under `home`.
    ///
    /// A corrupt vector file is replaced by an empty index and the sidecar is
    /// moved aside, so ids handed out from now on cannot collide with stale
    /// entries. The same happens to a sidecar left without its vector file, and
    /// to one holding ids past the last vector row. An interrupted compaction is
    /// finished or discarded first.
    pub async fn open(
        home: impl AsRef<Path>,
        embedder: Arc<dyn EmbeddingProvider>,
        chunking: ChunkingConfig,
    ) -> Result<Self> {
        let paths = StorePaths::new(home);
        tokio::fs::create_dir_all(&paths.home).await?;
        let meta = MetaStore::new(&paths.meta);

        let (mut index, outcome) = FlatIndex::open(&paths.vectors, embedder.dimension())?;
        let mut recovery = match outcome {
            LoadOutcome::Loaded => None,
            LoadOutcome::Fresh if !meta.exists() => None,
            LoadOutcome::Fresh => Some(format!(
                "vector index {} is missing; previous metadata was set aside",
                paths.vectors.display()
            )),
            LoadOutcome::Recovered { reason } => Some(format!(
                "vector index {} was unreadable ({reason}); started a fresh index",
                paths.vectors.display()
            )),
        };
        if recovery.is_none() {
            settle_staged_compaction(&meta, &index)?;
            if let Some(max_id) = meta.read_all()?.iter().map(|m| m.id).max() {
                if max_id >= index.len() as u64 {
                    recovery = Some(format!(
                        "metadata refers to row {max_id} but {} holds {} rows; started a fresh index",
                        paths.vectors.display(),
                        index.len()
                    ));
                    index = FlatIndex::new(embedder.dimension());
                    index.persist(&paths.vectors)?;
                }
            }
        } else {
            meta.staged().remove()?;
        }
        if let Some(message) = &recovery {
            warn!("{}", message);
            meta.quarantine()?;
        }

        info!(
            "Opened index at {} ({} rows)",
            paths.home.display(),
            index.len()
        );

        Ok(Self {
            paths,
            meta,
            embedder,
            extractors: ExtractorRegistry::new(),
            chunking,
            writer: Mutex::new(index),
            recovery,
        })
    }

    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    pub fn embedder(&self) -> Arc<dyn EmbeddingProvider> {
        Arc::clone(&self.embedder)
    }

    /// Why prior content was discarded when this index was opened, if it was
    pub fn recovered_from_corruption(&self) -> Option<&str> {
        self.recovery.as_deref()
    }

    /// Rows in the vector index, tombstoned rows included
    pub async fn size(&self) -> usize {
        self.writer.lock().await.len()
    }

    pub async fn active_count(&self) -> Result<usize> {
        let _guard = self.writer.lock().await;
        self.meta.active_count()
    }

    /// Delete both persisted files and start over empty
    pub async fn reset(&self) -> Result<()> {
        let mut index = self.writer.lock().await;
        match tokio::fs::remove_file(&self.paths.vectors).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.meta.remove()?;
        *index = FlatIndex::new(self.embedder.dimension());
        info!("Index at {} reset", self.paths.home.display());
        Ok(())
    }

    /// Rebuild both files from live entries only, renumbering ids from 0.
    ///
    /// The new sidecar is staged next to the old one, then the vector file is
    /// replaced, then the staged sidecar is renamed into place. `open` settles a
    /// compaction cut short between those steps. Live entries whose id has no
    /// row are dropped.
    pub async fn compact(&self) -> Result<CompactionStats> {
        let mut index = self.writer.lock().await;
        let rows_before = index.len();

        let mut live: Vec<ChunkMeta> = self
            .meta
            .read_all()?
            .into_iter()
            .filter(|m| !m.deleted)
            .collect();
        live.sort_by_key(|m| m.id);
        live.dedup_by_key(|m| m.id);

        let mut compacted = FlatIndex::new(index.dimension());
        let mut kept = Vec::with_capacity(live.len());
        for mut entry in live {
            let Some(vector) = usize::try_from(entry.id).ok().and_then(|row| index.vector(row)) else {
                warn!("Dropping metadata entry {} with no vector row", entry.id);
                continue;
            };
            compacted.add(&[vector.to_vec()])?;
            entry.id = kept.len() as u64;
            kept.push(entry);
        }

        let staged = self.meta.staged();
        staged.rewrite(&kept)?;
        if let Err(e) = compacted.persist(&self.paths.vectors) {
            staged.remove()?;
            return Err(e);
        }
        self.meta.commit_staged()?;
        *index = compacted;

        let stats = CompactionStats {
            rows_before,
            rows_after: index.len(),
        };
        info!(
            "Compacted index: {} rows -> {} rows",
            stats.rows_before, stats.rows_after
        );
        Ok(stats)
    }

    /// Chunk extracted text: per page when paged, else as one document
    fn chunk(&self, extracted: &ExtractedText) -> Vec<(Option<u32>, String)> {
        let windows = |text: &str| {
            chunker::iter_sliding_windows(text, self.chunking.max_chars, self.chunking.overlap)
        };
        match &extracted.pages {
            Some(pages) => pages
                .iter()
                .flat_map(|(page, text)| windows(text.as_str()).into_iter().map(move |c| (Some(*page), c)))
                .filter(|(_, c)| !c.trim().is_empty())
                .collect(),
            None => windows(extracted.text.as_str())
                .into_iter()
                .filter(|c| !c.trim().is_empty())
                .map(|c| (None, c))
                .collect(),
        }
    }
}

/// Finish a compaction whose staged sidecar matches the vector file, else drop it.
///
/// A staged sidecar is dense (ids 0..n), so it matches exactly when the vector
/// file already holds the compacted n rows.
fn settle_staged_compaction(meta: &MetaStore, index: &FlatIndex) -> Result<()> {
    let staged = meta.staged();
    if !staged.exists() {
        return Ok(());
    }
    let entries = staged.read_all()?;
    let dense = entries.iter().enumerate().all(|(row, m)| m.id == row as u64);
    if dense && entries.len() == index.len() {
        meta.commit_staged()?;
        info!("Finished interrupted compaction of {}", meta.path().display());
    } else {
        staged.remove()?;
        info!("Discarded unfinished compaction of {}", meta.path().display());
    }
    Ok(())
}

#[async_trait::async_trait]
impl Indexer for RagIndex {
    async fn index_file(&self, path: &Path) -> Result<IndexSummary> {
        if !utils::is_supported(path) {
            return Ok(IndexSummary::default());
        }
        let path_str = path.to_string_lossy().into_owned();

        let mut index = self.writer.lock().await;

        let stat = match tokio::fs::metadata(path).await {
            Ok(stat) if stat.is_file() => stat,
            Ok(_) => return Ok(IndexSummary::default()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // a vanished file only loses its entries
                let deleted = self.meta.soft_delete_path(&path_str)?;
                debug!("{} is gone, removed {} chunks", path.display(), deleted);
                return Ok(IndexSummary::new(0, deleted));
            }
            Err(e) => {
                warn!("Cannot stat {}: {}", path.display(), e);
                return Ok(IndexSummary::default());
            }
        };
        let mtime_iso = stat
            .modified()
            .map(utils::mtime_iso)
            .unwrap_or_default();

        let deleted = self.meta.soft_delete_path(&path_str)?;

        let extracted = self.extractors.load_text(path).await;
        if extracted.is_blank() {
            return Ok(IndexSummary::new(0, deleted));
        }

        let chunks = self.chunk(&extracted);
        let base_id = index.len() as u64;
        let folder = utils::parent_folder_name(path);
        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        let mut texts = Vec::new();
        for (page, text) in chunks {
            let text_hash = utils::chunk_fingerprint(&text, &path_str, page);
            if !seen.insert(text_hash.clone()) {
                continue;
            }
            entries.push(ChunkMeta {
                id: base_id + entries.len() as u64,
                path: path_str.clone(),
                folder: folder.clone(),
                mtime_iso: mtime_iso.clone(),
                page,
                text_hash,
                text: text.clone(),
                deleted: false,
            });
            texts.push(text);
        }
        if entries.is_empty() {
            return Ok(IndexSummary::new(0, deleted));
        }

        let vectors = self.embedder.embed(&texts).await?;
        if vectors.len() != entries.len() {
            return Err(RagError::Embedding(format!(
                "expected {} vectors, got {}",
                entries.len(),
                vectors.len()
            )));
        }

        index.add(&vectors)?;
        if let Err(e) = index.persist(&self.paths.vectors) {
            index.truncate(base_id as usize);
            return Err(e);
        }
        self.meta.append(&entries)?;

        debug!(
            "Indexed {}: {} chunks added, {} removed",
            path.display(),
            entries.len(),
            deleted
        );
        Ok(IndexSummary::new(entries.len(), deleted))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::embeddings::HashingEmbedder;
    use tempfile::TempDir;

    pub(crate) const TEST_DIM: usize = 256;

    pub(crate) async fn open_index(home: &Path) -> RagIndex {
        RagIndex::open(
            home,
            Arc::new(HashingEmbedder::new(TEST_DIM)),
            ChunkingConfig::default(),
        )
        .await
        .unwrap()
    }

    struct FailingEmbedder;

    #[async_trait::async_trait]
    impl EmbeddingProvider for FailingEmbedder {
        async fn compute_embeddings(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(RagError::Embedding("model not downloaded".to_string()))
        }

        fn dimension(&self) -> usize {
            TEST_DIM
        }
    }

    /// Fails any batch containing `marker`, embeds everything else
    struct MarkerFailingEmbedder {
        marker: &'static str,
        inner: HashingEmbedder,
    }

    #[async_trait::async_trait]
    impl EmbeddingProvider for MarkerFailingEmbedder {
        async fn compute_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if texts.iter().any(|t| t.contains(self.marker)) {
                return Err(RagError::Embedding("refused batch".to_string()));
            }
            self.inner.compute_embeddings(texts).await
        }

        fn dimension(&self) -> usize {
            TEST_DIM
        }
    }

    #[tokio::test]
    async fn test_index_file_adds_aligned_rows() {
        let home = TempDir::new().unwrap();
        let docs = TempDir::new().unwrap();
        let file = docs.path().join("notes.txt");
        std::fs::write(&file, "First paragraph.\n\nSecond paragraph.").unwrap();

        let index = open_index(home.path()).await;
        let summary = index.index_file(&file).await.unwrap();
        assert_eq!(summary, IndexSummary::new(1, 0));
        assert_eq!(index.size().await, 1);

        let meta = index.meta.read_all().unwrap();
        assert_eq!(meta.len(), 1);
        assert_eq!(meta[0].id, 0);
        assert_eq!(meta[0].path, file.to_string_lossy());
        assert_eq!(meta[0].folder, utils::parent_folder_name(&file));
        assert!(meta[0].text.contains("Second paragraph."));
    }

    #[tokio::test]
    async fn test_paged_file_records_pages() {
        let home = TempDir::new().unwrap();
        let docs = TempDir::new().unwrap();
        let deck = docs.path().join("deck.pptx");
        crate::extractor::office::tests::write_pptx(&deck, &["Intro slide", "Results slide"]);

        let index = open_index(home.path()).await;
        assert_eq!(index.index_file(&deck).await.unwrap(), IndexSummary::new(2, 0));

        let meta = index.meta.read_all().unwrap();
        let pages: Vec<Option<u32>> = meta.iter().map(|m| m.page).collect();
        assert_eq!(pages, vec![Some(1), Some(2)]);
        assert_eq!(meta[1].text, "Results slide");
    }

    #[tokio::test]
    async fn test_unsupported_extension_is_ignored() {
        let home = TempDir::new().unwrap();
        let docs = TempDir::new().unwrap();
        let file = docs.path().join("image.png");
        std::fs::write(&file, "not really a png").unwrap();

        let index = open_index(home.path()).await;
        assert_eq!(index.index_file(&file).await.unwrap(), IndexSummary::default());
        assert_eq!(index.size().await, 0);
    }

    #[tokio::test]
    async fn test_reindex_is_idempotent_on_active_count() {
        let home = TempDir::new().unwrap();
        let docs = TempDir::new().unwrap();
        let file = docs.path().join("long.md");
        let body = (0..40)
            .map(|i| format!("Paragraph {i} talks about topic number {i} in some detail."))
            .collect::<Vec<_>>()
            .join("\n\n");
        std::fs::write(&file, body).unwrap();

        let index = open_index(home.path()).await;
        let first = index.index_file(&file).await.unwrap();
        assert!(first.added > 1);
        assert_eq!(first.deleted, 0);

        let second = index.index_file(&file).await.unwrap();
        assert_eq!(second.added, first.added);
        assert_eq!(second.deleted, first.added);
        assert_eq!(index.active_count().await.unwrap(), first.added);
        assert_eq!(index.size().await, first.added * 2);
    }

    #[tokio::test]
    async fn test_stored_vectors_match_entry_text() {
        let home = TempDir::new().unwrap();
        let docs = TempDir::new().unwrap();
        for (name, text) in [
            ("a.txt", "apples and oranges"),
            ("b.txt", "compilers parse tokens"),
            ("c.txt", "the quarterly budget review"),
        ] {
            std::fs::write(docs.path().join(name), text).unwrap();
        }

        let index = open_index(home.path()).await;
        index
            .index_folders(&[docs.path().to_path_buf()], &[], None)
            .await
            .unwrap();

        let embedder = index.embedder();
        let vectors = index.writer.lock().await.clone();
        for entry in index.meta.read_all().unwrap() {
            let expected = embedder.embed_one(&entry.text).await.unwrap();
            let hits = vectors.search(&expected, 1).unwrap();
            assert_eq!(hits[0].0, entry.id);
            assert!((hits[0].1 - 1.0).abs() < 1e-4);
        }
    }

    #[tokio::test]
    async fn test_deleted_file_is_soft_deleted() {
        let home = TempDir::new().unwrap();
        let docs = TempDir::new().unwrap();
        let file = docs.path().join("gone.txt");
        std::fs::write(&file, "short lived").unwrap();

        let index = open_index(home.path()).await;
        index.index_file(&file).await.unwrap();
        std::fs::remove_file(&file).unwrap();

        assert_eq!(index.index_file(&file).await.unwrap(), IndexSummary::new(0, 1));
        assert_eq!(index.active_count().await.unwrap(), 0);
        assert_eq!(index.size().await, 1);
    }

    #[tokio::test]
    async fn test_emptied_file_keeps_deleted_count() {
        let home = TempDir::new().unwrap();
        let docs = TempDir::new().unwrap();
        let file = docs.path().join("draft.txt");
        std::fs::write(&file, "some words").unwrap();

        let index = open_index(home.path()).await;
        index.index_file(&file).await.unwrap();
        std::fs::write(&file, "   \n").unwrap();
        assert_eq!(index.index_file(&file).await.unwrap(), IndexSummary::new(0, 1));
    }

    #[tokio::test]
    async fn test_embedding_failure_is_reported() {
        let home = TempDir::new().unwrap();
        let docs = TempDir::new().unwrap();
        let file = docs.path().join("notes.txt");
        std::fs::write(&file, "text that cannot be embedded").unwrap();

        let index = RagIndex::open(home.path(), Arc::new(FailingEmbedder), ChunkingConfig::default())
            .await
            .unwrap();
        let err = index.index_file(&file).await.unwrap_err();
        assert!(matches!(err, RagError::Embedding(_)));
        assert_eq!(index.size().await, 0);
    }

    #[tokio::test]
    async fn test_ids_continue_across_reopen() {
        let home = TempDir::new().unwrap();
        let docs = TempDir::new().unwrap();
        let a = docs.path().join("a.txt");
        let b = docs.path().join("b.txt");
        std::fs::write(&a, "alpha").unwrap();
        std::fs::write(&b, "beta").unwrap();

        {
            let index = open_index(home.path()).await;
            index.index_file(&a).await.unwrap();
        }
        let index = open_index(home.path()).await;
        assert!(index.recovered_from_corruption().is_none());
        index.index_file(&b).await.unwrap();

        let ids: Vec<u64> = index.meta.read_all().unwrap().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_corrupt_vector_file_recovers_and_sets_metadata_aside() {
        let home = TempDir::new().unwrap();
        let docs = TempDir::new().unwrap();
        let file = docs.path().join("a.txt");
        std::fs::write(&file, "alpha").unwrap();
        {
            let index = open_index(home.path()).await;
            index.index_file(&file).await.unwrap();
        }
        std::fs::write(home.path().join(crate::config::VECTOR_FILE), b"garbage").unwrap();

        let index = open_index(home.path()).await;
        assert!(index.recovered_from_corruption().is_some());
        assert_eq!(index.size().await, 0);
        assert_eq!(index.active_count().await.unwrap(), 0);
        assert!(home.path().join("meta.jsonl.corrupt").exists());

        // fresh ids start at 0 without clashing with the old sidecar
        index.index_file(&file).await.unwrap();
        let meta = index.meta.read_all().unwrap();
        assert_eq!(meta.len(), 1);
        assert_eq!(meta[0].id, 0);
    }

    #[tokio::test]
    async fn test_reset_removes_files() {
        let home = TempDir::new().unwrap();
        let docs = TempDir::new().unwrap();
        let file = docs.path().join("a.txt");
        std::fs::write(&file, "alpha").unwrap();

        let index = open_index(home.path()).await;
        index.index_file(&file).await.unwrap();
        index.reset().await.unwrap();

        assert_eq!(index.size().await, 0);
        assert!(!index.paths().vectors.exists());
        assert!(!index.paths().meta.exists());
    }

    #[tokio::test]
    async fn test_compact_drops_tombstoned_rows() {
        let home = TempDir::new().unwrap();
        let docs = TempDir::new().unwrap();
        let a = docs.path().join("a.txt");
        let b = docs.path().join("b.txt");
        std::fs::write(&a, "alpha version one").unwrap();
        std::fs::write(&b, "beta stays put").unwrap();

        let index = open_index(home.path()).await;
        index.index_file(&a).await.unwrap();
        index.index_file(&b).await.unwrap();
        std::fs::write(&a, "alpha version two").unwrap();
        index.index_file(&a).await.unwrap();
        assert_eq!(index.size().await, 3);

        let stats = index.compact().await.unwrap();
        assert_eq!(stats, CompactionStats { rows_before: 3, rows_after: 2 });
        assert_eq!(stats.reclaimed(), 1);

        let meta = index.meta.read_all().unwrap();
        assert_eq!(meta.iter().map(|m| m.id).collect::<Vec<_>>(), vec![0, 1]);
        assert!(meta.iter().all(|m| !m.deleted));

        // the rebuilt rows still line up with their text
        let embedder = index.embedder();
        let (reloaded, _) = FlatIndex::open(&index.paths().vectors, TEST_DIM).unwrap();
        for entry in &meta {
            let expected = embedder.embed_one(&entry.text).await.unwrap();
            assert_eq!(reloaded.search(&expected, 1).unwrap()[0].0, entry.id);
        }
    }

    #[tokio::test]
    async fn test_index_folders_reports_progress() {
        let home = TempDir::new().unwrap();
        let docs = TempDir::new().unwrap();
        std::fs::write(docs.path().join("one.txt"), "one").unwrap();
        std::fs::write(docs.path().join("two.md"), "two").unwrap();

        let index = open_index(home.path()).await;
        let seen = std::sync::Mutex::new(Vec::new());
        let progress = |n: usize, total: usize, _path: &Path| {
            seen.lock().unwrap().push((n, total));
        };
        let summary = index
            .index_folders(&[docs.path().to_path_buf()], &[], Some(&progress))
            .await
            .unwrap();

        assert_eq!(summary, IndexSummary::new(2, 0));
        assert_eq!(*seen.lock().unwrap(), vec![(1, 2), (2, 2)]);
    }

    #[tokio::test]
    async fn test_repeated_windows_are_stored_once() {
        let home = TempDir::new().unwrap();
        let docs = TempDir::new().unwrap();
        let file = docs.path().join("repeat.txt");
        std::fs::write(
            &file,
            "alpha beta gamma\n\nalpha beta gamma\n\ndelta epsilon\n\nalpha   beta gamma",
        )
        .unwrap();

        let chunking = ChunkingConfig {
            max_chars: 20,
            overlap: 0,
        };
        let index = RagIndex::open(home.path(), Arc::new(HashingEmbedder::new(TEST_DIM)), chunking)
            .await
            .unwrap();
        assert_eq!(index.index_file(&file).await.unwrap(), IndexSummary::new(2, 0));
        assert_eq!(index.size().await, 2);

        let meta = index.meta.read_all().unwrap();
        let texts: Vec<&str> = meta.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["alpha beta gamma", "delta epsilon"]);
        let hashes: HashSet<&str> = meta.iter().map(|m| m.text_hash.as_str()).collect();
        assert_eq!(hashes.len(), meta.len());
    }

    #[tokio::test]
    async fn test_index_folders_skips_failing_files() {
        let home = TempDir::new().unwrap();
        let docs = TempDir::new().unwrap();
        std::fs::write(docs.path().join("a.txt"), "apples and pears").unwrap();
        std::fs::write(docs.path().join("b.txt"), "this one is CURSED").unwrap();
        std::fs::write(docs.path().join("c.txt"), "cherries and plums").unwrap();

        let embedder = MarkerFailingEmbedder {
            marker: "CURSED",
            inner: HashingEmbedder::new(TEST_DIM),
        };
        let index = RagIndex::open(home.path(), Arc::new(embedder), ChunkingConfig::default())
            .await
            .unwrap();
        let summary = index
            .index_folders(&[docs.path().to_path_buf()], &[], None)
            .await
            .unwrap();

        assert_eq!(summary, IndexSummary::new(2, 0));
        assert_eq!(index.size().await, 2);
        let meta = index.meta.read_all().unwrap();
        let names: Vec<String> = meta
            .iter()
            .map(|m| Path::new(&m.path).file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.txt", "c.txt"]);
        assert_eq!(meta[1].id, 1);
    }

    #[tokio::test]
    async fn test_index_folders_with_overlapping_roots() {
        let home = TempDir::new().unwrap();
        let docs = TempDir::new().unwrap();
        std::fs::create_dir(docs.path().join("sub")).unwrap();
        std::fs::write(docs.path().join("sub/a.txt"), "nested note").unwrap();
        std::fs::write(docs.path().join("z.txt"), "top note").unwrap();

        let index = open_index(home.path()).await;
        let roots = vec![docs.path().to_path_buf(), docs.path().join("sub")];
        let summary = index.index_folders(&roots, &[], None).await.unwrap();

        assert_eq!(summary, IndexSummary::new(2, 0));
        assert_eq!(index.size().await, 2);
    }

    /// Index a, b and a again so one row is tombstoned; returns the sidecar text before compaction
    async fn index_with_tombstone(home: &Path, docs: &Path) -> String {
        let a = docs.join("a.txt");
        let b = docs.join("b.txt");
        std::fs::write(&a, "alpha version one").unwrap();
        std::fs::write(&b, "beta stays put").unwrap();
        let index = open_index(home).await;
        index.index_file(&a).await.unwrap();
        index.index_file(&b).await.unwrap();
        std::fs::write(&a, "alpha version two").unwrap();
        index.index_file(&a).await.unwrap();
        std::fs::read_to_string(&index.paths().meta).unwrap()
    }

    #[tokio::test]
    async fn test_open_detects_sidecar_ahead_of_vectors() {
        let home = TempDir::new().unwrap();
        let docs = TempDir::new().unwrap();
        let old_meta = index_with_tombstone(home.path(), docs.path()).await;
        {
            let index = open_index(home.path()).await;
            index.compact().await.unwrap();
        }
        // vector file compacted, sidecar still the pre-compaction one
        std::fs::write(home.path().join(crate::config::META_FILE), old_meta).unwrap();

        let index = open_index(home.path()).await;
        assert!(index.recovered_from_corruption().is_some());
        assert_eq!(index.size().await, 0);
        assert_eq!(index.active_count().await.unwrap(), 0);
        assert!(home.path().join("meta.jsonl.corrupt").exists());

        let (on_disk, outcome) = FlatIndex::open(&index.paths().vectors, TEST_DIM).unwrap();
        assert_eq!(outcome, LoadOutcome::Loaded);
        assert!(on_disk.is_empty());
    }

    #[tokio::test]
    async fn test_open_finishes_compaction_cut_short_before_sidecar_swap() {
        let home = TempDir::new().unwrap();
        let docs = TempDir::new().unwrap();
        let old_meta = index_with_tombstone(home.path(), docs.path()).await;
        {
            let index = open_index(home.path()).await;
            index.compact().await.unwrap();
        }
        let meta_path = home.path().join(crate::config::META_FILE);
        std::fs::rename(&meta_path, home.path().join("meta.jsonl.compacting")).unwrap();
        std::fs::write(&meta_path, old_meta).unwrap();

        let index = open_index(home.path()).await;
        assert!(index.recovered_from_corruption().is_none());
        assert!(!home.path().join("meta.jsonl.compacting").exists());
        assert_eq!(index.size().await, 2);
        let meta = index.meta.read_all().unwrap();
        assert_eq!(meta.iter().map(|m| m.id).collect::<Vec<_>>(), vec![0, 1]);
        assert!(meta.iter().all(|m| !m.deleted));
    }

    #[tokio::test]
    async fn test_open_discards_compaction_cut_short_before_vector_swap() {
        let home = TempDir::new().unwrap();
        let docs = TempDir::new().unwrap();
        index_with_tombstone(home.path(), docs.path()).await;
        {
            let index = open_index(home.path()).await;
            let live: Vec<ChunkMeta> = index
                .meta
                .read_all()
                .unwrap()
                .into_iter()
                .filter(|m| !m.deleted)
                .enumerate()
                .map(|(row, mut m)| {
                    m.id = row as u64;
                    m
                })
                .collect();
            index.meta.staged().rewrite(&live).unwrap();
        }

        let index = open_index(home.path()).await;
        assert!(index.recovered_from_corruption().is_none());
        assert!(!home.path().join("meta.jsonl.compacting").exists());
        assert_eq!(index.size().await, 3);
        assert_eq!(index.meta.read_all().unwrap().len(), 3);
        assert_eq!(index.active_count().await.unwrap(), 2);
    }
}
