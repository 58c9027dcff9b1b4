//! Semantic search over the persisted index, and prompt assembly for answering.
//!
//! Searches read the files on disk, so they can run alongside a writer and see
//! the last committed state.

use crate::embeddings::EmbeddingProvider;
use crate::models::{ChunkMeta, Hit};
use crate::store::{FlatIndex, LoadOutcome, MetaStore, StorePaths};
use crate::utils;
use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Minimum number of vector neighbours fetched before metadata filtering
pub const MIN_OVERFETCH: usize = 50;

pub const SYSTEM_PROMPT: &str = "Answer ONLY from the provided snippets. Cite sources like [1], [2] inline. \
If the answer is not found in the snippets, say: 'Not enough info from the provided files.'";

/// Restrictions applied to metadata before the vector hits are joined
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    /// Exact match on the parent folder name
    pub folder: Option<String>,
    /// Inclusive lower bound on the source modification time
    pub time_from: Option<NaiveDateTime>,
    /// Inclusive upper bound on the source modification time
    pub time_to: Option<NaiveDateTime>,
    /// Keep paths starting with one of these; dropped if nothing would survive
    pub prefilter_paths: Vec<String>,
}

impl SearchFilter {
    pub fn folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = Some(folder.into());
        self
    }

    pub fn between(mut self, from: Option<NaiveDateTime>, to: Option<NaiveDateTime>) -> Self {
        self.time_from = from;
        self.time_to = to;
        self
    }

    pub fn prefilter(mut self, paths: Vec<String>) -> Self {
        self.prefilter_paths = paths;
        self
    }

    fn keeps(&self, meta: &ChunkMeta, use_prefilter: bool) -> bool {
        if meta.deleted {
            return false;
        }
        if let Some(folder) = &self.folder {
            if &meta.folder != folder {
                return false;
            }
        }
        if use_prefilter
            && !self.prefilter_paths.is_empty()
            && !self.prefilter_paths.iter().any(|p| meta.path.starts_with(p.as_str()))
        {
            return false;
        }
        // unparseable timestamps pass the time window
        if let Some(mtime) = utils::parse_iso(&meta.mtime_iso) {
            if self.time_from.is_some_and(|from| mtime < from) {
                return false;
            }
            if self.time_to.is_some_and(|to| mtime > to) {
                return false;
            }
        }
        true
    }

    /// Apply every filter, relaxing only the path prefilter if it empties the set
    pub fn apply(&self, entries: Vec<ChunkMeta>) -> Vec<ChunkMeta> {
        let mut use_prefilter = !self.prefilter_paths.is_empty();
        if use_prefilter && !entries.iter().any(|m| self.keeps(m, true)) {
            debug!("Path prefilter matched nothing, ignoring it");
            use_prefilter = false;
        }
        entries
            .into_iter()
            .filter(|m| self.keeps(m, use_prefilter))
            .collect()
    }
}

/// Result of a search, keeping "nothing indexed" apart from "nothing matched"
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// No vector file, an unreadable one, or one with zero rows
    IndexEmpty,
    /// The query could not be embedded
    ModelUnavailable(String),
    NoMatches,
    Ranked(Vec<Hit>),
}

impl SearchOutcome {
    pub fn into_hits(self) -> Vec<Hit> {
        match self {
            SearchOutcome::Ranked(hits) => hits,
            _ => Vec::new(),
        }
    }
}

pub struct QueryEngine {
    paths: StorePaths,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl QueryEngine {
    pub fn new(home: impl AsRef<Path>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            paths: StorePaths::new(home),
            embedder,
        }
    }

    fn load_vectors(&self) -> Option<FlatIndex> {
        match FlatIndex::open(&self.paths.vectors, self.embedder.dimension()) {
            Ok((index, LoadOutcome::Loaded)) if !index.is_empty() => Some(index),
            Ok(_) => None,
            Err(e) => {
                warn!("Vector index unusable for search: {}", e);
                None
            }
        }
    }

    /// Top `k` live chunks for `query` that pass `filter`, best first
    pub async fn search_detailed(&self, query: &str, k: usize, filter: &SearchFilter) -> SearchOutcome {
        let Some(index) = self.load_vectors() else {
            return SearchOutcome::IndexEmpty;
        };

        let query_vector = match self.embedder.embed_one(query).await {
            Ok(vector) => vector,
            Err(e) => {
                warn!("Cannot embed query: {}", e);
                return SearchOutcome::ModelUnavailable(e.to_string());
            }
        };

        let entries = match MetaStore::new(&self.paths.meta).read_all() {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot read metadata: {}", e);
                return SearchOutcome::IndexEmpty;
            }
        };
        let candidates = filter.apply(entries);
        if candidates.is_empty() {
            return SearchOutcome::NoMatches;
        }
        let by_id: HashMap<u64, ChunkMeta> = candidates.into_iter().map(|m| (m.id, m)).collect();

        let top_n = k.saturating_mul(5).max(MIN_OVERFETCH);
        let neighbours = match index.search(&query_vector, top_n) {
            Ok(neighbours) => neighbours,
            Err(e) => {
                warn!("Vector search failed: {}", e);
                return SearchOutcome::ModelUnavailable(e.to_string());
            }
        };

        // rows are unique per search, so the join cannot duplicate an id
        let mut hits: Vec<Hit> = neighbours
            .into_iter()
            .filter_map(|(row, score)| by_id.get(&row).map(|m| Hit::new(score, m.clone())))
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);

        if hits.is_empty() {
            SearchOutcome::NoMatches
        } else {
            SearchOutcome::Ranked(hits)
        }
    }

    /// Like `search_detailed`, with every non-ranked outcome as no hits
    pub async fn search(&self, query: &str, k: usize, filter: &SearchFilter) -> Vec<Hit> {
        self.search_detailed(query, k, filter).await.into_hits()
    }
}

/// Build the (system, user) messages for answering `query` from the first `n_ctx` hits
pub fn build_prompt(query: &str, hits: &[Hit], n_ctx: usize) -> (String, String) {
    let snippets: Vec<String> = hits
        .iter()
        .take(n_ctx)
        .enumerate()
        .map(|(i, hit)| {
            let text = hit.meta.text.trim().replace("\n\n", "\n");
            format!("[{}] {}\n{}", i + 1, hit.citation_tag(), text)
        })
        .collect();

    let user = format!("Question: {}\n\n{}", query, snippets.join("\n---\n"));
    (SYSTEM_PROMPT.to_string(), user)
}
