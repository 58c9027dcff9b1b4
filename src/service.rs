use crate::config::{Config, QueryConfig};
use crate::embeddings::EmbeddingProvider;
use crate::error::Result;
use crate::indexer::{Indexer, ProgressFn, RagIndex};
use crate::llm::AnswerModel;
use crate::models::{CompactionStats, Hit, IndexStatus, IndexSummary};
use crate::query::{build_prompt, QueryEngine, SearchFilter, SearchOutcome};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{info, warn};

/// Canned reply when the snippets cannot support an answer
pub const NOT_ENOUGH_INFO: &str = "Not enough info from the provided files.";

/// Minimum number of hits fetched to answer a question
const MIN_ANSWER_K: usize = 20;

#[derive(Debug, Clone, Serialize)]
pub struct RagAnswer {
    pub answer: String,
    pub hits: Vec<Hit>,
    pub low_confidence: bool,
}

/// True when the best score is under `min_score` or there are fewer than `min_hits` hits
pub fn is_low_confidence(hits: &[Hit], min_score: f32, min_hits: usize) -> bool {
    let best = hits.iter().map(|h| h.score).fold(f32::NEG_INFINITY, f32::max);
    hits.is_empty() || best < min_score || hits.len() < min_hits
}

/// Owns the index, the query engine and the status snapshot callers poll
pub struct RagService {
    index: Arc<RagIndex>,
    query: QueryEngine,
    settings: QueryConfig,
    status: RwLock<IndexStatus>,
}

impl RagService {
    pub async fn new(index: Arc<RagIndex>, settings: QueryConfig) -> Result<Self> {
        let query = QueryEngine::new(&index.paths().home, index.embedder());
        let mut status = IndexStatus {
            chunks: index.size().await,
            active_chunks: index.active_count().await?,
            ..IndexStatus::default()
        };
        if let Some(reason) = index.recovered_from_corruption() {
            status.warnings.push(reason.to_string());
        }

        Ok(Self {
            index,
            query,
            settings,
            status: RwLock::new(status),
        })
    }

    /// Open the index under the configured storage home
    pub async fn open(config: &Config, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let index = RagIndex::open(config.storage_home(), embedder, config.chunking.clone()).await?;
        Self::new(Arc::new(index), config.query.clone()).await
    }

    pub fn index(&self) -> &Arc<RagIndex> {
        &self.index
    }

    pub fn status(&self) -> IndexStatus {
        self.status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_watching(&self, watching: bool) {
        self.update_status(|status| status.watching = watching);
    }

    fn update_status(&self, apply: impl FnOnce(&mut IndexStatus)) {
        let mut status = self.status.write().unwrap_or_else(PoisonError::into_inner);
        apply(&mut status);
    }

    async fn refresh_counts(&self, last_update: IndexSummary) -> Result<()> {
        let chunks = self.index.size().await;
        let active = self.index.active_count().await?;
        self.update_status(|status| {
            status.chunks = chunks;
            status.active_chunks = active;
            status.last_update = Some(last_update);
        });
        Ok(())
    }

    /// Build or refresh the index over `folders`.
    ///
    /// With `replace`, both persisted files are deleted first so the index holds
    /// exactly these folders afterwards.
    pub async fn ensure_index_started(
        &self,
        folders: &[PathBuf],
        excludes: &[String],
        replace: bool,
        progress: Option<&ProgressFn<'_>>,
    ) -> Result<IndexSummary> {
        if replace {
            self.index.reset().await?;
        }
        let summary = self.index.index_folders(folders, excludes, progress).await?;

        let folder_names = folders.iter().map(|f| f.display().to_string()).collect();
        self.update_status(|status| status.folders = folder_names);
        self.refresh_counts(summary).await?;
        Ok(summary)
    }

    pub async fn compact(&self) -> Result<CompactionStats> {
        let stats = self.index.compact().await?;
        let chunks = self.index.size().await;
        self.update_status(|status| status.chunks = chunks);
        Ok(stats)
    }

    pub async fn search(&self, query: &str, k: usize, filter: &SearchFilter) -> SearchOutcome {
        self.query.search_detailed(query, k, filter).await
    }

    pub fn is_low_confidence(&self, hits: &[Hit]) -> bool {
        is_low_confidence(
            hits,
            self.settings.low_confidence_score,
            self.settings.low_confidence_min_hits,
        )
    }

    /// Answer `query` from the best `n_ctx` snippets.
    ///
    /// The model is not called when nothing matched. A failing model degrades
    /// to the canned answer; the hits are still returned.
    pub async fn rag_answer(&self, query: &str, n_ctx: usize, model: &dyn AnswerModel) -> RagAnswer {
        let k = self.settings.k.max(MIN_ANSWER_K).max(n_ctx.saturating_mul(2));
        let hits = self
            .query
            .search(query, k, &SearchFilter::default())
            .await;
        if hits.is_empty() {
            return RagAnswer {
                answer: NOT_ENOUGH_INFO.to_string(),
                hits,
                low_confidence: true,
            };
        }

        let low_confidence = self.is_low_confidence(&hits);
        let (system, user) = build_prompt(query, &hits, n_ctx);
        let answer = match model.complete(&system, &user).await {
            Ok(answer) => answer.trim().to_string(),
            Err(e) => {
                warn!("Answer model failed: {:#}", e);
                NOT_ENOUGH_INFO.to_string()
            }
        };

        let mut hits = hits;
        hits.truncate(n_ctx);
        RagAnswer {
            answer,
            hits,
            low_confidence,
        }
    }
}

#[async_trait::async_trait]
impl Indexer for RagService {
    async fn index_file(&self, path: &Path) -> Result<IndexSummary> {
        let summary = self.index.index_file(path).await?;
        if summary != IndexSummary::default() {
            info!(
                "Updated {}: {} added, {} removed",
                path.display(),
                summary.added,
                summary.deleted
            );
            self.refresh_counts(summary).await?;
        }
        Ok(summary)
    }
}
