pub mod chunker;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod indexer;
pub mod llm;
pub mod models;
pub mod query;
pub mod service;
pub mod store;
pub mod utils;
pub mod watcher;

pub use embeddings::EmbeddingProvider;
pub use error::{RagError, Result};
pub use indexer::{Indexer, RagIndex};
pub use llm::AnswerModel;
pub use models::{ChunkMeta, Hit, IndexStatus, IndexSummary};
pub use query::{build_prompt, QueryEngine, SearchFilter, SearchOutcome};
pub use service::{RagAnswer, RagService};
pub use watcher::{FolderWatcher, WatchEvent};
