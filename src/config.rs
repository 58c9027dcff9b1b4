use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name of the persisted flat vector index inside the storage home
pub const VECTOR_FILE: &str = "vectors.idx";
/// File name of the JSON-lines metadata sidecar inside the storage home
pub const META_FILE: &str = "meta.jsonl";

/// Application configuration loaded from rag.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub watcher: WatcherConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the vector file and the metadata sidecar (`~` is expanded)
    #[serde(default = "default_home")]
    pub home: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// One of "ollama", "tei", "fastembed", "hashing"
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_url")]
    pub url: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_embedding_dims")]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default)]
    pub folders: Vec<String>,
    #[serde(default = "default_excludes")]
    pub excludes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default = "default_n_ctx")]
    pub n_ctx: usize,
    #[serde(default = "default_low_confidence_score")]
    pub low_confidence_score: f32,
    #[serde(default = "default_low_confidence_min_hits")]
    pub low_confidence_min_hits: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_home() -> String {
    "~/.luma/rag_db".to_string()
}

fn default_max_chars() -> usize {
    1200
}

fn default_overlap() -> usize {
    200
}

fn default_provider() -> String {
    "ollama".to_string()
}

fn default_embedding_url() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_embedding_model() -> String {
    "all-minilm".to_string()
}

fn default_embedding_dims() -> usize {
    384 // all-MiniLM-L6-v2
}

fn default_batch_size() -> usize {
    64
}

fn default_excludes() -> Vec<String> {
    vec![
        "node_modules".to_string(),
        "__pycache__".to_string(),
        ".git".to_string(),
    ]
}

fn default_k() -> usize {
    20
}

fn default_n_ctx() -> usize {
    12
}

fn default_low_confidence_score() -> f32 {
    0.2
}

fn default_low_confidence_min_hits() -> usize {
    3
}

fn default_debounce_ms() -> u64 {
    1000
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { home: default_home() }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            overlap: default_overlap(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            url: default_embedding_url(),
            model: default_embedding_model(),
            dims: default_embedding_dims(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            folders: Vec::new(),
            excludes: default_excludes(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            n_ctx: default_n_ctx(),
            low_confidence_score: default_low_confidence_score(),
            low_confidence_min_hits: default_low_confidence_min_hits(),
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Load configuration from default location or return defaults
    pub fn load() -> Result<Self> {
        let default_paths = [
            PathBuf::from("config/rag.toml"),
            PathBuf::from(shellexpand::tilde("~/.config/luma/rag.toml").as_ref()),
        ];

        for path in &default_paths {
            if path.exists() {
                return Self::from_file(path);
            }
        }

        Ok(Self::default())
    }

    /// Storage home with `~` and environment variables expanded
    pub fn storage_home(&self) -> PathBuf {
        crate::utils::expand_path(&self.storage.home)
    }

    /// Configured index folders, expanded
    pub fn index_folders(&self) -> Vec<PathBuf> {
        self.index
            .folders
            .iter()
            .map(|f| crate::utils::expand_path(f))
            .collect()
    }
}
