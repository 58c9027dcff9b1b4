pub mod metadata;
pub mod vectors;

pub use metadata::MetaStore;
pub use vectors::{FlatIndex, LoadOutcome};

use crate::config::{META_FILE, VECTOR_FILE};
use std::path::{Path, PathBuf};

/// Locations of the two persisted files under a storage home
#[derive(Debug, Clone)]
pub struct StorePaths {
    pub home: PathBuf,
    pub vectors: PathBuf,
    pub meta: PathBuf,
}

impl StorePaths {
    pub fn new(home: impl AsRef<Path>) -> Self {
        let home = home.as_ref().to_path_buf();
        Self {
            vectors: home.join(VECTOR_FILE),
            meta: home.join(META_FILE),
            home,
        }
    }
}
