pub mod rag;
pub mod r#trait;
pub mod walk;

pub use rag::RagIndex;
pub use r#trait::{Indexer, ProgressFn};
pub use walk::collect_files;
