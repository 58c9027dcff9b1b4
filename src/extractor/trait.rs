use crate::error::Result;
use std::path::Path;

/// Text pulled out of one file.
///
/// `pages` is present for formats with page structure (PDF, slide decks), one
/// entry per page in order, numbered from 1.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedText {
    pub text: String,
    pub pages: Option<Vec<(u32, String)>>,
}

impl ExtractedText {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn unpaged(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            pages: None,
        }
    }

    /// Build from per-page text; the full text joins pages with a blank line
    pub fn paged(pages: Vec<(u32, String)>) -> Self {
        let text = pages
            .iter()
            .map(|(_, t)| t.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        Self {
            text,
            pages: Some(pages),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Trait for text extractors that can extract text content from various file formats
#[async_trait::async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extract text content from a file
    async fn extract(&self, path: &Path) -> Result<ExtractedText>;

    /// Check if this extractor supports the given file extension
    fn supports_extension(&self, ext: &str) -> bool;
}
