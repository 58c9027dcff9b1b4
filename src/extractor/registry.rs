use crate::extractor::html::HtmlExtractor;
use crate::extractor::office::{DocxExtractor, PptxExtractor};
use crate::extractor::pdf::PdfExtractor;
use crate::extractor::r#trait::{ExtractedText, TextExtractor};
use crate::extractor::text::PlainTextExtractor;
use crate::utils;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Registry for managing file type extractors
pub struct ExtractorRegistry {
    extractors: Vec<Arc<dyn TextExtractor>>,
    fallback: Arc<dyn TextExtractor>,
}

impl ExtractorRegistry {
    /// Create a new registry with default extractors
    pub fn new() -> Self {
        let mut registry = Self {
            extractors: Vec::new(),
            fallback: Arc::new(PlainTextExtractor::new()),
        };

        registry.register(Arc::new(PdfExtractor::new()));
        registry.register(Arc::new(DocxExtractor::new()));
        registry.register(Arc::new(PptxExtractor::new()));
        registry.register(Arc::new(PlainTextExtractor::new()));
        registry.register(Arc::new(HtmlExtractor::new()));

        registry
    }

    /// Register a new extractor; later registrations do not shadow earlier ones
    pub fn register(&mut self, extractor: Arc<dyn TextExtractor>) {
        self.extractors.push(extractor);
    }

    /// Find an extractor for the extension, falling back to plain text
    pub fn get_extractor(&self, ext: &str) -> Arc<dyn TextExtractor> {
        for extractor in &self.extractors {
            if extractor.supports_extension(ext) {
                return extractor.clone();
            }
        }
        self.fallback.clone()
    }

    /// Extract text from a file. Never fails: any I/O or parser error is
    /// logged and yields empty text.
    pub async fn load_text(&self, path: &Path) -> ExtractedText {
        let ext = utils::get_extension(path).unwrap_or_default();
        let extractor = self.get_extractor(&ext);
        match extractor.extract(path).await {
            Ok(extracted) => extracted,
            Err(e) => {
                warn!("Failed to extract text from {}: {}", path.display(), e);
                ExtractedText::empty()
            }
        }
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
