use crate::error::{RagError, Result};
use crate::extractor::r#trait::{ExtractedText, TextExtractor};
use std::path::{Path, PathBuf};
use tracing::debug;

/// PDF text extractor: per-page text via lopdf, whole-document pdf-extract fallback
pub struct PdfExtractor;

impl PdfExtractor {
    pub fn new() -> Self {
        Self
    }

    fn extract_pages(path: &Path) -> Result<Vec<(u32, String)>> {
        use lopdf::Document;

        let doc = Document::load(path)
            .map_err(|e| RagError::Extraction(format!("Failed to load PDF {}: {e}", path.display())))?;

        // a page that fails to decode contributes empty text, the rest still count
        let pages: Vec<(u32, String)> = doc
            .get_pages()
            .keys()
            .enumerate()
            .map(|(i, page_num)| {
                let text = doc.extract_text(&[*page_num]).unwrap_or_else(|e| {
                    debug!("page {} of {} unreadable: {}", page_num, path.display(), e);
                    String::new()
                });
                (i as u32 + 1, text)
            })
            .collect();

        if pages.iter().any(|(_, t)| !t.trim().is_empty()) {
            return Ok(pages);
        }

        Ok(Self::extract_with_pdf_extract(path).unwrap_or(pages))
    }

    /// pdf-extract separates pages with form feeds
    fn extract_with_pdf_extract(path: &Path) -> Option<Vec<(u32, String)>> {
        let owned = path.to_path_buf();
        // pdf-extract panics on some malformed inputs
        let text = std::panic::catch_unwind(move || pdf_extract::extract_text(&owned))
            .ok()?
            .ok()?;
        if text.trim().is_empty() {
            return None;
        }
        Some(split_form_feeds(&text))
    }
}

impl Default for PdfExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn split_form_feeds(text: &str) -> Vec<(u32, String)> {
    text.split('\u{000C}')
        .enumerate()
        .map(|(i, page)| (i as u32 + 1, page.to_string()))
        .collect()
}

#[async_trait::async_trait]
impl TextExtractor for PdfExtractor {
    async fn extract(&self, path: &Path) -> Result<ExtractedText> {
        let path: PathBuf = path.to_path_buf();
        let pages = tokio::task::spawn_blocking(move || Self::extract_pages(&path))
            .await
            .map_err(|e| RagError::Extraction(e.to_string()))??;
        Ok(ExtractedText::paged(pages))
    }

    fn supports_extension(&self, ext: &str) -> bool {
        matches!(ext.to_lowercase().as_str(), "pdf")
    }
}
