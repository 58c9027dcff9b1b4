use crate::error::Result;
use crate::extractor::r#trait::{ExtractedText, TextExtractor};
use chardetng::EncodingDetector;
use encoding_rs::Encoding;
use std::path::Path;
use tracing::debug;

/// Plain text and markdown
pub struct PlainTextExtractor;

impl PlainTextExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PlainTextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode raw bytes: BOM-declared encoding first, then UTF-8, then the
/// legacy encoding `chardetng` guesses from the byte statistics.
/// If the guess still leaves malformed sequences the bytes are read as lossy
/// UTF-8 with the undecodable parts dropped.
pub fn decode_text(bytes: &[u8]) -> String {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let (text, _) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        return text.into_owned();
    }

    if let Ok(text) = std::str::from_utf8(bytes) {
        return text.to_string();
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let encoding = detector.guess(None, false);
    let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
    if had_errors {
        debug!("{} guess left malformed bytes, falling back to lossy UTF-8", encoding.name());
        return lossy_utf8(bytes);
    }
    text.into_owned()
}

fn lossy_utf8(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .chars()
        .filter(|c| *c != char::REPLACEMENT_CHARACTER)
        .collect()
}

#[async_trait::async_trait]
impl TextExtractor for PlainTextExtractor {
    async fn extract(&self, path: &Path) -> Result<ExtractedText> {
        let bytes = tokio::fs::read(path).await?;
        Ok(ExtractedText::unpaged(decode_text(&bytes)))
    }

    fn supports_extension(&self, ext: &str) -> bool {
        matches!(ext.to_lowercase().as_str(), "txt" | "md" | "markdown")
    }
}
