use crate::error::Result;
use crate::extractor::r#trait::{ExtractedText, TextExtractor};
use crate::extractor::text::decode_text;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// HTML pages, tag-stripped with a regex. Not a real parser.
pub struct HtmlExtractor;

impl HtmlExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HtmlExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn script_style_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)\s*>")
            .expect("valid static regex")
    })
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("valid static regex"))
}

/// Replace every tag with a space; script and style bodies are removed entirely
pub fn strip_tags(html: &str) -> String {
    let without_code = script_style_re().replace_all(html, " ");
    tag_re().replace_all(&without_code, " ").into_owned()
}

#[async_trait::async_trait]
impl TextExtractor for HtmlExtractor {
    async fn extract(&self, path: &Path) -> Result<ExtractedText> {
        let bytes = tokio::fs::read(path).await?;
        let html = decode_text(&bytes);
        Ok(ExtractedText::unpaged(strip_tags(&html)))
    }

    fn supports_extension(&self, ext: &str) -> bool {
        matches!(ext.to_lowercase().as_str(), "html" | "htm")
    }
}
