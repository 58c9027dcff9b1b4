//! Word and PowerPoint documents: OOXML zip containers parsed with quick-xml.

use crate::error::{RagError, Result};
use crate::extractor::r#trait::{ExtractedText, TextExtractor};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::ZipArchive;

const LINE_BREAKS: &[&[u8]] = &[b"w:br", b"w:cr", b"a:br"];

/// Collect paragraph text from an OOXML part.
///
/// Only character data inside `text_tag` elements counts; each closing
/// `paragraph_tag` ends a paragraph. Run-level tabs and line breaks become
/// `\t` and `\n`.
fn collect_paragraphs(xml: &str, text_tag: &[u8], paragraph_tag: &[u8]) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    // <w:tab/> inside <w:tabs> declares a tab stop, not a tab character
    let mut in_tab_stops = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == text_tag => in_text = true,
            Ok(Event::End(e)) if e.name().as_ref() == text_tag => in_text = false,
            Ok(Event::Start(e)) if e.name().as_ref() == b"w:tabs" => in_tab_stops = true,
            Ok(Event::End(e)) if e.name().as_ref() == b"w:tabs" => in_tab_stops = false,
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if LINE_BREAKS.contains(&e.name().as_ref()) => {
                current.push('\n');
            }
            Ok(Event::Empty(e)) if e.name().as_ref() == b"w:tab" && !in_tab_stops => current.push('\t'),
            Ok(Event::End(e)) if e.name().as_ref() == paragraph_tag => {
                paragraphs.push(std::mem::take(&mut current));
            }
            Ok(Event::Text(e)) if in_text => {
                let text = e
                    .unescape()
                    .map_err(|err| RagError::Extraction(format!("xml text: {err}")))?;
                current.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(RagError::Extraction(format!("xml parse error: {e}"))),
            _ => {}
        }
    }

    if !current.is_empty() {
        paragraphs.push(current);
    }
    Ok(paragraphs)
}

fn open_archive(path: &Path) -> Result<ZipArchive<File>> {
    let file = File::open(path)?;
    ZipArchive::new(file)
        .map_err(|e| RagError::Extraction(format!("Failed to read archive {}: {e}", path.display())))
}

fn read_entry(archive: &mut ZipArchive<File>, name: &str) -> Result<String> {
    let mut entry = archive
        .by_name(name)
        .map_err(|e| RagError::Extraction(format!("missing {name}: {e}")))?;
    let mut xml = String::new();
    entry.read_to_string(&mut xml)?;
    Ok(xml)
}

/// Call `f` on every `tag` element of `xml`, in document order
fn for_each_element(xml: &str, tag: &[u8], mut f: impl FnMut(&BytesStart)) -> Result<()> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.name().as_ref() == tag => f(&e),
            Ok(Event::Eof) => return Ok(()),
            Err(e) => return Err(RagError::Extraction(format!("xml parse error: {e}"))),
            _ => {}
        }
    }
}

fn attribute(element: &BytesStart, key: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == key)
        .and_then(|attr| attr.unescape_value().ok().map(|v| v.into_owned()))
}

/// Slide parts in presentation order, following `p:sldIdLst` through the
/// presentation relationships
fn presentation_order(archive: &mut ZipArchive<File>) -> Result<Vec<String>> {
    let presentation = read_entry(archive, "ppt/presentation.xml")?;
    let rels = read_entry(archive, "ppt/_rels/presentation.xml.rels")?;

    let mut targets = HashMap::new();
    for_each_element(&rels, b"Relationship", |e| {
        if let (Some(id), Some(target)) = (attribute(e, b"Id"), attribute(e, b"Target")) {
            targets.insert(id, target);
        }
    })?;

    let mut order = Vec::new();
    for_each_element(&presentation, b"p:sldId", |e| {
        if let Some(target) = attribute(e, b"r:id").and_then(|id| targets.get(&id)) {
            order.push(match target.strip_prefix('/') {
                Some(absolute) => absolute.to_string(),
                None => format!("ppt/{target}"),
            });
        }
    })?;
    Ok(order)
}

/// Slide number from `ppt/slides/slideN.xml`
fn slide_number(name: &str) -> Option<u32> {
    name.strip_prefix("ppt/slides/slide")?
        .strip_suffix(".xml")?
        .parse()
        .ok()
}

/// .docx: paragraph text joined by newlines, unpaged
pub struct DocxExtractor;

impl DocxExtractor {
    pub fn new() -> Self {
        Self
    }

    fn extract_blocking(path: &Path) -> Result<String> {
        let mut archive = open_archive(path)?;
        let xml = read_entry(&mut archive, "word/document.xml")?;
        Ok(collect_paragraphs(&xml, b"w:t", b"w:p")?.join("\n"))
    }
}

impl Default for DocxExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl TextExtractor for DocxExtractor {
    async fn extract(&self, path: &Path) -> Result<ExtractedText> {
        let path: PathBuf = path.to_path_buf();
        let text = tokio::task::spawn_blocking(move || Self::extract_blocking(&path))
            .await
            .map_err(|e| RagError::Extraction(e.to_string()))??;
        Ok(ExtractedText::unpaged(text))
    }

    fn supports_extension(&self, ext: &str) -> bool {
        matches!(ext.to_lowercase().as_str(), "docx")
    }
}

/// .pptx: one page per slide, in presentation order
///
/// Decks without a usable slide list fall back to slide-number order.
pub struct PptxExtractor;

impl PptxExtractor {
    pub fn new() -> Self {
        Self
    }

    fn extract_blocking(path: &Path) -> Result<Vec<(u32, String)>> {
        let mut archive = open_archive(path)?;

        let slides = match presentation_order(&mut archive) {
            Ok(order) if !order.is_empty() => order,
            result => {
                if let Err(e) = result {
                    debug!("No slide list in {}: {}", path.display(), e);
                }
                let mut numbered: Vec<(u32, String)> = archive
                    .file_names()
                    .filter_map(|name| slide_number(name).map(|n| (n, name.to_string())))
                    .collect();
                numbered.sort_by_key(|(n, _)| *n);
                numbered.into_iter().map(|(_, name)| name).collect()
            }
        };

        let mut pages = Vec::with_capacity(slides.len());
        for (i, name) in slides.iter().enumerate() {
            // a broken slide degrades to an empty page
            let text = read_entry(&mut archive, name)
                .and_then(|xml| collect_paragraphs(&xml, b"a:t", b"a:p"))
                .map(|paragraphs| paragraphs.join("\n"))
                .unwrap_or_default();
            pages.push((i as u32 + 1, text));
        }
        Ok(pages)
    }
}

impl Default for PptxExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl TextExtractor for PptxExtractor {
    async fn extract(&self, path: &Path) -> Result<ExtractedText> {
        let path: PathBuf = path.to_path_buf();
        let pages = tokio::task::spawn_blocking(move || Self::extract_blocking(&path))
            .await
            .map_err(|e| RagError::Extraction(e.to_string()))??;
        Ok(ExtractedText::paged(pages))
    }

    fn supports_extension(&self, ext: &str) -> bool {
        matches!(ext.to_lowercase().as_str(), "pptx")
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    pub(crate) fn write_docx(path: &Path, paragraphs: &[&str]) {
        let body: String = paragraphs
            .iter()
            .map(|p| format!("<w:p><w:r><w:t>{p}</w:t></w:r></w:p>"))
            .collect();
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
        );
        let mut zip = ZipWriter::new(File::create(path).unwrap());
        zip.start_file("word/document.xml", FileOptions::default()).unwrap();
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }

    pub(crate) fn write_pptx(path: &Path, slides: &[&str]) {
        let mut zip = ZipWriter::new(File::create(path).unwrap());
        // written out of order on purpose; slide10 must sort after slide2
        let mut order: Vec<usize> = (0..slides.len()).collect();
        order.reverse();
        for i in order {
            let xml = format!(
                r#"<p:sld xmlns:p="p" xmlns:a="a"><p:txBody><a:p><a:r><a:t>{}</a:t></a:r></a:p></p:txBody></p:sld>"#,
                slides[i]
            );
            zip.start_file(format!("ppt/slides/slide{}.xml", i + 1), FileOptions::default())
                .unwrap();
            zip.write_all(xml.as_bytes()).unwrap();
        }
        zip.start_file("ppt/presentation.xml", FileOptions::default()).unwrap();
        zip.write_all(b"<p:presentation/>").unwrap();
        zip.finish().unwrap();
    }

    #[test]
    fn test_collect_paragraphs_keeps_run_spacing() {
        let xml = r#"<w:body><w:p><w:r><w:t xml:space="preserve">Hello </w:t></w:r><w:r><w:t>world</w:t></w:r></w:p><w:p><w:r><w:t>A &amp; B</w:t></w:r></w:p></w:body>"#;
        let paragraphs = collect_paragraphs(xml, b"w:t", b"w:p").unwrap();
        assert_eq!(paragraphs, vec!["Hello world".to_string(), "A & B".to_string()]);
    }

    /// Deck whose slide list shows `slides` parts in `order` (1-based part numbers)
    fn write_pptx_with_order(path: &Path, slides: &[&str], order: &[usize]) {
        let mut zip = ZipWriter::new(File::create(path).unwrap());
        for (i, text) in slides.iter().enumerate() {
            let xml = format!(
                r#"<p:sld xmlns:p="p" xmlns:a="a"><p:txBody><a:p><a:r><a:t>{text}</a:t></a:r></a:p></p:txBody></p:sld>"#
            );
            zip.start_file(format!("ppt/slides/slide{}.xml", i + 1), FileOptions::default())
                .unwrap();
            zip.write_all(xml.as_bytes()).unwrap();
        }

        let ids: String = order
            .iter()
            .enumerate()
            .map(|(i, n)| format!(r#"<p:sldId id="{}" r:id="rId{n}"/>"#, 256 + i))
            .collect();
        zip.start_file("ppt/presentation.xml", FileOptions::default()).unwrap();
        zip.write_all(format!(r#"<p:presentation xmlns:p="p" xmlns:r="r"><p:sldIdLst>{ids}</p:sldIdLst></p:presentation>"#).as_bytes())
            .unwrap();

        let rels: String = (1..=slides.len())
            .map(|n| format!(r#"<Relationship Id="rId{n}" Type="slide" Target="slides/slide{n}.xml"/>"#))
            .collect();
        zip.start_file("ppt/_rels/presentation.xml.rels", FileOptions::default()).unwrap();
        zip.write_all(format!("<Relationships>{rels}</Relationships>").as_bytes())
            .unwrap();
        zip.finish().unwrap();
    }

    #[test]
    fn test_collect_paragraphs_tabs_and_breaks() {
        let xml = r#"<w:body><w:p><w:pPr><w:tabs><w:tab w:val="left" w:pos="720"/></w:tabs></w:pPr><w:r><w:t>Name</w:t><w:tab/><w:t>Value</w:t><w:br/><w:t>Next line</w:t></w:r></w:p></w:body>"#;
        let paragraphs = collect_paragraphs(xml, b"w:t", b"w:p").unwrap();
        assert_eq!(paragraphs, vec!["Name\tValue\nNext line".to_string()]);

        let slide = r#"<p:txBody><a:p><a:r><a:t>Title</a:t></a:r><a:br><a:rPr/></a:br><a:r><a:t>Subtitle</a:t></a:r></a:p></p:txBody>"#;
        let paragraphs = collect_paragraphs(slide, b"a:t", b"a:p").unwrap();
        assert_eq!(paragraphs, vec!["Title\nSubtitle".to_string()]);
    }

    #[tokio::test]
    async fn test_pptx_follows_presentation_slide_list() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reordered.pptx");
        write_pptx_with_order(&path, &["Made first", "Made second", "Made third"], &[3, 1, 2]);

        let pages = PptxExtractor::new().extract(&path).await.unwrap().pages.unwrap();
        assert_eq!(
            pages,
            vec![
                (1, "Made third".to_string()),
                (2, "Made first".to_string()),
                (3, "Made second".to_string()),
            ]
        );
    }

    #[test]
    fn test_slide_number() {
        assert_eq!(slide_number("ppt/slides/slide12.xml"), Some(12));
        assert_eq!(slide_number("ppt/slides/_rels/slide1.xml.rels"), None);
        assert_eq!(slide_number("ppt/slideLayouts/slideLayout1.xml"), None);
    }

    #[tokio::test]
    async fn test_docx_extraction() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("memo.docx");
        write_docx(&path, &["First paragraph.", "Second paragraph."]);

        let extracted = DocxExtractor::new().extract(&path).await.unwrap();
        assert_eq!(extracted.text, "First paragraph.\nSecond paragraph.");
        assert!(extracted.pages.is_none());
    }

    #[tokio::test]
    async fn test_pptx_extraction_is_paged_in_slide_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("deck.pptx");
        let slides: Vec<String> = (1..=10).map(|i| format!("Slide text {i}")).collect();
        let refs: Vec<&str> = slides.iter().map(|s| s.as_str()).collect();
        write_pptx(&path, &refs);

        let extracted = PptxExtractor::new().extract(&path).await.unwrap();
        let pages = extracted.pages.unwrap();
        assert_eq!(pages.len(), 10);
        assert_eq!(pages[0], (1, "Slide text 1".to_string()));
        assert_eq!(pages[1], (2, "Slide text 2".to_string()));
        assert_eq!(pages[9], (10, "Slide text 10".to_string()));
    }

    #[tokio::test]
    async fn test_docx_not_a_zip_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fake.docx");
        std::fs::write(&path, "plain text").unwrap();
        assert!(DocxExtractor::new().extract(&path).await.is_err());
    }
}
