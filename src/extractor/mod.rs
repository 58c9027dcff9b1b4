pub mod html;
pub mod office;
pub mod pdf;
pub mod registry;
pub mod text;
pub mod r#trait;

pub use html::HtmlExtractor;
pub use office::{DocxExtractor, PptxExtractor};
pub use pdf::PdfExtractor;
pub use r#trait::{ExtractedText, TextExtractor};
pub use registry::ExtractorRegistry;
pub use text::PlainTextExtractor;
