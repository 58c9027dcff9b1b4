//! Paragraph-aware sliding-window chunking.
//!
//! Lengths are measured in characters, not bytes, so slicing never lands inside
//! a multi-byte code point.

/// Default window size used by the indexer
pub const DEFAULT_MAX_CHARS: usize = 1200;
/// Default overlap carried from one window into the next
pub const DEFAULT_OVERLAP: usize = 200;

const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// Split `text` into overlapping windows of at most `max_chars` characters.
///
/// Paragraphs (blank-line separated) are packed greedily. When the next paragraph
/// would overflow, the buffer is emitted and the next buffer starts with the last
/// `overlap` characters of the emitted chunk. A buffer that still overflows is
/// hard-wrapped into slices of `max_chars - overlap` characters.
pub fn iter_sliding_windows(text: &str, max_chars: usize, overlap: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() || max_chars == 0 {
        return Vec::new();
    }
    // a step of zero would never advance the hard wrap
    let overlap = overlap.min(max_chars.saturating_sub(1));
    let step = max_chars - overlap;

    let paragraphs: Vec<&str> = text
        .split(PARAGRAPH_SEPARATOR)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    let mut chunks = Vec::new();
    let mut buf = String::new();

    for paragraph in paragraphs {
        if buf.is_empty() {
            buf = paragraph.to_string();
        } else if char_len(&buf) + PARAGRAPH_SEPARATOR.len() + char_len(paragraph) <= max_chars {
            buf.push_str(PARAGRAPH_SEPARATOR);
            buf.push_str(paragraph);
        } else {
            let tail = if overlap > 0 { tail_chars(&buf, overlap) } else { "" };
            let next = format!("{tail}{PARAGRAPH_SEPARATOR}{paragraph}").trim().to_string();
            chunks.push(std::mem::take(&mut buf));
            buf = next;
        }

        if char_len(&buf) > max_chars {
            chunks.extend(hard_wrap(&buf, step));
            buf.clear();
        }
    }

    if !buf.is_empty() {
        chunks.push(buf);
    }
    chunks
}

/// `iter_sliding_windows` with the indexer defaults
pub fn chunk_text(text: &str) -> Vec<String> {
    iter_sliding_windows(text, DEFAULT_MAX_CHARS, DEFAULT_OVERLAP)
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn tail_chars(s: &str, n: usize) -> &str {
    let len = char_len(s);
    if n >= len {
        return s;
    }
    let start = s.char_indices().nth(len - n).map(|(i, _)| i).unwrap_or(0);
    &s[start..]
}

fn hard_wrap(s: &str, step: usize) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    chars
        .chunks(step)
        .map(|slice| slice.iter().collect::<String>())
        .filter(|piece| !piece.is_empty())
        .collect()
}
