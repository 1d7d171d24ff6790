//! Three-strategy document chunking engine.
//!
//! Splits raw document text into passages suitable for embedding. Strategies
//! are attempted in order and the first applicable one produces the whole
//! output (no mixing):
//!
//! 1. **Article** — legal/numbered headers (`ARTICLE 2 — Title`,
//!    `MADDE 2 – Başlık`) delimit chunks; oversized articles are re-split
//!    with the sliding-window rule and numbered `2.1`, `2.2`, ...
//! 2. **Paragraph** — blank-line paragraphs greedily packed under the size
//!    limit, each new chunk seeded with the previous chunk's tail for
//!    context continuity.
//! 3. **Sliding window** — always succeeds; cut points prefer paragraph
//!    breaks, then sentence ends, then spaces, then a hard cut.
//!
//! All sizes are measured in characters, and every cut lands on a UTF-8
//! character boundary.

use regex::Regex;
use std::sync::OnceLock;

use crate::error::{QaError, Result};
use crate::models::{DocumentChunk, SectionType};

/// Chunks shorter than this floor carry no retrievable signal and are dropped.
const MIN_CHUNK_LEN: usize = 10;

/// Separator between an overlap seed and the paragraph that follows it.
const OVERLAP_SEPARATOR: &str = "\n\n";

/// Header lines: an article keyword (two language variants), a number/letter
/// identifier, an optional punctuation dash, then the title.
fn heading_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?mi)^[ \t]*(?:ARTICLE|MADDE)[ \t]+(\d+[A-Za-z]?)[ \t]*(?:[-–—:.][ \t]*)?(\S[^\r\n]*)?$")
            .expect("heading pattern is valid")
    })
}

fn blank_line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\r?\n[ \t]*\r?\n").expect("blank-line pattern is valid"))
}

/// Split `text` into ordered, 0-indexed chunks.
///
/// Fails with a validation error if `max_chunk_size` is zero or
/// `overlap_size >= max_chunk_size`. Blank input yields an empty list.
pub fn chunk(text: &str, max_chunk_size: usize, overlap_size: usize) -> Result<Vec<DocumentChunk>> {
    if max_chunk_size == 0 {
        return Err(QaError::validation("max_chunk_size must be greater than 0"));
    }
    if overlap_size >= max_chunk_size {
        return Err(QaError::validation(format!(
            "overlap_size ({overlap_size}) must be smaller than max_chunk_size ({max_chunk_size})"
        )));
    }
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let chunks = article_chunks(text, max_chunk_size, overlap_size)
        .or_else(|| paragraph_chunks(text, max_chunk_size, overlap_size))
        .unwrap_or_else(|| window_chunks(text, max_chunk_size, overlap_size));

    Ok(reindex(chunks))
}

fn reindex(mut chunks: Vec<DocumentChunk>) -> Vec<DocumentChunk> {
    for (i, c) in chunks.iter_mut().enumerate() {
        c.index = i;
    }
    chunks
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Last `n` characters of `s`.
fn tail_chars(s: &str, n: usize) -> &str {
    let total = char_len(s);
    if total <= n {
        return s;
    }
    let start = s
        .char_indices()
        .nth(total - n)
        .map(|(b, _)| b)
        .unwrap_or(0);
    &s[start..]
}

// ============ Article strategy ============

fn article_chunks(
    text: &str,
    max_chunk_size: usize,
    overlap_size: usize,
) -> Option<Vec<DocumentChunk>> {
    struct Header {
        start: usize,
        number: String,
        title: Option<String>,
    }

    let headers: Vec<Header> = heading_pattern()
        .captures_iter(text)
        .map(|cap| Header {
            start: cap.get(0).expect("whole match").start(),
            number: cap[1].to_string(),
            title: cap
                .get(2)
                .map(|m| m.as_str().trim().to_string())
                .filter(|t| !t.is_empty()),
        })
        .collect();

    if headers.is_empty() {
        return None;
    }

    let mut chunks = Vec::new();

    // Text before the first header is corpus content too; keep it as a
    // generic chunk rather than losing it.
    let preamble = text[..headers[0].start].trim();
    if char_len(preamble) >= MIN_CHUNK_LEN {
        chunks.push(DocumentChunk::new(
            0,
            preamble.to_string(),
            SectionType::Generic,
        ));
    }

    for (i, header) in headers.iter().enumerate() {
        let end = headers.get(i + 1).map(|h| h.start).unwrap_or(text.len());
        let span = text[header.start..end].trim();
        if char_len(span) < MIN_CHUNK_LEN {
            continue;
        }

        if char_len(span) > 2 * max_chunk_size {
            // Oversized article: fall back to the window rule within the
            // span, carrying the article identity with a sub-index.
            for (sub, piece) in split_window(span, max_chunk_size, overlap_size)
                .into_iter()
                .enumerate()
            {
                chunks.push(DocumentChunk::article(
                    0,
                    piece,
                    format!("{}.{}", header.number, sub + 1),
                    header.title.clone(),
                ));
            }
        } else {
            chunks.push(DocumentChunk::article(
                0,
                span.to_string(),
                header.number.clone(),
                header.title.clone(),
            ));
        }
    }

    Some(chunks)
}

// ============ Paragraph strategy ============

fn paragraph_chunks(
    text: &str,
    max_chunk_size: usize,
    overlap_size: usize,
) -> Option<Vec<DocumentChunk>> {
    let paragraphs: Vec<&str> = blank_line_pattern()
        .split(text)
        .map(str::trim)
        .filter(|p| char_len(p) >= MIN_CHUNK_LEN)
        .collect();

    // Applicable only when the text actually has paragraph structure.
    if paragraphs.len() < 2 {
        return None;
    }
    let total: usize = paragraphs.iter().map(|p| char_len(p)).sum();
    if total / paragraphs.len() > 2 * max_chunk_size {
        return None;
    }

    let mut chunks: Vec<DocumentChunk> = Vec::new();
    let mut buf = String::new();

    for para in paragraphs {
        let would_be = if buf.is_empty() {
            char_len(para)
        } else {
            char_len(&buf) + 2 + char_len(para)
        };

        if !buf.is_empty() && would_be > max_chunk_size {
            // Seed the next chunk with the closing chunk's tail. The seed
            // plus its separator stay within overlap_size characters, so a
            // packed chunk never exceeds max_chunk_size + overlap_size.
            let seed_budget = overlap_size.saturating_sub(OVERLAP_SEPARATOR.len());
            let seed = tail_chars(&buf, seed_budget).to_string();
            chunks.push(DocumentChunk::new(
                0,
                std::mem::take(&mut buf),
                SectionType::Paragraph,
            ));
            if !seed.trim().is_empty() {
                buf.push_str(&seed);
                buf.push_str(OVERLAP_SEPARATOR);
            }
        }

        if !buf.is_empty() && !buf.ends_with(OVERLAP_SEPARATOR) {
            buf.push_str("\n\n");
        }
        buf.push_str(para);
    }

    if !buf.trim().is_empty() {
        chunks.push(DocumentChunk::new(0, buf, SectionType::Paragraph));
    }

    Some(chunks)
}

// ============ Sliding-window strategy ============

fn window_chunks(text: &str, max_chunk_size: usize, overlap_size: usize) -> Vec<DocumentChunk> {
    split_window(text, max_chunk_size, overlap_size)
        .into_iter()
        .map(|piece| DocumentChunk::new(0, piece, SectionType::Generic))
        .collect()
}

/// Advance a cursor through `text` in windows of `max_chunk_size` characters,
/// cutting at the softest boundary available, then stepping the cursor back
/// by `overlap_size` for context continuity.
fn split_window(text: &str, max_chunk_size: usize, overlap_size: usize) -> Vec<String> {
    // Byte offset of every character boundary, including text.len().
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(b, _)| b)
        .chain(std::iter::once(text.len()))
        .collect();
    let n = bounds.len() - 1;

    let mut pieces = Vec::new();
    let mut start = 0usize;

    while start < n {
        let remaining = n - start;
        if remaining <= max_chunk_size {
            let piece = text[bounds[start]..].trim();
            if !piece.is_empty() {
                pieces.push(piece.to_string());
            }
            break;
        }

        let window = &text[bounds[start]..bounds[start + max_chunk_size]];
        let cut = choose_cut(window, max_chunk_size);
        let end = start + cut;

        let piece = text[bounds[start]..bounds[end]].trim();
        if !piece.is_empty() {
            pieces.push(piece.to_string());
        }

        // Cursor must always advance past the previous start; pathological
        // input (overlap swallowing the whole cut) ends the loop instead of
        // spinning.
        let next = end.saturating_sub(overlap_size);
        if next <= start {
            break;
        }
        start = next;
    }

    pieces
}

/// Pick the cut point for a full window, in characters.
///
/// Preference order with graded minimum positions: a paragraph break past a
/// quarter of the window, a sentence end past a third, a plain space past
/// half, else a forced cut at the window boundary. A word is never split
/// while a softer boundary exists.
fn choose_cut(window: &str, window_chars: usize) -> usize {
    if let Some(b) = window.rfind("\n\n") {
        let pos = char_len(&window[..b]);
        if pos > window_chars / 4 {
            return pos;
        }
    }

    let sentence_end = window
        .rfind(". ")
        .into_iter()
        .chain(window.rfind(".\n"))
        .max();
    if let Some(b) = sentence_end {
        // Keep the period with the sentence it closes.
        let pos = char_len(&window[..b]) + 1;
        if pos > window_chars / 3 {
            return pos;
        }
    }

    if let Some(b) = window.rfind(' ') {
        let pos = char_len(&window[..b]);
        if pos > window_chars / 2 {
            return pos;
        }
    }

    window_chars
}
