//! Text extraction for uploaded documents.
//!
//! Thin adapter over third-party extraction: callers supply bytes plus a
//! content type; this module returns plain UTF-8 text with page and
//! character counts. Unsupported content types are a request error; a file
//! that fails to parse aborts the ingestion.

use std::io::Read;

use crate::error::{QaError, Result};

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_TEXT: &str = "text/plain";
pub const MIME_MARKDOWN: &str = "text/markdown";

/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb guard).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Extraction result consumed by the ingest pipeline.
#[derive(Debug, Clone)]
pub struct Extracted {
    pub text: String,
    pub page_count: usize,
    pub char_count: usize,
}

/// Extract plain text from document bytes.
pub fn extract(bytes: &[u8], content_type: &str) -> Result<Extracted> {
    // Strip parameters such as "; charset=utf-8".
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim();

    match mime {
        MIME_PDF => extract_pdf(bytes),
        MIME_DOCX => extract_docx(bytes),
        MIME_TEXT | MIME_MARKDOWN => extract_plain(bytes),
        other => Err(QaError::validation(format!(
            "unsupported content type: {other}"
        ))),
    }
}

/// Map a filename to a supported content type, for upload parts that carry
/// no usable MIME type of their own.
pub fn content_type_for_filename(name: &str) -> Option<&'static str> {
    let ext = name.rsplit('.').next()?.to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => Some(MIME_PDF),
        "docx" => Some(MIME_DOCX),
        "txt" => Some(MIME_TEXT),
        "md" | "markdown" => Some(MIME_MARKDOWN),
        _ => None,
    }
}

fn extract_plain(bytes: &[u8]) -> Result<Extracted> {
    let text = String::from_utf8(bytes.to_vec())
        .map_err(|_| QaError::ingestion("text file is not valid UTF-8"))?;
    Ok(finish(text, 1))
}

fn extract_pdf(bytes: &[u8]) -> Result<Extracted> {
    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| QaError::ingestion(format!("PDF extraction failed: {e}")))?;
    // pdf-extract separates pages with form feeds.
    let page_count = text.matches('\u{c}').count().max(1);
    Ok(finish(text.replace('\u{c}', "\n\n"), page_count))
}

fn extract_docx(bytes: &[u8]) -> Result<Extracted> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| QaError::ingestion(format!("DOCX is not a readable archive: {e}")))?;

    let mut doc_xml = Vec::new();
    {
        let entry = archive
            .by_name("word/document.xml")
            .map_err(|_| QaError::ingestion("DOCX is missing word/document.xml"))?;
        entry
            .take(MAX_XML_ENTRY_BYTES)
            .read_to_end(&mut doc_xml)
            .map_err(|e| QaError::ingestion(format!("DOCX read failed: {e}")))?;
        if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
            return Err(QaError::ingestion("word/document.xml exceeds size limit"));
        }
    }

    let text = docx_text(&doc_xml)?;
    Ok(finish(text, 1))
}

/// Walk `w:t` text runs, inserting a line break at each paragraph end so the
/// chunker sees the document's paragraph structure.
fn docx_text(xml: &[u8]) -> Result<String> {
    let mut out = String::new();
    // Text is only captured inside `w:t` runs, so inter-element whitespace
    // never leaks in and run-internal spacing is preserved exactly.
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text_run = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text_run = true;
                }
            }
            Ok(quick_xml::events::Event::Text(t)) if in_text_run => {
                out.push_str(t.unescape().unwrap_or_default().as_ref());
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text_run = false,
                b"p" => {
                    if !out.ends_with("\n\n") && !out.is_empty() {
                        out.push_str("\n\n");
                    }
                }
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => {
                return Err(QaError::ingestion(format!("DOCX XML parse failed: {e}")));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(out.trim().to_string())
}

fn finish(text: String, page_count: usize) -> Extracted {
    let char_count = text.chars().count();
    Extracted {
        text,
        page_count,
        char_count,
    }
}
