//! Core data models flowing through the ingestion and answer pipelines.

use serde::Serialize;

/// Which chunking strategy produced a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionType {
    /// Produced by the article-header strategy.
    Article,
    /// Produced by the paragraph-packing strategy.
    Paragraph,
    /// Produced by the sliding-window fallback.
    Generic,
}

impl SectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionType::Article => "article",
            SectionType::Paragraph => "paragraph",
            SectionType::Generic => "generic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "article" => Some(SectionType::Article),
            "paragraph" => Some(SectionType::Paragraph),
            "generic" => Some(SectionType::Generic),
            _ => None,
        }
    }
}

/// A semantically bounded passage of document text, the unit of embedding
/// and retrieval.
///
/// Immutable once created, with one exception: the embedding vector is
/// attached exactly once after generation. A second attachment is rejected.
#[derive(Debug, Clone)]
pub struct DocumentChunk {
    /// Position within the source document (0-indexed, contiguous).
    pub index: usize,
    /// Passage text. Never empty or whitespace-only.
    pub content: String,
    /// Strategy that produced this chunk.
    pub section_type: SectionType,
    /// Article identifier (e.g. `"2"` or `"2.1"` for a split span).
    pub article_number: Option<String>,
    /// Article heading title.
    pub article_title: Option<String>,
    embedding: Option<Vec<f32>>,
}

impl DocumentChunk {
    pub fn new(index: usize, content: String, section_type: SectionType) -> Self {
        Self {
            index,
            content,
            section_type,
            article_number: None,
            article_title: None,
            embedding: None,
        }
    }

    /// Create an article-typed chunk carrying its header metadata.
    pub fn article(index: usize, content: String, number: String, title: Option<String>) -> Self {
        Self {
            index,
            content,
            section_type: SectionType::Article,
            article_number: Some(number),
            article_title: title,
            embedding: None,
        }
    }

    /// Attach the embedding vector. One-time transition: a chunk that already
    /// carries a vector rejects re-attachment.
    pub fn attach_embedding(&mut self, vector: Vec<f32>) -> crate::error::Result<()> {
        if self.embedding.is_some() {
            return Err(crate::error::QaError::validation(format!(
                "chunk {} already has an embedding attached",
                self.index
            )));
        }
        self.embedding = Some(vector);
        Ok(())
    }

    pub fn embedding(&self) -> Option<&[f32]> {
        self.embedding.as_deref()
    }
}

/// A ranked retrieval hit, produced fresh per query and never persisted.
#[derive(Debug, Clone)]
pub struct SearchMatch {
    /// Stored chunk UUID.
    pub chunk_id: String,
    /// The matched passage (read-only view of the stored chunk).
    pub chunk: DocumentChunk,
    pub document_id: String,
    pub document_title: String,
    /// Normalized similarity in `[0, 1]`.
    pub similarity_score: f32,
}

/// Order matches similarity-descending, ties broken by original chunk index
/// ascending. Stable and deterministic for equal inputs.
pub fn sort_matches(matches: &mut [SearchMatch]) {
    matches.sort_by(|a, b| {
        b.similarity_score
            .partial_cmp(&a.similarity_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.chunk.index.cmp(&b.chunk.index))
    });
}

/// Source attribution returned to callers in every terminal state, so a
/// caller can always show what was considered even when no answer was
/// generated. Matches the wire schema field names.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRef {
    pub chunk_id: String,
    pub document_id: String,
    pub document_title: String,
    pub content: String,
    pub similarity_score: f32,
    pub section_type: SectionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub article_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub article_title: Option<String>,
}

impl From<&SearchMatch> for SourceRef {
    fn from(m: &SearchMatch) -> Self {
        Self {
            chunk_id: m.chunk_id.clone(),
            document_id: m.document_id.clone(),
            document_title: m.document_title.clone(),
            content: m.chunk.content.clone(),
            similarity_score: m.similarity_score,
            section_type: m.chunk.section_type,
            article_number: m.chunk.article_number.clone(),
            article_title: m.chunk.article_title.clone(),
        }
    }
}

/// Normalized document row stored in SQLite.
#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub id: String,
    pub title: String,
    pub content_type: String,
    pub created_at: i64,
    pub char_count: usize,
    pub page_count: usize,
}

/// Ingest response: what was stored and how much of it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReceipt {
    pub document_id: String,
    pub title: String,
    pub chunk_count: usize,
    pub character_count: usize,
    pub page_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(index: usize) -> DocumentChunk {
        DocumentChunk::new(index, format!("chunk {index}"), SectionType::Generic)
    }

    fn hit(index: usize, score: f32) -> SearchMatch {
        SearchMatch {
            chunk_id: format!("c{index}"),
            chunk: chunk(index),
            document_id: "d1".into(),
            document_title: "Doc".into(),
            similarity_score: score,
        }
    }

    #[test]
    fn embedding_attaches_exactly_once() {
        let mut c = chunk(0);
        assert!(c.embedding().is_none());
        c.attach_embedding(vec![0.1, 0.2]).unwrap();
        assert_eq!(c.embedding(), Some(&[0.1f32, 0.2][..]));
        assert!(c.attach_embedding(vec![0.3]).is_err());
        // Original vector survives the rejected re-attachment
        assert_eq!(c.embedding(), Some(&[0.1f32, 0.2][..]));
    }

    #[test]
    fn matches_sort_by_similarity_then_index() {
        let mut matches = vec![hit(3, 0.5), hit(1, 0.9), hit(2, 0.5), hit(0, 0.7)];
        sort_matches(&mut matches);
        let order: Vec<usize> = matches.iter().map(|m| m.chunk.index).collect();
        assert_eq!(order, vec![1, 0, 2, 3]);
    }

    #[test]
    fn section_type_round_trips() {
        for st in [
            SectionType::Article,
            SectionType::Paragraph,
            SectionType::Generic,
        ] {
            assert_eq!(SectionType::parse(st.as_str()), Some(st));
        }
        assert_eq!(SectionType::parse("heading"), None);
    }

    #[test]
    fn source_ref_preserves_chunk_content() {
        let m = hit(4, 0.42);
        let src = SourceRef::from(&m);
        assert_eq!(src.content, m.chunk.content);
        assert_eq!(src.chunk_id, "c4");
        assert_eq!(src.section_type, SectionType::Generic);
    }
}
