//! Ingestion pipeline: bytes in, stored embedded document out.
//!
//! Coordinates extract → chunk → embed → save. Embedding runs chunk-by-chunk
//! sequentially, and the save is a single transaction at the store, so a
//! failure at chunk *k* leaves chunks `0..k-1` out of the database entirely.

use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::chunking;
use crate::embedding::EmbeddingService;
use crate::error::{QaError, Result};
use crate::extract;
use crate::models::{IngestReceipt, StoredDocument};
use crate::store::DocumentStore;

pub struct IngestPipeline {
    embedder: Arc<dyn EmbeddingService>,
    store: Arc<dyn DocumentStore>,
    max_chunk_size: usize,
    overlap_size: usize,
}

impl IngestPipeline {
    pub fn new(
        embedder: Arc<dyn EmbeddingService>,
        store: Arc<dyn DocumentStore>,
        max_chunk_size: usize,
        overlap_size: usize,
    ) -> Self {
        Self {
            embedder,
            store,
            max_chunk_size,
            overlap_size,
        }
    }

    /// Ingest one document. All-or-nothing: any failure along the pipeline
    /// aborts the whole ingestion with no partial writes.
    pub async fn ingest(
        &self,
        bytes: &[u8],
        content_type: &str,
        title: &str,
    ) -> Result<IngestReceipt> {
        let title = title.trim();
        if title.is_empty() {
            return Err(QaError::validation("title must not be empty"));
        }

        let extracted = extract::extract(bytes, content_type)?;
        if extracted.text.trim().is_empty() {
            return Err(QaError::validation(
                "document contains no extractable text",
            ));
        }

        let mut chunks = chunking::chunk(&extracted.text, self.max_chunk_size, self.overlap_size)?;
        if chunks.is_empty() {
            return Err(QaError::validation(
                "document produced no chunks after filtering",
            ));
        }

        // Sequential per-chunk embedding; the vector attaches exactly once.
        for chunk in &mut chunks {
            let vector = self.embedder.embed(&chunk.content).await.map_err(|e| {
                QaError::ingestion(format!("embedding chunk {} failed: {e}", chunk.index))
            })?;
            chunk.attach_embedding(vector)?;
        }

        let document = StoredDocument {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            content_type: content_type.to_string(),
            created_at: chrono::Utc::now().timestamp(),
            char_count: extracted.char_count,
            page_count: extracted.page_count,
        };

        let document_id = self
            .store
            .save(&document, &chunks)
            .await
            .map_err(|e| QaError::ingestion(format!("storing document failed: {e}")))?;

        info!(
            document_id = %document_id,
            chunks = chunks.len(),
            chars = extracted.char_count,
            pages = extracted.page_count,
            "document ingested"
        );

        Ok(IngestReceipt {
            document_id,
            title: title.to_string(),
            chunk_count: chunks.len(),
            character_count: extracted.char_count,
            page_count: extracted.page_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentChunk;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct CountingEmbedder {
        calls: AtomicUsize,
        fail_at: Option<usize>,
    }

    impl CountingEmbedder {
        fn new(fail_at: Option<usize>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_at,
            }
        }
    }

    #[async_trait]
    impl EmbeddingService for CountingEmbedder {
        async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_at == Some(call) {
                return Err(anyhow!("embedding backend unavailable"));
            }
            Ok(vec![1.0, call as f32])
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        saved: Mutex<Vec<(StoredDocument, usize)>>,
    }

    #[async_trait]
    impl DocumentStore for MemoryStore {
        async fn save(
            &self,
            document: &StoredDocument,
            chunks: &[DocumentChunk],
        ) -> anyhow::Result<String> {
            for chunk in chunks {
                assert!(chunk.embedding().is_some(), "chunk saved without embedding");
            }
            self.saved
                .lock()
                .unwrap()
                .push((document.clone(), chunks.len()));
            Ok(document.id.clone())
        }
    }

    fn two_paragraph_text() -> String {
        format!(
            "{}\n\n{}",
            "The agreement covers hosting and support services for the customer.",
            "Either party may terminate the agreement with thirty days of notice."
        )
    }

    #[tokio::test]
    async fn ingest_produces_a_receipt_with_counts() {
        let store = Arc::new(MemoryStore::default());
        let pipeline = IngestPipeline::new(
            Arc::new(CountingEmbedder::new(None)),
            store.clone(),
            500,
            50,
        );

        let text = two_paragraph_text();
        let receipt = pipeline
            .ingest(text.as_bytes(), "text/plain", "Agreement")
            .await
            .unwrap();

        assert_eq!(receipt.title, "Agreement");
        assert!(receipt.chunk_count >= 1);
        assert_eq!(receipt.character_count, text.chars().count());
        assert_eq!(receipt.page_count, 1);
        assert_eq!(store.saved.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn embedding_failure_aborts_without_saving() {
        let store = Arc::new(MemoryStore::default());
        // Fail on the second chunk: the first chunk's work must not persist.
        let pipeline = IngestPipeline::new(
            Arc::new(CountingEmbedder::new(Some(1))),
            store.clone(),
            70,
            10,
        );

        let err = pipeline
            .ingest(two_paragraph_text().as_bytes(), "text/plain", "Agreement")
            .await
            .unwrap_err();
        assert!(matches!(err, QaError::Ingestion(_)));
        assert!(store.saved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn blank_documents_are_rejected() {
        let pipeline = IngestPipeline::new(
            Arc::new(CountingEmbedder::new(None)),
            Arc::new(MemoryStore::default()),
            500,
            50,
        );
        let err = pipeline
            .ingest(b"   \n\n  ", "text/plain", "Empty")
            .await
            .unwrap_err();
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn blank_title_is_rejected() {
        let pipeline = IngestPipeline::new(
            Arc::new(CountingEmbedder::new(None)),
            Arc::new(MemoryStore::default()),
            500,
            50,
        );
        let err = pipeline
            .ingest(b"Some document body text.", "text/plain", "  ")
            .await
            .unwrap_err();
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn unsupported_content_type_is_rejected_before_embedding() {
        let embedder = Arc::new(CountingEmbedder::new(None));
        let pipeline = IngestPipeline::new(
            embedder.clone(),
            Arc::new(MemoryStore::default()),
            500,
            50,
        );
        let err = pipeline
            .ingest(b"bytes", "application/octet-stream", "Blob")
            .await
            .unwrap_err();
        assert!(err.is_client_error());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn every_chunk_is_embedded_exactly_once() {
        let embedder = Arc::new(CountingEmbedder::new(None));
        let store = Arc::new(MemoryStore::default());
        let pipeline = IngestPipeline::new(embedder.clone(), store.clone(), 70, 10);

        let receipt = pipeline
            .ingest(two_paragraph_text().as_bytes(), "text/plain", "Agreement")
            .await
            .unwrap();

        assert!(receipt.chunk_count > 1);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), receipt.chunk_count);
    }
}
