//! Ingestion pipeline tests against a real on-disk SQLite database:
//! receipts, transactional rollback, and article metadata round trips.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

use corpus_qa::db;
use corpus_qa::embedding::EmbeddingService;
use corpus_qa::error::QaError;
use corpus_qa::ingest::IngestPipeline;
use corpus_qa::migrate::run_migrations;
use corpus_qa::models::SectionType;
use corpus_qa::store::{SqliteStore, VectorSearch};

/// Counts calls and optionally fails at a given call index.
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
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_at == Some(call) {
            return Err(anyhow!("embedding backend unavailable"));
        }
        // Cheap deterministic vector derived from the text length.
        Ok(vec![1.0, (text.len() % 7) as f32, 0.5])
    }
}

async fn disk_store() -> (TempDir, Arc<SqliteStore>) {
    let dir = TempDir::new().unwrap();
    let pool = db::connect(&dir.path().join("data").join("cqa.sqlite"))
        .await
        .unwrap();
    run_migrations(&pool).await.unwrap();
    (dir, Arc::new(SqliteStore::new(pool)))
}

fn pipeline(store: Arc<SqliteStore>, fail_at: Option<usize>) -> IngestPipeline {
    IngestPipeline::new(Arc::new(CountingEmbedder::new(fail_at)), store, 200, 20)
}

const BODY: &str = "The provider hosts the service and keeps weekly encrypted backups of all customer data.\n\nThe customer may export stored data at any time in a machine readable format without charge.\n\nOn contract end the provider deletes remaining customer data after ninety days of retention.";

#[tokio::test]
async fn ingest_stores_documents_chunks_and_vectors() {
    let (_dir, store) = disk_store().await;
    let receipt = pipeline(store.clone(), None)
        .ingest(BODY.as_bytes(), "text/plain", "Hosting Terms")
        .await
        .unwrap();

    assert_eq!(receipt.title, "Hosting Terms");
    assert!(receipt.chunk_count >= 2);
    assert_eq!(receipt.character_count, BODY.chars().count());

    let documents: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(store.pool())
        .await
        .unwrap();
    let chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
        .fetch_one(store.pool())
        .await
        .unwrap();
    let vectors: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_vectors")
        .fetch_one(store.pool())
        .await
        .unwrap();

    assert_eq!(documents, 1);
    assert_eq!(chunks, receipt.chunk_count as i64);
    assert_eq!(vectors, chunks);
}

#[tokio::test]
async fn embedding_failure_mid_pipeline_rolls_back_everything() {
    let (_dir, store) = disk_store().await;
    // Fail on the second chunk's embedding.
    let err = pipeline(store.clone(), Some(1))
        .ingest(BODY.as_bytes(), "text/plain", "Hosting Terms")
        .await
        .unwrap_err();
    assert!(matches!(err, QaError::Ingestion(_)));

    for table in ["documents", "chunks", "chunk_vectors"] {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 0, "table {table} should be empty after rollback");
    }
}

#[tokio::test]
async fn article_documents_keep_their_metadata_through_storage() {
    let (_dir, store) = disk_store().await;
    let text = "ARTICLE 1 — Scope\nThe agreement covers hosting and support services.\n\nARTICLE 2 — Data\nCustomer data remains the property of the customer at all times.";
    pipeline(store.clone(), None)
        .ingest(text.as_bytes(), "text/plain", "Master Agreement")
        .await
        .unwrap();

    let matches = store.search(&[1.0, 0.0, 0.5], 10, None).await.unwrap();
    assert_eq!(matches.len(), 2);
    for m in &matches {
        assert_eq!(m.chunk.section_type, SectionType::Article);
        assert!(m.chunk.article_number.is_some());
        assert!(m.chunk.article_title.is_some());
    }
}

#[tokio::test]
async fn each_ingest_creates_a_distinct_document() {
    let (_dir, store) = disk_store().await;
    let p = pipeline(store.clone(), None);
    let first = p
        .ingest(BODY.as_bytes(), "text/plain", "Hosting Terms")
        .await
        .unwrap();
    let second = p
        .ingest(BODY.as_bytes(), "text/plain", "Hosting Terms v2")
        .await
        .unwrap();

    assert_ne!(first.document_id, second.document_id);

    let documents: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(documents, 2);
}

#[tokio::test]
async fn markdown_uploads_are_supported() {
    let (_dir, store) = disk_store().await;
    let receipt = pipeline(store.clone(), None)
        .ingest(
            b"# Runbook\n\nRestart the ingest worker before the nightly sync window opens.",
            "text/markdown",
            "Runbook",
        )
        .await
        .unwrap();
    assert!(receipt.chunk_count >= 1);
}
