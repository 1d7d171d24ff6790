//! Persistence and vector-search collaborator ports, with the SQLite
//! adapter used in production.
//!
//! [`DocumentStore::save`] is transactional: the document row, its chunks,
//! and their vectors commit together or not at all, so an ingestion that
//! fails at chunk *k* leaves nothing behind. [`VectorSearch::search`] is a
//! linear cosine scan over the stored vectors computed in Rust; ranking is
//! treated as an external similarity-search capability, and this adapter is
//! the simplest faithful one.

use anyhow::{bail, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::embedding::{blob_to_vec, unit_similarity, vec_to_blob};
use crate::models::{
    sort_matches, DocumentChunk, SearchMatch, SectionType, StoredDocument,
};

/// Port for durable document + chunk + vector persistence.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Persist a document with its embedded chunks in one transaction.
    /// Every chunk must already carry its embedding.
    async fn save(&self, document: &StoredDocument, chunks: &[DocumentChunk]) -> Result<String>;
}

/// Port for the external vector similarity search.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    /// Return the `top_k` most similar chunks, similarity-descending with
    /// ties broken by chunk index. `document_id` narrows the scan to one
    /// document.
    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        document_id: Option<&str>,
    ) -> Result<Vec<SearchMatch>>;
}

/// SQLite adapter implementing both ports.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn save(&self, document: &StoredDocument, chunks: &[DocumentChunk]) -> Result<String> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO documents (id, title, content_type, created_at, char_count, page_count)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&document.id)
        .bind(&document.title)
        .bind(&document.content_type)
        .bind(document.created_at)
        .bind(document.char_count as i64)
        .bind(document.page_count as i64)
        .execute(&mut *tx)
        .await?;

        for chunk in chunks {
            let Some(embedding) = chunk.embedding() else {
                bail!("chunk {} has no embedding attached", chunk.index);
            };

            let chunk_id = Uuid::new_v4().to_string();
            let mut hasher = Sha256::new();
            hasher.update(chunk.content.as_bytes());
            let hash = format!("{:x}", hasher.finalize());

            sqlx::query(
                r#"
                INSERT INTO chunks (id, document_id, chunk_index, content, section_type, article_number, article_title, hash)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk_id)
            .bind(&document.id)
            .bind(chunk.index as i64)
            .bind(&chunk.content)
            .bind(chunk.section_type.as_str())
            .bind(&chunk.article_number)
            .bind(&chunk.article_title)
            .bind(&hash)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "INSERT INTO chunk_vectors (chunk_id, document_id, embedding) VALUES (?, ?, ?)",
            )
            .bind(&chunk_id)
            .bind(&document.id)
            .bind(vec_to_blob(embedding))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(document.id.clone())
    }
}

#[async_trait]
impl VectorSearch for SqliteStore {
    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        document_id: Option<&str>,
    ) -> Result<Vec<SearchMatch>> {
        let base_query = r#"
            SELECT cv.chunk_id, cv.embedding,
                   c.document_id, c.chunk_index, c.content, c.section_type,
                   c.article_number, c.article_title,
                   d.title AS document_title
            FROM chunk_vectors cv
            JOIN chunks c ON c.id = cv.chunk_id
            JOIN documents d ON d.id = c.document_id
        "#;

        let rows = match document_id {
            Some(doc) => {
                sqlx::query(&format!("{base_query} WHERE c.document_id = ?"))
                    .bind(doc)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => sqlx::query(base_query).fetch_all(&self.pool).await?,
        };

        let mut matches: Vec<SearchMatch> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let stored = blob_to_vec(&blob);
                let similarity = unit_similarity(vector, &stored);

                let index: i64 = row.get("chunk_index");
                let section_type = SectionType::parse(row.get::<String, _>("section_type").as_str())
                    .unwrap_or(SectionType::Generic);
                let mut chunk = DocumentChunk::new(
                    index.max(0) as usize,
                    row.get("content"),
                    section_type,
                );
                chunk.article_number = row.get("article_number");
                chunk.article_title = row.get("article_title");

                SearchMatch {
                    chunk_id: row.get("chunk_id"),
                    chunk,
                    document_id: row.get("document_id"),
                    document_title: row.get("document_title"),
                    similarity_score: similarity,
                }
            })
            .collect();

        sort_matches(&mut matches);
        matches.truncate(top_k);
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::run_migrations;

    async fn memory_store() -> SqliteStore {
        // A single connection keeps every query on the same in-memory
        // database.
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteStore::new(pool)
    }

    fn embedded_chunk(index: usize, content: &str, vector: Vec<f32>) -> DocumentChunk {
        let mut chunk = DocumentChunk::new(index, content.to_string(), SectionType::Paragraph);
        chunk.attach_embedding(vector).unwrap();
        chunk
    }

    fn document(id: &str, title: &str) -> StoredDocument {
        StoredDocument {
            id: id.to_string(),
            title: title.to_string(),
            content_type: "text/plain".to_string(),
            created_at: 1_700_000_000,
            char_count: 100,
            page_count: 1,
        }
    }

    #[tokio::test]
    async fn save_and_search_round_trip() {
        let store = memory_store().await;
        let chunks = vec![
            embedded_chunk(0, "Fees are due monthly.", vec![1.0, 0.0, 0.0]),
            embedded_chunk(1, "Termination requires notice.", vec![0.0, 1.0, 0.0]),
        ];
        store.save(&document("d1", "Agreement"), &chunks).await.unwrap();

        let matches = store.search(&[1.0, 0.0, 0.0], 5, None).await.unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].chunk.content, "Fees are due monthly.");
        assert!(matches[0].similarity_score > matches[1].similarity_score);
        assert_eq!(matches[0].document_title, "Agreement");
    }

    #[tokio::test]
    async fn search_respects_top_k_and_ordering() {
        let store = memory_store().await;
        let chunks: Vec<DocumentChunk> = (0..6)
            .map(|i| {
                // Progressively less aligned with the query vector.
                let v = vec![1.0, i as f32 * 0.5, 0.0];
                embedded_chunk(i, &format!("passage {i}"), v)
            })
            .collect();
        store.save(&document("d1", "Doc"), &chunks).await.unwrap();

        let matches = store.search(&[1.0, 0.0, 0.0], 3, None).await.unwrap();
        assert_eq!(matches.len(), 3);
        let order: Vec<usize> = matches.iter().map(|m| m.chunk.index).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn search_filters_by_document() {
        let store = memory_store().await;
        store
            .save(
                &document("d1", "First"),
                &[embedded_chunk(0, "alpha passage", vec![1.0, 0.0])],
            )
            .await
            .unwrap();
        store
            .save(
                &document("d2", "Second"),
                &[embedded_chunk(0, "beta passage", vec![1.0, 0.0])],
            )
            .await
            .unwrap();

        let matches = store.search(&[1.0, 0.0], 10, Some("d2")).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].document_id, "d2");
    }

    #[tokio::test]
    async fn save_rejects_chunks_without_embeddings() {
        let store = memory_store().await;
        let bare = DocumentChunk::new(0, "no vector".to_string(), SectionType::Generic);
        let err = store
            .save(&document("d1", "Doc"), &[bare])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no embedding"));

        // The failed save left nothing behind.
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn failed_save_rolls_back_earlier_chunks() {
        let store = memory_store().await;
        let chunks = vec![
            embedded_chunk(0, "good chunk", vec![1.0, 0.0]),
            DocumentChunk::new(1, "bad chunk".to_string(), SectionType::Generic),
        ];
        assert!(store.save(&document("d1", "Doc"), &chunks).await.is_err());

        let chunk_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(chunk_count, 0);
    }

    #[tokio::test]
    async fn article_metadata_survives_the_round_trip() {
        let store = memory_store().await;
        let mut chunk = DocumentChunk::article(
            0,
            "ARTICLE 2 body".to_string(),
            "2".to_string(),
            Some("Definitions".to_string()),
        );
        chunk.attach_embedding(vec![1.0]).unwrap();
        store.save(&document("d1", "Doc"), &[chunk]).await.unwrap();

        let matches = store.search(&[1.0], 1, None).await.unwrap();
        assert_eq!(matches[0].chunk.section_type, SectionType::Article);
        assert_eq!(matches[0].chunk.article_number.as_deref(), Some("2"));
        assert_eq!(matches[0].chunk.article_title.as_deref(), Some("Definitions"));
    }
}
