//! Retrieval orchestration: question in, ranked matches + confidence out.
//!
//! One sequential waterfall per request: embed the query, call the vector
//! search, score the result set. Collaborator failures are fatal to the
//! request and surface as [`QaError::RetrievalUnavailable`]; no retries at
//! this layer.

use std::sync::Arc;
use tracing::debug;

use crate::confidence::{ConfidencePolicy, ConfidenceScore};
use crate::embedding::EmbeddingService;
use crate::error::{QaError, Result};
use crate::models::SearchMatch;
use crate::store::VectorSearch;

pub struct RetrievalOrchestrator {
    embedder: Arc<dyn EmbeddingService>,
    search: Arc<dyn VectorSearch>,
    policy: ConfidencePolicy,
}

impl RetrievalOrchestrator {
    pub fn new(
        embedder: Arc<dyn EmbeddingService>,
        search: Arc<dyn VectorSearch>,
        policy: ConfidencePolicy,
    ) -> Self {
        Self {
            embedder,
            search,
            policy,
        }
    }

    pub fn policy(&self) -> &ConfidencePolicy {
        &self.policy
    }

    /// Retrieve the ranked matches for `query` and score them.
    ///
    /// Zero matches is a normal outcome and scores as level `none`; it is
    /// the caller's gating decision, not an error.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        document_id: Option<&str>,
    ) -> Result<(Vec<SearchMatch>, ConfidenceScore)> {
        if query.trim().is_empty() {
            return Err(QaError::validation("query must not be empty"));
        }
        if top_k < 1 {
            return Err(QaError::validation("top_k must be at least 1"));
        }

        let vector = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| QaError::RetrievalUnavailable(format!("query embedding failed: {e}")))?;

        let matches = self
            .search
            .search(&vector, top_k, document_id)
            .await
            .map_err(|e| QaError::RetrievalUnavailable(format!("vector search failed: {e}")))?;

        let score = ConfidenceScore::from_matches(&matches, &self.policy)?;
        debug!(
            matches = matches.len(),
            level = score.level.as_str(),
            max_similarity = score.max_similarity,
            "retrieval complete"
        );

        Ok((matches, score))
    }
}
