//! Error taxonomy for the question-answering pipeline.
//!
//! Every core operation returns [`QaError`]. The variants map directly onto
//! the HTTP error contract: [`QaError::Validation`] and [`QaError::OutOfRange`]
//! are client errors (4xx), everything else is a collaborator failure (5xx).
//!
//! Low or absent retrieval confidence is deliberately NOT an error: a gated
//! answer with `llm_invoked = false` is a normal, successful outcome.

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, QaError>;

/// All failure modes of the retrieval-to-answer pipeline.
#[derive(Debug, thiserror::Error)]
pub enum QaError {
    /// Request rejected before any collaborator call (blank query,
    /// top-k outside `[1, 50]`, malformed chunking parameters, ...).
    #[error("invalid request: {0}")]
    Validation(String),

    /// A numeric input fell outside its documented range.
    #[error("{name} out of range: {value} (expected {expected})")]
    OutOfRange {
        name: &'static str,
        value: f64,
        expected: &'static str,
    },

    /// The embedding or vector-search collaborator failed or timed out.
    /// Fatal to the request; never retried.
    #[error("retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    /// The language-model collaborator failed, timed out, or returned
    /// blank text. Fatal to the request; never retried.
    #[error("generation unavailable: {0}")]
    GenerationUnavailable(String),

    /// Extraction, chunking, or embedding failed mid-ingestion. The whole
    /// ingestion aborts; partial writes are rolled back.
    #[error("ingestion failed: {0}")]
    Ingestion(String),

    /// The caller abandoned the request mid-flight. Work stops at the next
    /// stage boundary; retrieval never proceeds to generation.
    #[error("request cancelled")]
    Cancelled,
}

impl QaError {
    /// Convenience constructor for validation failures.
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    /// Convenience constructor for ingestion failures.
    pub fn ingestion<S: Into<String>>(message: S) -> Self {
        Self::Ingestion(message.into())
    }

    /// True for errors the caller can fix by changing the request.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::OutOfRange { .. })
    }
}
