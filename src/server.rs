//! HTTP API server.
//!
//! Exposes the question-answering and ingestion pipelines over JSON:
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/ask` | Answer a question against the corpus |
//! | `POST` | `/documents` | Ingest a document (multipart `file` + optional `title`) |
//! | `POST` | `/conversations` | Start a conversation, returns its id |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! Error responses are `{"error": "<message>"}` with 4xx for validation
//! failures and 5xx for collaborator failures. A gated (low/no-confidence)
//! answer is a 200 with `llmInvoked = false`, not an error.

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use uuid::Uuid;

use crate::answer::{Answer, AnswerOrchestrator, AskRequest};
use crate::confidence::ConfidenceLevel;
use crate::error::QaError;
use crate::extract;
use crate::ingest::IngestPipeline;
use crate::models::{IngestReceipt, SourceRef};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    orchestrator: Arc<AnswerOrchestrator>,
    ingest: Arc<IngestPipeline>,
}

/// Start the HTTP server. Runs until the process is terminated.
pub async fn run_server(
    bind_addr: &str,
    orchestrator: Arc<AnswerOrchestrator>,
    ingest: Arc<IngestPipeline>,
) -> anyhow::Result<()> {
    let state = AppState {
        orchestrator,
        ingest,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/ask", post(handle_ask))
        .route("/documents", post(handle_ingest))
        .route("/conversations", post(handle_create_conversation))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    info!("listening on http://{bind_addr}");
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

/// Flat error body: `{"error": "<message>"}`.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

struct AppError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<QaError> for AppError {
    fn from(err: QaError) -> Self {
        let status = match &err {
            QaError::Validation(_) | QaError::OutOfRange { .. } => StatusCode::BAD_REQUEST,
            QaError::RetrievalUnavailable(_) | QaError::GenerationUnavailable(_) => {
                StatusCode::BAD_GATEWAY
            }
            QaError::Ingestion(_) => StatusCode::INTERNAL_SERVER_ERROR,
            // Client went away; 499 is the conventional close-request code.
            QaError::Cancelled => {
                StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /ask ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AskBody {
    query: String,
    #[serde(default)]
    top_k: Option<usize>,
    #[serde(default)]
    document_id: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    conversation_id: Option<Uuid>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AskResponse {
    answer: String,
    sources: Vec<SourceRef>,
    confidence: ConfidenceLevel,
    confidence_explanation: String,
    source_count: usize,
    llm_invoked: bool,
}

impl From<Answer> for AskResponse {
    fn from(answer: Answer) -> Self {
        Self {
            source_count: answer.sources.len(),
            answer: answer.answer,
            sources: answer.sources,
            confidence: answer.confidence,
            confidence_explanation: answer.confidence_explanation,
            llm_invoked: answer.llm_invoked,
        }
    }
}

async fn handle_ask(
    State(state): State<AppState>,
    Json(body): Json<AskBody>,
) -> Result<Json<AskResponse>, AppError> {
    let request = AskRequest {
        query: body.query,
        top_k: body.top_k,
        document_id: body.document_id,
        language: body.language,
        conversation_id: body.conversation_id,
    };

    // Dropping the connection cancels the handler future; the token lets the
    // orchestrator notice at its stage boundaries as well.
    let cancel = CancellationToken::new();
    let answer = state.orchestrator.ask(&request, &cancel).await?;
    Ok(Json(answer.into()))
}

// ============ POST /conversations ============

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConversationResponse {
    conversation_id: Uuid,
}

async fn handle_create_conversation(
    State(state): State<AppState>,
) -> Json<ConversationResponse> {
    Json(ConversationResponse {
        conversation_id: state.orchestrator.conversations().create(),
    })
}

// ============ POST /documents ============

async fn handle_ingest(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<IngestReceipt>, AppError> {
    let mut file: Option<(Vec<u8>, Option<String>, Option<String>)> = None;
    let mut title: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {e}")))?
    {
        match field.name() {
            Some("file") => {
                let file_name = field.file_name().map(|s| s.to_string());
                let declared_type = field.content_type().map(|s| s.to_string());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("failed to read file field: {e}")))?;
                file = Some((bytes.to_vec(), file_name, declared_type));
            }
            Some("title") => {
                title = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| bad_request(format!("failed to read title field: {e}")))?,
                );
            }
            _ => {}
        }
    }

    let (bytes, file_name, declared_type) =
        file.ok_or_else(|| bad_request("multipart field 'file' is required"))?;

    let content_type = resolve_content_type(declared_type.as_deref(), file_name.as_deref())
        .ok_or_else(|| bad_request("could not determine a supported content type for the file"))?;

    let title = title
        .filter(|t| !t.trim().is_empty())
        .or_else(|| file_name.clone())
        .unwrap_or_else(|| "Untitled document".to_string());

    let receipt = state
        .ingest
        .ingest(&bytes, &content_type, &title)
        .await?;
    Ok(Json(receipt))
}

/// Prefer the declared MIME type when it is one we support; otherwise fall
/// back to the filename extension. Generic types like
/// `application/octet-stream` defer to the extension.
fn resolve_content_type(declared: Option<&str>, file_name: Option<&str>) -> Option<String> {
    if let Some(declared) = declared {
        let mime = declared.split(';').next().unwrap_or(declared).trim();
        if matches!(
            mime,
            extract::MIME_PDF | extract::MIME_DOCX | extract::MIME_TEXT | extract::MIME_MARKDOWN
        ) {
            return Some(mime.to_string());
        }
    }
    file_name
        .and_then(extract::content_type_for_filename)
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_supported_type_wins() {
        let ct = resolve_content_type(Some("application/pdf"), Some("file.txt"));
        assert_eq!(ct.as_deref(), Some(extract::MIME_PDF));
    }

    #[test]
    fn generic_declared_type_falls_back_to_extension() {
        let ct = resolve_content_type(Some("application/octet-stream"), Some("notes.md"));
        assert_eq!(ct.as_deref(), Some(extract::MIME_MARKDOWN));
    }

    #[test]
    fn missing_type_and_unknown_extension_is_none() {
        assert_eq!(resolve_content_type(None, Some("blob.bin")), None);
        assert_eq!(resolve_content_type(None, None), None);
    }

    #[test]
    fn charset_parameter_is_stripped() {
        let ct = resolve_content_type(Some("text/plain; charset=utf-8"), None);
        assert_eq!(ct.as_deref(), Some(extract::MIME_TEXT));
    }

    #[test]
    fn qa_errors_map_to_the_documented_status_codes() {
        let cases = [
            (QaError::validation("bad"), StatusCode::BAD_REQUEST),
            (
                QaError::RetrievalUnavailable("down".into()),
                StatusCode::BAD_GATEWAY,
            ),
            (
                QaError::GenerationUnavailable("down".into()),
                StatusCode::BAD_GATEWAY,
            ),
            (
                QaError::ingestion("bad pdf"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            let app_err = AppError::from(err);
            assert_eq!(app_err.status, expected);
        }
        assert_eq!(AppError::from(QaError::Cancelled).status.as_u16(), 499);
    }
}
