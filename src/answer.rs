//! Answer orchestration: the gating state machine per request.
//!
//! Each request walks `Retrieving → Scoring → {Gated | Prompting →
//! Generating} → Done`. The gated branch is terminal and makes no
//! language-model call; it returns a localized fallback that embeds the
//! confidence explanation, with the considered matches attached as sources
//! for transparency. Low or absent confidence is a normal outcome: callers
//! tell it apart from failure by `llm_invoked`, never by an error.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::confidence::ConfidenceLevel;
use crate::conversation::ConversationStore;
use crate::error::{QaError, Result};
use crate::llm::LanguageModel;
use crate::models::SourceRef;
use crate::prompt::{self, Language};
use crate::retrieval::RetrievalOrchestrator;

/// Upper bound on `top_k`; larger values are a validation error.
pub const MAX_TOP_K: usize = 50;

/// One inbound question.
#[derive(Debug, Clone)]
pub struct AskRequest {
    pub query: String,
    pub top_k: Option<usize>,
    pub document_id: Option<String>,
    pub language: Option<String>,
    pub conversation_id: Option<Uuid>,
}

impl AskRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            top_k: None,
            document_id: None,
            language: None,
            conversation_id: None,
        }
    }
}

/// The structured answer returned for every successful request, gated or
/// generated.
#[derive(Debug, Clone)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub confidence: ConfidenceLevel,
    pub confidence_explanation: String,
    pub llm_invoked: bool,
}

pub struct AnswerOrchestrator {
    retrieval: RetrievalOrchestrator,
    llm: Arc<dyn LanguageModel>,
    conversations: Arc<ConversationStore>,
    default_top_k: usize,
    default_language: Language,
}

impl AnswerOrchestrator {
    pub fn new(
        retrieval: RetrievalOrchestrator,
        llm: Arc<dyn LanguageModel>,
        conversations: Arc<ConversationStore>,
        default_top_k: usize,
        default_language: Language,
    ) -> Self {
        Self {
            retrieval,
            llm,
            conversations,
            default_top_k,
            default_language,
        }
    }

    pub fn conversations(&self) -> &Arc<ConversationStore> {
        &self.conversations
    }

    /// Answer one question. `cancel` is checked at stage boundaries so an
    /// abandoned request never proceeds from retrieval to generation.
    pub async fn ask(&self, request: &AskRequest, cancel: &CancellationToken) -> Result<Answer> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(QaError::validation("query must not be empty"));
        }

        let top_k = request.top_k.unwrap_or(self.default_top_k);
        if !(1..=MAX_TOP_K).contains(&top_k) {
            return Err(QaError::validation(format!(
                "top_k must be in [1, {MAX_TOP_K}], got {top_k}"
            )));
        }

        let language = match &request.language {
            Some(code) => Language::parse(code).ok_or_else(|| {
                QaError::validation(format!("unsupported language: {code}"))
            })?,
            None => self.default_language,
        };

        // Retrieving → Scoring
        let (matches, score) = self
            .retrieval
            .retrieve(query, top_k, request.document_id.as_deref())
            .await?;
        if cancel.is_cancelled() {
            return Err(QaError::Cancelled);
        }

        let history = request
            .conversation_id
            .and_then(|id| self.conversations.get(&id))
            .map(|h| h.turns)
            .unwrap_or_default();

        // Gated: terminal, no language-model call.
        if !score.is_acceptable() {
            debug!(level = score.level.as_str(), "request gated, skipping generation");
            let explanation = score.explanation(language).to_string();
            let answer = fallback_message(language, &explanation);
            self.record_turn(request.conversation_id, query, &answer);
            return Ok(Answer {
                answer,
                sources: matches.iter().map(SourceRef::from).collect(),
                confidence: score.level,
                confidence_explanation: explanation,
                llm_invoked: false,
            });
        }

        // Prompting
        let composed = prompt::compose(query, &matches, language, &score, &history)?;
        if cancel.is_cancelled() {
            return Err(QaError::Cancelled);
        }

        // Generating
        let raw = self
            .llm
            .generate(&composed.system_prompt, &composed.user_prompt)
            .await
            .map_err(|e| QaError::GenerationUnavailable(e.to_string()))?;
        let answer = raw.trim().to_string();
        if answer.is_empty() {
            return Err(QaError::GenerationUnavailable(
                "language model returned blank text".to_string(),
            ));
        }

        info!(
            sources = composed.sources.len(),
            level = score.level.as_str(),
            "answer generated"
        );
        self.record_turn(request.conversation_id, query, &answer);

        Ok(Answer {
            answer,
            sources: composed.sources,
            confidence: score.level,
            confidence_explanation: score.explanation(language).to_string(),
            llm_invoked: true,
        })
    }

    /// A gated refusal is recorded like any other turn: the user may refer
    /// back to it in a follow-up question.
    fn record_turn(&self, conversation_id: Option<Uuid>, question: &str, answer: &str) {
        if let Some(id) = conversation_id {
            self.conversations.add_turn(&id, question, answer);
        }
    }
}

fn fallback_message(language: Language, explanation: &str) -> String {
    match language {
        Language::English => format!(
            "I can't answer this question from the available documents. {explanation} \
Try rephrasing the question or asking about a different topic."
        ),
        Language::Turkish => format!(
            "Bu soruyu mevcut belgelere dayanarak yanıtlayamıyorum. {explanation} \
Soruyu farklı kelimelerle sormayı ya da başka bir konu sormayı deneyebilirsin."
        ),
    }
}
