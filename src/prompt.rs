//! Deterministic prompt composition.
//!
//! Assembles the system and user prompt text for the language model from the
//! question, the ranked matches, and the answer language. Composition is a
//! pure function: identical inputs always produce byte-identical prompts,
//! which keeps the pipeline testable and cacheable.
//!
//! Hard invariants:
//! - chunk content is embedded verbatim, never summarized or reordered;
//! - numeric similarity scores appear only in the [`ComposedPrompt::sources`]
//!   metadata, never inside the prompt text.

use crate::confidence::ConfidenceScore;
use crate::conversation::ConversationTurn;
use crate::error::{QaError, Result};
use crate::models::{SearchMatch, SourceRef};

/// Prior turns included when a conversation is attached to the request.
const MAX_HISTORY_TURNS: usize = 5;

/// Answer language. Unrecognized codes are rejected at the request boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    #[default]
    English,
    Turkish,
}

impl Language {
    pub fn parse(code: &str) -> Option<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "en" | "eng" | "english" => Some(Language::English),
            "tr" | "tur" | "turkish" => Some(Language::Turkish),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Turkish => "tr",
        }
    }
}

/// A fully assembled prompt pair plus source metadata.
#[derive(Debug, Clone)]
pub struct ComposedPrompt {
    pub system_prompt: String,
    pub user_prompt: String,
    /// Attribution metadata, ordered like the `[Source N]` entries. Carries
    /// the similarity scores so the prompt text never has to.
    pub sources: Vec<SourceRef>,
    pub original_query: String,
}

// ============ System prompt text ============

const SYSTEM_SOURCES_EN: &str = "You are an assistant answering questions about a private document collection. \
Answer using only the source passages provided in the user message. \
You may connect facts the passages state explicitly, but you must not add information they do not support. \
If the passages answer the question only partially, state clearly which part is unsupported. \
If the passages do not contain the answer, say the documents do not cover it.";

const SYSTEM_NO_SOURCES_EN: &str = "You are an assistant answering questions about a private document collection. \
No relevant passages were found for this question. \
Explain that the collection does not appear to contain material related to the question, \
and suggest rephrasing it or asking about a different topic. Do not answer from general knowledge.";

const CAUTION_EN: &str = "The retrieved passages are only weakly related to the question. \
Use hedged wording such as \"may\" or \"appears to\", and avoid absolute claims.";

const SYSTEM_SOURCES_TR: &str = "Özel bir belge arşiviyle ilgili soruları yanıtlayan bir asistansın. \
Yalnızca kullanıcı mesajında verilen kaynak pasajları kullanarak yanıt ver. \
Pasajların açıkça belirttiği bilgileri birbirine bağlayabilirsin, ancak pasajların desteklemediği bilgi ekleme. \
Pasajlar soruyu yalnızca kısmen yanıtlıyorsa hangi kısmın desteklenmediğini açıkça belirt. \
Yanıt pasajlarda yoksa belgelerin bu konuyu kapsamadığını söyle.";

const SYSTEM_NO_SOURCES_TR: &str = "Özel bir belge arşiviyle ilgili soruları yanıtlayan bir asistansın. \
Bu soru için ilgili pasaj bulunamadı. \
Arşivde soruyla ilgili içerik bulunmadığını açıkla ve soruyu farklı kelimelerle yeniden sormayı \
ya da başka bir konu sormayı öner. Genel bilgine dayanarak yanıt verme.";

const CAUTION_TR: &str = "Bulunan pasajlar soruyla yalnızca zayıf düzeyde ilgili. \
\"Olabilir\", \"görünüyor\" gibi temkinli ifadeler kullan ve kesin iddialardan kaçın.";

// ============ User prompt labels ============

struct Labels {
    history: &'static str,
    question_prefix: &'static str,
    answer_prefix: &'static str,
    question: &'static str,
    sources: &'static str,
    instructions: &'static str,
    no_sources_placeholder: &'static str,
    instructions_with_sources: &'static str,
    instructions_without_sources: &'static str,
    article: &'static str,
}

const LABELS_EN: Labels = Labels {
    history: "Previous conversation:",
    question_prefix: "Q:",
    answer_prefix: "A:",
    question: "Question:",
    sources: "Sources:",
    instructions: "Instructions:",
    no_sources_placeholder: "(no relevant passages were found)",
    instructions_with_sources: "Answer the question using only the sources above. \
Refer to the sources you used by their numbers.",
    instructions_without_sources: "Explain that no relevant material was found \
and suggest how the question could be rephrased.",
    article: "Article",
};

const LABELS_TR: Labels = Labels {
    history: "Önceki konuşma:",
    question_prefix: "S:",
    answer_prefix: "C:",
    question: "Soru:",
    sources: "Kaynaklar:",
    instructions: "Talimatlar:",
    no_sources_placeholder: "(ilgili pasaj bulunamadı)",
    instructions_with_sources: "Soruyu yalnızca yukarıdaki kaynakları kullanarak yanıtla. \
Kullandığın kaynaklara numaralarıyla atıf yap.",
    instructions_without_sources: "İlgili içerik bulunamadığını açıkla ve sorunun \
nasıl yeniden ifade edilebileceğini öner.",
    article: "Madde",
};

fn labels(language: Language) -> &'static Labels {
    match language {
        Language::English => &LABELS_EN,
        Language::Turkish => &LABELS_TR,
    }
}

/// Compose the prompt pair for a request.
///
/// Fails with a validation error on a blank query. Even with zero matches a
/// minimal prompt is produced so the model can explain the gap in the
/// caller's language.
pub fn compose(
    query: &str,
    matches: &[SearchMatch],
    language: Language,
    score: &ConfidenceScore,
    history: &[ConversationTurn],
) -> Result<ComposedPrompt> {
    let query = query.trim();
    if query.is_empty() {
        return Err(QaError::validation("query must not be empty"));
    }

    let system_prompt = system_prompt(language, !matches.is_empty(), score.requires_caution());
    let user_prompt = user_prompt(query, matches, language, history);
    let sources = matches.iter().map(SourceRef::from).collect();

    Ok(ComposedPrompt {
        system_prompt,
        user_prompt,
        sources,
        original_query: query.to_string(),
    })
}

fn system_prompt(language: Language, has_matches: bool, requires_caution: bool) -> String {
    let base = match (language, has_matches) {
        (Language::English, true) => SYSTEM_SOURCES_EN,
        (Language::English, false) => SYSTEM_NO_SOURCES_EN,
        (Language::Turkish, true) => SYSTEM_SOURCES_TR,
        (Language::Turkish, false) => SYSTEM_NO_SOURCES_TR,
    };

    if has_matches && requires_caution {
        let caution = match language {
            Language::English => CAUTION_EN,
            Language::Turkish => CAUTION_TR,
        };
        format!("{base}\n\n{caution}")
    } else {
        base.to_string()
    }
}

fn user_prompt(
    query: &str,
    matches: &[SearchMatch],
    language: Language,
    history: &[ConversationTurn],
) -> String {
    let l = labels(language);
    let mut out = String::new();

    if !history.is_empty() {
        out.push_str(l.history);
        out.push('\n');
        let skip = history.len().saturating_sub(MAX_HISTORY_TURNS);
        for turn in &history[skip..] {
            out.push_str(l.question_prefix);
            out.push(' ');
            out.push_str(&turn.question);
            out.push('\n');
            out.push_str(l.answer_prefix);
            out.push(' ');
            out.push_str(&turn.answer);
            out.push('\n');
        }
        out.push('\n');
    }

    out.push_str(l.question);
    out.push('\n');
    out.push_str(query);
    out.push_str("\n\n");

    out.push_str(l.sources);
    out.push('\n');
    if matches.is_empty() {
        out.push_str(l.no_sources_placeholder);
        out.push('\n');
    } else {
        for (i, m) in matches.iter().enumerate() {
            out.push_str(&source_header(i + 1, m, l));
            out.push('\n');
            // Verbatim chunk content: never summarized, reordered, or merged.
            out.push_str(&m.chunk.content);
            out.push_str("\n\n");
        }
    }

    out.push_str(l.instructions);
    out.push('\n');
    out.push_str(if matches.is_empty() {
        l.instructions_without_sources
    } else {
        l.instructions_with_sources
    });

    out
}

fn source_header(number: usize, m: &SearchMatch, l: &Labels) -> String {
    match (&m.chunk.article_number, &m.chunk.article_title) {
        (Some(article), Some(title)) => format!(
            "[Source {number}] {} ({} {article}: {title})",
            m.document_title, l.article
        ),
        (Some(article), None) => format!(
            "[Source {number}] {} ({} {article})",
            m.document_title, l.article
        ),
        _ => format!("[Source {number}] {}", m.document_title),
    }
}
