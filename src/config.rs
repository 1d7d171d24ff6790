use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::answer::MAX_TOP_K;
use crate::prompt::Language;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub confidence: ConfidenceConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub language: LanguageConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,
    #[serde(default = "default_overlap_size")]
    pub overlap_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: default_max_chunk_size(),
            overlap_size: default_overlap_size(),
        }
    }
}

fn default_max_chunk_size() -> usize {
    1000
}
fn default_overlap_size() -> usize {
    100
}

/// Confidence thresholds are calibrated for cosine similarity mapped onto
/// `[0, 1]` (see `embedding::unit_similarity`); retune them if the
/// similarity convention ever changes.
#[derive(Debug, Deserialize, Clone)]
pub struct ConfidenceConfig {
    #[serde(default = "default_min_acceptable")]
    pub min_acceptable: f32,
    #[serde(default = "default_low_confidence")]
    pub low_confidence: f32,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            min_acceptable: default_min_acceptable(),
            low_confidence: default_low_confidence(),
        }
    }
}

fn default_min_acceptable() -> f32 {
    0.25
}
fn default_low_confidence() -> f32 {
    0.40
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_embed_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: default_openai_base_url(),
            timeout_secs: default_embed_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: default_openai_base_url(),
            timeout_secs: default_llm_timeout_secs(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_embed_timeout_secs() -> u64 {
    30
}
fn default_llm_timeout_secs() -> u64 {
    60
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_temperature() -> f32 {
    0.2
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConversationConfig {
    #[serde(default = "default_max_conversations")]
    pub max_conversations: usize,
    #[serde(default = "default_conversation_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_conversations: default_max_conversations(),
            ttl_secs: default_conversation_ttl_secs(),
        }
    }
}

fn default_max_conversations() -> usize {
    1000
}
fn default_conversation_ttl_secs() -> u64 {
    3600
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LanguageConfig {
    #[serde(default = "default_language")]
    pub default: String,
}

impl Default for LanguageConfig {
    fn default() -> Self {
        Self {
            default: default_language(),
        }
    }
}

fn default_language() -> String {
    "en".to_string()
}

impl LanguageConfig {
    pub fn default_language(&self) -> Result<Language> {
        Language::parse(&self.default)
            .with_context(|| format!("language.default '{}' is not supported", self.default))
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    if config.chunking.max_chunk_size == 0 {
        anyhow::bail!("chunking.max_chunk_size must be > 0");
    }
    if config.chunking.overlap_size >= config.chunking.max_chunk_size {
        anyhow::bail!("chunking.overlap_size must be smaller than chunking.max_chunk_size");
    }

    // Validate confidence thresholds
    for (name, value) in [
        ("confidence.min_acceptable", config.confidence.min_acceptable),
        ("confidence.low_confidence", config.confidence.low_confidence),
    ] {
        if !(0.0..=1.0).contains(&value) {
            anyhow::bail!("{} must be in [0.0, 1.0]", name);
        }
    }
    if config.confidence.low_confidence < config.confidence.min_acceptable {
        anyhow::bail!("confidence.low_confidence must not be below confidence.min_acceptable");
    }

    // Validate retrieval
    if !(1..=MAX_TOP_K).contains(&config.retrieval.default_top_k) {
        anyhow::bail!("retrieval.default_top_k must be in [1, {}]", MAX_TOP_K);
    }

    // Validate providers
    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if config.embedding.is_enabled() && config.embedding.model.is_none() {
        anyhow::bail!(
            "embedding.model must be specified when provider is '{}'",
            config.embedding.provider
        );
    }

    match config.llm.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!("Unknown llm provider: '{}'. Must be disabled or openai.", other),
    }
    if config.llm.is_enabled() && config.llm.model.is_none() {
        anyhow::bail!(
            "llm.model must be specified when provider is '{}'",
            config.llm.provider
        );
    }

    // Validate conversation store bounds
    if config.conversation.max_conversations == 0 {
        anyhow::bail!("conversation.max_conversations must be > 0");
    }

    // Validate default language
    config.language.default_language()?;

    Ok(config)
}
