//! Language-model collaborator port and adapters.
//!
//! [`LanguageModel`] is the only surface the answer orchestrator sees. The
//! shipped adapter targets OpenAI-compatible `/chat/completions` endpoints
//! (OpenAI, Azure, Ollama, vLLM, LM Studio and friends share the shape), so
//! local and hosted models are interchangeable through `llm.base_url`.
//!
//! No retries here either: the orchestrator surfaces a failed or timed-out
//! generation as a typed error instead of masking upstream latency.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::LlmConfig;

/// Port for the external language model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Produce an answer from a system/user prompt pair.
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}

/// Instantiate the configured language-model adapter.
pub fn create_model(config: &LlmConfig) -> Result<Arc<dyn LanguageModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledLanguageModel)),
        "openai" => Ok(Arc::new(OpenAiChat::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

/// A no-op adapter that always errors; used when generation is not
/// configured.
pub struct DisabledLanguageModel;

#[async_trait]
impl LanguageModel for DisabledLanguageModel {
    async fn generate(&self, _system_prompt: &str, _user_prompt: &str) -> Result<String> {
        bail!("LLM provider is disabled; set [llm] provider in config")
    }
}

/// Chat-completions adapter for OpenAI-compatible endpoints.
pub struct OpenAiChat {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .context("llm.model required for the openai provider")?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .context("OPENAI_API_KEY environment variable not set")?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiChat {
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_prompt }
            ],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .context("chat completion request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("chat completion API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response
            .json()
            .await
            .context("chat completion response was not valid JSON")?;

        parse_chat_response(&json)
    }
}

/// Extract `choices[0].message.content` from a chat-completions response.
fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|t| t.as_str())
        .map(|t| t.to_string())
        .context("invalid chat completion response: missing choices[0].message.content")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_chat_response_extracts_content() {
        let json = serde_json::json!({
            "choices": [
                { "message": { "role": "assistant", "content": "The fee is due monthly." } }
            ]
        });
        assert_eq!(
            parse_chat_response(&json).unwrap(),
            "The fee is due monthly."
        );
    }

    #[test]
    fn parse_chat_response_rejects_malformed_payloads() {
        assert!(parse_chat_response(&serde_json::json!({})).is_err());
        assert!(parse_chat_response(&serde_json::json!({ "choices": [] })).is_err());
        assert!(
            parse_chat_response(&serde_json::json!({ "choices": [{ "message": {} }] })).is_err()
        );
    }

    #[tokio::test]
    async fn disabled_model_errors() {
        let model = DisabledLanguageModel;
        assert!(model.generate("system", "user").await.is_err());
    }
}
