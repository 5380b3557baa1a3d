//! Chat-completion providers used by the LLM extractor

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::ExtractionError;
use crate::config::LlmConfig;

/// Minimal text-generation interface.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate_text(&self, system: &str, user: &str) -> Result<String, ExtractionError>;
}

/// OpenAI-compatible provider (OpenAI, DashScope compatible mode, OpenRouter)
pub struct OpenAiCompatibleProvider {
    config: LlmConfig,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(config: LlmConfig) -> Result<Self, ExtractionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| ExtractionError::Http(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    async fn make_request(&self, messages: Vec<ChatMessage>) -> Result<String, ExtractionError> {
        let api_key = self.config.api_key.as_ref().ok_or_else(|| {
            ExtractionError::Llm("API key required for chat completion provider".to_string())
        })?;

        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ExtractionError::Http(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Llm(format!(
                "LLM API returned {}: {}",
                status, body
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::Parse(format!("Invalid LLM API response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| ExtractionError::Llm("LLM API returned no choices".to_string()))
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    async fn generate_text(&self, system: &str, user: &str) -> Result<String, ExtractionError> {
        let messages = vec![
            ChatMessage {
                role: "system".to_string(),
                content: system.to_string(),
            },
            ChatMessage {
                role: "user".to_string(),
                content: user.to_string(),
            },
        ];
        self.make_request(messages).await
    }
}

// OpenAI API types
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_requires_api_key() {
        let provider = OpenAiCompatibleProvider::new(LlmConfig::default()).unwrap();
        let err = provider.generate_text("system", "user").await.unwrap_err();
        assert!(matches!(err, ExtractionError::Llm(msg) if msg.contains("API key")));
    }

    #[test]
    fn test_response_parsing() {
        let parsed: ChatResponse = serde_json::from_str(
            r#"{"id": "x", "choices": [{"index": 0, "message": {"role": "assistant", "content": "{\"a\": 1}"}, "finish_reason": "stop"}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.choices[0].message.content, "{\"a\": 1}");
    }
}
