use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use super::LLMProvider;
use crate::config::ModelConfig;
use crate::error::{EvidenceError, Result};
use crate::types::ChatMessage;

/// Any endpoint speaking the OpenAI `/chat/completions` dialect (vLLM,
/// OpenRouter, llama.cpp server, ...).
pub struct OpenAICompatibleProvider {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAICompatibleProvider {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            api_key,
        }
    }

    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_s))
            .build()
            .map_err(|e| EvidenceError::Config(format!("http client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.api_base.clone(),
            model: config.model_name.clone(),
            api_key: config.api_key.clone(),
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl LLMProvider for OpenAICompatibleProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn chat(&self, messages: &[ChatMessage], temperature: f64, max_tokens: u32) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": temperature,
            "max_tokens": max_tokens,
        });

        debug!("chat request to {} ({} messages)", self.endpoint(), messages.len());

        let mut request = self.client.post(self.endpoint()).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let res = request
            .send()
            .await
            .map_err(|e| EvidenceError::transport(format!("endpoint unreachable: {}", e)))?;

        let status = res.status();
        if !status.is_success() {
            return Err(EvidenceError::transport(format!("HTTP error: {}", status.as_u16())));
        }

        let json: serde_json::Value = res
            .json()
            .await
            .map_err(|e| EvidenceError::transport(format!("invalid response body: {}", e)))?;

        let choice = json["choices"]
            .as_array()
            .and_then(|c| c.first())
            .ok_or_else(|| EvidenceError::transport("response missing choices"))?;

        choice["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| EvidenceError::transport("response missing content"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let p = OpenAICompatibleProvider::new("http://localhost:8000/v1/", "m", None);
        assert_eq!(p.endpoint(), "http://localhost:8000/v1/chat/completions");
        assert_eq!(p.model_name(), "m");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let p = OpenAICompatibleProvider::new("http://127.0.0.1:9", "m", None);
        let err = p.chat(&[ChatMessage::user("hi")], 0.1, 10).await.unwrap_err();
        assert!(matches!(err, EvidenceError::Transport(_)));
    }
}
