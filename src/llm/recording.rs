//! Recording Provider
//!
//! Wraps another provider for the duration of one evaluation trial: forces the
//! trial temperature onto every call and keeps a verbatim log of each
//! request/response pair for the trial artifact.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::LLMProvider;
use crate::error::Result;
use crate::types::ChatMessage;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordedCall {
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub response: String,
}

pub struct RecordingProvider {
    inner: Arc<dyn LLMProvider>,
    override_temperature: Option<f64>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl RecordingProvider {
    pub fn new(inner: Arc<dyn LLMProvider>) -> Self {
        Self {
            inner,
            override_temperature: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.override_temperature = Some(temperature);
        self
    }

    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }
}

#[async_trait]
impl LLMProvider for RecordingProvider {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    async fn chat(&self, messages: &[ChatMessage], temperature: f64, max_tokens: u32) -> Result<String> {
        let temperature = self.override_temperature.unwrap_or(temperature);
        let response = self.inner.chat(messages, temperature, max_tokens).await?;

        self.calls.lock().await.push(RecordedCall {
            messages: messages.to_vec(),
            temperature,
            max_tokens,
            response: response.clone(),
        });

        tracing::debug!("recorded call #{} to {}", self.call_count().await, self.inner.model_name());
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvidenceError;

    struct EchoProvider;

    #[async_trait]
    impl LLMProvider for EchoProvider {
        fn model_name(&self) -> &str {
            "echo"
        }

        async fn chat(&self, messages: &[ChatMessage], temperature: f64, _max_tokens: u32) -> Result<String> {
            Ok(format!("{}@{}", messages.last().map(|m| m.content.as_str()).unwrap_or(""), temperature))
        }
    }

    struct DownProvider;

    #[async_trait]
    impl LLMProvider for DownProvider {
        fn model_name(&self) -> &str {
            "down"
        }

        async fn chat(&self, _: &[ChatMessage], _: f64, _: u32) -> Result<String> {
            Err(EvidenceError::transport("connection refused"))
        }
    }

    #[tokio::test]
    async fn test_records_calls_with_forced_temperature() {
        let recorder = RecordingProvider::new(Arc::new(EchoProvider)).with_temperature(0.7);
        let out = recorder.chat(&[ChatMessage::user("hello")], 0.1, 64).await.unwrap();
        assert_eq!(out, "hello@0.7");

        let calls = recorder.calls().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].temperature, 0.7);
        assert_eq!(calls[0].max_tokens, 64);
        assert_eq!(calls[0].response, "hello@0.7");
        assert_eq!(recorder.model_name(), "echo");
    }

    #[tokio::test]
    async fn test_keeps_caller_temperature_without_override() {
        let recorder = RecordingProvider::new(Arc::new(EchoProvider));
        recorder.chat(&[ChatMessage::user("x")], 0.2, 8).await.unwrap();
        assert_eq!(recorder.calls().await[0].temperature, 0.2);
    }

    #[tokio::test]
    async fn test_transport_failure_propagates_unrecorded() {
        let recorder = RecordingProvider::new(Arc::new(DownProvider));
        let err = recorder.chat(&[ChatMessage::user("x")], 0.2, 8).await;
        assert!(err.is_err());
        assert_eq!(recorder.call_count().await, 0);
    }
}
