//! Text-Generation Capability
//!
//! The only suspension point of the pipeline: every extraction, labeling and
//! judging step goes through an [`LLMProvider`].

mod json;
mod provider;
mod recording;
mod router;

pub use json::{extract_json_span, parse_json_list, parse_json_value};
pub use provider::OpenAICompatibleProvider;
pub use recording::{RecordedCall, RecordingProvider};
pub use router::{ConfigRouter, FixedRouter, ModelRouter, RoutedModel};

use async_trait::async_trait;

use crate::error::Result;
use crate::types::ChatMessage;

#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Name of the backing model, recorded in proposition quality metadata.
    fn model_name(&self) -> &str;

    /// One blocking request/response exchange. Transport failures are returned
    /// as errors and never retried here.
    async fn chat(&self, messages: &[ChatMessage], temperature: f64, max_tokens: u32) -> Result<String>;
}
