//! Model selection seam.
//!
//! Which model serves which thinking extent is decided outside this crate;
//! the harness only needs a named provider back.

use std::sync::Arc;

use super::{LLMProvider, OpenAICompatibleProvider};
use crate::config::ModelConfig;
use crate::error::Result;

#[derive(Clone)]
pub struct RoutedModel {
    /// Routing choice, e.g. `local` or `override`.
    pub name: String,
    pub provider: Arc<dyn LLMProvider>,
}

pub trait ModelRouter: Send + Sync {
    fn route(&self, thinking_extent: &str, model_override: Option<&str>) -> Result<RoutedModel>;
}

/// Always hands out the same provider. Model overrides are ignored.
pub struct FixedRouter {
    name: String,
    provider: Arc<dyn LLMProvider>,
}

impl FixedRouter {
    pub fn new(name: impl Into<String>, provider: Arc<dyn LLMProvider>) -> Self {
        Self { name: name.into(), provider }
    }
}

impl ModelRouter for FixedRouter {
    fn route(&self, _thinking_extent: &str, _model_override: Option<&str>) -> Result<RoutedModel> {
        Ok(RoutedModel {
            name: self.name.clone(),
            provider: self.provider.clone(),
        })
    }
}

/// Builds an OpenAI-compatible provider from the configured endpoint, swapping
/// in the override model name when one is given.
pub struct ConfigRouter {
    model: ModelConfig,
}

impl ConfigRouter {
    pub fn new(model: ModelConfig) -> Self {
        Self { model }
    }
}

impl ModelRouter for ConfigRouter {
    fn route(&self, _thinking_extent: &str, model_override: Option<&str>) -> Result<RoutedModel> {
        let mut provider = OpenAICompatibleProvider::from_config(&self.model)?;
        let name = match model_override {
            Some(model) => {
                provider = provider.with_model(model);
                "override"
            }
            None => "local",
        };
        Ok(RoutedModel {
            name: name.to_string(),
            provider: Arc::new(provider),
        })
    }
}
