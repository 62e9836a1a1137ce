#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

use research_agency::error::Result;
use research_agency::llm::LLMProvider;
use research_agency::types::ChatMessage;

/// Answers extraction and labeling prompts about the boiling point of water.
/// Every sentence mentioning "boils" becomes a claim in the unit it states;
/// a quote in Fahrenheit is labeled `refute`, anything else `support`.
pub struct WaterOracle {
    calls: AtomicUsize,
}

impl WaterOracle {
    pub fn new() -> Self {
        Self { calls: AtomicUsize::new(0) }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn unit_of(text: &str) -> &'static str {
    if text.contains("°F") {
        "°F"
    } else {
        "°C"
    }
}

#[async_trait]
impl LLMProvider for WaterOracle {
    fn model_name(&self) -> &str {
        "water-oracle"
    }

    async fn chat(&self, messages: &[ChatMessage], _temperature: f64, _max_tokens: u32) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let prompt = messages.last().map(|m| m.content.as_str()).unwrap_or_default();
        debug!("MOCK PROMPT: {}", prompt);

        // 1. Proposition extraction
        if prompt.starts_with("Extract up to") {
            let text = prompt.split("TEXT:\n").nth(1).unwrap_or_default();
            let items: Vec<Value> = text
                .split_inclusive('.')
                .map(str::trim)
                .filter(|s| s.contains("boils"))
                .map(|sentence| {
                    json!({
                        "claim_text": format!("Water boils at 100{} at sea level.", unit_of(sentence)),
                        "quote": sentence,
                        "claim_type": "Fact"
                    })
                })
                .collect();
            return Ok(format!("Here are the propositions:\n{}", Value::Array(items)));
        }

        // 2. Evidence labeling
        if prompt.starts_with("Label each QUOTE") {
            let labels: Vec<Value> = prompt
                .lines()
                .filter_map(|line| {
                    let (index, quote) = line.strip_prefix('[')?.split_once("] ")?;
                    let index: usize = index.parse().ok()?;
                    let label = if unit_of(quote) == "°F" { "refute" } else { "support" };
                    Some(json!({"index": index, "label": label}))
                })
                .collect();
            return Ok(Value::Array(labels).to_string());
        }

        // 3. Judge
        if prompt.starts_with("Evaluate the payload") {
            return Ok(r#"{"pass": true, "rationale": "consistent"}"#.to_string());
        }

        Ok("[]".to_string())
    }
}
