use serde_json::{Map, Value};
use tracing::debug;

use super::validators::ValidationResult;
use crate::error::Result;
use crate::llm::{parse_json_value, LLMProvider};
use crate::types::ChatMessage;

const KIND: &str = "llm_judge";

/// Model-graded validator. When disabled every verdict is skipped, so it
/// never moves a trial's score.
pub struct LlmJudge<'a> {
    provider: Option<&'a dyn LLMProvider>,
}

impl<'a> LlmJudge<'a> {
    pub fn new(provider: &'a dyn LLMProvider) -> Self {
        Self { provider: Some(provider) }
    }

    pub fn disabled() -> Self {
        Self { provider: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.provider.is_some()
    }

    pub async fn validate(&self, payload: &Value, params: &Map<String, Value>, weight: f64) -> Result<ValidationResult> {
        let Some(provider) = self.provider else {
            return Ok(ValidationResult::skipped(KIND, weight, "llm judge disabled"));
        };

        let messages = [
            ChatMessage::system("You are a strict evaluator."),
            ChatMessage::user(build_prompt(payload, params)),
        ];
        let response = provider.chat(&messages, 0.2, 200).await?;

        let Some(Value::Object(verdict)) = parse_json_value(&response) else {
            debug!("Judge verdict was not a JSON object");
            return Ok(ValidationResult::skipped(KIND, weight, "llm judge parse failed"));
        };
        let passed = verdict.get("pass").is_some_and(is_pass);
        let rationale = match verdict.get("rationale") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        Ok(ValidationResult::new(KIND, passed, weight, rationale))
    }
}

/// `true`, `"true"` (any case) or a non-zero number.
fn is_pass(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s.trim().eq_ignore_ascii_case("true"),
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        _ => false,
    }
}

fn build_prompt(payload: &Value, params: &Map<String, Value>) -> String {
    let criteria = ["criteria", "description"]
        .iter()
        .filter_map(|key| params.get(*key))
        .find(|v| !v.is_null() && v.as_str() != Some(""))
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_default();
    let rendered = serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string());

    format!(
        "Evaluate the payload against the criteria.\n\
         Return JSON only: {{\"pass\": true|false, \"rationale\": \"...\"}}.\n\n\
         CRITERIA:\n{}\n\n\
         PAYLOAD:\n{}",
        criteria, rendered
    )
}
