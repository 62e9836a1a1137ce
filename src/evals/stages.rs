//! Stage adapters
//!
//! Runs one pipeline stage in isolation against a case's inputs and returns
//! a JSON payload for the validators. Documents are loaded by the caller
//! before any trial runs. Parse failures inside the stage become entries in
//! `errors`; only transport failures propagate.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use super::cases::Stage;
use super::path::as_text;
use super::stats::fixed_effect_meta;
use crate::error::Result;
use crate::evidence::{extract_propositions, label_evidence, EvidenceReducer, ThinkingExtent};
use crate::llm::{parse_json_value, LLMProvider};
use crate::trace::{MemoryTraceSink, TeeTraceSink, TraceEvent, TraceSink};
use crate::types::{ChatMessage, Document, EvidenceItem};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub payload: Value,
    pub errors: Vec<String>,
}

/// Everything a stage needs besides its inputs.
pub struct StageContext<'a> {
    pub provider: &'a dyn LLMProvider,
    pub thinking_extent: ThinkingExtent,
    pub temperature: f64,
    /// Run-wide sink; stage-local parse failures are collected separately.
    pub trace: &'a dyn TraceSink,
}

/// `documents` is the case's `documents` input, already resolved with
/// [`load_documents`](super::documents::load_documents).
pub async fn run_stage(
    stage: Stage,
    inputs: &Map<String, Value>,
    documents: &[Document],
    ctx: &StageContext<'_>,
) -> Result<StageResult> {
    let collected = MemoryTraceSink::new();
    let trace = TeeTraceSink::new(vec![ctx.trace, &collected]);
    debug!("Running stage {} over {} documents", stage, documents.len());

    let (payload, mut errors) = match stage {
        Stage::ExtractPropositions => {
            let policy = ctx.thinking_extent.policy();
            let mut propositions = Vec::new();
            for doc in documents {
                propositions.extend(extract_propositions(doc, ctx.provider, &policy, &trace).await?);
            }
            (json!({ "propositions": propositions }), Vec::new())
        }
        Stage::ReduceClaims => {
            let result = EvidenceReducer::new(ctx.provider, ctx.thinking_extent)
                .with_trace(&trace)
                .reduce(documents)
                .await?;
            (
                json!({ "propositions": result.propositions, "claim_groups": result.claim_groups }),
                Vec::new(),
            )
        }
        Stage::AdjudicateEvidence => {
            let claim_text = inputs.get("claim_text").map(as_text).unwrap_or_default();
            let evidence = match inputs.get("evidence") {
                Some(Value::Array(items)) => items.clone(),
                _ => Vec::new(),
            };
            let items: Vec<EvidenceItem> = evidence.iter().map(evidence_item).collect();
            let labels =
                label_evidence(&claim_text, &items, ctx.provider, &ctx.thinking_extent.policy(), &trace).await?;
            let labels: Vec<&str> = labels.iter().map(|l| l.as_str()).collect();
            (
                json!({ "labels": labels, "claim_text": claim_text, "evidence": evidence }),
                Vec::new(),
            )
        }
        Stage::ExtractTrialStruct => extract_trial_struct(documents, ctx.provider, ctx.temperature, &trace).await?,
        Stage::MetaAnalysis => {
            let effect_sizes = match inputs.get("effect_sizes") {
                Some(Value::Array(items)) => items.as_slice(),
                _ => &[],
            };
            (serde_json::to_value(fixed_effect_meta(effect_sizes))?, Vec::new())
        }
    };

    for err in collected.parse_errors() {
        if !errors.contains(&err) {
            errors.push(err);
        }
    }
    Ok(StageResult { payload, errors })
}

/// Evidence given inline in a case; missing fields are empty strings.
fn evidence_item(value: &Value) -> EvidenceItem {
    let field = |key: &str| value.get(key).filter(|v| !v.is_null()).map(as_text).unwrap_or_default();
    EvidenceItem {
        doc_id: field("doc_id"),
        url: field("url"),
        title: field("title"),
        quote: field("quote"),
    }
}

async fn extract_trial_struct(
    documents: &[Document],
    provider: &dyn LLMProvider,
    temperature: f64,
    trace: &dyn TraceSink,
) -> Result<(Value, Vec<String>)> {
    let mut records = Vec::new();
    let mut errors = Vec::new();

    for doc in documents {
        let messages = [
            ChatMessage::system("You extract structured trial data."),
            ChatMessage::user(trial_struct_prompt(&doc.text)),
        ];
        let response = provider.chat(&messages, temperature, 1200).await?;

        let record = match parse_json_value(&response) {
            Some(Value::Array(items)) => items.into_iter().next(),
            other => other,
        };
        match record {
            Some(obj @ Value::Object(_)) => records.push(obj),
            _ => {
                warn!("Trial record for {} was not a JSON object", doc.doc_id);
                trace.record(&TraceEvent::parse_failed(
                    "extract_trial_struct",
                    &doc.doc_id,
                    "no JSON object in response",
                ));
                errors.push(format!("parse_failed:{}", doc.doc_id));
            }
        }
    }
    Ok((json!({ "records": records }), errors))
}

fn trial_struct_prompt(text: &str) -> String {
    format!(
        "Extract a single clinical trial record as JSON. Use null for missing fields.\n\
         Return JSON object only with keys:\n\
         study_id, title, population, intervention, comparator, sample_size, \
         analysis_population, setting, registry_id, registry_url, notes,\n\
         design: {{randomized, blinding, phase, multicenter}},\n\
         outcomes: [\n  \
         {{name, type, measure, timepoint, effect_estimates: [\n    \
         {{measure_type, estimate, ci_low, ci_high, unit, p_value, direction, n}}\n  \
         ]}}\n\
         ]\n\n\
         TEXT:\n{}",
        text
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evals::documents::load_documents;
    use crate::trace::NullTraceSink;
    use std::path::Path;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Replies(Mutex<Vec<&'static str>>);

    impl Replies {
        fn new(mut replies: Vec<&'static str>) -> Self {
            replies.reverse();
            Self(Mutex::new(replies))
        }
    }

    #[async_trait]
    impl LLMProvider for Replies {
        fn model_name(&self) -> &str {
            "replies"
        }

        async fn chat(&self, _: &[ChatMessage], _: f64, _: u32) -> Result<String> {
            Ok(self.0.lock().unwrap().pop().unwrap_or("[]").to_string())
        }
    }

    fn ctx<'a>(provider: &'a dyn LLMProvider) -> StageContext<'a> {
        StageContext {
            provider,
            thinking_extent: ThinkingExtent::Medium,
            temperature: 0.3,
            trace: &NullTraceSink,
        }
    }

    fn inputs(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    async fn run(stage: Stage, inputs: &Map<String, Value>, provider: &dyn LLMProvider) -> Result<StageResult> {
        let documents = load_documents(inputs, Path::new(".")).unwrap();
        run_stage(stage, inputs, &documents, &ctx(provider)).await
    }

    #[tokio::test]
    async fn test_trial_struct_records_and_errors() {
        let provider = Replies::new(vec![
            r#"[{"study_id": "S1", "sample_size": 40}, {"study_id": "S2"}]"#,
            "no record here",
        ]);
        let result = run(
            Stage::ExtractTrialStruct,
            &inputs(json!({"documents": [{"doc_id": "a", "text": "x"}, {"doc_id": "b", "text": "y"}]})),
            &provider,
        )
        .await
        .unwrap();

        assert_eq!(result.payload["records"].as_array().unwrap().len(), 1);
        assert_eq!(result.payload["records"][0]["study_id"], "S1");
        assert_eq!(result.errors[0], "parse_failed:b");
        assert!(result.errors.contains(&"parse_failed:extract_trial_struct:b".to_string()));
    }

    #[tokio::test]
    async fn test_adjudicate_stage_payload() {
        let provider = Replies::new(vec![r#"[{"index": 0, "label": "refute"}]"#]);
        let result = run(
            Stage::AdjudicateEvidence,
            &inputs(json!({
                "claim_text": "Water boils at 50 C",
                "evidence": [{"doc_id": "d1", "quote": "Water boils at 100 C"}, {"quote": "Sea level"}]
            })),
            &provider,
        )
        .await
        .unwrap();

        assert_eq!(result.payload["labels"], json!(["refute", "neutral"]));
        assert_eq!(result.payload["evidence"][1]["quote"], "Sea level");
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn test_meta_analysis_stage_makes_no_calls() {
        struct Unreachable;

        #[async_trait]
        impl LLMProvider for Unreachable {
            fn model_name(&self) -> &str {
                "none"
            }

            async fn chat(&self, _: &[ChatMessage], _: f64, _: u32) -> Result<String> {
                panic!("meta-analysis must not call the model");
            }
        }

        let result = run(
            Stage::MetaAnalysis,
            &inputs(json!({"effect_sizes": [
                {"measure_type": "MD", "estimate": 1.0, "std_error": 1.0},
                {"measure_type": "MD", "estimate": 3.0, "std_error": 1.0}
            ]})),
            &Unreachable,
        )
        .await
        .unwrap();
        assert_eq!(result.payload["status"], "ok");
        assert_eq!(result.payload["pooled_estimate"], 2.0);
    }

    #[tokio::test]
    async fn test_extract_stage_collects_parse_failures() {
        let provider = Replies::new(vec!["nothing useful"]);
        let result = run(
            Stage::ExtractPropositions,
            &inputs(json!({"documents": [{"doc_id": "d1", "text": "Water boils at 100 C."}]})),
            &provider,
        )
        .await
        .unwrap();
        assert_eq!(result.payload["propositions"], json!([]));
        assert_eq!(result.errors, vec!["parse_failed:extract_propositions:d1".to_string()]);
    }
}
