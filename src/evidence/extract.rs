//! Proposition Extractor
//!
//! Turns one document into atomic claims, each backed by a quote that is
//! located (when possible) inside the document text.

use chrono::Utc;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::policy::EvidencePolicy;
use crate::error::Result;
use crate::llm::{parse_json_list, LLMProvider};
use crate::trace::{TraceEvent, TraceSink};
use crate::types::{
    Annotation, AnnotationSelector, ChatMessage, Document, Proposition, PropositionPayload,
    PropositionQuality, PropositionType,
};

const SYSTEM_PROMPT: &str = "You extract atomic, text-grounded claims.";
const CONTEXT_CHARS: usize = 80;
const EXTRACT_TEMPERATURE: f64 = 0.1;
const EXTRACT_MAX_TOKENS: u32 = 900;

pub async fn extract_propositions(
    document: &Document,
    provider: &dyn LLMProvider,
    policy: &EvidencePolicy,
    trace: &dyn TraceSink,
) -> Result<Vec<Proposition>> {
    if document.text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let chunks = chunk_text(&document.text, policy.chunk_chars, policy.chunk_overlap);
    let total_chunks = chunks.len().min(policy.max_chunks_per_doc);
    let mut propositions: Vec<Proposition> = Vec::new();

    for (i, chunk) in chunks.iter().take(policy.max_chunks_per_doc).enumerate() {
        if propositions.len() >= policy.max_props_per_doc {
            break;
        }
        debug!("Processing chunk {}/{} for {}", i + 1, total_chunks, document.doc_id);

        let items = extract_from_chunk(document, chunk, provider, policy.max_props_per_chunk, trace).await?;
        for item in items {
            if propositions.len() >= policy.max_props_per_doc {
                break;
            }
            if let Some(prop) = build_proposition(document, &item, provider.model_name()) {
                propositions.push(prop);
            }
        }
    }

    trace.record(&TraceEvent::PropositionsExtracted {
        doc_id: document.doc_id.clone(),
        propositions: propositions
            .iter()
            .filter_map(|p| serde_json::to_value(&p.payload).ok())
            .collect(),
    });

    Ok(propositions)
}

async fn extract_from_chunk(
    document: &Document,
    chunk: &str,
    provider: &dyn LLMProvider,
    max_props: usize,
    trace: &dyn TraceSink,
) -> Result<Vec<Value>> {
    let messages = [
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(build_prompt(chunk, max_props)),
    ];
    let response = provider.chat(&messages, EXTRACT_TEMPERATURE, EXTRACT_MAX_TOKENS).await?;

    match parse_json_list(&response) {
        Some(items) => Ok(items.into_iter().filter(Value::is_object).collect()),
        None => {
            warn!("Failed to parse extraction response for {} as JSON", document.doc_id);
            trace.record(&TraceEvent::parse_failed(
                "extract_propositions",
                &document.doc_id,
                "no JSON list found in response",
            ));
            Ok(Vec::new())
        }
    }
}

fn build_prompt(chunk: &str, max_props: usize) -> String {
    format!(
        "Extract up to {} atomic propositions directly supported by the TEXT.\n\
         Return JSON array only. Each item must include:\n\
         - claim_text: short sentence\n\
         - quote: exact substring from TEXT supporting the claim\n\
         - claim_type: Effect | Presence | Fact\n\
         If nothing is supported, return [].\n\n\
         TEXT:\n{}",
        max_props, chunk
    )
}

fn build_proposition(document: &Document, item: &Value, model: &str) -> Option<Proposition> {
    let claim_text = value_as_text(item.get("claim_text"));
    let quote = value_as_text(item.get("quote"));
    if claim_text.is_empty() || quote.is_empty() {
        return None;
    }
    let claim_type = PropositionType::normalize(&value_as_text(item.get("claim_type")));

    Some(Proposition {
        id: proposition_id(&document.doc_id, &claim_text, &quote),
        kind: claim_type,
        anchors: vec![make_anchor(&document.text, &quote, &document.doc_id)],
        doc_id: document.doc_id.clone(),
        quality: PropositionQuality {
            model: model.to_string(),
            chunk_chars: document.text.chars().count(),
        },
        extracted_at: Utc::now(),
        payload: PropositionPayload {
            claim_text,
            quote,
            claim_type,
            canonical_text: None,
            claim_signature: None,
        },
    })
}

/// Overlapping character windows. The last window may be shorter.
pub fn chunk_text(text: &str, chunk_chars: usize, overlap: usize) -> Vec<String> {
    if chunk_chars == 0 {
        return vec![text.to_string()];
    }
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < len {
        let end = (start + chunk_chars).min(len);
        chunks.push(chars[start..end].iter().collect());
        if end >= len {
            break;
        }
        // an overlap >= chunk size would never advance
        start = end.saturating_sub(overlap).max(start + 1);
    }
    chunks
}

/// Locate `quote` in `text` (exact, then case-insensitive) and build its
/// anchor. An unlocated quote still yields a selector with just `exact`.
pub fn make_anchor(text: &str, quote: &str, doc_id: &str) -> Annotation {
    let haystack: Vec<char> = text.chars().collect();
    let needle: Vec<char> = quote.chars().collect();

    let found = find_chars(&haystack, &needle, false).or_else(|| find_chars(&haystack, &needle, true));
    let Some(start) = found else {
        return Annotation {
            doc_id: doc_id.to_string(),
            selector: AnnotationSelector::exact(quote),
            quote: quote.to_string(),
            context: String::new(),
        };
    };

    let end = start + needle.len();
    let prefix: String = haystack[start.saturating_sub(CONTEXT_CHARS)..start].iter().collect();
    let suffix: String = haystack[end..(end + CONTEXT_CHARS).min(haystack.len())].iter().collect();
    let context = format!("{}{}{}", prefix, quote, suffix);

    Annotation {
        doc_id: doc_id.to_string(),
        selector: AnnotationSelector {
            prefix: Some(prefix),
            suffix: Some(suffix),
            start: Some(start),
            end: Some(end),
            ..AnnotationSelector::exact(quote)
        },
        quote: quote.to_string(),
        context,
    }
}

fn find_chars(haystack: &[char], needle: &[char], fold_case: bool) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    let eq = |a: &char, b: &char| {
        if fold_case {
            a.to_lowercase().eq(b.to_lowercase())
        } else {
            a == b
        }
    };
    haystack
        .windows(needle.len())
        .position(|w| w.iter().zip(needle).all(|(a, b)| eq(a, b)))
}

/// `prop_` + 16 hex characters of SHA-256 over `doc_id:claim_text:quote`.
pub fn proposition_id(doc_id: &str, claim_text: &str, quote: &str) -> String {
    let digest = Sha256::digest(format!("{}:{}:{}", doc_id, claim_text, quote).as_bytes());
    format!("prop_{}", &hex::encode(digest)[..16])
}

fn value_as_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => other.to_string().trim().to_string(),
    }
}
