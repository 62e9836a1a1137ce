use serde_json::{json, Value};
use tracing::{debug, warn};

use super::policy::EvidencePolicy;
use super::reduce::MergedClaim;
use crate::error::Result;
use crate::llm::{parse_json_list, LLMProvider};
use crate::trace::{TraceEvent, TraceSink};
use crate::types::{
    ChatMessage, ClaimDomain, ClaimGroup, EvidenceItem, EvidenceLabel, LabelCounts, LabeledEvidence,
    MergeSummary, Proposition, Stance,
};

const SYSTEM_PROMPT: &str = "You label evidence as support, refute, or neutral.";
const LABEL_TEMPERATURE: f64 = 0.1;
const LABEL_MAX_TOKENS: u32 = 400;

/// One label per evidence item (capped at `max_evidence_per_claim`).
/// Anything the model does not label cleanly is `Neutral`.
pub async fn label_evidence(
    claim_text: &str,
    evidence: &[EvidenceItem],
    provider: &dyn LLMProvider,
    policy: &EvidencePolicy,
    trace: &dyn TraceSink,
) -> Result<Vec<EvidenceLabel>> {
    if evidence.is_empty() {
        return Ok(Vec::new());
    }

    let limited = &evidence[..evidence.len().min(policy.max_evidence_per_claim)];
    let messages = [
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(build_prompt(claim_text, limited)),
    ];
    let response = provider.chat(&messages, LABEL_TEMPERATURE, LABEL_MAX_TOKENS).await?;

    match parse_labels(&response, limited.len()) {
        Some(labels) => Ok(labels),
        None => {
            warn!("Could not parse evidence labels; defaulting to neutral");
            trace.record(&TraceEvent::parse_failed(
                "adjudicate_evidence",
                claim_text,
                "no JSON label list found in response",
            ));
            Ok(vec![EvidenceLabel::Neutral; limited.len()])
        }
    }
}

fn build_prompt(claim_text: &str, evidence: &[EvidenceItem]) -> String {
    let mut lines = vec![
        "Label each QUOTE as support, refute, or neutral for the CLAIM.".to_string(),
        r#"Return JSON array only: [{"index":0,"label":"support"}, ...]"#.to_string(),
        "CLAIM:".to_string(),
        claim_text.to_string(),
        String::new(),
        "QUOTES:".to_string(),
    ];
    for (idx, item) in evidence.iter().enumerate() {
        lines.push(format!("[{}] {}", idx, item.quote));
        if !item.title.is_empty() {
            lines.push(format!("Source: {}", item.title));
        }
        if !item.url.is_empty() {
            lines.push(format!("URL: {}", item.url));
        }
        lines.push(String::new());
    }
    lines.join("\n")
}

/// `None` when the response holds no usable (non-empty) list.
fn parse_labels(response: &str, expected: usize) -> Option<Vec<EvidenceLabel>> {
    let items = parse_json_list(response).filter(|items| !items.is_empty())?;
    let mut labels = vec![EvidenceLabel::Neutral; expected];

    for item in items.iter().filter_map(Value::as_object) {
        let Some(index) = item.get("index").and_then(Value::as_u64) else { continue };
        let index = index as usize;
        if index >= expected {
            continue;
        }
        let label = item
            .get("label")
            .and_then(Value::as_str)
            .and_then(EvidenceLabel::parse)
            .unwrap_or_default();
        labels[index] = label;
    }
    Some(labels)
}

/// Total over all counts.
pub fn derive_stance(counts: &LabelCounts) -> Stance {
    match (counts.support > 0, counts.refute > 0) {
        (true, true) => Stance::Mixed,
        (true, false) => Stance::Supported,
        (false, true) => Stance::Refuted,
        (false, false) => Stance::Insufficient,
    }
}

pub async fn adjudicate(
    groups: Vec<MergedClaim>,
    provider: &dyn LLMProvider,
    policy: &EvidencePolicy,
    trace: &dyn TraceSink,
) -> Result<Vec<ClaimGroup>> {
    let mut adjudicated = Vec::with_capacity(groups.len());

    for group in groups {
        let labels = label_evidence(&group.claim_text, &group.evidence, provider, policy, trace).await?;

        let mut counts = LabelCounts::default();
        let labeled: Vec<LabeledEvidence> = group
            .evidence
            .into_iter()
            .enumerate()
            .map(|(idx, item)| {
                let label = labels.get(idx).copied().unwrap_or_default();
                counts.tally(label);
                LabeledEvidence { item, label }
            })
            .collect();

        let stance = derive_stance(&counts);
        let rationale = format!(
            "support={}, refute={}, neutral={} across {} evidence items.",
            counts.support,
            counts.refute,
            counts.neutral,
            labeled.len()
        );
        debug!("Claim {} -> {} ({})", group.signature, stance, rationale);
        trace.record(&TraceEvent::ClaimAdjudicated {
            signature: group.signature.clone(),
            claim_text: group.claim_text.clone(),
            stance: stance.as_str().to_string(),
            counts: json!(counts),
        });

        adjudicated.push(ClaimGroup {
            signature: group.signature,
            claim_text: group.claim_text,
            domain: ClaimDomain::General,
            propositions: group.propositions.iter().map(|p| p.id.clone()).collect(),
            merge: MergeSummary {
                counts,
                evidence: labeled,
                canonical_text: canonical_from_props(&group.propositions),
            },
            stance,
            rationale,
        });
    }
    Ok(adjudicated)
}

fn canonical_from_props(propositions: &[Proposition]) -> String {
    propositions
        .iter()
        .filter_map(|p| p.payload.canonical_text.as_deref())
        .find(|c| !c.is_empty())
        .unwrap_or_default()
        .to_string()
}
