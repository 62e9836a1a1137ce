//! Evidence Reduction
//!
//! documents -> propositions -> canonical claims -> capped groups -> merged
//! evidence -> adjudicated claim groups.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::info;

use super::adjudicate::adjudicate;
use super::canonicalize::canonicalize_propositions;
use super::extract::extract_propositions;
use super::policy::{EvidencePolicy, ThinkingExtent};
use crate::error::Result;
use crate::llm::LLMProvider;
use crate::trace::{NullTraceSink, TraceSink};
use crate::types::{ClaimGroup, Document, EvidenceItem, Proposition};

/// Propositions sharing one claim signature.
#[derive(Debug, Clone)]
pub struct ClaimBucket {
    pub signature: String,
    pub claim_text: String,
    pub propositions: Vec<Proposition>,
}

/// A bucket with its deduplicated, capped evidence list.
#[derive(Debug, Clone)]
pub struct MergedClaim {
    pub signature: String,
    pub claim_text: String,
    pub propositions: Vec<Proposition>,
    pub evidence: Vec<EvidenceItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReduceResult {
    pub propositions: Vec<Proposition>,
    pub claim_groups: Vec<ClaimGroup>,
}

/// Runs the full pipeline for one set of documents.
pub struct EvidenceReducer<'a> {
    provider: &'a dyn LLMProvider,
    policy: EvidencePolicy,
    trace: &'a dyn TraceSink,
}

impl<'a> EvidenceReducer<'a> {
    pub fn new(provider: &'a dyn LLMProvider, extent: ThinkingExtent) -> Self {
        Self {
            provider,
            policy: extent.policy(),
            trace: &NullTraceSink,
        }
    }

    pub fn with_policy(mut self, policy: EvidencePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_trace(mut self, trace: &'a dyn TraceSink) -> Self {
        self.trace = trace;
        self
    }

    pub fn policy(&self) -> &EvidencePolicy {
        &self.policy
    }

    pub async fn reduce(&self, docs: &[Document]) -> Result<ReduceResult> {
        info!("🔬 Reducing evidence from {} documents", docs.len());

        let mut propositions = Vec::new();
        for doc in docs {
            propositions.extend(extract_propositions(doc, self.provider, &self.policy, self.trace).await?);
        }
        let canonical = canonicalize_propositions(propositions);
        let groups = group_claims(&canonical, &self.policy);
        let merged = merge_claims(groups, docs, &self.policy);
        let claim_groups = adjudicate(merged, self.provider, &self.policy, self.trace).await?;

        info!(
            "✅ Reduced to {} claim groups from {} propositions",
            claim_groups.len(),
            canonical.len()
        );
        Ok(ReduceResult {
            propositions: canonical,
            claim_groups,
        })
    }
}

/// Convenience entry point: resolve the extent label and run the pipeline.
pub async fn reduce_evidence(
    docs: &[Document],
    provider: &dyn LLMProvider,
    thinking_extent: &str,
) -> Result<ReduceResult> {
    EvidenceReducer::new(provider, ThinkingExtent::from_label(thinking_extent))
        .reduce(docs)
        .await
}

/// Buckets by signature, largest first. Ties keep first-seen order.
pub fn group_claims(propositions: &[Proposition], policy: &EvidencePolicy) -> Vec<ClaimBucket> {
    let mut buckets: Vec<ClaimBucket> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for prop in propositions {
        let Some(signature) = prop.signature() else { continue };
        match index.get(signature).copied() {
            Some(i) => buckets[i].propositions.push(prop.clone()),
            None => {
                index.insert(signature.to_string(), buckets.len());
                buckets.push(ClaimBucket {
                    signature: signature.to_string(),
                    claim_text: prop.payload.claim_text.trim().to_string(),
                    propositions: vec![prop.clone()],
                });
            }
        }
    }

    // sort_by is stable
    buckets.sort_by(|a, b| b.propositions.len().cmp(&a.propositions.len()));
    buckets.truncate(policy.max_claims);
    buckets
}

pub fn merge_claims(groups: Vec<ClaimBucket>, docs: &[Document], policy: &EvidencePolicy) -> Vec<MergedClaim> {
    let doc_index: HashMap<&str, &Document> = docs.iter().map(|d| (d.doc_id.as_str(), d)).collect();

    groups
        .into_iter()
        .map(|group| {
            let mut evidence = build_evidence(&group.propositions, &doc_index);
            evidence.truncate(policy.max_evidence_per_claim);
            MergedClaim {
                signature: group.signature,
                claim_text: group.claim_text,
                propositions: group.propositions,
                evidence,
            }
        })
        .collect()
}

/// One item per distinct `(doc_id, quote)`; empty quotes are skipped.
pub fn build_evidence(propositions: &[Proposition], doc_index: &HashMap<&str, &Document>) -> Vec<EvidenceItem> {
    let mut seen: HashSet<(&str, &str)> = HashSet::new();
    let mut evidence = Vec::new();

    for prop in propositions {
        let quote = prop.payload.quote.trim();
        if quote.is_empty() || !seen.insert((prop.doc_id.as_str(), quote)) {
            continue;
        }
        let doc = doc_index.get(prop.doc_id.as_str());
        evidence.push(EvidenceItem {
            doc_id: prop.doc_id.clone(),
            url: doc.map(|d| d.url.clone()).unwrap_or_default(),
            title: doc.map(|d| d.title.clone()).unwrap_or_default(),
            quote: quote.to_string(),
        });
    }
    evidence
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::extract::make_anchor;
    use crate::types::{PropositionPayload, PropositionQuality, PropositionType};
    use chrono::Utc;

    fn prop(id: &str, doc_id: &str, claim: &str, quote: &str) -> Proposition {
        let mut props = canonicalize_propositions(vec![Proposition {
            id: id.to_string(),
            kind: PropositionType::Fact,
            payload: PropositionPayload {
                claim_text: claim.to_string(),
                quote: quote.to_string(),
                claim_type: PropositionType::Fact,
                canonical_text: None,
                claim_signature: None,
            },
            anchors: vec![make_anchor("", quote, doc_id)],
            doc_id: doc_id.to_string(),
            quality: PropositionQuality { model: "test".into(), chunk_chars: 0 },
            extracted_at: Utc::now(),
        }]);
        props.remove(0)
    }

    #[test]
    fn test_group_by_signature_and_rank() {
        let props = vec![
            prop("p1", "d1", "Claim A", "qa"),
            prop("p2", "d1", "Claim B", "qb"),
            prop("p3", "d2", "claim   b", "qb2"),
            prop("p4", "d2", "Claim C", "qc"),
        ];
        let groups = group_claims(&props, &EvidencePolicy::default());

        let texts: Vec<&str> = groups.iter().map(|g| g.claim_text.as_str()).collect();
        assert_eq!(texts, vec!["Claim B", "Claim A", "Claim C"]);
        assert_eq!(groups[0].propositions.len(), 2);
    }

    #[test]
    fn test_group_drops_unsigned_and_caps() {
        let mut unsigned = prop("p0", "d1", "Loose", "q");
        unsigned.payload.claim_signature = None;
        let mut props = vec![unsigned];
        for i in 0..5 {
            props.push(prop(&format!("p{}", i + 1), "d1", &format!("Claim {}", i), "q"));
        }
        let mut policy = EvidencePolicy::default();
        policy.max_claims = 3;

        let groups = group_claims(&props, &policy);
        assert_eq!(groups.len(), 3);
        assert!(groups.iter().all(|g| g.claim_text != "Loose"));
        assert_eq!(groups[0].claim_text, "Claim 0");
    }

    #[test]
    fn test_build_evidence_dedups_and_resolves_docs() {
        let docs = [Document::new("d1", "http://one", "One", "text")];
        let index: HashMap<&str, &Document> = docs.iter().map(|d| (d.doc_id.as_str(), d)).collect();
        let props = vec![
            prop("p1", "d1", "c", " same quote "),
            prop("p2", "d1", "c", "same quote"),
            prop("p3", "d9", "c", "same quote"),
            prop("p4", "d1", "c", "   "),
        ];

        let evidence = build_evidence(&props, &index);
        assert_eq!(evidence.len(), 2);
        assert_eq!(evidence[0].url, "http://one");
        assert_eq!(evidence[0].quote, "same quote");
        assert_eq!(evidence[1].doc_id, "d9");
        assert!(evidence[1].title.is_empty());
    }

    #[test]
    fn test_merge_caps_evidence_in_order() {
        let props: Vec<Proposition> = (0..6).map(|i| prop(&format!("p{}", i), "d1", "c", &format!("q{}", i))).collect();
        let groups = group_claims(&props, &EvidencePolicy::default());
        let mut policy = EvidencePolicy::default();
        policy.max_evidence_per_claim = 4;

        let merged = merge_claims(groups, &[], &policy);
        let quotes: Vec<&str> = merged[0].evidence.iter().map(|e| e.quote.as_str()).collect();
        assert_eq!(quotes, vec!["q0", "q1", "q2", "q3"]);
    }
}
