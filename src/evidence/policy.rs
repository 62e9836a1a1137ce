use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How generous extraction and grouping are allowed to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingExtent {
    Low,
    #[default]
    Medium,
    High,
    Heavy,
}

impl ThinkingExtent {
    /// Free-text label, case-insensitive. Unknown labels mean `Medium`.
    pub fn from_label(label: &str) -> Self {
        label.parse().unwrap_or_default()
    }

    pub fn policy(&self) -> EvidencePolicy {
        match self {
            ThinkingExtent::Low => EvidencePolicy {
                chunk_chars: 2000,
                chunk_overlap: 200,
                max_chunks_per_doc: 2,
                max_props_per_chunk: 3,
                max_props_per_doc: 6,
                max_claims: 10,
                max_evidence_per_claim: 6,
            },
            ThinkingExtent::Medium => EvidencePolicy {
                chunk_chars: 2500,
                chunk_overlap: 200,
                max_chunks_per_doc: 3,
                max_props_per_chunk: 4,
                max_props_per_doc: 8,
                max_claims: 20,
                max_evidence_per_claim: 10,
            },
            ThinkingExtent::High => EvidencePolicy {
                chunk_chars: 3000,
                chunk_overlap: 240,
                max_chunks_per_doc: 4,
                max_props_per_chunk: 5,
                max_props_per_doc: 12,
                max_claims: 30,
                max_evidence_per_claim: 12,
            },
            ThinkingExtent::Heavy => EvidencePolicy {
                chunk_chars: 3500,
                chunk_overlap: 280,
                max_chunks_per_doc: 5,
                max_props_per_chunk: 6,
                max_props_per_doc: 16,
                max_claims: 40,
                max_evidence_per_claim: 14,
            },
        }
    }
}

impl FromStr for ThinkingExtent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(ThinkingExtent::Low),
            "medium" => Ok(ThinkingExtent::Medium),
            "high" => Ok(ThinkingExtent::High),
            "heavy" => Ok(ThinkingExtent::Heavy),
            other => Err(format!("unknown thinking extent: {}", other)),
        }
    }
}

impl fmt::Display for ThinkingExtent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ThinkingExtent::Low => "low",
            ThinkingExtent::Medium => "medium",
            ThinkingExtent::High => "high",
            ThinkingExtent::Heavy => "heavy",
        };
        f.write_str(s)
    }
}

/// Numeric limits for one run, derived once from the thinking extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidencePolicy {
    pub chunk_chars: usize,
    pub chunk_overlap: usize,
    pub max_chunks_per_doc: usize,
    pub max_props_per_chunk: usize,
    pub max_props_per_doc: usize,
    pub max_claims: usize,
    pub max_evidence_per_claim: usize,
}

pub fn policy_for_extent(extent: &str) -> EvidencePolicy {
    ThinkingExtent::from_label(extent).policy()
}

impl Default for EvidencePolicy {
    fn default() -> Self {
        ThinkingExtent::Medium.policy()
    }
}
