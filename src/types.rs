//! Core data model shared by the evidence pipeline and the evaluation harness.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A retrieved document, produced by fetch/parse collaborators.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub doc_id: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub content_hash: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default = "Utc::now")]
    pub retrieved_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<u32>,
}

fn default_content_type() -> String {
    "text/plain".to_string()
}

impl Document {
    /// Minimal constructor with the fields the core actually needs.
    pub fn new(
        doc_id: impl Into<String>,
        url: impl Into<String>,
        title: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            doc_id: doc_id.into(),
            url: url.into(),
            title: title.into(),
            snippet: String::new(),
            text: text.into(),
            content_hash: String::new(),
            content_type: default_content_type(),
            retrieved_at: Utc::now(),
            engine: None,
            rank: None,
        }
    }
}

/// W3C-style text quote selector locating a quote inside a document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnnotationSelector {
    #[serde(rename = "type")]
    pub kind: String,
    pub exact: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
    /// Character offset of the first quote character.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<usize>,
    /// Character offset one past the last quote character.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<usize>,
}

impl AnnotationSelector {
    pub const TEXT_QUOTE: &'static str = "TextQuoteSelector";

    pub fn exact(quote: impl Into<String>) -> Self {
        Self {
            kind: Self::TEXT_QUOTE.to_string(),
            exact: quote.into(),
            prefix: None,
            suffix: None,
            start: None,
            end: None,
        }
    }

    pub fn is_located(&self) -> bool {
        self.start.is_some() && self.end.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Annotation {
    pub doc_id: String,
    pub selector: AnnotationSelector,
    pub quote: String,
    pub context: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropositionType {
    Effect,
    Presence,
    Fact,
}

impl PropositionType {
    /// Case-insensitive match, falling back to `Fact`.
    pub fn normalize(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "effect" => PropositionType::Effect,
            "presence" => PropositionType::Presence,
            _ => PropositionType::Fact,
        }
    }
}

impl fmt::Display for PropositionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PropositionType::Effect => "Effect",
            PropositionType::Presence => "Presence",
            PropositionType::Fact => "Fact",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PropositionPayload {
    pub claim_text: String,
    pub quote: String,
    pub claim_type: PropositionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_signature: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PropositionQuality {
    pub model: String,
    pub chunk_chars: usize,
}

/// One atomic, quote-grounded claim extracted from a single document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Proposition {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: PropositionType,
    pub payload: PropositionPayload,
    pub anchors: Vec<Annotation>,
    pub doc_id: String,
    pub quality: PropositionQuality,
    pub extracted_at: DateTime<Utc>,
}

impl Proposition {
    pub fn signature(&self) -> Option<&str> {
        self.payload
            .claim_signature
            .as_deref()
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimDomain {
    Clinical,
    Flavor,
    General,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stance {
    Supported,
    Mixed,
    Refuted,
    Insufficient,
}

impl Stance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stance::Supported => "supported",
            Stance::Mixed => "mixed",
            Stance::Refuted => "refuted",
            Stance::Insufficient => "insufficient",
        }
    }
}

impl fmt::Display for Stance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stance of a single evidence item toward its claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceLabel {
    Support,
    Refute,
    #[default]
    Neutral,
}

impl EvidenceLabel {
    /// Parses a label exactly as the labeling prompt spells it (after trimming
    /// and case folding). Anything else is `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "support" => Some(EvidenceLabel::Support),
            "refute" => Some(EvidenceLabel::Refute),
            "neutral" => Some(EvidenceLabel::Neutral),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceLabel::Support => "support",
            EvidenceLabel::Refute => "refute",
            EvidenceLabel::Neutral => "neutral",
        }
    }
}

/// A quote backing a claim, resolved against its source document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EvidenceItem {
    pub doc_id: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub quote: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LabeledEvidence {
    #[serde(flatten)]
    pub item: EvidenceItem,
    pub label: EvidenceLabel,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct LabelCounts {
    pub support: usize,
    pub refute: usize,
    pub neutral: usize,
}

impl LabelCounts {
    pub fn tally(&mut self, label: EvidenceLabel) {
        match label {
            EvidenceLabel::Support => self.support += 1,
            EvidenceLabel::Refute => self.refute += 1,
            EvidenceLabel::Neutral => self.neutral += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.support + self.refute + self.neutral
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MergeSummary {
    pub counts: LabelCounts,
    pub evidence: Vec<LabeledEvidence>,
    pub canonical_text: String,
}

/// Every proposition that normalizes to the same claim, with its verdict.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClaimGroup {
    pub signature: String,
    pub claim_text: String,
    pub domain: ClaimDomain,
    /// Proposition ids; the propositions themselves are owned by the run.
    pub propositions: Vec<String>,
    pub merge: MergeSummary,
    pub stance: Stance,
    pub rationale: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proposition_type_normalize() {
        assert_eq!(PropositionType::normalize("effect"), PropositionType::Effect);
        assert_eq!(PropositionType::normalize(" PRESENCE "), PropositionType::Presence);
        assert_eq!(PropositionType::normalize("opinion"), PropositionType::Fact);
        assert_eq!(PropositionType::normalize(""), PropositionType::Fact);
    }

    #[test]
    fn test_evidence_label_parse() {
        assert_eq!(EvidenceLabel::parse(" Support"), Some(EvidenceLabel::Support));
        assert_eq!(EvidenceLabel::parse("REFUTE"), Some(EvidenceLabel::Refute));
        assert_eq!(EvidenceLabel::parse("contradicts"), None);
    }

    #[test]
    fn test_labeled_evidence_serializes_flat() {
        let labeled = LabeledEvidence {
            item: EvidenceItem {
                doc_id: "d1".into(),
                url: "http://x".into(),
                title: "T".into(),
                quote: "q".into(),
            },
            label: EvidenceLabel::Refute,
        };
        let v = serde_json::to_value(&labeled).unwrap();
        assert_eq!(v["doc_id"], "d1");
        assert_eq!(v["label"], "refute");
    }

    #[test]
    fn test_selector_skips_missing_offsets() {
        let v = serde_json::to_value(AnnotationSelector::exact("boils")).unwrap();
        assert_eq!(v["type"], "TextQuoteSelector");
        assert!(v.get("start").is_none());
    }
}
