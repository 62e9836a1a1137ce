//! Suite definitions
//!
//! A suite is a YAML (or JSON) mapping with suite-level defaults and a list
//! of cases. Definition problems are reported before any trial runs.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{EvidenceError, Result};

/// The pipeline stage a case exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    ExtractPropositions,
    ReduceClaims,
    AdjudicateEvidence,
    ExtractTrialStruct,
    MetaAnalysis,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::ExtractPropositions => "extract_propositions",
            Stage::ReduceClaims => "reduce_claims",
            Stage::AdjudicateEvidence => "adjudicate_evidence",
            Stage::ExtractTrialStruct => "extract_trial_struct",
            Stage::MetaAnalysis => "meta_analysis",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringSpec {
    /// Minimum trial score counted as a success.
    pub threshold: f64,
    /// Null-hypothesis success rate.
    pub p0: f64,
    pub alpha: f64,
    pub min_trials: u32,
}

impl Default for ScoringSpec {
    fn default() -> Self {
        Self {
            threshold: 1.0,
            p0: 0.8,
            alpha: 0.05,
            min_trials: 10,
        }
    }
}

/// Field-by-field override of a [`ScoringSpec`].
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
struct ScoringOverrides {
    threshold: Option<f64>,
    p0: Option<f64>,
    alpha: Option<f64>,
    min_trials: Option<u32>,
}

impl ScoringOverrides {
    fn resolve(&self, defaults: &ScoringSpec) -> ScoringSpec {
        ScoringSpec {
            threshold: self.threshold.unwrap_or(defaults.threshold),
            p0: self.p0.unwrap_or(defaults.p0),
            alpha: self.alpha.unwrap_or(defaults.alpha),
            min_trials: self.min_trials.unwrap_or(defaults.min_trials),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorSpec {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvalCase {
    pub case_id: String,
    pub stage: Stage,
    pub inputs: Map<String, Value>,
    pub validators: Vec<ValidatorSpec>,
    pub scoring: ScoringSpec,
    pub model: Option<String>,
    pub thinking_extent: Option<String>,
    pub temperature: Option<f64>,
    pub trials: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvalSuite {
    pub suite_id: String,
    pub description: String,
    pub trials: u32,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub temperature_profile: Option<Vec<f64>>,
    pub thinking_extent: Option<String>,
    pub fixtures_dir: Option<PathBuf>,
    pub scoring_defaults: ScoringSpec,
    pub cases: Vec<EvalCase>,
}

#[derive(Deserialize)]
struct RawSuite {
    suite_id: Option<String>,
    #[serde(default)]
    description: String,
    trials: Option<u32>,
    model: Option<String>,
    temperature: Option<f64>,
    temperature_profile: Option<Vec<f64>>,
    thinking_extent: Option<String>,
    fixtures_dir: Option<String>,
    #[serde(default)]
    scoring: ScoringOverrides,
    #[serde(default)]
    cases: Vec<RawCase>,
}

#[derive(Deserialize)]
struct RawCase {
    #[serde(default = "default_case_id")]
    case_id: String,
    #[serde(default)]
    stage: Stage,
    #[serde(default)]
    inputs: Map<String, Value>,
    #[serde(default)]
    validators: Vec<ValidatorSpec>,
    #[serde(default)]
    scoring: ScoringOverrides,
    model: Option<String>,
    thinking_extent: Option<String>,
    temperature: Option<f64>,
    trials: Option<u32>,
}

fn default_case_id() -> String {
    "case".to_string()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

pub fn load_suite(path: impl AsRef<Path>) -> Result<EvalSuite> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "suite".to_string());
    parse_suite(&content, &stem)
}

/// Parses suite text. `default_id` is used when the suite names no `suite_id`.
pub fn parse_suite(content: &str, default_id: &str) -> Result<EvalSuite> {
    // JSON is a subset of YAML as far as suites are concerned
    let value: serde_yaml::Value = serde_yaml::from_str(content)?;
    let Some(mapping) = value.as_mapping() else {
        return Err(EvidenceError::suite("suite root must be a mapping"));
    };
    if let Some(cases) = mapping.get("cases") {
        if !cases.is_sequence() && !cases.is_null() {
            return Err(EvidenceError::suite("suite cases must be a list"));
        }
    }

    let raw: RawSuite = serde_yaml::from_value(value).map_err(|e| EvidenceError::suite(e.to_string()))?;
    let scoring_defaults = raw.scoring.resolve(&ScoringSpec::default());

    let cases = raw
        .cases
        .into_iter()
        .map(|c| EvalCase {
            case_id: c.case_id,
            stage: c.stage,
            inputs: c.inputs,
            validators: c.validators,
            scoring: c.scoring.resolve(&scoring_defaults),
            model: non_blank(c.model),
            thinking_extent: non_blank(c.thinking_extent),
            temperature: c.temperature,
            trials: c.trials,
        })
        .collect();

    Ok(EvalSuite {
        suite_id: non_blank(raw.suite_id).unwrap_or_else(|| default_id.to_string()),
        description: raw.description,
        trials: raw.trials.unwrap_or(10),
        model: non_blank(raw.model),
        temperature: raw.temperature,
        temperature_profile: raw.temperature_profile.filter(|p| !p.is_empty()),
        thinking_extent: non_blank(raw.thinking_extent),
        fixtures_dir: non_blank(raw.fixtures_dir).map(PathBuf::from),
        scoring_defaults,
        cases,
    })
}

impl EvalSuite {
    /// Where relative `text_fixture` paths resolve, given the suite file path.
    pub fn resolve_fixtures_dir(&self, suite_path: &Path) -> PathBuf {
        let suite_dir = suite_path.parent().unwrap_or_else(|| Path::new("."));
        match &self.fixtures_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => suite_dir.join(dir),
            None if suite_dir.file_name().is_some_and(|n| n == "suites") => {
                suite_dir.parent().unwrap_or(suite_dir).join("fixtures")
            }
            None => suite_dir.join("fixtures"),
        }
    }

    /// Temperatures to run a case at, in order.
    pub fn resolve_temperatures(&self, case: &EvalCase, override_temperature: Option<f64>) -> Vec<f64> {
        if let Some(t) = override_temperature {
            return vec![t];
        }
        if let Some(t) = case.temperature {
            return vec![t];
        }
        if let Some(profile) = &self.temperature_profile {
            return profile.clone();
        }
        vec![self.temperature.unwrap_or(0.1)]
    }

    /// Override, then case, then suite. Zero counts as unset.
    pub fn resolve_trials(&self, case: &EvalCase, override_trials: Option<u32>) -> u32 {
        override_trials
            .filter(|&n| n > 0)
            .or(case.trials.filter(|&n| n > 0))
            .unwrap_or(self.trials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUITE: &str = r#"
suite_id: water
description: Boiling point claims
trials: 4
temperature_profile: [0.0, 0.7]
scoring:
  p0: 0.5
cases:
  - case_id: extract
    stage: extract_propositions
    inputs:
      documents:
        - doc_id: d1
          text: Water boils at 100 C.
    validators:
      - kind: list_len_at_least
        params: {path: propositions, min_len: 1}
  - case_id: adjudicate
    stage: adjudicate_evidence
    temperature: 0.3
    trials: 2
    scoring:
      threshold: 0.5
    validators:
      - kind: path_exists
        params: {path: labels}
        weight: 2
"#;

    #[test]
    fn test_parse_suite() {
        let suite = parse_suite(SUITE, "fallback").unwrap();
        assert_eq!(suite.suite_id, "water");
        assert_eq!(suite.trials, 4);
        assert_eq!(suite.cases.len(), 2);
        assert_eq!(suite.cases[0].stage, Stage::ExtractPropositions);
        assert_eq!(suite.cases[0].validators[0].weight, 1.0);
        assert_eq!(suite.cases[1].validators[0].weight, 2.0);
    }

    #[test]
    fn test_scoring_overrides_merge_field_by_field() {
        let suite = parse_suite(SUITE, "fallback").unwrap();
        assert_eq!(
            suite.cases[0].scoring,
            ScoringSpec { threshold: 1.0, p0: 0.5, alpha: 0.05, min_trials: 10 }
        );
        assert_eq!(suite.cases[1].scoring.threshold, 0.5);
        assert_eq!(suite.cases[1].scoring.p0, 0.5);
    }

    #[test]
    fn test_resolution_order() {
        let suite = parse_suite(SUITE, "fallback").unwrap();
        let (first, second) = (&suite.cases[0], &suite.cases[1]);

        assert_eq!(suite.resolve_temperatures(first, None), vec![0.0, 0.7]);
        assert_eq!(suite.resolve_temperatures(second, None), vec![0.3]);
        assert_eq!(suite.resolve_temperatures(second, Some(1.0)), vec![1.0]);

        assert_eq!(suite.resolve_trials(first, None), 4);
        assert_eq!(suite.resolve_trials(second, None), 2);
        assert_eq!(suite.resolve_trials(second, Some(7)), 7);
    }

    #[test]
    fn test_zero_trials_fall_through() {
        let suite = parse_suite(SUITE, "fallback").unwrap();
        let second = &suite.cases[1];
        assert_eq!(suite.resolve_trials(second, Some(0)), 2);

        let mut unset = second.clone();
        unset.trials = Some(0);
        assert_eq!(suite.resolve_trials(&unset, Some(0)), 4);
    }

    #[test]
    fn test_defaults_and_json_input() {
        let suite = parse_suite(r#"{"cases": [{"validators": []}]}"#, "from_stem").unwrap();
        assert_eq!(suite.suite_id, "from_stem");
        assert_eq!(suite.trials, 10);
        assert_eq!(suite.cases[0].case_id, "case");
        assert_eq!(suite.cases[0].scoring, ScoringSpec::default());
        assert_eq!(suite.resolve_temperatures(&suite.cases[0], None), vec![0.1]);
    }

    #[test]
    fn test_unknown_stage_fails_fast() {
        let err = parse_suite("cases:\n  - case_id: x\n    stage: summarize\n", "s").unwrap_err();
        assert!(matches!(err, EvidenceError::SuiteDefinition(_)));
    }

    #[test]
    fn test_malformed_roots() {
        assert!(matches!(parse_suite("- a\n- b\n", "s"), Err(EvidenceError::SuiteDefinition(_))));
        assert!(matches!(parse_suite("cases: {a: 1}\n", "s"), Err(EvidenceError::SuiteDefinition(_))));
    }

    #[test]
    fn test_fixtures_dir_resolution() {
        let suite = parse_suite("cases: []", "s").unwrap();
        assert_eq!(
            suite.resolve_fixtures_dir(Path::new("evals/suites/water.yaml")),
            PathBuf::from("evals/fixtures")
        );
        assert_eq!(
            suite.resolve_fixtures_dir(Path::new("evals/water.yaml")),
            PathBuf::from("evals/fixtures")
        );

        let custom = parse_suite("fixtures_dir: data\ncases: []", "s").unwrap();
        assert_eq!(
            custom.resolve_fixtures_dir(Path::new("evals/suites/water.yaml")),
            PathBuf::from("evals/suites/data")
        );
    }
}
