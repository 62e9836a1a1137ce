//! On-disk run artifacts: one JSON file per trial plus `summary.json`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

use super::cases::Stage;
use super::validators::ValidationResult;
use crate::error::Result;
use crate::llm::RecordedCall;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialArtifact {
    pub case_id: String,
    pub trial: u32,
    pub stage: Stage,
    pub temperature: f64,
    pub payload: Value,
    pub errors: Vec<String>,
    pub validation: Vec<ValidationResult>,
    pub score: Option<f64>,
    pub passed: bool,
    pub skipped: bool,
    pub raw_calls: Vec<RecordedCall>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialDetail {
    pub trial: u32,
    pub score: Option<f64>,
    pub passed: bool,
    pub skipped: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseSummary {
    pub case_id: String,
    pub stage: Stage,
    pub temperature: f64,
    pub passed: bool,
    /// Fewer scored trials than `min_trials`; no test was run.
    pub inconclusive: bool,
    pub p_value: Option<f64>,
    pub pass_rate: f64,
    pub pass_rate_ci: (f64, f64),
    pub k: u32,
    pub n: u32,
    pub skipped: u32,
    pub score_threshold: f64,
    pub p0: f64,
    pub alpha: f64,
    pub min_trials: u32,
    pub model_choice: String,
    pub model_name: String,
    pub details: Vec<TrialDetail>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteSummary {
    pub suite_id: String,
    pub description: String,
    pub suite_trials: u32,
    pub trials_override: Option<u32>,
    pub temperature_override: Option<f64>,
    pub generated_at: DateTime<Utc>,
    pub cases: Vec<CaseSummary>,
}

/// `{case_id}_t{temperature}` with the shortest float rendering (`0.1`, `1`).
pub fn case_key(case_id: &str, temperature: f64) -> String {
    format!("{}_t{}", case_id, temperature)
}

pub fn write_trial(run_dir: &Path, case_key: &str, artifact: &TrialArtifact) -> Result<PathBuf> {
    let case_dir = run_dir.join("cases").join(case_key);
    std::fs::create_dir_all(&case_dir)?;
    let path = case_dir.join(format!("trial_{:03}.json", artifact.trial));
    std::fs::write(&path, serde_json::to_string_pretty(artifact)?)?;
    Ok(path)
}

pub fn write_summary(run_dir: &Path, summary: &SuiteSummary) -> Result<PathBuf> {
    std::fs::create_dir_all(run_dir)?;
    let path = run_dir.join("summary.json");
    std::fs::write(&path, serde_json::to_string_pretty(summary)?)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_case_key_rendering() {
        assert_eq!(case_key("boil", 0.1), "boil_t0.1");
        assert_eq!(case_key("boil", 1.0), "boil_t1");
        assert_eq!(case_key("boil", 0.0), "boil_t0");
    }

    #[test]
    fn test_write_trial_layout() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = TrialArtifact {
            case_id: "boil".into(),
            trial: 7,
            stage: Stage::MetaAnalysis,
            temperature: 0.1,
            payload: json!({"status": "ok"}),
            errors: vec![],
            validation: vec![],
            score: None,
            passed: false,
            skipped: true,
            raw_calls: vec![],
        };
        let path = write_trial(dir.path(), "boil_t0.1", &artifact).unwrap();
        assert!(path.ends_with("cases/boil_t0.1/trial_007.json"));

        let written: Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(written["stage"], "meta_analysis");
        assert_eq!(written["score"], Value::Null);
    }
}
