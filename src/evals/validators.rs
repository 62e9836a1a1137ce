//! Rule validators
//!
//! Each validator inspects a stage payload through a path expression and
//! returns a weighted verdict. Misconfigured validators fail with a message
//! naming the problem; they never abort the trial.

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

use super::cases::ValidatorSpec;
use super::path::{as_text, expand_path, has_value, to_f64};
use crate::error::EvidenceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorKind {
    PathExists,
    PathRegex,
    PathEquals,
    PathIn,
    PathNumericRange,
    PathAbsDiff,
    ListLenAtLeast,
    RequiredPaths,
    LlmJudge,
}

impl FromStr for ValidatorKind {
    type Err = EvidenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "path_exists" => Ok(ValidatorKind::PathExists),
            "path_regex" => Ok(ValidatorKind::PathRegex),
            "path_equals" => Ok(ValidatorKind::PathEquals),
            "path_in" => Ok(ValidatorKind::PathIn),
            "path_numeric_range" => Ok(ValidatorKind::PathNumericRange),
            "path_abs_diff" => Ok(ValidatorKind::PathAbsDiff),
            "list_len_at_least" => Ok(ValidatorKind::ListLenAtLeast),
            "required_paths" => Ok(ValidatorKind::RequiredPaths),
            "llm_judge" => Ok(ValidatorKind::LlmJudge),
            other => Err(EvidenceError::UnknownValidator(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub kind: String,
    pub passed: bool,
    pub weight: f64,
    pub message: String,
    #[serde(default)]
    pub skipped: bool,
}

impl ValidationResult {
    pub fn new(kind: &str, passed: bool, weight: f64, message: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            passed,
            weight,
            message: message.into(),
            skipped: false,
        }
    }

    pub fn skipped(kind: &str, weight: f64, message: impl Into<String>) -> Self {
        Self {
            skipped: true,
            ..Self::new(kind, false, weight, message)
        }
    }
}

/// Runs a rule validator. `llm_judge` specs are handled by the judge; passed
/// here they come back skipped.
pub fn validate(payload: &Value, spec: &ValidatorSpec) -> ValidationResult {
    let kind = match spec.kind.parse::<ValidatorKind>() {
        Ok(kind) => kind,
        Err(e) => return ValidationResult::new(&spec.kind, false, spec.weight, e.to_string()),
    };
    let params = &spec.params;
    let weight = spec.weight;

    let outcome = match kind {
        ValidatorKind::PathExists => path_exists(payload, params),
        ValidatorKind::PathRegex => path_regex(payload, params),
        ValidatorKind::PathEquals => path_equals(payload, params),
        ValidatorKind::PathIn => path_in(payload, params),
        ValidatorKind::PathNumericRange => path_numeric_range(payload, params),
        ValidatorKind::PathAbsDiff => path_abs_diff(payload, params),
        ValidatorKind::ListLenAtLeast => list_len_at_least(payload, params),
        ValidatorKind::RequiredPaths => required_paths(payload, params),
        ValidatorKind::LlmJudge => return ValidationResult::skipped(&spec.kind, weight, "llm judge disabled"),
    };

    match outcome {
        Ok((passed, message)) => ValidationResult::new(&spec.kind, passed, weight, message),
        Err(problem) => ValidationResult::new(&spec.kind, false, weight, format!("invalid params: {}", problem)),
    }
}

type Outcome = std::result::Result<(bool, String), String>;

fn path_param(params: &Map<String, Value>) -> String {
    params.get("path").map(as_text).unwrap_or_default()
}

fn usize_param(params: &Map<String, Value>, key: &str, default: usize) -> std::result::Result<usize, String> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(v) => to_f64(v)
            .filter(|n| *n >= 0.0 && n.fract() == 0.0)
            .map(|n| n as usize)
            .ok_or_else(|| format!("{} must be a non-negative integer", key)),
    }
}

fn optional_number(params: &Map<String, Value>, key: &str) -> std::result::Result<Option<f64>, String> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => to_f64(v).map(Some).ok_or_else(|| format!("{} must be numeric", key)),
    }
}

fn values_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => actual == expected,
    }
}

fn path_exists(payload: &Value, params: &Map<String, Value>) -> Outcome {
    let path = path_param(params);
    let passed = expand_path(payload, &path).into_iter().any(has_value);
    Ok((passed, format!("path={}", path)))
}

fn path_regex(payload: &Value, params: &Map<String, Value>) -> Outcome {
    let path = path_param(params);
    let pattern = params.get("pattern").map(as_text).unwrap_or_default();
    let min_matches = usize_param(params, "min_matches", 1)?;
    let case_insensitive = params
        .get("case_insensitive")
        .and_then(Value::as_bool)
        .unwrap_or(true);

    let re = RegexBuilder::new(&pattern)
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|e| format!("bad pattern {:?}: {}", pattern, e))?;

    let matches = expand_path(payload, &path)
        .into_iter()
        .filter(|v| re.is_match(&as_text(v)))
        .count();
    Ok((
        matches >= min_matches,
        format!("path={} pattern={} matches={}", path, pattern, matches),
    ))
}

fn path_equals(payload: &Value, params: &Map<String, Value>) -> Outcome {
    let path = path_param(params);
    let expected = params.get("value").cloned().unwrap_or(Value::Null);
    let passed = expand_path(payload, &path)
        .into_iter()
        .any(|v| values_equal(v, &expected));
    Ok((passed, format!("path={} expected={}", path, expected)))
}

fn path_in(payload: &Value, params: &Map<String, Value>) -> Outcome {
    let path = path_param(params);
    let expected = match params.get("values") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.clone(),
        Some(scalar) => vec![scalar.clone()],
    };
    let passed = expand_path(payload, &path)
        .into_iter()
        .any(|v| expected.iter().any(|e| values_equal(v, e)));
    Ok((passed, format!("path={}", path)))
}

fn path_numeric_range(payload: &Value, params: &Map<String, Value>) -> Outcome {
    let path = path_param(params);
    let min = optional_number(params, "min")?;
    let max = optional_number(params, "max")?;

    let passed = expand_path(payload, &path)
        .into_iter()
        .filter_map(to_f64)
        .any(|n| min.map_or(true, |lo| n >= lo) && max.map_or(true, |hi| n <= hi));
    Ok((passed, format!("path={}", path)))
}

fn path_abs_diff(payload: &Value, params: &Map<String, Value>) -> Outcome {
    let path = path_param(params);
    let target = params.get("target").and_then(to_f64);
    let tolerance = params.get("tolerance").and_then(to_f64);
    let (Some(target), Some(tolerance)) = (target, tolerance) else {
        return Err("missing target/tolerance".to_string());
    };

    let passed = expand_path(payload, &path)
        .into_iter()
        .filter_map(to_f64)
        .any(|n| (n - target).abs() <= tolerance);
    Ok((passed, format!("path={}", path)))
}

fn list_len_at_least(payload: &Value, params: &Map<String, Value>) -> Outcome {
    let path = path_param(params);
    let min_len = usize_param(params, "min_len", 1)?;
    let length = expand_path(payload, &path)
        .first()
        .and_then(|v| v.as_array())
        .map_or(0, Vec::len);
    Ok((length >= min_len, format!("path={} len={}", path, length)))
}

fn required_paths(payload: &Value, params: &Map<String, Value>) -> Outcome {
    let Some(paths) = params.get("paths").and_then(Value::as_array) else {
        return Err("paths must be list".to_string());
    };
    let missing: Vec<String> = paths
        .iter()
        .map(as_text)
        .filter(|p| !expand_path(payload, p).into_iter().any(has_value))
        .collect();
    Ok((missing.is_empty(), format!("missing={:?}", missing)))
}
