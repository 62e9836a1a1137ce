//! Evaluation Runner
//!
//! For each case and temperature: run N independent trials, validate and
//! score each one, then decide the case with a one-sided binomial test
//! against the null success rate `p0`.

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::artifacts::{
    case_key, write_summary, write_trial, CaseSummary, SuiteSummary, TrialArtifact, TrialDetail,
};
use super::cases::{load_suite, EvalCase, EvalSuite};
use super::documents::load_documents;
use super::judge::LlmJudge;
use super::stages::{run_stage, StageContext};
use super::stats::{binomial_tail_p_value, wilson_interval};
use super::validators::{validate, ValidationResult, ValidatorKind};
use crate::config::AppConfig;
use crate::error::{EvidenceError, Result};
use crate::evidence::ThinkingExtent;
use crate::llm::{LLMProvider, ModelRouter, RecordingProvider, RoutedModel};
use crate::trace::{JsonlTraceSink, TraceEvent, TraceSink};
use crate::types::Document;

/// Documents of every case, in case order.
fn load_case_documents(suite: &EvalSuite, fixtures_dir: &Path) -> Result<Vec<Vec<Document>>> {
    suite
        .cases
        .iter()
        .map(|case| {
            load_documents(&case.inputs, fixtures_dir)
                .map_err(|e| EvidenceError::suite(format!("case {}: {}", case.case_id, e)))
        })
        .collect()
}

/// How a single trial ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialOutcome {
    Passed,
    Failed,
    /// Every validator was skipped; the trial does not count toward `n`.
    Skipped,
}

impl TrialOutcome {
    pub fn from_score(score: Option<f64>, threshold: f64) -> Self {
        match score {
            None => TrialOutcome::Skipped,
            Some(s) if s >= threshold => TrialOutcome::Passed,
            Some(_) => TrialOutcome::Failed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrialOutcome::Passed => "passed",
            TrialOutcome::Failed => "failed",
            TrialOutcome::Skipped => "skipped",
        }
    }
}

/// Weighted share of passing non-skipped validators. `None` when nothing
/// (or zero weight) was scored.
pub fn score_validation(results: &[ValidationResult]) -> Option<f64> {
    let (earned, total) = results
        .iter()
        .filter(|r| !r.skipped)
        .fold((0.0, 0.0), |(earned, total), r| {
            (if r.passed { earned + r.weight } else { earned }, total + r.weight)
        });
    if total == 0.0 {
        None
    } else {
        Some(earned / total)
    }
}

/// Case verdict from `k` successes in `n` scored trials.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaseVerdict {
    pub passed: bool,
    pub inconclusive: bool,
    pub p_value: Option<f64>,
}

pub fn decide_case(k: u32, n: u32, p0: f64, alpha: f64, min_trials: u32) -> CaseVerdict {
    if n < min_trials {
        return CaseVerdict { passed: false, inconclusive: true, p_value: None };
    }
    let p = binomial_tail_p_value(n, k, p0);
    CaseVerdict { passed: p < alpha, inconclusive: false, p_value: Some(p) }
}

#[derive(Debug, Clone)]
pub struct EvalOptions {
    pub output_dir: PathBuf,
    pub trials_override: Option<u32>,
    pub model_override: Option<String>,
    pub temperature_override: Option<f64>,
    pub enable_llm_judge: bool,
    /// Used when neither case nor suite names a thinking extent.
    pub default_thinking_extent: String,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl EvalOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            output_dir: config.evals.output_dir.clone(),
            trials_override: None,
            model_override: None,
            temperature_override: None,
            enable_llm_judge: config.evals.llm_judge,
            default_thinking_extent: config.thinking_extent.clone(),
        }
    }

    pub fn with_trials(mut self, trials: Option<u32>) -> Self {
        self.trials_override = trials;
        self
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model_override = model;
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f64>) -> Self {
        self.temperature_override = temperature;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_llm_judge(mut self, enabled: bool) -> Self {
        self.enable_llm_judge = enabled;
        self
    }
}

pub struct EvalRunner<'a> {
    router: &'a dyn ModelRouter,
    options: EvalOptions,
}

impl<'a> EvalRunner<'a> {
    pub fn new(router: &'a dyn ModelRouter, options: EvalOptions) -> Self {
        Self { router, options }
    }

    /// `<output_dir>/<suite_id>/<UTC timestamp>`
    pub fn run_dir_for(&self, suite: &EvalSuite) -> PathBuf {
        self.options
            .output_dir
            .join(&suite.suite_id)
            .join(Utc::now().format("%Y%m%d_%H%M%S").to_string())
    }

    /// Loads, runs and summarizes a suite file. Returns the run directory.
    pub async fn run_suite(&self, suite_path: &Path) -> Result<PathBuf> {
        let suite = load_suite(suite_path)?;
        let fixtures_dir = suite.resolve_fixtures_dir(suite_path);
        let run_dir = self.run_dir_for(&suite);
        self.run_in(&suite, &fixtures_dir, &run_dir).await?;
        Ok(run_dir)
    }

    /// Runs every case of an already loaded suite, writing artifacts under
    /// `run_dir`. Every case's documents are loaded first; a missing fixture
    /// or malformed document fails the suite before anything is written.
    pub async fn run_in(&self, suite: &EvalSuite, fixtures_dir: &Path, run_dir: &Path) -> Result<SuiteSummary> {
        let documents = load_case_documents(suite, fixtures_dir)?;
        std::fs::create_dir_all(run_dir)?;
        let trace = JsonlTraceSink::create(run_dir)?;
        info!("🧪 Running suite '{}' ({} cases) into {:?}", suite.suite_id, suite.cases.len(), run_dir);

        let mut cases = Vec::new();
        for (case, case_documents) in suite.cases.iter().zip(&documents) {
            for temperature in suite.resolve_temperatures(case, self.options.temperature_override) {
                let summary = self
                    .run_case(suite, case, case_documents, temperature, run_dir, &trace)
                    .await?;
                cases.push(summary);
            }
        }

        let summary = SuiteSummary {
            suite_id: suite.suite_id.clone(),
            description: suite.description.clone(),
            suite_trials: suite.trials,
            trials_override: self.options.trials_override,
            temperature_override: self.options.temperature_override,
            generated_at: Utc::now(),
            cases,
        };
        write_summary(run_dir, &summary)?;

        let passed = summary.cases.iter().filter(|c| c.passed).count();
        info!("✅ Suite '{}' finished: {}/{} cases passed", suite.suite_id, passed, summary.cases.len());
        Ok(summary)
    }

    fn route(&self, suite: &EvalSuite, case: &EvalCase, extent: &str) -> Result<RoutedModel> {
        let model = self
            .options
            .model_override
            .as_deref()
            .or(case.model.as_deref())
            .or(suite.model.as_deref());
        self.router.route(extent, model)
    }

    async fn run_case(
        &self,
        suite: &EvalSuite,
        case: &EvalCase,
        documents: &[Document],
        temperature: f64,
        run_dir: &Path,
        trace: &dyn TraceSink,
    ) -> Result<CaseSummary> {
        let trials = suite.resolve_trials(case, self.options.trials_override);
        let extent_label = case
            .thinking_extent
            .as_deref()
            .or(suite.thinking_extent.as_deref())
            .unwrap_or(&self.options.default_thinking_extent);
        let extent = ThinkingExtent::from_label(extent_label);
        let routed = self.route(suite, case, extent_label)?;
        let key = case_key(&case.case_id, temperature);
        info!("▶️  Case {} ({}): {} trials on {}", key, case.stage, trials, routed.provider.model_name());

        let (mut successes, mut failures, mut skipped) = (0u32, 0u32, 0u32);
        let mut details = Vec::with_capacity(trials as usize);

        for trial in 1..=trials {
            let artifact = self
                .run_trial(case, documents, trial, temperature, extent, &routed.provider, trace)
                .await?;
            let outcome = TrialOutcome::from_score(artifact.score, case.scoring.threshold);
            match outcome {
                TrialOutcome::Passed => successes += 1,
                TrialOutcome::Failed => failures += 1,
                TrialOutcome::Skipped => skipped += 1,
            }
            debug!("Trial {}/{} of {}: {}", trial, trials, key, outcome.as_str());

            trace.record(&TraceEvent::TrialCompleted {
                case_key: key.clone(),
                trial,
                model_calls: artifact.raw_calls.len(),
                score: artifact.score,
                outcome: outcome.as_str().to_string(),
            });
            write_trial(run_dir, &key, &artifact)?;
            details.push(TrialDetail {
                trial,
                score: artifact.score,
                passed: artifact.passed,
                skipped: artifact.skipped,
            });
        }

        let n = successes + failures;
        let scoring = &case.scoring;
        let verdict = decide_case(successes, n, scoring.p0, scoring.alpha, scoring.min_trials);
        if verdict.inconclusive {
            warn!("Case {} is inconclusive: {} scored trials < min_trials {}", key, n, scoring.min_trials);
        }

        Ok(CaseSummary {
            case_id: case.case_id.clone(),
            stage: case.stage,
            temperature,
            passed: verdict.passed,
            inconclusive: verdict.inconclusive,
            p_value: verdict.p_value,
            pass_rate: if n > 0 { f64::from(successes) / f64::from(n) } else { 0.0 },
            pass_rate_ci: wilson_interval(successes, n),
            k: successes,
            n,
            skipped,
            score_threshold: scoring.threshold,
            p0: scoring.p0,
            alpha: scoring.alpha,
            min_trials: scoring.min_trials,
            model_choice: routed.name.clone(),
            model_name: routed.provider.model_name().to_string(),
            details,
        })
    }

    /// pending -> executed -> validated -> scored
    #[allow(clippy::too_many_arguments)]
    async fn run_trial(
        &self,
        case: &EvalCase,
        documents: &[Document],
        trial: u32,
        temperature: f64,
        extent: ThinkingExtent,
        provider: &Arc<dyn LLMProvider>,
        trace: &dyn TraceSink,
    ) -> Result<TrialArtifact> {
        let recording = RecordingProvider::new(provider.clone()).with_temperature(temperature);

        let ctx = StageContext {
            provider: &recording,
            thinking_extent: extent,
            temperature,
            trace,
        };
        let executed = run_stage(case.stage, &case.inputs, documents, &ctx).await?;

        let judge = if self.options.enable_llm_judge {
            LlmJudge::new(&recording)
        } else {
            LlmJudge::disabled()
        };
        let mut validation = Vec::with_capacity(case.validators.len());
        for spec in &case.validators {
            let result = match spec.kind.parse::<ValidatorKind>() {
                Ok(ValidatorKind::LlmJudge) => judge.validate(&executed.payload, &spec.params, spec.weight).await?,
                _ => validate(&executed.payload, spec),
            };
            validation.push(result);
        }

        let score = score_validation(&validation);
        let outcome = TrialOutcome::from_score(score, case.scoring.threshold);

        Ok(TrialArtifact {
            case_id: case.case_id.clone(),
            trial,
            stage: case.stage,
            temperature,
            payload: executed.payload,
            errors: executed.errors,
            validation,
            score,
            passed: outcome == TrialOutcome::Passed,
            skipped: outcome == TrialOutcome::Skipped,
            raw_calls: recording.calls().await,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(passed: bool, weight: f64, skipped: bool) -> ValidationResult {
        ValidationResult {
            kind: "path_exists".into(),
            passed,
            weight,
            message: String::new(),
            skipped,
        }
    }

    #[test]
    fn test_score_is_weighted_over_non_skipped() {
        let results = [result(true, 2.0, false), result(false, 1.0, false), result(false, 5.0, true)];
        let score = score_validation(&results).unwrap();
        assert!((score - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_all_skipped_or_weightless_has_no_score() {
        assert_eq!(score_validation(&[result(true, 1.0, true)]), None);
        assert_eq!(score_validation(&[result(true, 0.0, false)]), None);
        assert_eq!(score_validation(&[]), None);
    }

    #[test]
    fn test_trial_outcome_threshold() {
        assert_eq!(TrialOutcome::from_score(Some(1.0), 1.0), TrialOutcome::Passed);
        assert_eq!(TrialOutcome::from_score(Some(0.99), 1.0), TrialOutcome::Failed);
        assert_eq!(TrialOutcome::from_score(None, 0.0), TrialOutcome::Skipped);
    }

    #[test]
    fn test_decide_case() {
        let v = decide_case(18, 20, 0.8, 0.05, 10);
        assert!(!v.passed);
        assert!(!v.inconclusive);
        assert!((v.p_value.unwrap() - 0.2061).abs() < 1e-4);

        let v = decide_case(20, 20, 0.5, 0.05, 10);
        assert!(v.passed);

        let v = decide_case(5, 5, 0.5, 0.05, 10);
        assert!(v.inconclusive);
        assert!(!v.passed);
        assert_eq!(v.p_value, None);
    }
}
