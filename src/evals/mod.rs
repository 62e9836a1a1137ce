//! Statistical Evaluation Harness
//!
//! Suites of cases, each run for N trials per temperature against one
//! pipeline stage, validated by rules or a model judge, and decided by a
//! binomial hypothesis test.

pub mod artifacts;
pub mod cases;
pub mod documents;
pub mod judge;
pub mod path;
pub mod runner;
pub mod stages;
pub mod stats;
pub mod validators;

pub use artifacts::{case_key, CaseSummary, SuiteSummary, TrialArtifact, TrialDetail};
pub use cases::{load_suite, parse_suite, EvalCase, EvalSuite, ScoringSpec, Stage, ValidatorSpec};
pub use judge::LlmJudge;
pub use path::expand_path;
pub use runner::{decide_case, score_validation, CaseVerdict, EvalOptions, EvalRunner, TrialOutcome};
pub use stages::{run_stage, StageContext, StageResult};
pub use stats::{binomial_tail_p_value, fixed_effect_meta, wilson_interval, MetaAnalysis, MetaStatus};
pub use validators::{validate, ValidationResult, ValidatorKind};
