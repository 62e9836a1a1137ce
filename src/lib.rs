//! Research Agency
//!
//! Evidence reduction for research questions, plus a statistical harness for
//! checking each stage under a non-deterministic model:
//! - Quote-grounded proposition extraction
//! - Canonical claim grouping and evidence merging
//! - Stance adjudication (supported / mixed / refuted / insufficient)
//! - Repeated-trial evaluation with binomial tests and meta-analysis

pub mod config;
pub mod error;
pub mod evals;
pub mod evidence;
pub mod llm;
pub mod logging;
pub mod trace;
pub mod types;

// Re-exports for convenience
pub use config::AppConfig;
pub use error::{EvidenceError, Result};
pub use evals::EvalRunner;
pub use evidence::{reduce_evidence, EvidenceReducer, EvidenceStore, ThinkingExtent};
pub use llm::LLMProvider;
