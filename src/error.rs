//! Error taxonomy for the evidence pipeline and the evaluation harness.
//!
//! Parse failures of model output never surface here: they degrade to empty
//! output inside the stage that saw them. What remains is fatal for the
//! current call (transport), or a definition problem caught before any trial
//! runs.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EvidenceError {
    /// The text-generation endpoint was unreachable or answered with garbage.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid suite definition: {0}")]
    SuiteDefinition(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown validator kind: {0}")]
    UnknownValidator(String),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("background task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl EvidenceError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn suite(msg: impl Into<String>) -> Self {
        Self::SuiteDefinition(msg.into())
    }

    /// Whether the error should abort the whole evaluation run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::UnknownValidator(_))
    }
}

pub type Result<T> = std::result::Result<T, EvidenceError>;
