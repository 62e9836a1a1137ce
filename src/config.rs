//! Application configuration
//!
//! YAML file with every field optional, then environment overrides for the
//! model endpoint.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{EvidenceError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub api_base: String,
    pub model_name: String,
    pub timeout_s: u64,
    pub api_key: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:8000/v1".to_string(),
            model_name: "flashresearch-4b-thinking".to_string(),
            timeout_s: 60,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub sqlite_path: PathBuf,
    pub runs_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("./data/agent.db"),
            runs_dir: PathBuf::from("./runs"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EvalConfig {
    /// Root under which `<suite_id>/<timestamp>` run directories are created.
    pub output_dir: PathBuf,
    pub llm_judge: bool,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("eval_runs"),
            llm_judge: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Default thinking extent when neither suite nor case names one.
    pub thinking_extent: String,
    pub model: ModelConfig,
    pub storage: StorageConfig,
    pub evals: EvalConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            thinking_extent: "medium".to_string(),
            model: ModelConfig::default(),
            storage: StorageConfig::default(),
            evals: EvalConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(EvidenceError::Config(format!("config file not found: {}", path.display())));
        }
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&content)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let value: serde_yaml::Value = serde_yaml::from_str(content)?;
        match value {
            serde_yaml::Value::Null => Ok(Self::default()),
            serde_yaml::Value::Mapping(_) => Ok(serde_yaml::from_value(value)?),
            _ => Err(EvidenceError::Config("config root must be a mapping".to_string())),
        }
    }

    /// `lookup` is `std::env::var` in production; tests pass a closure.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(api_base) = lookup("MODEL_API_BASE").filter(|v| !v.is_empty()) {
            self.model.api_base = api_base;
        }
        if let Some(model_name) = lookup("MODEL_NAME").filter(|v| !v.is_empty()) {
            self.model.model_name = model_name;
        }
        if let Some(timeout) = lookup("MODEL_TIMEOUT_S").filter(|v| !v.is_empty()) {
            self.model.timeout_s = timeout
                .trim()
                .parse()
                .map_err(|_| EvidenceError::Config("MODEL_TIMEOUT_S must be an integer".to_string()))?;
        }
        if let Some(key) = lookup("MODEL_API_KEY").filter(|v| !v.is_empty()) {
            self.model.api_key = Some(key);
        }
        Ok(())
    }
}
