//! Content trace
//!
//! `tracing` carries the human-readable stage progress; claim text, parse
//! failures and other bulky content go to a [`TraceSink`] that callers hand
//! to each component explicitly.

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

use crate::error::Result;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEvent {
    PropositionsExtracted {
        doc_id: String,
        propositions: Vec<Value>,
    },
    ParseFailed {
        stage: String,
        subject: String,
        detail: String,
    },
    ClaimAdjudicated {
        signature: String,
        claim_text: String,
        stance: String,
        counts: Value,
    },
    TrialCompleted {
        case_key: String,
        trial: u32,
        model_calls: usize,
        score: Option<f64>,
        outcome: String,
    },
}

impl TraceEvent {
    pub fn parse_failed(stage: &str, subject: &str, detail: impl Into<String>) -> Self {
        TraceEvent::ParseFailed {
            stage: stage.to_string(),
            subject: subject.to_string(),
            detail: detail.into(),
        }
    }
}

pub trait TraceSink: Send + Sync {
    fn record(&self, event: &TraceEvent);
}

/// Drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTraceSink;

impl TraceSink for NullTraceSink {
    fn record(&self, _event: &TraceEvent) {}
}

/// Keeps events in memory; the harness uses it to turn parse failures into
/// trial-local errors.
#[derive(Debug, Default)]
pub struct MemoryTraceSink {
    events: Mutex<Vec<TraceEvent>>,
}

impl MemoryTraceSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// `parse_failed:<stage>:<subject>` strings for every recorded parse failure.
    pub fn parse_errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                TraceEvent::ParseFailed { stage, subject, .. } => {
                    Some(format!("parse_failed:{}:{}", stage, subject))
                }
                _ => None,
            })
            .collect()
    }
}

impl TraceSink for MemoryTraceSink {
    fn record(&self, event: &TraceEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Appends one JSON object per event to `trace.jsonl`.
pub struct JsonlTraceSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlTraceSink {
    pub fn create(run_dir: impl AsRef<Path>) -> Result<Self> {
        let dir = run_dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let path = dir.join("trace.jsonl");
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file: Mutex::new(file) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TraceSink for JsonlTraceSink {
    fn record(&self, event: &TraceEvent) {
        let mut record = json!({ "ts": Utc::now().to_rfc3339() });
        if let (Some(obj), Ok(Value::Object(fields))) = (record.as_object_mut(), serde_json::to_value(event)) {
            obj.extend(fields);
        }

        let Ok(mut file) = self.file.lock() else { return };
        if let Err(e) = writeln!(file, "{}", record).and_then(|_| file.flush()) {
            warn!("Failed to write trace event to {:?}: {}", self.path, e);
        }
    }
}

/// Fans one event out to several sinks.
pub struct TeeTraceSink<'a> {
    sinks: Vec<&'a dyn TraceSink>,
}

impl<'a> TeeTraceSink<'a> {
    pub fn new(sinks: Vec<&'a dyn TraceSink>) -> Self {
        Self { sinks }
    }
}

impl TraceSink for TeeTraceSink<'_> {
    fn record(&self, event: &TraceEvent) {
        for sink in &self.sinks {
            sink.record(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_collects_parse_errors() {
        let sink = MemoryTraceSink::new();
        sink.record(&TraceEvent::parse_failed("extract", "doc1", "no array found"));
        sink.record(&TraceEvent::PropositionsExtracted { doc_id: "doc1".into(), propositions: vec![] });
        assert_eq!(sink.events().len(), 2);
        assert_eq!(sink.parse_errors(), vec!["parse_failed:extract:doc1".to_string()]);
    }

    #[test]
    fn test_jsonl_sink_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlTraceSink::create(dir.path()).unwrap();
        sink.record(&TraceEvent::parse_failed("adjudicate", "abc", "bad"));
        sink.record(&TraceEvent::parse_failed("adjudicate", "def", "bad"));

        let content = std::fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<Value> = content.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "parse_failed");
        assert_eq!(lines[1]["subject"], "def");
        assert!(lines[0]["ts"].is_string());
    }

    #[test]
    fn test_tee_reaches_every_sink() {
        let a = MemoryTraceSink::new();
        let b = MemoryTraceSink::new();
        let tee = TeeTraceSink::new(vec![&a, &b]);
        tee.record(&TraceEvent::parse_failed("s", "x", ""));
        assert_eq!(a.events().len(), 1);
        assert_eq!(b.events().len(), 1);
    }
}
