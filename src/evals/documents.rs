//! Fixture documents
//!
//! Case inputs describe documents inline or point at a fixture file (plain
//! text, HTML or PDF) relative to the suite's fixtures directory.

use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::error::{EvidenceError, Result};
use crate::types::Document;

/// Document fields accept any scalar (`doc_id: 7` reads as `"7"`); null
/// means the field's default.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentInput {
    #[serde(default = "default_doc_id", deserialize_with = "doc_id_text")]
    pub doc_id: String,
    #[serde(default, deserialize_with = "scalar_text")]
    pub title: String,
    #[serde(default, deserialize_with = "scalar_text")]
    pub url: String,
    #[serde(default, deserialize_with = "scalar_text")]
    pub snippet: String,
    #[serde(default, deserialize_with = "scalar_text")]
    pub text: String,
    #[serde(default, deserialize_with = "optional_text")]
    pub text_fixture: Option<String>,
    #[serde(default = "default_content_type", deserialize_with = "content_type_text")]
    pub content_type: String,
    #[serde(default, deserialize_with = "optional_text")]
    pub format: Option<String>,
}

fn default_doc_id() -> String {
    "doc".to_string()
}

fn default_content_type() -> String {
    "text/plain".to_string()
}

fn optional_text<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

fn scalar_text<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    Ok(optional_text(deserializer)?.unwrap_or_default())
}

fn doc_id_text<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    Ok(optional_text(deserializer)?.unwrap_or_else(default_doc_id))
}

fn content_type_text<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    Ok(optional_text(deserializer)?.unwrap_or_else(default_content_type))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FixtureFormat {
    Pdf,
    Html,
    Text,
}

impl FixtureFormat {
    fn detect(path: &Path, hint: Option<&str>) -> Self {
        let hint = hint.map(|h| h.trim().to_lowercase());
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match (hint.as_deref(), ext.as_str()) {
            (Some("pdf"), _) | (_, "pdf") => FixtureFormat::Pdf,
            (Some("html"), _) | (_, "html") | (_, "htm") => FixtureFormat::Html,
            _ => FixtureFormat::Text,
        }
    }
}

/// Builds the `documents` list of a case. Non-object entries are ignored.
pub fn load_documents(inputs: &serde_json::Map<String, Value>, fixtures_dir: &Path) -> Result<Vec<Document>> {
    let Some(Value::Array(entries)) = inputs.get("documents") else {
        return Ok(Vec::new());
    };
    entries
        .iter()
        .filter(|e| e.is_object())
        .map(|e| {
            let input: DocumentInput = serde_json::from_value(e.clone())
                .map_err(|err| EvidenceError::suite(format!("bad document input: {}", err)))?;
            load_document(&input, fixtures_dir)
        })
        .collect()
}

pub fn load_document(input: &DocumentInput, fixtures_dir: &Path) -> Result<Document> {
    let mut text = input.text.clone();
    let mut content_type = input.content_type.clone();

    if let Some(fixture) = input.text_fixture.as_deref().filter(|f| !f.is_empty()) {
        let path = resolve_fixture(fixture, fixtures_dir);
        match FixtureFormat::detect(&path, input.format.as_deref()) {
            FixtureFormat::Pdf => {
                text = extract_pdf_text(&std::fs::read(&path)?);
                content_type = "application/pdf".to_string();
            }
            FixtureFormat::Html => {
                text = extract_html_text(&std::fs::read_to_string(&path)?);
                content_type = "text/html".to_string();
            }
            FixtureFormat::Text => {
                text = std::fs::read_to_string(&path)?;
                content_type = "text/plain".to_string();
            }
        }
        debug!("Loaded fixture {:?} ({} chars)", path, text.chars().count());
    }

    let mut doc = Document::new(input.doc_id.clone(), input.url.clone(), input.title.clone(), text);
    doc.snippet = input.snippet.clone();
    doc.content_type = content_type;
    doc.content_hash = content_hash(&doc.text);
    Ok(doc)
}

fn resolve_fixture(fixture: &str, fixtures_dir: &Path) -> PathBuf {
    let path = PathBuf::from(fixture);
    if path.is_absolute() {
        path
    } else {
        fixtures_dir.join(path)
    }
}

pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Visible text of an HTML page: scripts and styles dropped, tags removed,
/// entities decoded, text runs joined by single spaces.
pub fn extract_html_text(html: &str) -> String {
    static BLOCKS: OnceLock<Regex> = OnceLock::new();
    static TAGS: OnceLock<Regex> = OnceLock::new();
    let blocks = BLOCKS.get_or_init(|| {
        Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>|<!--.*?-->").expect("valid block pattern")
    });
    let tags = TAGS.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("valid tag pattern"));

    let without_blocks = blocks.replace_all(html, " ");
    let without_tags = tags.replace_all(&without_blocks, " ");
    let decoded = html_escape::decode_html_entities(&without_tags);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Text of every page. Unreadable PDFs yield empty text.
pub fn extract_pdf_text(bytes: &[u8]) -> String {
    match pdf_extract::extract_text_from_mem(bytes) {
        Ok(text) => text,
        Err(e) => {
            warn!("PDF extraction failed: {}", e);
            String::new()
        }
    }
}
