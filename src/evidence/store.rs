//! Evidence Store
//!
//! Persists sources, annotations, propositions and claim groups so a run can
//! be audited later. Every write except annotations is an upsert keyed on the
//! natural id, so re-persisting a reduction is idempotent.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::task;
use tracing::{debug, info};

use super::reduce::ReduceResult;
use crate::error::Result;
use crate::types::{Annotation, ClaimGroup, Document, Proposition};

/// Row counts per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub sources: usize,
    pub annotations: usize,
    pub propositions: usize,
    pub claim_groups: usize,
    pub runs: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub question: String,
    pub created_at: DateTime<Utc>,
    pub mode: String,
    pub thinking_extent: String,
    pub status: String,
}

#[async_trait]
pub trait EvidenceStore: Send + Sync {
    async fn upsert_source(&self, doc: &Document) -> Result<()>;
    /// Append-only.
    async fn insert_annotation(&self, annotation: &Annotation) -> Result<()>;
    async fn upsert_proposition(&self, proposition: &Proposition) -> Result<()>;
    async fn upsert_claim_group(&self, group: &ClaimGroup) -> Result<()>;
    async fn record_run(&self, run: &RunRecord) -> Result<()>;
    async fn get_claim_group(&self, signature: &str) -> Result<Option<ClaimGroup>>;
    async fn stats(&self) -> Result<StoreStats>;

    /// Writes the documents, every proposition with its anchors, and every
    /// claim group of one reduction.
    async fn persist_reduction(&self, docs: &[Document], result: &ReduceResult) -> Result<()> {
        for doc in docs {
            self.upsert_source(doc).await?;
        }
        for prop in &result.propositions {
            self.upsert_proposition(prop).await?;
            for anchor in &prop.anchors {
                self.insert_annotation(anchor).await?;
            }
        }
        for group in &result.claim_groups {
            self.upsert_claim_group(group).await?;
        }
        info!(
            "💾 Persisted {} propositions and {} claim groups",
            result.propositions.len(),
            result.claim_groups.len()
        );
        Ok(())
    }
}

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS source_docs (
        id TEXT PRIMARY KEY,
        url TEXT NOT NULL,
        title TEXT,
        retrieved_at TEXT NOT NULL,
        content_hash TEXT,
        mime TEXT,
        engine TEXT,
        meta_json TEXT
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS annotations (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        doc_id TEXT NOT NULL,
        selector_json TEXT NOT NULL,
        quote TEXT NOT NULL,
        context TEXT
    );
    "#,
    "CREATE INDEX IF NOT EXISTS idx_annotations_doc ON annotations(doc_id);",
    r#"
    CREATE TABLE IF NOT EXISTS propositions (
        id TEXT PRIMARY KEY,
        type TEXT NOT NULL,
        payload_json TEXT NOT NULL,
        anchors_json TEXT NOT NULL,
        doc_id TEXT NOT NULL,
        quality_json TEXT,
        extracted_at TEXT NOT NULL
    );
    "#,
    "CREATE INDEX IF NOT EXISTS idx_propositions_doc ON propositions(doc_id);",
    r#"
    CREATE TABLE IF NOT EXISTS claim_groups (
        signature TEXT PRIMARY KEY,
        claim_text TEXT NOT NULL,
        domain TEXT NOT NULL,
        propositions_json TEXT NOT NULL,
        merge_json TEXT,
        stance TEXT NOT NULL,
        rationale TEXT
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS runs (
        id TEXT PRIMARY KEY,
        question TEXT NOT NULL,
        created_at TEXT NOT NULL,
        mode TEXT NOT NULL,
        thinking_extent TEXT NOT NULL,
        status TEXT NOT NULL
    );
    "#,
];

/// SQLite implementation. Each call opens its own connection on a blocking
/// thread.
#[derive(Clone)]
pub struct SqliteEvidenceStore {
    db_path: PathBuf,
}

impl SqliteEvidenceStore {
    pub async fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let path = db_path.as_ref().to_path_buf();
        let path_clone = path.clone();

        task::spawn_blocking(move || {
            if let Some(parent) = path_clone.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let conn = Connection::open(&path_clone)?;
            for migration in MIGRATIONS {
                conn.execute(migration, [])?;
            }
            Ok::<_, crate::error::EvidenceError>(())
        })
        .await??;

        debug!("Evidence store ready at {:?}", path);
        Ok(Self { db_path: path })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let path = self.db_path.clone();
        task::spawn_blocking(move || {
            let conn = Connection::open(&path)?;
            f(&conn)
        })
        .await?
    }
}

#[async_trait]
impl EvidenceStore for SqliteEvidenceStore {
    async fn upsert_source(&self, doc: &Document) -> Result<()> {
        let doc = doc.clone();
        let meta = serde_json::to_string(&serde_json::json!({ "snippet": doc.snippet, "rank": doc.rank }))?;
        self.with_conn(move |conn| {
            conn.execute(
                r#"INSERT INTO source_docs (id, url, title, retrieved_at, content_hash, mime, engine, meta_json)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                   ON CONFLICT(id) DO UPDATE SET
                       url=excluded.url,
                       title=excluded.title,
                       retrieved_at=excluded.retrieved_at,
                       content_hash=excluded.content_hash,
                       mime=excluded.mime,
                       engine=excluded.engine,
                       meta_json=excluded.meta_json"#,
                params![
                    doc.doc_id,
                    doc.url,
                    doc.title,
                    doc.retrieved_at.to_rfc3339(),
                    doc.content_hash,
                    doc.content_type,
                    doc.engine,
                    meta
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn insert_annotation(&self, annotation: &Annotation) -> Result<()> {
        let selector = serde_json::to_string(&annotation.selector)?;
        let annotation = annotation.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO annotations (doc_id, selector_json, quote, context) VALUES (?1, ?2, ?3, ?4)",
                params![annotation.doc_id, selector, annotation.quote, annotation.context],
            )?;
            Ok(())
        })
        .await
    }

    async fn upsert_proposition(&self, proposition: &Proposition) -> Result<()> {
        let payload = serde_json::to_string(&proposition.payload)?;
        let anchors = serde_json::to_string(&proposition.anchors)?;
        let quality = serde_json::to_string(&proposition.quality)?;
        let id = proposition.id.clone();
        let kind = proposition.kind.to_string();
        let doc_id = proposition.doc_id.clone();
        let extracted_at = proposition.extracted_at.to_rfc3339();

        self.with_conn(move |conn| {
            conn.execute(
                r#"INSERT INTO propositions (id, type, payload_json, anchors_json, doc_id, quality_json, extracted_at)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                   ON CONFLICT(id) DO UPDATE SET
                       type=excluded.type,
                       payload_json=excluded.payload_json,
                       anchors_json=excluded.anchors_json,
                       doc_id=excluded.doc_id,
                       quality_json=excluded.quality_json,
                       extracted_at=excluded.extracted_at"#,
                params![id, kind, payload, anchors, doc_id, quality, extracted_at],
            )?;
            Ok(())
        })
        .await
    }

    async fn upsert_claim_group(&self, group: &ClaimGroup) -> Result<()> {
        let propositions = serde_json::to_string(&group.propositions)?;
        let merge = serde_json::to_string(&group.merge)?;
        let domain = serde_json::to_value(group.domain)?
            .as_str()
            .unwrap_or("general")
            .to_string();
        let signature = group.signature.clone();
        let claim_text = group.claim_text.clone();
        let stance = group.stance.as_str();
        let rationale = group.rationale.clone();

        self.with_conn(move |conn| {
            conn.execute(
                r#"INSERT INTO claim_groups (signature, claim_text, domain, propositions_json, merge_json, stance, rationale)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                   ON CONFLICT(signature) DO UPDATE SET
                       claim_text=excluded.claim_text,
                       domain=excluded.domain,
                       propositions_json=excluded.propositions_json,
                       merge_json=excluded.merge_json,
                       stance=excluded.stance,
                       rationale=excluded.rationale"#,
                params![signature, claim_text, domain, propositions, merge, stance, rationale],
            )?;
            Ok(())
        })
        .await
    }

    async fn record_run(&self, run: &RunRecord) -> Result<()> {
        let run = run.clone();
        self.with_conn(move |conn| {
            conn.execute(
                r#"INSERT INTO runs (id, question, created_at, mode, thinking_extent, status)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                   ON CONFLICT(id) DO UPDATE SET
                       question=excluded.question,
                       created_at=excluded.created_at,
                       mode=excluded.mode,
                       thinking_extent=excluded.thinking_extent,
                       status=excluded.status"#,
                params![
                    run.id,
                    run.question,
                    run.created_at.to_rfc3339(),
                    run.mode,
                    run.thinking_extent,
                    run.status
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_claim_group(&self, signature: &str) -> Result<Option<ClaimGroup>> {
        let signature = signature.to_string();
        let row: Option<(String, String, String, String, Option<String>, String, Option<String>)> = self
            .with_conn(move |conn| {
                let row = conn
                    .query_row(
                        r#"SELECT signature, claim_text, domain, propositions_json, merge_json, stance, rationale
                           FROM claim_groups WHERE signature = ?1"#,
                        params![signature],
                        |row| {
                            Ok((
                                row.get(0)?,
                                row.get(1)?,
                                row.get(2)?,
                                row.get(3)?,
                                row.get(4)?,
                                row.get(5)?,
                                row.get(6)?,
                            ))
                        },
                    )
                    .optional()?;
                Ok(row)
            })
            .await?;

        let Some((signature, claim_text, domain, propositions, merge, stance, rationale)) = row else {
            return Ok(None);
        };
        let group = ClaimGroup {
            signature,
            claim_text,
            domain: serde_json::from_value(serde_json::Value::String(domain))?,
            propositions: serde_json::from_str(&propositions)?,
            merge: serde_json::from_str(merge.as_deref().unwrap_or("null"))?,
            stance: serde_json::from_value(serde_json::Value::String(stance))?,
            rationale: rationale.unwrap_or_default(),
        };
        Ok(Some(group))
    }

    async fn stats(&self) -> Result<StoreStats> {
        self.with_conn(|conn| {
            let count = |table: &str| -> Result<usize> {
                let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
                Ok(n as usize)
            };
            Ok(StoreStats {
                sources: count("source_docs")?,
                annotations: count("annotations")?,
                propositions: count("propositions")?,
                claim_groups: count("claim_groups")?,
                runs: count("runs")?,
            })
        })
        .await
    }
}

/// In-memory store, mainly for tests and dry runs.
#[derive(Default)]
pub struct MemoryEvidenceStore {
    sources: Mutex<HashMap<String, Document>>,
    annotations: Mutex<Vec<Annotation>>,
    propositions: Mutex<HashMap<String, Proposition>>,
    claim_groups: Mutex<HashMap<String, ClaimGroup>>,
    runs: Mutex<HashMap<String, RunRecord>>,
}

impl MemoryEvidenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn annotations(&self) -> Vec<Annotation> {
        self.annotations.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl EvidenceStore for MemoryEvidenceStore {
    async fn upsert_source(&self, doc: &Document) -> Result<()> {
        lock(&self.sources).insert(doc.doc_id.clone(), doc.clone());
        Ok(())
    }

    async fn insert_annotation(&self, annotation: &Annotation) -> Result<()> {
        lock(&self.annotations).push(annotation.clone());
        Ok(())
    }

    async fn upsert_proposition(&self, proposition: &Proposition) -> Result<()> {
        lock(&self.propositions).insert(proposition.id.clone(), proposition.clone());
        Ok(())
    }

    async fn upsert_claim_group(&self, group: &ClaimGroup) -> Result<()> {
        lock(&self.claim_groups).insert(group.signature.clone(), group.clone());
        Ok(())
    }

    async fn record_run(&self, run: &RunRecord) -> Result<()> {
        lock(&self.runs).insert(run.id.clone(), run.clone());
        Ok(())
    }

    async fn get_claim_group(&self, signature: &str) -> Result<Option<ClaimGroup>> {
        Ok(lock(&self.claim_groups).get(signature).cloned())
    }

    async fn stats(&self) -> Result<StoreStats> {
        Ok(StoreStats {
            sources: lock(&self.sources).len(),
            annotations: lock(&self.annotations).len(),
            propositions: lock(&self.propositions).len(),
            claim_groups: lock(&self.claim_groups).len(),
            runs: lock(&self.runs).len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        AnnotationSelector, ClaimDomain, LabelCounts, MergeSummary, PropositionPayload, PropositionQuality,
        PropositionType, Stance,
    };
    use tempfile::NamedTempFile;

    fn sample_group(stance: Stance) -> ClaimGroup {
        ClaimGroup {
            signature: "abc123".into(),
            claim_text: "Water boils at 100 C".into(),
            domain: ClaimDomain::General,
            propositions: vec!["prop_1".into()],
            merge: MergeSummary {
                counts: LabelCounts { support: 1, refute: 0, neutral: 0 },
                evidence: vec![],
                canonical_text: "Water boils at 100 C".into(),
            },
            stance,
            rationale: "support=1, refute=0, neutral=0 across 1 evidence items.".into(),
        }
    }

    fn sample_prop() -> Proposition {
        Proposition {
            id: "prop_1".into(),
            kind: PropositionType::Fact,
            payload: PropositionPayload {
                claim_text: "Water boils at 100 C".into(),
                quote: "boils at 100 C".into(),
                claim_type: PropositionType::Fact,
                canonical_text: None,
                claim_signature: None,
            },
            anchors: vec![Annotation {
                doc_id: "d1".into(),
                selector: AnnotationSelector::exact("boils at 100 C"),
                quote: "boils at 100 C".into(),
                context: String::new(),
            }],
            doc_id: "d1".into(),
            quality: PropositionQuality { model: "m".into(), chunk_chars: 10 },
            extracted_at: Utc::now(),
        }
    }

    fn sample_reduction() -> ReduceResult {
        ReduceResult {
            propositions: vec![sample_prop()],
            claim_groups: vec![sample_group(Stance::Supported)],
        }
    }

    #[tokio::test]
    async fn test_sqlite_open_is_idempotent() -> Result<()> {
        let temp_file = NamedTempFile::new()?;
        SqliteEvidenceStore::open(temp_file.path()).await?;
        let store = SqliteEvidenceStore::open(temp_file.path()).await?;
        assert_eq!(store.stats().await?, StoreStats::default());
        Ok(())
    }

    #[tokio::test]
    async fn test_sqlite_claim_group_upsert_last_write_wins() -> Result<()> {
        let temp_file = NamedTempFile::new()?;
        let store = SqliteEvidenceStore::open(temp_file.path()).await?;

        store.upsert_claim_group(&sample_group(Stance::Supported)).await?;
        store.upsert_claim_group(&sample_group(Stance::Mixed)).await?;

        assert_eq!(store.stats().await?.claim_groups, 1);
        let stored = store.get_claim_group("abc123").await?.expect("group stored");
        assert_eq!(stored.stance, Stance::Mixed);
        assert_eq!(stored.merge.counts.support, 1);
        assert!(store.get_claim_group("missing").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_sqlite_persist_reduction_twice() -> Result<()> {
        let temp_file = NamedTempFile::new()?;
        let store = SqliteEvidenceStore::open(temp_file.path()).await?;
        let docs = [Document::new("d1", "http://x", "X", "Water boils at 100 C")];
        let reduction = sample_reduction();

        store.persist_reduction(&docs, &reduction).await?;
        store.persist_reduction(&docs, &reduction).await?;

        let stats = store.stats().await?;
        assert_eq!(stats.sources, 1);
        assert_eq!(stats.propositions, 1);
        assert_eq!(stats.claim_groups, 1);
        // annotations are append-only
        assert_eq!(stats.annotations, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_sqlite_record_run() -> Result<()> {
        let temp_file = NamedTempFile::new()?;
        let store = SqliteEvidenceStore::open(temp_file.path()).await?;
        let mut run = RunRecord {
            id: uuid::Uuid::new_v4().to_string(),
            question: "does water boil at 100 C?".into(),
            created_at: Utc::now(),
            mode: "reduce".into(),
            thinking_extent: "medium".into(),
            status: "running".into(),
        };
        store.record_run(&run).await?;
        run.status = "completed".into();
        store.record_run(&run).await?;
        assert_eq!(store.stats().await?.runs, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_memory_store_matches_sqlite_semantics() -> Result<()> {
        let store = MemoryEvidenceStore::new();
        let docs = [Document::new("d1", "http://x", "X", "text")];
        store.persist_reduction(&docs, &sample_reduction()).await?;
        store.persist_reduction(&docs, &sample_reduction()).await?;
        store.upsert_claim_group(&sample_group(Stance::Refuted)).await?;

        let stats = store.stats().await?;
        assert_eq!((stats.sources, stats.propositions, stats.claim_groups), (1, 1, 1));
        assert_eq!(store.annotations().len(), 2);
        assert_eq!(store.get_claim_group("abc123").await?.unwrap().stance, Stance::Refuted);
        Ok(())
    }
}
