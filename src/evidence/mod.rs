//! Evidence Reduction & Adjudication Pipeline

pub mod adjudicate;
pub mod canonicalize;
pub mod extract;
pub mod policy;
pub mod reduce;
pub mod store;

pub use adjudicate::{adjudicate, derive_stance, label_evidence};
pub use canonicalize::{canonicalize_propositions, normalize_claim_text, signature_for_text};
pub use extract::{chunk_text, extract_propositions, make_anchor, proposition_id};
pub use policy::{policy_for_extent, EvidencePolicy, ThinkingExtent};
pub use reduce::{
    build_evidence, group_claims, merge_claims, reduce_evidence, ClaimBucket, EvidenceReducer, MergedClaim,
    ReduceResult,
};
pub use store::{EvidenceStore, MemoryEvidenceStore, RunRecord, SqliteEvidenceStore, StoreStats};
