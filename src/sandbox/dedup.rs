//! Deduplication capability for merge-back.
//!
//! The merge-back engine hands sandbox-discovered issues to a
//! [`Deduplicator`] before filing them in the main store. A real
//! implementation (similarity search, AI triage) lives outside this crate;
//! the core ships the identity implementation and fails safe when the
//! collaborator errors.

use serde::Serialize;

use crate::cancel::CancelToken;
use crate::model::Issue;

/// Failure of the dedup collaborator. Merge-back treats this as "file
/// everything" rather than dropping work.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DedupError {
    pub detail: String,
}

impl std::fmt::Display for DedupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "deduplication failed: {}", self.detail)
    }
}

impl std::error::Error for DedupError {}

/// A candidate matched against an issue that already exists in main.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DuplicatePair {
    /// Sandbox id of the skipped candidate.
    pub candidate_id: String,
    /// Main-store id of the existing issue it duplicates.
    pub existing_id: String,
}

/// A candidate that duplicates an earlier candidate in the same batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WithinBatchDuplicate {
    pub candidate_id: String,
    /// The earlier candidate that will be filed instead.
    pub duplicate_of: String,
}

/// Per-candidate verdict, emitted as an observability event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "verdict")]
pub enum DedupVerdict {
    Unique,
    DuplicateOf { existing_id: String },
    DuplicateWithinBatch { duplicate_of: String },
}

/// One decision with optional rationale.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DedupDecision {
    pub candidate_id: String,
    #[serde(flatten)]
    pub verdict: DedupVerdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

/// Batch counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DedupStats {
    pub total: usize,
    pub unique: usize,
    pub duplicates: usize,
}

/// Full result of one batch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DedupOutcome {
    /// Sandbox ids to file, in batch order.
    pub unique: Vec<String>,
    pub duplicate_pairs: Vec<DuplicatePair>,
    pub within_batch: Vec<WithinBatchDuplicate>,
    pub decisions: Vec<DedupDecision>,
    pub stats: DedupStats,
}

/// The dedup collaborator contract.
pub trait Deduplicator: Send + Sync {
    /// Classify a batch of sandbox-discovered candidates.
    ///
    /// # Errors
    /// [`DedupError`] when the collaborator cannot produce a verdict; the
    /// caller fails safe by filing all candidates.
    fn deduplicate_batch(
        &self,
        candidates: &[Issue],
        cancel: &CancelToken,
    ) -> Result<DedupOutcome, DedupError>;
}

/// Identity implementation: every candidate is unique.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullDeduplicator;

impl Deduplicator for NullDeduplicator {
    fn deduplicate_batch(
        &self,
        candidates: &[Issue],
        _cancel: &CancelToken,
    ) -> Result<DedupOutcome, DedupError> {
        let unique: Vec<String> = candidates.iter().map(|c| c.id.clone()).collect();
        let decisions = unique
            .iter()
            .map(|id| DedupDecision {
                candidate_id: id.clone(),
                verdict: DedupVerdict::Unique,
                reasoning: None,
            })
            .collect();
        Ok(DedupOutcome {
            stats: DedupStats {
                total: unique.len(),
                unique: unique.len(),
                duplicates: 0,
            },
            unique,
            duplicate_pairs: Vec::new(),
            within_batch: Vec::new(),
            decisions,
        })
    }
}
