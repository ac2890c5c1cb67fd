//! Merge-back: reconcile sandbox issue-store state into the main store.
//!
//! Code changes live in git and are not this engine's concern. Merge-back
//! moves tracker state: mission status, sandbox-discovered issues (filed
//! under fresh main-store ids, deduplicated when a collaborator is
//! available), dependency edges remapped across stores, status updates for
//! shared issues, and agent commentary from the sandbox activity log.
//!
//! Re-running is safe: status updates are idempotent, filed candidates are
//! remembered via a `merged:<main-id>` label on the sandbox issue, and
//! comments are only appended once.

use std::collections::{HashMap, HashSet};

use crate::cancel::{CancelToken, Cancelled};
use crate::model::{Dependency, Event, Issue, IssueFilter, IssueUpdates, Status};
use crate::store::{Storage, StoreError};

use super::dedup::{DedupOutcome, Deduplicator};
use super::seed::SEEDER_ACTOR;

/// Actor recorded on merge-back writes.
pub const MERGE_BACK_ACTOR: &str = "merge-back";

/// Label prefix marking a sandbox issue as already filed in main.
pub const MERGED_LABEL_PREFIX: &str = "merged:";

/// How many mission events the event merge scans.
const EVENT_SCAN_LIMIT: usize = 100;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from merge-back. Per-issue failures propagate: merge-back is not
/// partial-tolerant, but it is resumable.
#[derive(Debug)]
pub enum MergeBackError {
    Store(StoreError),
    Cancelled,
}

impl std::fmt::Display for MergeBackError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(e) => write!(f, "merge-back store operation failed: {e}"),
            Self::Cancelled => write!(f, "merge-back cancelled"),
        }
    }
}

impl std::error::Error for MergeBackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            Self::Cancelled => None,
        }
    }
}

impl From<StoreError> for MergeBackError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<Cancelled> for MergeBackError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

/// What one merge-back pass did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeBackReport {
    pub mission_status_updated: bool,
    /// `(sandbox id, fresh main id)` for each filed discovered issue.
    pub filed: Vec<(String, String)>,
    /// Candidates skipped as duplicates of existing main issues.
    pub duplicates: Vec<(String, String)>,
    /// Candidates skipped as duplicates of earlier candidates.
    pub within_batch: Vec<(String, String)>,
    pub status_updates: usize,
    pub comments_appended: usize,
    /// The dedup collaborator failed and everything was filed.
    pub dedup_failed: bool,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Reconcile `sandbox` state for `mission_id` into `main`.
///
/// # Errors
/// [`MergeBackError::Store`] on any store failure (dedup-batch events are
/// best-effort and never fail the run); [`MergeBackError::Cancelled`] when
/// the token fires between steps.
pub fn merge_back(
    main: &dyn Storage,
    sandbox: &dyn Storage,
    mission_id: &str,
    deduplicator: Option<&dyn Deduplicator>,
    cancel: &CancelToken,
) -> Result<MergeBackReport, MergeBackError> {
    cancel.checkpoint()?;
    let mut report = MergeBackReport::default();

    // Step 1: mission status. A close is routed through the dedicated close
    // operation so it lands as a first-class event.
    let sandbox_mission = sandbox.get_issue(mission_id)?;
    let main_mission = main.get_issue(mission_id)?;
    if sandbox_mission.status != main_mission.status {
        if sandbox_mission.status == Status::Closed {
            main.close_issue(mission_id, "closed in sandbox", MERGE_BACK_ACTOR)?;
        } else {
            main.update_issue(
                mission_id,
                &IssueUpdates {
                    status: Some(sandbox_mission.status),
                    ..IssueUpdates::default()
                },
                MERGE_BACK_ACTOR,
            )?;
        }
        report.mission_status_updated = true;
    }

    // Step 2: candidate discovery.
    let mut candidates: Vec<Issue> = Vec::new();
    let mut existing: Vec<Issue> = Vec::new();
    for issue in sandbox.search_issues("", &IssueFilter::default())? {
        if issue.id == mission_id {
            continue;
        }
        match main.get_issue(&issue.id) {
            Ok(_) => existing.push(issue),
            Err(StoreError::IssueNotFound { .. }) => {
                if already_filed(main, sandbox, &issue.id)? {
                    continue;
                }
                candidates.push(issue);
            }
            Err(err) => return Err(err.into()),
        }
    }

    // Step 3: deduplication.
    cancel.checkpoint()?;
    let outcome = match (deduplicator, candidates.is_empty()) {
        (Some(dedup), false) => {
            emit_event(
                main,
                cancel,
                batch_event(mission_id, "deduplication_batch_started", candidates.len(), None),
            );
            match dedup.deduplicate_batch(&candidates, cancel) {
                Ok(outcome) => {
                    emit_event(
                        main,
                        cancel,
                        batch_event(
                            mission_id,
                            "deduplication_batch_completed",
                            candidates.len(),
                            Some(true),
                        ),
                    );
                    for decision in &outcome.decisions {
                        emit_event(main, cancel, decision_event(mission_id, decision));
                    }
                    Some(outcome)
                }
                Err(err) => {
                    // Fail safe: file everything rather than dropping work.
                    tracing::warn!(error = %err, "deduplicator failed; filing all candidates");
                    emit_event(
                        main,
                        cancel,
                        batch_event(
                            mission_id,
                            "deduplication_batch_completed",
                            candidates.len(),
                            Some(false),
                        ),
                    );
                    report.dedup_failed = true;
                    None
                }
            }
        }
        _ => None,
    };

    let unique_ids: Vec<String> = match &outcome {
        Some(outcome) => outcome.unique.clone(),
        None => candidates.iter().map(|c| c.id.clone()).collect(),
    };

    if let Some(outcome) = &outcome {
        handle_duplicates(main, sandbox, outcome, &mut report)?;
    }

    // Step 4: file unique candidates under fresh main ids.
    let by_id: HashMap<&str, &Issue> = candidates.iter().map(|c| (c.id.as_str(), c)).collect();
    let mut id_map: HashMap<String, String> = HashMap::new();
    for old_id in &unique_ids {
        cancel.checkpoint()?;
        let Some(candidate) = by_id.get(old_id.as_str()) else {
            continue;
        };
        let mut fresh = (*candidate).clone();
        fresh.id = String::new();
        let new_id = main.create_issue(&fresh, MERGE_BACK_ACTOR)?;

        // Labels read under the old sandbox id, written under the new one.
        for label in sandbox.get_labels(old_id)? {
            main.add_label(&new_id, &label, MERGE_BACK_ACTOR)?;
        }

        sandbox.add_label(
            old_id,
            &format!("{MERGED_LABEL_PREFIX}{new_id}"),
            MERGE_BACK_ACTOR,
        )?;
        id_map.insert(old_id.clone(), new_id.clone());
        report.filed.push((old_id.clone(), new_id));
    }

    // Step 5: rebuild dependency edges for filed candidates, remapping ids.
    for (old_id, new_id) in &report.filed {
        for edge in sandbox.get_dependency_records(old_id)? {
            let to = id_map.get(&edge.to).cloned().unwrap_or(edge.to.clone());
            if main.get_issue(&to).is_err() {
                continue;
            }
            let mapped = Dependency {
                from: new_id.clone(),
                to,
                kind: edge.kind,
            };
            match main.add_dependency(&mapped, MERGE_BACK_ACTOR) {
                Ok(()) | Err(StoreError::DependencyExists { .. }) => {}
                Err(err) => return Err(err.into()),
            }
        }
    }

    // Step 6: status propagation for shared issues. Last writer wins; the
    // sandbox is that writer here.
    for issue in &existing {
        let current = main.get_issue(&issue.id)?;
        if current.status != issue.status {
            main.update_issue(
                &issue.id,
                &IssueUpdates {
                    status: Some(issue.status),
                    ..IssueUpdates::default()
                },
                MERGE_BACK_ACTOR,
            )?;
            report.status_updates += 1;
        }
    }

    // Step 7: carry agent commentary from the sandbox mission log.
    let already: HashSet<String> = main
        .get_comments(mission_id)?
        .into_iter()
        .map(|c| c.text)
        .collect();
    for event in sandbox.get_events(mission_id, EVENT_SCAN_LIMIT)? {
        if event.kind == "created" || event.actor == SEEDER_ACTOR {
            continue;
        }
        let Some(comment) = &event.comment else {
            continue;
        };
        let text = format!("[Sandbox execution] {comment}");
        if already.contains(&text) {
            continue;
        }
        main.add_comment(mission_id, MERGE_BACK_ACTOR, &text)?;
        report.comments_appended += 1;
    }

    tracing::info!(
        mission = mission_id,
        filed = report.filed.len(),
        duplicates = report.duplicates.len(),
        status_updates = report.status_updates,
        comments = report.comments_appended,
        "merge-back complete"
    );
    Ok(report)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// A candidate already filed by a previous run carries a `merged:<id>` label
/// that resolves to a live main issue.
fn already_filed(
    main: &dyn Storage,
    sandbox: &dyn Storage,
    sandbox_id: &str,
) -> Result<bool, StoreError> {
    for label in sandbox.get_labels(sandbox_id)? {
        if let Some(main_id) = label.strip_prefix(MERGED_LABEL_PREFIX)
            && main.get_issue(main_id).is_ok()
        {
            return Ok(true);
        }
    }
    Ok(false)
}

fn handle_duplicates(
    main: &dyn Storage,
    sandbox: &dyn Storage,
    outcome: &DedupOutcome,
    report: &mut MergeBackReport,
) -> Result<(), MergeBackError> {
    for pair in &outcome.duplicate_pairs {
        let skipped_title = sandbox
            .get_issue(&pair.candidate_id)
            .map(|i| i.title)
            .unwrap_or_else(|_| pair.candidate_id.clone());
        main.add_comment(
            &pair.existing_id,
            MERGE_BACK_ACTOR,
            &format!("Sandbox discovered a duplicate of this issue: \"{skipped_title}\" (not filed)"),
        )?;
        report
            .duplicates
            .push((pair.candidate_id.clone(), pair.existing_id.clone()));
    }
    for dup in &outcome.within_batch {
        tracing::info!(
            candidate = %dup.candidate_id,
            duplicate_of = %dup.duplicate_of,
            "within-batch duplicate; filing the earlier candidate only"
        );
        report
            .within_batch
            .push((dup.candidate_id.clone(), dup.duplicate_of.clone()));
    }
    Ok(())
}

fn batch_event(mission_id: &str, kind: &str, batch_size: usize, success: Option<bool>) -> Event {
    let mut payload = serde_json::json!({ "batch_size": batch_size });
    if let Some(success) = success {
        payload["success"] = serde_json::Value::Bool(success);
    }
    Event {
        payload: Some(payload),
        ..Event::new(mission_id, kind, MERGE_BACK_ACTOR)
    }
}

fn decision_event(mission_id: &str, decision: &super::dedup::DedupDecision) -> Event {
    Event {
        payload: serde_json::to_value(decision).ok(),
        ..Event::new(mission_id, "deduplication_decision", MERGE_BACK_ACTOR)
    }
}

/// Best-effort event emission: cancellation skips silently, store failures
/// log and continue.
fn emit_event(main: &dyn Storage, cancel: &CancelToken, event: Event) {
    if cancel.is_cancelled() {
        return;
    }
    if let Err(err) = main.store_agent_event(&event) {
        tracing::warn!(kind = %event.kind, error = %err, "dropping observability event");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
