//! Orphan mission-branch garbage collection.
//!
//! Sandbox teardown retains mission branches so one retention policy covers
//! every abandoned branch, whether its sandbox was cleaned, crashed, or
//! never torn down. A branch matching `mission/*` with no attached worktree
//! is an orphan; orphans at or past the retention threshold are deleted.
//! One bad branch never blocks the sweep.

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};

use crate::cancel::CancelToken;
use crate::vcs::{Git, VcsError};

/// Branch pattern the reaper owns.
pub const MISSION_BRANCH_PATTERN: &str = "mission/*";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A mission branch with no live worktree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrphanedBranch {
    pub name: String,
    /// Committer timestamp of the branch tip.
    pub tip_at: DateTime<Utc>,
    /// Age at scan time.
    pub age: Duration,
}

/// Display-only age grouping. Retention comparisons never use this; they
/// compare the raw age against the raw threshold.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AgeBucket {
    /// Younger than 7 days.
    Fresh,
    /// 7 to 30 days.
    Aging,
    /// Older than 30 days.
    Stale,
}

impl OrphanedBranch {
    #[must_use]
    pub fn bucket(&self) -> AgeBucket {
        match self.age.num_days() {
            d if d < 7 => AgeBucket::Fresh,
            d if d <= 30 => AgeBucket::Aging,
            _ => AgeBucket::Stale,
        }
    }
}

impl std::fmt::Display for AgeBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fresh => write!(f, "<7d"),
            Self::Aging => write!(f, "7-30d"),
            Self::Stale => write!(f, ">30d"),
        }
    }
}

/// Outcome of one reaper sweep.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReapReport {
    /// Every orphan found, whether or not it was eligible.
    pub orphans: Vec<OrphanedBranch>,
    /// Branches at or past retention. In dry-run mode these are reported
    /// but not touched.
    pub eligible: Vec<String>,
    /// Branches actually deleted (live mode only).
    pub deleted: Vec<String>,
    /// Branches whose deletion failed, with the error text.
    pub failed: Vec<(String, String)>,
    pub dry_run: bool,
}

impl ReapReport {
    /// Orphan count per display bucket: (fresh, aging, stale).
    #[must_use]
    pub fn bucket_counts(&self) -> (usize, usize, usize) {
        let mut counts = (0, 0, 0);
        for orphan in &self.orphans {
            match orphan.bucket() {
                AgeBucket::Fresh => counts.0 += 1,
                AgeBucket::Aging => counts.1 += 1,
                AgeBucket::Stale => counts.2 += 1,
            }
        }
        counts
    }
}

// ---------------------------------------------------------------------------
// Scanning and reaping
// ---------------------------------------------------------------------------

/// Enumerate orphaned mission branches: `mission/*` minus branches attached
/// to a worktree. Branches whose tip timestamp cannot be read are skipped
/// silently.
///
/// # Errors
/// [`VcsError`] when branch or worktree enumeration itself fails.
pub fn find_orphans(
    git: &Git,
    repo: &Path,
    cancel: &CancelToken,
) -> Result<Vec<OrphanedBranch>, VcsError> {
    let branches = git.list_branches(repo, Some(MISSION_BRANCH_PATTERN), cancel)?;
    let attached: HashSet<String> = git
        .list_worktrees(repo, cancel)?
        .into_iter()
        .filter_map(|wt| wt.branch)
        .collect();

    let now = Utc::now();
    let mut orphans = Vec::new();
    for branch in branches {
        if attached.contains(&branch) {
            continue;
        }
        match git.branch_timestamp(repo, &branch, cancel) {
            Ok(tip_at) => orphans.push(OrphanedBranch {
                age: now - tip_at,
                name: branch,
                tip_at,
            }),
            Err(err) => {
                tracing::debug!(branch = %branch, error = %err, "skipping orphan without a readable tip");
            }
        }
    }
    Ok(orphans)
}

/// Sweep orphaned mission branches under the retention policy.
///
/// `retention_days = None` means never delete: the sweep still reports
/// orphans but `eligible` and `deleted` stay empty. In live mode, per-branch
/// delete failures are logged and the sweep continues.
///
/// # Errors
/// [`VcsError`] only when the initial enumeration fails.
pub fn reap(
    git: &Git,
    repo: &Path,
    retention_days: Option<i64>,
    dry_run: bool,
    cancel: &CancelToken,
) -> Result<ReapReport, VcsError> {
    let orphans = find_orphans(git, repo, cancel)?;
    let mut report = ReapReport {
        orphans,
        dry_run,
        ..ReapReport::default()
    };

    let Some(days) = retention_days else {
        tracing::info!(orphans = report.orphans.len(), "retention disabled; nothing to delete");
        return Ok(report);
    };

    let eligible: Vec<String> = report
        .orphans
        .iter()
        .filter(|o| o.age.num_days() >= days)
        .map(|o| o.name.clone())
        .collect();
    report.eligible.clone_from(&eligible);

    if dry_run {
        for branch in &eligible {
            tracing::info!(branch = %branch, "would delete (dry run)");
        }
        return Ok(report);
    }

    for branch in eligible {
        match git.delete_branch(repo, &branch, cancel) {
            Ok(()) => {
                tracing::info!(branch = %branch, "deleted orphaned mission branch");
                report.deleted.push(branch);
            }
            Err(err) => {
                tracing::warn!(branch = %branch, error = %err, "failed to delete; continuing sweep");
                report.failed.push((branch, err.to_string()));
            }
        }
    }
    Ok(report)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
