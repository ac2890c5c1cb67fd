//! Per-mission sandbox lifecycle.
//!
//! One sandbox per mission: a detached git worktree on its own
//! `mission/<id>-<slug>` branch, with an isolated issue-store replica at
//! `<worktree>/.beads/mission.db`. The manager owns an in-memory table of
//! active sandboxes; the persistent source of truth is the mission record in
//! the main store (`sandbox_path`, `branch_name`), which survives executor
//! restarts and drives reconstruction.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::cancel::{CancelToken, Cancelled};
use crate::config::CoreConfig;
use crate::model::MissionUpdates;
use crate::store::{Storage, StoreError, StoreProvider};
use crate::vcs::{Git, VcsError};

pub mod dedup;
pub mod merge_back;
pub mod seed;

pub use dedup::{DedupError, DedupOutcome, Deduplicator, NullDeduplicator};
pub use merge_back::{MergeBackError, MergeBackReport, merge_back};
pub use seed::{SeedError, SeedReport, seed_sandbox};

/// Store-metadata key of the per-sandbox record.
pub const SANDBOX_INFO_KEY: &str = "sandbox_info";

/// Relative location of the sandbox issue store inside its worktree.
const SANDBOX_DB_RELATIVE: &str = ".beads/mission.db";

// ---------------------------------------------------------------------------
// Slug
// ---------------------------------------------------------------------------

static SLUG_RE: Lazy<Regex> = Lazy::new(|| Regex::new("[^a-z0-9]+").expect("static slug regex"));

/// Branch-safe slug: lowercase, runs of non-alphanumerics collapsed to `-`,
/// trimmed, capped at 50 chars. Idempotent.
#[must_use]
pub fn slug(input: &str) -> String {
    let lower = input.to_lowercase();
    let replaced = SLUG_RE.replace_all(&lower, "-");
    let trimmed = replaced.trim_matches('-');
    let capped: String = trimmed.chars().take(50).collect();
    capped.trim_end_matches('-').to_owned()
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Lifecycle state of a sandbox.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxStatus {
    #[default]
    Active,
    Completed,
    Failed,
    Cleaned,
}

/// A provisioned sandbox.
#[derive(Clone, Debug, PartialEq)]
pub struct Sandbox {
    /// `mission-<missionId>`.
    pub id: String,
    pub mission_id: String,
    /// Absolute worktree path.
    pub path: PathBuf,
    /// `mission/<missionId>-<slug>`.
    pub branch: String,
    /// Isolated issue store within the worktree.
    pub db_path: PathBuf,
    pub parent_repo: PathBuf,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
    pub status: SandboxStatus,
}

/// The JSON record stored under [`SANDBOX_INFO_KEY`] in the sandbox store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SandboxMetadata {
    pub sandbox_id: String,
    pub parent_db_path: PathBuf,
    pub mission_id: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from sandbox provisioning and teardown.
#[derive(Debug)]
pub enum SandboxError {
    /// The worktree directory already exists and reconstruction does not
    /// apply.
    AlreadyExists { path: PathBuf },
    /// No registered sandbox under the given id.
    NotFound { id: String },
    Store(StoreError),
    Vcs(VcsError),
    Seed(SeedError),
    Io(std::io::Error),
    Cancelled,
}

impl std::fmt::Display for SandboxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyExists { path } => write!(
                f,
                "sandbox directory already exists at {}; clean it up or reconstruct from the mission record",
                path.display()
            ),
            Self::NotFound { id } => write!(f, "no active sandbox '{id}'"),
            Self::Store(e) => write!(f, "sandbox store operation failed: {e}"),
            Self::Vcs(e) => write!(f, "sandbox git operation failed: {e}"),
            Self::Seed(e) => write!(f, "sandbox seeding failed: {e}"),
            Self::Io(e) => write!(f, "sandbox I/O failed: {e}"),
            Self::Cancelled => write!(f, "sandbox operation cancelled"),
        }
    }
}

impl std::error::Error for SandboxError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            Self::Vcs(e) => Some(e),
            Self::Seed(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for SandboxError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<VcsError> for SandboxError {
    fn from(e: VcsError) -> Self {
        Self::Vcs(e)
    }
}

impl From<SeedError> for SandboxError {
    fn from(e: SeedError) -> Self {
        Self::Seed(e)
    }
}

impl From<std::io::Error> for SandboxError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<Cancelled> for SandboxError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

/// Outcome of a [`SandboxManager::cleanup_all`] sweep. Per-sandbox failures
/// accumulate; the sweep never short-circuits.
#[derive(Debug, Default)]
pub struct CleanupSweep {
    pub cleaned: Vec<String>,
    pub failed: Vec<(String, SandboxError)>,
}

// ---------------------------------------------------------------------------
// SandboxManager
// ---------------------------------------------------------------------------

/// Creates, tracks, and recycles per-mission sandboxes.
pub struct SandboxManager {
    parent_repo: PathBuf,
    sandbox_root: PathBuf,
    parent_db_path: PathBuf,
    base_branch: String,
    preserve_on_failure: bool,
    git: Git,
    store: Arc<dyn Storage>,
    provider: Arc<dyn StoreProvider>,
    active: RwLock<HashMap<String, Sandbox>>,
}

impl SandboxManager {
    #[must_use]
    pub fn new(
        parent_repo: PathBuf,
        config: &CoreConfig,
        store: Arc<dyn Storage>,
        provider: Arc<dyn StoreProvider>,
    ) -> Self {
        Self {
            sandbox_root: parent_repo.join(&config.sandbox.root),
            parent_db_path: parent_repo.join(&config.store.db_path),
            base_branch: config.repo.base_branch.clone(),
            preserve_on_failure: config.sandbox.preserve_on_failure,
            parent_repo,
            git: Git::new(),
            store,
            provider,
            active: RwLock::new(HashMap::new()),
        }
    }

    /// The sandbox id for a mission.
    #[must_use]
    pub fn sandbox_id(mission_id: &str) -> String {
        format!("mission-{mission_id}")
    }

    /// The branch name for a mission.
    #[must_use]
    pub fn branch_name(mission_id: &str, title: &str) -> String {
        format!("mission/{mission_id}-{}", slug(title))
    }

    /// Registered sandbox for `sandbox_id`, if any.
    #[must_use]
    pub fn get(&self, sandbox_id: &str) -> Option<Sandbox> {
        self.read_table().get(sandbox_id).cloned()
    }

    /// All registered sandboxes.
    #[must_use]
    pub fn list(&self) -> Vec<Sandbox> {
        self.read_table().values().cloned().collect()
    }

    /// Update the lifecycle status of a registered sandbox.
    ///
    /// # Errors
    /// [`SandboxError::NotFound`] when the sandbox is not registered.
    pub fn set_status(&self, sandbox_id: &str, status: SandboxStatus) -> Result<(), SandboxError> {
        let mut table = self.write_table();
        let sandbox = table.get_mut(sandbox_id).ok_or_else(|| SandboxError::NotFound {
            id: sandbox_id.to_owned(),
        })?;
        sandbox.status = status;
        sandbox.last_used = Utc::now();
        Ok(())
    }

    // -- Provisioning --------------------------------------------------------

    /// Provision (or reconnect) the sandbox for `mission_id`.
    ///
    /// Idempotent: an already-registered sandbox is returned as-is. When the
    /// mission record carries sandbox bookkeeping but the executor was
    /// restarted, the sandbox is reconstructed if its branch still exists;
    /// stale bookkeeping is cleared and a fresh sandbox is created
    /// otherwise.
    ///
    /// # Errors
    /// See [`SandboxError`].
    pub fn create(&self, mission_id: &str, cancel: &CancelToken) -> Result<Sandbox, SandboxError> {
        cancel.checkpoint()?;

        let sandbox_id = Self::sandbox_id(mission_id);
        if let Some(existing) = self.touch(&sandbox_id) {
            return Ok(existing);
        }

        let mission = self.store.get_mission(mission_id)?;

        if let (Some(path), Some(branch)) = (&mission.sandbox_path, &mission.branch_name) {
            if self.git.branch_exists(&self.parent_repo, branch, cancel)? {
                return self.reconstruct(&sandbox_id, mission_id, Path::new(path), branch);
            }
            tracing::warn!(
                mission = mission_id,
                branch = %branch,
                "stale sandbox bookkeeping: branch is gone; recreating"
            );
            self.store.update_mission(
                mission_id,
                &MissionUpdates {
                    sandbox_path: Some(None),
                    branch_name: Some(None),
                    ..MissionUpdates::default()
                },
            )?;
        }

        self.provision(&sandbox_id, mission_id, &mission.issue.title, cancel)
    }

    fn provision(
        &self,
        sandbox_id: &str,
        mission_id: &str,
        mission_title: &str,
        cancel: &CancelToken,
    ) -> Result<Sandbox, SandboxError> {
        let branch = Self::branch_name(mission_id, mission_title);
        let path = self.sandbox_root.join(sandbox_id);

        if path.exists() {
            return Err(SandboxError::AlreadyExists { path });
        }
        std::fs::create_dir_all(&self.sandbox_root)?;

        self.git
            .create_worktree(&self.parent_repo, &path, &self.base_branch, cancel)?;

        // Everything past the worktree add rolls the worktree back on
        // failure so a retry starts clean.
        match self.populate(sandbox_id, mission_id, &branch, &path, cancel) {
            Ok(sandbox) => Ok(sandbox),
            Err(err) => {
                let _ = self
                    .git
                    .remove_worktree(&self.parent_repo, &path, &CancelToken::new());
                Err(err)
            }
        }
    }

    fn populate(
        &self,
        sandbox_id: &str,
        mission_id: &str,
        branch: &str,
        path: &Path,
        cancel: &CancelToken,
    ) -> Result<Sandbox, SandboxError> {
        self.git.create_branch(path, branch, cancel)?;

        let db_path = path.join(SANDBOX_DB_RELATIVE);
        let sandbox_store = self.provider.create(&db_path)?;

        // Sandbox-generated ids must use the main store's prefix.
        let prefix = match self.store.get_config("issue_prefix") {
            Ok(prefix) => prefix,
            Err(StoreError::KeyNotFound { .. }) => "vc".to_owned(),
            Err(err) => return Err(err.into()),
        };
        sandbox_store.set_config("issue_prefix", &prefix)?;

        let created_at = Utc::now();
        let metadata = SandboxMetadata {
            sandbox_id: sandbox_id.to_owned(),
            parent_db_path: self.parent_db_path.clone(),
            mission_id: mission_id.to_owned(),
            created_at,
        };
        let metadata_json =
            serde_json::to_string(&metadata).map_err(|e| SandboxError::Store(StoreError::Invalid {
                detail: format!("serialize sandbox metadata: {e}"),
            }))?;
        sandbox_store.set_metadata(SANDBOX_INFO_KEY, &metadata_json)?;

        seed::seed_sandbox(self.store.as_ref(), sandbox_store.as_ref(), mission_id)?;

        self.store.update_mission(
            mission_id,
            &MissionUpdates {
                sandbox_path: Some(Some(path.to_string_lossy().into_owned())),
                branch_name: Some(Some(branch.to_owned())),
                ..MissionUpdates::default()
            },
        )?;

        let sandbox = Sandbox {
            id: sandbox_id.to_owned(),
            mission_id: mission_id.to_owned(),
            path: path.to_path_buf(),
            branch: branch.to_owned(),
            db_path,
            parent_repo: self.parent_repo.clone(),
            created_at,
            last_used: created_at,
            status: SandboxStatus::Active,
        };
        self.write_table()
            .insert(sandbox_id.to_owned(), sandbox.clone());

        tracing::info!(mission = mission_id, branch, path = %path.display(), "sandbox created");
        Ok(sandbox)
    }

    /// Rebuild the in-memory record for a sandbox that survived an executor
    /// restart. The branch was already verified to exist.
    fn reconstruct(
        &self,
        sandbox_id: &str,
        mission_id: &str,
        path: &Path,
        branch: &str,
    ) -> Result<Sandbox, SandboxError> {
        let db_path = path.join(SANDBOX_DB_RELATIVE);

        // Prefer the creation time recorded at provisioning.
        let created_at = self
            .provider
            .open(&db_path)
            .and_then(|store| store.get_metadata(SANDBOX_INFO_KEY))
            .ok()
            .and_then(|raw| serde_json::from_str::<SandboxMetadata>(&raw).ok())
            .map_or_else(Utc::now, |meta| meta.created_at);

        let sandbox = Sandbox {
            id: sandbox_id.to_owned(),
            mission_id: mission_id.to_owned(),
            path: path.to_path_buf(),
            branch: branch.to_owned(),
            db_path,
            parent_repo: self.parent_repo.clone(),
            created_at,
            last_used: Utc::now(),
            status: SandboxStatus::Active,
        };
        self.write_table()
            .insert(sandbox_id.to_owned(), sandbox.clone());

        tracing::info!(mission = mission_id, branch, "sandbox reconstructed after restart");
        Ok(sandbox)
    }

    // -- Teardown ------------------------------------------------------------

    /// Tear down a sandbox: remove the worktree, drop the manager entry,
    /// clear the mission's sandbox bookkeeping. The branch is intentionally
    /// retained so the orphan reaper applies its retention policy uniformly.
    ///
    /// Failed sandboxes are preserved whole when `preserve_on_failure` is
    /// set. Filesystem removal is attempted even under cancellation.
    ///
    /// # Errors
    /// [`SandboxError::NotFound`] for an unregistered id; store errors from
    /// clearing the mission record.
    pub fn cleanup(&self, sandbox_id: &str) -> Result<(), SandboxError> {
        let Some(sandbox) = self.get(sandbox_id) else {
            return Err(SandboxError::NotFound {
                id: sandbox_id.to_owned(),
            });
        };

        if sandbox.status == SandboxStatus::Failed && self.preserve_on_failure {
            tracing::info!(
                sandbox = sandbox_id,
                path = %sandbox.path.display(),
                "preserving failed sandbox for debugging"
            );
            return Ok(());
        }

        // Best-effort removal with a fresh token: cleanup proceeds even when
        // the caller's context is already cancelled.
        if let Err(err) =
            self.git
                .remove_worktree(&self.parent_repo, &sandbox.path, &CancelToken::new())
        {
            tracing::warn!(sandbox = sandbox_id, error = %err, "worktree removal fell back");
            if sandbox.path.exists() {
                std::fs::remove_dir_all(&sandbox.path)?;
            }
        }

        self.write_table().remove(sandbox_id);

        self.store.update_mission(
            &sandbox.mission_id,
            &MissionUpdates {
                sandbox_path: Some(None),
                branch_name: Some(None),
                ..MissionUpdates::default()
            },
        )?;

        tracing::info!(sandbox = sandbox_id, "sandbox cleaned");
        Ok(())
    }

    /// Clean every registered sandbox whose `last_used` is older than
    /// `older_than`. Errors accumulate; the sweep visits every candidate.
    pub fn cleanup_all(&self, older_than: chrono::Duration) -> CleanupSweep {
        let cutoff = Utc::now() - older_than;
        let stale: Vec<String> = self
            .read_table()
            .values()
            .filter(|sb| sb.last_used < cutoff)
            .map(|sb| sb.id.clone())
            .collect();

        let mut sweep = CleanupSweep::default();
        for id in stale {
            match self.cleanup(&id) {
                Ok(()) => sweep.cleaned.push(id),
                Err(err) => {
                    tracing::warn!(sandbox = %id, error = %err, "cleanup failed; continuing sweep");
                    sweep.failed.push((id, err));
                }
            }
        }
        sweep
    }

    // -- Lock plumbing -------------------------------------------------------

    fn read_table(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Sandbox>> {
        self.active.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_table(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Sandbox>> {
        self.active.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fast-path lookup that refreshes `last_used`.
    fn touch(&self, sandbox_id: &str) -> Option<Sandbox> {
        let mut table = self.write_table();
        let sandbox = table.get_mut(sandbox_id)?;
        sandbox.last_used = Utc::now();
        Some(sandbox.clone())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn slug_lowercases_and_collapses() {
        assert_eq!(slug("Fix the Auth Bug!"), "fix-the-auth-bug");
        assert_eq!(slug("  spaces   and___underscores  "), "spaces-and-underscores");
        assert_eq!(slug("already-sluggy"), "already-sluggy");
    }

    #[test]
    fn slug_trims_and_caps_at_fifty() {
        let long = "A".repeat(80);
        assert_eq!(slug(&long).len(), 50);

        // A cap landing on a separator leaves no trailing dash.
        let tricky = format!("{} {}", "x".repeat(49), "y".repeat(20));
        let s = slug(&tricky);
        assert!(s.len() <= 50);
        assert!(!s.ends_with('-'));
    }

    #[test]
    fn slug_of_empty_or_symbolic_input_is_empty() {
        assert_eq!(slug(""), "");
        assert_eq!(slug("!!!???"), "");
    }

    proptest! {
        #[test]
        fn slug_is_idempotent(input in ".{0,120}") {
            let once = slug(&input);
            prop_assert_eq!(slug(&once), once);
        }
    }

    #[test]
    fn naming_scheme_is_stable() {
        assert_eq!(SandboxManager::sandbox_id("vc-100"), "mission-vc-100");
        assert_eq!(
            SandboxManager::branch_name("vc-100", "Ship the Widget"),
            "mission/vc-100-ship-the-widget"
        );
    }
}
