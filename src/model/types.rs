//! Issue, dependency, mission, and event types.
//!
//! Issues are owned by the store they were created in. An issue id is
//! immutable once the store assigns it; a sandbox store may contain an id
//! that does not exist in the main store, which marks it as a
//! sandbox-discovered issue whose canonical id is assigned at merge time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Lifecycle status of an issue.
///
/// Transitions to `Closed` are terminal for accounting; re-opening is a new
/// lifecycle event, not an undo.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Open,
    InProgress,
    Blocked,
    Closed,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Blocked => write!(f, "blocked"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Kind of tracked issue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    #[default]
    Task,
    Chore,
    Epic,
}

impl std::fmt::Display for IssueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Task => write!(f, "task"),
            Self::Chore => write!(f, "chore"),
            Self::Epic => write!(f, "epic"),
        }
    }
}

/// Sub-classification of an issue. Missions are epic-kind issues with
/// subkind `Mission`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubKind {
    #[default]
    Normal,
    Mission,
}

/// Kind of a dependency edge.
///
/// `ParentChild` edges point from child to parent: the child blocks the
/// parent's completion. The union of all edges in a store must form a DAG.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    Blocks,
    ParentChild,
}

impl std::fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blocks => write!(f, "blocks"),
            Self::ParentChild => write!(f, "parent_child"),
        }
    }
}

// ---------------------------------------------------------------------------
// Issue
// ---------------------------------------------------------------------------

/// A tracked unit of work.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    /// Store-assigned identifier (e.g. `vc-42`). Empty on a not-yet-created
    /// issue; the store assigns an id with its configured prefix on create.
    pub id: String,
    pub title: String,
    pub description: String,
    /// Design notes (a phase's strategy lands here at approval).
    pub design: String,
    /// Acceptance criteria as a single newline-joined string.
    pub acceptance_criteria: String,
    pub status: Status,
    pub kind: IssueKind,
    pub subkind: SubKind,
    /// Lower number = higher priority.
    pub priority: i32,
    pub estimated_minutes: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Typed partial update for an issue. Only `Some` fields are applied.
#[derive(Clone, Debug, Default)]
pub struct IssueUpdates {
    pub title: Option<String>,
    pub description: Option<String>,
    pub design: Option<String>,
    pub acceptance_criteria: Option<String>,
    pub status: Option<Status>,
    pub priority: Option<i32>,
    pub estimated_minutes: Option<Option<i64>>,
}

/// A directed dependency edge between two issues in the same store.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dependency {
    /// The issue that depends on (blocks) `to`.
    pub from: String,
    pub to: String,
    pub kind: DependencyKind,
}

impl Dependency {
    #[must_use]
    pub fn blocks(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            kind: DependencyKind::Blocks,
        }
    }
}

/// Optional filter for issue searches.
#[derive(Clone, Debug, Default)]
pub struct IssueFilter {
    pub status: Option<Status>,
    pub kind: Option<IssueKind>,
}

// ---------------------------------------------------------------------------
// Mission
// ---------------------------------------------------------------------------

/// A mission: an epic-kind issue plus its mission-state fields.
///
/// `approved_at` is set at most once; a later merge-back must not
/// re-approve.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mission {
    pub issue: Issue,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<String>,
    pub sandbox_path: Option<String>,
    pub branch_name: Option<String>,
}

impl Mission {
    /// Whether the mission has ever been approved.
    #[must_use]
    pub fn is_approved(&self) -> bool {
        self.approved_at.is_some()
    }

    /// Whether the mission currently has sandbox bookkeeping recorded.
    #[must_use]
    pub fn has_sandbox(&self) -> bool {
        self.sandbox_path.is_some() && self.branch_name.is_some()
    }
}

/// Typed partial update for mission-state fields.
///
/// Outer `Some` means "apply"; the inner `Option` is the stored value, so
/// `sandbox_path: Some(None)` clears the field.
#[derive(Clone, Debug, Default)]
pub struct MissionUpdates {
    pub approved_at: Option<Option<DateTime<Utc>>>,
    pub approved_by: Option<Option<String>>,
    pub sandbox_path: Option<Option<String>>,
    pub branch_name: Option<Option<String>>,
}

// ---------------------------------------------------------------------------
// Events and comments
// ---------------------------------------------------------------------------

/// An entry in the append-only activity log of an issue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub issue_id: String,
    /// Event kind, e.g. `created`, `status_changed`,
    /// `deduplication_batch_completed`.
    pub kind: String,
    pub actor: String,
    pub comment: Option<String>,
    pub payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// A payload-free event.
    #[must_use]
    pub fn new(issue_id: impl Into<String>, kind: impl Into<String>, actor: impl Into<String>) -> Self {
        Self {
            issue_id: issue_id.into(),
            kind: kind.into(),
            actor: actor.into(),
            comment: None,
            payload: None,
            created_at: Utc::now(),
        }
    }
}

/// A comment on an issue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub issue_id: String,
    pub author: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display_matches_wire_format() {
        assert_eq!(Status::Open.to_string(), "open");
        assert_eq!(Status::InProgress.to_string(), "in_progress");
        assert_eq!(Status::Blocked.to_string(), "blocked");
        assert_eq!(Status::Closed.to_string(), "closed");
    }

    #[test]
    fn status_serde_round_trip() {
        let json = serde_json::to_string(&Status::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        let back: Status = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Status::InProgress);
    }

    #[test]
    fn dependency_kind_display() {
        assert_eq!(DependencyKind::Blocks.to_string(), "blocks");
        assert_eq!(DependencyKind::ParentChild.to_string(), "parent_child");
    }

    #[test]
    fn dependency_blocks_constructor() {
        let dep = Dependency::blocks("vc-2", "vc-1");
        assert_eq!(dep.from, "vc-2");
        assert_eq!(dep.to, "vc-1");
        assert_eq!(dep.kind, DependencyKind::Blocks);
    }

    #[test]
    fn mission_approval_and_sandbox_flags() {
        let mut mission = Mission {
            issue: Issue {
                id: "vc-100".into(),
                kind: IssueKind::Epic,
                subkind: SubKind::Mission,
                ..Issue::default()
            },
            approved_at: None,
            approved_by: None,
            sandbox_path: None,
            branch_name: None,
        };
        assert!(!mission.is_approved());
        assert!(!mission.has_sandbox());

        mission.approved_at = Some(Utc::now());
        mission.sandbox_path = Some("/tmp/sb".into());
        assert!(mission.is_approved());
        // Branch name still missing: sandbox bookkeeping is incomplete.
        assert!(!mission.has_sandbox());

        mission.branch_name = Some("mission/vc-100-x".into());
        assert!(mission.has_sandbox());
    }

    #[test]
    fn default_issue_is_open_task() {
        let issue = Issue::default();
        assert_eq!(issue.status, Status::Open);
        assert_eq!(issue.kind, IssueKind::Task);
        assert_eq!(issue.subkind, SubKind::Normal);
        assert!(issue.id.is_empty());
    }
}
