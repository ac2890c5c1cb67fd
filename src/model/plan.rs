//! Mission plans: the proposed decomposition of a mission into phases and
//! tasks.
//!
//! A plan is the immutable input to validation and approval. It lives in the
//! issue store only until approval materializes it into tracked issues, after
//! which it is deleted.

use serde::{Deserialize, Serialize};

/// Lifecycle of a plan.
///
/// `Approved` is transient: a validated plan transitions to approved exactly
/// once, and approval finishes by deleting the plan.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    #[default]
    Draft,
    Validated,
    Approved,
    Deleted,
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Validated => write!(f, "validated"),
            Self::Approved => write!(f, "approved"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

/// A proposed decomposition of a mission.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Id of the mission (epic) this plan decomposes.
    pub mission_id: String,
    pub status: PlanStatus,
    /// Ordered phases. Phase order is the creation order at approval.
    pub phases: Vec<Phase>,
    /// Mission-level non-functional constraints the plan must cover.
    pub constraints: Vec<String>,
    /// Mission-level total estimate, cross-checked against the phase sum.
    pub mission_estimate_minutes: Option<i64>,
}

impl Plan {
    /// Total task count across all phases.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.phases.iter().map(|p| p.tasks.len()).sum()
    }
}

/// An intermediate grouping of tasks with its own dependency position.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    /// Plan-local id, unique among phases (e.g. `P1`).
    pub id: String,
    pub title: String,
    pub description: String,
    /// Execution strategy; becomes the phase issue's design field.
    pub strategy: String,
    pub estimated_hours: f64,
    pub priority: i32,
    /// Ids of other phases this phase depends on.
    pub depends_on: Vec<String>,
    /// Ordered tasks within this phase.
    pub tasks: Vec<PlanTask>,
}

/// The smallest planned unit of work.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanTask {
    /// Plan-local id, unique within its phase (e.g. `T1`).
    pub id: String,
    pub title: String,
    pub description: String,
    pub acceptance_criteria: Vec<String>,
    /// Ids of sibling tasks (same phase) this task depends on.
    pub depends_on: Vec<String>,
    pub estimated_minutes: i64,
    pub priority: i32,
}
