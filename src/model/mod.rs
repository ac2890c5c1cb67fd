//! Domain types shared across the mission execution core.

pub mod plan;
pub mod types;

pub use plan::{Phase, Plan, PlanStatus, PlanTask};
pub use types::{
    Comment, Dependency, DependencyKind, Event, Issue, IssueFilter, IssueKind, IssueUpdates,
    Mission, MissionUpdates, Status, SubKind,
};
