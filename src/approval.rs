//! Plan approval: atomic materialization of a validated plan into tracked
//! issues.
//!
//! Every issue creation, label, and dependency insertion runs inside one
//! store transaction; if anything fails the store is untouched. The mission
//! update and plan deletion are post-commit finalization steps with their
//! own error class, so a caller can retry just the finalization without
//! re-creating issues.

use std::cell::RefCell;

use chrono::Utc;

use crate::cancel::{CancelToken, Cancelled};
use crate::model::{Dependency, Issue, IssueKind, MissionUpdates, Plan, PlanStatus};
use crate::store::{Storage, StoreError};

/// Label attached to every issue materialized from a plan.
pub const PLAN_LABEL: &str = "generated:plan";

/// Actor recorded on approval writes.
const APPROVAL_ACTOR: &str = "plan-approval";

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from plan approval.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApprovalError {
    /// A precondition failed before (or inside) the transaction: plan not
    /// validated, mission missing or not an epic, mission already approved.
    /// Nothing was written.
    Precondition(String),
    /// The store failed and the transaction rolled back. Nothing was
    /// written.
    Store(StoreError),
    /// Issues were committed but the post-commit finalization (mission
    /// update, plan deletion) failed. Retry the finalization only.
    Finalization(StoreError),
    /// Cancelled before the transaction was entered. Retryable.
    Cancelled,
}

impl std::fmt::Display for ApprovalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Precondition(detail) => write!(f, "approval precondition failed: {detail}"),
            Self::Store(err) => write!(f, "approval rolled back: {err}"),
            Self::Finalization(err) => write!(
                f,
                "plan issues were created but finalization failed (retry finalization): {err}"
            ),
            Self::Cancelled => write!(f, "approval cancelled"),
        }
    }
}

impl std::error::Error for ApprovalError {}

impl From<Cancelled> for ApprovalError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

/// Issues created by a successful approval.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApprovalOutcome {
    /// One chore issue per phase, in plan order.
    pub phase_issue_ids: Vec<String>,
    /// One task issue per task, in plan order.
    pub task_issue_ids: Vec<String>,
}

// ---------------------------------------------------------------------------
// Approval
// ---------------------------------------------------------------------------

/// Approve `plan` and materialize it into `store`.
///
/// Phase issues are chore-kind with the phase strategy as design and the
/// phase estimate converted to minutes; each gets a `Blocks` edge to the
/// mission. Task issues are task-kind with acceptance criteria joined by
/// newlines; each gets a `Blocks` edge to its phase. Everything is labeled
/// [`PLAN_LABEL`].
///
/// # Errors
/// See [`ApprovalError`]. The approved-at check is repeated inside the
/// transaction, so two racing approvals cannot both succeed.
pub fn approve_and_create_issues(
    store: &dyn Storage,
    plan: &Plan,
    approver: &str,
    cancel: &CancelToken,
) -> Result<ApprovalOutcome, ApprovalError> {
    cancel.checkpoint()?;

    if plan.status != PlanStatus::Validated {
        return Err(ApprovalError::Precondition(format!(
            "plan for mission '{}' is {}, not validated",
            plan.mission_id, plan.status
        )));
    }

    let mission = store.get_mission(&plan.mission_id).map_err(|err| match err {
        StoreError::IssueNotFound { id } => {
            ApprovalError::Precondition(format!("mission '{id}' does not exist"))
        }
        other => ApprovalError::Store(other),
    })?;
    if mission.issue.kind != IssueKind::Epic {
        return Err(ApprovalError::Precondition(format!(
            "issue '{}' is a {}, not an epic",
            mission.issue.id, mission.issue.kind
        )));
    }
    if mission.is_approved() {
        return Err(ApprovalError::Precondition(format!(
            "mission '{}' is already approved",
            mission.issue.id
        )));
    }

    let mission_id = plan.mission_id.clone();
    let phase_ids: RefCell<Vec<String>> = RefCell::new(Vec::new());
    let task_ids: RefCell<Vec<String>> = RefCell::new(Vec::new());
    let raced: RefCell<bool> = RefCell::new(false);

    let txn_result = store.run_in_transaction(&|txn| {
        // Linearizability: re-check the approval flag inside the
        // transaction; a concurrent approval may have won since the check
        // above.
        if txn.get_mission(&mission_id)?.is_approved() {
            *raced.borrow_mut() = true;
            return Err(StoreError::Invalid {
                detail: format!("mission '{mission_id}' is already approved"),
            });
        }

        for phase in &plan.phases {
            #[allow(clippy::cast_possible_truncation)]
            let phase_minutes = (phase.estimated_hours * 60.0).round() as i64;
            let phase_issue_id = txn.create_issue(
                &Issue {
                    title: phase.title.clone(),
                    description: phase.description.clone(),
                    design: phase.strategy.clone(),
                    kind: IssueKind::Chore,
                    priority: phase.priority,
                    estimated_minutes: Some(phase_minutes),
                    ..Issue::default()
                },
                APPROVAL_ACTOR,
            )?;
            txn.add_label(&phase_issue_id, PLAN_LABEL, APPROVAL_ACTOR)?;
            txn.add_dependency(
                &Dependency::blocks(phase_issue_id.clone(), mission_id.clone()),
                APPROVAL_ACTOR,
            )?;

            for task in &phase.tasks {
                let task_issue_id = txn.create_issue(
                    &Issue {
                        title: task.title.clone(),
                        description: task.description.clone(),
                        acceptance_criteria: task.acceptance_criteria.join("\n"),
                        kind: IssueKind::Task,
                        priority: task.priority,
                        estimated_minutes: Some(task.estimated_minutes),
                        ..Issue::default()
                    },
                    APPROVAL_ACTOR,
                )?;
                txn.add_label(&task_issue_id, PLAN_LABEL, APPROVAL_ACTOR)?;
                txn.add_dependency(
                    &Dependency::blocks(task_issue_id.clone(), phase_issue_id.clone()),
                    APPROVAL_ACTOR,
                )?;
                task_ids.borrow_mut().push(task_issue_id);
            }

            phase_ids.borrow_mut().push(phase_issue_id);
        }
        Ok(())
    });

    if let Err(err) = txn_result {
        if *raced.borrow() {
            return Err(ApprovalError::Precondition(format!(
                "mission '{mission_id}' is already approved"
            )));
        }
        return Err(ApprovalError::Store(err));
    }

    // Post-commit finalization. Failures here leave the issues in place.
    store
        .update_mission(
            &mission_id,
            &MissionUpdates {
                approved_at: Some(Some(Utc::now())),
                approved_by: Some(Some(approver.to_owned())),
                ..MissionUpdates::default()
            },
        )
        .map_err(ApprovalError::Finalization)?;
    store
        .delete_plan(&mission_id)
        .map_err(ApprovalError::Finalization)?;

    tracing::info!(
        mission = %mission_id,
        phases = phase_ids.borrow().len(),
        tasks = task_ids.borrow().len(),
        "plan approved and materialized"
    );

    Ok(ApprovalOutcome {
        phase_issue_ids: phase_ids.into_inner(),
        task_issue_ids: task_ids.into_inner(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
