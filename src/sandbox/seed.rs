//! Sandbox DB seeding: copy the mission closure from the main store into a
//! fresh sandbox store.
//!
//! The closure is the mission itself, everything it transitively depends on,
//! and everything that transitively depends on it — for an approved plan
//! that second walk picks up the phase issues and, through them, their
//! tasks. The copy is a snapshot, not a live link; merge-back reconciles
//! later edits.

use std::collections::HashSet;

use crate::store::{Storage, StoreError};

/// Actor recorded on every seeded write. Merge-back filters events by this
/// actor so seeding noise never flows back to the main store.
pub const SEEDER_ACTOR: &str = "sandbox-seeder";

/// Dependency chains deeper than this mark the closure as untrustworthy.
pub const MAX_CLOSURE_DEPTH: usize = 50;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from seeding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SeedError {
    /// The dependency walk exceeded [`MAX_CLOSURE_DEPTH`]. Nothing was
    /// written: a chain this deep means the graph is corrupt, and a silent
    /// partial seed would be worse than failing.
    PathologicalChain { depth: usize },
    Store(StoreError),
}

impl std::fmt::Display for SeedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PathologicalChain { depth } => write!(
                f,
                "dependency chain exceeds {MAX_CLOSURE_DEPTH} levels (reached {depth}); refusing to seed"
            ),
            Self::Store(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for SeedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            Self::PathologicalChain { .. } => None,
        }
    }
}

impl From<StoreError> for SeedError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

/// What a seed pass copied.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub issues: usize,
    pub edges: usize,
    pub labels: usize,
}

// ---------------------------------------------------------------------------
// Seeding
// ---------------------------------------------------------------------------

/// Copy the mission closure of `mission_id` from `main` into `sandbox`.
///
/// Collection is read-only and happens first, so a depth failure writes
/// nothing; the writes then run inside one sandbox-store transaction. Edges
/// are copied only when both endpoints are in the closure, preventing
/// dangling references.
///
/// # Errors
/// [`SeedError::PathologicalChain`] when the walk exceeds the depth cap;
/// [`SeedError::Store`] on any store failure (the transaction rolls back).
pub fn seed_sandbox(
    main: &dyn Storage,
    sandbox: &dyn Storage,
    mission_id: &str,
) -> Result<SeedReport, SeedError> {
    // Phase 1: collect the closure. Explicit stack; depth is per-path.
    let mut visited: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut stack: Vec<(String, usize)> = vec![(mission_id.to_owned(), 0)];

    while let Some((id, depth)) = stack.pop() {
        if !seen.insert(id.clone()) {
            continue;
        }
        if depth > MAX_CLOSURE_DEPTH {
            return Err(SeedError::PathologicalChain { depth });
        }
        for dep in main.get_dependencies(&id)? {
            stack.push((dep.id, depth + 1));
        }
        visited.push(id);
    }

    // Walk dependents the same way: phases block the mission and tasks
    // block their phase, so one hop would stop at the phases and drop the
    // tasks the agent actually works on.
    let mut dependents: Vec<(String, usize)> = main
        .get_dependents(mission_id)?
        .into_iter()
        .map(|issue| (issue.id, 1))
        .collect();
    while let Some((id, depth)) = dependents.pop() {
        if !seen.insert(id.clone()) {
            continue;
        }
        if depth > MAX_CLOSURE_DEPTH {
            return Err(SeedError::PathologicalChain { depth });
        }
        for dependent in main.get_dependents(&id)? {
            dependents.push((dependent.id, depth + 1));
        }
        visited.push(id);
    }

    // Phase 2: read everything to copy, still touching only the main store.
    let mut payload = Vec::with_capacity(visited.len());
    for id in &visited {
        let issue = main.get_issue(id)?;
        let labels = main.get_labels(id)?;
        payload.push((issue, labels));
    }

    let mut edges = Vec::new();
    for id in &visited {
        for dep in main.get_dependency_records(id)? {
            if seen.contains(&dep.to) {
                edges.push(dep);
            }
        }
    }

    // Phase 3: one transactional write into the sandbox store.
    let mut label_count = 0;
    for (_, labels) in &payload {
        label_count += labels.len();
    }
    sandbox.run_in_transaction(&|txn| {
        for (issue, labels) in &payload {
            txn.create_issue(issue, SEEDER_ACTOR)?;
            for label in labels {
                txn.add_label(&issue.id, label, SEEDER_ACTOR)?;
            }
        }
        for edge in &edges {
            txn.add_dependency(edge, SEEDER_ACTOR)?;
        }
        Ok(())
    })?;

    // Carry the mission's approval state across so the sandbox sees the
    // mission exactly as the executor approved it.
    let mission = main.get_mission(mission_id)?;
    sandbox.update_mission(
        mission_id,
        &crate::model::MissionUpdates {
            approved_at: Some(mission.approved_at),
            approved_by: Some(mission.approved_by),
            ..crate::model::MissionUpdates::default()
        },
    )?;

    let report = SeedReport {
        issues: payload.len(),
        edges: edges.len(),
        labels: label_count,
    };
    tracing::info!(
        mission = mission_id,
        issues = report.issues,
        edges = report.edges,
        "sandbox seeded"
    );
    Ok(report)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Dependency, Issue, IssueFilter, IssueKind, SubKind};
    use crate::store::MemoryStore;

    fn issue(id: &str, kind: IssueKind) -> Issue {
        Issue {
            id: id.into(),
            title: format!("issue {id}"),
            kind,
            ..Issue::default()
        }
    }

    /// Main store with mission vc-100 depending on vc-101, child vc-102.
    fn seeded_main() -> MemoryStore {
        let main = MemoryStore::with_prefix("vc");
        let mission = Issue {
            subkind: SubKind::Mission,
            ..issue("vc-100", IssueKind::Epic)
        };
        main.create_issue(&mission, "t").unwrap();
        main.create_issue(&issue("vc-101", IssueKind::Task), "t").unwrap();
        main.create_issue(&issue("vc-102", IssueKind::Task), "t").unwrap();
        main.add_dependency(&Dependency::blocks("vc-100", "vc-101"), "t")
            .unwrap();
        main.add_dependency(&Dependency::blocks("vc-102", "vc-100"), "t")
            .unwrap();
        main.add_label("vc-102", "generated:plan", "t").unwrap();
        main
    }

    #[test]
    fn seeds_closure_with_edges_and_labels() {
        let main = seeded_main();
        let sandbox = MemoryStore::with_prefix("vc");

        let report = seed_sandbox(&main, &sandbox, "vc-100").unwrap();
        assert_eq!(report.issues, 3);
        assert_eq!(report.edges, 2);
        assert_eq!(report.labels, 1);

        for id in ["vc-100", "vc-101", "vc-102"] {
            assert!(sandbox.get_issue(id).is_ok(), "{id} must be seeded");
        }
        assert_eq!(
            sandbox.get_dependency_records("vc-100").unwrap().len(),
            1,
            "mission -> vc-101"
        );
        assert_eq!(
            sandbox.get_dependency_records("vc-102").unwrap().len(),
            1,
            "child -> mission"
        );
        assert_eq!(
            sandbox.get_labels("vc-102").unwrap(),
            vec!["generated:plan"]
        );
    }

    #[test]
    fn edges_to_issues_outside_the_closure_are_dropped() {
        let main = seeded_main();
        // vc-102 also depends on vc-104, which is not in the closure (the
        // walk does not traverse dependents' own dependencies).
        main.create_issue(&issue("vc-104", IssueKind::Task), "t").unwrap();
        main.add_dependency(&Dependency::blocks("vc-102", "vc-104"), "t")
            .unwrap();

        let sandbox = MemoryStore::with_prefix("vc");
        seed_sandbox(&main, &sandbox, "vc-100").unwrap();

        assert!(sandbox.get_issue("vc-104").is_err());
        let edges = sandbox.get_dependency_records("vc-102").unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].to, "vc-100");
    }

    #[test]
    fn transitive_dependencies_are_followed() {
        let main = seeded_main();
        main.create_issue(&issue("vc-103", IssueKind::Task), "t").unwrap();
        main.add_dependency(&Dependency::blocks("vc-101", "vc-103"), "t")
            .unwrap();

        let sandbox = MemoryStore::with_prefix("vc");
        let report = seed_sandbox(&main, &sandbox, "vc-100").unwrap();
        assert_eq!(report.issues, 4);
        assert!(sandbox.get_issue("vc-103").is_ok());
    }

    #[test]
    fn approved_plan_seeds_the_full_phase_and_task_tree() {
        use crate::approval::approve_and_create_issues;
        use crate::cancel::CancelToken;
        use crate::model::{Phase, Plan, PlanStatus, PlanTask};

        let main = MemoryStore::with_prefix("vc");
        main.create_issue(
            &Issue {
                subkind: SubKind::Mission,
                ..issue("vc-100", IssueKind::Epic)
            },
            "t",
        )
        .unwrap();

        let task = |id: &str| PlanTask {
            id: id.into(),
            title: format!("Task {id}"),
            acceptance_criteria: vec!["WHEN run THEN pass".into()],
            estimated_minutes: 30,
            ..PlanTask::default()
        };
        let plan = Plan {
            mission_id: "vc-100".into(),
            status: PlanStatus::Validated,
            phases: vec![
                Phase {
                    id: "P1".into(),
                    title: "Groundwork".into(),
                    tasks: vec![task("T1"), task("T2")],
                    ..Phase::default()
                },
                Phase {
                    id: "P2".into(),
                    title: "Delivery".into(),
                    tasks: vec![task("T3"), task("T4")],
                    ..Phase::default()
                },
            ],
            ..Plan::default()
        };
        main.put_plan(&plan).unwrap();
        let outcome =
            approve_and_create_issues(&main, &plan, "operator", &CancelToken::new()).unwrap();

        let sandbox = MemoryStore::with_prefix("vc");
        let report = seed_sandbox(&main, &sandbox, "vc-100").unwrap();

        // Mission + 2 phases + 4 tasks, with both levels of blocks edges.
        assert_eq!(report.issues, 7);
        assert_eq!(report.edges, 6);
        for id in outcome
            .phase_issue_ids
            .iter()
            .chain(outcome.task_issue_ids.iter())
        {
            assert!(sandbox.get_issue(id).is_ok(), "{id} must be seeded");
            assert!(
                sandbox
                    .get_labels(id)
                    .unwrap()
                    .contains(&"generated:plan".to_owned())
            );
        }

        // Task -> phase and phase -> mission edges both survive the copy.
        let task_edges = sandbox
            .get_dependency_records(&outcome.task_issue_ids[0])
            .unwrap();
        assert_eq!(task_edges.len(), 1);
        assert_eq!(task_edges[0].to, outcome.phase_issue_ids[0]);
        let phase_edges = sandbox
            .get_dependency_records(&outcome.phase_issue_ids[0])
            .unwrap();
        assert_eq!(phase_edges.len(), 1);
        assert_eq!(phase_edges[0].to, "vc-100");
    }

    #[test]
    fn dependents_deeper_than_the_cap_fail_like_dependencies_do() {
        let main = MemoryStore::with_prefix("vc");
        let mut previous = String::from("vc-0");
        main.create_issue(&issue(&previous, IssueKind::Epic), "t").unwrap();
        for i in 1..=(MAX_CLOSURE_DEPTH + 2) {
            let id = format!("vc-{i}");
            main.create_issue(&issue(&id, IssueKind::Task), "t").unwrap();
            // Each level blocks the one above it, rooted at the mission.
            main.add_dependency(&Dependency::blocks(id.clone(), previous.clone()), "t")
                .unwrap();
            previous = id;
        }

        let sandbox = MemoryStore::with_prefix("vc");
        let err = seed_sandbox(&main, &sandbox, "vc-0").unwrap_err();
        assert!(matches!(err, SeedError::PathologicalChain { .. }));
        assert!(
            sandbox
                .search_issues("", &IssueFilter::default())
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn depth_cap_fails_with_no_partial_seed() {
        let main = MemoryStore::with_prefix("vc");
        let mut previous = String::from("vc-0");
        main.create_issue(&issue(&previous, IssueKind::Epic), "t").unwrap();
        for i in 1..=(MAX_CLOSURE_DEPTH + 2) {
            let id = format!("vc-{i}");
            main.create_issue(&issue(&id, IssueKind::Task), "t").unwrap();
            main.add_dependency(&Dependency::blocks(previous.clone(), id.clone()), "t")
                .unwrap();
            previous = id;
        }

        let sandbox = MemoryStore::with_prefix("vc");
        let err = seed_sandbox(&main, &sandbox, "vc-0").unwrap_err();
        assert!(matches!(err, SeedError::PathologicalChain { .. }));
        assert!(
            sandbox
                .search_issues("", &IssueFilter::default())
                .unwrap()
                .is_empty(),
            "a failed seed must leave nothing behind"
        );
    }

    #[test]
    fn diamond_graphs_seed_each_issue_once() {
        let main = MemoryStore::with_prefix("vc");
        for id in ["vc-1", "vc-2", "vc-3", "vc-4"] {
            main.create_issue(&issue(id, IssueKind::Task), "t").unwrap();
        }
        // vc-1 -> {vc-2, vc-3} -> vc-4
        main.add_dependency(&Dependency::blocks("vc-1", "vc-2"), "t").unwrap();
        main.add_dependency(&Dependency::blocks("vc-1", "vc-3"), "t").unwrap();
        main.add_dependency(&Dependency::blocks("vc-2", "vc-4"), "t").unwrap();
        main.add_dependency(&Dependency::blocks("vc-3", "vc-4"), "t").unwrap();

        let sandbox = MemoryStore::with_prefix("vc");
        let report = seed_sandbox(&main, &sandbox, "vc-1").unwrap();
        assert_eq!(report.issues, 4);
        assert_eq!(report.edges, 4);
    }

    #[test]
    fn approval_state_is_carried_over() {
        let main = seeded_main();
        main.update_mission(
            "vc-100",
            &crate::model::MissionUpdates {
                approved_at: Some(Some(chrono::Utc::now())),
                approved_by: Some(Some("operator".into())),
                ..crate::model::MissionUpdates::default()
            },
        )
        .unwrap();

        let sandbox = MemoryStore::with_prefix("vc");
        seed_sandbox(&main, &sandbox, "vc-100").unwrap();
        let mission = sandbox.get_mission("vc-100").unwrap();
        assert!(mission.is_approved());
        assert_eq!(mission.approved_by.as_deref(), Some("operator"));
    }

    #[test]
    fn seeded_writes_carry_the_seeder_actor() {
        let main = seeded_main();
        let sandbox = MemoryStore::with_prefix("vc");
        seed_sandbox(&main, &sandbox, "vc-100").unwrap();

        let events = sandbox.get_events("vc-100", 10).unwrap();
        assert!(!events.is_empty());
        assert!(events.iter().all(|e| e.actor == SEEDER_ACTOR));
    }
}
