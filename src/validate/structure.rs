//! Structural validators: dependency cycles and id/reference integrity.

use std::collections::HashMap;

use crate::cancel::CancelToken;
use crate::model::Plan;

use super::{ValidationResult, Validator, ValidatorError, code};

// ---------------------------------------------------------------------------
// Cycle detection
// ---------------------------------------------------------------------------

/// Detects cycles in the phase-dependency graph and in each phase's internal
/// task-dependency graph. Priority 1: nothing else is trustworthy on a
/// cyclic plan.
pub struct CycleValidator;

impl Validator for CycleValidator {
    fn name(&self) -> &'static str {
        "cycle_detection"
    }

    fn priority(&self) -> u32 {
        1
    }

    fn validate(&self, plan: &Plan, _cancel: &CancelToken) -> Result<ValidationResult, ValidatorError> {
        let mut result = ValidationResult::default();

        let phase_ids: Vec<&str> = plan.phases.iter().map(|p| p.id.as_str()).collect();
        let phase_edges: HashMap<&str, Vec<&str>> = plan
            .phases
            .iter()
            .map(|p| {
                (
                    p.id.as_str(),
                    p.depends_on
                        .iter()
                        .map(String::as_str)
                        .filter(|d| phase_ids.contains(d))
                        .collect(),
                )
            })
            .collect();

        if let Some(cycle) = find_cycle(&phase_ids, &phase_edges) {
            result.push_error(
                code::PHASE_CYCLE_DETECTED,
                format!("phase dependency cycle: {}", render_cycle(&cycle)),
                cycle.first().cloned(),
            );
        }

        for phase in &plan.phases {
            let task_ids: Vec<&str> = phase.tasks.iter().map(|t| t.id.as_str()).collect();
            let task_edges: HashMap<&str, Vec<&str>> = phase
                .tasks
                .iter()
                .map(|t| {
                    (
                        t.id.as_str(),
                        t.depends_on
                            .iter()
                            .map(String::as_str)
                            .filter(|d| task_ids.contains(d))
                            .collect(),
                    )
                })
                .collect();

            if let Some(cycle) = find_cycle(&task_ids, &task_edges) {
                result.push_error(
                    code::TASK_CYCLE_DETECTED,
                    format!(
                        "task dependency cycle in phase {}: {}",
                        phase.id,
                        render_cycle(&cycle)
                    ),
                    Some(phase.id.clone()),
                );
            }
        }

        Ok(result)
    }
}

/// DFS with an explicit stack and on-stack markers; native recursion would
/// overflow on adversarial plans.
///
/// Returns the first cycle found as a node path (without the closing
/// repetition — [`render_cycle`] appends it).
fn find_cycle(order: &[&str], edges: &HashMap<&str, Vec<&str>>) -> Option<Vec<String>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        New,
        OnStack,
        Done,
    }

    let mut marks: HashMap<&str, Mark> = order.iter().map(|id| (*id, Mark::New)).collect();

    for &root in order {
        if marks.get(root) != Some(&Mark::New) {
            continue;
        }

        let mut stack: Vec<(&str, usize)> = vec![(root, 0)];
        let mut chain: Vec<&str> = vec![root];
        marks.insert(root, Mark::OnStack);

        while let Some(frame) = stack.last_mut() {
            let node = frame.0;
            let children = edges.get(node).map_or(&[][..], Vec::as_slice);
            if frame.1 < children.len() {
                let child = children[frame.1];
                frame.1 += 1;
                match marks.get(child) {
                    Some(Mark::OnStack) => {
                        // Back edge: the cycle is the chain from the first
                        // occurrence of `child` onward. A self-loop yields a
                        // single-element chain.
                        let pos = chain.iter().position(|n| *n == child).unwrap_or(0);
                        return Some(chain[pos..].iter().map(|s| (*s).to_owned()).collect());
                    }
                    Some(Mark::New) => {
                        marks.insert(child, Mark::OnStack);
                        stack.push((child, 0));
                        chain.push(child);
                    }
                    _ => {}
                }
            } else {
                marks.insert(node, Mark::Done);
                stack.pop();
                chain.pop();
            }
        }
    }
    None
}

/// Render `[A, B, C]` as `A → B → C → A`.
fn render_cycle(cycle: &[String]) -> String {
    let mut path = cycle.join(" → ");
    if let Some(first) = cycle.first() {
        path.push_str(" → ");
        path.push_str(first);
    }
    path
}

// ---------------------------------------------------------------------------
// Reference integrity
// ---------------------------------------------------------------------------

/// Enforces the plan id invariants: phase ids unique in the plan, task ids
/// unique within their phase, dependencies naming only known siblings.
pub struct ReferenceValidator;

impl Validator for ReferenceValidator {
    fn name(&self) -> &'static str {
        "reference_integrity"
    }

    fn priority(&self) -> u32 {
        2
    }

    fn validate(&self, plan: &Plan, _cancel: &CancelToken) -> Result<ValidationResult, ValidatorError> {
        let mut result = ValidationResult::default();

        let mut seen_phases: Vec<&str> = Vec::new();
        for phase in &plan.phases {
            if seen_phases.contains(&phase.id.as_str()) {
                result.push_error(
                    code::DUPLICATE_PHASE_ID,
                    format!("phase id '{}' appears more than once", phase.id),
                    Some(phase.id.clone()),
                );
            } else {
                seen_phases.push(&phase.id);
            }
        }

        let all_phase_ids: Vec<&str> = plan.phases.iter().map(|p| p.id.as_str()).collect();
        for phase in &plan.phases {
            for dep in &phase.depends_on {
                if !all_phase_ids.contains(&dep.as_str()) {
                    result.push_error(
                        code::UNKNOWN_DEPENDENCY,
                        format!("phase '{}' depends on unknown phase '{dep}'", phase.id),
                        Some(phase.id.clone()),
                    );
                }
            }

            let mut seen_tasks: Vec<&str> = Vec::new();
            for task in &phase.tasks {
                if seen_tasks.contains(&task.id.as_str()) {
                    result.push_error(
                        code::DUPLICATE_TASK_ID,
                        format!(
                            "task id '{}' appears more than once in phase '{}'",
                            task.id, phase.id
                        ),
                        Some(format!("{}/{}", phase.id, task.id)),
                    );
                } else {
                    seen_tasks.push(&task.id);
                }
            }

            let sibling_ids: Vec<&str> = phase.tasks.iter().map(|t| t.id.as_str()).collect();
            for task in &phase.tasks {
                for dep in &task.depends_on {
                    if !sibling_ids.contains(&dep.as_str()) {
                        result.push_error(
                            code::UNKNOWN_DEPENDENCY,
                            format!(
                                "task '{}' depends on '{dep}', which is not a sibling in phase '{}'",
                                task.id, phase.id
                            ),
                            Some(format!("{}/{}", phase.id, task.id)),
                        );
                    }
                }
            }
        }

        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Phase, PlanTask};

    fn phase(id: &str, deps: &[&str]) -> Phase {
        Phase {
            id: id.into(),
            title: id.into(),
            depends_on: deps.iter().map(|s| (*s).to_owned()).collect(),
            ..Phase::default()
        }
    }

    fn task(id: &str, deps: &[&str]) -> PlanTask {
        PlanTask {
            id: id.into(),
            title: id.into(),
            depends_on: deps.iter().map(|s| (*s).to_owned()).collect(),
            ..PlanTask::default()
        }
    }

    fn run(plan: &Plan) -> ValidationResult {
        CycleValidator
            .validate(plan, &CancelToken::new())
            .expect("cycle validator never fails")
    }

    #[test]
    fn two_phase_cycle_yields_exactly_one_error_with_arrow_path() {
        let plan = Plan {
            phases: vec![phase("P1", &["P2"]), phase("P2", &["P1"])],
            ..Plan::default()
        };
        let result = run(&plan);
        assert_eq!(result.errors.len(), 1);
        let err = &result.errors[0];
        assert_eq!(err.code, code::PHASE_CYCLE_DETECTED);
        assert!(err.message.contains("→"), "path must render with arrows");
        // Rendered path begins and ends with the same id.
        let path = err.message.split(": ").nth(1).expect("message has a path");
        let ids: Vec<&str> = path.split(" → ").collect();
        assert_eq!(ids.first(), ids.last());
    }

    #[test]
    fn self_loop_counts_as_cycle() {
        let plan = Plan {
            phases: vec![phase("P1", &["P1"])],
            ..Plan::default()
        };
        let result = run(&plan);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].message.contains("P1 → P1"));
    }

    #[test]
    fn acyclic_phases_pass() {
        let plan = Plan {
            phases: vec![phase("P1", &[]), phase("P2", &["P1"]), phase("P3", &["P1", "P2"])],
            ..Plan::default()
        };
        assert!(run(&plan).errors.is_empty());
    }

    #[test]
    fn task_cycle_is_reported_per_phase() {
        let mut p = phase("P1", &[]);
        p.tasks = vec![task("T1", &["T2"]), task("T2", &["T1"])];
        let plan = Plan {
            phases: vec![p],
            ..Plan::default()
        };
        let result = run(&plan);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].code, code::TASK_CYCLE_DETECTED);
        assert_eq!(result.errors[0].location.as_deref(), Some("P1"));
    }

    #[test]
    fn long_chain_does_not_overflow() {
        // 10k phases in a line, then a back edge closing the loop.
        let phases: Vec<Phase> = (0..10_000)
            .map(|i| {
                if i == 0 {
                    phase("P0", &["P9999"])
                } else {
                    let dep = format!("P{}", i - 1);
                    phase(&format!("P{i}"), &[dep.as_str()])
                }
            })
            .collect();
        let plan = Plan {
            phases,
            ..Plan::default()
        };
        let result = run(&plan);
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn unknown_phase_dependency_is_ignored_by_cycle_detection() {
        let plan = Plan {
            phases: vec![phase("P1", &["ghost"])],
            ..Plan::default()
        };
        assert!(run(&plan).errors.is_empty());
    }

    #[test]
    fn reference_validator_flags_duplicates_and_unknowns() {
        let mut p1 = phase("P1", &["missing"]);
        p1.tasks = vec![task("T1", &[]), task("T1", &[]), task("T2", &["ghost"])];
        let plan = Plan {
            phases: vec![p1, phase("P2", &[]), phase("P2", &[])],
            ..Plan::default()
        };
        let result = ReferenceValidator
            .validate(&plan, &CancelToken::new())
            .expect("reference validator never fails");

        let codes: Vec<&str> = result.errors.iter().map(|e| e.code).collect();
        assert!(codes.contains(&code::DUPLICATE_PHASE_ID));
        assert!(codes.contains(&code::DUPLICATE_TASK_ID));
        assert!(codes.contains(&code::UNKNOWN_DEPENDENCY));
        // One unknown phase dep + one unknown task dep.
        assert_eq!(
            codes.iter().filter(|c| **c == code::UNKNOWN_DEPENDENCY).count(),
            2
        );
    }

    #[test]
    fn clean_plan_has_no_reference_errors() {
        let mut p = phase("P1", &[]);
        p.tasks = vec![task("T1", &[]), task("T2", &["T1"])];
        let plan = Plan {
            phases: vec![p],
            ..Plan::default()
        };
        let result = ReferenceValidator
            .validate(&plan, &CancelToken::new())
            .expect("reference validator never fails");
        assert!(result.errors.is_empty());
    }
}
