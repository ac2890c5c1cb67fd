//! Content-quality validators: phase sizing, acceptance criteria, estimates,
//! NFR coverage, and duplicate-work detection.

use std::collections::HashSet;

use crate::cancel::CancelToken;
use crate::model::{Plan, PlanTask};

use super::{Severity, ValidationResult, Validator, ValidatorError, code};

// Sizing and similarity thresholds. Tuned against real mission plans; the
// duplicate thresholds in particular are deliberately conservative.
const MIN_PHASE_TASKS: usize = 3;
const MAX_PHASE_TASKS: usize = 15;
const MAX_TASK_MINUTES: i64 = 240;
const MAX_PHASE_HOURS: f64 = 20.0;
const ESTIMATE_TOLERANCE: f64 = 0.10;
const TITLE_SIMILARITY_FLOOR: f64 = 0.3;
const DUPLICATE_THRESHOLD: f64 = 0.8;

// ---------------------------------------------------------------------------
// Tokenization helpers (shared by NFR coverage and duplicate detection)
// ---------------------------------------------------------------------------

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "are", "was", "were", "will", "would",
    "should", "must", "have", "has", "had", "been", "being", "not", "but", "all", "any", "can",
    "may", "its", "our", "your", "into", "when", "then", "than", "each", "such", "also",
];

/// Lowercased keyword set: split on non-alphanumerics, drop stop-words and
/// anything of length ≤ 2.
fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| w.len() > 2)
        .filter(|w| !STOP_WORDS.contains(w))
        .map(str::to_owned)
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    #[allow(clippy::cast_precision_loss)]
    {
        intersection as f64 / union as f64
    }
}

// ---------------------------------------------------------------------------
// Phase size
// ---------------------------------------------------------------------------

/// Flags phases that are too thin to be worth the sandbox overhead, or too
/// fat to review.
pub struct PhaseSizeValidator;

impl Validator for PhaseSizeValidator {
    fn name(&self) -> &'static str {
        "phase_size"
    }

    fn priority(&self) -> u32 {
        10
    }

    fn validate(&self, plan: &Plan, _cancel: &CancelToken) -> Result<ValidationResult, ValidatorError> {
        let mut result = ValidationResult::default();
        for phase in &plan.phases {
            let count = phase.tasks.len();
            if count < MIN_PHASE_TASKS {
                result.push_warning(
                    code::PHASE_TOO_SMALL,
                    Severity::Medium,
                    format!(
                        "phase '{}' has {count} task(s); consider folding it into a neighbor (minimum {MIN_PHASE_TASKS})",
                        phase.id
                    ),
                    Some(phase.id.clone()),
                );
            } else if count > MAX_PHASE_TASKS {
                result.push_warning(
                    code::PHASE_TOO_LARGE,
                    Severity::High,
                    format!(
                        "phase '{}' has {count} tasks; split it (maximum {MAX_PHASE_TASKS})",
                        phase.id
                    ),
                    Some(phase.id.clone()),
                );
            }
        }
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Acceptance criteria
// ---------------------------------------------------------------------------

/// Every task needs acceptance criteria, and each criterion should be
/// testable: a WHEN/THEN shape rather than a vague aspiration.
pub struct AcceptanceCriteriaValidator;

impl Validator for AcceptanceCriteriaValidator {
    fn name(&self) -> &'static str {
        "acceptance_criteria"
    }

    fn priority(&self) -> u32 {
        10
    }

    fn validate(&self, plan: &Plan, _cancel: &CancelToken) -> Result<ValidationResult, ValidatorError> {
        let mut result = ValidationResult::default();
        for phase in &plan.phases {
            for task in &phase.tasks {
                let location = format!("{}/{}", phase.id, task.id);
                if task.acceptance_criteria.is_empty() {
                    result.push_error(
                        code::MISSING_ACCEPTANCE_CRITERIA,
                        format!("task '{}' has no acceptance criteria", task.id),
                        Some(location),
                    );
                    continue;
                }
                for (i, criterion) in task.acceptance_criteria.iter().enumerate() {
                    let upper = criterion.to_uppercase();
                    if !(upper.contains("WHEN") && upper.contains("THEN")) {
                        result.push_warning(
                            code::VAGUE_ACCEPTANCE_CRITERIA,
                            Severity::Medium,
                            format!(
                                "criterion {} of task '{}' lacks a WHEN/THEN shape: \"{criterion}\"",
                                i + 1,
                                task.id
                            ),
                            Some(location.clone()),
                        );
                    }
                }
            }
        }
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Estimates
// ---------------------------------------------------------------------------

/// Sanity-checks estimates at task, phase, and mission level.
pub struct EstimateValidator;

impl Validator for EstimateValidator {
    fn name(&self) -> &'static str {
        "estimates"
    }

    fn priority(&self) -> u32 {
        10
    }

    fn validate(&self, plan: &Plan, _cancel: &CancelToken) -> Result<ValidationResult, ValidatorError> {
        let mut result = ValidationResult::default();

        for phase in &plan.phases {
            for task in &phase.tasks {
                let location = format!("{}/{}", phase.id, task.id);
                if task.estimated_minutes <= 0 {
                    result.push_warning(
                        code::TASK_ESTIMATE_INVALID,
                        Severity::Low,
                        format!(
                            "task '{}' has a non-positive estimate ({} min)",
                            task.id, task.estimated_minutes
                        ),
                        Some(location),
                    );
                } else if task.estimated_minutes > MAX_TASK_MINUTES {
                    result.push_warning(
                        code::TASK_ESTIMATE_LARGE,
                        Severity::Medium,
                        format!(
                            "task '{}' is estimated at {} min; break it down (maximum {MAX_TASK_MINUTES})",
                            task.id, task.estimated_minutes
                        ),
                        Some(location),
                    );
                }
            }

            if phase.estimated_hours > MAX_PHASE_HOURS {
                result.push_warning(
                    code::PHASE_ESTIMATE_LARGE,
                    Severity::High,
                    format!(
                        "phase '{}' is estimated at {:.1}h (maximum {MAX_PHASE_HOURS:.0}h)",
                        phase.id, phase.estimated_hours
                    ),
                    Some(phase.id.clone()),
                );
            }
        }

        if let Some(mission_minutes) = plan.mission_estimate_minutes
            && mission_minutes > 0
        {
            let phase_sum: f64 = plan.phases.iter().map(|p| p.estimated_hours * 60.0).sum();
            #[allow(clippy::cast_precision_loss)]
            let mission = mission_minutes as f64;
            if (mission - phase_sum).abs() > mission * ESTIMATE_TOLERANCE {
                result.push_warning(
                    code::ESTIMATE_MISMATCH,
                    Severity::Low,
                    format!(
                        "mission estimate ({mission_minutes} min) differs from the phase sum ({phase_sum:.0} min) by more than 10%"
                    ),
                    None,
                );
            }
        }

        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// NFR coverage
// ---------------------------------------------------------------------------

const NFR_HIGH_MARKERS: &[&str] = &["performance", "security", "test", "validate", "verify", "check"];
const NFR_MEDIUM_MARKERS: &[&str] = &["backward", "compatible", "breaking", "scope", "limit"];

/// Checks that each mission constraint is reflected somewhere in the plan's
/// tasks.
pub struct NfrCoverageValidator;

impl NfrCoverageValidator {
    fn constraint_severity(constraint: &str) -> Severity {
        let lower = constraint.to_lowercase();
        if NFR_HIGH_MARKERS.iter().any(|m| lower.contains(m)) {
            Severity::High
        } else if NFR_MEDIUM_MARKERS.iter().any(|m| lower.contains(m)) {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

impl Validator for NfrCoverageValidator {
    fn name(&self) -> &'static str {
        "nfr_coverage"
    }

    fn priority(&self) -> u32 {
        10
    }

    fn validate(&self, plan: &Plan, _cancel: &CancelToken) -> Result<ValidationResult, ValidatorError> {
        let mut result = ValidationResult::default();

        let haystacks: Vec<String> = plan
            .phases
            .iter()
            .flat_map(|p| p.tasks.iter())
            .map(|t| {
                format!(
                    "{} {} {}",
                    t.title.to_lowercase(),
                    t.description.to_lowercase(),
                    t.acceptance_criteria.join(" ").to_lowercase()
                )
            })
            .collect();

        for constraint in &plan.constraints {
            let keywords = tokenize(constraint);
            if keywords.is_empty() {
                continue;
            }
            let covered = haystacks
                .iter()
                .any(|hay| keywords.iter().any(|kw| hay.contains(kw)));
            if !covered {
                result.push_warning(
                    code::MISSING_NFR_COVERAGE,
                    Self::constraint_severity(constraint),
                    format!("no task addresses the constraint \"{constraint}\""),
                    None,
                );
            }
        }

        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Duplicate work
// ---------------------------------------------------------------------------

/// Flags near-identical tasks planned in different phases.
pub struct DuplicateWorkValidator;

impl Validator for DuplicateWorkValidator {
    fn name(&self) -> &'static str {
        "duplicate_work"
    }

    fn priority(&self) -> u32 {
        10
    }

    fn validate(&self, plan: &Plan, _cancel: &CancelToken) -> Result<ValidationResult, ValidatorError> {
        let mut result = ValidationResult::default();

        let tasks: Vec<(&str, &PlanTask)> = plan
            .phases
            .iter()
            .flat_map(|p| p.tasks.iter().map(move |t| (p.id.as_str(), t)))
            .collect();

        for (i, (phase_a, task_a)) in tasks.iter().enumerate() {
            let title_a = tokenize(&task_a.title);
            for (phase_b, task_b) in tasks.iter().skip(i + 1) {
                if phase_a == phase_b {
                    continue;
                }
                let title_sim = jaccard(&title_a, &tokenize(&task_b.title));
                if title_sim < TITLE_SIMILARITY_FLOOR {
                    continue;
                }
                let desc_sim = jaccard(&tokenize(&task_a.description), &tokenize(&task_b.description));
                let blended = 0.7 * title_sim + 0.3 * desc_sim;
                if blended >= DUPLICATE_THRESHOLD {
                    result.push_warning(
                        code::POTENTIAL_DUPLICATE,
                        Severity::High,
                        format!(
                            "task '{}' (phase {phase_a}) and task '{}' (phase {phase_b}) look like the same work (similarity {blended:.2})",
                            task_a.id, task_b.id
                        ),
                        Some(format!("{phase_a}/{}", task_a.id)),
                    );
                }
            }
        }

        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
