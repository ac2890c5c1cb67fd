//! Plan validation pipeline.
//!
//! A registry of validators sorted ascending by numeric priority. Priorities
//! are banded: 1–9 structural, 10–99 content quality, 100+ AI-driven
//! semantic analysis. Every validator runs even when earlier ones fail;
//! results merge into one [`ValidationResult`]. Errors block approval;
//! warnings may be overridden with an explicit force flag.

use std::sync::Arc;
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::model::Plan;
use crate::oracle::Oracle;

pub mod gap;
pub mod quality;
pub mod structure;

// ---------------------------------------------------------------------------
// Codes
// ---------------------------------------------------------------------------

/// Stable codes attached to validation findings.
pub mod code {
    pub const PHASE_CYCLE_DETECTED: &str = "PHASE_CYCLE_DETECTED";
    pub const TASK_CYCLE_DETECTED: &str = "TASK_CYCLE_DETECTED";
    pub const DUPLICATE_PHASE_ID: &str = "DUPLICATE_PHASE_ID";
    pub const DUPLICATE_TASK_ID: &str = "DUPLICATE_TASK_ID";
    pub const UNKNOWN_DEPENDENCY: &str = "UNKNOWN_DEPENDENCY";
    pub const PHASE_TOO_SMALL: &str = "PHASE_TOO_SMALL";
    pub const PHASE_TOO_LARGE: &str = "PHASE_TOO_LARGE";
    pub const MISSING_ACCEPTANCE_CRITERIA: &str = "MISSING_ACCEPTANCE_CRITERIA";
    pub const VAGUE_ACCEPTANCE_CRITERIA: &str = "VAGUE_ACCEPTANCE_CRITERIA";
    pub const TASK_ESTIMATE_INVALID: &str = "TASK_ESTIMATE_INVALID";
    pub const TASK_ESTIMATE_LARGE: &str = "TASK_ESTIMATE_LARGE";
    pub const PHASE_ESTIMATE_LARGE: &str = "PHASE_ESTIMATE_LARGE";
    pub const ESTIMATE_MISMATCH: &str = "ESTIMATE_MISMATCH";
    pub const MISSING_NFR_COVERAGE: &str = "MISSING_NFR_COVERAGE";
    pub const POTENTIAL_DUPLICATE: &str = "POTENTIAL_DUPLICATE";
    pub const MISSING_SCENARIO: &str = "MISSING_SCENARIO";
    pub const MISSING_EDGE_CASE: &str = "MISSING_EDGE_CASE";
    pub const IMPROVEMENT_SUGGESTION: &str = "IMPROVEMENT_SUGGESTION";
    pub const GAP_ANALYSIS_UNAVAILABLE: &str = "GAP_ANALYSIS_UNAVAILABLE";
    pub const VALIDATOR_FAILED: &str = "VALIDATOR_FAILED";
}

// ---------------------------------------------------------------------------
// Findings
// ---------------------------------------------------------------------------

/// Advisory severity carried on warnings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// A finding that blocks approval.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
    /// Plan location: a phase id (`P1`) or `phase/task` pair (`P1/T2`).
    pub location: Option<String>,
}

/// An advisory finding; `force` overrides warnings at approval.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationWarning {
    pub code: &'static str,
    pub message: String,
    pub severity: Severity,
    pub location: Option<String>,
}

/// Merged output of the validator pipeline.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn push_error(
        &mut self,
        code: &'static str,
        message: impl Into<String>,
        location: Option<String>,
    ) {
        self.errors.push(ValidationError {
            code,
            message: message.into(),
            location,
        });
    }

    pub fn push_warning(
        &mut self,
        code: &'static str,
        severity: Severity,
        message: impl Into<String>,
        location: Option<String>,
    ) {
        self.warnings.push(ValidationWarning {
            code,
            message: message.into(),
            severity,
            location,
        });
    }

    /// Fold another result into this one, preserving order.
    pub fn merge(&mut self, other: Self) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Whether approval may proceed. Errors always block; warnings block
    /// unless `force` is set.
    #[must_use]
    pub fn passes(&self, force: bool) -> bool {
        self.errors.is_empty() && (force || self.warnings.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Validator trait and registry
// ---------------------------------------------------------------------------

/// A validator's own failure (distinct from findings about the plan).
///
/// The registry traps these and converts them to a low-severity warning so
/// the pipeline always completes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatorError {
    pub detail: String,
}

impl std::fmt::Display for ValidatorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "validator failed: {}", self.detail)
    }
}

impl std::error::Error for ValidatorError {}

/// One pluggable validation pass over a plan.
pub trait Validator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Sort key: 1–9 structural, 10–99 content quality, 100+ AI semantic.
    fn priority(&self) -> u32;

    /// Inspect the plan and report findings.
    ///
    /// # Errors
    /// [`ValidatorError`] when the validator itself could not run; the
    /// registry degrades this to a warning.
    fn validate(&self, plan: &Plan, cancel: &CancelToken) -> Result<ValidationResult, ValidatorError>;
}

/// Priority-ordered collection of validators.
#[derive(Default)]
pub struct ValidatorRegistry {
    validators: Vec<Box<dyn Validator>>,
}

impl ValidatorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard pipeline. Gap analysis joins only when an oracle is
    /// available.
    #[must_use]
    pub fn standard(oracle: Option<Arc<dyn Oracle>>, gap_timeout: Duration) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(structure::CycleValidator));
        registry.register(Box::new(structure::ReferenceValidator));
        registry.register(Box::new(quality::PhaseSizeValidator));
        registry.register(Box::new(quality::AcceptanceCriteriaValidator));
        registry.register(Box::new(quality::EstimateValidator));
        registry.register(Box::new(quality::NfrCoverageValidator));
        registry.register(Box::new(quality::DuplicateWorkValidator));
        if let Some(oracle) = oracle {
            registry.register(Box::new(gap::GapAnalysisValidator::new(oracle, gap_timeout)));
        }
        registry
    }

    /// Insert keeping ascending priority order (stable for equal priorities).
    pub fn register(&mut self, validator: Box<dyn Validator>) {
        let pos = self
            .validators
            .iter()
            .position(|v| v.priority() > validator.priority())
            .unwrap_or(self.validators.len());
        self.validators.insert(pos, validator);
    }

    /// Registered validator names in execution order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.validators.iter().map(|v| v.name()).collect()
    }

    /// Run every validator and merge the findings. A validator that fails
    /// contributes a `VALIDATOR_FAILED` low warning instead of aborting the
    /// pipeline.
    #[must_use]
    pub fn run(&self, plan: &Plan, cancel: &CancelToken) -> ValidationResult {
        let mut merged = ValidationResult::default();
        for validator in &self.validators {
            match validator.validate(plan, cancel) {
                Ok(result) => merged.merge(result),
                Err(err) => {
                    tracing::warn!(
                        validator = validator.name(),
                        error = %err,
                        "validator failed; degrading to warning"
                    );
                    merged.push_warning(
                        code::VALIDATOR_FAILED,
                        Severity::Low,
                        format!("validator '{}' failed: {}", validator.name(), err.detail),
                        None,
                    );
                }
            }
        }
        merged
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    struct Stub {
        name: &'static str,
        priority: u32,
        fail: bool,
    }

    impl Validator for Stub {
        fn name(&self) -> &'static str {
            self.name
        }
        fn priority(&self) -> u32 {
            self.priority
        }
        fn validate(&self, _: &Plan, _: &CancelToken) -> Result<ValidationResult, ValidatorError> {
            if self.fail {
                return Err(ValidatorError {
                    detail: "boom".into(),
                });
            }
            let mut result = ValidationResult::default();
            result.push_warning(code::PHASE_TOO_SMALL, Severity::Medium, self.name, None);
            Ok(result)
        }
    }

    #[test]
    fn registry_sorts_by_priority_on_insert() {
        let mut registry = ValidatorRegistry::new();
        registry.register(Box::new(Stub {
            name: "late",
            priority: 100,
            fail: false,
        }));
        registry.register(Box::new(Stub {
            name: "early",
            priority: 1,
            fail: false,
        }));
        registry.register(Box::new(Stub {
            name: "middle",
            priority: 10,
            fail: false,
        }));
        assert_eq!(registry.names(), vec!["early", "middle", "late"]);
    }

    #[test]
    fn equal_priorities_keep_registration_order() {
        let mut registry = ValidatorRegistry::new();
        registry.register(Box::new(Stub {
            name: "first",
            priority: 10,
            fail: false,
        }));
        registry.register(Box::new(Stub {
            name: "second",
            priority: 10,
            fail: false,
        }));
        assert_eq!(registry.names(), vec!["first", "second"]);
    }

    #[test]
    fn failed_validator_degrades_to_low_warning_and_pipeline_continues() {
        let mut registry = ValidatorRegistry::new();
        registry.register(Box::new(Stub {
            name: "broken",
            priority: 1,
            fail: true,
        }));
        registry.register(Box::new(Stub {
            name: "fine",
            priority: 10,
            fail: false,
        }));

        let result = registry.run(&Plan::default(), &CancelToken::new());
        assert_eq!(result.warnings.len(), 2);
        assert_eq!(result.warnings[0].code, code::VALIDATOR_FAILED);
        assert_eq!(result.warnings[0].severity, Severity::Low);
        assert!(result.warnings[0].message.contains("broken"));
        assert_eq!(result.warnings[1].message, "fine");
    }

    #[test]
    fn passes_gates_on_errors_and_force() {
        let mut result = ValidationResult::default();
        assert!(result.passes(false));

        result.push_warning(code::PHASE_TOO_SMALL, Severity::Medium, "w", None);
        assert!(!result.passes(false));
        assert!(result.passes(true));

        result.push_error(code::PHASE_CYCLE_DETECTED, "e", None);
        assert!(!result.passes(true));
    }

    #[test]
    fn severity_orders_low_to_high() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
    }
}
