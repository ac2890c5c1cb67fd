//! AI-driven gap analysis.
//!
//! Sends the plan to the oracle and surfaces what the model thinks is
//! missing. This validator never blocks: any transport or parse failure
//! degrades to a single low-severity warning.

use std::sync::Arc;
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::model::Plan;
use crate::oracle::{self, Oracle};

use super::{Severity, ValidationResult, Validator, ValidatorError, code};

/// Default deadline for the gap-analysis oracle call.
pub const DEFAULT_GAP_TIMEOUT: Duration = Duration::from_secs(60);

/// Semantic review of the plan by the AI oracle.
pub struct GapAnalysisValidator {
    oracle: Arc<dyn Oracle>,
    timeout: Duration,
}

impl GapAnalysisValidator {
    #[must_use]
    pub fn new(oracle: Arc<dyn Oracle>, timeout: Duration) -> Self {
        Self { oracle, timeout }
    }

    fn prompt(plan: &Plan) -> String {
        let plan_json =
            serde_json::to_string_pretty(plan).unwrap_or_else(|_| "<unserializable plan>".into());
        format!(
            "You are reviewing a mission plan for an autonomous coding agent.\n\
             Identify scenarios the plan misses, edge cases it does not cover,\n\
             and improvements worth making.\n\n\
             Plan:\n{plan_json}\n\n\
             Return raw JSON only, with this exact shape:\n\
             {{\"missing_scenarios\": [\"...\"], \"edge_cases\": [\"...\"],\n\
              \"suggestions\": [\"...\"], \"overall_assessment\": \"...\"}}"
        )
    }

    fn degraded(detail: &str) -> ValidationResult {
        let mut result = ValidationResult::default();
        result.push_warning(
            code::GAP_ANALYSIS_UNAVAILABLE,
            Severity::Low,
            format!("gap analysis unavailable: {detail}"),
            None,
        );
        result
    }

    fn surface(list: &serde_json::Value, key: &str, out: &mut Vec<String>) {
        if let Some(items) = list.get(key).and_then(|v| v.as_array()) {
            for item in items {
                if let Some(text) = item.as_str() {
                    out.push(text.to_owned());
                }
            }
        }
    }
}

impl Validator for GapAnalysisValidator {
    fn name(&self) -> &'static str {
        "gap_analysis"
    }

    fn priority(&self) -> u32 {
        100
    }

    fn validate(&self, plan: &Plan, cancel: &CancelToken) -> Result<ValidationResult, ValidatorError> {
        let raw = match self.oracle.complete(&Self::prompt(plan), self.timeout, cancel) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(error = %err, "gap analysis oracle call failed");
                return Ok(Self::degraded(&err.to_string()));
            }
        };

        let parsed = match oracle::parse_json_response(&raw) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(error = %err, "gap analysis response was not valid JSON");
                return Ok(Self::degraded(&err.to_string()));
            }
        };

        let mut result = ValidationResult::default();

        let mut scenarios = Vec::new();
        Self::surface(&parsed, "missing_scenarios", &mut scenarios);
        for text in scenarios {
            result.push_warning(code::MISSING_SCENARIO, Severity::High, text, None);
        }

        let mut edge_cases = Vec::new();
        Self::surface(&parsed, "edge_cases", &mut edge_cases);
        for text in edge_cases {
            result.push_warning(code::MISSING_EDGE_CASE, Severity::Medium, text, None);
        }

        let mut suggestions = Vec::new();
        Self::surface(&parsed, "suggestions", &mut suggestions);
        for text in suggestions {
            result.push_warning(code::IMPROVEMENT_SUGGESTION, Severity::Low, text, None);
        }

        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
