//! AI-driven conflict resolution.
//!
//! When a rebase or merge reports conflicts, the resolver parses the
//! markers, hands them to the oracle as an opaque JSON payload, writes the
//! files the oracle returns, and validates that no markers remain. Only a
//! clean validation is success; the caller then continues the rebase.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::cancel::{CancelToken, Cancelled};
use crate::oracle::{self, Oracle, OracleError};
use crate::vcs::{Git, VcsError, conflict};

/// Default deadline for a resolution oracle call.
pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(120);

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from conflict resolution.
#[derive(Debug)]
pub enum ResolveError {
    Vcs(VcsError),
    /// Transport/parse failure from the oracle. Retryable by the caller.
    Oracle(OracleError),
    /// The oracle's JSON did not match the resolution-plan shape.
    InvalidPlan(String),
    /// The written resolution still contains conflict markers.
    MarkersRemain,
    Io(std::io::Error),
    Cancelled,
}

impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vcs(e) => write!(f, "{e}"),
            Self::Oracle(e) => write!(f, "{e}"),
            Self::InvalidPlan(detail) => {
                write!(f, "oracle returned an invalid resolution plan: {detail}")
            }
            Self::MarkersRemain => write!(
                f,
                "resolution left conflict markers behind; the rebase must not continue"
            ),
            Self::Io(e) => write!(f, "I/O error while applying resolution: {e}"),
            Self::Cancelled => write!(f, "conflict resolution cancelled"),
        }
    }
}

impl std::error::Error for ResolveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Vcs(e) => Some(e),
            Self::Oracle(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<VcsError> for ResolveError {
    fn from(e: VcsError) -> Self {
        Self::Vcs(e)
    }
}

impl From<OracleError> for ResolveError {
    fn from(e: OracleError) -> Self {
        Self::Oracle(e)
    }
}

impl From<std::io::Error> for ResolveError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<Cancelled> for ResolveError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

// ---------------------------------------------------------------------------
// Resolution plan
// ---------------------------------------------------------------------------

/// The JSON shape the oracle must return.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ResolutionPlan {
    pub files: Vec<ResolvedFile>,
}

/// Full replacement content for one conflicted file.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ResolvedFile {
    pub path: String,
    pub content: String,
}

// ---------------------------------------------------------------------------
// ConflictResolver
// ---------------------------------------------------------------------------

/// Orchestrates parse → oracle → apply → validate.
pub struct ConflictResolver {
    oracle: Arc<dyn Oracle>,
    timeout: Duration,
}

impl ConflictResolver {
    #[must_use]
    pub fn new(oracle: Arc<dyn Oracle>, timeout: Duration) -> Self {
        Self { oracle, timeout }
    }

    /// Resolve the conflicts in `files` (paths relative to `repo`).
    ///
    /// On success every listed file is marker-free and the caller may run
    /// `rebase --continue`.
    ///
    /// # Errors
    /// See [`ResolveError`]. Oracle failures are retryable; a plan that
    /// leaves markers is [`ResolveError::MarkersRemain`].
    pub fn resolve(
        &self,
        git: &Git,
        repo: &Path,
        files: &[String],
        base_label: &str,
        current_label: &str,
        cancel: &CancelToken,
    ) -> Result<(), ResolveError> {
        let details = git.conflict_details(repo, files, base_label, current_label, cancel)?;
        let payload = serde_json::to_string_pretty(&details)
            .map_err(|e| ResolveError::InvalidPlan(format!("serialize conflict details: {e}")))?;

        let prompt = format!(
            "You are resolving merge conflicts for an autonomous coding agent.\n\
             For each file below, produce the final file content with every\n\
             conflict resolved. Preserve both sides' intent where possible;\n\
             prefer the current branch on irreconcilable changes.\n\n\
             Conflicts:\n{payload}\n\n\
             Return raw JSON only, with this exact shape:\n\
             {{\"files\": [{{\"path\": \"...\", \"content\": \"...\"}}]}}"
        );

        let raw = self.oracle.complete(&prompt, self.timeout, cancel)?;
        let value = oracle::parse_json_response(&raw)?;
        let plan: ResolutionPlan = serde_json::from_value(value)
            .map_err(|e| ResolveError::InvalidPlan(e.to_string()))?;

        for file in &plan.files {
            cancel.checkpoint()?;
            let target = conflict::resolve_within(repo, &file.path).ok_or_else(|| {
                ResolveError::Vcs(VcsError::PathEscape {
                    path: file.path.clone(),
                })
            })?;
            std::fs::write(target, &file.content)?;
        }

        if !git.validate_resolution(repo, files, cancel)? {
            return Err(ResolveError::MarkersRemain);
        }

        tracing::info!(files = files.len(), "conflicts resolved and validated");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedOracle {
        response: Result<String, OracleError>,
    }

    impl Oracle for ScriptedOracle {
        fn complete(
            &self,
            _prompt: &str,
            _timeout: Duration,
            _cancel: &CancelToken,
        ) -> Result<String, OracleError> {
            self.response.clone()
        }
    }

    fn resolver(response: Result<String, OracleError>) -> ConflictResolver {
        ConflictResolver::new(
            Arc::new(ScriptedOracle { response }),
            DEFAULT_RESOLVE_TIMEOUT,
        )
    }

    fn conflicted_repo() -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let content = "fn greet() {\n<<<<<<< HEAD\n    hello();\n=======\n    hi();\n>>>>>>> mission/vc-1-x\n}\n";
        std::fs::write(dir.path().join("greet.rs"), content).unwrap();
        (dir, "greet.rs".to_owned())
    }

    #[test]
    fn successful_resolution_writes_and_validates() {
        let (repo, file) = conflicted_repo();
        let plan = r#"```json
{"files": [{"path": "greet.rs", "content": "fn greet() {\n    hello();\n    hi();\n}\n"}]}
```"#;
        resolver(Ok(plan.to_owned()))
            .resolve(
                &Git::new(),
                repo.path(),
                &[file.clone()],
                "base",
                "current",
                &CancelToken::new(),
            )
            .unwrap();

        let written = std::fs::read_to_string(repo.path().join(&file)).unwrap();
        assert!(written.contains("hello()"));
        assert!(!written.contains("<<<<<<<"));
    }

    #[test]
    fn plan_leaving_markers_fails_validation() {
        let (repo, file) = conflicted_repo();
        // The "resolution" keeps the conflict verbatim.
        let original = std::fs::read_to_string(repo.path().join(&file)).unwrap();
        let plan = serde_json::json!({ "files": [{ "path": file, "content": original }] });
        let err = resolver(Ok(plan.to_string()))
            .resolve(
                &Git::new(),
                repo.path(),
                &[file],
                "base",
                "current",
                &CancelToken::new(),
            )
            .unwrap_err();
        assert!(matches!(err, ResolveError::MarkersRemain));
    }

    #[test]
    fn oracle_failure_is_retryable_error() {
        let (repo, file) = conflicted_repo();
        let err = resolver(Err(OracleError::Transport("down".into())))
            .resolve(
                &Git::new(),
                repo.path(),
                &[file],
                "base",
                "current",
                &CancelToken::new(),
            )
            .unwrap_err();
        assert!(matches!(err, ResolveError::Oracle(_)));
    }

    #[test]
    fn wrong_json_shape_is_invalid_plan() {
        let (repo, file) = conflicted_repo();
        let err = resolver(Ok(r#"{"resolutions": []}"#.to_owned()))
            .resolve(
                &Git::new(),
                repo.path(),
                &[file],
                "base",
                "current",
                &CancelToken::new(),
            )
            .unwrap_err();
        assert!(matches!(err, ResolveError::InvalidPlan(_)));
    }

    #[test]
    fn plan_escaping_the_repo_is_rejected() {
        let (repo, file) = conflicted_repo();
        let plan = serde_json::json!({
            "files": [{ "path": "../outside.rs", "content": "x" }]
        });
        let err = resolver(Ok(plan.to_string()))
            .resolve(
                &Git::new(),
                repo.path(),
                &[file],
                "base",
                "current",
                &CancelToken::new(),
            )
            .unwrap_err();
        assert!(matches!(err, ResolveError::Vcs(VcsError::PathEscape { .. })));
    }
}
