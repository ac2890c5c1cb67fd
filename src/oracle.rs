//! AI oracle contract.
//!
//! The AI transport is an external collaborator: a request is a textual
//! prompt ending with an instruction to return raw JSON of a named shape,
//! and the response is either that JSON or a failure. Models wrap JSON in
//! triple-backtick fences often enough that parsing always strips them
//! first.

use std::time::Duration;

use crate::cancel::{CancelToken, Cancelled};

/// Failures of the AI transport or of response parsing.
///
/// Validators degrade an `OracleError` to a low-severity warning; the
/// conflict resolver surfaces it for the caller to retry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OracleError {
    /// Transport-level failure (connection, HTTP, provider error).
    Transport(String),
    /// The call exceeded its deadline.
    Timeout { after: Duration },
    /// The response was not parseable as the requested JSON shape.
    InvalidResponse(String),
    /// The surrounding operation was cancelled.
    Cancelled,
}

impl std::fmt::Display for OracleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(detail) => write!(f, "oracle transport failure: {detail}"),
            Self::Timeout { after } => {
                write!(f, "oracle call timed out after {}s", after.as_secs())
            }
            Self::InvalidResponse(detail) => {
                write!(f, "oracle returned an unparseable response: {detail}")
            }
            Self::Cancelled => write!(f, "oracle call cancelled"),
        }
    }
}

impl std::error::Error for OracleError {}

impl From<Cancelled> for OracleError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

/// A request/response oracle over the AI transport.
pub trait Oracle: Send + Sync {
    /// Send `prompt` and return the raw completion text.
    ///
    /// # Errors
    /// [`OracleError`] on transport failure, deadline, or cancellation.
    fn complete(
        &self,
        prompt: &str,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<String, OracleError>;
}

/// Strip triple-backtick fences and leading whitespace, then parse JSON.
///
/// Accepts ` ```json ` / ` ``` ` fenced blocks as well as bare JSON.
///
/// # Errors
/// [`OracleError::InvalidResponse`] when the remainder is not valid JSON.
pub fn parse_json_response(raw: &str) -> Result<serde_json::Value, OracleError> {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        // Drop the info string (e.g. `json`) up to the first newline.
        let rest = rest.split_once('\n').map_or("", |(_, body)| body);
        text = rest.strip_suffix("```").unwrap_or(rest).trim();
    }
    serde_json::from_str(text).map_err(|e| OracleError::InvalidResponse(e.to_string()))
}
