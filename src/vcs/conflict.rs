//! Conflict marker parsing and resolution validation.
//!
//! A conflict region is bounded by `<<<<<<<` (ours), `=======` (separator)
//! and `>>>>>>>` (theirs). Markers must be balanced and never nest. Offsets
//! are 1-based line numbers with `start < middle < end`.

use std::path::{Component, Path, PathBuf};

use serde::Serialize;

/// One parsed conflict region in a file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConflictMarker {
    pub ours_label: String,
    pub ours: Vec<String>,
    pub theirs_label: String,
    pub theirs: Vec<String>,
    /// Line of the `<<<<<<<` sigil (1-based).
    pub start_line: usize,
    /// Line of the `=======` separator.
    pub middle_line: usize,
    /// Line of the `>>>>>>>` sigil.
    pub end_line: usize,
}

/// Parse failures for a single file under resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConflictParseError {
    /// Nested or unbalanced markers.
    Malformed { line: usize, detail: String },
    /// The file ended inside an open conflict region.
    Incomplete { line: usize },
}

impl std::fmt::Display for ConflictParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed { line, detail } => {
                write!(f, "malformed conflict marker at line {line}: {detail}")
            }
            Self::Incomplete { line } => {
                write!(f, "conflict marker opened at line {line} is never closed")
            }
        }
    }
}

impl std::error::Error for ConflictParseError {}

const OURS_SIGIL: &str = "<<<<<<<";
const SEP_SIGIL: &str = "=======";
const THEIRS_SIGIL: &str = ">>>>>>>";

enum ParseState {
    Outside,
    Ours,
    Theirs,
}

/// Parse every conflict region in `content`.
///
/// Marker lines may carry a label after the sigil (`<<<<<<< HEAD`); when
/// absent, `default_ours` / `default_theirs` fill in.
///
/// # Errors
/// [`ConflictParseError::Malformed`] on nesting, a separator repeated within
/// a region, or a close with no open region; [`ConflictParseError::Incomplete`]
/// when the file ends inside a region.
pub fn parse_markers(
    content: &str,
    default_ours: &str,
    default_theirs: &str,
) -> Result<Vec<ConflictMarker>, ConflictParseError> {
    let mut markers = Vec::new();
    let mut state = ParseState::Outside;

    let mut start_line = 0;
    let mut middle_line = 0;
    let mut ours_label = String::new();
    let mut ours: Vec<String> = Vec::new();
    let mut theirs: Vec<String> = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        let ln = idx + 1;
        if let Some(rest) = line.strip_prefix(OURS_SIGIL) {
            match state {
                ParseState::Outside => {
                    state = ParseState::Ours;
                    start_line = ln;
                    ours_label = label_or(rest, default_ours);
                    ours.clear();
                    theirs.clear();
                }
                ParseState::Ours | ParseState::Theirs => {
                    return Err(ConflictParseError::Malformed {
                        line: ln,
                        detail: "nested conflict start".to_owned(),
                    });
                }
            }
        } else if line.starts_with(SEP_SIGIL) {
            match state {
                // A separator outside any region is ordinary content.
                ParseState::Outside => {}
                ParseState::Ours => {
                    state = ParseState::Theirs;
                    middle_line = ln;
                }
                ParseState::Theirs => {
                    return Err(ConflictParseError::Malformed {
                        line: ln,
                        detail: "second separator inside conflict".to_owned(),
                    });
                }
            }
        } else if let Some(rest) = line.strip_prefix(THEIRS_SIGIL) {
            match state {
                ParseState::Theirs => {
                    markers.push(ConflictMarker {
                        ours_label: std::mem::take(&mut ours_label),
                        ours: std::mem::take(&mut ours),
                        theirs_label: label_or(rest, default_theirs),
                        theirs: std::mem::take(&mut theirs),
                        start_line,
                        middle_line,
                        end_line: ln,
                    });
                    state = ParseState::Outside;
                }
                ParseState::Ours => {
                    return Err(ConflictParseError::Malformed {
                        line: ln,
                        detail: "conflict closed before separator".to_owned(),
                    });
                }
                ParseState::Outside => {
                    return Err(ConflictParseError::Malformed {
                        line: ln,
                        detail: "conflict close with no open region".to_owned(),
                    });
                }
            }
        } else {
            match state {
                ParseState::Outside => {}
                ParseState::Ours => ours.push(line.to_owned()),
                ParseState::Theirs => theirs.push(line.to_owned()),
            }
        }
    }

    match state {
        ParseState::Outside => Ok(markers),
        ParseState::Ours | ParseState::Theirs => {
            Err(ConflictParseError::Incomplete { line: start_line })
        }
    }
}

fn label_or(rest: &str, default: &str) -> String {
    let trimmed = rest.trim();
    if trimmed.is_empty() {
        default.to_owned()
    } else {
        trimmed.to_owned()
    }
}

/// Whether `content` is free of line-leading conflict sigils.
#[must_use]
pub fn is_resolved(content: &str) -> bool {
    !content.lines().any(|line| {
        line.starts_with(OURS_SIGIL)
            || line.starts_with(SEP_SIGIL)
            || line.starts_with(THEIRS_SIGIL)
    })
}

/// Resolve `candidate` against `root`, lexically, and require the result to
/// stay within `root`. Returns `None` when the path escapes.
#[must_use]
pub fn resolve_within(root: &Path, candidate: &str) -> Option<PathBuf> {
    let candidate_path = Path::new(candidate);
    let joined = if candidate_path.is_absolute() {
        candidate_path.to_path_buf()
    } else {
        root.join(candidate_path)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return None;
                }
            }
            other => normalized.push(other),
        }
    }

    normalized.starts_with(root).then_some(normalized)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
