//! Git CLI adapter.
//!
//! A stateless contract over the `git` command line. Every operation takes a
//! repository path (trusted, pre-validated by the caller) and a cancellation
//! token, spawns git with an argv vector (never a shell), and surfaces
//! captured stderr on failure.
//!
//! We deliberately shell out instead of binding libgit2: the CLI refuses to
//! clobber uncommitted work during checkout/merge/rebase, natively handles
//! worktrees, and keeps the subprocess boundary identical to what agents see.
//!
//! A conflicted rebase or merge is not an error at this layer: the adapter
//! confirms conflicts via `git diff --name-only --diff-filter=U` and returns
//! a success value the caller must handle.

use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{DateTime, Utc};

use crate::cancel::{CancelToken, Cancelled};

pub mod conflict;

pub use conflict::{ConflictMarker, ConflictParseError};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from the git adapter.
#[derive(Debug)]
pub enum VcsError {
    /// A git command failed (and the failure was not a conflict outcome).
    Command {
        command: String,
        stderr: String,
        exit_code: Option<i32>,
    },
    /// Commit requested with an empty message.
    EmptyMessage,
    /// Mutually exclusive options violated, or an operation invoked in a
    /// state it does not apply to.
    Usage(String),
    /// A file path resolved outside the repository root. Never retried.
    PathEscape { path: String },
    /// Conflict markers in a file could not be parsed.
    Marker {
        file: String,
        source: ConflictParseError,
    },
    /// An I/O error while spawning git or reading files.
    Io(std::io::Error),
    /// The operation was cancelled between steps.
    Cancelled,
}

impl std::fmt::Display for VcsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Command {
                command,
                stderr,
                exit_code,
            } => {
                write!(f, "`{command}` failed")?;
                if let Some(code) = exit_code {
                    write!(f, " (exit code {code})")?;
                }
                if !stderr.is_empty() {
                    write!(f, ": {stderr}")?;
                }
                Ok(())
            }
            Self::EmptyMessage => write!(f, "commit message must not be empty"),
            Self::Usage(detail) => write!(f, "{detail}"),
            Self::PathEscape { path } => {
                write!(f, "path '{path}' resolves outside the repository root")
            }
            Self::Marker { file, source } => write!(f, "{file}: {source}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Cancelled => write!(f, "git operation cancelled"),
        }
    }
}

impl std::error::Error for VcsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Marker { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<std::io::Error> for VcsError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<Cancelled> for VcsError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

/// Adapter result alias.
pub type Result<T> = std::result::Result<T, VcsError>;

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Structured working-tree state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorktreeStatus {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
    pub renamed: Vec<RenamedFile>,
    pub untracked: Vec<String>,
}

impl WorktreeStatus {
    /// Whether any change (tracked or untracked) is present.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        !(self.added.is_empty()
            && self.modified.is_empty()
            && self.deleted.is_empty()
            && self.renamed.is_empty()
            && self.untracked.is_empty())
    }
}

/// A rename entry from porcelain status.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenamedFile {
    pub from: String,
    pub to: String,
}

/// Options for [`Git::commit`].
#[derive(Clone, Debug, Default)]
pub struct CommitOptions {
    /// Required subject (plus optional body).
    pub message: String,
    /// `Name <email>` override for the commit author.
    pub author: Option<String>,
    /// Appended as `Co-Authored-By:` trailers after a blank line.
    pub co_authors: Vec<String>,
    /// Stage everything (`git add -A`) before committing.
    pub stage_all: bool,
    pub allow_empty: bool,
}

/// Options for [`Git::rebase`]. Exactly one of the three must be selected.
#[derive(Clone, Debug, Default)]
pub struct RebaseOptions {
    /// Rebase the current branch onto this branch.
    pub onto: Option<String>,
    /// Continue an in-progress rebase after conflict resolution.
    pub continue_rebase: bool,
    /// Abort an in-progress rebase.
    pub abort: bool,
}

/// Outcome of a rebase. `has_conflicts = true` is an expected terminal state
/// the caller must handle, not an error.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RebaseResult {
    pub success: bool,
    pub has_conflicts: bool,
    pub conflicted_files: Vec<String>,
    pub current_branch: String,
    pub base_branch: String,
    pub error_message: Option<String>,
    pub aborted_successfully: bool,
}

/// Outcome of a merge, with the same conflict-as-value contract as rebase.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeResult {
    pub success: bool,
    pub has_conflicts: bool,
    pub conflicted_files: Vec<String>,
}

/// One entry from `git worktree list --porcelain`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorktreeInfo {
    pub path: PathBuf,
    pub head: String,
    /// `None` for detached worktrees.
    pub branch: Option<String>,
}

/// Parsed conflict regions for one file.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct FileConflicts {
    pub path: String,
    pub markers: Vec<ConflictMarker>,
}

// ---------------------------------------------------------------------------
// Git
// ---------------------------------------------------------------------------

/// Stateless git CLI adapter.
#[derive(Clone, Copy, Debug, Default)]
pub struct Git;

impl Git {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    // -- Subprocess plumbing -------------------------------------------------

    fn run(&self, dir: &Path, args: &[&str], cancel: &CancelToken) -> Result<String> {
        cancel.checkpoint()?;
        let output = Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .map_err(VcsError::Io)?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(VcsError::Command {
                command: format!("git {}", args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
                exit_code: output.status.code(),
            })
        }
    }

    /// Like [`Self::run`] but surfaces failure as a value: `(success, stdout,
    /// stderr)`. Used where a non-zero exit may be a conflict outcome.
    fn run_checked(
        &self,
        dir: &Path,
        args: &[&str],
        envs: &[(&str, &str)],
        cancel: &CancelToken,
    ) -> Result<(bool, String, String)> {
        cancel.checkpoint()?;
        let mut cmd = Command::new("git");
        cmd.args(args).current_dir(dir);
        for (k, v) in envs {
            cmd.env(k, v);
        }
        let output = cmd.output().map_err(VcsError::Io)?;
        Ok((
            output.status.success(),
            String::from_utf8_lossy(&output.stdout).into_owned(),
            String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        ))
    }

    // -- Status / commit / diff ----------------------------------------------

    /// Structured `git status --porcelain` breakdown.
    ///
    /// # Errors
    /// [`VcsError::Command`] if `repo` is not a git repository.
    pub fn status(&self, repo: &Path, cancel: &CancelToken) -> Result<WorktreeStatus> {
        let out = self.run(repo, &["status", "--porcelain"], cancel)?;
        let mut status = WorktreeStatus::default();

        for line in out.lines() {
            if line.len() < 4 {
                continue;
            }
            let (xy, rest) = line.split_at(2);
            let pathspec = &rest[1..];
            if xy == "??" {
                status.untracked.push(pathspec.to_owned());
                continue;
            }
            let staged = xy.chars().next().unwrap_or(' ');
            let unstaged = xy.chars().nth(1).unwrap_or(' ');

            if staged == 'R' || unstaged == 'R' {
                if let Some((from, to)) = pathspec.split_once(" -> ") {
                    status.renamed.push(RenamedFile {
                        from: from.to_owned(),
                        to: to.to_owned(),
                    });
                }
            } else if staged == 'A' || unstaged == 'A' {
                status.added.push(pathspec.to_owned());
            } else if staged == 'D' || unstaged == 'D' {
                status.deleted.push(pathspec.to_owned());
            } else {
                status.modified.push(pathspec.to_owned());
            }
        }
        Ok(status)
    }

    /// Create a commit and return its id.
    ///
    /// # Errors
    /// [`VcsError::EmptyMessage`] when the message is blank;
    /// [`VcsError::Command`] when staging or committing fails.
    pub fn commit(&self, repo: &Path, opts: &CommitOptions, cancel: &CancelToken) -> Result<String> {
        if opts.message.trim().is_empty() {
            return Err(VcsError::EmptyMessage);
        }

        if opts.stage_all {
            self.run(repo, &["add", "-A"], cancel)?;
        }

        let mut message = opts.message.clone();
        if !opts.co_authors.is_empty() {
            message.push_str("\n\n");
            for author in &opts.co_authors {
                message.push_str(&format!("Co-Authored-By: {author}\n"));
            }
        }

        let mut args = vec!["commit", "-m", message.as_str()];
        if opts.allow_empty {
            args.push("--allow-empty");
        }
        let author_flag;
        if let Some(author) = &opts.author {
            author_flag = format!("--author={author}");
            args.push(&author_flag);
        }
        self.run(repo, &args, cancel)?;

        Ok(self.run(repo, &["rev-parse", "HEAD"], cancel)?.trim().to_owned())
    }

    /// Unified diff of the working tree, or of the index with `staged`.
    pub fn diff(&self, repo: &Path, staged: bool, cancel: &CancelToken) -> Result<String> {
        let args: &[&str] = if staged {
            &["diff", "--cached"]
        } else {
            &["diff"]
        };
        self.run(repo, args, cancel)
    }

    // -- Rebase / merge ------------------------------------------------------

    /// Run one rebase operation: onto, continue, or abort.
    ///
    /// # Errors
    /// [`VcsError::Usage`] unless exactly one operation is selected, or on
    /// `continue` with no rebase in progress (`No rebase in progress`);
    /// [`VcsError::Command`] for non-conflict failures.
    pub fn rebase(
        &self,
        repo: &Path,
        opts: &RebaseOptions,
        cancel: &CancelToken,
    ) -> Result<RebaseResult> {
        let selected =
            usize::from(opts.onto.is_some()) + usize::from(opts.continue_rebase) + usize::from(opts.abort);
        if selected != 1 {
            return Err(VcsError::Usage(
                "exactly one of onto, continue, or abort must be given".to_owned(),
            ));
        }

        let current_branch = self.current_branch(repo, cancel).unwrap_or_default();

        if let Some(base) = &opts.onto {
            let (ok, _, stderr) = self.run_checked(repo, &["rebase", base], &[], cancel)?;
            if ok {
                return Ok(RebaseResult {
                    success: true,
                    current_branch,
                    base_branch: base.clone(),
                    ..RebaseResult::default()
                });
            }
            let conflicted = self.unmerged_files(repo, cancel)?;
            if conflicted.is_empty() {
                return Err(VcsError::Command {
                    command: format!("git rebase {base}"),
                    stderr,
                    exit_code: None,
                });
            }
            return Ok(RebaseResult {
                success: false,
                has_conflicts: true,
                conflicted_files: conflicted,
                current_branch,
                base_branch: base.clone(),
                error_message: Some(stderr),
                ..RebaseResult::default()
            });
        }

        if opts.continue_rebase {
            if !self.rebase_in_progress(repo, cancel)? {
                return Err(VcsError::Usage("No rebase in progress".to_owned()));
            }
            // GIT_EDITOR=true keeps git from opening an editor for the
            // continued commit message.
            let (ok, _, stderr) =
                self.run_checked(repo, &["rebase", "--continue"], &[("GIT_EDITOR", "true")], cancel)?;
            if ok {
                return Ok(RebaseResult {
                    success: true,
                    current_branch,
                    ..RebaseResult::default()
                });
            }
            let conflicted = self.unmerged_files(repo, cancel)?;
            if conflicted.is_empty() {
                return Err(VcsError::Command {
                    command: "git rebase --continue".to_owned(),
                    stderr,
                    exit_code: None,
                });
            }
            return Ok(RebaseResult {
                success: false,
                has_conflicts: true,
                conflicted_files: conflicted,
                current_branch,
                error_message: Some(stderr),
                ..RebaseResult::default()
            });
        }

        // Abort.
        self.run(repo, &["rebase", "--abort"], cancel)?;
        Ok(RebaseResult {
            success: true,
            aborted_successfully: true,
            current_branch,
            ..RebaseResult::default()
        })
    }

    /// Merge `branch` into the current branch.
    pub fn merge(&self, repo: &Path, branch: &str, cancel: &CancelToken) -> Result<MergeResult> {
        let (ok, _, stderr) = self.run_checked(repo, &["merge", branch], &[], cancel)?;
        if ok {
            return Ok(MergeResult {
                success: true,
                ..MergeResult::default()
            });
        }
        let conflicted = self.unmerged_files(repo, cancel)?;
        if conflicted.is_empty() {
            return Err(VcsError::Command {
                command: format!("git merge {branch}"),
                stderr,
                exit_code: None,
            });
        }
        Ok(MergeResult {
            success: false,
            has_conflicts: true,
            conflicted_files: conflicted,
        })
    }

    fn unmerged_files(&self, repo: &Path, cancel: &CancelToken) -> Result<Vec<String>> {
        let out = self.run(repo, &["diff", "--name-only", "--diff-filter=U"], cancel)?;
        Ok(out.lines().map(str::to_owned).collect())
    }

    fn rebase_in_progress(&self, repo: &Path, cancel: &CancelToken) -> Result<bool> {
        // --git-path resolves correctly inside worktrees.
        for dir in ["rebase-merge", "rebase-apply"] {
            let out = self.run(repo, &["rev-parse", "--git-path", dir], cancel)?;
            let path = Path::new(out.trim());
            let full = if path.is_absolute() {
                path.to_path_buf()
            } else {
                repo.join(path)
            };
            if full.exists() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    // -- Branches and worktrees ----------------------------------------------

    /// Branch names matching `pattern` (git's own glob syntax), or all local
    /// branches when `None`.
    pub fn list_branches(
        &self,
        repo: &Path,
        pattern: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<Vec<String>> {
        let mut args = vec!["branch", "--list", "--format=%(refname:short)"];
        if let Some(pattern) = pattern {
            args.push(pattern);
        }
        let out = self.run(repo, &args, cancel)?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_owned)
            .collect())
    }

    /// Parse `git worktree list --porcelain`.
    pub fn list_worktrees(&self, repo: &Path, cancel: &CancelToken) -> Result<Vec<WorktreeInfo>> {
        let out = self.run(repo, &["worktree", "list", "--porcelain"], cancel)?;
        let mut infos = Vec::new();

        for block in out.split("\n\n") {
            let block = block.trim();
            if block.is_empty() {
                continue;
            }
            let mut path: Option<PathBuf> = None;
            let mut head: Option<String> = None;
            let mut branch: Option<String> = None;
            let mut bare = false;

            for line in block.lines() {
                if let Some(p) = line.strip_prefix("worktree ") {
                    path = Some(PathBuf::from(p));
                } else if let Some(h) = line.strip_prefix("HEAD ") {
                    head = Some(h.to_owned());
                } else if let Some(b) = line.strip_prefix("branch ") {
                    branch = Some(
                        b.strip_prefix("refs/heads/").unwrap_or(b).to_owned(),
                    );
                } else if line.trim() == "bare" {
                    bare = true;
                }
            }

            if bare {
                continue;
            }
            if let (Some(path), Some(head)) = (path, head) {
                infos.push(WorktreeInfo { path, head, branch });
            }
        }
        Ok(infos)
    }

    /// Committer timestamp of the branch tip.
    pub fn branch_timestamp(
        &self,
        repo: &Path,
        branch: &str,
        cancel: &CancelToken,
    ) -> Result<DateTime<Utc>> {
        let out = self.run(repo, &["log", "-1", "--format=%ct", branch], cancel)?;
        let secs: i64 = out.trim().parse().map_err(|_| VcsError::Command {
            command: format!("git log -1 --format=%ct {branch}"),
            stderr: format!("unparseable timestamp '{}'", out.trim()),
            exit_code: None,
        })?;
        DateTime::from_timestamp(secs, 0).ok_or_else(|| VcsError::Command {
            command: format!("git log -1 --format=%ct {branch}"),
            stderr: format!("timestamp {secs} out of range"),
            exit_code: None,
        })
    }

    pub fn branch_exists(&self, repo: &Path, branch: &str, cancel: &CancelToken) -> Result<bool> {
        let refname = format!("refs/heads/{branch}");
        let (ok, _, _) = self.run_checked(
            repo,
            &["rev-parse", "--verify", "--quiet", &refname],
            &[],
            cancel,
        )?;
        Ok(ok)
    }

    pub fn delete_branch(&self, repo: &Path, branch: &str, cancel: &CancelToken) -> Result<()> {
        self.run(repo, &["branch", "-D", branch], cancel)?;
        Ok(())
    }

    pub fn current_branch(&self, repo: &Path, cancel: &CancelToken) -> Result<String> {
        Ok(self
            .run(repo, &["rev-parse", "--abbrev-ref", "HEAD"], cancel)?
            .trim()
            .to_owned())
    }

    /// Add a detached worktree at `path` based on `base`.
    pub fn create_worktree(
        &self,
        repo: &Path,
        path: &Path,
        base: &str,
        cancel: &CancelToken,
    ) -> Result<()> {
        let path_str = path.to_string_lossy();
        self.run(
            repo,
            &["worktree", "add", "--detach", path_str.as_ref(), base],
            cancel,
        )?;
        Ok(())
    }

    /// Remove the worktree at `path`, falling back to manual directory
    /// removal plus prune when git refuses. Each step is idempotent.
    pub fn remove_worktree(&self, repo: &Path, path: &Path, cancel: &CancelToken) -> Result<()> {
        if path.exists() {
            let path_str = path.to_string_lossy();
            let (ok, _, _) = self.run_checked(
                repo,
                &["worktree", "remove", "--force", path_str.as_ref()],
                &[],
                cancel,
            )?;
            if !ok && path.exists() {
                std::fs::remove_dir_all(path)?;
            }
        }
        // Clean up .git/worktrees/<name> even when the directory was removed
        // out of band. Failure here is not actionable.
        let _ = self.run_checked(repo, &["worktree", "prune"], &[], cancel);
        Ok(())
    }

    /// Drop stale worktree bookkeeping for directories removed out of band.
    pub fn prune_worktrees(&self, repo: &Path, cancel: &CancelToken) -> Result<()> {
        self.run(repo, &["worktree", "prune"], cancel)?;
        Ok(())
    }

    /// Create `branch` at HEAD and switch the worktree to it.
    pub fn create_branch(&self, worktree: &Path, branch: &str, cancel: &CancelToken) -> Result<()> {
        self.run(worktree, &["checkout", "-b", branch], cancel)?;
        Ok(())
    }

    // -- Conflicts -----------------------------------------------------------

    /// Read and parse conflict markers in each of `files`.
    ///
    /// # Errors
    /// [`VcsError::PathEscape`] when a file resolves outside `repo`;
    /// [`VcsError::Marker`] when a file's markers are malformed or
    /// incomplete.
    pub fn conflict_details(
        &self,
        repo: &Path,
        files: &[String],
        base_label: &str,
        current_label: &str,
        cancel: &CancelToken,
    ) -> Result<Vec<FileConflicts>> {
        let mut out = Vec::with_capacity(files.len());
        for file in files {
            cancel.checkpoint()?;
            let resolved = conflict::resolve_within(repo, file)
                .ok_or_else(|| VcsError::PathEscape { path: file.clone() })?;
            let content = std::fs::read_to_string(&resolved)?;
            let markers = conflict::parse_markers(&content, base_label, current_label)
                .map_err(|source| VcsError::Marker {
                    file: file.clone(),
                    source,
                })?;
            out.push(FileConflicts {
                path: file.clone(),
                markers,
            });
        }
        Ok(out)
    }

    /// True iff none of `files` contains a line-leading conflict sigil.
    pub fn validate_resolution(
        &self,
        repo: &Path,
        files: &[String],
        cancel: &CancelToken,
    ) -> Result<bool> {
        for file in files {
            cancel.checkpoint()?;
            let resolved = conflict::resolve_within(repo, file)
                .ok_or_else(|| VcsError::PathEscape { path: file.clone() })?;
            let content = std::fs::read_to_string(&resolved)?;
            if !conflict::is_resolved(&content) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rebase_rejects_zero_and_multiple_operations() {
        let git = Git::new();
        let cancel = CancelToken::new();
        let repo = Path::new("/nonexistent");

        let err = git.rebase(repo, &RebaseOptions::default(), &cancel).unwrap_err();
        assert!(matches!(err, VcsError::Usage(_)));

        let err = git
            .rebase(
                repo,
                &RebaseOptions {
                    onto: Some("main".into()),
                    abort: true,
                    ..RebaseOptions::default()
                },
                &cancel,
            )
            .unwrap_err();
        assert!(matches!(err, VcsError::Usage(_)));
    }

    #[test]
    fn commit_rejects_empty_message() {
        let git = Git::new();
        let cancel = CancelToken::new();
        let err = git
            .commit(
                Path::new("/nonexistent"),
                &CommitOptions {
                    message: "   ".into(),
                    ..CommitOptions::default()
                },
                &cancel,
            )
            .unwrap_err();
        assert!(matches!(err, VcsError::EmptyMessage));
    }

    #[test]
    fn cancelled_token_short_circuits() {
        let git = Git::new();
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = git.status(Path::new("/nonexistent"), &cancel).unwrap_err();
        assert!(matches!(err, VcsError::Cancelled));
    }

    #[test]
    fn conflict_details_rejects_escaping_path() {
        let git = Git::new();
        let cancel = CancelToken::new();
        let err = git
            .conflict_details(
                Path::new("/repo"),
                &["../etc/passwd".to_owned()],
                "base",
                "current",
                &cancel,
            )
            .unwrap_err();
        assert!(matches!(err, VcsError::PathEscape { .. }));
    }

    #[test]
    fn worktree_status_has_changes() {
        let mut status = WorktreeStatus::default();
        assert!(!status.has_changes());
        status.untracked.push("new.txt".into());
        assert!(status.has_changes());
    }

    #[test]
    fn command_error_display_includes_stderr() {
        let err = VcsError::Command {
            command: "git rebase main".into(),
            stderr: "fatal: needed a single revision".into(),
            exit_code: Some(128),
        };
        let msg = err.to_string();
        assert!(msg.contains("git rebase main"));
        assert!(msg.contains("exit code 128"));
        assert!(msg.contains("needed a single revision"));
    }
}
