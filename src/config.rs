//! Executor configuration (`.vc/config.toml`).
//!
//! Typed configuration for the mission execution core. Missing fields use
//! defaults; a missing file is all defaults (no error).

use std::path::{Path, PathBuf};

use serde::Deserialize;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// A configuration file could not be read or parsed.
#[derive(Debug)]
pub struct ConfigError {
    pub path: PathBuf,
    pub detail: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "configuration error in '{}': {}",
            self.path.display(),
            self.detail
        )
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// CoreConfig
// ---------------------------------------------------------------------------

/// Top-level configuration, parsed from `.vc/config.toml` at the repo root.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoreConfig {
    #[serde(default)]
    pub repo: RepoConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub sandbox: SandboxConfig,

    #[serde(default)]
    pub reaper: ReaperConfig,

    #[serde(default)]
    pub oracle: OracleConfig,
}

impl CoreConfig {
    /// Canonical path of the config file within a repository.
    #[must_use]
    pub fn path_in(repo_root: &Path) -> PathBuf {
        repo_root.join(".vc").join("config.toml")
    }

    /// The gap-analysis oracle deadline as a [`std::time::Duration`].
    #[must_use]
    pub fn gap_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.oracle.gap_timeout_secs)
    }

    /// Load from `<repo_root>/.vc/config.toml`. Missing file → defaults.
    ///
    /// # Errors
    /// [`ConfigError`] when the file exists but cannot be read or parsed.
    pub fn load(repo_root: &Path) -> Result<Self, ConfigError> {
        let path = Self::path_in(repo_root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError {
            path: path.clone(),
            detail: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| ConfigError {
            path,
            detail: e.to_string(),
        })
    }
}

/// Repository-level settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepoConfig {
    /// Branch sandboxes are based on (default: `"main"`).
    #[serde(default = "default_base_branch")]
    pub base_branch: String,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            base_branch: default_base_branch(),
        }
    }
}

fn default_base_branch() -> String {
    "main".to_owned()
}

/// Main issue store settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Main store path, relative to the repo root.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Issue id prefix, without the dash (default: `"vc"`).
    #[serde(default = "default_issue_prefix")]
    pub issue_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            issue_prefix: default_issue_prefix(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".beads/vc.db")
}

fn default_issue_prefix() -> String {
    "vc".to_owned()
}

/// Sandbox lifecycle settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SandboxConfig {
    /// Directory sandboxes are created under, relative to the repo root.
    #[serde(default = "default_sandbox_root")]
    pub root: PathBuf,

    /// Keep failed sandboxes on disk for debugging.
    #[serde(default)]
    pub preserve_on_failure: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            root: default_sandbox_root(),
            preserve_on_failure: false,
        }
    }
}

fn default_sandbox_root() -> PathBuf {
    PathBuf::from(".sandboxes")
}

/// Orphan-branch reaper settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReaperConfig {
    /// Orphans at least this old are deleted. `None` disables deletion.
    #[serde(default = "default_retention_days")]
    pub retention_days: Option<i64>,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
        }
    }
}

const fn default_retention_days() -> Option<i64> {
    Some(30)
}

/// AI oracle settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OracleConfig {
    /// Deadline for gap-analysis calls, in seconds.
    #[serde(default = "default_gap_timeout_secs")]
    pub gap_timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            gap_timeout_secs: default_gap_timeout_secs(),
        }
    }
}

const fn default_gap_timeout_secs() -> u64 {
    60
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
