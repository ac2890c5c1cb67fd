//! Issue store contracts.
//!
//! The storage engine itself is an external collaborator; the core consumes
//! these traits and never implements persistence beyond the in-memory
//! backend in [`memory`]. Consumers depend on the traits rather than on a
//! concrete implementation so alternative backends can be substituted.

use std::path::Path;
use std::sync::Arc;

use crate::model::{
    Comment, Dependency, Event, Issue, IssueFilter, IssueUpdates, Mission, MissionUpdates, Plan,
};

pub mod memory;

pub use memory::{MemoryStore, MemoryStoreProvider};

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

/// Errors from an issue store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreError {
    /// No issue with the given id.
    IssueNotFound { id: String },
    /// An issue with the given id already exists.
    IssueExists { id: String },
    /// The dependency edge already exists.
    DependencyExists { from: String, to: String },
    /// No plan stored for the given mission.
    PlanNotFound { mission_id: String },
    /// No config/metadata value under the given key.
    KeyNotFound { key: String },
    /// The store rejected the operation (bad input, constraint violation).
    Invalid { detail: String },
    /// Underlying engine failure. Transactional operations have rolled back;
    /// `partial` marks the non-transactional case where prior work may have
    /// committed.
    Backend { detail: String, partial: bool },
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IssueNotFound { id } => write!(f, "issue '{id}' not found"),
            Self::IssueExists { id } => write!(f, "issue '{id}' already exists"),
            Self::DependencyExists { from, to } => {
                write!(f, "dependency {from} -> {to} already exists")
            }
            Self::PlanNotFound { mission_id } => {
                write!(f, "no plan stored for mission '{mission_id}'")
            }
            Self::KeyNotFound { key } => write!(f, "no value stored under key '{key}'"),
            Self::Invalid { detail } => write!(f, "invalid store operation: {detail}"),
            Self::Backend { detail, partial } => {
                write!(f, "store backend failure: {detail}")?;
                if *partial {
                    write!(f, " (prior work in this operation may have committed)")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for StoreError {}

/// Store result alias.
pub type Result<T> = std::result::Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Storage trait
// ---------------------------------------------------------------------------

/// Primary storage contract for issue persistence.
pub trait Storage: Send + Sync {
    // -- Issues --------------------------------------------------------------

    /// Create an issue and emit a `created` event. An empty incoming id asks
    /// the store to assign one with its configured prefix. Returns the id the
    /// issue was created under.
    fn create_issue(&self, issue: &Issue, actor: &str) -> Result<String>;

    fn get_issue(&self, id: &str) -> Result<Issue>;

    /// Search issues by substring query over title and description. An empty
    /// query matches everything.
    fn search_issues(&self, query: &str, filter: &IssueFilter) -> Result<Vec<Issue>>;

    /// Apply partial updates and emit an `updated` event.
    fn update_issue(&self, id: &str, updates: &IssueUpdates, actor: &str) -> Result<()>;

    /// Close an issue (terminal for accounting) and emit a first-class
    /// `closed` event.
    fn close_issue(&self, id: &str, reason: &str, actor: &str) -> Result<()>;

    // -- Dependencies --------------------------------------------------------

    /// Issues the given issue depends on.
    fn get_dependencies(&self, issue_id: &str) -> Result<Vec<Issue>>;

    /// Issues that depend on the given issue.
    fn get_dependents(&self, issue_id: &str) -> Result<Vec<Issue>>;

    /// Outgoing dependency edges of the given issue, with edge metadata.
    fn get_dependency_records(&self, issue_id: &str) -> Result<Vec<Dependency>>;

    /// Add a dependency edge. A pre-existing identical edge is
    /// [`StoreError::DependencyExists`].
    fn add_dependency(&self, dep: &Dependency, actor: &str) -> Result<()>;

    // -- Labels --------------------------------------------------------------

    fn add_label(&self, issue_id: &str, label: &str, actor: &str) -> Result<()>;
    fn get_labels(&self, issue_id: &str) -> Result<Vec<String>>;

    // -- Events and comments -------------------------------------------------

    /// Most recent events for an issue, newest first, up to `limit`.
    fn get_events(&self, issue_id: &str, limit: usize) -> Result<Vec<Event>>;

    /// Append an agent-generated event to the activity log.
    fn store_agent_event(&self, event: &Event) -> Result<()>;

    fn add_comment(&self, issue_id: &str, author: &str, text: &str) -> Result<Comment>;
    fn get_comments(&self, issue_id: &str) -> Result<Vec<Comment>>;

    // -- Config and metadata -------------------------------------------------

    fn get_config(&self, key: &str) -> Result<String>;
    fn set_config(&self, key: &str, value: &str) -> Result<()>;

    /// Key/value metadata (the `sandbox_metadata` surface).
    fn get_metadata(&self, key: &str) -> Result<String>;
    fn set_metadata(&self, key: &str, value: &str) -> Result<()>;

    // -- Missions and plans --------------------------------------------------

    fn get_mission(&self, id: &str) -> Result<Mission>;
    fn update_mission(&self, id: &str, updates: &MissionUpdates) -> Result<()>;

    fn get_plan(&self, mission_id: &str) -> Result<Plan>;
    fn put_plan(&self, plan: &Plan) -> Result<()>;
    fn delete_plan(&self, mission_id: &str) -> Result<()>;

    // -- Transactions --------------------------------------------------------

    /// Run `f` inside one store transaction. `Ok` commits, `Err` rolls back
    /// leaving the store untouched.
    fn run_in_transaction(&self, f: &dyn Fn(&dyn Transaction) -> Result<()>) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Transaction trait
// ---------------------------------------------------------------------------

/// The subset of [`Storage`] available inside a transaction.
///
/// Everything here commits or rolls back atomically with the enclosing
/// [`Storage::run_in_transaction`] call.
pub trait Transaction {
    fn create_issue(&self, issue: &Issue, actor: &str) -> Result<String>;
    fn get_issue(&self, id: &str) -> Result<Issue>;
    fn add_dependency(&self, dep: &Dependency, actor: &str) -> Result<()>;
    fn add_label(&self, issue_id: &str, label: &str, actor: &str) -> Result<()>;
    fn get_mission(&self, id: &str) -> Result<Mission>;
}

// ---------------------------------------------------------------------------
// StoreProvider
// ---------------------------------------------------------------------------

/// Opens and creates stores at filesystem paths.
///
/// The sandbox manager uses this to materialize the per-sandbox issue DB at
/// `<worktree>/.beads/mission.db` and to re-open it after an executor
/// restart.
pub trait StoreProvider: Send + Sync {
    /// Create a fresh store at `path`. Fails if one already exists there.
    fn create(&self, path: &Path) -> Result<Arc<dyn Storage>>;

    /// Open the store previously created at `path`.
    fn open(&self, path: &Path) -> Result<Arc<dyn Storage>>;
}
