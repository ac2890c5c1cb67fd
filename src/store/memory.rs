//! In-memory issue store.
//!
//! The reference backend: a mutex-guarded table set with clone-on-transaction
//! rollback. Serves as the test double for every component that consumes
//! [`Storage`], and as the per-sandbox store in environments that do not
//! persist sandbox DBs.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;

use crate::model::{
    Comment, Dependency, Event, Issue, IssueFilter, IssueUpdates, Mission, MissionUpdates, Plan,
};

use super::{Result, Storage, StoreError, StoreProvider, Transaction};

/// Default id prefix when the store has no `issue_prefix` config.
const DEFAULT_PREFIX: &str = "vc";

// ---------------------------------------------------------------------------
// Inner state
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default)]
struct MissionState {
    approved_at: Option<chrono::DateTime<Utc>>,
    approved_by: Option<String>,
    sandbox_path: Option<String>,
    branch_name: Option<String>,
}

#[derive(Clone, Debug, Default)]
struct Inner {
    issues: BTreeMap<String, Issue>,
    mission_state: HashMap<String, MissionState>,
    deps: Vec<Dependency>,
    labels: HashMap<String, Vec<String>>,
    events: Vec<Event>,
    comments: HashMap<String, Vec<Comment>>,
    config: HashMap<String, String>,
    metadata: HashMap<String, String>,
    plans: HashMap<String, Plan>,
    next_id: u64,
}

impl Inner {
    fn require_issue(&self, id: &str) -> Result<&Issue> {
        self.issues
            .get(id)
            .ok_or_else(|| StoreError::IssueNotFound { id: id.to_owned() })
    }

    fn record_event(&mut self, issue_id: &str, kind: &str, actor: &str, comment: Option<String>) {
        self.events.push(Event {
            issue_id: issue_id.to_owned(),
            kind: kind.to_owned(),
            actor: actor.to_owned(),
            comment,
            payload: None,
            created_at: Utc::now(),
        });
    }

    fn assign_id(&mut self) -> String {
        let prefix = self
            .config
            .get("issue_prefix")
            .cloned()
            .unwrap_or_else(|| DEFAULT_PREFIX.to_owned());
        loop {
            self.next_id += 1;
            let candidate = format!("{prefix}-{}", self.next_id);
            if !self.issues.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    fn create_issue(&mut self, issue: &Issue, actor: &str) -> Result<String> {
        let id = if issue.id.is_empty() {
            self.assign_id()
        } else {
            if self.issues.contains_key(&issue.id) {
                return Err(StoreError::IssueExists {
                    id: issue.id.clone(),
                });
            }
            issue.id.clone()
        };

        let now = Utc::now();
        let mut stored = issue.clone();
        stored.id = id.clone();
        stored.created_at = now;
        stored.updated_at = now;
        self.issues.insert(id.clone(), stored);
        self.record_event(&id, "created", actor, None);
        Ok(id)
    }

    fn update_issue(&mut self, id: &str, updates: &IssueUpdates, actor: &str) -> Result<()> {
        let issue = self
            .issues
            .get_mut(id)
            .ok_or_else(|| StoreError::IssueNotFound { id: id.to_owned() })?;

        if let Some(title) = &updates.title {
            issue.title = title.clone();
        }
        if let Some(description) = &updates.description {
            issue.description = description.clone();
        }
        if let Some(design) = &updates.design {
            issue.design = design.clone();
        }
        if let Some(ac) = &updates.acceptance_criteria {
            issue.acceptance_criteria = ac.clone();
        }
        if let Some(status) = updates.status {
            issue.status = status;
        }
        if let Some(priority) = updates.priority {
            issue.priority = priority;
        }
        if let Some(estimate) = updates.estimated_minutes {
            issue.estimated_minutes = estimate;
        }
        issue.updated_at = Utc::now();
        self.record_event(id, "updated", actor, None);
        Ok(())
    }

    fn add_dependency(&mut self, dep: &Dependency, actor: &str) -> Result<()> {
        self.require_issue(&dep.from)?;
        self.require_issue(&dep.to)?;
        if self.deps.iter().any(|d| d == dep) {
            return Err(StoreError::DependencyExists {
                from: dep.from.clone(),
                to: dep.to.clone(),
            });
        }
        self.deps.push(dep.clone());
        self.record_event(&dep.from, "dependency_added", actor, None);
        Ok(())
    }

    fn add_label(&mut self, issue_id: &str, label: &str, actor: &str) -> Result<()> {
        self.require_issue(issue_id)?;
        let labels = self.labels.entry(issue_id.to_owned()).or_default();
        if !labels.iter().any(|l| l == label) {
            labels.push(label.to_owned());
        }
        self.record_event(issue_id, "labeled", actor, None);
        Ok(())
    }

    fn get_mission(&self, id: &str) -> Result<Mission> {
        let issue = self.require_issue(id)?.clone();
        let state = self.mission_state.get(id).cloned().unwrap_or_default();
        Ok(Mission {
            issue,
            approved_at: state.approved_at,
            approved_by: state.approved_by,
            sandbox_path: state.sandbox_path,
            branch_name: state.branch_name,
        })
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// Thread-safe in-memory [`Storage`] implementation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-configured with an id prefix.
    #[must_use]
    pub fn with_prefix(prefix: &str) -> Self {
        let store = Self::new();
        store
            .lock()
            .config
            .insert("issue_prefix".to_owned(), prefix.to_owned());
        store
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Storage for MemoryStore {
    fn create_issue(&self, issue: &Issue, actor: &str) -> Result<String> {
        self.lock().create_issue(issue, actor)
    }

    fn get_issue(&self, id: &str) -> Result<Issue> {
        self.lock().require_issue(id).cloned()
    }

    fn search_issues(&self, query: &str, filter: &IssueFilter) -> Result<Vec<Issue>> {
        let inner = self.lock();
        let needle = query.to_lowercase();
        Ok(inner
            .issues
            .values()
            .filter(|issue| {
                needle.is_empty()
                    || issue.title.to_lowercase().contains(&needle)
                    || issue.description.to_lowercase().contains(&needle)
            })
            .filter(|issue| filter.status.is_none_or(|s| issue.status == s))
            .filter(|issue| filter.kind.is_none_or(|k| issue.kind == k))
            .cloned()
            .collect())
    }

    fn update_issue(&self, id: &str, updates: &IssueUpdates, actor: &str) -> Result<()> {
        self.lock().update_issue(id, updates, actor)
    }

    fn close_issue(&self, id: &str, reason: &str, actor: &str) -> Result<()> {
        let mut inner = self.lock();
        let issue = inner
            .issues
            .get_mut(id)
            .ok_or_else(|| StoreError::IssueNotFound { id: id.to_owned() })?;
        issue.status = crate::model::Status::Closed;
        issue.updated_at = Utc::now();
        inner.record_event(id, "closed", actor, Some(reason.to_owned()));
        Ok(())
    }

    fn get_dependencies(&self, issue_id: &str) -> Result<Vec<Issue>> {
        let inner = self.lock();
        inner.require_issue(issue_id)?;
        Ok(inner
            .deps
            .iter()
            .filter(|d| d.from == issue_id)
            .filter_map(|d| inner.issues.get(&d.to).cloned())
            .collect())
    }

    fn get_dependents(&self, issue_id: &str) -> Result<Vec<Issue>> {
        let inner = self.lock();
        inner.require_issue(issue_id)?;
        Ok(inner
            .deps
            .iter()
            .filter(|d| d.to == issue_id)
            .filter_map(|d| inner.issues.get(&d.from).cloned())
            .collect())
    }

    fn get_dependency_records(&self, issue_id: &str) -> Result<Vec<Dependency>> {
        let inner = self.lock();
        inner.require_issue(issue_id)?;
        Ok(inner
            .deps
            .iter()
            .filter(|d| d.from == issue_id)
            .cloned()
            .collect())
    }

    fn add_dependency(&self, dep: &Dependency, actor: &str) -> Result<()> {
        self.lock().add_dependency(dep, actor)
    }

    fn add_label(&self, issue_id: &str, label: &str, actor: &str) -> Result<()> {
        self.lock().add_label(issue_id, label, actor)
    }

    fn get_labels(&self, issue_id: &str) -> Result<Vec<String>> {
        let inner = self.lock();
        inner.require_issue(issue_id)?;
        Ok(inner.labels.get(issue_id).cloned().unwrap_or_default())
    }

    fn get_events(&self, issue_id: &str, limit: usize) -> Result<Vec<Event>> {
        let inner = self.lock();
        Ok(inner
            .events
            .iter()
            .rev()
            .filter(|e| e.issue_id == issue_id)
            .take(limit)
            .cloned()
            .collect())
    }

    fn store_agent_event(&self, event: &Event) -> Result<()> {
        self.lock().events.push(event.clone());
        Ok(())
    }

    fn add_comment(&self, issue_id: &str, author: &str, text: &str) -> Result<Comment> {
        let mut inner = self.lock();
        inner.require_issue(issue_id)?;
        let comment = Comment {
            issue_id: issue_id.to_owned(),
            author: author.to_owned(),
            text: text.to_owned(),
            created_at: Utc::now(),
        };
        inner
            .comments
            .entry(issue_id.to_owned())
            .or_default()
            .push(comment.clone());
        inner.record_event(issue_id, "commented", author, Some(text.to_owned()));
        Ok(comment)
    }

    fn get_comments(&self, issue_id: &str) -> Result<Vec<Comment>> {
        let inner = self.lock();
        inner.require_issue(issue_id)?;
        Ok(inner.comments.get(issue_id).cloned().unwrap_or_default())
    }

    fn get_config(&self, key: &str) -> Result<String> {
        self.lock()
            .config
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::KeyNotFound { key: key.to_owned() })
    }

    fn set_config(&self, key: &str, value: &str) -> Result<()> {
        self.lock().config.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn get_metadata(&self, key: &str) -> Result<String> {
        self.lock()
            .metadata
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::KeyNotFound { key: key.to_owned() })
    }

    fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        self.lock()
            .metadata
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn get_mission(&self, id: &str) -> Result<Mission> {
        self.lock().get_mission(id)
    }

    fn update_mission(&self, id: &str, updates: &MissionUpdates) -> Result<()> {
        let mut inner = self.lock();
        inner.require_issue(id)?;
        let state = inner.mission_state.entry(id.to_owned()).or_default();
        if let Some(at) = &updates.approved_at {
            state.approved_at = *at;
        }
        if let Some(by) = &updates.approved_by {
            state.approved_by = by.clone();
        }
        if let Some(path) = &updates.sandbox_path {
            state.sandbox_path = path.clone();
        }
        if let Some(branch) = &updates.branch_name {
            state.branch_name = branch.clone();
        }
        Ok(())
    }

    fn get_plan(&self, mission_id: &str) -> Result<Plan> {
        self.lock()
            .plans
            .get(mission_id)
            .cloned()
            .ok_or_else(|| StoreError::PlanNotFound {
                mission_id: mission_id.to_owned(),
            })
    }

    fn put_plan(&self, plan: &Plan) -> Result<()> {
        self.lock()
            .plans
            .insert(plan.mission_id.clone(), plan.clone());
        Ok(())
    }

    fn delete_plan(&self, mission_id: &str) -> Result<()> {
        self.lock()
            .plans
            .remove(mission_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::PlanNotFound {
                mission_id: mission_id.to_owned(),
            })
    }

    fn run_in_transaction(&self, f: &dyn Fn(&dyn Transaction) -> Result<()>) -> Result<()> {
        // The store lock is held for the whole transaction: approval must be
        // linearizable with respect to the mission approval flag.
        let mut inner = self.lock();
        let txn = MemoryTransaction {
            state: RefCell::new(inner.clone()),
        };
        f(&txn)?;
        *inner = txn.state.into_inner();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryTransaction
// ---------------------------------------------------------------------------

/// Transaction handle over a scratch copy of the store state.
///
/// Commit is the caller (`run_in_transaction`) swapping the scratch copy in;
/// rollback is dropping it.
struct MemoryTransaction {
    state: RefCell<Inner>,
}

impl Transaction for MemoryTransaction {
    fn create_issue(&self, issue: &Issue, actor: &str) -> Result<String> {
        self.state.borrow_mut().create_issue(issue, actor)
    }

    fn get_issue(&self, id: &str) -> Result<Issue> {
        self.state.borrow().require_issue(id).cloned()
    }

    fn add_dependency(&self, dep: &Dependency, actor: &str) -> Result<()> {
        self.state.borrow_mut().add_dependency(dep, actor)
    }

    fn add_label(&self, issue_id: &str, label: &str, actor: &str) -> Result<()> {
        self.state.borrow_mut().add_label(issue_id, label, actor)
    }

    fn get_mission(&self, id: &str) -> Result<Mission> {
        self.state.borrow().get_mission(id)
    }
}

// ---------------------------------------------------------------------------
// MemoryStoreProvider
// ---------------------------------------------------------------------------

/// [`StoreProvider`] that keys in-memory stores by path.
///
/// `create` still materializes an empty file at the path so the on-disk
/// sandbox layout (`<worktree>/.beads/mission.db`) stays observable.
#[derive(Debug, Default)]
pub struct MemoryStoreProvider {
    stores: Mutex<HashMap<PathBuf, Arc<MemoryStore>>>,
}

impl MemoryStoreProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StoreProvider for MemoryStoreProvider {
    fn create(&self, path: &Path) -> Result<Arc<dyn Storage>> {
        let mut stores = self.stores.lock().unwrap_or_else(PoisonError::into_inner);
        // Existence is judged by the filesystem: a stale map entry whose
        // file was removed with its worktree is replaced by the fresh store.
        if path.exists() {
            return Err(StoreError::Invalid {
                detail: format!("store already exists at {}", path.display()),
            });
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
                detail: format!("create {}: {e}", parent.display()),
                partial: false,
            })?;
        }
        std::fs::write(path, b"").map_err(|e| StoreError::Backend {
            detail: format!("create {}: {e}", path.display()),
            partial: false,
        })?;
        let store = Arc::new(MemoryStore::new());
        stores.insert(path.to_path_buf(), Arc::clone(&store));
        Ok(store)
    }

    fn open(&self, path: &Path) -> Result<Arc<dyn Storage>> {
        let stores = self.stores.lock().unwrap_or_else(PoisonError::into_inner);
        stores
            .get(path)
            .map(|s| Arc::clone(s) as Arc<dyn Storage>)
            .ok_or_else(|| StoreError::Invalid {
                detail: format!("no store at {}", path.display()),
            })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DependencyKind, IssueKind, Status};

    fn issue(title: &str) -> Issue {
        Issue {
            title: title.to_owned(),
            ..Issue::default()
        }
    }

    #[test]
    fn create_assigns_prefixed_ids() {
        let store = MemoryStore::with_prefix("vc");
        let a = store.create_issue(&issue("first"), "test").unwrap();
        let b = store.create_issue(&issue("second"), "test").unwrap();
        assert_eq!(a, "vc-1");
        assert_eq!(b, "vc-2");
    }

    #[test]
    fn create_preserves_explicit_id() {
        let store = MemoryStore::new();
        let id = store
            .create_issue(
                &Issue {
                    id: "vc-100".into(),
                    ..issue("mission")
                },
                "test",
            )
            .unwrap();
        assert_eq!(id, "vc-100");
        assert_eq!(store.get_issue("vc-100").unwrap().title, "mission");
    }

    #[test]
    fn create_detects_existing_id() {
        let store = MemoryStore::new();
        let pre = Issue {
            id: "vc-7".into(),
            ..issue("x")
        };
        store.create_issue(&pre, "test").unwrap();
        let err = store.create_issue(&pre, "test").unwrap_err();
        assert_eq!(err, StoreError::IssueExists { id: "vc-7".into() });
    }

    #[test]
    fn create_emits_created_event() {
        let store = MemoryStore::new();
        let id = store.create_issue(&issue("x"), "alice").unwrap();
        let events = store.get_events(&id, 10).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, "created");
        assert_eq!(events[0].actor, "alice");
    }

    #[test]
    fn update_applies_only_some_fields() {
        let store = MemoryStore::new();
        let id = store.create_issue(&issue("before"), "test").unwrap();
        store
            .update_issue(
                &id,
                &IssueUpdates {
                    status: Some(Status::InProgress),
                    ..IssueUpdates::default()
                },
                "test",
            )
            .unwrap();
        let got = store.get_issue(&id).unwrap();
        assert_eq!(got.status, Status::InProgress);
        assert_eq!(got.title, "before");
    }

    #[test]
    fn close_sets_terminal_status_and_records_reason() {
        let store = MemoryStore::new();
        let id = store.create_issue(&issue("x"), "test").unwrap();
        store.close_issue(&id, "done", "agent").unwrap();
        assert_eq!(store.get_issue(&id).unwrap().status, Status::Closed);
        let events = store.get_events(&id, 10).unwrap();
        assert_eq!(events[0].kind, "closed");
        assert_eq!(events[0].comment.as_deref(), Some("done"));
    }

    #[test]
    fn dependency_round_trip_and_conflict() {
        let store = MemoryStore::new();
        let a = store.create_issue(&issue("a"), "test").unwrap();
        let b = store.create_issue(&issue("b"), "test").unwrap();
        let dep = Dependency {
            from: a.clone(),
            to: b.clone(),
            kind: DependencyKind::Blocks,
        };
        store.add_dependency(&dep, "test").unwrap();

        assert_eq!(store.get_dependencies(&a).unwrap()[0].id, b);
        assert_eq!(store.get_dependents(&b).unwrap()[0].id, a);
        assert_eq!(store.get_dependency_records(&a).unwrap(), vec![dep.clone()]);

        let err = store.add_dependency(&dep, "test").unwrap_err();
        assert!(matches!(err, StoreError::DependencyExists { .. }));
    }

    #[test]
    fn labels_deduplicate() {
        let store = MemoryStore::new();
        let id = store.create_issue(&issue("x"), "test").unwrap();
        store.add_label(&id, "generated:plan", "test").unwrap();
        store.add_label(&id, "generated:plan", "test").unwrap();
        assert_eq!(store.get_labels(&id).unwrap(), vec!["generated:plan"]);
    }

    #[test]
    fn search_matches_title_and_description() {
        let store = MemoryStore::new();
        store.create_issue(&issue("Implement auth"), "t").unwrap();
        store
            .create_issue(
                &Issue {
                    description: "authentication backend".into(),
                    ..issue("Other")
                },
                "t",
            )
            .unwrap();
        store.create_issue(&issue("Unrelated"), "t").unwrap();

        let hits = store.search_issues("auth", &IssueFilter::default()).unwrap();
        assert_eq!(hits.len(), 2);

        let all = store.search_issues("", &IssueFilter::default()).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn search_filters_by_status_and_kind() {
        let store = MemoryStore::new();
        let id = store.create_issue(&issue("a"), "t").unwrap();
        store
            .create_issue(
                &Issue {
                    kind: IssueKind::Epic,
                    ..issue("b")
                },
                "t",
            )
            .unwrap();
        store.close_issue(&id, "done", "t").unwrap();

        let closed = store
            .search_issues(
                "",
                &IssueFilter {
                    status: Some(Status::Closed),
                    kind: None,
                },
            )
            .unwrap();
        assert_eq!(closed.len(), 1);

        let epics = store
            .search_issues(
                "",
                &IssueFilter {
                    status: None,
                    kind: Some(IssueKind::Epic),
                },
            )
            .unwrap();
        assert_eq!(epics.len(), 1);
    }

    #[test]
    fn mission_state_defaults_and_updates() {
        let store = MemoryStore::new();
        store
            .create_issue(
                &Issue {
                    id: "vc-100".into(),
                    kind: IssueKind::Epic,
                    ..issue("mission")
                },
                "t",
            )
            .unwrap();

        let mission = store.get_mission("vc-100").unwrap();
        assert!(!mission.is_approved());

        store
            .update_mission(
                "vc-100",
                &MissionUpdates {
                    sandbox_path: Some(Some("/tmp/sb".into())),
                    branch_name: Some(Some("mission/vc-100-x".into())),
                    ..MissionUpdates::default()
                },
            )
            .unwrap();
        let mission = store.get_mission("vc-100").unwrap();
        assert!(mission.has_sandbox());

        // Clearing works through the double-Option.
        store
            .update_mission(
                "vc-100",
                &MissionUpdates {
                    sandbox_path: Some(None),
                    branch_name: Some(None),
                    ..MissionUpdates::default()
                },
            )
            .unwrap();
        assert!(!store.get_mission("vc-100").unwrap().has_sandbox());
    }

    #[test]
    fn transaction_commit_applies_all_writes() {
        let store = MemoryStore::new();
        store
            .run_in_transaction(&|txn| {
                let a = txn.create_issue(&issue("a"), "t")?;
                let b = txn.create_issue(&issue("b"), "t")?;
                txn.add_dependency(&Dependency::blocks(b, a), "t")?;
                Ok(())
            })
            .unwrap();
        assert_eq!(
            store.search_issues("", &IssueFilter::default()).unwrap().len(),
            2
        );
    }

    #[test]
    fn transaction_error_rolls_back_everything() {
        let store = MemoryStore::new();
        let err = store
            .run_in_transaction(&|txn| {
                txn.create_issue(&issue("a"), "t")?;
                txn.create_issue(&issue("b"), "t")?;
                Err(StoreError::Invalid {
                    detail: "boom".into(),
                })
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::Invalid { .. }));
        assert!(
            store
                .search_issues("", &IssueFilter::default())
                .unwrap()
                .is_empty(),
            "rolled-back transaction must leave no issues behind"
        );
    }

    #[test]
    fn events_are_newest_first_and_limited() {
        let store = MemoryStore::new();
        let id = store.create_issue(&issue("x"), "t").unwrap();
        for i in 0..5 {
            store.add_comment(&id, "t", &format!("c{i}")).unwrap();
        }
        let events = store.get_events(&id, 3).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].comment.as_deref(), Some("c4"));
    }

    #[test]
    fn provider_create_open_and_layout() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join(".beads").join("mission.db");
        let provider = MemoryStoreProvider::new();

        let store = provider.create(&db_path).unwrap();
        assert!(db_path.exists(), "provider must materialize the db file");
        store.set_config("issue_prefix", "vc").unwrap();

        let reopened = provider.open(&db_path).unwrap();
        assert_eq!(reopened.get_config("issue_prefix").unwrap(), "vc");

        assert!(provider.create(&db_path).is_err(), "double create must fail");
        assert!(provider.open(Path::new("/nope")).is_err());
    }

    #[test]
    fn plan_store_round_trip_and_delete() {
        let store = MemoryStore::new();
        let plan = Plan {
            mission_id: "vc-100".into(),
            ..Plan::default()
        };
        store.put_plan(&plan).unwrap();
        assert_eq!(store.get_plan("vc-100").unwrap(), plan);
        store.delete_plan("vc-100").unwrap();
        assert!(matches!(
            store.get_plan("vc-100").unwrap_err(),
            StoreError::PlanNotFound { .. }
        ));
        assert!(store.delete_plan("vc-100").is_err());
    }
}
