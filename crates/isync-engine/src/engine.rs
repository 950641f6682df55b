//! The Batch Engine: orchestrates one batch from input normalization
//! through dispatch, link reconciliation, and state-store updates.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use isync_core::identifier::normalize_identifiers;
use isync_core::{
    fingerprint, BatchResult, FailureRecord, Identifier, IdentifierError, IssueRecord, Stage,
    WorkTask,
};
use isync_fetch::{FetchError, IssueFetcher};
use isync_filter::{FreshnessProbe, Policy};
use isync_link::LinkError;
use isync_repo::{DriverError, FileSerializer, RepositoryDriver};
use isync_state::{OperationKind, OperationResultSummary, StateError, SyncState, SyncStateStore};

use tracing::{info, warn};

use crate::cancellation::CancellationToken;
use crate::pool::{self, Collaborators};
use crate::progress::ProgressBus;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid identifier: {0}")]
    InvalidInput(#[from] IdentifierError),

    #[error("no identifiers or query supplied")]
    EmptyWorkSpecification,

    #[error("query resolution failed: {0}")]
    QueryResolution(#[from] FetchError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Link(#[from] LinkError),
}

type Result<T> = std::result::Result<T, EngineError>;

/// Per-batch tuning; anything left `None` falls back to the engine's
/// built-in default.
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub concurrency: Option<usize>,
    pub rate_limit: Option<Duration>,
    /// `Some(policy)` requests incremental filtering under that policy;
    /// `None` means every resolved candidate is dispatched.
    pub incremental: Option<Policy>,
}

/// Default per-worker rate-limit gate: 500ms between a worker's
/// successive fetches.
pub const DEFAULT_RATE_LIMIT: Duration = Duration::from_millis(500);
pub const DEFAULT_CONCURRENCY: usize = 5;

enum WorkSpec {
    Keys(Vec<Identifier>),
    Query(String),
}

/// Bridges the Incremental Filter's timestamp-shaped probe to the
/// authoritative fingerprint comparison: fingerprint comparison is the
/// authoritative signal, the timestamp probe only an optional fast path.
///
/// Re-fetches the candidate so its current fingerprint can be compared
/// against the stored one, then reports a timestamp the filter's
/// `remote_modified > stored.last_updated` check will resolve the same way
/// fingerprint equality would: unchanged -> the stored timestamp itself
/// (never newer), changed -> now (always newer).
struct FingerprintProbe<'a> {
    fetcher: &'a dyn IssueFetcher,
    state: &'a SyncState,
}

impl FreshnessProbe for FingerprintProbe<'_> {
    fn last_modified(
        &self,
        identifier: &Identifier,
    ) -> std::result::Result<Option<chrono::DateTime<chrono::Utc>>, String> {
        let record = self.fetcher.get(identifier.as_str()).map_err(|e| e.to_string())?;
        match self.state.get_issue(identifier) {
            Some(stored) if stored.fingerprint == fingerprint(&record) => Ok(Some(stored.last_updated)),
            _ => Ok(Some(chrono::Utc::now())),
        }
    }
}

/// Orchestrates batches against one set of external collaborators. Stateless
/// across calls beyond those collaborators: the Sync State Store is opened
/// fresh per `repo_path` on every call, per the single-writer
/// caller contract.
pub struct BatchEngine {
    collaborators: Collaborators,
}

impl BatchEngine {
    pub fn new(
        fetcher: Arc<dyn IssueFetcher + Send + Sync>,
        serializer: Arc<dyn FileSerializer + Send + Sync>,
        driver: Arc<dyn RepositoryDriver + Send + Sync>,
    ) -> Self {
        Self {
            collaborators: Collaborators { fetcher, serializer, driver },
        }
    }

    /// `run-keys(context, identifier-list, repo-path)`.
    pub fn run_keys(
        &self,
        raw_identifiers: &[String],
        repo_path: &Path,
        opts: &BatchOptions,
        cancellation: &CancellationToken,
        progress: &ProgressBus,
    ) -> Result<BatchResult> {
        let identifiers = normalize_identifiers(raw_identifiers)?;
        if identifiers.is_empty() {
            return Err(EngineError::EmptyWorkSpecification);
        }
        self.run(WorkSpec::Keys(identifiers), None, repo_path, opts, cancellation, progress)
    }

    /// `run-query(context, query-string, repo-path)`.
    pub fn run_query(
        &self,
        query: &str,
        repo_path: &Path,
        opts: &BatchOptions,
        cancellation: &CancellationToken,
        progress: &ProgressBus,
    ) -> Result<BatchResult> {
        let records = self.collaborators.fetcher.search(query)?;
        let identifiers: Vec<Identifier> = records.into_iter().map(|r| r.identifier).collect();
        self.run(
            WorkSpec::Query(query.to_owned()),
            Some(identifiers),
            repo_path,
            opts,
            cancellation,
            progress,
        )
    }

    fn run(
        &self,
        spec: WorkSpec,
        resolved: Option<Vec<Identifier>>,
        repo_path: &Path,
        opts: &BatchOptions,
        cancellation: &CancellationToken,
        progress: &ProgressBus,
    ) -> Result<BatchResult> {
        let start = Instant::now();

        self.collaborators.driver.initialize(repo_path)?;
        let store = SyncStateStore::open(repo_path, "main")?;

        let candidates = match (&spec, resolved) {
            (WorkSpec::Keys(ids), _) => ids.clone(),
            (WorkSpec::Query(_), Some(ids)) => ids,
            (WorkSpec::Query(_), None) => unreachable!("run_query always resolves candidates"),
        };
        let total = candidates.len();

        let work_set = match &opts.incremental {
            Some(policy) => {
                let snapshot = store.snapshot();
                let probe = FingerprintProbe { fetcher: self.collaborators.fetcher.as_ref(), state: &snapshot };
                isync_filter::filter(&candidates, &snapshot, policy, &probe)
            }
            None => candidates,
        };

        let kind = if opts.incremental.is_some() {
            OperationKind::Incremental
        } else {
            match &spec {
                WorkSpec::Keys(_) => OperationKind::Issues,
                WorkSpec::Query(_) => OperationKind::Query,
            }
        };
        let query_string = match &spec {
            WorkSpec::Query(q) => Some(q.clone()),
            WorkSpec::Keys(_) => None,
        };

        info!(total, work_set = work_set.len(), ?kind, "starting batch");

        let workers = pool::clamp_concurrency(opts.concurrency.unwrap_or(DEFAULT_CONCURRENCY));
        let rate_limit = opts.rate_limit.unwrap_or(DEFAULT_RATE_LIMIT);
        let config_snapshot = serde_json::json!({
            "concurrency": workers,
            "rate_limit_ms": rate_limit.as_millis(),
        });

        let operation_id = store.with_state(|state| {
            state
                .start_operation(kind, query_string, work_set.clone(), config_snapshot)
                .operation_id
        });
        store.save()?;

        let tasks: Vec<WorkTask> = work_set
            .iter()
            .enumerate()
            .map(|(ordinal, identifier)| WorkTask { identifier: identifier.clone(), ordinal })
            .collect();

        let pipeline_results = pool::execute(
            tasks,
            workers,
            rate_limit,
            &self.collaborators,
            repo_path,
            cancellation,
            progress,
        );

        let mut artifact_paths = Vec::new();
        let mut failures = Vec::new();
        let mut succeeded_records: Vec<IssueRecord> = Vec::new();
        let mut artifact_path_of: HashMap<Identifier, PathBuf> = HashMap::new();

        for outcome in &pipeline_results {
            if outcome.result.succeeded() {
                if let Some(path) = &outcome.result.artifact_path {
                    artifact_paths.push(path.clone());
                    artifact_path_of.insert(outcome.result.identifier.clone(), path.clone());
                }
                if let Some(record) = &outcome.record {
                    succeeded_records.push(record.clone());
                }
            } else if let Some((stage, message)) = &outcome.result.error {
                failures.push(FailureRecord {
                    identifier: outcome.result.identifier.clone(),
                    stage: *stage,
                    message: message.clone(),
                });
            }
        }

        // Link reconciliation is a strict happens-after barrier relative to
        // every per-issue commit.
        let link_failures = self.reconcile_links(repo_path, &store, &succeeded_records, &mut artifact_path_of)?;
        for identifier in &link_failures.demoted {
            artifact_paths.retain(|p| artifact_path_of.get(identifier) != Some(p));
            succeeded_records.retain(|r| &r.identifier != identifier);
        }
        failures.extend(link_failures.failures);

        for record in &succeeded_records {
            let path = artifact_path_of
                .get(&record.identifier)
                .cloned()
                .unwrap_or_default();
            store.with_state(|state| state.update_issue(record, path));
        }

        let succeeded = succeeded_records.len();
        let failed = failures.len();
        let summary = OperationResultSummary { total: work_set.len(), succeeded, failed };

        store.with_state(|state| {
            if cancellation.is_cancelled() {
                state.cancel_operation(&operation_id, summary)
            } else {
                state.complete_operation(&operation_id, summary)
            }
        });
        store.save()?;

        info!(succeeded, failed, skipped = total.saturating_sub(work_set.len()), "batch finished");

        Ok(BatchResult {
            total,
            processed: pipeline_results.len(),
            succeeded,
            failed,
            skipped: total.saturating_sub(work_set.len()),
            artifact_paths,
            failures,
            duration: start.elapsed(),
            workers,
        })
    }

    /// Reconciles relationship edges for the union of this batch's
    /// successes and the Sync State Store's previously-known issues, then
    /// commits the changed reference files one repository revision per
    /// affected project.
    ///
    /// Previously-known records aren't retained by the state store (only
    /// fingerprints are); their edges are recovered by re-reading the
    /// serialized YAML artifact the state points at. An artifact that no
    /// longer parses is skipped rather than failing the whole reconcile —
    /// it will surface via `validate`/`recover` instead.
    fn reconcile_links(
        &self,
        repo_path: &Path,
        store: &SyncStateStore,
        succeeded_records: &[IssueRecord],
        artifact_path_of: &mut HashMap<Identifier, PathBuf>,
    ) -> Result<LinkOutcome> {
        let snapshot = store.snapshot();

        let mut records: Vec<IssueRecord> = succeeded_records.to_vec();
        let in_batch: HashSet<Identifier> = succeeded_records.iter().map(|r| r.identifier.clone()).collect();

        for (identifier, state) in &snapshot.issues {
            if in_batch.contains(identifier) {
                continue;
            }
            artifact_path_of.insert(identifier.clone(), state.artifact_path.clone());
            if let Some(record) = read_record(&repo_path.join(&state.artifact_path)) {
                records.push(record);
            }
        }

        let known_set: HashSet<Identifier> = snapshot
            .issues
            .keys()
            .cloned()
            .chain(in_batch.iter().cloned())
            .collect();

        let artifact_path_of_ref = &*artifact_path_of;
        let outcome = isync_link::reconcile(repo_path, &records, &known_set, |id| {
            artifact_path_of_ref.get(id).cloned()
        })?;

        let mut by_project: HashMap<String, Vec<PathBuf>> = HashMap::new();
        for path in outcome.written.iter().chain(outcome.removed.iter()) {
            if let Some(project) = project_of(repo_path, path) {
                by_project.entry(project).or_default().push(path.clone());
            }
        }

        let mut failures = Vec::new();
        let mut demoted = Vec::new();
        for (project, paths) in by_project {
            let message = format!("sync: relationships updated for {project}");
            if let Err(e) = self.collaborators.driver.commit_paths(repo_path, &paths, &message) {
                warn!(project, error = %e, "relationship commit failed, demoting issues from this batch");
                for record in succeeded_records.iter().filter(|r| r.project_key() == project.as_str()) {
                    failures.push(FailureRecord {
                        identifier: record.identifier.clone(),
                        stage: Stage::Link,
                        message: e.to_string(),
                    });
                    demoted.push(record.identifier.clone());
                }
            }
        }

        Ok(LinkOutcome { failures, demoted })
    }
}

struct LinkOutcome {
    failures: Vec<FailureRecord>,
    demoted: Vec<Identifier>,
}

fn read_record(path: &Path) -> Option<IssueRecord> {
    let contents = std::fs::read_to_string(path).ok()?;
    serde_yaml::from_str(&contents).ok()
}

fn project_of(repo_root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(repo_root).unwrap_or(path);
    let mut components = relative.components();
    components.next()?; // "projects"
    let project = components.next()?;
    Some(project.as_os_str().to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use isync_core::record::RelationshipEdge;
    use isync_core::RelationshipKind;
    use isync_repo::{GitRepositoryDriver, YamlFileSerializer};
    use std::collections::HashMap as StdHashMap;
    use std::sync::Mutex;

    struct FakeFetcher(Mutex<StdHashMap<String, IssueRecord>>);
    impl IssueFetcher for FakeFetcher {
        fn get(&self, identifier: &str) -> std::result::Result<IssueRecord, FetchError> {
            self.0
                .lock()
                .unwrap()
                .get(identifier)
                .cloned()
                .ok_or_else(|| FetchError::NotFound(identifier.to_owned()))
        }
        fn search(&self, _query: &str) -> std::result::Result<Vec<IssueRecord>, FetchError> {
            Ok(self.0.lock().unwrap().values().cloned().collect())
        }
        fn authenticate(&self) -> std::result::Result<(), FetchError> {
            Ok(())
        }
    }

    fn record(id: &str, edges: Vec<RelationshipEdge>) -> IssueRecord {
        IssueRecord {
            identifier: Identifier::parse(id).unwrap(),
            summary: "Fix the bug".into(),
            last_modified: chrono::Utc::now(),
            relationships: edges,
            extra: Default::default(),
        }
    }

    fn init_git_repo(path: &Path) {
        let driver = GitRepositoryDriver;
        driver.initialize(path).unwrap();
        std::process::Command::new("git").args(["config", "user.email", "test@example.com"]).current_dir(path).output().unwrap();
        std::process::Command::new("git").args(["config", "user.name", "Test"]).current_dir(path).output().unwrap();
    }

    fn engine(records: Vec<IssueRecord>) -> BatchEngine {
        let map = records.into_iter().map(|r| (r.identifier.as_str().to_owned(), r)).collect();
        BatchEngine::new(
            Arc::new(FakeFetcher(Mutex::new(map))),
            Arc::new(YamlFileSerializer),
            Arc::new(GitRepositoryDriver),
        )
    }

    #[test]
    fn run_keys_rejects_invalid_identifier_before_any_side_effect() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(vec![]);
        let cancellation = CancellationToken::new();
        let (bus, _rx) = ProgressBus::new();
        let err = engine
            .run_keys(
                &["PROJ-1".to_owned(), "bad".to_owned()],
                dir.path(),
                &BatchOptions::default(),
                &cancellation,
                &bus,
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
        assert!(!dir.path().join(".sync-state.yaml").exists());
    }

    #[test]
    fn single_key_cold_repo_produces_one_commit() {
        let dir = tempfile::tempdir().unwrap();
        init_git_repo(dir.path());
        let engine = engine(vec![record("PROJ-1", vec![])]);
        let cancellation = CancellationToken::new();
        let (bus, _rx) = ProgressBus::new();
        let result = engine
            .run_keys(&["PROJ-1".to_owned()], dir.path(), &BatchOptions::default(), &cancellation, &bus)
            .unwrap();

        assert_eq!(result.total, 1);
        assert_eq!(result.succeeded, 1);
        assert_eq!(result.failed, 0);
        assert_eq!(result.workers, DEFAULT_CONCURRENCY);
        assert_eq!(result.artifact_paths, vec![PathBuf::from("projects/PROJ/issues/PROJ-1.yaml")]);
        assert!(dir.path().join("projects/PROJ/issues/PROJ-1.yaml").is_file());
    }

    #[test]
    fn duplicate_and_whitespace_identifiers_normalize_before_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(vec![record("PROJ-1", vec![]), record("PROJ-2", vec![])]);
        let cancellation = CancellationToken::new();
        let (bus, _rx) = ProgressBus::new();
        let raw: Vec<String> = " PROJ-1, PROJ-2 ,PROJ-1,"
            .split(',')
            .map(|s| s.to_owned())
            .collect();
        let result = engine
            .run_keys(&raw, dir.path(), &BatchOptions::default(), &cancellation, &bus)
            .unwrap();
        assert_eq!(result.total, 2);
    }

    #[test]
    fn per_issue_fetch_failure_does_not_abort_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        init_git_repo(dir.path());
        let engine = engine(vec![record("PROJ-1", vec![])]);
        let cancellation = CancellationToken::new();
        let (bus, _rx) = ProgressBus::new();
        let result = engine
            .run_keys(
                &["PROJ-1".to_owned(), "PROJ-404".to_owned()],
                dir.path(),
                &BatchOptions::default(),
                &cancellation,
                &bus,
            )
            .unwrap();
        assert_eq!(result.total, 2);
        assert_eq!(result.succeeded, 1);
        assert_eq!(result.failed, 1);
        assert_eq!(result.failures[0].identifier, Identifier::parse("PROJ-404").unwrap());
        assert_eq!(result.failures[0].stage, Stage::Fetch);
    }

    #[test]
    fn incremental_no_op_skips_unchanged_issue_on_resync() {
        let dir = tempfile::tempdir().unwrap();
        init_git_repo(dir.path());
        let engine = engine(vec![record("PROJ-1", vec![])]);
        let cancellation = CancellationToken::new();
        let (bus, _rx) = ProgressBus::new();
        engine
            .run_keys(&["PROJ-1".to_owned()], dir.path(), &BatchOptions::default(), &cancellation, &bus)
            .unwrap();

        let opts = BatchOptions {
            incremental: Some(Policy { include_modified: true, ..Default::default() }),
            ..Default::default()
        };
        let result = engine
            .run_keys(&["PROJ-1".to_owned()], dir.path(), &opts, &cancellation, &bus)
            .unwrap();
        assert_eq!(result.total, 1);
        assert_eq!(result.processed, 0);
        assert_eq!(result.succeeded, 0);
        assert_eq!(result.skipped, 1);
    }

    #[test]
    fn relationship_edges_materialize_after_both_peers_committed() {
        let dir = tempfile::tempdir().unwrap();
        init_git_repo(dir.path());
        let engine = engine(vec![
            record("A-1", vec![RelationshipEdge::new(RelationshipKind::RelatesTo, Identifier::parse("A-2").unwrap())]),
            record("A-2", vec![]),
        ]);
        let cancellation = CancellationToken::new();
        let (bus, _rx) = ProgressBus::new();
        engine
            .run_keys(
                &["A-1".to_owned(), "A-2".to_owned()],
                dir.path(),
                &BatchOptions::default(),
                &cancellation,
                &bus,
            )
            .unwrap();

        let reference = dir.path().join("projects/A/relationships/relates-to/A-2");
        assert!(reference.is_file());
        assert_eq!(std::fs::read_to_string(reference).unwrap(), "projects/A/issues/A-2.yaml");
    }
}
