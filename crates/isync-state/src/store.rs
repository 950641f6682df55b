//! The Sync State Store: a single self-describing YAML file guarded by a
//! single in-memory mutex, saved atomically (write-to-temp then rename).

use crate::error::{Result, StateError};
use crate::state::{RepositoryDescriptor, SyncState};
use isync_core::Identifier;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

const STATE_FILENAME: &str = ".sync-state.yaml";

/// Persists and serves the Sync State for one repository.
///
/// Concurrent mutation is prevented at the API boundary by a single mutex;
/// callers that need a point-in-time view should take a snapshot (`snapshot`)
/// rather than hold the lock across I/O.
pub struct SyncStateStore {
    state_path: PathBuf,
    state: Mutex<SyncState>,
}

impl SyncStateStore {
    fn state_path(repo_path: &Path) -> PathBuf {
        repo_path.join(STATE_FILENAME)
    }

    /// Loads the state file under `repo_path`. Missing or empty files are
    /// reported as `StateError::NotFound`, not a hard I/O error.
    pub fn load(repo_path: &Path) -> Result<Self> {
        let state_path = Self::state_path(repo_path);
        debug!(path = %state_path.display(), "loading sync state");
        let contents = match fs::read_to_string(&state_path) {
            Ok(c) if !c.trim().is_empty() => c,
            Ok(_) => {
                return Err(StateError::NotFound {
                    path: state_path,
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StateError::NotFound { path: state_path })
            }
            Err(source) => return Err(StateError::Io { path: state_path, source }),
        };
        let state: SyncState = serde_yaml::from_str(&contents)
            .map_err(|source| StateError::Parse { path: state_path.clone(), source })?;
        info!(issues = state.issues.len(), "sync state loaded");
        Ok(Self { state_path, state: Mutex::new(state) })
    }

    /// Creates a fresh, unsaved state for `repo_path`. Callers must `save`
    /// to persist it.
    pub fn initialize(repo_path: &Path, descriptor: RepositoryDescriptor) -> Self {
        info!(path = %repo_path.display(), "initializing fresh sync state");
        Self {
            state_path: Self::state_path(repo_path),
            state: Mutex::new(SyncState::new(descriptor)),
        }
    }

    /// Loads existing state, or initializes a fresh one if none is found.
    pub fn open(repo_path: &Path, branch: &str) -> Result<Self> {
        match Self::load(repo_path) {
            Ok(store) => Ok(store),
            Err(e) if e.is_not_found() => Ok(Self::initialize(
                repo_path,
                RepositoryDescriptor {
                    path: repo_path.to_path_buf(),
                    branch: branch.to_owned(),
                    initial_sync: true,
                },
            )),
            Err(e) => Err(e),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs `f` with exclusive access to the in-memory state.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut SyncState) -> R) -> R {
        let mut guard = self.lock();
        f(&mut guard)
    }

    /// A cloned point-in-time view, safe to read without holding the lock
    /// across I/O.
    pub fn snapshot(&self) -> SyncState {
        self.lock().clone()
    }

    /// Atomically persists the current state: write to a sibling temp file,
    /// then rename over the target so readers never observe a half-written
    /// file.
    pub fn save(&self) -> Result<()> {
        let guard = self.lock();
        let serialized = serde_yaml::to_string(&*guard)
            .expect("SyncState serialization is infallible for well-formed state");
        drop(guard);

        if let Some(parent) = self.state_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| StateError::Io { path: parent.to_path_buf(), source })?;
        }
        let tmp_path = self.state_path.with_extension("yaml.tmp");
        fs::write(&tmp_path, serialized)
            .map_err(|source| StateError::Io { path: tmp_path.clone(), source })?;
        fs::rename(&tmp_path, &self.state_path)
            .map_err(|source| StateError::Io { path: self.state_path.clone(), source })?;
        debug!(path = %self.state_path.display(), "sync state saved");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.state_path
    }
}

/// Result of `validate`: divergence between the state and the on-disk tree.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ValidationResult {
    /// Identifiers the state tracks whose artifact file is missing on disk.
    pub missing_artifacts: Vec<Identifier>,
    /// Issue files on disk under a known project that the state has no
    /// record of.
    pub orphan_files: Vec<PathBuf>,
}

impl ValidationResult {
    pub fn is_clean(&self) -> bool {
        self.missing_artifacts.is_empty() && self.orphan_files.is_empty()
    }
}

/// Result of `recover`: entries the recovery would add/update.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct RecoveryResult {
    pub recovered: Vec<Identifier>,
    pub dry_run: bool,
}

/// Detects on-disk/state divergence: state entries whose artifact file is
/// missing, and issue files present on disk that the state has no record of.
pub fn validate(state: &SyncState, repo_path: &Path) -> ValidationResult {
    let mut result = ValidationResult::default();

    for (identifier, issue_state) in &state.issues {
        let full_path = repo_path.join(&issue_state.artifact_path);
        if !full_path.is_file() {
            result.missing_artifacts.push(identifier.clone());
        }
    }

    let projects_dir = repo_path.join("projects");
    if let Ok(project_entries) = fs::read_dir(&projects_dir) {
        for project_entry in project_entries.flatten() {
            let issues_dir = project_entry.path().join("issues");
            let Ok(issue_entries) = fs::read_dir(&issues_dir) else { continue };
            for issue_entry in issue_entries.flatten() {
                let path = issue_entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                    continue;
                }
                let relative = path.strip_prefix(repo_path).unwrap_or(&path).to_path_buf();
                let tracked = state
                    .issues
                    .values()
                    .any(|s| s.artifact_path == relative);
                if !tracked {
                    result.orphan_files.push(relative);
                }
            }
        }
    }

    result
}

/// Rebuilds state entries from on-disk artifacts by re-reading each issue
/// file under `projects/*/issues/*.yaml` and recomputing its fingerprint.
///
/// When `dry_run` is true, no mutation is performed; the result still
/// reports what would have been recovered.
pub fn recover(
    state: &mut SyncState,
    repo_path: &Path,
    dry_run: bool,
    read_record: impl Fn(&Path) -> Option<isync_core::IssueRecord>,
) -> RecoveryResult {
    let mut result = RecoveryResult { recovered: vec![], dry_run };

    let projects_dir = repo_path.join("projects");
    let Ok(project_entries) = fs::read_dir(&projects_dir) else {
        return result;
    };
    for project_entry in project_entries.flatten() {
        let issues_dir = project_entry.path().join("issues");
        let Ok(issue_entries) = fs::read_dir(&issues_dir) else { continue };
        for issue_entry in issue_entries.flatten() {
            let path = issue_entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                continue;
            }
            let Some(record) = read_record(&path) else { continue };
            result.recovered.push(record.identifier.clone());
            if !dry_run {
                let relative = path.strip_prefix(repo_path).unwrap_or(&path).to_path_buf();
                state.update_issue(&record, relative);
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use isync_core::record::RelationshipEdge;
    use isync_core::{IssueRecord, RelationshipKind};

    fn record(id: &str) -> IssueRecord {
        IssueRecord {
            identifier: Identifier::parse(id).unwrap(),
            summary: "s".to_owned(),
            last_modified: chrono::Utc::now(),
            relationships: vec![RelationshipEdge::new(
                RelationshipKind::RelatesTo,
                Identifier::parse("PROJ-2").unwrap(),
            )],
            extra: Default::default(),
        }
    }

    #[test]
    fn load_reports_not_found_for_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = SyncStateStore::load(dir.path()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = SyncStateStore::initialize(
            dir.path(),
            RepositoryDescriptor {
                path: dir.path().to_path_buf(),
                branch: "main".to_owned(),
                initial_sync: true,
            },
        );
        store.with_state(|state| state.update_issue(&record("PROJ-1"), PathBuf::from("projects/PROJ/issues/PROJ-1.yaml")));
        store.save().unwrap();

        let reloaded = SyncStateStore::load(dir.path()).unwrap();
        let snapshot = reloaded.snapshot();
        assert!(snapshot.get_issue(&Identifier::parse("PROJ-1").unwrap()).is_some());
    }

    #[test]
    fn validate_reports_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let store = SyncStateStore::initialize(
            dir.path(),
            RepositoryDescriptor { path: dir.path().to_path_buf(), branch: "main".into(), initial_sync: true },
        );
        store.with_state(|state| {
            state.update_issue(&record("PROJ-1"), PathBuf::from("projects/PROJ/issues/PROJ-1.yaml"))
        });
        let snapshot = store.snapshot();
        let result = validate(&snapshot, dir.path());
        assert_eq!(result.missing_artifacts, vec![Identifier::parse("PROJ-1").unwrap()]);
    }

    #[test]
    fn validate_reports_orphan_file() {
        let dir = tempfile::tempdir().unwrap();
        let issues_dir = dir.path().join("projects/PROJ/issues");
        fs::create_dir_all(&issues_dir).unwrap();
        fs::write(issues_dir.join("PROJ-1.yaml"), "identifier: PROJ-1\n").unwrap();

        let store = SyncStateStore::initialize(
            dir.path(),
            RepositoryDescriptor { path: dir.path().to_path_buf(), branch: "main".into(), initial_sync: true },
        );
        let snapshot = store.snapshot();
        let result = validate(&snapshot, dir.path());
        assert_eq!(result.orphan_files.len(), 1);
    }

    #[test]
    fn recover_dry_run_does_not_mutate_state() {
        let dir = tempfile::tempdir().unwrap();
        let issues_dir = dir.path().join("projects/PROJ/issues");
        fs::create_dir_all(&issues_dir).unwrap();
        let path = issues_dir.join("PROJ-1.yaml");
        fs::write(&path, "id").unwrap();

        let mut state = SyncState::new(RepositoryDescriptor {
            path: dir.path().to_path_buf(),
            branch: "main".into(),
            initial_sync: true,
        });
        let result = recover(&mut state, dir.path(), true, |_| Some(record("PROJ-1")));
        assert_eq!(result.recovered.len(), 1);
        assert!(state.get_issue(&Identifier::parse("PROJ-1").unwrap()).is_none());
    }
}
