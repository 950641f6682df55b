//! In-memory shape of the persisted Sync State.

use chrono::{DateTime, Utc};
use isync_core::{fingerprint, Identifier, IssueRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Operation history retention bound, fixed and documented in DESIGN.md.
pub const HISTORY_RETENTION: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryDescriptor {
    pub path: PathBuf,
    pub branch: String,
    pub initial_sync: bool,
}

/// Per-identifier synced state. Entries exist only for identifiers the
/// engine has ever successfully committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueState {
    pub project: String,
    pub last_updated: DateTime<Utc>,
    pub last_synced: DateTime<Utc>,
    pub fingerprint: String,
    pub artifact_path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Issues,
    Query,
    Incremental,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOperation {
    pub operation_id: String,
    pub kind: OperationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    pub identifier_set: Vec<Identifier>,
    pub start: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    /// Config snapshot the operation ran with, opaque beyond being logged.
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<OperationResultSummary>,
    pub terminal_status: OperationStatus,
}

/// A compact summary of a terminated operation's outcome, independent of
/// the richer transient `BatchResult` the engine returns to its caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResultSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Statistics {
    pub total_operations: u64,
    pub successes: u64,
    pub failures: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_successful_sync: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncState {
    pub descriptor: RepositoryDescriptor,
    pub issues: HashMap<Identifier, IssueState>,
    /// Most recent first.
    pub operations: Vec<SyncOperation>,
    pub statistics: Statistics,
}

impl SyncState {
    pub fn new(descriptor: RepositoryDescriptor) -> Self {
        Self {
            descriptor,
            issues: HashMap::new(),
            operations: Vec::new(),
            statistics: Statistics::default(),
        }
    }

    pub fn get_issue(&self, identifier: &Identifier) -> Option<&IssueState> {
        self.issues.get(identifier)
    }

    /// Recomputes the fingerprint and updates timestamps/artifact path for
    /// `record`, inserting a fresh entry if this is the issue's first
    /// successful commit.
    pub fn update_issue(&mut self, record: &IssueRecord, artifact_path: PathBuf) {
        let now = Utc::now();
        self.issues.insert(
            record.identifier.clone(),
            IssueState {
                project: record.project_key().to_owned(),
                last_updated: record.last_modified,
                last_synced: now,
                fingerprint: fingerprint(record),
                artifact_path,
            },
        );
    }

    /// Authoritative fingerprint comparison: `true` iff `record` differs
    /// from (or is absent from) the stored state.
    pub fn should_sync(&self, record: &IssueRecord) -> bool {
        match self.issues.get(&record.identifier) {
            None => true,
            Some(state) => state.fingerprint != fingerprint(record),
        }
    }

    pub fn start_operation(
        &mut self,
        kind: OperationKind,
        query: Option<String>,
        identifier_set: Vec<Identifier>,
        config: serde_json::Value,
    ) -> SyncOperation {
        let op = SyncOperation {
            operation_id: format!("op-{}", self.operations.len() + self.statistics.total_operations as usize + 1),
            kind,
            query,
            identifier_set,
            start: Utc::now(),
            end: None,
            config,
            results: None,
            terminal_status: OperationStatus::Running,
        };
        self.operations.insert(0, op.clone());
        op
    }

    fn finish_operation(&mut self, operation_id: &str, status: OperationStatus, results: Option<OperationResultSummary>) {
        if let Some(op) = self.operations.iter_mut().find(|o| o.operation_id == operation_id) {
            op.end = Some(Utc::now());
            op.terminal_status = status;
            op.results = results;
        }
        self.statistics.total_operations += 1;
        match status {
            OperationStatus::Succeeded => {
                self.statistics.successes += 1;
                self.statistics.last_successful_sync = Some(Utc::now());
            }
            OperationStatus::Failed | OperationStatus::Cancelled => {
                self.statistics.failures += 1;
            }
            OperationStatus::Running => {}
        }
        self.trim_history();
    }

    pub fn complete_operation(&mut self, operation_id: &str, results: OperationResultSummary) {
        let status = if results.failed == 0 {
            OperationStatus::Succeeded
        } else {
            OperationStatus::Failed
        };
        self.finish_operation(operation_id, status, Some(results));
    }

    pub fn fail_operation(&mut self, operation_id: &str, _error: &str) {
        self.finish_operation(operation_id, OperationStatus::Failed, None);
    }

    pub fn cancel_operation(&mut self, operation_id: &str, results: OperationResultSummary) {
        self.finish_operation(operation_id, OperationStatus::Cancelled, Some(results));
    }

    /// Most-recent-first, bounded by `limit`.
    pub fn history(&self, limit: usize) -> &[SyncOperation] {
        let end = limit.min(self.operations.len());
        &self.operations[..end]
    }

    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    fn trim_history(&mut self) {
        self.operations.truncate(HISTORY_RETENTION);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use isync_core::record::RelationshipEdge;
    use isync_core::RelationshipKind;

    fn descriptor() -> RepositoryDescriptor {
        RepositoryDescriptor {
            path: PathBuf::from("/tmp/r"),
            branch: "main".to_owned(),
            initial_sync: true,
        }
    }

    fn record(id: &str) -> IssueRecord {
        IssueRecord {
            identifier: Identifier::parse(id).unwrap(),
            summary: "s".to_owned(),
            last_modified: Utc::now(),
            relationships: vec![RelationshipEdge::new(
                RelationshipKind::Blocks,
                Identifier::parse("PROJ-9").unwrap(),
            )],
            extra: Default::default(),
        }
    }

    #[test]
    fn should_sync_true_for_unknown_issue() {
        let state = SyncState::new(descriptor());
        assert!(state.should_sync(&record("PROJ-1")));
    }

    #[test]
    fn should_sync_false_after_matching_update() {
        let mut state = SyncState::new(descriptor());
        let r = record("PROJ-1");
        state.update_issue(&r, PathBuf::from("projects/PROJ/issues/PROJ-1.yaml"));
        assert!(!state.should_sync(&r));
    }

    #[test]
    fn should_sync_true_after_content_change() {
        let mut state = SyncState::new(descriptor());
        let r = record("PROJ-1");
        state.update_issue(&r, PathBuf::from("p"));
        let mut changed = r.clone();
        changed.summary = "different".to_owned();
        assert!(state.should_sync(&changed));
    }

    #[test]
    fn operation_lifecycle_updates_statistics() {
        let mut state = SyncState::new(descriptor());
        let op = state.start_operation(OperationKind::Issues, None, vec![], serde_json::json!({}));
        assert_eq!(state.statistics().total_operations, 0);
        state.complete_operation(&op.operation_id, OperationResultSummary { total: 1, succeeded: 1, failed: 0 });
        assert_eq!(state.statistics().total_operations, 1);
        assert_eq!(state.statistics().successes, 1);
        assert!(state.statistics().last_successful_sync.is_some());
    }

    #[test]
    fn history_is_most_recent_first_and_bounded() {
        let mut state = SyncState::new(descriptor());
        for _ in 0..3 {
            let op = state.start_operation(OperationKind::Issues, None, vec![], serde_json::json!({}));
            state.complete_operation(&op.operation_id, OperationResultSummary { total: 0, succeeded: 0, failed: 0 });
        }
        let history = state.history(2);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].operation_id, "op-3");
    }
}
