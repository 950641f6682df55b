//! The Sync State Store: persists per-repository sync state to a single
//! self-describing YAML file, guarded by one in-memory mutex.

pub mod error;
pub mod state;
pub mod store;

pub use error::{Result, StateError};
pub use state::{
    IssueState, OperationKind, OperationResultSummary, OperationStatus, RepositoryDescriptor,
    Statistics, SyncOperation, SyncState, HISTORY_RETENTION,
};
pub use store::{recover, validate, RecoveryResult, SyncStateStore, ValidationResult};
