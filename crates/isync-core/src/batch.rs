//! Work and result types flowing between the engine, worker pool, and caller.

use crate::identifier::Identifier;
use std::time::Duration;

/// One of `{fetch, serialize, link, commit, cancelled}` — labels per-issue failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    Serialize,
    Link,
    Commit,
    Cancelled,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Fetch => "fetch",
            Stage::Serialize => "serialize",
            Stage::Link => "link",
            Stage::Commit => "commit",
            Stage::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// `(identifier, ordinal)` — the ordinal preserves input position for stable
/// reporting but does not constrain execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkTask {
    pub identifier: Identifier,
    pub ordinal: usize,
}

/// `(identifier, ordinal, artifact-path | none, error | none, elapsed)`.
#[derive(Debug, Clone)]
pub struct WorkResult {
    pub identifier: Identifier,
    pub ordinal: usize,
    pub artifact_path: Option<std::path::PathBuf>,
    pub error: Option<(Stage, String)>,
    pub elapsed: Duration,
}

impl WorkResult {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// `(identifier, stage, message)`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FailureRecord {
    pub identifier: Identifier,
    pub stage: Stage,
    pub message: String,
}

/// Aggregated outcome of one batch invocation.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BatchResult {
    pub total: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub artifact_paths: Vec<std::path::PathBuf>,
    pub failures: Vec<FailureRecord>,
    pub duration: Duration,
    pub workers: usize,
}

impl BatchResult {
    /// Issues per second, computed over `duration`. Zero duration yields
    /// zero throughput rather than dividing by zero.
    pub fn throughput(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs <= 0.0 {
            0.0
        } else {
            self.processed as f64 / secs
        }
    }

    /// Average wall-clock time spent per processed issue.
    pub fn average_elapsed(&self) -> Duration {
        if self.processed == 0 {
            Duration::ZERO
        } else {
            self.duration / self.processed as u32
        }
    }
}
