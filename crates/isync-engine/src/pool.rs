//! The Worker Pool: executes the per-issue pipeline with bounded
//! concurrency and per-worker rate limiting.
//!
//! Realized with `std::thread` + `crossbeam-channel`, not an async runtime:
//! the engine's collaborators (`ureq`, `std::process::Command`) are all
//! synchronous, so threads are the natural fit.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use isync_core::{IssueRecord, Stage, WorkResult, WorkTask};
use isync_fetch::IssueFetcher;
use isync_repo::{FileSerializer, RepositoryDriver};
use tracing::warn;

use crate::cancellation::CancellationToken;
use crate::progress::{ProgressBus, ProgressEvent, ProgressStage};

/// Lower and upper bound on effective worker count.
pub const MIN_WORKERS: usize = 1;
pub const MAX_WORKERS: usize = 10;

/// `effective == max(1, min(10, configured))`. Zero or negative (already
/// unrepresentable in `usize`, so just zero) configurations become 1.
pub fn clamp_concurrency(configured: usize) -> usize {
    configured.clamp(MIN_WORKERS, MAX_WORKERS).max(MIN_WORKERS)
}

/// The external collaborators a worker needs for one pipeline run, shared
/// read-only across every worker thread.
#[derive(Clone)]
pub struct Collaborators {
    pub fetcher: Arc<dyn IssueFetcher + Send + Sync>,
    pub serializer: Arc<dyn FileSerializer + Send + Sync>,
    pub driver: Arc<dyn RepositoryDriver + Send + Sync>,
}

/// One task's outcome, carrying the fetched record alongside the public
/// `WorkResult` so the engine can feed it to the Link Manager and the Sync
/// State Store without re-fetching.
pub struct PipelineResult {
    pub result: WorkResult,
    pub record: Option<IssueRecord>,
}

/// Runs `tasks` to completion across `workers` threads and returns one
/// `PipelineResult` per task (including cancelled ones).
///
/// Dispatch follows input order; completion order is unconstrained across
/// workers. The output channel is sized to hold every task's result so no
/// worker ever blocks on a slow consumer.
pub fn execute(
    tasks: Vec<WorkTask>,
    workers: usize,
    rate_limit: Duration,
    collaborators: &Collaborators,
    repo_root: &Path,
    cancellation: &CancellationToken,
    progress: &ProgressBus,
) -> Vec<PipelineResult> {
    let total = tasks.len();
    let capacity = total.max(workers).max(1);
    let (input_tx, input_rx) = crossbeam_channel::bounded::<WorkTask>(capacity);
    let (output_tx, output_rx) = crossbeam_channel::bounded::<PipelineResult>(capacity);
    let processed = Arc::new(std::sync::atomic::AtomicUsize::new(0));

    std::thread::scope(|scope| {
        for worker_id in 0..workers {
            let input_rx = input_rx.clone();
            let output_tx = output_tx.clone();
            let collaborators = collaborators.clone();
            let repo_root = repo_root.to_path_buf();
            let cancellation = cancellation.clone();
            let progress = progress.clone();
            let processed = processed.clone();
            scope.spawn(move || {
                let mut last_fetch: Option<Instant> = None;
                while let Ok(task) = input_rx.recv() {
                    let outcome = run_task(
                        worker_id,
                        task,
                        &collaborators,
                        &repo_root,
                        &cancellation,
                        &progress,
                        rate_limit,
                        &mut last_fetch,
                        total,
                        &processed,
                    );
                    if output_tx.send(outcome).is_err() {
                        break;
                    }
                }
            });
        }
        drop(output_tx);

        for task in tasks {
            if cancellation.is_cancelled() {
                break;
            }
            if input_tx.send(task).is_err() {
                break;
            }
        }
        drop(input_tx);
    });

    output_rx.try_iter().collect()
}

#[allow(clippy::too_many_arguments)]
fn run_task(
    worker_id: usize,
    task: WorkTask,
    collaborators: &Collaborators,
    repo_root: &Path,
    cancellation: &CancellationToken,
    progress: &ProgressBus,
    rate_limit: Duration,
    last_fetch: &mut Option<Instant>,
    total: usize,
    processed: &Arc<std::sync::atomic::AtomicUsize>,
) -> PipelineResult {
    let start = Instant::now();
    let identifier = task.identifier;

    let emit_progress = |stage: ProgressStage, count: usize| {
        progress.emit(ProgressEvent {
            identifier: identifier.clone(),
            stage,
            processed_count: count,
            total,
            percentage: if total == 0 { 100.0 } else { count as f64 / total as f64 * 100.0 },
            worker_id,
            ts: chrono::Utc::now(),
        });
    };

    if cancellation.is_cancelled() {
        let count = processed.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
        emit_progress(ProgressStage::Cancelled, count);
        return PipelineResult {
            result: WorkResult {
                identifier,
                ordinal: task.ordinal,
                artifact_path: None,
                error: Some((Stage::Cancelled, "batch cancelled".to_owned())),
                elapsed: start.elapsed(),
            },
            record: None,
        };
    }

    emit_progress(ProgressStage::Fetching, processed.load(std::sync::atomic::Ordering::SeqCst));

    let earliest = last_fetch.map(|t| t + rate_limit);
    if let Some(earliest) = earliest {
        let now = Instant::now();
        if now < earliest && !cancellation.sleep(earliest - now) {
            let count = processed.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
            emit_progress(ProgressStage::Cancelled, count);
            return PipelineResult {
                result: WorkResult {
                    identifier,
                    ordinal: task.ordinal,
                    artifact_path: None,
                    error: Some((Stage::Cancelled, "cancelled during rate-limit wait".to_owned())),
                    elapsed: start.elapsed(),
                },
                record: None,
            };
        }
    }
    *last_fetch = Some(Instant::now());

    let record = match collaborators.fetcher.get(identifier.as_str()) {
        Ok(record) => record,
        Err(e) => {
            warn!(worker_id, %identifier, error = %e, "fetch failed");
            let count = processed.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
            emit_progress(ProgressStage::Fetching, count);
            return PipelineResult {
                result: WorkResult {
                    identifier,
                    ordinal: task.ordinal,
                    artifact_path: None,
                    error: Some((Stage::Fetch, e.to_string())),
                    elapsed: start.elapsed(),
                },
                record: None,
            };
        }
    };

    emit_progress(ProgressStage::Serializing, processed.load(std::sync::atomic::Ordering::SeqCst));
    let artifact_path = match collaborators.serializer.write(&record, repo_root) {
        Ok(path) => path,
        Err(e) => {
            let count = processed.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
            emit_progress(ProgressStage::Serializing, count);
            return PipelineResult {
                result: WorkResult {
                    identifier,
                    ordinal: task.ordinal,
                    artifact_path: None,
                    error: Some((Stage::Serialize, e.to_string())),
                    elapsed: start.elapsed(),
                },
                record: Some(record),
            };
        }
    };

    emit_progress(ProgressStage::Committing, processed.load(std::sync::atomic::Ordering::SeqCst));
    let full_path = repo_root.join(&artifact_path);
    if let Err(e) = collaborators
        .driver
        .commit_file(repo_root, &full_path, &identifier, &record.summary)
    {
        warn!(worker_id, %identifier, error = %e, "commit failed");
        let count = processed.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
        emit_progress(ProgressStage::Committing, count);
        return PipelineResult {
            result: WorkResult {
                identifier,
                ordinal: task.ordinal,
                // The file exists on disk but is not committed: reported for
                // recovery, not treated as a total loss.
                artifact_path: Some(artifact_path),
                error: Some((Stage::Commit, e.to_string())),
                elapsed: start.elapsed(),
            },
            record: Some(record),
        };
    }

    let count = processed.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
    emit_progress(ProgressStage::Done, count);

    PipelineResult {
        result: WorkResult {
            identifier,
            ordinal: task.ordinal,
            artifact_path: Some(artifact_path),
            error: None,
            elapsed: start.elapsed(),
        },
        record: Some(record),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use isync_core::Identifier;
    use isync_fetch::FetchError;
    use isync_repo::driver::DriverError;
    use isync_repo::serializer::SerializeError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakeFetcher(Mutex<HashMap<String, IssueRecord>>);
    impl IssueFetcher for FakeFetcher {
        fn get(&self, identifier: &str) -> Result<IssueRecord, FetchError> {
            self.0
                .lock()
                .unwrap()
                .get(identifier)
                .cloned()
                .ok_or_else(|| FetchError::NotFound(identifier.to_owned()))
        }
        fn search(&self, _query: &str) -> Result<Vec<IssueRecord>, FetchError> {
            Ok(self.0.lock().unwrap().values().cloned().collect())
        }
        fn authenticate(&self) -> Result<(), FetchError> {
            Ok(())
        }
    }

    struct FakeSerializer;
    impl FileSerializer for FakeSerializer {
        fn write(&self, record: &IssueRecord, repo_root: &Path) -> Result<PathBuf, SerializeError> {
            let relative = PathBuf::from("projects")
                .join(record.project_key())
                .join("issues")
                .join(format!("{}.yaml", record.identifier.as_str()));
            let full = repo_root.join(&relative);
            std::fs::create_dir_all(full.parent().unwrap()).unwrap();
            std::fs::write(&full, "fake").unwrap();
            Ok(relative)
        }
    }

    struct FakeDriver;
    impl RepositoryDriver for FakeDriver {
        fn initialize(&self, _path: &Path) -> Result<(), DriverError> {
            Ok(())
        }
        fn validate_clean(&self, _path: &Path) -> Result<(), DriverError> {
            Ok(())
        }
        fn commit_file(&self, _path: &Path, _file: &Path, _identifier: &Identifier, _summary: &str) -> Result<(), DriverError> {
            Ok(())
        }
        fn commit_paths(&self, _repo_root: &Path, _paths: &[PathBuf], _message: &str) -> Result<(), DriverError> {
            Ok(())
        }
    }

    fn record(id: &str) -> IssueRecord {
        IssueRecord {
            identifier: Identifier::parse(id).unwrap(),
            summary: "s".into(),
            last_modified: chrono::Utc::now(),
            relationships: vec![],
            extra: Default::default(),
        }
    }

    fn collaborators(records: Vec<IssueRecord>) -> Collaborators {
        let map = records.into_iter().map(|r| (r.identifier.as_str().to_owned(), r)).collect();
        Collaborators {
            fetcher: Arc::new(FakeFetcher(Mutex::new(map))),
            serializer: Arc::new(FakeSerializer),
            driver: Arc::new(FakeDriver),
        }
    }

    #[test]
    fn clamp_concurrency_bounds_to_one_and_ten() {
        assert_eq!(clamp_concurrency(0), 1);
        assert_eq!(clamp_concurrency(1), 1);
        assert_eq!(clamp_concurrency(5), 5);
        assert_eq!(clamp_concurrency(10), 10);
        assert_eq!(clamp_concurrency(50), 10);
    }

    #[test]
    fn successful_tasks_produce_artifact_paths() {
        let dir = tempfile::tempdir().unwrap();
        let collaborators = collaborators(vec![record("A-1"), record("A-2")]);
        let tasks = vec![
            WorkTask { identifier: Identifier::parse("A-1").unwrap(), ordinal: 0 },
            WorkTask { identifier: Identifier::parse("A-2").unwrap(), ordinal: 1 },
        ];
        let cancellation = CancellationToken::new();
        let (bus, _rx) = ProgressBus::new();
        let results = execute(tasks, 2, Duration::ZERO, &collaborators, dir.path(), &cancellation, &bus);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.result.succeeded()));
    }

    #[test]
    fn fetch_failure_is_reported_without_aborting_batch() {
        let dir = tempfile::tempdir().unwrap();
        let collaborators = collaborators(vec![record("A-1")]);
        let tasks = vec![
            WorkTask { identifier: Identifier::parse("A-1").unwrap(), ordinal: 0 },
            WorkTask { identifier: Identifier::parse("A-404").unwrap(), ordinal: 1 },
        ];
        let cancellation = CancellationToken::new();
        let (bus, _rx) = ProgressBus::new();
        let results = execute(tasks, 2, Duration::ZERO, &collaborators, dir.path(), &cancellation, &bus);
        assert_eq!(results.iter().filter(|r| r.result.succeeded()).count(), 1);
        let failure = results.iter().find(|r| !r.result.succeeded()).unwrap();
        assert_eq!(failure.result.error.as_ref().unwrap().0, Stage::Fetch);
    }

    #[test]
    fn pre_cancelled_token_dispatches_no_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let collaborators = collaborators(vec![record("A-1"), record("A-2")]);
        let tasks = vec![
            WorkTask { identifier: Identifier::parse("A-1").unwrap(), ordinal: 0 },
            WorkTask { identifier: Identifier::parse("A-2").unwrap(), ordinal: 1 },
        ];
        let cancellation = CancellationToken::new();
        cancellation.cancel();
        let (bus, _rx) = ProgressBus::new();
        let results = execute(tasks, 2, Duration::ZERO, &collaborators, dir.path(), &cancellation, &bus);
        // Cancelled before dispatch: no task is ever handed to a worker.
        assert!(results.is_empty());
    }
}
