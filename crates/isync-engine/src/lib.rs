//! The Batch Engine: the Worker Pool, Progress Bus, and cancellation
//! machinery that together execute one batch of (fetch -> serialize ->
//! commit) pipelines, plus the orchestration that ties them to the
//! Incremental Filter, Link Manager, and Sync State Store.

pub mod cancellation;
pub mod engine;
pub mod pool;
pub mod progress;

pub use cancellation::CancellationToken;
pub use engine::{BatchEngine, BatchOptions, EngineError, DEFAULT_CONCURRENCY, DEFAULT_RATE_LIMIT};
pub use pool::{clamp_concurrency, Collaborators, PipelineResult, MAX_WORKERS, MIN_WORKERS};
pub use progress::{ProgressBus, ProgressEvent, ProgressReceiver, ProgressStage};
