//! Command-line surface for `isync`.

use clap::{ArgGroup, Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "isync", version, about = "Mirrors remote tracker issues into a git-backed file tree, one commit per issue")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Repository to sync into. Defaults to the current directory.
    #[arg(long, global = true)]
    pub repo: Option<PathBuf>,

    /// Emit machine-readable JSON instead of human-readable text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose logging (debug level).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress the live progress line and non-essential output.
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a batch sync against an explicit key list or a query.
    Sync(SyncArgs),
    /// Show the repository's current sync status and statistics.
    Status,
    /// Show recent sync operations.
    History(HistoryArgs),
    /// Check the on-disk tree against the Sync State Store for divergence.
    Validate,
    /// Rebuild Sync State Store entries from on-disk artifacts.
    Recover(RecoverArgs),
    /// Initialize a repository for syncing (git init + empty state store).
    Init,
    /// Generate shell completion scripts.
    Completions(CompletionsArgs),
}

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for.
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}

#[derive(Args, Debug)]
#[command(group(
    ArgGroup::new("work_spec").args(["keys", "query"]).required(true)
))]
pub struct SyncArgs {
    /// Comma-separated issue identifiers to sync.
    #[arg(long, value_delimiter = ',')]
    pub keys: Vec<String>,

    /// Opaque query string resolved by the Issue Fetcher's `search`.
    #[arg(long)]
    pub query: Option<String>,

    /// Worker pool size (clamped to the engine's supported range).
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Minimum interval between a worker's consecutive fetches, in milliseconds.
    #[arg(long = "rate-limit-ms")]
    pub rate_limit_ms: Option<u64>,

    /// Bypass the Incremental Filter entirely; resync every candidate.
    #[arg(long, conflicts_with_all = ["include_new", "include_modified"])]
    pub force: bool,

    /// Admit identifiers absent from the Sync State Store.
    #[arg(long = "include-new")]
    pub include_new: bool,

    /// Admit identifiers present in the state whose content has changed.
    #[arg(long = "include-modified")]
    pub include_modified: bool,

    /// Exclude identifiers last updated before this RFC 3339 timestamp.
    #[arg(long)]
    pub since: Option<String>,

    /// Exclude identifiers last updated more than this duration ago (e.g. `24h`, `7d`, `30m`).
    #[arg(long = "max-age")]
    pub max_age: Option<String>,

    /// Restrict to these project keys (comma-separated or repeated).
    #[arg(long, value_delimiter = ',')]
    pub project: Vec<String>,
}

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Maximum number of operations to show, most recent first.
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

#[derive(Args, Debug)]
pub struct RecoverArgs {
    /// Report what would be recovered without mutating the Sync State Store.
    #[arg(long = "dry-run")]
    pub dry_run: bool,
}
