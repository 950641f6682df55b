//! Layered configuration loading and `.isync/` directory discovery for the
//! `isync` CLI.

pub mod config;
pub mod repo_dir;

pub use config::{Config, ConfigError, FetcherConfig, IncrementalConfig};
pub use repo_dir::{ensure_isync_dir, find_isync_dir, find_isync_dir_or_error};
