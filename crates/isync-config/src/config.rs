//! Configuration types and layered loading for `isync`.
//!
//! The main entry point is [`Config`], loaded with [`load`] from defaults,
//! a repository-local `.isync/config.yaml`, and `ISYNC_*` environment
//! variables, in that order. CLI flags take precedence over all of this but
//! are applied by the binary crate after `load` returns, not here.

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use isync_filter::Policy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Lower and upper bound on effective worker count, mirrored from
/// `isync-engine::pool` so this crate doesn't need to depend on the engine
/// just to validate a number.
const MIN_CONCURRENCY: usize = 1;
const MAX_CONCURRENCY: usize = 10;

const CONFIG_FILENAME: &str = "config.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] figment::Error),

    #[error("failed to write configuration: {0}")]
    Write(#[from] std::io::Error),

    #[error("invalid configuration value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("no .isync directory found in '{start}' or any parent directory")]
    RepoDirNotFound { start: PathBuf },
}

impl ConfigError {
    /// `true` if this error originates from malformed input rather than I/O.
    pub fn is_invalid_value(&self) -> bool {
        matches!(self, ConfigError::InvalidValue { .. })
    }

    /// `true` if no `.isync` directory could be located.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ConfigError::RepoDirNotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Credentials and endpoint for the reference (`ureq`-backed) Issue Fetcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self { base_url: None, token: None }
    }
}

/// Default incremental-sync policy, applied when a CLI invocation doesn't
/// override it with `--force`/`--include-new`/etc.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncrementalConfig {
    #[serde(default)]
    pub force: bool,
    #[serde(default = "default_true")]
    pub include_new: bool,
    #[serde(default = "default_true")]
    pub include_modified: bool,
    #[serde(default)]
    pub max_age_secs: Option<u64>,
    #[serde(default)]
    pub project_filter: Vec<String>,
}

impl Default for IncrementalConfig {
    fn default() -> Self {
        Self {
            force: false,
            include_new: true,
            include_modified: true,
            max_age_secs: None,
            project_filter: Vec::new(),
        }
    }
}

impl IncrementalConfig {
    /// Builds the `isync-filter` policy this config describes. `since` is a
    /// per-invocation concern (a point-in-time cutoff) and is always
    /// supplied by the caller, not persisted here.
    pub fn to_policy(&self, since: Option<chrono::DateTime<chrono::Utc>>) -> Policy {
        Policy {
            force: self.force,
            include_new: self.include_new,
            include_modified: self.include_modified,
            since,
            max_age: self.max_age_secs.map(std::time::Duration::from_secs),
            project_filter: self.project_filter.clone(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_concurrency() -> usize {
    5
}

fn default_rate_limit_ms() -> u64 {
    500
}

fn default_history_retention() -> usize {
    100
}

/// The full `isync` configuration, corresponding to `.isync/config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_rate_limit_ms")]
    pub rate_limit_ms: u64,

    #[serde(default)]
    pub repo_path: Option<PathBuf>,

    #[serde(default)]
    pub fetcher: FetcherConfig,

    #[serde(default)]
    pub incremental: IncrementalConfig,

    #[serde(default = "default_history_retention")]
    pub history_retention: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            rate_limit_ms: default_rate_limit_ms(),
            repo_path: None,
            fetcher: FetcherConfig::default(),
            incremental: IncrementalConfig::default(),
            history_retention: default_history_retention(),
        }
    }
}

impl Config {
    pub fn rate_limit(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.rate_limit_ms)
    }

    /// Validates and clamps values so downstream components always receive
    /// already-sane values instead of having to defend against bad input.
    fn validate(mut self) -> Self {
        self.concurrency = self.concurrency.clamp(MIN_CONCURRENCY, MAX_CONCURRENCY);
        self
    }
}

/// Loads configuration for the `.isync` directory under `isync_dir`:
/// built-in defaults, then `{isync_dir}/config.yaml` if present, then
/// `ISYNC_*` environment variables. A missing config file is not an error —
/// `Config::default()` stands in for it.
pub fn load(isync_dir: &Path) -> Result<Config> {
    let config_path = isync_dir.join(CONFIG_FILENAME);
    let figment = Figment::from(Serialized::defaults(Config::default()))
        .merge(Yaml::file(&config_path))
        .merge(Env::prefixed("ISYNC_").split("_"));
    let config: Config = figment.extract()?;
    Ok(config.validate())
}

/// Persists `config` to `{isync_dir}/config.yaml`, creating the directory
/// if necessary.
pub fn save(isync_dir: &Path, config: &Config) -> Result<()> {
    std::fs::create_dir_all(isync_dir)?;
    let yaml = serde_yaml::to_string(config).map_err(|e| ConfigError::InvalidValue {
        key: "<config>".to_owned(),
        reason: e.to_string(),
    })?;
    std::fs::write(isync_dir.join(CONFIG_FILENAME), yaml)?;
    Ok(())
}
