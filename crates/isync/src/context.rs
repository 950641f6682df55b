//! Runtime context for command execution.
//!
//! The [`RuntimeContext`] holds everything a command handler needs: the
//! resolved repository path, loaded configuration, and the global output
//! flags. Constructed once in `main` after CLI parsing, before dispatch.

use std::path::PathBuf;
use std::sync::Arc;

use isync_config::Config;
use isync_fetch::{IssueFetcher, UreqFetcher};
use isync_repo::gitdir::find_git_root;

#[derive(Debug)]
pub struct RuntimeContext {
    /// The git-backed repository being synced into.
    pub repo_path: PathBuf,
    /// `{repo_path}/.isync`, the CLI's own configuration directory.
    pub isync_dir: PathBuf,
    pub config: Config,
    pub json: bool,
    pub verbose: bool,
    pub quiet: bool,
}

impl RuntimeContext {
    /// Resolves `--repo` (defaulting to the current directory) and loads
    /// layered configuration from `{repo}/.isync/config.yaml`. A missing
    /// config file is not an error.
    pub fn build(
        repo: Option<PathBuf>,
        json: bool,
        verbose: bool,
        quiet: bool,
    ) -> anyhow::Result<Self> {
        let repo_path = match repo {
            Some(p) => p,
            None => {
                let cwd = std::env::current_dir()?;
                find_git_root(&cwd).unwrap_or(cwd)
            }
        };
        let isync_dir = repo_path.join(".isync");
        let config = isync_config::config::load(&isync_dir)?;

        Ok(Self { repo_path, isync_dir, config, json, verbose, quiet })
    }

    /// Builds the reference (`ureq`-backed) Issue Fetcher from configured
    /// credentials.
    pub fn fetcher(&self) -> anyhow::Result<Arc<dyn IssueFetcher + Send + Sync>> {
        let base_url = self.config.fetcher.base_url.clone().ok_or_else(|| {
            anyhow::anyhow!(
                "no fetcher endpoint configured; set `fetcher.base_url` in {} or ISYNC_FETCHER_BASE_URL",
                self.isync_dir.join("config.yaml").display()
            )
        })?;
        let token = self.config.fetcher.token.clone().unwrap_or_default();
        Ok(Arc::new(UreqFetcher::new(base_url, token)))
    }
}
