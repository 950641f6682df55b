//! The Repository Driver: ensures a working tree exists, validates
//! cleanliness, and commits staged files with a generated message.

use crate::commands::{git_command, GitError};
use isync_core::Identifier;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error(transparent)]
    Git(#[from] GitError),

    #[error("working tree at {0} is not clean")]
    NotClean(std::path::PathBuf),
}

type Result<T> = std::result::Result<T, DriverError>;

/// Repository Driver contract: idempotent initialize, cleanliness
/// validation, and single-file stage+commit with a generated message.
pub trait RepositoryDriver {
    fn initialize(&self, path: &Path) -> Result<()>;
    fn validate_clean(&self, path: &Path) -> Result<()>;
    fn commit_file(&self, path: &Path, file: &Path, identifier: &Identifier, summary: &str) -> Result<()>;

    /// Stages every path in `paths` (repo-root-relative or absolute under
    /// `repo_root`) and commits them together with `message`.
    ///
    /// Used by the Link Manager's commit step: relationship
    /// reference writes for one issue are committed as a single revision,
    /// separate from the issue's own fetch/serialize/commit.
    fn commit_paths(&self, repo_root: &Path, paths: &[std::path::PathBuf], message: &str) -> Result<()>;
}

/// Reference implementation: shells out to `git`.
pub struct GitRepositoryDriver;

impl RepositoryDriver for GitRepositoryDriver {
    fn initialize(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path).map_err(|e| DriverError::Git(GitError::SpawnError(e)))?;
        if !path.join(".git").exists() {
            info!(path = %path.display(), "initializing git repository");
            git_command(&["init"], path)?;
        }
        Ok(())
    }

    fn validate_clean(&self, path: &Path) -> Result<()> {
        let status = git_command(&["status", "--porcelain"], path)?;
        if status.trim().is_empty() {
            Ok(())
        } else {
            Err(DriverError::NotClean(path.to_path_buf()))
        }
    }

    fn commit_file(&self, path: &Path, file: &Path, identifier: &Identifier, summary: &str) -> Result<()> {
        let relative = file.strip_prefix(path).unwrap_or(file);
        let relative_str = relative.to_string_lossy();
        git_command(&["add", &relative_str], path)?;

        let message = commit_message(identifier, summary);
        // Nothing staged (identical content re-synced) is not an error.
        match git_command(&["commit", "-m", &message], path) {
            Ok(_) => {
                debug!(identifier = %identifier, "committed issue file");
                Ok(())
            }
            Err(GitError::CommandFailed { stderr, .. }) if stderr.contains("nothing to commit") => Ok(()),
            Err(e) => Err(DriverError::Git(e)),
        }
    }

    fn commit_paths(&self, repo_root: &Path, paths: &[std::path::PathBuf], message: &str) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        for path in paths {
            let relative = path.strip_prefix(repo_root).unwrap_or(path);
            let relative_str = relative.to_string_lossy();
            if relative_str.is_empty() {
                continue;
            }
            git_command(&["add", "--", &relative_str], repo_root)?;
        }
        match git_command(&["commit", "-m", message], repo_root) {
            Ok(_) => {
                debug!(paths = paths.len(), "committed relationship references");
                Ok(())
            }
            Err(GitError::CommandFailed { stderr, .. }) if stderr.contains("nothing to commit") => Ok(()),
            Err(e) => Err(DriverError::Git(e)),
        }
    }
}

fn commit_message(identifier: &Identifier, summary: &str) -> String {
    if summary.is_empty() {
        format!("sync: {identifier}")
    } else {
        format!("sync: {identifier}: {summary}")
    }
}
