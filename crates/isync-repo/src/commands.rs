//! Git command execution wrappers.
//!
//! Provides a thin wrapper around `git` subprocess invocation so that the
//! rest of the codebase does not need to deal with `std::process::Command`
//! directly.

use std::path::Path;
use std::process::Command;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur when running git commands.
#[derive(Debug, Error)]
pub enum GitError {
    /// The git binary could not be found or spawned.
    #[error("failed to execute git: {0}")]
    SpawnError(#[from] std::io::Error),

    /// The git command exited with a non-zero status.
    #[error("git command failed (exit code {code:?}): {stderr}")]
    CommandFailed {
        /// The exit code, or `None` if the process was killed by a signal.
        code: Option<i32>,
        /// The content of stderr.
        stderr: String,
    },

    /// Not inside a git repository.
    #[error("not a git repository")]
    NotARepo,
}

/// A specialized `Result` type for git operations.
pub type Result<T> = std::result::Result<T, GitError>;

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Execute a `git` command with the given arguments and working directory.
///
/// Returns the trimmed contents of stdout on success.
///
/// # Errors
///
/// Returns [`GitError::SpawnError`] if `git` cannot be found, or
/// [`GitError::CommandFailed`] if the command exits with a non-zero status.
///
/// # Examples
///
/// ```no_run
/// use isync_repo::commands::git_command;
/// use std::path::Path;
///
/// let branch = git_command(&["rev-parse", "--abbrev-ref", "HEAD"], Path::new(".")).unwrap();
/// println!("Current branch: {branch}");
/// ```
pub fn git_command(args: &[&str], cwd: &Path) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .output()?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(GitError::CommandFailed {
            code: output.status.code(),
            stderr,
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    Ok(stdout)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
