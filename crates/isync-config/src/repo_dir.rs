//! Discovery and management of the `.isync/` directory.
//!
//! `.isync/` holds a repository's sync configuration and is discovered by
//! walking up the directory tree from wherever the CLI was invoked, the same
//! way `.git/` is discovered. It does NOT hold the Sync State Store itself
//! (that lives at the git-tracked repository root); `.isync/`
//! is purely the CLI's own local configuration directory and is conventionally
//! git-ignored.

use crate::config::ConfigError;
use std::path::{Path, PathBuf};

/// The name of the isync configuration directory.
const ISYNC_DIR_NAME: &str = ".isync";

/// The name of the environment variable that can override the isync directory.
const ISYNC_DIR_ENV: &str = "ISYNC_DIR";

/// Walk up the directory tree from `start` looking for an `.isync/` directory.
///
/// Returns the path to the `.isync/` directory if found, or `None` if the
/// filesystem root is reached without finding one. The `ISYNC_DIR`
/// environment variable is checked first (highest priority).
pub fn find_isync_dir(start: &Path) -> Option<PathBuf> {
    if let Ok(env_dir) = std::env::var(ISYNC_DIR_ENV) {
        let env_path = PathBuf::from(&env_dir);
        if env_path.is_dir() {
            return Some(env_path);
        }
    }

    let start = match start.canonicalize() {
        Ok(p) => p,
        Err(_) => return None,
    };

    let mut current = start.as_path();
    loop {
        let candidate = current.join(ISYNC_DIR_NAME);
        if candidate.is_dir() {
            return Some(candidate);
        }

        match current.parent() {
            Some(parent) if parent != current => {
                current = parent;
            }
            _ => break,
        }
    }

    None
}

/// Walk up the directory tree looking for `.isync/`, returning an error if
/// not found.
///
/// # Errors
///
/// Returns [`ConfigError::RepoDirNotFound`] if no `.isync/` directory is found.
pub fn find_isync_dir_or_error(start: &Path) -> Result<PathBuf, ConfigError> {
    find_isync_dir(start).ok_or_else(|| ConfigError::RepoDirNotFound { start: start.to_path_buf() })
}

/// Ensure an `.isync/` directory exists at the given path.
///
/// If `path` itself is not called `.isync`, the function creates an `.isync/`
/// subdirectory under it. The directory (and any necessary parents) is
/// created if it does not exist.
pub fn ensure_isync_dir(path: &Path) -> Result<PathBuf, ConfigError> {
    let isync_dir = if path.ends_with(ISYNC_DIR_NAME) {
        path.to_path_buf()
    } else {
        path.join(ISYNC_DIR_NAME)
    };

    std::fs::create_dir_all(&isync_dir)?;
    Ok(isync_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_isync_dir_in_temp() {
        let dir = tempfile::tempdir().unwrap();
        let isync = dir.path().join(".isync");
        std::fs::create_dir(&isync).unwrap();

        let found = find_isync_dir(dir.path());
        assert!(found.is_some());
        let found = found.unwrap().canonicalize().unwrap();
        let expected = isync.canonicalize().unwrap();
        assert_eq!(found, expected);
    }

    #[test]
    fn find_isync_dir_in_child() {
        let dir = tempfile::tempdir().unwrap();
        let isync = dir.path().join(".isync");
        std::fs::create_dir(&isync).unwrap();

        let child = dir.path().join("src").join("deep");
        std::fs::create_dir_all(&child).unwrap();

        let found = find_isync_dir(&child);
        assert!(found.is_some());
        let found = found.unwrap().canonicalize().unwrap();
        let expected = isync.canonicalize().unwrap();
        assert_eq!(found, expected);
    }

    #[test]
    fn find_isync_dir_or_error_reports_not_found() {
        let dir = tempfile::tempdir().unwrap();
        std::env::remove_var(ISYNC_DIR_ENV);
        let result = find_isync_dir_or_error(dir.path());
        if let Err(e) = result {
            assert!(e.is_not_found());
        }
    }

    #[test]
    fn ensure_isync_dir_creates() {
        let dir = tempfile::tempdir().unwrap();
        let result = ensure_isync_dir(dir.path()).unwrap();
        assert!(result.is_dir());
        assert!(result.ends_with(".isync"));
    }

    #[test]
    fn ensure_isync_dir_already_named() {
        let dir = tempfile::tempdir().unwrap();
        let isync = dir.path().join(".isync");
        let result = ensure_isync_dir(&isync).unwrap();
        assert!(result.is_dir());
        assert_eq!(result, isync);
    }

    #[test]
    fn ensure_isync_dir_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let result1 = ensure_isync_dir(dir.path()).unwrap();
        let result2 = ensure_isync_dir(dir.path()).unwrap();
        assert_eq!(result1, result2);
    }
}
