//! Data directory resolution.
//!
//! Everything the gateway writes lives under one data root: the `SQLite`
//! database and the secrets directory that holds files mounted into
//! containers.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Environment variable overriding the data root.
pub const DATA_DIR_ENV: &str = "MCP_ANYWHERE_DATA_DIR";

const APP_DIR: &str = "mcp-anywhere";
const DATABASE_FILE: &str = "mcp-anywhere.db";
const SECRETS_DIR: &str = "secrets";

/// Errors that can occur during path resolution and directory creation.
#[derive(Debug, Error)]
pub enum PathError {
    #[error("Cannot determine home directory")]
    NoHomeDir,

    #[error("Cannot determine system data directory")]
    NoDataDir,

    #[error("Failed to create directory {path}: {reason}")]
    CreateFailed { path: PathBuf, reason: String },

    #[error("Path cannot be empty")]
    EmptyPath,

    #[error("Cannot determine current directory: {0}")]
    CurrentDirError(String),
}

/// Data root honoring an explicit override.
///
/// Resolution order:
/// 1. `override_dir` (normally the `MCP_ANYWHERE_DATA_DIR` variable)
/// 2. System data directory (e.g. `~/.local/share/mcp-anywhere`)
pub fn resolve_data_root(override_dir: Option<&str>) -> Result<PathBuf, PathError> {
    match override_dir {
        Some(raw) if !raw.trim().is_empty() => normalize_user_path(raw),
        _ => {
            let data_dir = dirs::data_local_dir().ok_or(PathError::NoDataDir)?;
            Ok(data_dir.join(APP_DIR))
        }
    }
}

/// Data root from the process environment.
pub fn data_root() -> Result<PathBuf, PathError> {
    resolve_data_root(env::var(DATA_DIR_ENV).ok().as_deref())
}

/// Database file inside `root`.
pub fn database_path(root: &Path) -> PathBuf {
    root.join(DATABASE_FILE)
}

/// Directory for secret files inside `root`.
pub fn secrets_dir(root: &Path) -> PathBuf {
    root.join(SECRETS_DIR)
}

/// Create `dir` and its parents if missing.
pub fn ensure_directory(dir: &Path) -> Result<(), PathError> {
    fs::create_dir_all(dir).map_err(|e| PathError::CreateFailed {
        path: dir.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Expand `~` and make a user-provided path absolute.
pub fn normalize_user_path(raw: &str) -> Result<PathBuf, PathError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(PathError::EmptyPath);
    }

    let expanded = if trimmed == "~" {
        dirs::home_dir().ok_or(PathError::NoHomeDir)?
    } else if let Some(rest) = trimmed.strip_prefix("~/") {
        dirs::home_dir().ok_or(PathError::NoHomeDir)?.join(rest)
    } else {
        PathBuf::from(trimmed)
    };

    if expanded.is_absolute() {
        Ok(expanded)
    } else {
        env::current_dir()
            .map(|cwd| cwd.join(expanded))
            .map_err(|e| PathError::CurrentDirError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_wins() {
        let dir = tempfile::tempdir().unwrap();
        let root = resolve_data_root(dir.path().to_str()).unwrap();
        assert_eq!(root, dir.path());
        assert!(database_path(&root).ends_with("mcp-anywhere.db"));
        assert!(secrets_dir(&root).ends_with("secrets"));
    }

    #[test]
    fn blank_override_falls_back_to_system_dir() {
        if let Ok(root) = resolve_data_root(Some("  ")) {
            assert!(root.ends_with("mcp-anywhere"));
        }
    }

    #[test]
    fn relative_paths_become_absolute() {
        let path = normalize_user_path("some/dir").unwrap();
        assert!(path.is_absolute());
        assert!(matches!(normalize_user_path(""), Err(PathError::EmptyPath)));
    }

    #[test]
    fn ensure_directory_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        ensure_directory(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
