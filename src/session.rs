//! Per-invocation session state for revu.
//!
//! A `Session` is constructed once per process and passed by reference to
//! every component that needs repository paths or the parsed review config.
//! It replaces ambient globals with explicit state: there is no lazily
//! mutated process-wide cache, so parallel workers can share a `&Session`
//! freely.

use crate::config;
use crate::error::Result;
use crate::git;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

/// File inside the git dir holding the persisted sync-branch status.
const SYNC_BRANCH_STATUS_FILE: &str = "revu-sync-branch-status.json";

/// Resolved repository context for one process invocation.
#[derive(Debug, Clone)]
pub struct Session {
    /// Absolute path to the working tree root.
    pub repo_root: PathBuf,

    /// Absolute path to the `.git` directory (per-worktree for linked
    /// worktrees, so sync-branch state is tied to one working tree).
    pub git_dir: PathBuf,

    /// Parsed `codereview.cfg` from the working tree, possibly empty.
    pub config: HashMap<String, String>,
}

impl Session {
    /// Resolve the session from the current working directory.
    pub fn from_cwd() -> Result<Self> {
        let cwd = env::current_dir().map_err(|e| {
            crate::error::RevuError::UserError(format!(
                "failed to get current working directory: {}",
                e
            ))
        })?;
        Self::from_dir(&cwd)
    }

    /// Resolve the session from a specific directory.
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let repo_root = git::repo_root(dir.as_ref())?;
        let git_dir = git::git_dir(&repo_root)?;
        let config = config::load_repo_config(&repo_root)?;
        Ok(Self {
            repo_root,
            git_dir,
            config,
        })
    }

    /// Path of the persisted sync-branch status document.
    pub fn sync_status_path(&self) -> PathBuf {
        self.git_dir.join(SYNC_BRANCH_STATUS_FILE)
    }

    /// A config value from `codereview.cfg`, if present.
    pub fn config_value(&self, key: &str) -> Option<&str> {
        self.config.get(key).map(String::as_str)
    }
}
