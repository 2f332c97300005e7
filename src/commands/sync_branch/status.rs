//! Persisted sync-branch status.
//!
//! The status document is the single source of truth for a sync-branch in
//! flight: it is written before the merge is attempted, so every later
//! consistency check (including after a process crash between snapshot and
//! merge) compares against the remote hashes captured here. Creation uses
//! exclusive-create semantics, so two concurrent sync-branch invocations
//! against the same working tree cannot clobber each other's state; the
//! loser sees "merge already in progress".

use crate::error::{Result, RevuError};
use crate::fs;
use crate::session::Session;
use serde::{Deserialize, Serialize};

/// A branch name with the remote hash captured at merge start.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BranchSnapshot {
    pub name: String,
    pub hash: String,
}

/// Persisted record of an in-flight sync-branch merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncBranchStatus {
    /// Local branch the merge is happening on.
    pub local: String,
    /// Parent branch and its remote hash at merge start.
    pub parent: BranchSnapshot,
    /// Dev branch and its remote hash at merge start.
    pub branch: BranchSnapshot,
    /// True for --merge-back-to-parent: source and destination swap.
    #[serde(default)]
    pub reverse: bool,
    /// Conflicting paths recorded when the merge stopped.
    #[serde(default)]
    pub conflicts: Vec<String>,
}

impl SyncBranchStatus {
    /// The merge source: the snapshot whose commits are being merged in.
    pub fn source(&self) -> &BranchSnapshot {
        if self.reverse { &self.branch } else { &self.parent }
    }

    /// The merge destination snapshot.
    pub fn dest(&self) -> &BranchSnapshot {
        if self.reverse { &self.parent } else { &self.branch }
    }

    /// Persist a brand-new status, failing if one already exists.
    pub fn create(&self, session: &Session) -> Result<()> {
        let path = session.sync_status_path();
        let content = self.to_json()?;
        if !fs::create_exclusive(&path, &content)? {
            return Err(RevuError::StateError(
                "sync-branch already in progress (status file exists)".to_string(),
            ));
        }
        Ok(())
    }

    /// Rewrite the status in place (conflict list updates).
    pub fn save(&self, session: &Session) -> Result<()> {
        fs::atomic_write_file(session.sync_status_path(), &self.to_json()?)
    }

    /// Load the persisted status, if any.
    pub fn load(session: &Session) -> Result<Option<Self>> {
        let path = session.sync_status_path();
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(RevuError::StateError(format!(
                    "failed to read sync-branch status '{}': {}",
                    path.display(),
                    e
                )));
            }
        };
        let status = serde_json::from_str(&raw).map_err(|e| {
            RevuError::StateError(format!(
                "corrupt sync-branch status '{}': {}",
                path.display(),
                e
            ))
        })?;
        Ok(Some(status))
    }

    /// Whether a status file exists at all.
    pub fn exists(session: &Session) -> bool {
        session.sync_status_path().exists()
    }

    /// Remove the persisted status on successful completion.
    pub fn delete(session: &Session) -> Result<()> {
        std::fs::remove_file(session.sync_status_path()).map_err(|e| {
            RevuError::StateError(format!("failed to remove sync-branch status: {}", e))
        })
    }

    fn to_json(&self) -> Result<String> {
        let mut json = serde_json::to_string_pretty(self).map_err(|e| {
            RevuError::StateError(format!("failed to serialize sync-branch status: {}", e))
        })?;
        json.push('\n');
        Ok(json)
    }
}
