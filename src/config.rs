//! Code review configuration (`codereview.cfg`).
//!
//! A repository declares its review setup in a `codereview.cfg` file at the
//! repo root, consisting of `key: value` lines. Keys in use:
//!
//! - `gerrit`: Gerrit server URL (overrides origin-based detection)
//! - `branch`: the upstream branch this checkout tracks
//! - `parent-branch`: the parent branch for `sync-branch`
//!
//! Each branch can carry its own copy of the file, so the config for a
//! non-checked-out branch is read from that branch's committed tree.

use crate::error::{Result, RevuError};
use crate::git;
use std::collections::HashMap;
use std::path::Path;

/// File name of the review configuration, at the repository root.
pub const CONFIG_FILE: &str = "codereview.cfg";

/// Parse `codereview.cfg` content into a key/value map.
///
/// Lines are `key: value`; blank lines and `#` comments are ignored.
/// A non-comment line without a colon is a hard error.
pub fn parse_config(raw: &str) -> Result<HashMap<String, String>> {
    let mut cfg = HashMap::new();
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match line.split_once(':') {
            Some((key, value)) => {
                cfg.insert(key.trim().to_string(), value.trim().to_string());
            }
            None => {
                return Err(RevuError::UserError(format!(
                    "bad config line, expected 'key: value': {:?}",
                    line
                )));
            }
        }
    }
    Ok(cfg)
}

/// Load the config from the working tree at `repo_root`.
///
/// A missing file yields an empty config; a malformed file is an error.
pub fn load_repo_config(repo_root: &Path) -> Result<HashMap<String, String>> {
    let path = repo_root.join(CONFIG_FILE);
    match std::fs::read_to_string(&path) {
        Ok(raw) => parse_config(&raw),
        Err(_) => Ok(HashMap::new()),
    }
}

/// Load the config committed on a specific branch, via `git show`.
///
/// Branches without the file (or unparseable copies) get an empty config
/// rather than an error; per-branch config is advisory for display.
pub fn load_branch_config(repo_root: &Path, branch: &str) -> HashMap<String, String> {
    let object = format!("{}:{}", branch, CONFIG_FILE);
    match git::run_git_unchecked(repo_root, &["show", &object]) {
        Ok(out) if out.success => parse_config(&out.stdout).unwrap_or_default(),
        _ => HashMap::new(),
    }
}
