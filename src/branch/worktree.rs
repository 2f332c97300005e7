//! Working-tree state classification from `git status` porcelain output.

use crate::error::Result;
use crate::git;
use crate::session::Session;
use regex::Regex;
use std::sync::LazyLock;

static STAGED_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[ACDMR]  ").unwrap());
static UNSTAGED_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^.[ACDMR]").unwrap());

/// Files with uncommitted changes, classified by state.
#[derive(Debug, Clone, Default)]
pub struct LocalChanges {
    pub staged: Vec<String>,
    pub unstaged: Vec<String>,
    pub untracked: Vec<String>,
}

fn porcelain(session: &Session) -> Result<Vec<String>> {
    let out = git::run_git(&session.repo_root, &["status", "-b", "--porcelain"])?;
    Ok(out.lines().into_iter().map(String::from).collect())
}

/// Report whether the working directory contains staged changes.
pub fn has_staged_changes(session: &Session) -> Result<bool> {
    Ok(porcelain(session)?.iter().any(|s| STAGED_RE.is_match(s)))
}

/// Report whether the working directory contains unstaged changes.
pub fn has_unstaged_changes(session: &Session) -> Result<bool> {
    Ok(porcelain(session)?.iter().any(|s| UNSTAGED_RE.is_match(s)))
}

/// List files containing staged, unstaged, and untracked changes.
///
/// Elements are typically paths relative to the repo root; renames take
/// the form `from -> to` and unusual names come back as quoted C strings.
/// Callers only show these to the user, so both forms are acceptable.
pub fn local_changes(session: &Session) -> Result<LocalChanges> {
    let mut changes = LocalChanges::default();
    for s in porcelain(session)? {
        let bytes = s.as_bytes();
        if bytes.len() < 4 || bytes[2] != b' ' {
            continue;
        }
        let path = s[3..].to_string();
        match bytes[0] {
            b'A' | b'C' | b'D' | b'M' | b'R' => changes.staged.push(path.clone()),
            b'?' => changes.untracked.push(path.clone()),
            _ => {}
        }
        if matches!(bytes[1], b'A' | b'C' | b'D' | b'M' | b'R') {
            changes.unstaged.push(path);
        }
    }
    Ok(changes)
}

/// List paths left unmerged by an in-progress merge.
///
/// Porcelain XY codes containing U (plus AA and DD) mark unmerged entries.
pub fn unmerged_paths(session: &Session) -> Result<Vec<String>> {
    let mut paths = Vec::new();
    for s in porcelain(session)? {
        let bytes = s.as_bytes();
        if bytes.len() < 4 {
            continue;
        }
        let (x, y) = (bytes[0], bytes[1]);
        let unmerged = x == b'U' || y == b'U' || (x == b'A' && y == b'A') || (x == b'D' && y == b'D');
        if unmerged {
            paths.push(s[3..].to_string());
        }
    }
    Ok(paths)
}
