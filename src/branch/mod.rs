//! Branch state: upstream resolution, pending commits, branchpoint.
//!
//! A `Branch` carries lazily computed, memoized state behind an explicit
//! tri-state (`Memo`). Once a field is computed it is fixed for the life
//! of the object. Branches are never shared for write access: the pending
//! aggregator hands each worker exclusive ownership of the branches it
//! processes, so no locking is needed here.

mod pending;
mod worktree;

pub use pending::{Commit, PendingState, extract_change_id, full_ref_name};
pub use worktree::{
    LocalChanges, has_staged_changes, has_unstaged_changes, local_changes, unmerged_paths,
};

use crate::config;
use crate::error::{Result, RevuError};
use crate::git;
use crate::session::Session;

/// Explicit tri-state for one-time lazy computation.
///
/// Replaces the boolean-guard-plus-mutation pattern: a failed computation
/// is remembered and replayed on later calls instead of being retried or
/// silently swallowed.
#[derive(Debug, Clone)]
pub enum Memo<T> {
    NotLoaded,
    Loaded(T),
    Failed(RevuError),
}

impl<T> Memo<T> {
    fn is_loaded_or_failed(&self) -> bool {
        !matches!(self, Memo::NotLoaded)
    }

    fn get(&self) -> Result<&T> {
        match self {
            Memo::Loaded(v) => Ok(v),
            Memo::Failed(e) => Err(e.clone()),
            Memo::NotLoaded => unreachable!("Memo read before load"),
        }
    }
}

impl<T> From<Result<T>> for Memo<T> {
    fn from(res: Result<T>) -> Self {
        match res {
            Ok(v) => Memo::Loaded(v),
            Err(e) => Memo::Failed(e),
        }
    }
}

/// A local git branch and its memoized pending state.
#[derive(Debug, Clone)]
pub struct Branch {
    /// Branch name; "HEAD" for detached HEAD mode.
    pub name: String,
    /// Whether this branch is currently checked out.
    pub current: bool,

    upstream: Memo<Option<String>>,
    pending: Memo<PendingState>,
}

impl Branch {
    pub fn new(name: impl Into<String>, current: bool) -> Self {
        Self {
            name: name.into(),
            current,
            upstream: Memo::NotLoaded,
            pending: Memo::NotLoaded,
        }
    }

    /// Whether this branch is a detached HEAD (no real branch name).
    pub fn detached_head(&self) -> bool {
        self.name == "HEAD"
    }

    /// Fully qualified ref name.
    pub fn full_name(&self) -> String {
        full_ref_name(&self.name)
    }

    /// The upstream ref this branch tracks, like "origin/main".
    ///
    /// Resolution order: the branch's `codereview.cfg` `branch:` key,
    /// then git's `@{u}`, then `origin/main` if it exists, then
    /// `origin/master`. Detached HEAD has no upstream.
    pub fn upstream(&mut self, session: &Session) -> Result<Option<String>> {
        if !self.upstream.is_loaded_or_failed() {
            self.upstream = self.resolve_upstream(session).into();
        }
        self.upstream.get().cloned()
    }

    fn resolve_upstream(&self, session: &Session) -> Result<Option<String>> {
        if self.detached_head() {
            return Ok(None);
        }

        let cfg = if self.current {
            session.config.clone()
        } else {
            config::load_branch_config(&session.repo_root, &self.name)
        };
        if let Some(branch) = cfg.get("branch") {
            return Ok(Some(format!("origin/{}", branch)));
        }

        let at_u = format!("{}@{{u}}", self.name);
        let out = git::run_git_unchecked(
            &session.repo_root,
            &["rev-parse", "--abbrev-ref", &at_u],
        )?;
        if out.success && !out.stdout.is_empty() {
            return Ok(Some(out.stdout));
        }

        // Branch created before any upstream was configured. Prefer
        // origin/main when it exists, matching modern defaults.
        let probe = git::run_git_unchecked(
            &session.repo_root,
            &["rev-parse", "--abbrev-ref", "origin/main"],
        )?;
        if probe.success {
            Ok(Some("origin/main".to_string()))
        } else {
            Ok(Some("origin/master".to_string()))
        }
    }

    /// The branch's pending commits and branchpoint, computed once.
    pub fn load_pending(&mut self, session: &Session) -> Result<&PendingState> {
        if !self.pending.is_loaded_or_failed() {
            let result = self
                .upstream(session)
                .and_then(|up| pending::compute_pending(session, &self.name, up.as_deref()));
            self.pending = result.into();
        }
        self.pending.get()
    }

    /// Pending commits, newest first (children before parents).
    pub fn pending_commits(&mut self, session: &Session) -> Result<&[Commit]> {
        Ok(&self.load_pending(session)?.commits)
    }

    /// Whether the branch has any pending commits.
    pub fn has_pending_commit(&mut self, session: &Session) -> Result<bool> {
        Ok(!self.load_pending(session)?.commits.is_empty())
    }

    /// Latest commit shared with the upstream branch.
    pub fn branchpoint(&mut self, session: &Session) -> Result<String> {
        Ok(self.load_pending(session)?.branchpoint.clone())
    }

    /// Require a real upstream, with the user command named in the error.
    pub fn need_upstream(&mut self, session: &Session, cmd: &str) -> Result<String> {
        match self.upstream(session)? {
            Some(up) => Ok(up),
            None => {
                let why = if self.detached_head() {
                    " (in detached HEAD mode)"
                } else {
                    ""
                };
                Err(RevuError::UserError(format!(
                    "cannot {}: no origin branch{}",
                    cmd, why
                )))
            }
        }
    }

    /// Number of commits present upstream that are not on this branch.
    ///
    /// Not memoized: the answer changes when the remote-refs refresh
    /// lands, and the aggregator only asks after joining that refresh.
    pub fn commits_behind(&mut self, session: &Session) -> Result<usize> {
        let Some(upstream) = self.upstream(session)? else {
            return Ok(0);
        };
        let range = format!("{}..{}", self.full_name(), upstream);
        let out = git::run_git(
            &session.repo_root,
            &["log", "--format=format:x", &range, "--"],
        )?;
        Ok(out.non_blank_lines().len())
    }

    /// Report whether some form of the change has been picked onto the
    /// upstream branch, by Change-Id trailer.
    pub fn submitted(&mut self, session: &Session, change_id: &str) -> Result<bool> {
        if change_id.is_empty() {
            return Ok(false);
        }
        let Some(upstream) = self.upstream(session)? else {
            return Ok(false);
        };
        let line = format!("{}{}", pending::CHANGE_ID_PREFIX, change_id);
        let range = format!("{}..{}", self.name, upstream);
        let out = git::run_git(
            &session.repo_root,
            &["log", "-n", "1", "-F", "--grep", &line, &range, "--"],
        )?;
        Ok(out.stdout.contains(&line))
    }
}

/// The currently checked-out branch.
pub fn current_branch(session: &Session) -> Result<Branch> {
    let out = git::run_git(&session.repo_root, &["rev-parse", "--abbrev-ref", "HEAD"])?;
    let name = out.stdout.trim_start_matches("heads/").to_string();
    Ok(Branch::new(name, true))
}

/// All known local branches, in git's listing order.
///
/// In detached HEAD mode one entry has name "HEAD". The current branch is
/// detected via `rev-parse` rather than the `*` marker's line content,
/// because that line is localized in detached HEAD mode.
pub fn local_branches(session: &Session) -> Result<Vec<Branch>> {
    let current = current_branch(session)?;
    let out = git::run_git(&session.repo_root, &["branch", "-q"])?;
    let mut branches = Vec::new();
    for line in out.non_blank_lines() {
        let line = line.trim();
        let name = if line.starts_with("* ") {
            // The current-branch line is localized in detached HEAD mode;
            // use the rev-parse answer instead of parsing it.
            current.name.clone()
        } else {
            // "+ " marks a branch checked out in another worktree.
            line.strip_prefix("+ ").unwrap_or(line).to_string()
        };
        let is_current = name == current.name;
        branches.push(Branch::new(name, is_current));
    }
    Ok(branches)
}
