//! Submit the pending change on the current branch.
//!
//! Unlike the pending report, everything here is fatal: a submit that
//! half-happened is worse than one that visibly failed.

use crate::branch;
use crate::commands::sync_branch::check_no_pending_merge;
use crate::error::{Result, RevuError};
use crate::gerrit::GerritClient;
use crate::git;
use crate::session::Session;

pub fn cmd_submit() -> Result<()> {
    let session = Session::from_cwd()?;
    run_submit(&session)
}

pub fn run_submit(session: &Session) -> Result<()> {
    check_no_pending_merge(session, "submit")?;
    if branch::has_staged_changes(session)? || branch::has_unstaged_changes(session)? {
        return Err(RevuError::UserError(
            "cannot submit: uncommitted changes exist\n\trun 'git status' to see changes"
                .to_string(),
        ));
    }

    let mut b = branch::current_branch(session)?;
    let upstream = b.need_upstream(session, "submit")?;
    let pending = b.pending_commits(session)?.to_vec();

    let commit = match pending.as_slice() {
        [] => {
            return Err(RevuError::UserError(
                "cannot submit: no pending commits".to_string(),
            ));
        }
        [one] => one,
        _ => {
            return Err(RevuError::UserError(
                "cannot submit: multiple pending commits\n\
                 \trun 'revu sync-branch' or squash them into one commit first"
                    .to_string(),
            ));
        }
    };
    let change_id = commit.change_id.as_deref().ok_or_else(|| {
        RevuError::UserError(format!(
            "cannot submit: commit {} has no Change-Id",
            commit.short_hash
        ))
    })?;

    let gerrit = GerritClient::new(session)?;
    let full_id = gerrit.full_change_id(&upstream, change_id);

    // The server must be looking at the same commit we are; otherwise
    // submit would land content the user has never seen locally.
    let change = gerrit.fetch_change(&full_id, &["LABELS", "CURRENT_REVISION"])?;
    if change.is_merged() {
        return Err(RevuError::UserError(format!(
            "change {} is already submitted\n\trun 'revu sync' to update your branch",
            change.number
        )));
    }
    if change.current_revision != commit.hash {
        return Err(RevuError::UserError(format!(
            "cannot submit: current revision on the server does not match commit {}\n\
             \tmail a fresh patch set first",
            commit.short_hash
        )));
    }

    let submitted = gerrit.submit_change(&full_id)?;
    if !submitted.is_merged() {
        return Err(RevuError::GerritError(format!(
            "submit of change {} left it in state {}",
            change.number, submitted.status
        )));
    }

    eprintln!("* Submitted as change {}.", change.number);
    // Bring the submitted commit into the remote-tracking ref so a
    // following 'revu sync' can pop the local copy.
    git::run_git(&session.repo_root, &["fetch", "-q"])?;
    Ok(())
}
