//! Sync the current branch with its upstream.
//!
//! Fetches, rebases pending work onto the refreshed upstream, and when the
//! single pending change has meanwhile been submitted on the server, pops
//! it out of local history with a mixed reset so any differences against
//! the submitted version survive as uncommitted changes.

use crate::branch;
use crate::commands::sync_branch::check_no_pending_merge;
use crate::error::{Result, RevuError};
use crate::git;
use crate::session::Session;

/// What `sync` did beyond the rebase itself.
#[derive(Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    Synced,
    /// The pending commit's change landed upstream; the commit was popped
    /// and its local differences left unstaged.
    DroppedSubmitted { short_hash: String },
}

pub fn cmd_sync() -> Result<()> {
    let session = Session::from_cwd()?;
    match run_sync(&session)? {
        SyncOutcome::Synced => {}
        SyncOutcome::DroppedSubmitted { short_hash } => {
            eprintln!(
                "* Change {} was submitted; removed from local history.\n\
                 Remaining differences, if any, are left uncommitted.",
                short_hash
            );
        }
    }
    Ok(())
}

pub fn run_sync(session: &Session) -> Result<SyncOutcome> {
    check_no_pending_merge(session, "sync")?;
    if branch::has_staged_changes(session)? {
        return Err(RevuError::UserError(
            "cannot sync: staged changes exist\n\trun 'git status' to see changes".to_string(),
        ));
    }
    if branch::has_unstaged_changes(session)? {
        return Err(RevuError::UserError(
            "cannot sync: unstaged changes exist\n\
             \trun 'git status' to see changes\n\
             \trun 'git stash' to save unstaged changes"
                .to_string(),
        ));
    }

    let mut b = branch::current_branch(session)?;
    let upstream = b.need_upstream(session, "sync")?;

    git::run_git(&session.repo_root, &["fetch", "-q"])?;
    let rebased = git::run_git_unchecked(&session.repo_root, &["rebase", "-q", &upstream])?;
    if !rebased.success {
        let conflicts = branch::unmerged_paths(session)?;
        if conflicts.is_empty() {
            return Err(RevuError::GitError(format!(
                "git rebase failed: {}",
                rebased.stderr
            )));
        }
        let mut msg = String::from("sync: rebase conflicts in:\n");
        for path in &conflicts {
            msg.push_str("\t- ");
            msg.push_str(path);
            msg.push('\n');
        }
        msg.push_str(
            "\nPlease fix them (use 'git status' to see the list again),\n\
             then 'git add' or 'git rm' to resolve them,\n\
             and then 'git rebase --continue'.\n\
             Or run 'git rebase --abort' to give up on this sync.",
        );
        return Err(RevuError::MergeConflicts(msg));
    }

    // Re-read branch state after the rebase rewrote it.
    let mut b = branch::current_branch(session)?;
    if !b.has_pending_commit(session)? {
        return Ok(SyncOutcome::Synced);
    }
    let pending = b.pending_commits(session)?.to_vec();
    if let [only] = pending.as_slice() {
        let change_id = only.change_id.clone().unwrap_or_default();
        let sits_on_branchpoint = only.parent() == Some(b.branchpoint(session)?.as_str());
        if sits_on_branchpoint && b.submitted(session, &change_id)? {
            let parent = only.parent().unwrap_or_default().to_string();
            git::run_git(&session.repo_root, &["reset", "-q", &parent])?;
            return Ok(SyncOutcome::DroppedSubmitted {
                short_hash: only.short_hash.clone(),
            });
        }
    }
    Ok(SyncOutcome::Synced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ServerClient, add_commit, create_server_client, git as tgit};

    const CHANGE_ID: &str = "Change-Id: I0123456789abcdef0123456789abcdef01234567";

    fn fixture_with_pending_change() -> (ServerClient, Session) {
        let fixture = create_server_client();
        add_commit(
            &fixture.client,
            "a.txt",
            "a\n",
            &format!("add a\n\n{}\n", CHANGE_ID),
        );
        let session = Session::from_dir(&fixture.client).unwrap();
        (fixture, session)
    }

    #[test]
    fn sync_rebases_onto_the_refreshed_upstream() {
        let (fixture, session) = fixture_with_pending_change();
        add_commit(&fixture.server, "s.txt", "s", "server work");

        assert_eq!(run_sync(&session).unwrap(), SyncOutcome::Synced);

        // The pending commit now sits on the new upstream tip.
        let mut b = branch::current_branch(&session).unwrap();
        let origin = git::rev_parse(&fixture.client, "origin/main").unwrap();
        assert_eq!(b.branchpoint(&session).unwrap(), origin);
        assert_eq!(b.pending_commits(&session).unwrap().len(), 1);
    }

    #[test]
    fn sync_drops_an_identical_submitted_change() {
        let (fixture, session) = fixture_with_pending_change();
        // The same patch lands on the server under the same Change-Id; the
        // rebase recognizes it and drops the local copy.
        add_commit(
            &fixture.server,
            "a.txt",
            "a\n",
            &format!("add a\n\n{}\n", CHANGE_ID),
        );

        run_sync(&session).unwrap();
        let mut b = branch::current_branch(&session).unwrap();
        assert!(!b.has_pending_commit(&session).unwrap());
    }

    #[test]
    fn sync_pops_a_submitted_change_with_different_content() {
        let (fixture, session) = fixture_with_pending_change();
        // The change was submitted in altered form (different file), so
        // the rebase keeps the local commit. Sync pops it, leaving the
        // local version as uncommitted changes.
        add_commit(
            &fixture.server,
            "renamed.txt",
            "a\n",
            &format!("add a\n\n{}\n", CHANGE_ID),
        );

        let outcome = run_sync(&session).unwrap();
        assert!(matches!(outcome, SyncOutcome::DroppedSubmitted { .. }));

        let mut b = branch::current_branch(&session).unwrap();
        assert!(!b.has_pending_commit(&session).unwrap());
        // The submitted version is present; the local file survives as an
        // untracked leftover.
        assert!(fixture.client.join("renamed.txt").exists());
        assert!(fixture.client.join("a.txt").exists());
    }

    #[test]
    fn sync_requires_a_clean_tree() {
        let (fixture, session) = fixture_with_pending_change();
        std::fs::write(fixture.client.join("a.txt"), "dirty\n").unwrap();
        tgit(&fixture.client, &["add", "a.txt"]);

        let err = run_sync(&session).unwrap_err();
        assert!(err.to_string().contains("cannot sync: staged changes exist"));
    }
}
