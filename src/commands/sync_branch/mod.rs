//! The sync-branch merge workflow.
//!
//! Merges the parent branch's history into a dev branch (or, in reverse
//! mode, retires a dev branch back into its parent) as a single merge
//! commit with a canonical message. The workflow is resumable: remote
//! hashes for both sides are captured into a persisted status document
//! before the merge is attempted, conflicts halt the machine with the
//! conflict set recorded, and `--continue` re-validates everything against
//! the snapshot before finalizing.
//!
//! States: Idle -> MergeStarted -> {Committed | ConflictPending} ->
//! Finalizing -> Idle. `git merge --abort` is the external escape hatch;
//! it leaves the status file behind, which the next sync-branch reports.

mod status;

pub use status::{BranchSnapshot, SyncBranchStatus};

use crate::branch;
use crate::cli::SyncBranchArgs;
use crate::error::{Result, RevuError};
use crate::git;
use crate::session::Session;

pub fn cmd_sync_branch(args: &SyncBranchArgs) -> Result<()> {
    let session = Session::from_cwd()?;
    let message = run_sync_branch(&session, args)?;
    print!("{}", message);
    Ok(())
}

/// Refuse a mutating command while a sync-branch merge is pending.
///
/// Shared by every command that would otherwise race the half-done merge.
pub fn check_no_pending_merge(session: &Session, cmd: &str) -> Result<()> {
    if SyncBranchStatus::exists(session) {
        return Err(RevuError::StateError(format!(
            "cannot {}: found pending merge\n\
             Run 'revu sync-branch --continue' if you fixed\n\
             merge conflicts after a previous sync-branch operation.\n\
             Or run 'git merge --abort' to give up on the sync-branch.",
            cmd
        )));
    }
    Ok(())
}

/// Run the workflow and return the finalized merge commit message.
pub fn run_sync_branch(session: &Session, args: &SyncBranchArgs) -> Result<String> {
    if args.cont {
        resume(session)
    } else {
        start(session, args.merge_back_to_parent)
    }
}

fn start(session: &Session, reverse: bool) -> Result<String> {
    let cmd = if reverse {
        "sync-branch --merge-back-to-parent"
    } else {
        "sync-branch"
    };

    // Preconditions, all before any mutating action.
    check_no_pending_merge(session, cmd)?;
    check_clean(session, cmd)?;

    let branch_name = session
        .config_value("branch")
        .ok_or_else(|| {
            RevuError::UserError(format!(
                "cannot {}: codereview.cfg does not declare 'branch'",
                cmd
            ))
        })?
        .to_string();
    let parent_name = session
        .config_value("parent-branch")
        .ok_or_else(|| {
            RevuError::UserError(format!(
                "cannot {}: codereview.cfg does not declare 'parent-branch'",
                cmd
            ))
        })?
        .to_string();

    let local = branch::current_branch(session)?;

    // Snapshot the remote state. Everything later, including resume after
    // a crash, validates against these two hashes.
    git::run_git(&session.repo_root, &["fetch", "-q"])?;
    let parent_origin = format!("origin/{}", parent_name);
    let branch_origin = format!("origin/{}", branch_name);
    let parent_hash = git::rev_parse(&session.repo_root, &parent_origin)?;
    let branch_hash = git::rev_parse(&session.repo_root, &branch_origin)?;

    if reverse {
        // Forward flow must be caught up before reverse flow is allowed.
        if count_range(session, &branch_origin, &parent_origin)? > 0 {
            return Err(RevuError::UserError(format!(
                "cannot {}: parent has new commits\n\
                 \trun 'revu sync-branch' to bring them in first",
                cmd
            )));
        }
        if count_range(session, &branch_origin, "HEAD")? > 0 {
            return Err(RevuError::UserError(format!(
                "cannot {}: pending changes exist\n\
                 \tmail and submit them before retiring the branch",
                cmd
            )));
        }
    }

    // An "Already up to date" merge creates no commit, so finalizing
    // would amend whatever commit sits at HEAD. Refuse before any state
    // is written or the tree is touched.
    let incoming = if reverse {
        count_range(session, &parent_origin, &branch_origin)?
    } else {
        count_range(session, "HEAD", &parent_origin)?
    };
    if incoming == 0 {
        let source = if reverse { &branch_origin } else { &parent_origin };
        return Err(RevuError::UserError(format!(
            "cannot {}: nothing to merge, {} has no new commits",
            cmd, source
        )));
    }

    let mut sync = SyncBranchStatus {
        local: local.name.clone(),
        parent: BranchSnapshot {
            name: parent_name,
            hash: parent_hash,
        },
        branch: BranchSnapshot {
            name: branch_name,
            hash: branch_hash,
        },
        reverse,
        conflicts: Vec::new(),
    };
    sync.create(session)?;

    if reverse {
        // The working tree is clean and carries nothing beyond
        // origin/<branch>; rebuild it as the parent so the merge lands on
        // the destination side.
        git::run_git(&session.repo_root, &["reset", "-q", "--hard", &parent_origin])?;
    }

    let source_ref = format!("origin/{}", sync.source().name);
    let merged = git::run_git_unchecked(
        &session.repo_root,
        &["merge", "--no-ff", "--no-log", "-m", "sync-branch merge (message pending)", &source_ref],
    )?;
    if merged.success {
        return finalize(session, &sync);
    }

    let unmerged = branch::unmerged_paths(session)?;
    if unmerged.is_empty() {
        // Merge failed outright rather than stopping on conflicts.
        SyncBranchStatus::delete(session)?;
        return Err(RevuError::GitError(format!(
            "git merge failed: {}",
            merged.stderr
        )));
    }

    sync.conflicts = unmerged.clone();
    sync.save(session)?;

    // If the only collision is the review config itself, take the
    // destination's committed copy and retry the commit once.
    if unmerged == [crate::config::CONFIG_FILE] {
        git::run_git(
            &session.repo_root,
            &["checkout", "HEAD", "--", crate::config::CONFIG_FILE],
        )?;
        let committed = git::run_git_unchecked(&session.repo_root, &["commit", "--no-edit"])?;
        if committed.success {
            return finalize(session, &sync);
        }
    }

    Err(RevuError::MergeConflicts(conflict_message(&unmerged)))
}

fn resume(session: &Session) -> Result<String> {
    let sync = SyncBranchStatus::load(session)?.ok_or_else(|| {
        RevuError::StateError(
            "cannot sync-branch --continue: no sync-branch in progress".to_string(),
        )
    })?;

    let unmerged = branch::unmerged_paths(session)?;
    if !unmerged.is_empty() {
        return Err(RevuError::MergeConflicts(conflict_message(&unmerged)));
    }

    // Neither side may have moved since the snapshot; resuming against
    // drifted remotes risks merging unintended content.
    git::run_git(&session.repo_root, &["fetch", "-q"])?;
    for snap in [&sync.parent, &sync.branch] {
        let origin = format!("origin/{}", snap.name);
        let now = git::rev_parse(&session.repo_root, &origin)?;
        if now != snap.hash {
            return Err(RevuError::StateError(format!(
                "cannot sync-branch --continue: {} changed underfoot\n\
                 \trun 'git merge --abort' and start over",
                origin
            )));
        }
    }

    let source = sync.source();
    let merge_head = git::run_git_unchecked(&session.repo_root, &["rev-parse", "--verify", "MERGE_HEAD"])?;
    if merge_head.success {
        if merge_head.stdout != source.hash {
            return Err(RevuError::StateError(format!(
                "cannot sync-branch --continue: in-progress merge is not from origin/{}",
                source.name
            )));
        }
        git::run_git(&session.repo_root, &["commit", "--no-edit"])?;
    } else {
        // The user may have committed the resolution themselves; accept
        // that only when HEAD is the expected merge.
        let second_parent =
            git::run_git_unchecked(&session.repo_root, &["rev-parse", "--verify", "HEAD^2"])?;
        if !second_parent.success || second_parent.stdout != source.hash {
            return Err(RevuError::StateError(format!(
                "cannot sync-branch --continue: no merge from origin/{} in progress",
                source.name
            )));
        }
    }

    finalize(session, &sync)
}

/// Rewrite the merge commit message into canonical form, delete the
/// persisted status, and return the message for display.
fn finalize(session: &Session, sync: &SyncBranchStatus) -> Result<String> {
    if sync.reverse {
        // The merged tree must carry the parent's review config, not the
        // retired branch's.
        let restored = git::run_git_unchecked(
            &session.repo_root,
            &["checkout", &sync.dest().hash, "--", crate::config::CONFIG_FILE],
        )?;
        if !restored.success {
            git::run_git_unchecked(
                &session.repo_root,
                &["rm", "-q", "-f", "--ignore-unmatch", crate::config::CONFIG_FILE],
            )?;
        }
    }

    let merge_list = merge_list(session, sync)?;
    let message = merge_message(sync, &merge_list);
    git::run_git(&session.repo_root, &["commit", "--amend", "-q", "-m", &message])?;
    SyncBranchStatus::delete(session)?;

    eprintln!("* Merge commit created.");
    eprintln!(
        "Run 'git push origin HEAD:refs/for/{}' to send it for review.",
        sync.dest().name
    );
    Ok(message)
}

/// Enumerate the incorporated commits over the merge range, newest first:
/// `+ <date> <short-hash> <subject>`.
fn merge_list(session: &Session, sync: &SyncBranchStatus) -> Result<Vec<String>> {
    let range = format!("{}..{}", sync.dest().hash, sync.source().hash);
    let out = git::run_git(
        &session.repo_root,
        &["log", "--format=format:%h%x00%s%x00%at", &range, "--"],
    )?;
    let mut lines = Vec::new();
    for record in out.stdout.split('\n') {
        let fields: Vec<&str> = record.trim().split('\0').collect();
        if fields.len() != 3 {
            continue;
        }
        let date = fields[2]
            .parse::<i64>()
            .ok()
            .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        lines.push(format!("+ {} {} {}", date, fields[0], fields[1]));
    }
    Ok(lines)
}

/// Canonical merge commit message.
fn merge_message(sync: &SyncBranchStatus, merge_list: &[String]) -> String {
    let short = &sync.source().hash[..7.min(sync.source().hash.len())];
    let mut msg = if sync.reverse {
        format!(
            "all: REVERSE MERGE {} ({}) into {}\n\n\
             This commit is a REVERSE MERGE.\n\
             It merges {} back into its parent branch, {}.\n\
             This marks the end of development on {}.\n",
            sync.branch.name,
            short,
            sync.parent.name,
            sync.branch.name,
            sync.parent.name,
            sync.branch.name,
        )
    } else {
        format!(
            "[{}] all: merge {} ({}) into {}\n",
            sync.branch.name, sync.parent.name, short, sync.branch.name,
        )
    };

    if !sync.conflicts.is_empty() {
        msg.push_str("\nConflicts:\n\n");
        for path in &sync.conflicts {
            msg.push_str("- ");
            msg.push_str(path);
            msg.push('\n');
        }
    }

    msg.push_str("\nMerge List:\n\n");
    for line in merge_list {
        msg.push_str(line);
        msg.push('\n');
    }
    msg
}

fn conflict_message(paths: &[String]) -> String {
    let mut msg = String::from("sync-branch: merge conflicts in:\n");
    for path in paths {
        msg.push_str("\t- ");
        msg.push_str(path);
        msg.push('\n');
    }
    msg.push_str(
        "\nPlease fix them (use 'git status' to see the list again),\n\
         then 'git add' or 'git rm' to resolve them,\n\
         and then 'revu sync-branch --continue' to continue.\n\
         Or run 'git merge --abort' to give up on this sync-branch.",
    );
    msg
}

fn check_clean(session: &Session, cmd: &str) -> Result<()> {
    if branch::has_staged_changes(session)? {
        return Err(RevuError::UserError(format!(
            "cannot {}: staged changes exist\n\
             \trun 'git status' to see changes",
            cmd
        )));
    }
    if branch::has_unstaged_changes(session)? {
        return Err(RevuError::UserError(format!(
            "cannot {}: unstaged changes exist\n\
             \trun 'git status' to see changes\n\
             \trun 'git stash' to save unstaged changes",
            cmd
        )));
    }
    Ok(())
}

fn count_range(session: &Session, exclude: &str, include: &str) -> Result<usize> {
    let range = format!("{}..{}", exclude, include);
    let out = git::run_git(
        &session.repo_root,
        &["log", "--format=format:x", &range, "--"],
    )?;
    Ok(out.non_blank_lines().len())
}
