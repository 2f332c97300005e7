//! The pending report: local branch state joined with Gerrit review state.
//!
//! Branch loading fans out over a small worker pool while a single
//! background `git fetch` refreshes remote-tracking refs. The fetch is
//! joined before behind-counts are computed, so the numbers reflect the
//! refreshed remote. Gerrit failures degrade per commit; the local half of
//! the report always prints.

use std::collections::VecDeque;
use std::sync::{Mutex, mpsc};

use crate::branch::{self, Branch, Commit};
use crate::cli::PendingArgs;
use crate::error::Result;
use crate::gerrit::GerritClient;
use crate::git;
use crate::session::Session;

/// Workers loading branch state concurrently. Each worker issues git
/// subprocesses; more than this just thrashes the object store.
const MAX_BRANCH_WORKERS: usize = 10;

const GERRIT_OPTIONS: &[&str] = &["LABELS", "CURRENT_REVISION"];

pub fn cmd_pending(args: &PendingArgs) -> Result<()> {
    let session = Session::from_cwd()?;
    print!("{}", render_pending(&session, args)?);
    Ok(())
}

/// One branch's loaded state plus, when Gerrit was consulted, the review
/// records positionally aligned with its pending commits.
struct BranchReport {
    branch: Branch,
    gerrit: Option<Vec<Result<Vec<crate::gerrit::ChangeInfo>>>>,
}

pub fn render_pending(session: &Session, args: &PendingArgs) -> Result<String> {
    let gerrit = if args.local_only {
        None
    } else {
        match GerritClient::new(session) {
            Ok(client) => Some(client),
            Err(err) => {
                eprintln!("revu: continuing without gerrit: {}", err);
                None
            }
        }
    };
    let review_url = gerrit.as_ref().map(|c| c.auth.url.clone());

    let mut branches = if args.current_only {
        vec![branch::current_branch(session)?]
    } else {
        branch::local_branches(session)?
    };
    // The checked-out branch reads first; the rest keep git's order.
    branches.sort_by_key(|b| !b.current);
    let count = branches.len();

    let queue: Mutex<VecDeque<(usize, Branch)>> =
        Mutex::new(branches.into_iter().enumerate().collect());
    let (tx, rx) = mpsc::channel::<(usize, BranchReport)>();

    std::thread::scope(|scope| {
        // Refresh remote-tracking refs while branches load. Offline is
        // fine; the report then runs against stale remote refs. Local
        // mode promises zero network traffic, so it skips the refresh.
        let fetch = (!args.local_only)
            .then(|| scope.spawn(|| git::run_git_unchecked(&session.repo_root, &["fetch", "-q"])));

        let workers = count.clamp(1, MAX_BRANCH_WORKERS);
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let tx = tx.clone();
                let queue = &queue;
                let gerrit = gerrit.as_ref();
                scope.spawn(move || {
                    loop {
                        // A poisoned queue still holds valid branch
                        // entries; keep draining it.
                        let item = queue
                            .lock()
                            .unwrap_or_else(|poisoned| poisoned.into_inner())
                            .pop_front();
                        let Some((index, b)) = item else { break };
                        let report = load_report(session, b, gerrit);
                        let _ = tx.send((index, report));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("branch worker panicked");
        }
        // Behind-counts below must see the refreshed refs.
        if let Some(fetch) = fetch {
            let _ = fetch.join();
        }
    });
    drop(tx);

    let mut reports: Vec<Option<BranchReport>> = (0..count).map(|_| None).collect();
    for (index, report) in rx {
        reports[index] = Some(report);
    }

    let mut out = String::new();
    for report in reports.into_iter().flatten() {
        render_branch(session, report, args, review_url.as_deref(), &mut out);
    }
    Ok(out)
}

fn load_report(session: &Session, mut b: Branch, gerrit: Option<&GerritClient>) -> BranchReport {
    let change_ids: Option<Vec<Option<String>>> = match b.load_pending(session) {
        Ok(state) if !state.commits.is_empty() => {
            Some(state.commits.iter().map(|c| c.change_id.clone()).collect())
        }
        _ => None,
    };
    let gerrit_results = match (gerrit, change_ids) {
        (Some(client), Some(change_ids)) => b.upstream(session).ok().flatten().map(|upstream| {
            let ids: Vec<Option<String>> = change_ids
                .iter()
                .map(|id| id.as_ref().map(|i| client.full_change_id(&upstream, i)))
                .collect();
            client.fetch_all(&ids, GERRIT_OPTIONS)
        }),
        _ => None,
    };
    BranchReport {
        branch: b,
        gerrit: gerrit_results,
    }
}

fn render_branch(
    session: &Session,
    report: BranchReport,
    args: &PendingArgs,
    review_url: Option<&str>,
    out: &mut String,
) {
    let mut b = report.branch;
    let pending = match b.load_pending(session) {
        Ok(state) => state.commits.clone(),
        Err(err) => {
            out.push_str(&format!("{}: {}\n", b.name, err));
            return;
        }
    };

    // Quiet branches only appear when asked for directly.
    if pending.is_empty() && !b.current && !args.current_only {
        return;
    }

    let mut notes = Vec::new();
    if b.current {
        notes.push("current branch".to_string());
    }
    match b.commits_behind(session) {
        Ok(behind) if behind > 0 => notes.push(format!("{} behind", behind)),
        _ => {}
    }
    let suffix = if notes.is_empty() {
        String::new()
    } else {
        format!(" ({})", notes.join(", "))
    };

    if args.short {
        out.push_str(&format!("{}{}\n", b.name, suffix));
    } else {
        // Commits are newest first, so the range runs from the oldest
        // commit's parent to the branch tip.
        let range = match (pending.last().and_then(|c| c.parents.first()), pending.first()) {
            (Some(base), Some(tip)) => {
                format!(" {}..{}", &base[..base.len().min(7)], tip.short_hash)
            }
            _ => String::new(),
        };
        out.push_str(&format!("branch: {}{}{}\n", b.name, range, suffix));
    }

    for (i, commit) in pending.iter().enumerate() {
        let review = report
            .gerrit
            .as_ref()
            .and_then(|results| results.get(i))
            .map(|result| annotate(commit, result, review_url))
            .unwrap_or_default();

        if args.short {
            out.push_str(&format!("+ {} {}{}\n", commit.short_hash, commit.subject, review));
        } else {
            out.push_str(&format!("commit {}{}\n", commit.hash, review));
            for line in commit.message.lines() {
                if line.is_empty() {
                    out.push('\n');
                } else {
                    out.push_str(&format!("\t{}\n", line));
                }
            }
            out.push('\n');
            file_section(out, "Files in this change:", &changed_files(session, commit));
        }
    }

    // The checked-out branch also reports its uncommitted files.
    if !args.short && b.current {
        if let Ok(changes) = branch::local_changes(session) {
            file_section(out, "Files staged:", &changes.staged);
            file_section(out, "Files unstaged:", &changes.unstaged);
            file_section(out, "Files untracked:", &changes.untracked);
        }
    }
}

/// Paths touched by one commit; a merge diffs against its first parent.
fn changed_files(session: &Session, commit: &Commit) -> Vec<String> {
    let args = [
        "diff-tree",
        "--no-commit-id",
        "--name-only",
        "-r",
        &commit.hash,
    ];
    match git::run_git(&session.repo_root, &args) {
        Ok(out) => out.non_blank_lines().iter().map(|l| l.to_string()).collect(),
        Err(_) => Vec::new(),
    }
}

fn file_section(out: &mut String, title: &str, files: &[String]) {
    if files.is_empty() {
        return;
    }
    out.push_str(title);
    out.push('\n');
    for file in files {
        out.push_str(&format!("\t{}\n", file));
    }
    out.push('\n');
}

/// Review-state annotation for one commit, like
/// ` (https://go-review.googlesource.com/1234: mailed, Code-Review+2)`.
fn annotate(
    commit: &Commit,
    result: &Result<Vec<crate::gerrit::ChangeInfo>>,
    review_url: Option<&str>,
) -> String {
    let changes = match result {
        Ok(changes) => changes,
        Err(err) => return format!(" (gerrit: {})", err),
    };
    if commit.change_id.is_none() {
        return String::new();
    }
    let change = match changes.as_slice() {
        [] => return " (not mailed)".to_string(),
        [one] => one,
        // Same Change-Id on several branches; the query was scoped to one
        // branch, so this is a server-side anomaly worth surfacing.
        many => return format!(" ({} matching changes)", many.len()),
    };

    let review = match review_url {
        Some(url) => format!("{}/{}", url, change.number),
        None => format!("CL {}", change.number),
    };
    let mut tags = Vec::new();
    if !change.current_revision.is_empty() && change.current_revision == commit.hash {
        tags.push("mailed".to_string());
    }
    if change.is_merged() {
        tags.push("submitted".to_string());
    }
    for name in change.label_names() {
        let label = &change.labels[name];
        let mut votes: Vec<i32> = label.all.iter().map(|a| a.value).filter(|v| *v != 0).collect();
        votes.sort_unstable();
        votes.dedup();
        for vote in votes {
            tags.push(format!("{}{:+}", name, vote));
        }
    }
    if change.unresolved_comment_count > 0 {
        tags.push(format!("{} unresolved", change.unresolved_comment_count));
    }
    if tags.is_empty() {
        format!(" ({})", review)
    } else {
        format!(" ({}: {})", review, tags.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gerrit::{ApprovalInfo, ChangeInfo, LabelInfo};
    use crate::test_support::{add_commit, create_server_client};

    fn change(number: u64, status: &str) -> ChangeInfo {
        ChangeInfo {
            number,
            status: status.to_string(),
            ..Default::default()
        }
    }

    fn commit_with_change_id() -> Commit {
        Commit {
            change_id: Some("Iaaaa".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn annotation_covers_votes_merge_state_and_errors() {
        let commit = commit_with_change_id();

        assert_eq!(annotate(&commit, &Ok(vec![]), None), " (not mailed)");

        let mut ci = change(4321, "NEW");
        ci.labels.insert(
            "Code-Review".to_string(),
            LabelInfo {
                all: vec![
                    ApprovalInfo { value: 2 },
                    ApprovalInfo { value: -1 },
                    ApprovalInfo { value: 0 },
                ],
            },
        );
        ci.unresolved_comment_count = 3;
        assert_eq!(
            annotate(&commit, &Ok(vec![ci]), None),
            " (CL 4321: Code-Review-1, Code-Review+2, 3 unresolved)"
        );

        let merged = change(7, "MERGED");
        assert_eq!(annotate(&commit, &Ok(vec![merged]), None), " (CL 7: submitted)");

        let err = crate::error::RevuError::GerritError("timeout".to_string());
        assert_eq!(annotate(&commit, &Err(err), None), " (gerrit: timeout)");

        // A commit never mailed has no Change-Id and gets no annotation.
        let plain = Commit::default();
        assert_eq!(annotate(&plain, &Ok(vec![]), None), "");
    }

    #[test]
    fn annotation_shows_review_url_and_mailed_state() {
        let mut commit = commit_with_change_id();
        commit.hash = "deadbeef".to_string();

        let mut ci = change(1234, "NEW");
        ci.current_revision = "deadbeef".to_string();
        assert_eq!(
            annotate(&commit, &Ok(vec![ci]), Some("https://go-review.example.com")),
            " (https://go-review.example.com/1234: mailed)"
        );

        // A later local amend no longer matches the mailed revision.
        let mut stale = change(1234, "NEW");
        stale.current_revision = "0ldc0ffee".to_string();
        assert_eq!(
            annotate(&commit, &Ok(vec![stale]), Some("https://go-review.example.com")),
            " (https://go-review.example.com/1234)"
        );
    }

    #[test]
    fn short_report_lists_pending_commits_newest_first() {
        let fixture = create_server_client();
        let session = Session::from_dir(&fixture.client).unwrap();
        add_commit(&fixture.client, "a.txt", "a", "first change");
        add_commit(&fixture.client, "b.txt", "b", "second change");

        let args = PendingArgs {
            local_only: true,
            short: true,
            ..Default::default()
        };
        let out = render_pending(&session, &args).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "main (current branch)");
        assert!(lines[1].starts_with("+ "));
        assert!(lines[1].ends_with(" second change"));
        assert!(lines[2].ends_with(" first change"));
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn long_report_indents_full_messages() {
        let fixture = create_server_client();
        let session = Session::from_dir(&fixture.client).unwrap();
        let hash = add_commit(
            &fixture.client,
            "a.txt",
            "a",
            "subject line\n\nBody text.\n\nChange-Id: Iaaaa\n",
        );

        let args = PendingArgs {
            local_only: true,
            ..Default::default()
        };
        let base = git::rev_parse(&fixture.client, "HEAD^").unwrap();
        let out = render_pending(&session, &args).unwrap();
        assert!(out.starts_with(&format!(
            "branch: main {}..{} (current branch)\n",
            &base[..7],
            &hash[..7]
        )));
        assert!(out.contains(&format!("commit {}\n", hash)));
        assert!(out.contains("\tsubject line\n"));
        assert!(out.contains("\tBody text.\n"));
        assert!(out.contains("\tChange-Id: Iaaaa\n"));
        assert!(out.contains("Files in this change:\n\ta.txt\n"));
        // Clean tree, so no worktree sections.
        assert!(!out.contains("Files staged:"));
        assert!(!out.contains("Files unstaged:"));
        assert!(!out.contains("Files untracked:"));
    }

    #[test]
    fn long_report_lists_uncommitted_files_on_the_current_branch() {
        let fixture = create_server_client();
        let session = Session::from_dir(&fixture.client).unwrap();
        add_commit(&fixture.client, "a.txt", "a", "work");

        std::fs::write(fixture.client.join("staged.txt"), "s").unwrap();
        crate::test_support::git(&fixture.client, &["add", "staged.txt"]);
        std::fs::write(fixture.client.join("loose.txt"), "l").unwrap();

        let args = PendingArgs {
            local_only: true,
            ..Default::default()
        };
        let out = render_pending(&session, &args).unwrap();
        assert!(out.contains("Files staged:\n\tstaged.txt\n"));
        assert!(out.contains("Files untracked:\n\tloose.txt\n"));
        assert!(!out.contains("Files unstaged:"));
    }

    #[test]
    fn current_branch_renders_first() {
        let fixture = create_server_client();
        let session = Session::from_dir(&fixture.client).unwrap();
        crate::test_support::git(&fixture.client, &["checkout", "-q", "-b", "aaa"]);
        add_commit(&fixture.client, "aaa.txt", "a", "aaa work");
        crate::test_support::git(&fixture.client, &["checkout", "-q", "main"]);
        add_commit(&fixture.client, "main.txt", "m", "main work");

        // "aaa" sorts before "main" in the git listing; the report still
        // leads with the checked-out branch.
        let args = PendingArgs {
            local_only: true,
            short: true,
            ..Default::default()
        };
        let out = render_pending(&session, &args).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "main (current branch)");
        assert!(lines[1].ends_with(" main work"));
        assert_eq!(lines[2], "aaa");
        assert!(lines[3].ends_with(" aaa work"));
    }

    #[test]
    fn behind_count_reflects_the_joined_fetch() {
        let fixture = create_server_client();
        let session = Session::from_dir(&fixture.client).unwrap();
        // Remote moves ahead; the report's own fetch must pick it up
        // without an explicit fetch here.
        add_commit(&fixture.server, "s.txt", "s", "server work");

        let args = PendingArgs {
            short: true,
            ..Default::default()
        };
        let out = render_pending(&session, &args).unwrap();
        assert_eq!(out, "main (current branch, 1 behind)\n");
    }

    #[test]
    fn local_mode_performs_no_fetch() {
        let fixture = create_server_client();
        let session = Session::from_dir(&fixture.client).unwrap();
        add_commit(&fixture.server, "s.txt", "s", "server work");
        let stale = git::rev_parse(&fixture.client, "origin/main").unwrap();

        let args = PendingArgs {
            local_only: true,
            short: true,
            ..Default::default()
        };
        let out = render_pending(&session, &args).unwrap();

        // The remote-tracking ref must not move, and the stale ref means
        // no behind-count appears.
        assert_eq!(git::rev_parse(&fixture.client, "origin/main").unwrap(), stale);
        assert_eq!(out, "main (current branch)\n");
    }

    #[test]
    fn quiet_branches_are_omitted_unless_current() {
        let fixture = create_server_client();
        git::run_git(&fixture.client, &["branch", "idle"]).unwrap();
        let session = Session::from_dir(&fixture.client).unwrap();
        add_commit(&fixture.client, "a.txt", "a", "work");

        let args = PendingArgs {
            local_only: true,
            short: true,
            ..Default::default()
        };
        let out = render_pending(&session, &args).unwrap();
        assert!(out.contains("main (current branch)"));
        assert!(!out.contains("idle"));

        // current_only restricts the report to the checked-out branch.
        let current = PendingArgs {
            local_only: true,
            short: true,
            current_only: true,
        };
        let out = render_pending(&session, &current).unwrap();
        assert!(out.starts_with("main (current branch)"));
    }
}
