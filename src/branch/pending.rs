//! Pending-commit computation: the merge-aware history traversal that
//! decides which commits on a branch are not yet on its upstream, and
//! where the branchpoint is.

use crate::error::Result;
use crate::git;
use crate::session::Session;

/// Prefix of the change-identifier trailer in commit messages.
pub const CHANGE_ID_PREFIX: &str = "Change-Id: ";

/// A single commit on a branch. Immutable once constructed.
#[derive(Debug, Clone, Default)]
pub struct Commit {
    /// Full commit hash.
    pub hash: String,
    /// Abbreviated commit hash.
    pub short_hash: String,
    /// All parent hashes; more than one means a merge commit.
    pub parents: Vec<String>,
    /// Tree hash.
    pub tree: String,
    /// Full commit message.
    pub message: String,
    /// First line of the commit message.
    pub subject: String,
    /// Change-Id trailer value, if the message carries one.
    pub change_id: Option<String>,
    /// Author name.
    pub author_name: String,
    /// Author email.
    pub author_email: String,
    /// Author date as a Unix timestamp string.
    pub author_date: String,
}

impl Commit {
    /// First parent hash, if any.
    pub fn parent(&self) -> Option<&str> {
        self.parents.first().map(String::as_str)
    }

    /// Whether this commit is a merge commit.
    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }
}

/// The pending state of one branch: commits not yet on upstream
/// (child before parent) and the branchpoint hash.
#[derive(Debug, Clone)]
pub struct PendingState {
    pub commits: Vec<Commit>,
    pub branchpoint: String,
}

// One %x00-separated field layout per commit; see the format string below.
const NUM_FIELDS: usize = 9;

/// Compute the pending state for `branch_name` against `upstream`.
///
/// `upstream == None` means detached HEAD: no pending commits, the
/// branchpoint is the current commit.
///
/// All per-commit data comes back from a single batched `git log` call,
/// keeping the cost linear in the number of pending commits. The log is
/// read in --topo-order, child before parent, so for a linear chain the
/// branchpoint is simply the parent of the last commit read. A merge
/// commit breaks that rule: topological order can interleave side history
/// that is already on the upstream, so each of its parents is tested for
/// reachability from the upstream ref, and the first reachable parent is
/// the true branchpoint. Traversal stops there; the side ancestry must
/// not appear in the pending list.
pub fn compute_pending(
    session: &Session,
    branch_name: &str,
    upstream: Option<&str>,
) -> Result<PendingState> {
    let full_name = full_ref_name(branch_name);

    let Some(upstream) = upstream else {
        let tip = git::rev_parse(&session.repo_root, "HEAD")?;
        return Ok(PendingState {
            commits: Vec::new(),
            branchpoint: tip,
        });
    };

    let range = format!("{}..{}", upstream, full_name);
    let out = git::run_git(
        &session.repo_root,
        &[
            "log",
            "--topo-order",
            "--format=format:%H%x00%h%x00%P%x00%T%x00%B%x00%s%x00%an%x00%ae%x00%at%x00",
            &range,
            "--",
        ],
    )?;

    // Zero pending commits: empty output, branchpoint is the branch tip.
    let tip = git::rev_parse(&session.repo_root, &full_name)?;
    let mut state = PendingState {
        commits: Vec::new(),
        branchpoint: tip.clone(),
    };

    let fields: Vec<&str> = out
        .stdout
        .split('\0')
        .map(|f| f.trim_start_matches(['\r', '\n']))
        .collect();
    if fields.len() < NUM_FIELDS {
        return Ok(state);
    }

    let mut i = 0;
    'log: while i + NUM_FIELDS <= fields.len() {
        let parents: Vec<String> = fields[i + 2].split_whitespace().map(String::from).collect();
        let message = fields[i + 4].to_string();
        let commit = Commit {
            hash: fields[i].to_string(),
            short_hash: fields[i + 1].to_string(),
            parents,
            tree: fields[i + 3].to_string(),
            subject: fields[i + 5].to_string(),
            author_name: fields[i + 6].to_string(),
            author_email: fields[i + 7].to_string(),
            author_date: fields[i + 8].to_string(),
            change_id: extract_change_id(&message),
            message,
        };
        i += NUM_FIELDS;

        if commit.is_merge() {
            // Check every parent, not just the second, so the result does
            // not depend on parent order.
            for parent in commit.parents.clone() {
                if git::is_ancestor(&session.repo_root, &parent, upstream)? {
                    state.commits.push(commit);
                    state.branchpoint = parent;
                    break 'log;
                }
            }
        }

        state.branchpoint = commit.parent().unwrap_or_default().to_string();
        state.commits.push(commit);
    }

    // A pending root commit (history unrelated to the upstream) has no
    // parent to anchor on; fall back to the branch tip.
    if state.branchpoint.is_empty() {
        state.branchpoint = tip;
    }

    Ok(state)
}

/// Extract the Change-Id trailer from a commit message.
///
/// When multiple trailer lines exist (a message quoting another commit
/// message), the last one wins.
pub fn extract_change_id(message: &str) -> Option<String> {
    let mut id = None;
    for line in message.lines() {
        if let Some(rest) = line.strip_prefix(CHANGE_ID_PREFIX) {
            id = Some(rest.trim().to_string());
        }
    }
    id
}

/// The fully qualified ref name for a local branch.
///
/// Detached HEAD has no real branch name and stays as "HEAD".
pub fn full_ref_name(branch_name: &str) -> String {
    if branch_name == "HEAD" {
        "HEAD".to_string()
    } else {
        format!("refs/heads/{}", branch_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_change_id_trailer() {
        let msg = "subject\n\nbody text\n\nChange-Id: I0123456789abcdef\n";
        assert_eq!(
            extract_change_id(msg).as_deref(),
            Some("I0123456789abcdef")
        );
    }

    #[test]
    fn missing_change_id_is_none() {
        assert_eq!(extract_change_id("subject\n\nbody\n"), None);
    }

    #[test]
    fn last_change_id_wins_for_quoted_messages() {
        let msg = concat!(
            "revert a change\n\n",
            "This reverts:\n",
            "Change-Id: Iaaaaaaaaaaaaaaaa\n\n",
            "Change-Id: Ibbbbbbbbbbbbbbbb\n",
        );
        assert_eq!(
            extract_change_id(msg).as_deref(),
            Some("Ibbbbbbbbbbbbbbbb")
        );
    }

    #[test]
    fn full_ref_name_qualifies_branches_but_not_head() {
        assert_eq!(full_ref_name("work"), "refs/heads/work");
        assert_eq!(full_ref_name("HEAD"), "HEAD");
    }
}
