//! CLI argument parsing for revu.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{Parser, Subcommand};

/// Revu: Gerrit code-review helper for git.
///
/// Works on the "one pending change per commit" model: each commit on a
/// branch that is not yet on its upstream is a pending change, tied to its
/// Gerrit review by the Change-Id trailer in the commit message.
#[derive(Parser, Debug)]
#[command(name = "revu")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for revu.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show pending changes, joined with their Gerrit review state.
    ///
    /// Lists each local branch's commits that are not yet on its upstream,
    /// annotated with review numbers, votes, and merge state.
    Pending(PendingArgs),

    /// Print the branchpoint of the current branch.
    ///
    /// The branchpoint is the latest commit shared with the upstream,
    /// suitable as the base for `git diff` or `git rebase -i`.
    Branchpoint,

    /// Sync the current branch with its upstream.
    ///
    /// Fetches and rebases pending work; a pending change that was
    /// submitted on the server is removed from local history.
    Sync,

    /// Merge the parent branch into this dev branch.
    ///
    /// Requires `branch` and `parent-branch` in codereview.cfg. Conflicts
    /// pause the operation; resume with --continue after resolving them.
    SyncBranch(SyncBranchArgs),

    /// Submit the pending change on the current branch.
    ///
    /// The change must have exactly one pending commit whose current
    /// patch set matches the local commit.
    Submit,
}

/// Arguments for the `pending` command.
#[derive(Parser, Debug, Clone, Default)]
pub struct PendingArgs {
    /// Report only the currently checked-out branch.
    #[arg(short = 'c', long = "current")]
    pub current_only: bool,

    /// Skip Gerrit entirely; report local state only.
    #[arg(short = 'l', long = "local")]
    pub local_only: bool,

    /// One line per commit instead of full messages.
    #[arg(short = 's', long)]
    pub short: bool,
}

/// Arguments for the `sync-branch` command.
#[derive(Parser, Debug, Clone, Default)]
pub struct SyncBranchArgs {
    /// Resume after resolving merge conflicts.
    #[arg(long = "continue")]
    pub cont: bool,

    /// Merge this branch's accumulated history back into its parent,
    /// ending development on the branch.
    #[arg(long)]
    pub merge_back_to_parent: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
