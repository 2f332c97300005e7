//! Exit code constants for the revu CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, precondition violation)
//! - 2: Merge conflicts (recoverable; resolve and `sync-branch --continue`)
//! - 3: Git operation failure
//! - 4: Gerrit/network failure
//! - 5: Sync-branch state failure (hash drift, wrong branch, stale status)

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments, uncommitted changes, missing configuration.
pub const USER_ERROR: i32 = 1;

/// Merge stopped on conflicts; the working tree holds the merge in progress.
pub const MERGE_CONFLICT: i32 = 2;

/// Git operation failure: a git subprocess exited nonzero unexpectedly.
pub const GIT_FAILURE: i32 = 3;

/// Gerrit failure: HTTP transport, authentication, or protocol error.
pub const GERRIT_FAILURE: i32 = 4;

/// Sync-branch state failure: resume-time consistency violation or
/// conflicting persisted state.
pub const STATE_FAILURE: i32 = 5;
