//! Error types for the revu CLI.
//!
//! Uses thiserror for derive macros and provides user-actionable error messages.

use crate::exit_codes;
use thiserror::Error;

/// Main error type for revu operations.
///
/// Each variant maps to a specific exit code. The variants are `Clone`
/// because a single batched Gerrit failure is distributed to every
/// identifier in the failed batch.
#[derive(Error, Debug, Clone)]
pub enum RevuError {
    /// User provided invalid arguments or a precondition is violated
    /// (uncommitted changes, missing configuration, detached HEAD).
    #[error("{0}")]
    UserError(String),

    /// A merge stopped on conflicts. This is an expected, recoverable
    /// condition, not a defect; the message carries remediation steps.
    #[error("{0}")]
    MergeConflicts(String),

    /// Git subprocess failed.
    #[error("{0}")]
    GitError(String),

    /// Gerrit request failed: transport, authentication, or protocol error.
    #[error("{0}")]
    GerritError(String),

    /// Sync-branch state violation: hash drift since the snapshot, a stale
    /// or missing status file, or a merge from the wrong source.
    #[error("{0}")]
    StateError(String),
}

impl RevuError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            RevuError::UserError(_) => exit_codes::USER_ERROR,
            RevuError::MergeConflicts(_) => exit_codes::MERGE_CONFLICT,
            RevuError::GitError(_) => exit_codes::GIT_FAILURE,
            RevuError::GerritError(_) => exit_codes::GERRIT_FAILURE,
            RevuError::StateError(_) => exit_codes::STATE_FAILURE,
        }
    }
}

/// Result type alias for revu operations.
pub type Result<T> = std::result::Result<T, RevuError>;
