//! Command implementations for revu.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations.

mod branchpoint;
mod pending;
mod submit;
mod sync;
pub mod sync_branch;

use crate::cli::Command;
use crate::error::Result;

/// Dispatch a command to its implementation.
pub fn dispatch(command: Command) -> Result<()> {
    match command {
        Command::Pending(args) => pending::cmd_pending(&args),
        Command::Branchpoint => branchpoint::cmd_branchpoint(),
        Command::Sync => sync::cmd_sync(),
        Command::SyncBranch(args) => sync_branch::cmd_sync_branch(&args),
        Command::Submit => submit::cmd_submit(),
    }
}
