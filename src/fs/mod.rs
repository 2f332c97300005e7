//! Filesystem utilities for revu.
//!
//! Persisted sync-branch state must never be observed half-written, even
//! across a crash between the remote-hash snapshot and the merge itself,
//! so all writes here are either atomic replacements or exclusive creates.

mod atomic;

pub use atomic::atomic_write_file;
pub use atomic::create_exclusive;
