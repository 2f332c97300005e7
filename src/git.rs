//! Git command runner for revu.
//!
//! Provides a safe wrapper around git commands with captured stdout/stderr
//! and structured error handling. All git operations go through this module.
//! Parallel workers may call these functions concurrently; every call is an
//! independent subprocess with no shared state.

use crate::error::{Result, RevuError};
use std::path::Path;
use std::process::{Command, Output};

/// Result of a git command execution.
#[derive(Debug, Clone)]
pub struct GitOutput {
    /// Standard output from the command (trimmed).
    pub stdout: String,
    /// Standard error from the command (trimmed).
    pub stderr: String,
    /// Whether the command exited with status 0.
    pub success: bool,
}

impl GitOutput {
    fn from_output(output: &Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            success: output.status.success(),
        }
    }

    /// Returns stdout lines as a vector, skipping nothing.
    pub fn lines(&self) -> Vec<&str> {
        if self.stdout.is_empty() {
            Vec::new()
        } else {
            self.stdout.lines().collect()
        }
    }

    /// Returns non-blank stdout lines.
    pub fn non_blank_lines(&self) -> Vec<&str> {
        self.stdout
            .lines()
            .filter(|l| !l.trim().is_empty())
            .collect()
    }
}

/// Run a git command with the specified working directory.
///
/// Returns an error if git cannot be spawned or exits nonzero.
pub fn run_git<P: AsRef<Path>>(cwd: P, args: &[&str]) -> Result<GitOutput> {
    let out = run_git_unchecked(cwd, args)?;
    if out.success {
        Ok(out)
    } else {
        let msg = if out.stderr.is_empty() {
            out.stdout.clone()
        } else {
            out.stderr.clone()
        };
        Err(RevuError::GitError(format!(
            "git {} failed: {}",
            args.first().unwrap_or(&""),
            msg
        )))
    }
}

/// Run a git command, reporting a nonzero exit through `GitOutput::success`
/// instead of an error. Only a spawn failure is an error.
///
/// Used where a nonzero exit is meaningful rather than fatal, such as
/// `git merge` (conflicts) and `git merge-base --is-ancestor`.
pub fn run_git_unchecked<P: AsRef<Path>>(cwd: P, args: &[&str]) -> Result<GitOutput> {
    let cwd = cwd.as_ref();

    let output = Command::new("git")
        .current_dir(cwd)
        .args(args)
        .env("LC_ALL", "C")
        .output()
        .map_err(|e| {
            RevuError::GitError(format!(
                "failed to execute git {}: {}",
                args.first().unwrap_or(&""),
                e
            ))
        })?;

    Ok(GitOutput::from_output(&output))
}

/// Resolve a revision expression to a full commit hash.
pub fn rev_parse<P: AsRef<Path>>(cwd: P, expr: &str) -> Result<String> {
    // Git echoes option-looking arguments back with no error
    // (try "git rev-parse -qwerty"), so reject them here.
    if expr.starts_with('-') {
        return Err(RevuError::GitError(format!(
            "cannot resolve {}: invalid reference",
            expr
        )));
    }
    let out = run_git_unchecked(&cwd, &["rev-parse", "--verify", expr])?;
    if !out.success {
        return Err(RevuError::GitError(format!(
            "cannot resolve {}: {}",
            expr, out.stderr
        )));
    }
    Ok(out.stdout)
}

/// Report whether `ancestor` is reachable from `descendant`.
pub fn is_ancestor<P: AsRef<Path>>(cwd: P, ancestor: &str, descendant: &str) -> Result<bool> {
    let out = run_git_unchecked(
        &cwd,
        &["merge-base", "--is-ancestor", ancestor, descendant],
    )?;
    Ok(out.success)
}

/// Get the repository root directory using `git rev-parse --show-toplevel`.
///
/// Works from any location inside the repository, including worktrees.
pub fn repo_root<P: AsRef<Path>>(cwd: P) -> Result<std::path::PathBuf> {
    let out = run_git_unchecked(&cwd, &["rev-parse", "--show-toplevel"])?;
    if !out.success {
        return Err(RevuError::UserError(
            "not inside a git repository. Run this command from within a git repository."
                .to_string(),
        ));
    }
    Ok(std::path::PathBuf::from(&out.stdout))
}

/// Get the absolute path of the repository's `.git` directory.
///
/// For a linked worktree this is the per-worktree git dir, which is the
/// right place for state tied to one working tree.
pub fn git_dir<P: AsRef<Path>>(cwd: P) -> Result<std::path::PathBuf> {
    let out = run_git(&cwd, &["rev-parse", "--absolute-git-dir"])?;
    Ok(std::path::PathBuf::from(&out.stdout))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::create_test_repo;

    #[test]
    fn run_git_captures_stdout() {
        let repo = create_test_repo();
        let out = run_git(repo.path(), &["rev-parse", "--abbrev-ref", "HEAD"]).unwrap();
        assert_eq!(out.stdout, "main");
        assert!(out.success);
    }

    #[test]
    fn run_git_reports_failure() {
        let repo = create_test_repo();
        let err = run_git(repo.path(), &["rev-parse", "--verify", "no-such-ref"]).unwrap_err();
        assert!(matches!(err, RevuError::GitError(_)));
    }

    #[test]
    fn run_git_unchecked_reports_exit_status() {
        let repo = create_test_repo();
        let out = run_git_unchecked(repo.path(), &["rev-parse", "--verify", "no-such-ref"]).unwrap();
        assert!(!out.success);
    }

    #[test]
    fn rev_parse_resolves_head() {
        let repo = create_test_repo();
        let hash = rev_parse(repo.path(), "HEAD").unwrap();
        assert_eq!(hash.len(), 40);
    }

    #[test]
    fn rev_parse_rejects_option_lookalikes() {
        let repo = create_test_repo();
        let err = rev_parse(repo.path(), "-qwerty").unwrap_err();
        assert!(err.to_string().contains("invalid reference"));
    }

    #[test]
    fn is_ancestor_detects_reachability() {
        let repo = create_test_repo();
        let head = rev_parse(repo.path(), "HEAD").unwrap();
        assert!(is_ancestor(repo.path(), &head, "HEAD").unwrap());
    }

    #[test]
    fn repo_root_fails_outside_repository() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = repo_root(dir.path()).unwrap_err();
        assert!(matches!(err, RevuError::UserError(_)));
    }

    #[test]
    fn git_dir_is_absolute() {
        let repo = create_test_repo();
        let dir = git_dir(repo.path()).unwrap();
        assert!(dir.is_absolute());
        assert!(dir.ends_with(".git"));
    }
}
