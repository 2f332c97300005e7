use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

pub(crate) struct ServerClient {
    // Owns the directory tree for both repositories.
    pub(crate) _tmp: TempDir,
    pub(crate) server: PathBuf,
    pub(crate) client: PathBuf,
}

pub(crate) fn create_test_repo() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    init_repo(temp_dir.path());
    temp_dir
}

/// Build a "server" repository and a clone of it, the shape every
/// remote-aware test needs: the clone's origin points at the server, and
/// `git fetch` works against a plain path remote.
pub(crate) fn create_server_client() -> ServerClient {
    let tmp = TempDir::new().unwrap();
    let server = tmp.path().join("server");
    let client = tmp.path().join("client");

    std::fs::create_dir_all(&server).unwrap();
    init_repo(&server);
    // Allow pushes into the checked-out branch from tests.
    git(&server, &["config", "receive.denyCurrentBranch", "ignore"]);

    let server_str = server.to_string_lossy().to_string();
    let client_str = client.to_string_lossy().to_string();
    git(tmp.path(), &["clone", "-q", &server_str, &client_str]);
    git(&client, &["config", "user.email", "test@example.com"]);
    git(&client, &["config", "user.name", "Test User"]);

    ServerClient {
        _tmp: tmp,
        server,
        client,
    }
}

/// Write a file, stage it, and commit with the given message.
/// Returns the new commit hash.
pub(crate) fn add_commit(repo: &Path, file: &str, content: &str, message: &str) -> String {
    std::fs::write(repo.join(file), content).unwrap();
    git(repo, &["add", file]);
    git(repo, &["commit", "-q", "-m", message]);
    let out = Command::new("git")
        .current_dir(repo)
        .args(["rev-parse", "HEAD"])
        .output()
        .unwrap();
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}

fn init_repo(path: &Path) {
    git(path, &["init", "-q"]);
    // Deterministic default branch name across environments: set HEAD to
    // an unborn `main` branch before the first commit.
    git(path, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    git(path, &["config", "user.email", "test@example.com"]);
    git(path, &["config", "user.name", "Test User"]);

    std::fs::write(path.join("README.md"), "# Test\n").unwrap();
    git(path, &["add", "."]);
    git(path, &["commit", "-q", "-m", "Initial commit"]);
}

pub(crate) fn git(repo_dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .current_dir(repo_dir)
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("failed to execute git {}: {}", args.join(" "), e));

    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!(
            "git {} failed (exit code {:?})\nstdout:\n{}\nstderr:\n{}",
            args.join(" "),
            output.status.code(),
            stdout,
            stderr
        );
    }
}
