//! Temporary git rig for tests that exercise the real `git` CLI
//!
//! Layout: a bare `remote.git` and a `rig` clone whose `origin` points at
//! it, with an initial commit on `main`.

use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// Whether a usable `git` is on `PATH`
pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .is_ok_and(|o| o.status.success())
}

/// A bare remote plus a clone acting as the rig
pub struct TempGitRig {
    _dir: TempDir,
    remote: PathBuf,
    rig: PathBuf,
}

impl TempGitRig {
    /// Create the remote and clone, with `README.md` committed on `main`
    pub fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let remote = dir.path().join("remote.git");
        let rig = dir.path().join("rig");

        run(dir.path(), &["init", "--bare", "remote.git"]);
        run(dir.path(), &["clone", "remote.git", "rig"]);
        run(&rig, &["checkout", "-b", "main"]);

        let this = Self {
            _dir: dir,
            remote,
            rig,
        };
        this.commit_file("README.md", "hello\n", "initial commit");
        run(&this.rig, &["push", "origin", "main"]);
        this
    }

    /// Rig clone path
    pub fn path(&self) -> &Path {
        &self.rig
    }

    /// Commit a file on the current branch
    pub fn commit_file(&self, name: &str, content: &str, message: &str) {
        std::fs::write(self.rig.join(name), content).expect("write file");
        run(&self.rig, &["add", name]);
        run(
            &self.rig,
            &[
                "-c",
                "user.name=Test",
                "-c",
                "user.email=test@example.com",
                "commit",
                "-m",
                message,
            ],
        );
    }

    /// Create `branch` from `from`, commit a file on it and push it
    pub fn push_branch(&self, branch: &str, from: &str, file: &str, content: &str) {
        run(&self.rig, &["checkout", "-B", branch, from]);
        self.commit_file(file, content, &format!("change {file}"));
        run(&self.rig, &["push", "--force", "origin", branch]);
        run(&self.rig, &["checkout", "main"]);
    }

    /// Tip of a branch in the remote
    pub fn remote_sha(&self, branch: &str) -> Option<String> {
        let output = Command::new("git")
            .args(["rev-parse", "--verify", "--quiet", &format!("refs/heads/{branch}")])
            .current_dir(&self.remote)
            .output()
            .expect("run git");
        output
            .status
            .success()
            .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// File content at a branch tip in the remote
    pub fn remote_file(&self, branch: &str, file: &str) -> Option<String> {
        let output = Command::new("git")
            .args(["show", &format!("{branch}:{file}")])
            .current_dir(&self.remote)
            .output()
            .expect("run git");
        output
            .status
            .success()
            .then(|| String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn run(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("run git");
    assert!(
        output.status.success(),
        "git {} failed: {}",
        args.join(" "),
        String::from_utf8_lossy(&output.stderr)
    );
}
