//! `git` CLI implementation of the pipeline stages
//!
//! Every effective target gets its own worktree under
//! `<rig>/.refinery/worktrees/`, so pipelines holding different target
//! slots never share a checkout. Operations that touch the shared object
//! store or worktree list are serialized by an internal lock.

use crate::error::{Error, Result};
use crate::vcs::{
    BranchCleaner, ConflictCheck, ConflictChecker, Fetcher, Merger, RebaseOutcome, Rebaser,
    TestOutcome, TestRunner,
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Default remote name
const DEFAULT_REMOTE: &str = "origin";

/// Directory for refinery metadata inside the rig
pub const REFINERY_DIR: &str = ".refinery";

/// Maximum bytes of test output kept in a failure diagnostic
const OUTPUT_TAIL: usize = 4000;

/// Git-backed implementation of every pipeline stage
pub struct GitWorkspace {
    repo: PathBuf,
    remote: String,
    worktrees: PathBuf,
    identity: Option<(String, String)>,
    shared: Mutex<()>,
}

impl GitWorkspace {
    /// Open the clone at `repo` using the `origin` remote
    pub fn new(repo: &Path) -> Self {
        Self {
            repo: repo.to_path_buf(),
            remote: DEFAULT_REMOTE.to_string(),
            worktrees: repo.join(REFINERY_DIR).join("worktrees"),
            identity: None,
            shared: Mutex::new(()),
        }
    }

    /// Use a different remote
    #[must_use]
    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    /// Commit as the given identity instead of the user's git config
    #[must_use]
    pub fn with_identity(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.identity = Some((name.into(), email.into()));
        self
    }

    fn remote_ref(&self, branch: &str) -> String {
        format!("{}/{branch}", self.remote)
    }

    async fn git_output(&self, dir: &Path, args: &[&str]) -> Result<Output> {
        debug!(dir = %dir.display(), ?args, "running git");
        let mut cmd = Command::new("git");
        cmd.args(args).current_dir(dir);
        if let Some((ref name, ref email)) = self.identity {
            cmd.env("GIT_AUTHOR_NAME", name)
                .env("GIT_AUTHOR_EMAIL", email)
                .env("GIT_COMMITTER_NAME", name)
                .env("GIT_COMMITTER_EMAIL", email);
        }
        cmd.output()
            .await
            .map_err(|e| Error::Vcs(format!("failed to run git: {e}")))
    }

    async fn git(&self, dir: &Path, args: &[&str]) -> Result<String> {
        let output = self.git_output(dir, args).await?;
        if !output.status.success() {
            return Err(Error::Vcs(format!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn unmerged_paths(&self, dir: &Path) -> Result<Vec<String>> {
        let out = self
            .git(dir, &["diff", "--name-only", "--diff-filter=U"])
            .await?;
        Ok(out.lines().map(ToString::to_string).collect())
    }

    /// Worktree dedicated to `target`, created on first use
    async fn worktree(&self, target: &str) -> Result<PathBuf> {
        let path = self.worktrees.join(worktree_name(target));
        if path.exists() {
            return Ok(path);
        }

        let _guard = self.shared.lock().await;
        if !path.exists() {
            tokio::fs::create_dir_all(&self.worktrees).await?;
            let path_str = path.to_string_lossy().into_owned();
            self.git(
                &self.repo,
                &["worktree", "add", "--detach", &path_str, &self.remote_ref(target)],
            )
            .await?;
            info!(target, path = %path.display(), "created worktree");
        }
        Ok(path)
    }

    /// Reset a worktree to a clean detached checkout of `start`
    async fn reset_to(&self, dir: &Path, start: &str) -> Result<()> {
        self.git(dir, &["checkout", "--force", "--detach", start])
            .await?;
        self.git(dir, &["clean", "-fd"]).await?;
        Ok(())
    }
}

/// Directory name for a target's worktree
///
/// Percent-encoded so distinct targets never share a checkout.
fn worktree_name(target: &str) -> String {
    urlencoding::encode(target).into_owned()
}

/// Keep the end of long command output
fn output_tail(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    let text = text.trim();
    if text.len() <= OUTPUT_TAIL {
        return text.to_string();
    }
    let mut start = text.len() - OUTPUT_TAIL;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &text[start..])
}

#[async_trait]
impl Fetcher for GitWorkspace {
    async fn fetch(&self, branch: &str, target: &str) -> Result<()> {
        let _guard = self.shared.lock().await;
        self.git(&self.repo, &["fetch", "--prune", &self.remote, branch, target])
            .await?;
        debug!(branch, target, "fetched");
        Ok(())
    }
}

#[async_trait]
impl ConflictChecker for GitWorkspace {
    async fn check_conflicts(&self, branch: &str, target: &str) -> Result<ConflictCheck> {
        let dir = self.worktree(target).await?;
        self.reset_to(&dir, &self.remote_ref(target)).await?;

        let message = format!("Merge branch '{branch}' into {target}");
        let source = self.remote_ref(branch);
        let output = self
            .git_output(&dir, &["merge", "--no-ff", "--no-edit", "-m", &message, &source])
            .await?;
        if output.status.success() {
            return Ok(ConflictCheck::Clean);
        }

        let files = self.unmerged_paths(&dir).await?;
        // Abort failures only matter if there was a merge in progress
        let _ = self.git(&dir, &["merge", "--abort"]).await;
        if files.is_empty() {
            return Err(Error::Vcs(format!(
                "git merge {source} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        debug!(branch, target, ?files, "merge conflicts");
        Ok(ConflictCheck::Conflicted { files })
    }
}

#[async_trait]
impl TestRunner for GitWorkspace {
    async fn run_tests(&self, command: &str, target: &str) -> Result<TestOutcome> {
        if command.trim().is_empty() {
            debug!(target, "no test command configured");
            return Ok(TestOutcome::Passed);
        }
        let dir = self.worktree(target).await?;
        let output = Command::new("sh")
            .args(["-c", command])
            .current_dir(&dir)
            .output()
            .await
            .map_err(|e| Error::Vcs(format!("failed to run test command: {e}")))?;

        if output.status.success() {
            Ok(TestOutcome::Passed)
        } else {
            Ok(TestOutcome::Failed {
                output: output_tail(&output),
            })
        }
    }
}

#[async_trait]
impl Merger for GitWorkspace {
    async fn merge(&self, branch: &str, target: &str) -> Result<String> {
        let dir = self.worktree(target).await?;
        let sha = self.git(&dir, &["rev-parse", "HEAD"]).await?;
        let refspec = format!("HEAD:refs/heads/{target}");
        self.git(&dir, &["push", &self.remote, &refspec]).await?;
        info!(branch, target, %sha, "pushed merge");
        Ok(sha)
    }
}

#[async_trait]
impl BranchCleaner for GitWorkspace {
    async fn delete_branch(&self, branch: &str) -> Result<()> {
        self.git(&self.repo, &["push", &self.remote, "--delete", branch])
            .await?;
        debug!(branch, "deleted remote branch");
        Ok(())
    }
}

#[async_trait]
impl Rebaser for GitWorkspace {
    async fn rebase(&self, branch: &str, onto: &str) -> Result<RebaseOutcome> {
        {
            let _guard = self.shared.lock().await;
            self.git(&self.repo, &["fetch", &self.remote, branch, onto])
                .await?;
        }
        let dir = self.worktree(onto).await?;
        self.reset_to(&dir, &self.remote_ref(branch)).await?;

        let output = self
            .git_output(&dir, &["rebase", &self.remote_ref(onto)])
            .await?;
        if !output.status.success() {
            let files = self.unmerged_paths(&dir).await?;
            let _ = self.git(&dir, &["rebase", "--abort"]).await;
            if files.is_empty() {
                return Err(Error::Vcs(format!(
                    "git rebase onto {onto} failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                )));
            }
            return Ok(RebaseOutcome::Conflicted { files });
        }

        let refspec = format!("HEAD:refs/heads/{branch}");
        self.git(
            &dir,
            &["push", "--force-with-lease", &self.remote, &refspec],
        )
        .await?;
        info!(branch, onto, "rebased and pushed");
        Ok(RebaseOutcome::Rebased)
    }
}
