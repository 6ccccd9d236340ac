//! `bd` CLI tracker implementation

use crate::error::{Error, Result};
use crate::tracker::{Tracker, UpdateOptions};
use crate::types::MergeRequest;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

/// Default tracker binary name
const BD_BINARY: &str = "bd";

/// Tracker backed by the `bd` issue CLI, run inside the rig
pub struct BdTracker {
    rig: PathBuf,
    binary: String,
}

impl BdTracker {
    /// Create a tracker for a rig using `bd` from `PATH`
    pub fn new(rig: &Path) -> Self {
        Self::with_binary(rig, BD_BINARY)
    }

    /// Create a tracker using an explicit binary
    pub fn with_binary(rig: &Path, binary: impl Into<String>) -> Self {
        Self {
            rig: rig.to_path_buf(),
            binary: binary.into(),
        }
    }

    async fn run(&self, args: &[String]) -> Result<String> {
        debug!(binary = %self.binary, ?args, "running tracker command");
        let output = Command::new(&self.binary)
            .args(args)
            .current_dir(&self.rig)
            .output()
            .await
            .map_err(|e| Error::Tracker(format!("failed to run {}: {e}", self.binary)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Tracker(format!(
                "{} {} failed: {}",
                self.binary,
                args.first().map_or("", String::as_str),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Parse `bd ready --json` output, keeping items of `kind` in tracker order
fn parse_ready_output(stdout: &str, kind: &str) -> Result<Vec<MergeRequest>> {
    if stdout.trim().is_empty() {
        return Ok(Vec::new());
    }
    let items: Vec<MergeRequest> = serde_json::from_str(stdout)
        .map_err(|e| Error::Tracker(format!("failed to parse ready output: {e}")))?;
    Ok(items.into_iter().filter(|i| i.issue_type == kind).collect())
}

fn update_args(id: &str, options: &UpdateOptions) -> Vec<String> {
    let mut args = vec!["update".to_string(), id.to_string()];
    if let Some(status) = options.status {
        args.push(format!("--status={status}"));
    }
    if let Some(ref assignee) = options.assignee {
        args.push(format!("--assignee={assignee}"));
    }
    if let Some(ref notes) = options.notes {
        args.push(format!("--notes={notes}"));
    }
    args
}

fn close_args(reason: &str, ids: &[&str]) -> Vec<String> {
    let mut args = vec!["close".to_string()];
    args.extend(ids.iter().map(ToString::to_string));
    args.push(format!("--reason={reason}"));
    args
}

#[async_trait]
impl Tracker for BdTracker {
    async fn ready_with_type(&self, kind: &str) -> Result<Vec<MergeRequest>> {
        let stdout = self
            .run(&["ready".to_string(), "--json".to_string()])
            .await?;
        let items = parse_ready_output(&stdout, kind)?;
        debug!(kind, count = items.len(), "listed ready items");
        Ok(items)
    }

    async fn update(&self, id: &str, options: &UpdateOptions) -> Result<()> {
        self.run(&update_args(id, options)).await?;
        debug!(id, status = ?options.status, "updated item");
        Ok(())
    }

    async fn close_with_reason(&self, reason: &str, ids: &[&str]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.run(&close_args(reason, ids)).await?;
        debug!(?ids, "closed items");
        Ok(())
    }
}
