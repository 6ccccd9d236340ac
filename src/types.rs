//! Core types for refinery

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tracker issue type for merge requests
pub const MERGE_REQUEST_KIND: &str = "merge-request";

/// Branch prefix marking a per-epic integration branch
pub const INTEGRATION_BRANCH_PREFIX: &str = "integration/";

/// Status of a tracked work item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    /// Ready to be picked up
    Open,
    /// Claimed by the engine
    InProgress,
    /// Terminal; never re-claimed
    Closed,
}

impl IssueStatus {
    /// Wire name used by the tracker
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A merge request work item, as reported by the tracker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRequest {
    /// Tracker identifier
    pub id: String,
    /// Short title
    pub title: String,
    /// Free-form description carrying the structured field block
    #[serde(default)]
    pub description: String,
    /// Current status
    pub status: IssueStatus,
    /// Priority (higher is more urgent)
    #[serde(default)]
    pub priority: u32,
    /// Tracker issue type
    #[serde(default)]
    pub issue_type: String,
    /// Creation time; older items win priority ties
    pub created_at: DateTime<Utc>,
    /// Current assignee, if any
    #[serde(default)]
    pub assignee: Option<String>,
    /// Tracker notes; escalations are acknowledged here
    #[serde(default)]
    pub notes: Option<String>,
}

impl MergeRequest {
    /// Parse the structured field block from the description
    pub fn fields(&self) -> std::result::Result<MrFields, MissingFields> {
        MrFields::parse(&self.description)
    }

    /// Whether a human acknowledged the item's escalation
    ///
    /// Matches a notes line reading `acknowledged`, which is what the
    /// escalation mail asks the recipient to set.
    pub fn is_acknowledged(&self) -> bool {
        self.notes.as_deref().is_some_and(|notes| {
            notes
                .lines()
                .any(|line| line.trim().eq_ignore_ascii_case("acknowledged"))
        })
    }
}

/// Required description fields that were absent
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("missing merge request fields: {}", .0.join(", "))]
pub struct MissingFields(pub Vec<&'static str>);

/// Structured fields embedded in a merge request description
///
/// The block is a set of `key: value` lines; keys are case-insensitive
/// and lines that are not recognized keys are ignored:
///
/// ```text
/// branch: polecat/nux/feature-x
/// target: main
/// worker: nux
/// source_issue: gt-123
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MrFields {
    /// Source branch to integrate
    pub branch: String,
    /// Destination branch declared by the worker
    pub target: String,
    /// Identity of the agent that produced the branch
    pub worker: String,
    /// Work item the change was made for
    pub source_issue: Option<String>,
}

impl MrFields {
    /// Parse fields from a description block
    pub fn parse(description: &str) -> std::result::Result<Self, MissingFields> {
        let mut branch = None;
        let mut target = None;
        let mut worker = None;
        let mut source_issue = None;

        for line in description.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            let slot = match key.trim().to_ascii_lowercase().replace('-', "_").as_str() {
                "branch" => &mut branch,
                "target" => &mut target,
                "worker" => &mut worker,
                "source_issue" => &mut source_issue,
                _ => continue,
            };
            slot.get_or_insert_with(|| value.to_string());
        }

        let mut missing = Vec::new();
        if branch.is_none() {
            missing.push("branch");
        }
        if target.is_none() {
            missing.push("target");
        }
        if worker.is_none() {
            missing.push("worker");
        }
        if !missing.is_empty() {
            return Err(MissingFields(missing));
        }

        Ok(Self {
            branch: branch.unwrap_or_default(),
            target: target.unwrap_or_default(),
            worker: worker.unwrap_or_default(),
            source_issue,
        })
    }

    /// Branch this request actually integrates into
    ///
    /// Integration branches are only honored when enabled; every other
    /// declared target resolves to the configured target branch.
    pub fn effective_target<'a>(&'a self, target_branch: &'a str, integration_branches: bool) -> &'a str {
        if integration_branches && self.target.starts_with(INTEGRATION_BRANCH_PREFIX) {
            &self.target
        } else {
            target_branch
        }
    }
}

/// Pipeline stage, used to attribute generic failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Description field parsing
    Parse,
    /// Fetching source and target
    Fetch,
    /// Dry-run integration
    ConflictCheck,
    /// Test command execution
    Test,
    /// Finalizing the merge
    Merge,
    /// Deleting the merged branch
    Cleanup,
    /// Automated rebase before resubmission
    Rebase,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Parse => "parse",
            Self::Fetch => "fetch",
            Self::ConflictCheck => "conflict-check",
            Self::Test => "test",
            Self::Merge => "merge",
            Self::Cleanup => "cleanup",
            Self::Rebase => "rebase",
        };
        f.write_str(name)
    }
}

/// Outcome of running one merge request through the pipeline
///
/// Exactly one variant characterizes a terminal result, so the
/// success / conflict / tests-failed / other flags can never disagree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessResult {
    /// Merged; carries the merge commit reference
    Merged {
        /// Merge commit id
        merge_commit: String,
    },
    /// Source does not integrate cleanly into the target
    Conflict {
        /// Diagnostic message
        error: String,
        /// Conflicting paths, when the VCS reported them
        files: Vec<String>,
    },
    /// Every test attempt failed
    TestsFailed {
        /// Diagnostic message
        error: String,
        /// Number of attempts made
        attempts: u32,
    },
    /// Any other stage failure
    Failed {
        /// Stage that failed
        stage: Stage,
        /// Diagnostic message
        error: String,
    },
}

impl ProcessResult {
    /// Generic failure at a stage
    pub fn failed(stage: Stage, error: impl Into<String>) -> Self {
        Self::Failed {
            stage,
            error: error.into(),
        }
    }

    /// Whether the merge happened
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Merged { .. })
    }

    /// Whether the failure was a merge conflict
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Whether the failure was a test failure
    pub const fn tests_failed(&self) -> bool {
        matches!(self, Self::TestsFailed { .. })
    }

    /// Merge commit reference (success only)
    pub fn merge_commit(&self) -> Option<&str> {
        match self {
            Self::Merged { merge_commit } => Some(merge_commit),
            _ => None,
        }
    }

    /// Human-readable error (empty on success)
    pub fn error(&self) -> &str {
        match self {
            Self::Merged { .. } => "",
            Self::Conflict { error, .. }
            | Self::TestsFailed { error, .. }
            | Self::Failed { error, .. } => error,
        }
    }
}
