//! The integration pipeline for a single merge request
//!
//! Stages run strictly in order and the first failure ends the run:
//!
//! 1. **Parse** - read branch / target / worker from the description
//! 2. **Fetch** - bring source and effective target up to date
//! 3. **Conflict check** - dry-run integration
//! 4. **Test** - optional, up to `retry_flaky_tests + 1` attempts
//! 5. **Merge** - publish, recording the merge commit
//! 6. **Cleanup** - optional source branch deletion
//!
//! Nothing is published before step 5. A cleanup failure happens after the
//! merge is already public, so it is logged and the result stays a success.

use crate::config::MergeQueueConfig;
use crate::types::{MergeRequest, MrFields, ProcessResult, Stage};
use crate::vcs::{ConflictCheck, RebaseOutcome, Stages, TestOutcome};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Runs merge requests through the configured stages
pub struct Pipeline {
    stages: Stages,
    config: Arc<MergeQueueConfig>,
}

impl Pipeline {
    /// Create a pipeline
    pub const fn new(stages: Stages, config: Arc<MergeQueueConfig>) -> Self {
        Self { stages, config }
    }

    /// Effective target branch for parsed fields
    pub fn target_for<'a>(&'a self, fields: &'a MrFields) -> &'a str {
        fields.effective_target(&self.config.target_branch, self.config.integration_branches)
    }

    /// Run every stage for one merge request
    pub async fn process(&self, mr: &MergeRequest) -> ProcessResult {
        let fields = match mr.fields() {
            Ok(fields) => fields,
            Err(e) => return ProcessResult::failed(Stage::Parse, e.to_string()),
        };
        let target = self.target_for(&fields);
        let branch = fields.branch.as_str();
        info!(mr_id = %mr.id, branch, target, worker = %fields.worker, "integrating");

        if let Err(e) = self.stages.fetcher.fetch(branch, target).await {
            return ProcessResult::failed(Stage::Fetch, e.to_string());
        }

        match self.stages.conflicts.check_conflicts(branch, target).await {
            Ok(ConflictCheck::Clean) => debug!(mr_id = %mr.id, "no conflicts"),
            Ok(ConflictCheck::Conflicted { files }) => {
                return ProcessResult::Conflict {
                    error: conflict_message(branch, target, &files),
                    files,
                };
            }
            Err(e) => return ProcessResult::failed(Stage::ConflictCheck, e.to_string()),
        }

        if self.config.run_tests
            && let Some(failure) = self.run_tests(&mr.id, target).await
        {
            return failure;
        }

        let merge_commit = match self.stages.merger.merge(branch, target).await {
            Ok(sha) => sha,
            Err(e) => return ProcessResult::failed(Stage::Merge, e.to_string()),
        };
        info!(mr_id = %mr.id, merge_commit = %merge_commit, target, "merged");

        if self.config.delete_merged_branches
            && let Err(e) = self.stages.cleaner.delete_branch(branch).await
        {
            warn!(mr_id = %mr.id, branch, error = %e, "failed to delete merged branch");
        }

        ProcessResult::Merged { merge_commit }
    }

    /// Best-of-N test attempts; `None` means the tests passed
    async fn run_tests(&self, id: &str, target: &str) -> Option<ProcessResult> {
        let attempts = self.config.test_attempts();
        let command = self.config.test_command.as_str();
        let mut last_output = String::new();

        for attempt in 1..=attempts {
            match self.stages.tests.run_tests(command, target).await {
                Ok(TestOutcome::Passed) => {
                    if attempt > 1 {
                        info!(mr_id = id, attempt, "tests passed on retry");
                    }
                    return None;
                }
                Ok(TestOutcome::Failed { output }) => {
                    warn!(mr_id = id, attempt, attempts, "tests failed");
                    last_output = output;
                }
                Err(e) => return Some(ProcessResult::failed(Stage::Test, e.to_string())),
            }
        }

        let mut error = format!("tests failed after {attempts} attempt(s)");
        if !last_output.trim().is_empty() {
            error.push_str(":\n");
            error.push_str(last_output.trim_end());
        }
        Some(ProcessResult::TestsFailed { error, attempts })
    }

    /// Rebase the source branch onto its effective target
    ///
    /// Returns `None` when the branch was rebased and published, otherwise
    /// the failure that ends the automated attempt.
    pub async fn rebase(&self, mr: &MergeRequest) -> Option<ProcessResult> {
        let fields = match mr.fields() {
            Ok(fields) => fields,
            Err(e) => return Some(ProcessResult::failed(Stage::Parse, e.to_string())),
        };
        let target = self.target_for(&fields);
        info!(mr_id = %mr.id, branch = %fields.branch, onto = target, "rebasing");

        match self.stages.rebaser.rebase(&fields.branch, target).await {
            Ok(RebaseOutcome::Rebased) => None,
            Ok(RebaseOutcome::Conflicted { files }) => Some(ProcessResult::Conflict {
                error: format!(
                    "automatic rebase of {} onto {target} stopped on conflicts",
                    fields.branch
                ),
                files,
            }),
            Err(e) => Some(ProcessResult::failed(Stage::Rebase, e.to_string())),
        }
    }
}

fn conflict_message(branch: &str, target: &str, files: &[String]) -> String {
    if files.is_empty() {
        format!("merge conflict integrating {branch} into {target}")
    } else {
        format!(
            "merge conflict integrating {branch} into {target}: {}",
            files.join(", ")
        )
    }
}
