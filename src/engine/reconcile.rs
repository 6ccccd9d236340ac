//! Mapping pipeline results back onto the tracker
//!
//! Success closes the item with the merge commit in the reason. Failure
//! reopens it with the diagnostic attached and hands it back to the worker.
//! Neither path returns an error: tracker failures here are logged, and a
//! failed close never turns into a reopen. The caller is told whether the
//! item left `in_progress` so an unreopened item keeps its claim.
//!
//! Failures are also counted per item. Unparseable items escalate right
//! away; items that keep failing escalate once they reach the threshold and
//! are bumped one severity step each time the previous escalation goes
//! stale, until someone acknowledges it in the item's notes.

use crate::escalation::{
    EscalationRecord, EscalationRequest, Escalator, Severity, check_reescalation,
};
use crate::tracker::{Tracker, UpdateOptions};
use crate::types::{IssueStatus, MergeRequest, ProcessResult, Stage};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{error, info, warn};

/// When and how repeated failures are escalated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscalationPolicy {
    /// Failures before a non-parse failure is escalated
    pub after_failures: u32,
    /// Age after which an unacknowledged escalation is bumped
    pub stale_threshold: Duration,
    /// Maximum automatic bumps per item
    pub max_reescalations: u32,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            after_failures: 3,
            stale_threshold: Duration::from_secs(4 * 60 * 60),
            max_reescalations: 2,
        }
    }
}

#[derive(Debug, Default)]
struct FailureRecord {
    failures: u32,
    escalation: Option<EscalationRecord>,
}

/// Applies pipeline results to the tracker
pub struct Reconciler {
    tracker: Arc<dyn Tracker>,
    escalator: Option<Arc<dyn Escalator>>,
    policy: EscalationPolicy,
    sender: String,
    failures: Mutex<HashMap<String, FailureRecord>>,
}

impl Reconciler {
    /// Create a reconciler without escalation
    pub fn new(tracker: Arc<dyn Tracker>) -> Self {
        Self {
            tracker,
            escalator: None,
            policy: EscalationPolicy::default(),
            sender: "refinery".to_string(),
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Escalate repeated failures through `escalator`
    #[must_use]
    pub fn with_escalator(mut self, escalator: Arc<dyn Escalator>, policy: EscalationPolicy) -> Self {
        self.escalator = Some(escalator);
        self.policy = policy;
        self
    }

    /// Identity used as the sender of escalations
    #[must_use]
    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        let sender = sender.into();
        if !sender.is_empty() {
            self.sender = sender;
        }
        self
    }

    /// Apply a terminal result for one item
    ///
    /// Returns false only when a failed item could not be reopened, in which
    /// case it is still `in_progress` in the tracker.
    pub async fn reconcile(&self, mr: &MergeRequest, result: &ProcessResult) -> bool {
        if let Some(sha) = result.merge_commit() {
            self.close_merged(mr, sha).await;
            true
        } else {
            let reopened = self.assign_back(mr, result).await;
            self.record_failure(mr, result, Utc::now()).await;
            reopened
        }
    }

    async fn close_merged(&self, mr: &MergeRequest, sha: &str) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&mr.id);

        let reason = format!("merged: {sha}");
        match self.tracker.close_with_reason(&reason, &[mr.id.as_str()]).await {
            Ok(()) => info!(mr_id = %mr.id, merge_commit = sha, "closed"),
            Err(e) => warn!(mr_id = %mr.id, merge_commit = sha, error = %e, "merged but failed to close"),
        }
    }

    async fn assign_back(&self, mr: &MergeRequest, result: &ProcessResult) -> bool {
        warn!(mr_id = %mr.id, error = %result.error(), "merge request failed");

        let mut update =
            UpdateOptions::status(IssueStatus::Open).with_notes(diagnostic(result));
        if let Ok(fields) = mr.fields() {
            update = update.with_assignee(fields.worker);
        }
        match self.tracker.update(&mr.id, &update).await {
            Ok(()) => true,
            Err(e) => {
                error!(mr_id = %mr.id, error = %e, "failed to reopen merge request");
                false
            }
        }
    }

    async fn record_failure(&self, mr: &MergeRequest, result: &ProcessResult, now: DateTime<Utc>) {
        let Some(ref escalator) = self.escalator else {
            return;
        };
        let Some(request) = self.next_escalation(mr, result, now) else {
            return;
        };
        if let Err(e) = escalator.escalate(&request).await {
            warn!(mr_id = %mr.id, severity = %request.severity, error = %e, "escalation failed");
        }
    }

    /// Forget failure history for items no longer in `ready`
    ///
    /// Items closed or claimed outside the engine drop out of the ready
    /// list and their counts start over if they ever come back.
    pub fn retain_failures(&self, ready: &[MergeRequest]) {
        let present: HashSet<&str> = ready.iter().map(|mr| mr.id.as_str()).collect();
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|id, _| present.contains(id.as_str()));
    }

    /// Update the failure record and decide whether to escalate
    fn next_escalation(
        &self,
        mr: &MergeRequest,
        result: &ProcessResult,
        now: DateTime<Utc>,
    ) -> Option<EscalationRequest> {
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        let record = failures.entry(mr.id.clone()).or_default();
        record.failures += 1;
        if mr.is_acknowledged()
            && let Some(ref mut escalation) = record.escalation
            && !escalation.acknowledged
        {
            info!(mr_id = %mr.id, "escalation acknowledged, not re-escalating");
            escalation.acknowledge();
        }

        let parse_failure = matches!(
            result,
            ProcessResult::Failed {
                stage: Stage::Parse,
                ..
            }
        );

        let (severity, reason, reescalation) = match record.escalation {
            None if parse_failure => (
                Severity::High,
                format!("merge request cannot be processed: {}", result.error()),
                None,
            ),
            None if record.failures >= self.policy.after_failures => (
                Severity::Medium,
                format!(
                    "merge request failed {} times; last error: {}",
                    record.failures,
                    result.error()
                ),
                None,
            ),
            None => return None,
            Some(ref mut escalation) => {
                let bump = check_reescalation(
                    escalation,
                    now,
                    self.policy.stale_threshold,
                    self.policy.max_reescalations,
                );
                if bump.skipped {
                    return None;
                }
                escalation.apply(&bump, now);
                (
                    bump.new_severity,
                    format!(
                        "re-escalation #{} after {} failures; last error: {}",
                        bump.reescalation_num,
                        record.failures,
                        result.error()
                    ),
                    Some(bump),
                )
            }
        };

        if record.escalation.is_none() {
            record.escalation = Some(EscalationRecord::new(mr.id.clone(), severity, now));
        }

        let related = mr.fields().ok().and_then(|f| f.source_issue);
        Some(EscalationRequest {
            id: mr.id.clone(),
            severity,
            reason,
            from: self.sender.clone(),
            related,
            reescalation,
        })
    }
}

/// Note attached to an item handed back after a failure
fn diagnostic(result: &ProcessResult) -> String {
    match result {
        ProcessResult::Merged { .. } => String::new(),
        ProcessResult::Conflict { error, .. } => {
            format!("merge conflict, rebase onto the target and resubmit: {error}")
        }
        ProcessResult::TestsFailed { error, .. } => format!("tests failed: {error}"),
        ProcessResult::Failed { stage, error } => format!("{stage} failed: {error}"),
    }
}
