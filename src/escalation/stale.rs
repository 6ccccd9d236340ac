//! Stale-threshold re-escalation

use super::Severity;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Escalation state kept for one item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationRecord {
    /// Escalated item
    pub id: String,
    /// Current severity
    pub severity: Severity,
    /// When the item was last escalated or re-escalated
    pub escalated_at: DateTime<Utc>,
    /// Whether someone acknowledged the escalation
    pub acknowledged: bool,
    /// Automatic re-escalations so far
    pub reescalations: u32,
}

impl EscalationRecord {
    /// New record for a first escalation
    pub fn new(id: impl Into<String>, severity: Severity, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            severity,
            escalated_at: now,
            acknowledged: false,
            reescalations: 0,
        }
    }

    /// Stop further automatic re-escalation
    pub fn acknowledge(&mut self) {
        self.acknowledged = true;
    }

    /// Apply a non-skipped re-escalation
    pub fn apply(&mut self, result: &ReescalationResult, now: DateTime<Utc>) {
        if result.skipped {
            return;
        }
        self.severity = result.new_severity;
        self.reescalations = result.reescalation_num;
        self.escalated_at = now;
    }
}

/// Outcome of a re-escalation check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReescalationResult {
    /// Item checked
    pub id: String,
    /// Severity before the check
    pub old_severity: Severity,
    /// Severity after the check (unchanged when skipped)
    pub new_severity: Severity,
    /// Ordinal of this re-escalation
    pub reescalation_num: u32,
    /// Whether the bump was skipped
    pub skipped: bool,
    /// Why it was skipped
    pub skip_reason: Option<String>,
}

/// Decide whether an escalation should be bumped one severity step
pub fn check_reescalation(
    record: &EscalationRecord,
    now: DateTime<Utc>,
    stale_threshold: Duration,
    max_reescalations: u32,
) -> ReescalationResult {
    let skip = |reason: &str| ReescalationResult {
        id: record.id.clone(),
        old_severity: record.severity,
        new_severity: record.severity,
        reescalation_num: record.reescalations,
        skipped: true,
        skip_reason: Some(reason.to_string()),
    };

    if record.acknowledged {
        return skip("acknowledged");
    }
    if record.severity == Severity::Critical {
        return skip("already at critical");
    }
    if record.reescalations >= max_reescalations {
        return skip("max reescalations reached");
    }
    let age = (now - record.escalated_at).to_std().unwrap_or_default();
    if age < stale_threshold {
        return skip("not stale");
    }

    ReescalationResult {
        id: record.id.clone(),
        old_severity: record.severity,
        new_severity: record.severity.next(),
        reescalation_num: record.reescalations + 1,
        skipped: false,
        skip_reason: None,
    }
}
