//! Mail bodies for escalations

use super::ReescalationResult;
use chrono::{DateTime, Utc};
use std::fmt::Write;

fn push_instructions(body: &mut String, id: &str) {
    body.push_str("---\n");
    let _ = writeln!(body, "To acknowledge: bd update {id} --notes=acknowledged");
    let _ = writeln!(body, "To close: bd close {id} --reason=resolved");
}

/// Body of the first escalation mail for an item
///
/// The "Reason" block and "Related" line appear only when non-empty.
pub fn format_escalation_mail_body(
    id: &str,
    severity: &str,
    reason: &str,
    from: &str,
    related: &str,
) -> String {
    let mut body = String::new();
    let _ = writeln!(body, "Escalation ID: {id}");
    let _ = writeln!(body, "Severity: {severity}");
    let _ = writeln!(body, "From: {from}");
    body.push('\n');

    if !reason.is_empty() {
        body.push_str("Reason:\n");
        let _ = writeln!(body, "{reason}");
        body.push('\n');
    }
    if !related.is_empty() {
        let _ = writeln!(body, "Related: {related}");
        body.push('\n');
    }

    push_instructions(&mut body, id);
    body
}

/// Body of an automatic re-escalation mail
pub fn format_reescalation_mail_body(result: &ReescalationResult, reescalated_by: &str) -> String {
    let mut body = String::new();
    let _ = writeln!(body, "Escalation ID: {}", result.id);
    let _ = writeln!(
        body,
        "Severity bumped: {} → {}",
        result.old_severity, result.new_severity
    );
    let _ = writeln!(body, "Reescalation #{}", result.reescalation_num);
    let _ = writeln!(body, "Reescalated by: {reescalated_by}");
    body.push('\n');
    body.push_str(
        "This escalation was not acknowledged within the stale threshold \
         and has been automatically re-escalated.\n\n",
    );
    push_instructions(&mut body, &result.id);
    body
}

/// Human-readable age of an RFC 3339 timestamp relative to `now`
///
/// Unparseable input is returned unchanged.
pub fn format_relative_time(timestamp: &str, now: DateTime<Utc>) -> String {
    let Ok(then) = DateTime::parse_from_rfc3339(timestamp) else {
        return timestamp.to_string();
    };
    let secs = (now - then.with_timezone(&Utc)).num_seconds();

    let plural = |n: i64, unit: &str| {
        if n == 1 {
            format!("1 {unit} ago")
        } else {
            format!("{n} {unit}s ago")
        }
    };

    match secs {
        s if s < 60 => "just now".to_string(),
        s if s < 3600 => plural(s / 60, "minute"),
        s if s < 86_400 => plural(s / 3600, "hour"),
        s => plural(s / 86_400, "day"),
    }
}
