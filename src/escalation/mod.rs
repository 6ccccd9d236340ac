//! Escalation of merge requests that keep failing
//!
//! The engine hands terminal or repeated failures to an [`Escalator`].
//! [`RoutingEscalator`] maps the severity to a configured list of action
//! strings and dispatches each recognized one:
//!
//! - `mail:<target>` - mail `<target>` through the [`Mailer`]
//! - `email:human`, `sms:human` - external contacts (logged as would-send)
//! - `slack` - post to the configured webhook
//! - `log` - warn-level log line
//! - `bead` - attach the escalation to the item in the tracker
//!
//! Unknown action strings are ignored.

mod config;
mod format;
mod stale;

pub use config::{EscalationConfig, EscalationContacts};
pub use format::{format_escalation_mail_body, format_reescalation_mail_body, format_relative_time};
pub use stale::{EscalationRecord, ReescalationResult, check_reescalation};

use crate::error::{Error, Result};
use crate::tracker::{Tracker, UpdateOptions};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Escalation severity, ordered from least to most urgent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational
    Low,
    /// Needs attention soon
    Medium,
    /// Needs attention now
    High,
    /// Absorbing ceiling
    Critical,
}

impl Severity {
    /// All severities, lowest first
    pub const ALL: [Self; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    /// Severity name
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Parse a severity name (exact, lowercase)
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == name)
    }

    /// One step up the ladder; critical stays critical
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::Low => Self::Medium,
            Self::Medium => Self::High,
            Self::High | Self::Critical => Self::Critical,
        }
    }

    /// Emoji used in mail subjects
    pub const fn emoji(self) -> &'static str {
        match self {
            Self::Critical => "🚨",
            Self::High => "⚠️",
            Self::Medium => "📢",
            Self::Low => "ℹ️",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Next severity for a severity name; unknown or empty names go straight to critical
pub fn next_severity(name: &str) -> Severity {
    Severity::parse(name).map_or(Severity::Critical, Severity::next)
}

/// Emoji for a severity name, with a neutral fallback
pub fn severity_emoji(name: &str) -> &'static str {
    Severity::parse(name).map_or("📋", Severity::emoji)
}

/// A recognized escalation action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Internal mail to a target
    Mail(String),
    /// Email the human contact
    EmailHuman,
    /// Text the human contact
    SmsHuman,
    /// Post to the Slack webhook
    Slack,
    /// Log the escalation
    Log,
    /// Record the escalation on the tracked item
    Bead,
}

impl Action {
    /// Parse an action string; unknown strings and empty mail targets yield `None`
    pub fn parse(action: &str) -> Option<Self> {
        if let Some(target) = action.strip_prefix("mail:") {
            return (!target.is_empty()).then(|| Self::Mail(target.to_string()));
        }
        match action {
            "email:human" => Some(Self::EmailHuman),
            "sms:human" => Some(Self::SmsHuman),
            "slack" => Some(Self::Slack),
            "log" => Some(Self::Log),
            "bead" => Some(Self::Bead),
            _ => None,
        }
    }
}

/// Mail targets named by `mail:<target>` actions, in order
///
/// The prefix match is case-sensitive and targets are not trimmed.
pub fn extract_mail_targets<S: AsRef<str>>(actions: &[S]) -> Vec<String> {
    actions
        .iter()
        .filter_map(|a| match Action::parse(a.as_ref()) {
            Some(Action::Mail(target)) => Some(target),
            _ => None,
        })
        .collect()
}

/// Sender identity from the environment lookup: `BD_ACTOR`, then `REFINERY_ROLE`
pub fn detect_sender<F>(lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    ["BD_ACTOR", "REFINERY_ROLE"]
        .into_iter()
        .filter_map(|key| lookup(key))
        .find(|v| !v.is_empty())
        .unwrap_or_default()
}

/// Sender identity from the process environment
pub fn detect_sender_from_env() -> String {
    detect_sender(|key| std::env::var(key).ok())
}

/// A request to escalate one item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationRequest {
    /// Item being escalated
    pub id: String,
    /// Severity to route on
    pub severity: Severity,
    /// Why the item is escalated
    pub reason: String,
    /// Who is escalating
    pub from: String,
    /// Related item, if any
    pub related: Option<String>,
    /// Set when this is an automatic bump of an earlier escalation
    pub reescalation: Option<ReescalationResult>,
}

impl EscalationRequest {
    /// Mail subject line
    pub fn subject(&self) -> String {
        format!(
            "{} [{}] Escalation: {}",
            self.severity.emoji(),
            self.severity.as_str().to_uppercase(),
            self.id
        )
    }

    /// Mail body
    pub fn body(&self) -> String {
        if let Some(ref bump) = self.reescalation {
            return format_reescalation_mail_body(bump, &self.from);
        }
        format_escalation_mail_body(
            &self.id,
            self.severity.as_str(),
            &self.reason,
            &self.from,
            self.related.as_deref().unwrap_or(""),
        )
    }
}

/// Terminal-failure hook invoked by the engine
#[async_trait]
pub trait Escalator: Send + Sync {
    /// Escalate one item
    async fn escalate(&self, request: &EscalationRequest) -> Result<()>;
}

/// Delivers internal mail
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send a message to a mail target
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

/// Mailer that only logs what it would send
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        info!(to, subject, body_len = body.len(), "mail");
        Ok(())
    }
}

/// Escalator that dispatches the configured route for each severity
pub struct RoutingEscalator {
    config: EscalationConfig,
    mailer: Arc<dyn Mailer>,
    tracker: Option<Arc<dyn Tracker>>,
    http: reqwest::Client,
}

impl RoutingEscalator {
    /// Create an escalator with the given routes and mailer
    pub fn new(config: EscalationConfig, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            config,
            mailer,
            tracker: None,
            http: reqwest::Client::new(),
        }
    }

    /// Record `bead` actions on items through this tracker
    #[must_use]
    pub fn with_tracker(mut self, tracker: Arc<dyn Tracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Routing configuration
    pub const fn config(&self) -> &EscalationConfig {
        &self.config
    }

    async fn dispatch(&self, action: &Action, request: &EscalationRequest) -> Result<()> {
        let contacts = &self.config.contacts;
        match action {
            Action::Mail(target) => {
                self.mailer
                    .send(target, &request.subject(), &request.body())
                    .await
            }
            Action::EmailHuman => {
                if contacts.human_email.is_empty() {
                    warn!(id = %request.id, "email:human requested but no human_email configured");
                } else {
                    info!(id = %request.id, to = %contacts.human_email, "would send escalation email");
                }
                Ok(())
            }
            Action::SmsHuman => {
                if contacts.human_sms.is_empty() {
                    warn!(id = %request.id, "sms:human requested but no human_sms configured");
                } else {
                    info!(id = %request.id, to = %contacts.human_sms, "would send escalation sms");
                }
                Ok(())
            }
            Action::Slack => {
                if contacts.slack_webhook.is_empty() {
                    warn!(id = %request.id, "slack requested but no slack_webhook configured");
                    return Ok(());
                }
                self.post_slack(request).await
            }
            Action::Log => {
                warn!(
                    id = %request.id,
                    severity = %request.severity,
                    reason = %request.reason,
                    "escalation"
                );
                Ok(())
            }
            Action::Bead => {
                let Some(ref tracker) = self.tracker else {
                    debug!(id = %request.id, "bead action without tracker, skipping");
                    return Ok(());
                };
                let notes = format!(
                    "escalated ({}) by {}: {}",
                    request.severity, request.from, request.reason
                );
                tracker
                    .update(&request.id, &UpdateOptions::default().with_notes(notes))
                    .await
            }
        }
    }

    async fn post_slack(&self, request: &EscalationRequest) -> Result<()> {
        let text = format!(
            "{} *{}* escalation `{}`: {}",
            request.severity.emoji(),
            request.severity,
            request.id,
            request.reason
        );
        self.http
            .post(&self.config.contacts.slack_webhook)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await?
            .error_for_status()
            .map_err(|e| Error::Escalation(format!("slack webhook failed: {e}")))?;
        debug!(id = %request.id, "posted slack escalation");
        Ok(())
    }
}

#[async_trait]
impl Escalator for RoutingEscalator {
    async fn escalate(&self, request: &EscalationRequest) -> Result<()> {
        let actions: Vec<Action> = self
            .config
            .route_for(request.severity)
            .iter()
            .filter_map(|a| Action::parse(a))
            .collect();
        info!(id = %request.id, severity = %request.severity, actions = actions.len(), "escalating");

        let mut failures = Vec::new();
        for action in &actions {
            if let Err(e) = self.dispatch(action, request).await {
                warn!(id = %request.id, ?action, error = %e, "escalation action failed");
                failures.push(e.to_string());
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Escalation(failures.join("; ")))
        }
    }
}
