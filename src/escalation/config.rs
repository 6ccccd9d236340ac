//! Escalation routing configuration, stored in `<rig>/settings/escalation.json`.

use super::Severity;
use crate::config::parse_duration;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default time before an unacknowledged escalation is bumped
const DEFAULT_STALE_THRESHOLD: Duration = Duration::from_secs(4 * 60 * 60);

/// External contacts for `email:human`, `sms:human` and `slack` actions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationContacts {
    /// Human email address
    #[serde(default)]
    pub human_email: String,
    /// Human phone number
    #[serde(default)]
    pub human_sms: String,
    /// Slack incoming webhook URL
    #[serde(default)]
    pub slack_webhook: String,
}

/// Severity routes and re-escalation policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationConfig {
    /// Actions per severity name
    #[serde(default = "default_routes")]
    pub routes: BTreeMap<String, Vec<String>>,
    /// External contacts
    #[serde(default)]
    pub contacts: EscalationContacts,
    /// Age after which an unacknowledged escalation is bumped (duration string)
    #[serde(default = "default_stale_threshold")]
    pub stale_threshold: String,
    /// Maximum automatic re-escalations per item
    #[serde(default = "default_max_reescalations")]
    pub max_reescalations: u32,
}

fn default_routes() -> BTreeMap<String, Vec<String>> {
    let route = |actions: &[&str]| -> Vec<String> {
        actions.iter().map(ToString::to_string).collect()
    };
    BTreeMap::from([
        ("low".to_string(), route(&["bead"])),
        ("medium".to_string(), route(&["bead", "mail:mayor"])),
        (
            "high".to_string(),
            route(&["bead", "mail:mayor", "email:human"]),
        ),
        (
            "critical".to_string(),
            route(&["bead", "mail:mayor", "email:human", "sms:human", "log"]),
        ),
    ])
}

fn default_stale_threshold() -> String {
    "4h".to_string()
}

const fn default_max_reescalations() -> u32 {
    2
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            routes: default_routes(),
            contacts: EscalationContacts::default(),
            stale_threshold: default_stale_threshold(),
            max_reescalations: default_max_reescalations(),
        }
    }
}

impl EscalationConfig {
    /// Path of the escalation settings for a rig
    pub fn path(rig: &Path) -> PathBuf {
        rig.join("settings").join("escalation.json")
    }

    /// Load settings, writing the defaults first if the file does not exist
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Self::default();
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir).map_err(|e| {
                    Error::Config(format!("failed to create {}: {e}", dir.display()))
                })?;
            }
            let content = serde_json::to_string_pretty(&config)?;
            fs::write(path, content + "\n")
                .map_err(|e| Error::Config(format!("failed to write {}: {e}", path.display())))?;
            return Ok(config);
        }

        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.display())))?;
        parse_duration(&config.stale_threshold).map_err(|e| {
            Error::Config(format!(
                "invalid stale_threshold {:?}: {e}",
                config.stale_threshold
            ))
        })?;
        Ok(config)
    }

    /// Actions configured for a severity
    pub fn route_for(&self, severity: Severity) -> &[String] {
        self.routes
            .get(severity.as_str())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Stale threshold as a duration
    pub fn stale_threshold(&self) -> Duration {
        parse_duration(&self.stale_threshold).unwrap_or(DEFAULT_STALE_THRESHOLD)
    }
}
