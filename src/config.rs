//! Merge queue configuration
//!
//! The rig's `config.json` may carry a `merge_queue` section. Every key in
//! it is optional and overrides only its own default; a missing file or
//! section yields [`MergeQueueConfig::default`].

use crate::error::{Error, Result};
use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::warn;

/// Filename of the rig configuration document
pub const CONFIG_FILE: &str = "config.json";

/// Strategy applied when a merge request fails to integrate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictStrategy {
    /// Reopen the item so its worker (or a later cycle) can address it
    #[default]
    AssignBack,
    /// Rebase onto the current target and resubmit once before assigning back
    AutoRebase,
}

impl ConflictStrategy {
    /// Parse a strategy name, `None` if unrecognized
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "assign_back" => Some(Self::AssignBack),
            "auto_rebase" => Some(Self::AutoRebase),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AssignBack => write!(f, "assign_back"),
            Self::AutoRebase => write!(f, "auto_rebase"),
        }
    }
}

/// Resolved merge queue configuration
///
/// Produced once by [`MergeQueueConfig::load`] and handed to the engine;
/// reconfiguring means loading a new value, never mutating this one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeQueueConfig {
    /// Whether the merge queue is active
    pub enabled: bool,
    /// Default branch to merge into
    pub target_branch: String,
    /// Whether per-epic integration branches are honored
    pub integration_branches: bool,
    /// Raw conflict strategy name; resolved by [`Self::conflict_strategy`]
    pub on_conflict: String,
    /// Whether to run tests before merging
    pub run_tests: bool,
    /// Test command, run through `sh -c`
    pub test_command: String,
    /// Whether to delete source branches after merge
    pub delete_merged_branches: bool,
    /// Extra test attempts after the first failure
    pub retry_flaky_tests: u32,
    /// Time between processing cycles
    pub poll_interval: Duration,
    /// Upper bound on simultaneously processed merge requests
    pub max_concurrent: usize,
}

impl Default for MergeQueueConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            target_branch: "main".to_string(),
            integration_branches: true,
            on_conflict: "assign_back".to_string(),
            run_tests: true,
            test_command: String::new(),
            delete_merged_branches: true,
            retry_flaky_tests: 1,
            poll_interval: Duration::from_secs(30),
            max_concurrent: 1,
        }
    }
}

#[derive(Deserialize)]
struct RawConfig {
    merge_queue: Option<RawMergeQueue>,
}

#[derive(Deserialize)]
struct RawMergeQueue {
    enabled: Option<bool>,
    target_branch: Option<String>,
    integration_branches: Option<bool>,
    on_conflict: Option<String>,
    run_tests: Option<bool>,
    test_command: Option<String>,
    delete_merged_branches: Option<bool>,
    retry_flaky_tests: Option<u32>,
    poll_interval: Option<String>,
    max_concurrent: Option<usize>,
}

impl MergeQueueConfig {
    /// Path of the configuration document for a rig
    pub fn path(rig: &Path) -> PathBuf {
        rig.join(CONFIG_FILE)
    }

    /// Load configuration for a rig
    ///
    /// A missing file yields defaults; any other read failure is an error.
    pub fn load(rig: &Path) -> Result<Self> {
        let path = Self::path(rig);
        match fs::read_to_string(&path) {
            Ok(content) => Self::from_json(&content),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(Error::Config(format!(
                "failed to read {}: {e}",
                path.display()
            ))),
        }
    }

    /// Resolve configuration from a JSON document
    pub fn from_json(content: &str) -> Result<Self> {
        let raw: RawConfig = serde_json::from_str(content)
            .map_err(|e| Error::Config(format!("failed to parse config: {e}")))?;

        let mut config = Self::default();
        if let Some(section) = raw.merge_queue {
            config.overlay(section)?;
        }
        Ok(config)
    }

    fn overlay(&mut self, raw: RawMergeQueue) -> Result<()> {
        if let Some(v) = raw.enabled {
            self.enabled = v;
        }
        if let Some(v) = raw.target_branch {
            self.target_branch = v;
        }
        if let Some(v) = raw.integration_branches {
            self.integration_branches = v;
        }
        if let Some(v) = raw.on_conflict {
            self.on_conflict = v;
        }
        if let Some(v) = raw.run_tests {
            self.run_tests = v;
        }
        if let Some(v) = raw.test_command {
            self.test_command = v;
        }
        if let Some(v) = raw.delete_merged_branches {
            self.delete_merged_branches = v;
        }
        if let Some(v) = raw.retry_flaky_tests {
            self.retry_flaky_tests = v;
        }
        if let Some(v) = raw.max_concurrent {
            self.max_concurrent = v;
        }
        if let Some(v) = raw.poll_interval {
            let interval = parse_duration(&v)
                .map_err(|e| Error::Config(format!("invalid poll_interval {v:?}: {e}")))?;
            if interval.is_zero() {
                return Err(Error::Config(format!(
                    "invalid poll_interval {v:?}: must be positive"
                )));
            }
            self.poll_interval = interval;
        }
        Ok(())
    }

    /// Conflict strategy to apply, falling back to assign-back for unknown names
    pub fn conflict_strategy(&self) -> ConflictStrategy {
        ConflictStrategy::parse(&self.on_conflict).unwrap_or_else(|| {
            warn!(
                on_conflict = %self.on_conflict,
                "unrecognized conflict strategy, using assign_back"
            );
            ConflictStrategy::AssignBack
        })
    }

    /// Number of pipelines that may run at once (at least one)
    pub fn worker_slots(&self) -> usize {
        self.max_concurrent.max(1)
    }

    /// Total test attempts including the first
    pub const fn test_attempts(&self) -> u32 {
        self.retry_flaky_tests.saturating_add(1)
    }
}

static DURATION_TERM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+(?:\.\d*)?|\.\d+)(ns|us|µs|μs|ms|s|m|h)").expect("valid duration regex")
});

/// Parse a duration string such as `300ms`, `30s`, `1m30s` or `1.5h`
///
/// A bare `0` is accepted. Negative durations are rejected.
pub fn parse_duration(input: &str) -> std::result::Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.starts_with('-') {
        return Err("negative duration".to_string());
    }
    let mut rest = s.strip_prefix('+').unwrap_or(s);
    if rest.is_empty() {
        return Err(format!("invalid duration {input:?}"));
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let caps = DURATION_TERM
            .captures(rest)
            .ok_or_else(|| format!("invalid duration {input:?}"))?;
        let unit_nanos: u128 = match &caps[2] {
            "ns" => 1,
            "us" | "µs" | "μs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60_000_000_000,
            _ => 3_600_000_000_000,
        };
        let (whole, frac) = caps[1].split_once('.').unwrap_or((&caps[1], ""));
        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole
                .parse()
                .map_err(|_| format!("invalid number in duration {input:?}"))?
        };
        let mut term = whole
            .checked_mul(unit_nanos)
            .ok_or_else(|| format!("duration out of range {input:?}"))?;
        let mut scale = unit_nanos;
        for digit in frac.bytes().take(18) {
            scale /= 10;
            term += u128::from(digit - b'0') * scale;
        }
        total = total
            .checked_add(term)
            .ok_or_else(|| format!("duration out of range {input:?}"))?;
        rest = &rest[caps[0].len()..];
    }

    let secs = u64::try_from(total / 1_000_000_000)
        .map_err(|_| format!("duration out of range {input:?}"))?;
    #[allow(clippy::cast_possible_truncation)]
    let nanos = (total % 1_000_000_000) as u32;
    Ok(Duration::new(secs, nanos))
}
