//! Claiming merge requests, and recovering claims left by an interrupted run
//!
//! A claim is a single tracker update to `in_progress`. Each claim is also
//! written to a ledger in `<rig>/.refinery/claims.toml` and removed once the
//! item is reconciled, so entries still present at startup belong to a run
//! that never finished and can be reopened.

use crate::error::{Error, Result};
use crate::escalation::format_relative_time;
use crate::tracker::{Tracker, UpdateOptions};
use crate::types::{IssueStatus, MergeRequest};
use crate::vcs::REFINERY_DIR;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Current ledger format version
pub const LEDGER_VERSION: u32 = 1;

/// Filename for the claim ledger
const LEDGER_FILE: &str = "claims.toml";

/// One outstanding claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRecord {
    /// Claimed item
    pub id: String,
    /// When the claim was made
    pub claimed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LedgerState {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    claims: Vec<ClaimRecord>,
}

/// Outstanding claims, optionally persisted to disk
pub struct ClaimLedger {
    path: Option<PathBuf>,
    state: Mutex<LedgerState>,
}

impl ClaimLedger {
    /// Ledger that lives only as long as the process
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(LedgerState {
                version: LEDGER_VERSION,
                claims: Vec::new(),
            }),
        }
    }

    /// Path of the ledger for a rig
    pub fn path_for(rig: &Path) -> PathBuf {
        rig.join(REFINERY_DIR).join(LEDGER_FILE)
    }

    /// Open the rig's ledger; a missing file is an empty ledger
    pub fn open(rig: &Path) -> Result<Self> {
        let path = Self::path_for(rig);
        let state = if path.exists() {
            let content = fs::read_to_string(&path)
                .map_err(|e| Error::Ledger(format!("failed to read {}: {e}", path.display())))?;
            toml::from_str(&content)
                .map_err(|e| Error::Ledger(format!("failed to parse {}: {e}", path.display())))?
        } else {
            LedgerState::default()
        };
        Ok(Self {
            path: Some(path),
            state: Mutex::new(state),
        })
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut LedgerState) -> T) -> Result<T> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let out = f(&mut state);
        if let Some(ref path) = self.path {
            save(path, &state)?;
        }
        Ok(out)
    }

    /// Record a claim
    pub fn record(&self, id: &str, now: DateTime<Utc>) -> Result<()> {
        self.with_state(|state| {
            state.claims.retain(|c| c.id != id);
            state.claims.push(ClaimRecord {
                id: id.to_string(),
                claimed_at: now,
            });
        })
    }

    /// Drop the claim for an item
    pub fn release(&self, id: &str) -> Result<()> {
        self.with_state(|state| state.claims.retain(|c| c.id != id))
    }

    /// Claims currently outstanding
    pub fn outstanding(&self) -> Vec<ClaimRecord> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .claims
            .clone()
    }
}

fn save(path: &Path, state: &LedgerState) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .map_err(|e| Error::Ledger(format!("failed to create {}: {e}", dir.display())))?;
    }

    let mut to_save = state.clone();
    to_save.version = LEDGER_VERSION;
    let content = toml::to_string_pretty(&to_save)
        .map_err(|e| Error::Ledger(format!("failed to serialize claims: {e}")))?;

    fs::write(
        path,
        format!("# refinery claim ledger\n# Auto-generated - entries are reopened on restart\n\n{content}"),
    )
    .map_err(|e| Error::Ledger(format!("failed to write {}: {e}", path.display())))
}

/// Moves items into and out of `in_progress`
pub struct ClaimManager {
    tracker: Arc<dyn Tracker>,
    ledger: ClaimLedger,
}

impl ClaimManager {
    /// Create a claim manager
    pub fn new(tracker: Arc<dyn Tracker>, ledger: ClaimLedger) -> Self {
        Self { tracker, ledger }
    }

    /// Claim an item; on error nothing was claimed
    pub async fn claim(&self, mr: &MergeRequest) -> Result<()> {
        if let Err(e) = self.ledger.record(&mr.id, Utc::now()) {
            warn!(mr_id = %mr.id, error = %e, "failed to record claim");
        }
        let update = UpdateOptions::status(IssueStatus::InProgress);
        if let Err(e) = self.tracker.update(&mr.id, &update).await {
            let _ = self.ledger.release(&mr.id);
            return Err(Error::Tracker(format!("claiming {}: {e}", mr.id)));
        }
        debug!(mr_id = %mr.id, "claimed");
        Ok(())
    }

    /// Forget a claim once its item has been reconciled
    pub fn release(&self, id: &str) {
        if let Err(e) = self.ledger.release(id) {
            warn!(mr_id = id, error = %e, "failed to release claim");
        }
    }

    /// Reopen items whose claims were never reconciled, returning their ids
    pub async fn recover_stranded(&self) -> Result<Vec<String>> {
        let mut reopened = Vec::new();
        for claim in self.ledger.outstanding() {
            let claimed = format_relative_time(&claim.claimed_at.to_rfc3339(), Utc::now());
            let update = UpdateOptions::status(IssueStatus::Open).with_notes(format!(
                "reopened: processing claimed {claimed} was interrupted"
            ));
            match self.tracker.update(&claim.id, &update).await {
                Ok(()) => {
                    self.ledger.release(&claim.id)?;
                    info!(mr_id = %claim.id, "reopened stranded claim");
                    reopened.push(claim.id);
                }
                Err(e) => warn!(mr_id = %claim.id, error = %e, "failed to reopen stranded claim"),
            }
        }
        Ok(reopened)
    }
}
