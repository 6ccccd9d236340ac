//! Error types for refinery

use thiserror::Error;

/// Errors produced by the merge queue engine and its collaborators
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be read or is malformed
    #[error("configuration error: {0}")]
    Config(String),

    /// The merge queue is disabled in the rig configuration
    #[error("merge queue is disabled in configuration")]
    Disabled,

    /// Issue tracker query or update failed
    #[error("tracker error: {0}")]
    Tracker(String),

    /// Version control operation failed
    #[error("vcs error: {0}")]
    Vcs(String),

    /// Claim ledger could not be read or written
    #[error("claim ledger error: {0}")]
    Ledger(String),

    /// Escalation dispatch failed
    #[error("escalation error: {0}")]
    Escalation(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Whether this error must stop the process rather than just the current cycle
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Disabled)
    }
}

/// Result type alias using refinery's Error
pub type Result<T> = std::result::Result<T, Error>;
