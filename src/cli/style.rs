//! Terminal styling for command output
//!
//! Output goes through `anstream`, which strips the escape codes when
//! stdout is not a terminal.

use owo_colors::OwoColorize;
use std::fmt::Display;

/// Semantic styles for CLI output
pub trait Stylize: Display + Sized {
    /// Secondary information
    fn muted(&self) -> String {
        self.dimmed().to_string()
    }

    /// Headings and key values
    fn emphasis(&self) -> String {
        self.bold().to_string()
    }

    /// Identifiers such as branch names and item ids
    fn accent(&self) -> String {
        self.cyan().to_string()
    }

    /// Successful outcomes
    fn success(&self) -> String {
        self.green().to_string()
    }

    /// Failures and warnings
    fn warn(&self) -> String {
        self.yellow().to_string()
    }
}

impl<T: Display> Stylize for T {}

/// Check mark for successful items
pub fn check() -> String {
    "✓".success()
}

/// Cross for failed items
pub fn cross() -> String {
    "✗".warn()
}
