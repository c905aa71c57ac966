//! End-of-session summaries.

use colored::Colorize;
use std::fmt;

/// One item that could not be processed, with the reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub path: String,
    pub reason: String,
}

impl ItemFailure {
    pub fn new(path: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub unchanged: usize,
    /// Remote paths written this session
    pub uploaded: Vec<String>,
    pub bytes_uploaded: u64,
    pub failures: Vec<ItemFailure>,
}

impl SyncReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} uploaded ({} bytes), {} unchanged, {} failed",
            self.uploaded.len().to_string().green(),
            self.bytes_uploaded,
            self.unchanged,
            if self.failures.is_empty() {
                "0".normal()
            } else {
                self.failures.len().to_string().red()
            }
        )?;
        for failure in &self.failures {
            writeln!(f, "  {} {}: {}", "FAILED".red(), failure.path, failure.reason)?;
        }
        Ok(())
    }
}

/// What happened to one remote entry during cleanup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Removed as a plain file
    Deleted,
    /// Removed as a directory, contents first
    Recursed,
    Failed(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Top-level entries and their outcome, in listing order
    pub entries: Vec<(String, DeleteOutcome)>,
    /// Preserved names found at the top level
    pub preserved: Vec<String>,
    /// Every path that could not be removed, at any depth
    pub failures: Vec<ItemFailure>,
    pub root_removed: bool,
}

impl CleanupReport {
    pub fn deleted_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|(_, o)| !matches!(o, DeleteOutcome::Failed(_)))
            .count()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for CleanupReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} deleted, {} preserved, {} failed",
            self.deleted_count().to_string().green(),
            self.preserved.len(),
            if self.failures.is_empty() {
                "0".normal()
            } else {
                self.failures.len().to_string().red()
            }
        )?;
        for failure in &self.failures {
            writeln!(f, "  {} {}: {}", "FAILED".red(), failure.path, failure.reason)?;
        }
        Ok(())
    }
}
