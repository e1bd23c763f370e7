//! Command log.
//!
//! Records every tool invocation (what was asked, with which arguments, and
//! whether it succeeded) for later inspection. Entries are kept in memory and,
//! when a sink file is configured, appended to it as JSON Lines as they
//! happen.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// How a recorded command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandStatus {
    /// The operation ran and reported success.
    Succeeded,
    /// The operation ran and reported failure.
    Failed,
    /// The request never reached an operation (unknown tool, bad arguments).
    Rejected,
}

/// A single entry in the command log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub tool_name: String,
    pub arguments: Value,
    pub status: CommandStatus,
    /// First line of the operation's message.
    pub summary: String,
}

impl AuditEntry {
    /// Build an entry stamped with the current UTC time and a fresh id.
    pub fn now(
        tool_name: impl Into<String>,
        arguments: Value,
        status: CommandStatus,
        message: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            tool_name: tool_name.into(),
            arguments,
            status,
            summary: message.lines().next().unwrap_or_default().to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// AuditLog
// ---------------------------------------------------------------------------

/// An append-only command log.
#[derive(Debug, Clone, Default)]
pub struct AuditLog {
    entries: Vec<AuditEntry>,
    sink: Option<PathBuf>,
}

impl AuditLog {
    /// Create an in-memory log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a log that also appends every entry to `path`.
    pub fn with_sink(path: impl Into<PathBuf>) -> Self {
        Self {
            entries: Vec::new(),
            sink: Some(path.into()),
        }
    }

    /// Append an entry. A sink write failure is logged and otherwise ignored;
    /// it never fails the command being recorded.
    pub fn record(&mut self, entry: AuditEntry) {
        if let Some(path) = &self.sink {
            let appended = serde_json::to_string(&entry)
                .map_err(std::io::Error::from)
                .and_then(|line| {
                    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
                    writeln!(file, "{line}")
                });
            if let Err(e) = appended {
                tracing::warn!("failed to append to command log {}: {e}", path.display());
            }
        }
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
