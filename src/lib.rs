//! Recoverable lint remediation.
//!
//! Runs an external style analyzer, classifies what it reports, snapshots the
//! target and applies deterministic line edits for the mechanically fixable
//! issues. Snapshots are versioned per file and any of them can be restored.

pub mod analyzer;
pub mod audit;
pub mod backup;
pub mod classify;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod mcp;
pub mod orchestrator;
pub mod patch;
pub mod remediation;
pub mod report;
pub mod tool;
pub mod workspace;

pub use error::{ErrorKind, RemedyError, Result};
pub use orchestrator::Remediator;
pub use report::Outcome;
