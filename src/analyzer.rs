//! External analyzer invocation.
//!
//! An analyzer is any program that takes a path and prints diagnostics. The
//! [`Analyzer`] trait is the seam the orchestrator talks to, so tests can
//! substitute canned output for a real flake8/pydocstyle run.

use std::path::Path;
use std::process::Command;

use serde::{Deserialize, Serialize};

use crate::config::{AnalyzerCommand, RemedyConfig};
use crate::error::{RemedyError, Result};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Which family of diagnostics to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyzerKind {
    /// flake8-style single-line records.
    Style,
    /// pydocstyle-style header/detail records.
    Docstrings,
}

impl AnalyzerKind {
    /// Tool name recorded on snapshots taken before fixing with this kind.
    pub fn fix_tool(&self) -> &'static str {
        match self {
            AnalyzerKind::Style => "fix_flake8",
            AnalyzerKind::Docstrings => "fix_docstrings",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AnalyzerKind::Style => "flake8",
            AnalyzerKind::Docstrings => "pydocstyle",
        }
    }
}

/// Raw result of one analyzer run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalyzerOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl AnalyzerOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

pub trait Analyzer: Send + Sync {
    fn name(&self) -> &str;

    /// Run against a file or directory. Fails only when the analyzer could
    /// not be started at all; a non-zero exit is normal when issues exist.
    fn run(&self, target: &Path) -> Result<AnalyzerOutput>;
}

// ---------------------------------------------------------------------------
// CommandAnalyzer
// ---------------------------------------------------------------------------

/// Runs `program args... target` and captures its output.
#[derive(Debug, Clone)]
pub struct CommandAnalyzer {
    name: String,
    command: AnalyzerCommand,
}

impl CommandAnalyzer {
    pub fn new(name: &str, command: AnalyzerCommand) -> Self {
        Self {
            name: name.to_string(),
            command,
        }
    }

    /// Build the analyzer configured for `kind`.
    pub fn for_kind(cfg: &RemedyConfig, kind: AnalyzerKind) -> Self {
        let command = match kind {
            AnalyzerKind::Style => cfg.flake8.clone(),
            AnalyzerKind::Docstrings => cfg.pydocstyle.clone(),
        };
        Self::new(kind.label(), command)
    }
}

impl Analyzer for CommandAnalyzer {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, target: &Path) -> Result<AnalyzerOutput> {
        let start = std::time::Instant::now();
        let output = Command::new(&self.command.program)
            .args(&self.command.args)
            .arg(target)
            .output()
            .map_err(|e| RemedyError::AnalyzerFailure {
                analyzer: self.name.clone(),
                reason: format!("failed to execute `{}`: {e}", self.command.program),
            })?;

        let result = AnalyzerOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        };
        tracing::debug!(
            "{} on {} exited with {:?} in {}ms",
            self.name,
            target.display(),
            result.exit_code,
            start.elapsed().as_millis()
        );
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_fix_tool_names() {
        assert_eq!(AnalyzerKind::Style.fix_tool(), "fix_flake8");
        assert_eq!(AnalyzerKind::Docstrings.fix_tool(), "fix_docstrings");
    }

    #[test]
    fn for_kind_uses_configured_command() {
        let cfg = RemedyConfig::default();
        let analyzer = CommandAnalyzer::for_kind(&cfg, AnalyzerKind::Docstrings);
        assert_eq!(analyzer.name(), "pydocstyle");
        assert_eq!(analyzer.command.args, vec!["--convention=pep257"]);
    }

    #[test]
    fn missing_program_is_analyzer_failure() {
        let analyzer = CommandAnalyzer::new(
            "ghost",
            AnalyzerCommand::new("definitely-not-an-installed-analyzer-xyz", &[]),
        );
        let err = analyzer.run(Path::new(".")).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::AnalyzerFailure);
    }

    #[cfg(unix)]
    #[test]
    fn captures_output_and_exit_code() {
        // `sh -c script name target`: the target lands in $1.
        let analyzer = CommandAnalyzer::new(
            "fake",
            AnalyzerCommand::new("sh", &["-c", "echo \"$1:1:1: W291 trailing whitespace\"; exit 1", "sh"]),
        );
        let out = analyzer.run(Path::new("a.py")).unwrap();
        assert_eq!(out.stdout.trim(), "a.py:1:1: W291 trailing whitespace");
        assert_eq!(out.exit_code, Some(1));
        assert!(!out.success());
    }
}
