//! Remediation operations exposed as registry tools.
//!
//! One parameterized tool type covers all seven operations; each instance
//! shares the same [`Remediator`].

use std::sync::Arc;

use anyhow::{anyhow, bail};
use serde_json::{json, Value};

use crate::analyzer::AnalyzerKind;
use crate::orchestrator::Remediator;
use crate::report::Outcome;
use crate::tool::{Tool, ToolRegistry, ToolResult};

/// The operation a [`RemediationTool`] performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Analyze(AnalyzerKind),
    Fix(AnalyzerKind),
    Backup,
    Restore,
    ListBackups,
}

impl Operation {
    pub const ALL: [Operation; 7] = [
        Operation::Analyze(AnalyzerKind::Style),
        Operation::Fix(AnalyzerKind::Style),
        Operation::Analyze(AnalyzerKind::Docstrings),
        Operation::Fix(AnalyzerKind::Docstrings),
        Operation::Backup,
        Operation::Restore,
        Operation::ListBackups,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Operation::Analyze(AnalyzerKind::Style) => "analyze_flake8",
            Operation::Fix(AnalyzerKind::Style) => "fix_flake8",
            Operation::Analyze(AnalyzerKind::Docstrings) => "analyze_docstrings",
            Operation::Fix(AnalyzerKind::Docstrings) => "fix_docstrings",
            Operation::Backup => "backup",
            Operation::Restore => "restore",
            Operation::ListBackups => "list_backups",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            Operation::Analyze(AnalyzerKind::Style) => {
                "Analyze a Python file or directory with flake8 and list issues, \
                 split into auto-fixable and manual. Never modifies files."
            }
            Operation::Fix(AnalyzerKind::Style) => {
                "Back up a Python file, then apply automatic fixes for whitespace, \
                 comment spacing and blank-line flake8 issues."
            }
            Operation::Analyze(AnalyzerKind::Docstrings) => {
                "Analyze docstrings with pydocstyle and list issues. Never modifies files."
            }
            Operation::Fix(AnalyzerKind::Docstrings) => {
                "Back up a Python file, then rewrite docstring summary lines into \
                 the imperative mood (D401)."
            }
            Operation::Backup => "Create a timestamped backup of a file.",
            Operation::Restore => {
                "Restore a file from backup. Restores the newest backup unless \
                 'version' (1 = newest) is given. The current content is backed up first."
            }
            Operation::ListBackups => "List available backups for a file, newest first.",
        }
    }

    /// Fold one operation's result into an [`Outcome`].
    pub fn run(&self, remediator: &Remediator, path: &str, version: Option<usize>) -> Outcome {
        match self {
            Operation::Analyze(kind) => Outcome::from_analysis(path, remediator.analyze(path, *kind)),
            Operation::Fix(kind) => Outcome::from_fix(path, remediator.fix(path, *kind)),
            Operation::Backup => Outcome::from_backup(remediator.backup(path)),
            Operation::Restore => Outcome::from_restore(remediator.restore(path, version)),
            Operation::ListBackups => Outcome::from_listing(path, remediator.list_backups(path)),
        }
    }
}

pub struct RemediationTool {
    op: Operation,
    remediator: Arc<Remediator>,
}

impl RemediationTool {
    pub fn new(op: Operation, remediator: Arc<Remediator>) -> Self {
        Self { op, remediator }
    }
}

impl Tool for RemediationTool {
    fn name(&self) -> &str {
        self.op.name()
    }

    fn description(&self) -> &str {
        self.op.description()
    }

    fn parameters_schema(&self) -> Value {
        let mut properties = json!({
            "path": {
                "type": "string",
                "description": "File path relative to the workspace, absolute path, or bare file name to search for"
            }
        });
        if self.op == Operation::Restore {
            properties["version"] = json!({
                "type": "integer",
                "minimum": 1,
                "description": "Backup to restore, 1 = newest"
            });
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": ["path"]
        })
    }

    fn execute(&self, args: Value) -> anyhow::Result<ToolResult> {
        let path = args
            .get("path")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| anyhow!("Missing required argument: path"))?;
        let version = match self.op {
            Operation::Restore => parse_version(args.get("version"))?,
            _ => None,
        };
        Ok(self.op.run(&self.remediator, path, version).into())
    }
}

/// Accept `version` as a positive integer or a numeric string.
fn parse_version(value: Option<&Value>) -> anyhow::Result<Option<usize>> {
    let Some(value) = value else {
        return Ok(None);
    };
    let parsed = match value {
        Value::Null => return Ok(None),
        Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
        Value::String(s) => s.trim().parse::<usize>().ok(),
        _ => None,
    };
    match parsed {
        Some(v) => Ok(Some(v)),
        None => bail!("Invalid version number: {value}"),
    }
}

/// Register every remediation tool against one shared remediator.
pub fn register_all(registry: &mut ToolRegistry, remediator: Arc<Remediator>) {
    for op in Operation::ALL {
        registry.register(Box::new(RemediationTool::new(op, Arc::clone(&remediator))));
    }
}
