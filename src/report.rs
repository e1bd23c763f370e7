//! Human-readable rendering of operation results.
//!
//! Every public operation ends up as an [`Outcome`]: a success flag plus the
//! text shown to whoever issued the command.

use serde::{Deserialize, Serialize};

use crate::analyzer::AnalyzerKind;
use crate::backup::{BackupRecord, RestoreOutcome};
use crate::diagnostics::Issue;
use crate::error::{ErrorKind, RemedyError, Result};
use crate::orchestrator::{AnalysisReport, FixReport};
use crate::patch::Modification;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl Outcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            error_kind: None,
        }
    }

    pub fn failed(err: &RemedyError) -> Self {
        Self {
            success: false,
            message: err.to_string(),
            error_kind: Some(err.kind()),
        }
    }

    fn from_result<T>(result: Result<T>, render: impl FnOnce(T) -> Outcome) -> Self {
        match result {
            Ok(value) => render(value),
            Err(e) => {
                tracing::debug!("operation failed: {e}");
                Self::failed(&e)
            }
        }
    }

    pub fn from_analysis(target: &str, result: Result<AnalysisReport>) -> Self {
        Self::from_result(result, |report| Self::ok(render_analysis(target, &report)))
    }

    pub fn from_fix(target: &str, result: Result<FixReport>) -> Self {
        Self::from_result(result, |report| Self::ok(render_fix(target, &report)))
    }

    pub fn from_backup(result: Result<BackupRecord>) -> Self {
        Self::from_result(result, |record| {
            Self::ok(format!(
                "Created backup of {} at {}",
                record.relative_path, record.label
            ))
        })
    }

    pub fn from_restore(result: Result<RestoreOutcome>) -> Self {
        Self::from_result(result, |outcome| {
            let name = outcome
                .restored
                .relative_path
                .rsplit('/')
                .next()
                .unwrap_or(&outcome.restored.relative_path)
                .to_string();
            Self::ok(format!(
                "Restored {name} from backup {} (created by {})\nPrevious content saved as backup {}",
                outcome.restored.label, outcome.restored.tool, outcome.safety.label
            ))
        })
    }

    /// An empty listing is reported as a failure, matching `restore`.
    pub fn from_listing(target: &str, result: Result<Vec<BackupRecord>>) -> Self {
        Self::from_result(result, |records| {
            if records.is_empty() {
                return Self::failed(&RemedyError::NoBackups(target.to_string()));
            }
            Self::ok(render_listing(target, &records))
        })
    }
}

fn analyzer_title(kind: AnalyzerKind) -> &'static str {
    match kind {
        AnalyzerKind::Style => "Flake8 analysis",
        AnalyzerKind::Docstrings => "Docstring analysis",
    }
}

fn fix_tool_hint(kind: AnalyzerKind) -> String {
    format!("Use '{}' to apply automatic fixes.", kind.fix_tool())
}

fn push_issues(out: &mut Vec<String>, issues: &[Issue]) {
    out.extend(issues.iter().map(Issue::display_line));
}

fn push_footer(out: &mut Vec<String>, skipped_lines: usize, warning: Option<&str>) {
    if skipped_lines > 0 {
        out.push(format!(
            "Note: {skipped_lines} analyzer output line(s) could not be parsed and were ignored."
        ));
    }
    if let Some(warning) = warning {
        out.push(format!("Warning: {warning}"));
    }
}

pub fn render_analysis(target: &str, report: &AnalysisReport) -> String {
    let mut out = Vec::new();
    if report.is_clean() {
        out.push(format!("No issues found in {target}."));
        push_footer(&mut out, report.skipped_lines, report.analyzer_warning.as_deref());
        return out.join("\n");
    }

    out.push(format!("{} for {target}:", analyzer_title(report.kind)));
    if !report.auto_fixable.is_empty() {
        out.push(String::new());
        out.push("Issues that can be automatically fixed:".to_string());
        push_issues(&mut out, &report.auto_fixable);
    }
    if !report.manual.is_empty() {
        out.push(String::new());
        out.push("Issues that require manual fixing:".to_string());
        push_issues(&mut out, &report.manual);
    }
    out.push(String::new());
    out.push(format!(
        "Summary: {} of {} issues can be automatically fixed.",
        report.auto_fixable.len(),
        report.total()
    ));
    if report.auto_fixable.is_empty() {
        out.push("All issues require manual fixing.".to_string());
    } else {
        out.push(fix_tool_hint(report.kind));
    }
    push_footer(&mut out, report.skipped_lines, report.analyzer_warning.as_deref());
    out.join("\n")
}

pub fn render_fix(target: &str, report: &FixReport) -> String {
    let mut out = Vec::new();
    if report.nothing_to_do() {
        if report.found == 0 {
            out.push(format!("No issues found in {target}."));
        } else {
            out.push(format!(
                "No auto-fixable issues found in {target}. All issues require manual fixing."
            ));
            push_issues(&mut out, &report.manual);
        }
        push_footer(&mut out, 0, report.analyzer_warning.as_deref());
        return out.join("\n");
    }

    if report.modifications.is_empty() {
        out.push(format!("No changes were applied to {target}."));
    } else {
        out.push(format!(
            "Applied {} automatic fixes to {target}:",
            report.modifications.len()
        ));
        out.extend(report.modifications.iter().map(render_modification));
    }
    if let Some(backup) = &report.backup {
        out.push(format!("Backup saved as {} (restore with 'restore').", backup.label));
    }
    if !report.manual.is_empty() {
        out.push(String::new());
        out.push(format!(
            "{} issues remain that need manual fixing:",
            report.manual.len()
        ));
        push_issues(&mut out, &report.manual);
    }
    push_footer(&mut out, 0, report.analyzer_warning.as_deref());
    out.join("\n")
}

/// `Line N: "before" -> "after"` with special characters escaped.
pub fn render_modification(m: &Modification) -> String {
    let mut before = m.before.trim_end_matches('\n');
    let mut after = m.after.trim_end_matches('\n');
    if before == after {
        before = &m.before;
        after = &m.after;
    }
    format!(
        "Line {}: \"{}\" -> \"{}\"",
        m.line + 1,
        before.escape_debug(),
        after.escape_debug()
    )
}

pub fn render_listing(target: &str, records: &[BackupRecord]) -> String {
    let mut out = vec![format!("Available backups for {target}:")];
    for (i, record) in records.iter().enumerate() {
        out.push(format!(
            "  {}. {} - {} (by {})",
            i + 1,
            record.label,
            record.readable_time(),
            record.tool
        ));
    }
    out.push(String::new());
    out.push(format!(
        "To restore a specific version, use: restore {target} --version NUMBER"
    ));
    out.join("\n")
}
