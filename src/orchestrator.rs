//! Remediation orchestration.
//!
//! [`Remediator`] sequences one command at a time through
//! analyze -> classify -> backup -> patch -> report. No file is written
//! without a snapshot taken earlier in the same call, and every fix re-runs
//! the analyzer instead of trusting a report handed in from outside.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::analyzer::{Analyzer, AnalyzerKind, AnalyzerOutput, CommandAnalyzer};
use crate::backup::{BackupRecord, BackupStore, RestoreOutcome, MANUAL_TOOL};
use crate::classify::IssueClassifier;
use crate::config::RemedyConfig;
use crate::diagnostics::{DiagnosticParser, Issue};
use crate::error::{RemedyError, Result};
use crate::patch::{split_lines, Modification, PatchEngine};
use crate::workspace::WorkspaceResolver;

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Phases a single remediation call moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemediationState {
    Idle,
    Analyzing,
    NoIssues,
    IssuesFound,
    BackupPending,
    Patching,
    Reported,
    Error,
}

/// Ordered record of the states one call passed through.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StateTrace(Vec<RemediationState>);

impl StateTrace {
    fn start() -> Self {
        Self(vec![RemediationState::Idle])
    }

    fn enter(&mut self, state: RemediationState) {
        tracing::debug!("remediation state: {:?} -> {state:?}", self.current());
        self.0.push(state);
    }

    pub fn current(&self) -> RemediationState {
        self.0.last().copied().unwrap_or(RemediationState::Idle)
    }

    pub fn states(&self) -> &[RemediationState] {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Structured result of an analysis. Never implies a filesystem change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub target: PathBuf,
    pub kind: AnalyzerKind,
    pub analyzer: String,
    pub auto_fixable: Vec<Issue>,
    pub manual: Vec<Issue>,
    /// Non-blank analyzer lines that matched no known record shape.
    pub skipped_lines: usize,
    /// Set when the analyzer exited non-zero without printing anything, which
    /// is indistinguishable from a clean run.
    pub analyzer_warning: Option<String>,
    pub trace: StateTrace,
}

impl AnalysisReport {
    pub fn total(&self) -> usize {
        self.auto_fixable.len() + self.manual.len()
    }

    pub fn is_clean(&self) -> bool {
        self.total() == 0
    }
}

/// Structured result of a fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixReport {
    pub target: PathBuf,
    pub kind: AnalyzerKind,
    /// Issues found by the analysis this fix ran, before patching.
    pub found: usize,
    pub modifications: Vec<Modification>,
    /// Issues left for a human.
    pub manual: Vec<Issue>,
    /// Snapshot taken before patching; `None` when nothing was fixable.
    pub backup: Option<BackupRecord>,
    pub analyzer_warning: Option<String>,
    pub trace: StateTrace,
}

impl FixReport {
    /// True when no auto-fixable issue existed, so nothing was touched.
    pub fn nothing_to_do(&self) -> bool {
        self.backup.is_none()
    }
}

// ---------------------------------------------------------------------------
// Remediator
// ---------------------------------------------------------------------------

pub struct Remediator {
    resolver: WorkspaceResolver,
    store: BackupStore,
    parser: DiagnosticParser,
    classifier: IssueClassifier,
    engine: PatchEngine,
    style: Box<dyn Analyzer>,
    docstrings: Box<dyn Analyzer>,
}

impl std::fmt::Debug for Remediator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Remediator")
            .field("resolver", &self.resolver)
            .field("store", &self.store)
            .field("style", &self.style.name())
            .field("docstrings", &self.docstrings.name())
            .finish()
    }
}

impl Remediator {
    /// Build a remediator that shells out to the configured analyzers.
    pub fn new(cfg: &RemedyConfig) -> Self {
        Self::with_analyzers(
            cfg,
            Box::new(CommandAnalyzer::for_kind(cfg, AnalyzerKind::Style)),
            Box::new(CommandAnalyzer::for_kind(cfg, AnalyzerKind::Docstrings)),
        )
    }

    pub fn with_analyzers(
        cfg: &RemedyConfig,
        style: Box<dyn Analyzer>,
        docstrings: Box<dyn Analyzer>,
    ) -> Self {
        Self {
            resolver: WorkspaceResolver::from_config(cfg),
            store: BackupStore::from_config(cfg),
            parser: DiagnosticParser::new(),
            classifier: IssueClassifier::new(),
            engine: PatchEngine::new(),
            style,
            docstrings,
        }
    }

    fn analyzer(&self, kind: AnalyzerKind) -> &dyn Analyzer {
        match kind {
            AnalyzerKind::Style => self.style.as_ref(),
            AnalyzerKind::Docstrings => self.docstrings.as_ref(),
        }
    }

    /// Run the analyzer over a file or directory and classify what it finds.
    pub fn analyze(&self, target: &str, kind: AnalyzerKind) -> Result<AnalysisReport> {
        self.analyze_traced(target, kind).1
    }

    /// Like [`Remediator::analyze`], also returning the states the call passed
    /// through. A failed call ends in [`RemediationState::Error`].
    pub fn analyze_traced(&self, target: &str, kind: AnalyzerKind) -> (StateTrace, Result<AnalysisReport>) {
        let mut trace = StateTrace::start();
        let result = self
            .resolver
            .resolve(target)
            .and_then(|resolved| self.analyze_resolved(&resolved, kind, &mut trace));
        finish(target, trace, result)
    }

    /// Re-analyze a file and apply every auto-fixable edit after snapshotting
    /// it.
    pub fn fix(&self, target: &str, kind: AnalyzerKind) -> Result<FixReport> {
        self.fix_traced(target, kind).1
    }

    /// Like [`Remediator::fix`], also returning the states the call passed
    /// through.
    pub fn fix_traced(&self, target: &str, kind: AnalyzerKind) -> (StateTrace, Result<FixReport>) {
        let mut trace = StateTrace::start();
        let result = self.fix_inner(target, kind, &mut trace);
        finish(target, trace, result)
    }

    fn fix_inner(&self, target: &str, kind: AnalyzerKind, trace: &mut StateTrace) -> Result<FixReport> {
        let resolved = self.resolver.resolve(target)?;
        if !resolved.is_file() {
            return Err(RemedyError::NotAFile(resolved));
        }
        let analysis = self.analyze_resolved(&resolved, kind, trace)?;
        let found = analysis.total();

        if analysis.auto_fixable.is_empty() {
            trace.enter(RemediationState::Reported);
            return Ok(FixReport {
                target: resolved,
                kind,
                found,
                modifications: Vec::new(),
                manual: analysis.manual,
                backup: None,
                analyzer_warning: analysis.analyzer_warning,
                trace: trace.clone(),
            });
        }

        trace.enter(RemediationState::BackupPending);
        let backup = self.store.create(&resolved, kind.fix_tool())?;

        trace.enter(RemediationState::Patching);
        let modifications = self.engine.apply_to_file(&resolved, &analysis.auto_fixable)?;

        trace.enter(RemediationState::Reported);
        Ok(FixReport {
            target: resolved,
            kind,
            found,
            modifications,
            manual: analysis.manual,
            backup: Some(backup),
            analyzer_warning: analysis.analyzer_warning,
            trace: trace.clone(),
        })
    }

    fn analyze_resolved(
        &self,
        target: &Path,
        kind: AnalyzerKind,
        trace: &mut StateTrace,
    ) -> Result<AnalysisReport> {
        trace.enter(RemediationState::Analyzing);
        let analyzer = self.analyzer(kind);
        let output = analyzer.run(target)?;

        let source = if target.is_file() {
            let text = std::fs::read_to_string(target).map_err(|e| RemedyError::io(target, e))?;
            split_lines(&text)
        } else {
            Vec::new()
        };

        let mut diagnostics = self.parser.parse(&output.stdout, &source);
        let issues: Vec<Issue> = diagnostics.by_ref().collect();
        let skipped_lines = diagnostics.skipped();
        let analyzer_warning = check_exit_status(analyzer.name(), &output, issues.len())?;

        let classification = self.classifier.classify(issues);
        trace.enter(if classification.is_empty() {
            RemediationState::NoIssues
        } else {
            RemediationState::IssuesFound
        });

        Ok(AnalysisReport {
            target: target.to_path_buf(),
            kind,
            analyzer: analyzer.name().to_string(),
            auto_fixable: classification.auto_fixable,
            manual: classification.manual,
            skipped_lines,
            analyzer_warning,
            trace: trace.clone(),
        })
    }

    /// Snapshot a file on request.
    pub fn backup(&self, target: &str) -> Result<BackupRecord> {
        let resolved = self.resolver.resolve(target)?;
        self.store.create(&resolved, MANUAL_TOOL)
    }

    /// Restore a file from one of its snapshots, newest when `version` is
    /// `None`.
    pub fn restore(&self, target: &str, version: Option<usize>) -> Result<RestoreOutcome> {
        let resolved = self.resolver.resolve(target)?;
        self.store.restore(&resolved, version)
    }

    /// Snapshots of a file, newest first. A file that no longer exists can
    /// still be listed by its workspace-relative path.
    pub fn list_backups(&self, target: &str) -> Result<Vec<BackupRecord>> {
        match self.resolver.resolve(target) {
            Ok(resolved) => self.store.list(&resolved),
            Err(RemedyError::NotFound(_)) => self.store.list(Path::new(target)),
            Err(e) => Err(e),
        }
    }
}

/// Close a trace, entering `Error` and logging the path taken on failure.
fn finish<T>(target: &str, mut trace: StateTrace, result: Result<T>) -> (StateTrace, Result<T>) {
    if let Err(e) = &result {
        trace.enter(RemediationState::Error);
        tracing::warn!(target_path = target, states = ?trace.states(), "remediation failed: {e}");
    }
    (trace, result)
}

/// Separate a genuine clean run from an analyzer that failed.
///
/// A non-zero exit with diagnostics is the normal "issues found" case. A
/// non-zero exit whose output yields nothing recognizable is a failure. A
/// non-zero exit with no output at all cannot be told apart from a clean run,
/// so it is treated as clean and flagged.
fn check_exit_status(name: &str, output: &AnalyzerOutput, parsed: usize) -> Result<Option<String>> {
    if output.success() || parsed > 0 {
        return Ok(None);
    }
    let status = match output.exit_code {
        Some(code) => format!("exit status {code}"),
        None => "termination by signal".to_string(),
    };
    if !output.stdout.trim().is_empty() {
        return Err(RemedyError::AnalyzerFailure {
            analyzer: name.to_string(),
            reason: format!("{status} with no recognizable diagnostics"),
        });
    }
    let mut warning = format!("{name} reported {status} but printed no diagnostics");
    if let Some(line) = output.stderr.lines().find(|l| !l.trim().is_empty()) {
        warning.push_str(&format!(": {}", line.trim()));
    }
    tracing::warn!("{warning}");
    Ok(Some(warning))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
