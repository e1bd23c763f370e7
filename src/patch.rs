//! Line-based patch engine.
//!
//! Applies the edits described by auto-fixable issues to a file's lines.
//! Line-preserving fixes run first, grouped per line; structural fixes
//! (blank-line insertion/removal) run second, in ascending original line
//! order with a running offset, so every edit lands on the line the analyzer
//! reported even after earlier edits shifted it.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::backup::write_atomic;
use crate::classify::{BlankLineFix, FixRule, WhitespaceFix};
use crate::diagnostics::{find_word, Issue};
use crate::error::{RemedyError, Result};

/// Blank lines expected around top-level definitions when the diagnostic
/// message does not say.
const DEFAULT_BLANK_LINES: usize = 2;

/// Context lines shown above a structural edit.
const CONTEXT_ABOVE: usize = 1;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One applied edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modification {
    /// 0-based line index as reported by the analyzer.
    pub line: usize,
    /// Diagnostic codes this edit resolves.
    pub codes: Vec<String>,
    /// Text before the edit. Multi-line context for structural edits.
    pub before: String,
    /// Text after the edit.
    pub after: String,
}

/// New file content plus the edits that produced it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchOutcome {
    pub lines: Vec<String>,
    pub modifications: Vec<Modification>,
}

impl PatchOutcome {
    pub fn is_unchanged(&self) -> bool {
        self.modifications.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Line helpers
// ---------------------------------------------------------------------------

/// Split text into lines that keep their terminators, so joining them
/// reproduces the input exactly.
pub fn split_lines(text: &str) -> Vec<String> {
    text.split_inclusive('\n').map(String::from).collect()
}

/// Separate a line into its content and its terminator.
fn split_ending(line: &str) -> (&str, &str) {
    if let Some(body) = line.strip_suffix("\r\n") {
        (body, "\r\n")
    } else if let Some(body) = line.strip_suffix('\n') {
        (body, "\n")
    } else {
        (line, "")
    }
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// Number of blank lines immediately above `idx`.
fn blank_run_above(lines: &[String], idx: usize) -> usize {
    lines[..idx].iter().rev().take_while(|l| is_blank(l)).count()
}

fn expected_blank_lines(message: &str) -> usize {
    message
        .strip_prefix("expected ")
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|n| n.parse().ok())
        .unwrap_or(DEFAULT_BLANK_LINES)
}

// ---------------------------------------------------------------------------
// Fix dispatch
// ---------------------------------------------------------------------------

impl FixRule {
    /// Rewrite one line's content. Returns `None` when the rule does not
    /// apply to the line as it currently reads.
    fn rewrite(&self, line: &str, issue: &Issue) -> Option<String> {
        let (body, ending) = split_ending(line);
        let new_body = match self {
            FixRule::Whitespace(WhitespaceFix::TrimTrailing) => body.trim_end().to_string(),
            FixRule::Whitespace(WhitespaceFix::BlankWhitespaceLine) => {
                if !body.trim().is_empty() {
                    return None;
                }
                String::new()
            }
            FixRule::CommentSpacing => {
                let indent = body.len() - body.trim_start().len();
                let rest = &body[indent..];
                let hashes = rest.len() - rest.trim_start_matches('#').len();
                if hashes == 0 {
                    return None;
                }
                let after = &rest[hashes..];
                if after.is_empty() || after.starts_with(char::is_whitespace) {
                    return None;
                }
                format!("{}{} {}", &body[..indent], &rest[..hashes], after)
            }
            FixRule::ImperativeMood => {
                let replacement = issue.replacement.as_ref()?;
                let at = find_word(body, &replacement.from)?;
                format!(
                    "{}{}{}",
                    &body[..at],
                    replacement.to,
                    &body[at + replacement.from.len()..]
                )
            }
            FixRule::Whitespace(WhitespaceFix::AppendFinalNewline) | FixRule::BlankLineCount(_) => {
                return None
            }
        };
        Some(format!("{new_body}{ending}"))
    }

    /// Apply a blank-line adjustment above `target`. Returns the change in
    /// line count, or `None` when nothing needed doing.
    fn adjust_blank_lines(&self, lines: &mut Vec<String>, target: usize, issue: &Issue) -> Option<isize> {
        let FixRule::BlankLineCount(kind) = self else {
            return None;
        };
        let found = blank_run_above(lines, target);
        match kind {
            BlankLineFix::BeforeDefinition | BlankLineFix::AfterDefinition => {
                let wanted = expected_blank_lines(&issue.message);
                if target == 0 || found >= wanted {
                    return None;
                }
                let missing = wanted - found;
                let ending = match split_ending(&lines[target - 1]).1 {
                    "" => "\n".to_string(),
                    ending => ending.to_string(),
                };
                lines.splice(target..target, std::iter::repeat(ending).take(missing));
                Some(missing as isize)
            }
            BlankLineFix::Excess => {
                let allowed = if lines[target].starts_with(char::is_whitespace) {
                    1
                } else {
                    2
                };
                if found <= allowed {
                    return None;
                }
                let excess = found - allowed;
                let run_start = target - found;
                lines.drain(run_start..run_start + excess);
                Some(-(excess as isize))
            }
        }
    }
}

/// Order in which line-preserving rules compose on a single line.
fn compose_rank(rule: &FixRule) -> u8 {
    match rule {
        FixRule::Whitespace(WhitespaceFix::TrimTrailing) => 0,
        FixRule::Whitespace(WhitespaceFix::BlankWhitespaceLine) => 1,
        FixRule::CommentSpacing => 2,
        FixRule::ImperativeMood => 3,
        FixRule::Whitespace(WhitespaceFix::AppendFinalNewline) => 4,
        FixRule::BlankLineCount(_) => 5,
    }
}

// ---------------------------------------------------------------------------
// PatchEngine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct PatchEngine;

impl PatchEngine {
    pub fn new() -> Self {
        Self
    }

    /// Compute the patched lines for a set of auto-fixable issues. Issues
    /// without a fix rule and out-of-range line indices are skipped.
    pub fn apply(&self, lines: &[String], issues: &[Issue]) -> PatchOutcome {
        let mut lines = lines.to_vec();
        let mut modifications = Vec::new();

        let mut per_line: BTreeMap<usize, Vec<(FixRule, &Issue)>> = BTreeMap::new();
        let mut structural: Vec<(FixRule, &Issue)> = Vec::new();
        for issue in issues {
            let Some(rule) = FixRule::for_issue(issue) else {
                continue;
            };
            if rule.is_structural() {
                structural.push((rule, issue));
            } else {
                per_line.entry(issue.line).or_default().push((rule, issue));
            }
        }

        for (idx, mut fixes) in per_line {
            if idx >= lines.len() {
                tracing::debug!("skipping fix on line {} past end of file", idx + 1);
                continue;
            }
            fixes.sort_by_key(|(rule, _)| compose_rank(rule));
            self.apply_line_fixes(&mut lines, idx, &fixes, &mut modifications);
        }

        structural.sort_by_key(|(_, issue)| issue.line);
        let mut offset: isize = 0;
        for (rule, issue) in structural {
            let target = issue.line as isize + offset;
            if target < 0 || target as usize >= lines.len() {
                tracing::debug!("skipping structural fix on line {} past end of file", issue.line + 1);
                continue;
            }
            let target = target as usize;
            let before_ctx = context(&lines, target, blank_run_above(&lines, target));
            if let Some(delta) = rule.adjust_blank_lines(&mut lines, target, issue) {
                let new_target = (target as isize + delta) as usize;
                let after_ctx = context(&lines, new_target, blank_run_above(&lines, new_target));
                modifications.push(Modification {
                    line: issue.line,
                    codes: vec![issue.code.clone()],
                    before: before_ctx,
                    after: after_ctx,
                });
                offset += delta;
            }
        }

        PatchOutcome {
            lines,
            modifications,
        }
    }

    fn apply_line_fixes(
        &self,
        lines: &mut [String],
        idx: usize,
        fixes: &[(FixRule, &Issue)],
        modifications: &mut Vec<Modification>,
    ) {
        let original = lines[idx].clone();
        let mut current = original.clone();
        let mut codes = Vec::new();
        let mut wants_newline = None;

        for (rule, issue) in fixes {
            if *rule == FixRule::Whitespace(WhitespaceFix::AppendFinalNewline) {
                wants_newline = Some(issue.code.clone());
                continue;
            }
            if let Some(rewritten) = rule.rewrite(&current, issue) {
                if rewritten != current {
                    current = rewritten;
                    codes.push(issue.code.clone());
                }
            }
        }
        if current != original {
            modifications.push(Modification {
                line: idx,
                codes,
                before: original,
                after: current.clone(),
            });
        }

        // The final newline is recorded as its own edit on the same line.
        if let Some(code) = wants_newline {
            if idx + 1 == lines.len() && !current.ends_with('\n') {
                let with_newline = format!("{current}\n");
                modifications.push(Modification {
                    line: idx,
                    codes: vec![code],
                    before: current.clone(),
                    after: with_newline.clone(),
                });
                current = with_newline;
            }
        }
        lines[idx] = current;
    }

    /// Read, patch and rewrite a file in one step.
    ///
    /// The file is written once, atomically, and only when at least one edit
    /// applied. Any I/O failure leaves the original untouched.
    pub fn apply_to_file(&self, path: &Path, issues: &[Issue]) -> Result<Vec<Modification>> {
        if issues.is_empty() {
            return Ok(Vec::new());
        }
        let text = std::fs::read_to_string(path).map_err(|e| RemedyError::io(path, e))?;
        let outcome = self.apply(&split_lines(&text), issues);
        if outcome.is_unchanged() {
            return Ok(outcome.modifications);
        }
        write_atomic(path, outcome.lines.concat().as_bytes())?;
        tracing::info!(
            "applied {} fixes to {}",
            outcome.modifications.len(),
            path.display()
        );
        Ok(outcome.modifications)
    }
}

/// The line above a blank run, the run itself and the line below it.
fn context(lines: &[String], target: usize, run: usize) -> String {
    let start = target.saturating_sub(run + CONTEXT_ABOVE);
    lines[start..=target].concat()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
