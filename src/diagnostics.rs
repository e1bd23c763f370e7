//! Analyzer output parsing.
//!
//! Turns the raw text printed by a style checker into structured [`Issue`]
//! records. Two record shapes are understood:
//!
//! - single-line records, `path:line:col: CODE message` (flake8/pycodestyle);
//! - two-part docstring records, a `path:line in symbol:` or
//!   `path:line at module level:` header followed by one or more indented
//!   `Dxxx: description` lines (pydocstyle).
//!
//! Parsing is best-effort: lines matching neither shape are skipped and
//! counted, never fatal.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Code of the docstring rule whose reported line needs to be re-located.
pub const IMPERATIVE_MOOD: &str = "D401";

/// Lines searched around the reported line for an imperative-mood issue,
/// relative to the reported line.
const MOOD_WINDOW: std::ops::RangeInclusive<isize> = -2..=4;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A word substitution located on a specific source line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordReplacement {
    /// Word currently in the text.
    pub from: String,
    /// Word suggested by the analyzer.
    pub to: String,
}

/// One diagnostic reported by an analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// File the analyzer reported on, as printed by it.
    pub path: String,
    /// 0-based line index.
    pub line: usize,
    /// 1-based column, when the record shape carries one.
    pub column: Option<usize>,
    /// Diagnostic code, e.g. `W291` or `D401`.
    pub code: String,
    pub message: String,
    /// Enclosing definition for docstring records.
    pub symbol: Option<String>,
    /// Why the issue could not be handled automatically, if that was decided
    /// during parsing.
    pub note: Option<String>,
    /// Located substitution for imperative-mood issues.
    pub replacement: Option<WordReplacement>,
    /// Set by the classifier.
    pub fixable: bool,
}

impl Issue {
    /// Render the issue the way the analyzer would, with a 1-based line.
    pub fn display_line(&self) -> String {
        let mut out = format!("{}:{}", self.path, self.line + 1);
        if let Some(col) = self.column {
            out.push_str(&format!(":{col}"));
        }
        out.push_str(&format!(": {} {}", self.code, self.message));
        if let Some(symbol) = &self.symbol {
            out.push_str(&format!(" (in {symbol})"));
        }
        if let Some(note) = &self.note {
            out.push_str(&format!(" [{note}]"));
        }
        out
    }
}

// ---------------------------------------------------------------------------
// DiagnosticParser
// ---------------------------------------------------------------------------

/// Compiled patterns for both record shapes.
#[derive(Debug, Clone)]
pub struct DiagnosticParser {
    single_line: Regex,
    header: Regex,
    detail: Regex,
    mood: Regex,
}

impl DiagnosticParser {
    pub fn new() -> Self {
        Self {
            single_line: Regex::new(r"^(.+?):(\d+):(\d+): ([A-Z]+\d+) (.*)$")
                .expect("static regex"),
            header: Regex::new(r"^(.+?):(\d+) (?:in|at) (.+):\s*$").expect("static regex"),
            detail: Regex::new(r"^\s*(D\d+): (.+?)\s*$").expect("static regex"),
            mood: Regex::new(r"imperative mood \(perhaps '([^']+)', not '([^']+)'\)")
                .expect("static regex"),
        }
    }

    /// Parse one block of analyzer output.
    ///
    /// `source` is the current content of the analyzed file, split into
    /// lines; it is only consulted to re-locate imperative-mood issues and
    /// may be empty when the target is a directory.
    pub fn parse<'a>(&'a self, output: &'a str, source: &'a [String]) -> Diagnostics<'a> {
        Diagnostics {
            parser: self,
            lines: output.lines(),
            source,
            header: None,
            skipped: 0,
        }
    }

    fn parse_single_line(&self, line: &str) -> Option<Issue> {
        let caps = self.single_line.captures(line)?;
        let reported: usize = caps[2].parse().ok()?;
        Some(Issue {
            path: caps[1].to_string(),
            line: reported.saturating_sub(1),
            column: caps[3].parse().ok(),
            code: caps[4].to_string(),
            message: caps[5].trim().to_string(),
            symbol: None,
            note: None,
            replacement: None,
            fixable: false,
        })
    }

    fn parse_header(&self, line: &str) -> Option<Header> {
        let caps = self.header.captures(line)?;
        Some(Header {
            path: caps[1].to_string(),
            line: caps[2].parse().ok()?,
            symbol: caps[3].to_string(),
        })
    }

    fn parse_detail(&self, header: &Header, line: &str, source: &[String]) -> Option<Issue> {
        let caps = self.detail.captures(line)?;
        let mut issue = Issue {
            path: header.path.clone(),
            line: header.line.saturating_sub(1),
            column: None,
            code: caps[1].to_string(),
            message: caps[2].to_string(),
            symbol: Some(header.symbol.clone()),
            note: None,
            replacement: None,
            fixable: false,
        };
        if issue.code == IMPERATIVE_MOOD {
            if let Some(m) = self.mood.captures(&issue.message) {
                let to = m[1].to_string();
                let from = m[2].to_string();
                match locate_word(source, header.line, &from) {
                    Some(found) => {
                        issue.line = found;
                        issue.replacement = Some(WordReplacement { from, to });
                    }
                    None => {
                        issue.note = Some(format!(
                            "unable to locate exact line for '{from}' in {}",
                            header.symbol
                        ));
                    }
                }
            }
        }
        Some(issue)
    }
}

impl Default for DiagnosticParser {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
struct Header {
    path: String,
    /// 1-based, as reported.
    line: usize,
    symbol: String,
}

/// Single-pass iterator over the issues found in one analyzer output block.
#[derive(Debug)]
pub struct Diagnostics<'a> {
    parser: &'a DiagnosticParser,
    lines: std::str::Lines<'a>,
    source: &'a [String],
    header: Option<Header>,
    skipped: usize,
}

impl Diagnostics<'_> {
    /// Number of non-blank lines that matched no known record shape so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl Iterator for Diagnostics<'_> {
    type Item = Issue;

    fn next(&mut self) -> Option<Issue> {
        for line in self.lines.by_ref() {
            if line.trim().is_empty() {
                continue;
            }
            if let Some(issue) = self.parser.parse_single_line(line) {
                return Some(issue);
            }
            if let Some(header) = self.parser.parse_header(line) {
                self.header = Some(header);
                continue;
            }
            // Detail lines are indented; anything else ends the current record.
            if !line.starts_with(char::is_whitespace) {
                self.header = None;
            }
            if let Some(header) = &self.header {
                if let Some(issue) = self.parser.parse_detail(header, line, self.source) {
                    return Some(issue);
                }
            }
            self.skipped += 1;
            tracing::debug!("skipping unparsable diagnostic line: {line}");
        }
        None
    }
}

/// Find the first line within the search window around the 1-based
/// `reported` line that contains `word` as a whole word.
fn locate_word(source: &[String], reported: usize, word: &str) -> Option<usize> {
    let reported = reported as isize - 1;
    MOOD_WINDOW
        .map(|offset| reported + offset)
        .filter(|idx| *idx >= 0 && (*idx as usize) < source.len())
        .map(|idx| idx as usize)
        .find(|idx| find_word(&source[*idx], word).is_some())
}

/// Byte offset of the first whole-word occurrence of `word` in `text`.
pub(crate) fn find_word(text: &str, word: &str) -> Option<usize> {
    if word.is_empty() {
        return None;
    }
    let is_word_char = |c: char| c.is_alphanumeric() || c == '_';
    let mut start = 0;
    while let Some(pos) = text[start..].find(word) {
        let at = start + pos;
        let end = at + word.len();
        let before_ok = text[..at].chars().next_back().map_or(true, |c| !is_word_char(c));
        let after_ok = text[end..].chars().next().map_or(true, |c| !is_word_char(c));
        if before_ok && after_ok {
            return Some(at);
        }
        start = at + word.len();
    }
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
