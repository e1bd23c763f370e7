//! Fix rule table and issue classification.
//!
//! Every diagnostic code with a deterministic mechanical edit maps to one
//! [`FixRule`]; everything else is left for a human.

use serde::{Deserialize, Serialize};

use crate::diagnostics::Issue;

// ---------------------------------------------------------------------------
// Rule table
// ---------------------------------------------------------------------------

/// Whitespace edits that never change the line count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WhitespaceFix {
    /// W291
    TrimTrailing,
    /// W293
    BlankWhitespaceLine,
    /// W292
    AppendFinalNewline,
}

/// Blank-line run adjustments around definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlankLineFix {
    /// E302: too few blank lines before a definition.
    BeforeDefinition,
    /// E305: too few blank lines after a definition, reported on the first
    /// statement following it.
    AfterDefinition,
    /// E303: a blank run longer than allowed.
    Excess,
}

/// The edit behavior attached to a diagnostic code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FixRule {
    Whitespace(WhitespaceFix),
    /// E265
    CommentSpacing,
    BlankLineCount(BlankLineFix),
    /// D401
    ImperativeMood,
}

const RULES: &[(&str, FixRule)] = &[
    ("W291", FixRule::Whitespace(WhitespaceFix::TrimTrailing)),
    ("W292", FixRule::Whitespace(WhitespaceFix::AppendFinalNewline)),
    ("W293", FixRule::Whitespace(WhitespaceFix::BlankWhitespaceLine)),
    ("E265", FixRule::CommentSpacing),
    ("E302", FixRule::BlankLineCount(BlankLineFix::BeforeDefinition)),
    ("E305", FixRule::BlankLineCount(BlankLineFix::AfterDefinition)),
    ("E303", FixRule::BlankLineCount(BlankLineFix::Excess)),
    ("D401", FixRule::ImperativeMood),
];

impl FixRule {
    /// Look up the rule for a diagnostic code.
    pub fn for_code(code: &str) -> Option<FixRule> {
        RULES
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, rule)| *rule)
    }

    /// Resolve the rule for a concrete issue. Imperative-mood issues are only
    /// fixable once the parser has located the word to replace.
    pub fn for_issue(issue: &Issue) -> Option<FixRule> {
        match Self::for_code(&issue.code)? {
            FixRule::ImperativeMood if issue.replacement.is_none() => None,
            rule => Some(rule),
        }
    }

    /// Whether applying this rule changes the file's line count.
    pub fn is_structural(&self) -> bool {
        matches!(self, FixRule::BlankLineCount(_))
    }
}

// ---------------------------------------------------------------------------
// IssueClassifier
// ---------------------------------------------------------------------------

/// Result of partitioning a batch of issues.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub auto_fixable: Vec<Issue>,
    pub manual: Vec<Issue>,
}

impl Classification {
    pub fn total(&self) -> usize {
        self.auto_fixable.len() + self.manual.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct IssueClassifier;

impl IssueClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Partition issues into auto-fixable and manual, preserving input order
    /// within each side. Each returned issue carries its `fixable` verdict.
    pub fn classify(&self, issues: impl IntoIterator<Item = Issue>) -> Classification {
        let mut out = Classification::default();
        for issue in issues {
            let fixable = FixRule::for_issue(&issue).is_some();
            let issue = Issue { fixable, ..issue };
            if fixable {
                out.auto_fixable.push(issue);
            } else {
                out.manual.push(issue);
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
