//! End-to-end smoke tests for remedy-core.
//!
//! These integration tests live in `tests/` (outside `src/`) and exercise
//! public APIs across module boundaries. Real analyzers are replaced by
//! in-process stand-ins that derive diagnostics from the file's current
//! content, so a fixed file really does come back clean.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};

use remedy_core::analyzer::{Analyzer, AnalyzerKind, AnalyzerOutput};
use remedy_core::backup::PRERESTORE_TOOL;
use remedy_core::config::RemedyConfig;
use remedy_core::mcp::McpServer;
use remedy_core::orchestrator::RemediationState;
use remedy_core::remediation;
use remedy_core::tool::ToolRegistry;
use remedy_core::{ErrorKind, Remediator};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Reports W291, W293 and W292 the way pycodestyle would.
struct WhitespaceLint;

impl Analyzer for WhitespaceLint {
    fn name(&self) -> &str {
        "whitespace-lint"
    }

    fn run(&self, target: &Path) -> remedy_core::Result<AnalyzerOutput> {
        let text = fs::read_to_string(target).unwrap_or_default();
        let name = target.display();
        let mut out = String::new();
        let lines: Vec<&str> = text.split_inclusive('\n').collect();
        for (i, line) in lines.iter().enumerate() {
            let body = line.trim_end_matches('\n');
            let n = i + 1;
            if !body.is_empty() && body.trim().is_empty() {
                out.push_str(&format!("{name}:{n}:1: W293 blank line contains whitespace\n"));
            } else if body != body.trim_end() {
                let col = body.trim_end().len() + 1;
                out.push_str(&format!("{name}:{n}:{col}: W291 trailing whitespace\n"));
            }
            if body.len() > 79 {
                out.push_str(&format!("{name}:{n}:80: E501 line too long ({} > 79 characters)\n", body.len()));
            }
        }
        if let Some(last) = lines.last() {
            if !last.ends_with('\n') {
                let n = lines.len();
                out.push_str(&format!("{name}:{n}:{}: W292 no newline at end of file\n", last.len() + 1));
            }
        }
        Ok(AnalyzerOutput {
            exit_code: Some(if out.is_empty() { 0 } else { 1 }),
            stdout: out,
            stderr: String::new(),
        })
    }
}

/// Reports D401 for any docstring opening with "Returns".
struct MoodLint;

impl Analyzer for MoodLint {
    fn name(&self) -> &str {
        "mood-lint"
    }

    fn run(&self, target: &Path) -> remedy_core::Result<AnalyzerOutput> {
        let text = fs::read_to_string(target).unwrap_or_default();
        let mut out = String::new();
        let mut current_def = None;
        for (i, line) in text.lines().enumerate() {
            if let Some(rest) = line.trim_start().strip_prefix("def ") {
                let name = rest.split('(').next().unwrap_or_default().to_string();
                current_def = Some((i + 1, name));
            }
            if line.trim_start().starts_with("\"\"\"Returns ") {
                if let Some((def_line, name)) = &current_def {
                    out.push_str(&format!(
                        "{}:{def_line} in public function `{name}`:\n        D401: First line should be in imperative mood (perhaps 'Return', not 'Returns')\n",
                        target.display()
                    ));
                }
            }
        }
        Ok(AnalyzerOutput {
            exit_code: Some(if out.is_empty() { 0 } else { 1 }),
            stdout: out,
            stderr: String::new(),
        })
    }
}

fn workspace() -> (tempfile::TempDir, RemedyConfig) {
    let dir = tempfile::tempdir().unwrap();
    let cfg = RemedyConfig {
        workspace: dir.path().to_path_buf(),
        command_log: None,
        ..Default::default()
    };
    (dir, cfg)
}

fn remediator(cfg: &RemedyConfig) -> Remediator {
    Remediator::with_analyzers(cfg, Box::new(WhitespaceLint), Box::new(MoodLint))
}

fn parse_response(raw: &str) -> Value {
    serde_json::from_str(raw).expect("response must be valid JSON")
}

// ---------------------------------------------------------------------------
// Test 1: fix repairs trailing whitespace and a missing final newline
// ---------------------------------------------------------------------------

#[test]
fn smoke_fix_trailing_space_and_final_newline() {
    let (dir, cfg) = workspace();
    let file = dir.path().join("talker.py");
    fs::write(&file, "import rclpy\nnode = rclpy.create_node('talker')   ").unwrap();
    let r = remediator(&cfg);

    let report = r.fix("talker.py", AnalyzerKind::Style).unwrap();
    assert_eq!(
        fs::read_to_string(&file).unwrap(),
        "import rclpy\nnode = rclpy.create_node('talker')\n"
    );
    assert_eq!(report.modifications.len(), 2);
    assert!(report.modifications.iter().all(|m| m.line == 1));
    assert_eq!(report.trace.current(), RemediationState::Reported);

    let backup = report.backup.expect("snapshot before patching");
    assert_eq!(
        fs::read_to_string(&backup.backup_path).unwrap(),
        "import rclpy\nnode = rclpy.create_node('talker')   "
    );
}

// ---------------------------------------------------------------------------
// Test 2: a second fix after the first is a no-op
// ---------------------------------------------------------------------------

#[test]
fn smoke_fix_is_idempotent() {
    let (dir, cfg) = workspace();
    fs::write(dir.path().join("a.py"), "x = 1  \n  \ny = 2").unwrap();
    let r = remediator(&cfg);

    let first = r.fix("a.py", AnalyzerKind::Style).unwrap();
    assert!(!first.modifications.is_empty());

    let second = r.fix("a.py", AnalyzerKind::Style).unwrap();
    assert!(second.nothing_to_do());
    assert!(second.modifications.is_empty());
    assert_eq!(r.list_backups("a.py").unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// Test 3: manual issues survive a fix untouched
// ---------------------------------------------------------------------------

#[test]
fn smoke_manual_issues_are_reported_not_touched() {
    let (dir, cfg) = workspace();
    let long = format!("x = '{}'\n", "a".repeat(90));
    fs::write(dir.path().join("a.py"), format!("{long}y = 2 \n")).unwrap();
    let r = remediator(&cfg);

    let analysis = r.analyze("a.py", AnalyzerKind::Style).unwrap();
    assert_eq!(analysis.auto_fixable.len(), 1);
    assert_eq!(analysis.manual.len(), 1);
    assert_eq!(analysis.manual[0].code, "E501");

    let report = r.fix("a.py", AnalyzerKind::Style).unwrap();
    assert_eq!(report.modifications.len(), 1);
    assert_eq!(report.manual.len(), 1);
    assert_eq!(
        fs::read_to_string(dir.path().join("a.py")).unwrap(),
        format!("{long}y = 2\n")
    );
}

// ---------------------------------------------------------------------------
// Test 4: docstring mood fix
// ---------------------------------------------------------------------------

#[test]
fn smoke_docstring_mood_fix() {
    let (dir, cfg) = workspace();
    let file = dir.path().join("node.py");
    fs::write(
        &file,
        "def spin(node):\n    \"\"\"Returns the node after one spin.\"\"\"\n    return node\n",
    )
    .unwrap();
    let r = remediator(&cfg);

    let analysis = r.analyze("node.py", AnalyzerKind::Docstrings).unwrap();
    assert_eq!(analysis.auto_fixable.len(), 1);
    assert_eq!(analysis.auto_fixable[0].line, 1);

    let report = r.fix("node.py", AnalyzerKind::Docstrings).unwrap();
    assert_eq!(report.backup.unwrap().tool, "fix_docstrings");
    assert_eq!(
        fs::read_to_string(&file).unwrap(),
        "def spin(node):\n    \"\"\"Return the node after one spin.\"\"\"\n    return node\n"
    );
    assert!(r.analyze("node.py", AnalyzerKind::Docstrings).unwrap().is_clean());
}

// ---------------------------------------------------------------------------
// Test 5: backup twice, restore the older one
// ---------------------------------------------------------------------------

#[test]
fn smoke_backup_twice_restore_older() {
    let (dir, cfg) = workspace();
    let file = dir.path().join("launch.py");
    fs::write(&file, "older\n").unwrap();
    let r = remediator(&cfg);

    let first = r.backup("launch.py").unwrap();
    fs::write(&file, "newer\n").unwrap();
    let second = r.backup("launch.py").unwrap();
    assert_ne!(first.label, second.label);
    fs::write(&file, "live\n").unwrap();

    let outcome = r.restore("launch.py", Some(2)).unwrap();
    assert_eq!(outcome.restored.backup_path, first.backup_path);
    assert_eq!(fs::read_to_string(&file).unwrap(), "older\n");

    let listed = r.list_backups("launch.py").unwrap();
    assert_eq!(listed.len(), 3);
    assert_eq!(listed[0].tool, PRERESTORE_TOOL);
    assert_eq!(fs::read_to_string(&listed[0].backup_path).unwrap(), "live\n");
}

// ---------------------------------------------------------------------------
// Test 6: out-of-range restore writes nothing but still snapshots
// ---------------------------------------------------------------------------

#[test]
fn smoke_invalid_version_restore() {
    let (dir, cfg) = workspace();
    let file = dir.path().join("a.py");
    fs::write(&file, "v1\n").unwrap();
    let r = remediator(&cfg);
    r.backup("a.py").unwrap();
    fs::write(&file, "v2\n").unwrap();

    let err = r.restore("a.py", Some(5)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidVersion);
    assert_eq!(err.to_string(), "Invalid version 5. Available versions: 1-1");
    assert_eq!(fs::read_to_string(&file).unwrap(), "v2\n");
    assert_eq!(r.list_backups("a.py").unwrap().len(), 2);
}

// ---------------------------------------------------------------------------
// Test 7: the JSON-RPC server drives the same operations
// ---------------------------------------------------------------------------

#[test]
fn smoke_mcp_fix_and_restore() {
    let (dir, cfg) = workspace();
    let file = dir.path().join("pkg").join("talker.py");
    fs::create_dir_all(file.parent().unwrap()).unwrap();
    fs::write(&file, "x = 1   \n").unwrap();

    let mut registry = ToolRegistry::new();
    remediation::register_all(&mut registry, Arc::new(remediator(&cfg)));
    let srv = McpServer::new(registry);

    let call = |id: u64, name: &str, arguments: Value| {
        let req = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "tools/call",
            "params": {"name": name, "arguments": arguments}
        });
        parse_response(&srv.handle_message(&req.to_string()).expect("response"))
    };

    let analysis = call(1, "analyze_flake8", json!({"path": "talker.py"}));
    let text = analysis["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("Summary: 1 of 1 issues can be automatically fixed."));
    assert_eq!(fs::read_to_string(&file).unwrap(), "x = 1   \n");

    let fixed = call(2, "fix_flake8", json!({"path": "talker.py"}));
    let text = fixed["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.starts_with("Applied 1 automatic fixes to talker.py:"));
    assert!(text.contains(r#"Line 1: "x = 1   " -> "x = 1""#));
    assert_eq!(fs::read_to_string(&file).unwrap(), "x = 1\n");

    let restored = call(3, "restore", json!({"path": "pkg/talker.py"}));
    assert!(restored["result"]["isError"].is_null());
    assert_eq!(fs::read_to_string(&file).unwrap(), "x = 1   \n");

    let listing = call(4, "list_backups", json!({"path": "talker.py"}));
    let text = listing["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("  1. "));
    assert!(text.contains("(by prerestore)"));
    assert!(text.contains("(by fix_flake8)"));

    assert_eq!(srv.audit_log().len(), 4);
}
