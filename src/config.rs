use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{RemedyError, Result};

/// Name of the optional per-workspace configuration file.
pub const WORKSPACE_CONFIG_FILE: &str = ".remedy.json";

/// How to invoke one external analyzer. The target path is appended as the
/// final argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl AnalyzerCommand {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemedyConfig {
    pub workspace: PathBuf,
    pub backup_dir: String,
    pub index_file: String,
    pub exclude_dirs: Vec<String>,
    pub flake8: AnalyzerCommand,
    pub pydocstyle: AnalyzerCommand,
    pub command_log: Option<String>,
}

impl Default for RemedyConfig {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from("."),
            backup_dir: ".mcp_backups".to_string(),
            index_file: "backup_index.json".to_string(),
            exclude_dirs: ["build", "install", "log", ".git", ".vscode", "__pycache__"]
                .iter()
                .map(|d| d.to_string())
                .collect(),
            flake8: AnalyzerCommand::new("flake8", &[]),
            pydocstyle: AnalyzerCommand::new("pydocstyle", &["--convention=pep257"]),
            command_log: Some("mcp_command.log".to_string()),
        }
    }
}

impl RemedyConfig {
    /// Resolve configuration from the environment.
    ///
    /// `REMEDY_CONFIG` names a JSON file to load; `REMEDY_WORKSPACE` then
    /// overrides the workspace root. Without either, a `.remedy.json` in the
    /// current directory is used when present. Unreadable files fall back to
    /// defaults with a warning.
    pub fn load_or_default() -> Self {
        let explicit = std::env::var_os("REMEDY_CONFIG").map(PathBuf::from);
        let mut cfg = match explicit {
            Some(path) => Self::load_from(&path).unwrap_or_else(|e| {
                tracing::warn!("ignoring config {}: {e}", path.display());
                Self::default()
            }),
            None => Self::default(),
        };
        if let Some(ws) = std::env::var_os("REMEDY_WORKSPACE") {
            cfg.workspace = PathBuf::from(ws);
        }
        cfg.with_workspace_overrides()
    }

    /// Load a configuration file; absent fields take their defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| RemedyError::io(path, e))?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Merge a workspace-local `.remedy.json` over this configuration,
    /// keeping the current workspace root.
    pub fn with_workspace_overrides(self) -> Self {
        let local = self.workspace.join(WORKSPACE_CONFIG_FILE);
        if !local.is_file() {
            return self;
        }
        match Self::load_from(&local) {
            Ok(mut cfg) => {
                cfg.workspace = self.workspace;
                cfg
            }
            Err(e) => {
                tracing::warn!("ignoring {}: {e}", local.display());
                self
            }
        }
    }

    pub fn command_log_path(&self) -> Option<PathBuf> {
        self.command_log.as_ref().map(|p| self.workspace.join(p))
    }

    pub fn json_schema() -> String {
        let command = serde_json::json!({
            "type": "object",
            "properties": {
                "program": { "type": "string" },
                "args": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["program"]
        });
        serde_json::to_string_pretty(&serde_json::json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "title": "Remedy Configuration",
            "type": "object",
            "properties": {
                "workspace": { "type": "string", "default": "." },
                "backup_dir": { "type": "string", "default": ".mcp_backups" },
                "index_file": { "type": "string", "default": "backup_index.json" },
                "exclude_dirs": {
                    "type": "array",
                    "items": { "type": "string" }
                },
                "flake8": command.clone(),
                "pydocstyle": command,
                "command_log": {
                    "type": ["string", "null"],
                    "default": "mcp_command.log"
                }
            }
        }))
        .unwrap_or_default()
    }
}
