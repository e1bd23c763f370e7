//! Minimal MCP (Model Context Protocol) server.
//!
//! Implements a JSON-RPC 2.0 server over stdio (newline-delimited messages)
//! that exposes the remediation tools to an external client. Every
//! `tools/call` is recorded in the command log.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::cell::RefCell;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

use crate::audit::{AuditEntry, AuditLog, CommandStatus};
use crate::config::RemedyConfig;
use crate::orchestrator::Remediator;
use crate::remediation;
use crate::tool::ToolRegistry;

// ---------------------------------------------------------------------------
// JSON-RPC 2.0 types
// ---------------------------------------------------------------------------

/// Incoming JSON-RPC request (may be a notification if `id` is absent).
#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

/// Outgoing JSON-RPC success response.
#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: String,
    id: Value,
    result: Value,
}

/// Outgoing JSON-RPC error response.
#[derive(Debug, Serialize)]
struct JsonRpcErrorResponse {
    jsonrpc: String,
    id: Value,
    error: JsonRpcError,
}

#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

// Standard JSON-RPC error codes
const PARSE_ERROR: i64 = -32700;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

const PROTOCOL_VERSION: &str = "2024-11-05";

// ---------------------------------------------------------------------------
// McpServer
// ---------------------------------------------------------------------------

/// A minimal MCP server that routes JSON-RPC messages to a [`ToolRegistry`].
pub struct McpServer {
    registry: ToolRegistry,
    audit_log: RefCell<AuditLog>,
}

impl McpServer {
    /// Create a server over `registry` with an in-memory command log.
    pub fn new(registry: ToolRegistry) -> Self {
        Self::with_audit_log(registry, AuditLog::new())
    }

    pub fn with_audit_log(registry: ToolRegistry, audit_log: AuditLog) -> Self {
        Self {
            registry,
            audit_log: RefCell::new(audit_log),
        }
    }

    /// Create a server with every remediation tool, logging commands to the
    /// configured command log file.
    pub fn from_config(cfg: &RemedyConfig) -> Self {
        let mut registry = ToolRegistry::new();
        remediation::register_all(&mut registry, Arc::new(Remediator::new(cfg)));
        let audit_log = match cfg.command_log_path() {
            Some(path) => AuditLog::with_sink(path),
            None => AuditLog::new(),
        };
        Self::with_audit_log(registry, audit_log)
    }

    /// Access the command log (e.g. for export after a session).
    pub fn audit_log(&self) -> std::cell::Ref<'_, AuditLog> {
        self.audit_log.borrow()
    }

    // -- public entry point ------------------------------------------------

    /// Parse a single JSON-RPC line and return an optional response.
    ///
    /// Returns `None` for notifications (messages without an `id`).
    pub fn handle_message(&self, line: &str) -> Option<String> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        let req: JsonRpcRequest = match serde_json::from_str(trimmed) {
            Ok(r) => r,
            Err(e) => {
                // Parse error: respond with null id.
                return Some(to_line(&JsonRpcErrorResponse {
                    jsonrpc: "2.0".into(),
                    id: Value::Null,
                    error: JsonRpcError {
                        code: PARSE_ERROR,
                        message: format!("Parse error: {e}"),
                    },
                }));
            }
        };

        let id = req.id?;

        let result = match req.method.as_str() {
            "initialize" => self.handle_initialize(),
            "tools/list" => self.handle_tools_list(),
            "tools/call" => self.handle_tools_call(&req.params),
            _ => Err((
                METHOD_NOT_FOUND,
                format!("Method not found: {}", req.method),
            )),
        };

        let response = match result {
            Ok(value) => to_line(&JsonRpcResponse {
                jsonrpc: "2.0".into(),
                id,
                result: value,
            }),
            Err((code, message)) => to_line(&JsonRpcErrorResponse {
                jsonrpc: "2.0".into(),
                id,
                error: JsonRpcError { code, message },
            }),
        };

        Some(response)
    }

    /// Run the server over stdio, reading newline-delimited JSON-RPC messages
    /// from stdin and writing responses to stdout.
    pub fn run_stdio(&self) -> io::Result<()> {
        let stdin = io::stdin();
        let mut stdout = io::stdout();

        tracing::info!(tools = self.registry.len(), "MCP server started (stdio mode)");

        for line in stdin.lock().lines() {
            let line = line?;
            if let Some(response) = self.handle_message(&line) {
                writeln!(stdout, "{response}")?;
                stdout.flush()?;
            }
        }

        tracing::info!("MCP server shutting down");
        Ok(())
    }

    // -- method handlers ---------------------------------------------------

    fn handle_initialize(&self) -> Result<Value, (i64, String)> {
        Ok(json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": {}
            },
            "serverInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION")
            }
        }))
    }

    fn handle_tools_list(&self) -> Result<Value, (i64, String)> {
        let tools: Vec<Value> = self
            .registry
            .list()
            .iter()
            .map(|spec| {
                json!({
                    "name": spec.name,
                    "description": spec.description,
                    "inputSchema": spec.parameters_schema
                })
            })
            .collect();

        Ok(json!({ "tools": tools }))
    }

    fn handle_tools_call(&self, params: &Value) -> Result<Value, (i64, String)> {
        let name = params.get("name").and_then(|v| v.as_str()).ok_or_else(|| {
            (
                INVALID_PARAMS,
                "Missing required parameter: name".to_string(),
            )
        })?;

        let arguments = params
            .get("arguments")
            .cloned()
            .unwrap_or_else(|| json!({}));

        let Some(tool) = self.registry.get(name) else {
            let message = format!("Tool not found: {name}");
            self.record(name, arguments, CommandStatus::Rejected, &message);
            return Err((INVALID_PARAMS, message));
        };

        let result = match tool.execute(arguments.clone()) {
            Ok(result) => result,
            Err(e) => {
                let message = format!("Invalid arguments for {name}: {e}");
                self.record(name, arguments, CommandStatus::Rejected, &message);
                return Err((INVALID_PARAMS, message));
            }
        };

        if result.success {
            self.record(name, arguments, CommandStatus::Succeeded, &result.output);
            Ok(json!({
                "content": [{
                    "type": "text",
                    "text": result.output
                }]
            }))
        } else {
            let text = result.error.unwrap_or_else(|| "Unknown error".into());
            self.record(name, arguments, CommandStatus::Failed, &text);
            Ok(json!({
                "content": [{
                    "type": "text",
                    "text": text
                }],
                "isError": true
            }))
        }
    }

    fn record(&self, name: &str, arguments: Value, status: CommandStatus, message: &str) {
        tracing::info!(tool = name, ?status, "tools/call");
        self.audit_log
            .borrow_mut()
            .record(AuditEntry::now(name, arguments, status, message));
    }
}

fn to_line<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| {
        format!(
            r#"{{"jsonrpc":"2.0","id":null,"error":{{"code":-32603,"message":"Internal error: {}"}}}}"#,
            e.to_string().replace('"', "'")
        )
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
