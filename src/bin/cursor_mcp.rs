//! MCP server exposing the Cursor bridge tools.
//!
//! Communicates over stdio using JSON-RPC 2.0. Logs go to stderr; stdout
//! carries protocol messages only.

use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cursor_bridge::config::Config;
use cursor_bridge::tools::{ensure_bridge, AutoStart, ToolRegistry};

const PROTOCOL_VERSION: &str = "2024-11-05";

// =============================================================================
// JSON-RPC Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[serde(rename = "jsonrpc")]
    _jsonrpc: String,
    #[serde(default)]
    id: Value,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: String,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

impl JsonRpcResponse {
    fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

#[derive(Debug, Serialize)]
struct ToolResult {
    content: Vec<ToolContent>,
    #[serde(rename = "isError")]
    is_error: bool,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ToolContent {
    #[serde(rename = "text")]
    Text { text: String },
}

impl ToolResult {
    fn text(text: String, is_error: bool) -> Self {
        Self {
            content: vec![ToolContent::Text { text }],
            is_error,
        }
    }
}

// =============================================================================
// Request handling
// =============================================================================

fn workspace_from_initialize(params: &Value) -> Option<PathBuf> {
    if let Some(path) = params.get("rootPath").and_then(|v| v.as_str()) {
        return Some(PathBuf::from(path));
    }
    let from_uri = |uri: &str| uri.strip_prefix("file://").map(PathBuf::from);
    if let Some(path) = params.get("rootUri").and_then(|v| v.as_str()).and_then(from_uri) {
        return Some(path);
    }
    params
        .get("workspaceFolders")
        .and_then(|v| v.as_array())?
        .iter()
        .find_map(|folder| folder.get("uri").and_then(|v| v.as_str()).and_then(from_uri))
}

struct Server {
    runtime: tokio::runtime::Runtime,
    tools: ToolRegistry,
    working_dir: PathBuf,
}

impl Server {
    fn call_tool(&self, name: &str, args: Value) -> ToolResult {
        match self
            .runtime
            .block_on(self.tools.execute(name, args, &self.working_dir))
        {
            Ok(text) => ToolResult::text(text, false),
            Err(e) => {
                tracing::warn!("Tool {} failed: {:#}", name, e);
                ToolResult::text(format!("Tool error: {:#}", e), true)
            }
        }
    }

    fn handle_request(&mut self, request: &JsonRpcRequest) -> Option<JsonRpcResponse> {
        match request.method.as_str() {
            "initialize" => {
                if let Some(path) = workspace_from_initialize(&request.params) {
                    tracing::info!("Client workspace: {}", path.display());
                    self.working_dir = path;
                }
                Some(JsonRpcResponse::success(
                    request.id.clone(),
                    json!({
                        "protocolVersion": PROTOCOL_VERSION,
                        "serverInfo": {
                            "name": "cursor-mcp",
                            "version": env!("CARGO_PKG_VERSION"),
                        },
                        "capabilities": {
                            "tools": {
                                "listChanged": false
                            }
                        }
                    }),
                ))
            }
            "notifications/initialized" | "initialized" => None,
            "tools/list" => Some(JsonRpcResponse::success(
                request.id.clone(),
                json!({ "tools": self.tools.definitions() }),
            )),
            "tools/call" => {
                let name = request
                    .params
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                let args = request
                    .params
                    .get("arguments")
                    .cloned()
                    .unwrap_or(json!({}));
                let result = self.call_tool(name, args);
                Some(JsonRpcResponse::success(request.id.clone(), json!(result)))
            }
            _ => Some(JsonRpcResponse::error(
                request.id.clone(),
                -32601,
                format!("Method not found: {}", request.method),
            )),
        }
    }

    /// Handle one input line. Blank lines and notifications produce nothing.
    fn handle_line(&mut self, line: &str) -> Option<JsonRpcResponse> {
        if line.trim().is_empty() {
            return None;
        }
        match serde_json::from_str::<JsonRpcRequest>(line) {
            Ok(request) => self.handle_request(&request),
            Err(e) => Some(JsonRpcResponse::error(Value::Null, -32700, e.to_string())),
        }
    }
}

fn write_response(out: &mut impl Write, response: &JsonRpcResponse) -> std::io::Result<()> {
    let encoded = serde_json::to_string(response)?;
    writeln!(out, "{}", encoded)?;
    out.flush()
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cursor_bridge=info,cursor_mcp=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .init();
}

fn report_bridge(result: &AutoStart, url: &str) {
    match result {
        AutoStart::AlreadyRunning => tracing::info!("Bridge is running at {}", url),
        AutoStart::Started => tracing::info!("Started bridge at {}", url),
        AutoStart::Skipped(reason) => tracing::info!("Bridge not started: {}", reason),
        AutoStart::Failed(reason) => tracing::warn!("Bridge auto-start failed: {}", reason),
    }
}

fn main() -> anyhow::Result<()> {
    init_logging();

    let config = Config::from_env()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let bridge = runtime.block_on(ensure_bridge(&config));
    report_bridge(&bridge, &config.bridge_url);

    let mut server = Server {
        tools: ToolRegistry::for_config(&config),
        working_dir: config.workspace.clone(),
        runtime,
    };
    tracing::info!("cursor-mcp ready (workspace {})", server.working_dir.display());

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    for line in BufReader::new(stdin.lock()).lines() {
        let line = line?;
        if let Some(response) = server.handle_line(&line) {
            write_response(&mut stdout, &response)?;
        }
    }
    Ok(())
}
