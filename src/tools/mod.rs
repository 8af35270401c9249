//! Tools exposed to MCP clients.
//!
//! Each tool wraps one bridge capability (a one-shot agent run, isolated patch
//! generation, model listing, cloud API passthrough) behind a JSON-schema
//! described interface.
//!
//! ## Workspace-First Design
//!
//! Relative `cwd` arguments resolve from the workspace directory; absolute
//! paths are used as-is.

pub mod autostart;
mod cloud;
mod cursor;

pub use autostart::{ensure_bridge, AutoStart};
pub use cloud::CloudRequest;
pub use cursor::{GeneratePatch, ListModels, RunAgent};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::config::{AgentMode, Config};

/// Resolve a path relative to the workspace. Absolute paths are kept.
pub fn resolve_path(path_str: &str, workspace: &Path) -> PathBuf {
    let path = Path::new(path_str);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workspace.join(path)
    }
}

/// Read an optional `mode` argument.
fn mode_arg(args: &Value, default: AgentMode) -> anyhow::Result<AgentMode> {
    match args["mode"].as_str() {
        Some(raw) => raw.parse::<AgentMode>().map_err(|e| anyhow::anyhow!(e)),
        None => Ok(default),
    }
}

fn required_str<'a>(args: &'a Value, name: &str) -> anyhow::Result<&'a str> {
    args[name]
        .as_str()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| anyhow::anyhow!("Missing '{}' argument", name))
}

/// Tool description as advertised to clients.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Trait for implementing tools.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool.
    fn name(&self) -> &str;

    /// A description of what this tool does.
    fn description(&self) -> &str;

    /// JSON schema for the tool's parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute the tool with the given arguments.
    ///
    /// The `working_dir` is the default directory for relative paths.
    async fn execute(&self, args: Value, working_dir: &Path) -> anyhow::Result<String>;
}

/// Registry of available tools.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Registry with every bridge tool, configured from `config`.
    pub fn for_config(config: &Config) -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(RunAgent::new(config.clone())));
        registry.register(Arc::new(GeneratePatch::new(config.clone())));
        registry.register(Arc::new(ListModels::new(config.clone())));
        registry.register(Arc::new(CloudRequest::new(&config.cloud)));
        registry
    }

    /// Create an empty registry.
    pub fn empty() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Definitions sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                input_schema: tool.parameters_schema(),
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub async fn execute(
        &self,
        name: &str,
        args: Value,
        working_dir: &Path,
    ) -> anyhow::Result<String> {
        let tool = self
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("Unknown tool: {}", name))?;
        tool.execute(args, working_dir).await
    }
}
