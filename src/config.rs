//! Configuration management for the Cursor bridge.
//!
//! Configuration is set via environment variables:
//! - `CURSOR_AGENT_BIN` - Optional. The agent executable. Defaults to `cursor-agent`.
//! - `CURSOR_BRIDGE_HOST` - Optional. Server host. Defaults to `127.0.0.1`.
//! - `CURSOR_BRIDGE_PORT` - Optional. Server port. Defaults to `8765`.
//! - `CURSOR_BRIDGE_API_KEY` - Optional. When set, every request must carry `Authorization: Bearer <key>`.
//! - `CURSOR_BRIDGE_WORKSPACE` - Optional. Workspace passed to the agent. Defaults to current directory.
//! - `CURSOR_BRIDGE_MODE` - Optional. `ask`, `plan` or `agent`. Defaults to `ask`.
//! - `CURSOR_BRIDGE_DEFAULT_MODEL` - Optional. Fallback model. Defaults to `auto`.
//! - `CURSOR_BRIDGE_FORCE` - Optional. Pass `--force` to the agent. Defaults to `false`.
//! - `CURSOR_BRIDGE_APPROVE_MCPS` - Optional. Pass `--approve-mcps`. Defaults to `false`.
//! - `CURSOR_BRIDGE_STRICT_MODEL` - Optional. Prefer the pinned model over the default. Defaults to `true`.
//! - `CURSOR_BRIDGE_TIMEOUT_MS` - Optional. Per-invocation timeout. Defaults to `300000`.
//! - `CURSOR_API_KEY` - Optional. Bearer token for the cloud REST API.
//! - `CURSOR_API_BASE_URL` - Optional. Cloud REST API base URL. Defaults to `https://api.cursor.com`.
//! - `CURSOR_BRIDGE_URL` - Optional. Bridge URL probed by the MCP shim.
//! - `CURSOR_BRIDGE_AUTOSTART` - Optional. Let the MCP shim start the bridge. Defaults to `false`.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::util::{env_var_bool, env_var_nonempty};

pub const DEFAULT_AGENT_BIN: &str = "cursor-agent";
pub const DEFAULT_MODEL: &str = "auto";
pub const DEFAULT_CLOUD_BASE_URL: &str = "https://api.cursor.com";
const DEFAULT_TIMEOUT_MS: u64 = 300_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Agent execution mode (`--mode`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    Ask,
    Plan,
    /// The CLI's own default; never emitted as a flag.
    #[default]
    Agent,
}

impl AgentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentMode::Ask => "ask",
            AgentMode::Plan => "plan",
            AgentMode::Agent => "agent",
        }
    }

    /// Whether the CLI runs in this mode without an explicit `--mode` flag.
    pub fn is_implicit_default(&self) -> bool {
        matches!(self, AgentMode::Agent)
    }
}

impl fmt::Display for AgentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ask" => Ok(AgentMode::Ask),
            "plan" => Ok(AgentMode::Plan),
            "agent" => Ok(AgentMode::Agent),
            other => Err(format!("unknown mode '{}' (expected ask, plan or agent)", other)),
        }
    }
}

/// Cloud REST API configuration.
#[derive(Debug, Clone)]
pub struct CloudConfig {
    pub api_key: Option<String>,
    pub base_url: String,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_CLOUD_BASE_URL.to_string(),
        }
    }
}

/// Bridge configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Agent executable (name on `PATH` or absolute path)
    pub agent_bin: String,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Bearer token required on every request, if any
    pub api_key: Option<String>,

    /// Workspace directory handed to the agent
    pub workspace: PathBuf,

    pub mode: AgentMode,

    /// Model used when neither the request nor the pinning state provide one
    pub default_model: String,

    pub force: bool,

    pub approve_mcps: bool,

    /// Prefer the pinned model over the request's `auto`/missing model
    pub strict_model: bool,

    /// Timeout applied to every agent invocation
    pub timeout: Duration,

    pub cloud: CloudConfig,

    /// Where the MCP shim looks for a running bridge
    pub bridge_url: String,

    pub autostart: bool,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a port, mode or timeout cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let agent_bin =
            env_var_nonempty("CURSOR_AGENT_BIN").unwrap_or_else(|| DEFAULT_AGENT_BIN.to_string());

        let host =
            env_var_nonempty("CURSOR_BRIDGE_HOST").unwrap_or_else(|| "127.0.0.1".to_string());

        let port = env_var_nonempty("CURSOR_BRIDGE_PORT")
            .unwrap_or_else(|| "8765".to_string())
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidValue("CURSOR_BRIDGE_PORT".to_string(), e.to_string()))?;

        let workspace = env_var_nonempty("CURSOR_BRIDGE_WORKSPACE")
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

        let mode = match env_var_nonempty("CURSOR_BRIDGE_MODE") {
            Some(raw) => raw
                .parse::<AgentMode>()
                .map_err(|e| ConfigError::InvalidValue("CURSOR_BRIDGE_MODE".to_string(), e))?,
            None => AgentMode::Ask,
        };

        let timeout_ms = match env_var_nonempty("CURSOR_BRIDGE_TIMEOUT_MS") {
            Some(raw) => parse_timeout_ms(&raw).map_err(|e| {
                ConfigError::InvalidValue("CURSOR_BRIDGE_TIMEOUT_MS".to_string(), e)
            })?,
            None => DEFAULT_TIMEOUT_MS,
        };

        let bridge_url = env_var_nonempty("CURSOR_BRIDGE_URL")
            .unwrap_or_else(|| format!("http://{}:{}", host, port));

        let cloud = CloudConfig {
            api_key: env_var_nonempty("CURSOR_API_KEY"),
            base_url: env_var_nonempty("CURSOR_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_CLOUD_BASE_URL.to_string()),
        };

        Ok(Self {
            agent_bin,
            host,
            port,
            api_key: env_var_nonempty("CURSOR_BRIDGE_API_KEY"),
            workspace,
            mode,
            default_model: env_var_nonempty("CURSOR_BRIDGE_DEFAULT_MODEL")
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            force: env_var_bool("CURSOR_BRIDGE_FORCE", false),
            approve_mcps: env_var_bool("CURSOR_BRIDGE_APPROVE_MCPS", false),
            strict_model: env_var_bool("CURSOR_BRIDGE_STRICT_MODEL", true),
            timeout: Duration::from_millis(timeout_ms),
            cloud,
            bridge_url,
            autostart: env_var_bool("CURSOR_BRIDGE_AUTOSTART", false),
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(workspace: PathBuf) -> Self {
        Self {
            agent_bin: DEFAULT_AGENT_BIN.to_string(),
            host: "127.0.0.1".to_string(),
            port: 8765,
            api_key: None,
            workspace,
            mode: AgentMode::Ask,
            default_model: DEFAULT_MODEL.to_string(),
            force: false,
            approve_mcps: false,
            strict_model: true,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            cloud: CloudConfig::default(),
            bridge_url: "http://127.0.0.1:8765".to_string(),
            autostart: false,
        }
    }

    /// Whether requests must present a bearer token.
    pub fn auth_required(&self) -> bool {
        self.api_key.is_some()
    }
}

fn parse_timeout_ms(raw: &str) -> Result<u64, String> {
    let value = raw.trim().parse::<u64>().map_err(|e| e.to_string())?;
    if value == 0 {
        return Err("timeout must be a positive number of milliseconds".to_string());
    }
    Ok(value)
}
