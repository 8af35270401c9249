//! Cursor agent CLI client.
//!
//! Builds argument vectors for the `cursor-agent` executable and runs them
//! through the process primitive. Output parsing lives in the submodules:
//! - `models`: `--list-models` parsing and the TTL cache
//! - `prompt`: OpenAI message sequences flattened into a single prompt
//! - `resolve`: per-request model selection with pinning

pub mod models;
pub mod prompt;
pub mod resolve;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::config::{AgentMode, Config};
use crate::process::{self, RunOptions, RunResult, SpawnError};

pub use models::{parse_model_list, ModelCatalog, ModelDescriptor, ModelSource};
pub use prompt::{build_prompt, ChatMessage, ContentPart, MessageContent, TypedPart};
pub use resolve::{resolve_model, ModelPinning, Resolution, ResolutionStep};

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Spawn(#[from] SpawnError),

    #[error("cursor-agent exited with code {exit_code}{}: {stderr}", timeout_note(.timed_out))]
    Failed {
        exit_code: i32,
        timed_out: bool,
        /// Untrimmed standard output, kept for callers that report it.
        stdout: String,
        stderr: String,
    },
}

fn timeout_note(timed_out: &bool) -> &'static str {
    if *timed_out {
        " (timed out)"
    } else {
        ""
    }
}

impl AgentError {
    pub(crate) fn from_run(result: RunResult) -> Self {
        AgentError::Failed {
            exit_code: result.exit_code,
            timed_out: result.timed_out,
            stderr: result.stderr.trim().to_string(),
            stdout: result.stdout,
        }
    }
}

/// One `--print` invocation.
#[derive(Debug, Clone, Default)]
pub struct AgentRequest {
    pub prompt: String,
    pub model: Option<String>,
    pub mode: AgentMode,
    pub workspace: Option<PathBuf>,
    pub force: bool,
    pub approve_mcps: bool,
}

impl AgentRequest {
    /// Argument vector for this request; the prompt is always the last element.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec!["--print".to_string()];
        if self.approve_mcps {
            args.push("--approve-mcps".to_string());
        }
        if self.force {
            args.push("--force".to_string());
        }
        if !self.mode.is_implicit_default() {
            args.push("--mode".to_string());
            args.push(self.mode.as_str().to_string());
        }
        if let Some(workspace) = &self.workspace {
            args.push("--workspace".to_string());
            args.push(workspace.to_string_lossy().to_string());
        }
        if let Some(model) = self.model.as_deref().filter(|m| !m.is_empty()) {
            args.push("--model".to_string());
            args.push(model.to_string());
        }
        args.push("--output-format".to_string());
        args.push("text".to_string());
        args.push(self.prompt.clone());
        args
    }
}

/// Client for the Cursor agent CLI.
#[derive(Debug, Clone)]
pub struct CursorAgent {
    bin: String,
    timeout: Option<Duration>,
}

impl CursorAgent {
    pub fn new(bin: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            bin: bin.into(),
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.agent_bin.clone(), Some(config.timeout))
    }

    pub fn bin(&self) -> &str {
        &self.bin
    }

    /// Run a request and return the raw process result, whatever the exit code.
    pub async fn run(&self, request: &AgentRequest, cwd: &Path) -> Result<RunResult, SpawnError> {
        info!(
            "Running {} in {} (mode={}, model={:?}, prompt_len={})",
            self.bin,
            cwd.display(),
            request.mode,
            request.model,
            request.prompt.len()
        );
        let options = RunOptions::in_dir(cwd).with_timeout(self.timeout);
        process::invoke(&self.bin, &request.to_args(), &options).await
    }

    /// Run a request and return its trimmed stdout, failing on a non-zero exit.
    pub async fn complete(&self, request: &AgentRequest, cwd: &Path) -> Result<String, AgentError> {
        let result = self.run(request, cwd).await?;
        if !result.success() {
            return Err(AgentError::from_run(result));
        }
        Ok(result.stdout.trim().to_string())
    }

    /// Raw `--list-models` output.
    pub async fn list_models_raw(&self) -> Result<String, AgentError> {
        let options = RunOptions::default().with_timeout(self.timeout);
        let result =
            process::invoke(&self.bin, &["--list-models".to_string()], &options).await?;
        if !result.success() {
            return Err(AgentError::from_run(result));
        }
        Ok(result.stdout)
    }
}

#[async_trait]
impl ModelSource for CursorAgent {
    async fn fetch_models(&self) -> Result<Vec<ModelDescriptor>, AgentError> {
        let raw = self.list_models_raw().await?;
        Ok(parse_model_list(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_follow_fixed_order_with_prompt_last() {
        let request = AgentRequest {
            prompt: "User: hi\n\nAssistant:".to_string(),
            model: Some("gpt-5".to_string()),
            mode: AgentMode::Ask,
            workspace: Some(PathBuf::from("/work")),
            force: true,
            approve_mcps: true,
        };
        assert_eq!(
            request.to_args(),
            vec![
                "--print",
                "--approve-mcps",
                "--force",
                "--mode",
                "ask",
                "--workspace",
                "/work",
                "--model",
                "gpt-5",
                "--output-format",
                "text",
                "User: hi\n\nAssistant:",
            ]
        );
    }

    #[test]
    fn implicit_mode_and_disabled_flags_are_omitted() {
        let request = AgentRequest {
            prompt: "do it".to_string(),
            mode: AgentMode::Agent,
            ..Default::default()
        };
        assert_eq!(
            request.to_args(),
            vec!["--print", "--output-format", "text", "do it"]
        );
    }

    #[test]
    fn failed_error_mentions_timeout() {
        let err = AgentError::from_run(RunResult {
            exit_code: 137,
            stdout: String::new(),
            stderr: "  killed \n".to_string(),
            timed_out: true,
        });
        assert_eq!(
            err.to_string(),
            "cursor-agent exited with code 137 (timed out): killed"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn complete_returns_trimmed_stdout() {
        let agent = CursorAgent::new("echo", None);
        let request = AgentRequest {
            prompt: "hello".to_string(),
            mode: AgentMode::Agent,
            ..Default::default()
        };
        let out = agent
            .complete(&request, Path::new("."))
            .await
            .expect("echo succeeds");
        assert_eq!(out, "--print --output-format text hello");
    }
}
