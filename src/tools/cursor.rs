//! Agent-backed tools.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{mode_arg, required_str, resolve_path, Tool};
use crate::agent::resolve::normalize_model;
use crate::agent::{AgentRequest, CursorAgent, ModelSource};
use crate::config::{AgentMode, Config};
use crate::worktree::{generate_patch, PatchOptions};

fn model_arg(args: &Value) -> Option<String> {
    args["model"]
        .as_str()
        .map(normalize_model)
        .filter(|m| !m.is_empty())
}

/// One-shot agent run returning its answer.
pub struct RunAgent {
    config: Config,
}

impl RunAgent {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Tool for RunAgent {
    fn name(&self) -> &str {
        "cursor_run"
    }

    fn description(&self) -> &str {
        "Run the Cursor agent once and return its answer. Use mode 'ask' or 'plan' for read-only \
         questions; 'agent' may edit files in the workspace directly."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "prompt": {
                    "type": "string",
                    "description": "What to ask the agent"
                },
                "mode": {
                    "type": "string",
                    "enum": ["ask", "plan", "agent"],
                    "description": "Agent mode (default: server configuration)"
                },
                "model": {
                    "type": "string",
                    "description": "Optional: model id, e.g. 'gpt-5' (provider prefixes are stripped)"
                },
                "cwd": {
                    "type": "string",
                    "description": "Optional: directory to run in. Defaults to workspace."
                }
            },
            "required": ["prompt"]
        })
    }

    async fn execute(&self, args: Value, working_dir: &Path) -> anyhow::Result<String> {
        let prompt = required_str(&args, "prompt")?;
        let mode = mode_arg(&args, self.config.mode)?;
        let cwd = args["cwd"]
            .as_str()
            .map(|p| resolve_path(p, working_dir))
            .unwrap_or_else(|| working_dir.to_path_buf());

        let request = AgentRequest {
            prompt: prompt.to_string(),
            model: model_arg(&args).or_else(|| Some(self.config.default_model.clone())),
            mode,
            workspace: Some(cwd.clone()),
            force: self.config.force,
            approve_mcps: self.config.approve_mcps,
        };
        let agent = CursorAgent::from_config(&self.config);
        Ok(agent.complete(&request, &cwd).await?)
    }
}

/// Isolated patch generation.
pub struct GeneratePatch {
    config: Config,
}

impl GeneratePatch {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    fn options(&self, args: &Value, working_dir: &Path) -> anyhow::Result<PatchOptions> {
        let mut options = PatchOptions::from_config(&self.config);
        options.cwd = args["cwd"]
            .as_str()
            .map(|p| resolve_path(p, working_dir))
            .unwrap_or_else(|| working_dir.to_path_buf());
        options.model = model_arg(args);
        options.mode = mode_arg(args, AgentMode::Agent)?;
        options.allow_dirty = args["allow_dirty"].as_bool().unwrap_or(false);
        options.keep_worktree = args["keep_worktree"].as_bool().unwrap_or(false);
        if let Some(ms) = args["timeout_ms"].as_u64().filter(|ms| *ms > 0) {
            options.timeout = Some(Duration::from_millis(ms));
        }
        Ok(options)
    }
}

#[async_trait]
impl Tool for GeneratePatch {
    fn name(&self) -> &str {
        "cursor_generate_patch"
    }

    fn description(&self) -> &str {
        "Let the Cursor agent make changes in a disposable git worktree and return the resulting \
         diff for review. The current checkout is never modified. Requires a clean working tree \
         unless allow_dirty is set. Failures are reported as a status=\"error\" envelope."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "prompt": {
                    "type": "string",
                    "description": "The change to make"
                },
                "mode": {
                    "type": "string",
                    "enum": ["ask", "plan", "agent"],
                    "description": "Agent mode (default: agent)"
                },
                "model": {
                    "type": "string",
                    "description": "Optional: model id"
                },
                "cwd": {
                    "type": "string",
                    "description": "Optional: any directory inside the repository. Defaults to workspace."
                },
                "allow_dirty": {
                    "type": "boolean",
                    "description": "Run even with uncommitted changes (they are not visible to the agent)"
                },
                "keep_worktree": {
                    "type": "boolean",
                    "description": "Keep the temporary worktree for debugging"
                },
                "timeout_ms": {
                    "type": "integer",
                    "description": "Optional: agent timeout in milliseconds"
                }
            },
            "required": ["prompt"]
        })
    }

    async fn execute(&self, args: Value, working_dir: &Path) -> anyhow::Result<String> {
        let prompt = required_str(&args, "prompt")?;
        let options = self.options(&args, working_dir)?;
        tracing::info!("Generating patch in {}", options.cwd.display());
        match generate_patch(prompt, &options).await {
            Ok(outcome) => Ok(outcome.render_envelope()),
            Err(e) => Ok(e.render_envelope()),
        }
    }
}

/// Models the agent can use.
pub struct ListModels {
    config: Config,
}

impl ListModels {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Tool for ListModels {
    fn name(&self) -> &str {
        "cursor_list_models"
    }

    fn description(&self) -> &str {
        "List the model ids accepted by the Cursor agent."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _args: Value, _working_dir: &Path) -> anyhow::Result<String> {
        let agent = CursorAgent::from_config(&self.config);
        let models = agent.fetch_models().await?;
        if models.is_empty() {
            return Ok("No models reported".to_string());
        }
        Ok(models
            .iter()
            .map(|m| format!("{} - {}", m.id, m.display_name))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;

    fn config_with_agent(dir: &Path, body: &str) -> Config {
        let bin = dir.join("agent.sh");
        std::fs::write(&bin, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();
        let mut config = Config::new(dir.to_path_buf());
        config.agent_bin = bin.to_string_lossy().to_string();
        config
    }

    #[tokio::test]
    async fn run_agent_passes_mode_and_model() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_agent(dir.path(), "echo \"$@\"");
        let out = RunAgent::new(config)
            .execute(
                json!({"prompt": "why?", "mode": "plan", "model": "openai/gpt-5"}),
                dir.path(),
            )
            .await
            .unwrap();
        assert!(out.contains("--mode plan"), "{out}");
        assert!(out.contains("--model gpt-5"), "{out}");
        assert!(out.ends_with("why?"), "{out}");
    }

    #[tokio::test]
    async fn run_agent_surfaces_failures() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_agent(dir.path(), "echo nope >&2; exit 1");
        let err = RunAgent::new(config)
            .execute(json!({"prompt": "x"}), dir.path())
            .await
            .expect_err("agent fails");
        assert!(err.to_string().contains("nope"));
    }

    #[tokio::test]
    async fn list_models_formats_lines() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_agent(dir.path(), "echo 'gpt-5 - GPT-5 (current)'");
        let out = ListModels::new(config)
            .execute(json!({}), dir.path())
            .await
            .unwrap();
        assert_eq!(out, "gpt-5 - GPT-5");
    }

    #[test]
    fn patch_options_follow_arguments() {
        let config = Config::new(PathBuf::from("/work"));
        let tool = GeneratePatch::new(config);
        let options = tool
            .options(
                &json!({"cwd": "repo", "model": "x/y", "allow_dirty": true, "timeout_ms": 1500}),
                Path::new("/work"),
            )
            .unwrap();
        assert_eq!(options.cwd, PathBuf::from("/work/repo"));
        assert_eq!(options.model.as_deref(), Some("y"));
        assert_eq!(options.mode, AgentMode::Agent);
        assert!(options.allow_dirty);
        assert!(!options.keep_worktree);
        assert_eq!(options.timeout, Some(Duration::from_millis(1500)));
    }

    #[tokio::test]
    async fn patch_tool_wraps_precondition_failures_in_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_agent(dir.path(), "true");
        let out = GeneratePatch::new(config)
            .execute(json!({"prompt": "change"}), dir.path())
            .await
            .expect("failures come back as text");
        assert!(out.starts_with("<patch_result status=\"error\">"), "{out}");
        assert!(out.contains("not inside a git repository"), "{out}");
    }

    #[tokio::test]
    async fn patch_tool_wraps_agent_failures_in_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path().join("repo");
        std::fs::create_dir(&repo).unwrap();
        for args in [
            vec!["init", "-q"],
            vec!["-c", "user.name=T", "-c", "user.email=t@t.invalid", "commit", "-q", "--allow-empty", "-m", "init"],
        ] {
            let status = std::process::Command::new("git")
                .args(&args)
                .current_dir(&repo)
                .status()
                .unwrap();
            assert!(status.success());
        }
        let config = config_with_agent(dir.path(), "echo tried\necho broke >&2\nexit 4");

        let out = GeneratePatch::new(config)
            .execute(json!({"prompt": "change", "cwd": "repo"}), dir.path())
            .await
            .expect("failures come back as text");
        assert!(out.starts_with("<patch_result status=\"error\">"), "{out}");
        assert!(out.contains("<agent_stdout>\ntried\n</agent_stdout>"), "{out}");
        assert!(out.contains("<agent_stderr>\nbroke\n</agent_stderr>"), "{out}");
    }
}
