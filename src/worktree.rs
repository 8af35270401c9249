//! Patch generation in a disposable git worktree.
//!
//! The agent runs with `--force` inside a detached worktree of the caller's
//! repository, so the primary checkout is never touched. Afterwards every
//! change (including new and binary files) is collected as a diff against the
//! worktree's starting commit and the worktree is removed again.
//!
//! ```text
//!   repo (clean) ──worktree add --detach──▶ /tmp/cursor-patch-<uuid>
//!                                              │ cursor-agent --force ...
//!                                              ▼
//!                                   add -N, diff --binary <base>
//!                                              │
//!   envelope ◀────────────────────────────────┘ worktree remove, rm -rf
//! ```

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::agent::{AgentError, AgentRequest, CursorAgent};
use crate::config::{AgentMode, Config, DEFAULT_AGENT_BIN};
use crate::process::{self, RunOptions, RunResult};

const TEMP_DIR_PREFIX: &str = "cursor-patch-";

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("{path} is not inside a git repository: {detail}")]
    NotARepository { path: PathBuf, detail: String },

    #[error("working tree has uncommitted changes; commit or stash them, or allow a dirty tree:\n{status}")]
    DirtyWorkingTree { status: String },

    #[error("git {step} failed: {detail}")]
    Git { step: &'static str, detail: String },

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error("failed to prepare worktree directory: {0}")]
    Io(#[from] io::Error),
}

/// Caller options for [`generate_patch`].
#[derive(Debug, Clone)]
pub struct PatchOptions {
    /// Any directory inside the repository.
    pub cwd: PathBuf,
    pub model: Option<String>,
    pub mode: AgentMode,
    pub timeout: Option<Duration>,
    /// Run even if the primary working tree has uncommitted changes. Those
    /// changes are not visible to the agent, which starts from `HEAD`.
    pub allow_dirty: bool,
    /// Leave the worktree in place for debugging.
    pub keep_worktree: bool,
    /// Parent for the temporary directory; the system temp dir when unset.
    pub temp_root: Option<PathBuf>,
    pub agent_bin: String,
    pub approve_mcps: bool,
}

impl Default for PatchOptions {
    fn default() -> Self {
        Self {
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            model: None,
            mode: AgentMode::Agent,
            timeout: None,
            allow_dirty: false,
            keep_worktree: false,
            temp_root: None,
            agent_bin: DEFAULT_AGENT_BIN.to_string(),
            approve_mcps: false,
        }
    }
}

impl PatchOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            cwd: config.workspace.clone(),
            timeout: Some(config.timeout),
            agent_bin: config.agent_bin.clone(),
            approve_mcps: config.approve_mcps,
            ..Default::default()
        }
    }
}

/// What happened to the temporary worktree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cleanup {
    Removed,
    Retained(PathBuf),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct PatchOutcome {
    /// `git diff --name-status` output.
    pub summary: String,
    pub agent_stdout: String,
    pub agent_stderr: String,
    /// `None` when the agent changed nothing.
    pub diff: Option<String>,
    pub worktree_path: PathBuf,
    pub cleanup: Cleanup,
}

impl PatchOutcome {
    pub fn has_changes(&self) -> bool {
        self.diff.is_some()
    }

    /// Text envelope with one named section per field; the diff is last.
    pub fn render_envelope(&self) -> String {
        let status = if self.has_changes() {
            "changes"
        } else {
            "no_changes"
        };
        let mut out = open_envelope(status);
        push_section(&mut out, "summary", self.summary.trim_end());
        push_section(&mut out, "agent_stdout", self.agent_stdout.trim_end());
        push_section(&mut out, "agent_stderr", self.agent_stderr.trim_end());
        if let Cleanup::Retained(path) = &self.cleanup {
            push_section(&mut out, "worktree", &path.to_string_lossy());
        }
        if let Some(diff) = &self.diff {
            push_section(&mut out, "diff", diff);
        }
        out.push_str("</patch_result>\n");
        out
    }
}

impl PatchError {
    /// `status="error"` envelope: the message plus whatever the agent printed.
    pub fn render_envelope(&self) -> String {
        let mut out = open_envelope("error");
        push_section(&mut out, "error", self.to_string().trim_end());
        if let PatchError::Agent(AgentError::Failed { stdout, stderr, .. }) = self {
            push_section(&mut out, "agent_stdout", stdout.trim_end());
            push_section(&mut out, "agent_stderr", stderr);
        }
        out.push_str("</patch_result>\n");
        out
    }
}

fn open_envelope(status: &str) -> String {
    format!("<patch_result status=\"{}\">\n", status)
}

fn push_section(out: &mut String, name: &str, body: &str) {
    out.push('<');
    out.push_str(name);
    out.push_str(">\n");
    out.push_str(body);
    if !body.is_empty() && !body.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("</");
    out.push_str(name);
    out.push_str(">\n");
}

/// Recover the diff body from an envelope produced by [`PatchOutcome::render_envelope`].
///
/// The diff section is last, and no diff line starts with `<`, so the final
/// `<diff>` line opens it even when the agent printed one.
pub fn extract_diff(envelope: &str) -> Option<String> {
    if !envelope.starts_with(&open_envelope("changes")) {
        return None;
    }
    let start = envelope.rfind("\n<diff>\n")? + "\n<diff>\n".len();
    let end = envelope.rfind("</diff>\n</patch_result>")?;
    if end < start {
        return None;
    }
    Some(envelope[start..end].to_string())
}

/// Run the agent on `prompt` in a throwaway worktree and collect its changes.
///
/// Fails before creating anything if `options.cwd` is not in a repository or
/// the working tree is dirty (unless allowed). Once the temporary directory
/// exists it is removed on every path out of this function unless
/// `keep_worktree` is set.
pub async fn generate_patch(prompt: &str, options: &PatchOptions) -> Result<PatchOutcome, PatchError> {
    let repo_root = repository_root(&options.cwd).await?;
    ensure_clean(&repo_root, options.allow_dirty).await?;

    let mut session = WorktreeSession::create(&repo_root, options.temp_root.as_deref()).await?;
    let result = run_in_session(&mut session, prompt, options).await;
    let cleanup = session.release(options.keep_worktree).await;

    match result {
        Ok(mut outcome) => {
            outcome.cleanup = cleanup;
            Ok(outcome)
        }
        Err(e) => {
            warn!("Patch generation failed: {}", e);
            Err(e)
        }
    }
}

async fn run_in_session(
    session: &mut WorktreeSession,
    prompt: &str,
    options: &PatchOptions,
) -> Result<PatchOutcome, PatchError> {
    session.attach().await?;
    let worktree = session.path().to_path_buf();
    let base = git_checked("rev-parse", &["rev-parse", "HEAD"], &worktree).await?;
    let base = base.trim().to_string();

    let agent = CursorAgent::new(options.agent_bin.clone(), options.timeout);
    let request = AgentRequest {
        prompt: prompt.to_string(),
        model: options.model.clone(),
        mode: options.mode,
        workspace: None,
        force: true,
        approve_mcps: options.approve_mcps,
    };
    let run = agent.run(&request, &worktree).await.map_err(AgentError::from)?;
    if !run.success() {
        return Err(AgentError::from_run(run).into());
    }

    mark_untracked_intent_to_add(&worktree).await?;
    let diff = git_checked(
        "diff",
        &["diff", "--binary", "--find-renames", &base],
        &worktree,
    )
    .await?;
    let summary = git_checked(
        "diff --name-status",
        &["diff", "--name-status", "--find-renames", &base],
        &worktree,
    )
    .await?;

    info!(
        "Agent finished in {}: {} changed path(s)",
        worktree.display(),
        summary.lines().count()
    );

    Ok(PatchOutcome {
        summary,
        agent_stdout: run.stdout,
        agent_stderr: run.stderr,
        diff: if diff.trim().is_empty() { None } else { Some(diff) },
        worktree_path: worktree,
        cleanup: Cleanup::Removed,
    })
}

async fn repository_root(cwd: &Path) -> Result<PathBuf, PatchError> {
    let result = git(&["rev-parse", "--show-toplevel"], cwd).await?;
    let root = result.stdout.trim();
    if !result.success() || root.is_empty() {
        return Err(PatchError::NotARepository {
            path: cwd.to_path_buf(),
            detail: result.stderr.trim().to_string(),
        });
    }
    Ok(PathBuf::from(root))
}

async fn ensure_clean(repo_root: &Path, allow_dirty: bool) -> Result<(), PatchError> {
    let status = git_checked("status", &["status", "--porcelain"], repo_root).await?;
    if status.trim().is_empty() {
        return Ok(());
    }
    if allow_dirty {
        warn!(
            "Working tree at {} is dirty; the agent only sees HEAD",
            repo_root.display()
        );
        return Ok(());
    }
    Err(PatchError::DirtyWorkingTree {
        status: status.trim_end().to_string(),
    })
}

async fn mark_untracked_intent_to_add(worktree: &Path) -> Result<(), PatchError> {
    let listing = git_checked(
        "ls-files",
        &["ls-files", "--others", "--exclude-standard", "-z"],
        worktree,
    )
    .await?;
    let untracked: Vec<&str> = listing.split('\0').filter(|p| !p.is_empty()).collect();
    if untracked.is_empty() {
        return Ok(());
    }
    debug!("Marking {} untracked path(s) intent-to-add", untracked.len());
    let mut args = vec!["add", "--intent-to-add", "--"];
    args.extend(untracked);
    git_checked("add --intent-to-add", &args, worktree).await?;
    Ok(())
}

async fn git(args: &[&str], cwd: &Path) -> Result<RunResult, PatchError> {
    let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    process::invoke("git", &args, &RunOptions::in_dir(cwd))
        .await
        .map_err(|e| PatchError::Git {
            step: "launch",
            detail: e.to_string(),
        })
}

/// Run git and return stdout, failing with git's own diagnostics on a non-zero exit.
async fn git_checked(step: &'static str, args: &[&str], cwd: &Path) -> Result<String, PatchError> {
    let result = git(args, cwd).await?;
    if !result.success() {
        let detail = if result.stderr.trim().is_empty() {
            format!("exit code {}", result.exit_code)
        } else {
            result.stderr.trim().to_string()
        };
        return Err(PatchError::Git { step, detail });
    }
    Ok(result.stdout)
}

/// A temporary directory, optionally registered as a git worktree.
///
/// Call [`WorktreeSession::release`] when done. If the owning future is
/// dropped first, `Drop` removes everything synchronously.
struct WorktreeSession {
    temp_dir: PathBuf,
    repo_root: PathBuf,
    created_worktree: bool,
    released: bool,
}

impl WorktreeSession {
    async fn create(repo_root: &Path, temp_root: Option<&Path>) -> Result<Self, PatchError> {
        let parent = temp_root
            .map(Path::to_path_buf)
            .unwrap_or_else(std::env::temp_dir);
        let temp_dir = parent.join(format!("{}{}", TEMP_DIR_PREFIX, Uuid::new_v4()));
        tokio::fs::create_dir_all(&temp_dir).await?;
        debug!("Created temporary directory {}", temp_dir.display());
        Ok(Self {
            temp_dir,
            repo_root: repo_root.to_path_buf(),
            created_worktree: false,
            released: false,
        })
    }

    fn path(&self) -> &Path {
        &self.temp_dir
    }

    /// Register the directory as a detached worktree at `HEAD`.
    async fn attach(&mut self) -> Result<(), PatchError> {
        let path = self.temp_dir.to_string_lossy().to_string();
        git_checked(
            "worktree add",
            &["worktree", "add", "--detach", &path, "HEAD"],
            &self.repo_root,
        )
        .await?;
        self.created_worktree = true;
        info!("Created detached worktree at {}", path);
        Ok(())
    }

    async fn release(mut self, keep: bool) -> Cleanup {
        let cleanup = self.cleanup(keep).await;
        self.released = true;
        cleanup
    }

    async fn cleanup(&self, keep: bool) -> Cleanup {
        if keep {
            info!("Keeping worktree at {}", self.temp_dir.display());
            return Cleanup::Retained(self.temp_dir.clone());
        }

        let mut failures = Vec::new();
        let path = self.temp_dir.to_string_lossy().to_string();

        if self.created_worktree {
            let plain = git(&["worktree", "remove", &path], &self.repo_root).await;
            if !matches!(&plain, Ok(r) if r.success()) {
                debug!("Plain worktree removal failed, forcing");
                match git(&["worktree", "remove", "--force", &path], &self.repo_root).await {
                    Ok(r) if r.success() => {}
                    Ok(r) => failures.push(format!("worktree remove: {}", r.stderr.trim())),
                    Err(e) => failures.push(format!("worktree remove: {}", e)),
                }
            }
        }

        match tokio::fs::remove_dir_all(&self.temp_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => failures.push(format!("remove {}: {}", path, e)),
        }

        if self.created_worktree {
            if let Err(e) = git_checked("worktree prune", &["worktree", "prune"], &self.repo_root).await {
                failures.push(e.to_string());
            }
        }

        if failures.is_empty() {
            debug!("Removed worktree {}", path);
            Cleanup::Removed
        } else {
            let reason = failures.join("; ");
            warn!("Worktree cleanup incomplete for {}: {}", path, reason);
            Cleanup::Failed(reason)
        }
    }
}

impl Drop for WorktreeSession {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        warn!(
            "Worktree session dropped without release, cleaning up {}",
            self.temp_dir.display()
        );
        if self.created_worktree {
            let _ = std::process::Command::new("git")
                .args(["worktree", "remove", "--force"])
                .arg(&self.temp_dir)
                .current_dir(&self.repo_root)
                .stdin(std::process::Stdio::null())
                .stdout(std::process::Stdio::null())
                .stderr(std::process::Stdio::null())
                .status();
        }
        let _ = std::fs::remove_dir_all(&self.temp_dir);
        if self.created_worktree {
            let _ = std::process::Command::new("git")
                .args(["worktree", "prune"])
                .current_dir(&self.repo_root)
                .stdin(std::process::Stdio::null())
                .stdout(std::process::Stdio::null())
                .stderr(std::process::Stdio::null())
                .status();
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::process::Command;

    fn git_sync(args: &[&str], cwd: &Path) -> String {
        let output = Command::new("git")
            .args([
                "-c",
                "user.name=Patch Test",
                "-c",
                "user.email=patch@test.invalid",
                "-c",
                "commit.gpgsign=false",
            ])
            .args(args)
            .current_dir(cwd)
            .output()
            .expect("run git");
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).to_string()
    }

    fn init_repo(dir: &Path) {
        git_sync(&["init", "-q"], dir);
        std::fs::write(dir.join("README.md"), "# demo\n").unwrap();
        std::fs::write(dir.join("old.txt"), "obsolete\n").unwrap();
        git_sync(&["add", "-A"], dir);
        git_sync(&["commit", "-q", "-m", "init"], dir);
    }

    fn write_stub_agent(dir: &Path, body: &str) -> String {
        let path = dir.join("stub-agent.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().to_string()
    }

    fn worktree_count(repo: &Path) -> usize {
        git_sync(&["worktree", "list", "--porcelain"], repo)
            .lines()
            .filter(|l| l.starts_with("worktree "))
            .count()
    }

    fn entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    struct Fixture {
        repo: tempfile::TempDir,
        tools: tempfile::TempDir,
        temp_root: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let fixture = Self {
                repo: tempfile::tempdir().unwrap(),
                tools: tempfile::tempdir().unwrap(),
                temp_root: tempfile::tempdir().unwrap(),
            };
            init_repo(fixture.repo.path());
            fixture
        }

        fn options(&self, agent_body: &str) -> PatchOptions {
            PatchOptions {
                cwd: self.repo.path().to_path_buf(),
                agent_bin: write_stub_agent(self.tools.path(), agent_body),
                temp_root: Some(self.temp_root.path().to_path_buf()),
                timeout: Some(Duration::from_secs(30)),
                ..Default::default()
            }
        }
    }

    #[tokio::test]
    async fn no_changes_returns_no_changes_envelope_and_cleans_up() {
        let fx = Fixture::new();
        let options = fx.options("echo \"nothing to change\"");

        let outcome = generate_patch("look around", &options)
            .await
            .expect("patch generation succeeds");

        assert!(!outcome.has_changes());
        assert_eq!(outcome.cleanup, Cleanup::Removed);
        let envelope = outcome.render_envelope();
        assert!(envelope.starts_with("<patch_result status=\"no_changes\">"));
        assert!(envelope.contains("<agent_stdout>\nnothing to change\n</agent_stdout>"));
        assert!(extract_diff(&envelope).is_none());

        assert!(!outcome.worktree_path.exists());
        assert_eq!(entries(fx.temp_root.path()), 0);
        assert_eq!(worktree_count(fx.repo.path()), 1);
    }

    #[tokio::test]
    async fn collects_modified_added_deleted_and_binary_files() {
        let fx = Fixture::new();
        let options = fx.options(
            "echo \"$@\"\n\
             echo \"more\" >> README.md\n\
             echo \"fresh\" > new.txt\n\
             printf '\\000\\001\\002\\377' > blob.bin\n\
             rm old.txt\n\
             echo \"done\" >&2",
        );

        let outcome = generate_patch("make changes", &options)
            .await
            .expect("patch generation succeeds");

        assert!(outcome.has_changes());
        assert!(outcome.summary.contains("M\tREADME.md"), "{}", outcome.summary);
        assert!(outcome.summary.contains("A\tnew.txt"), "{}", outcome.summary);
        assert!(outcome.summary.contains("A\tblob.bin"), "{}", outcome.summary);
        assert!(outcome.summary.contains("D\told.txt"), "{}", outcome.summary);
        assert!(outcome.agent_stdout.contains("--force"));
        assert!(outcome.agent_stdout.ends_with("make changes\n"));
        assert_eq!(outcome.agent_stderr, "done\n");

        let diff = outcome.diff.clone().unwrap();
        assert!(diff.contains("+fresh"));
        assert!(diff.contains("GIT binary patch"));

        let envelope = outcome.render_envelope();
        assert!(envelope.starts_with("<patch_result status=\"changes\">"));
        assert_eq!(extract_diff(&envelope), Some(diff));

        // Primary checkout untouched, worktree gone.
        assert_eq!(git_sync(&["status", "--porcelain"], fx.repo.path()), "");
        assert_eq!(entries(fx.temp_root.path()), 0);
        assert_eq!(worktree_count(fx.repo.path()), 1);
    }

    #[tokio::test]
    async fn dirty_tree_fails_before_creating_anything() {
        let fx = Fixture::new();
        std::fs::write(fx.repo.path().join("scratch.txt"), "wip").unwrap();
        let marker = fx.tools.path().join("ran");
        let options = fx.options(&format!("touch {}", marker.display()));

        let err = generate_patch("anything", &options)
            .await
            .expect_err("dirty tree must be rejected");

        assert!(matches!(err, PatchError::DirtyWorkingTree { .. }));
        assert!(err.to_string().contains("scratch.txt"));
        assert_eq!(entries(fx.temp_root.path()), 0);
        assert_eq!(worktree_count(fx.repo.path()), 1);
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn dirty_tree_is_allowed_when_requested() {
        let fx = Fixture::new();
        std::fs::write(fx.repo.path().join("scratch.txt"), "wip").unwrap();
        let mut options = fx.options("true");
        options.allow_dirty = true;

        let outcome = generate_patch("anything", &options)
            .await
            .expect("dirty tree allowed");
        assert!(!outcome.has_changes());
        assert_eq!(entries(fx.temp_root.path()), 0);
    }

    #[tokio::test]
    async fn agent_failure_still_removes_worktree() {
        let fx = Fixture::new();
        let options = fx.options("echo partial > partial.txt\necho \"model not available\" >&2\nexit 2");

        let err = generate_patch("fail please", &options)
            .await
            .expect_err("agent failure propagates");

        match err {
            PatchError::Agent(AgentError::Failed {
                exit_code, stderr, ..
            }) => {
                assert_eq!(exit_code, 2);
                assert_eq!(stderr, "model not available");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(entries(fx.temp_root.path()), 0);
        assert_eq!(worktree_count(fx.repo.path()), 1);
    }

    #[tokio::test]
    async fn missing_agent_binary_still_removes_worktree() {
        let fx = Fixture::new();
        let mut options = fx.options("true");
        options.agent_bin = fx.tools.path().join("missing-agent").to_string_lossy().to_string();

        let err = generate_patch("hi", &options).await.expect_err("spawn fails");
        assert!(matches!(err, PatchError::Agent(AgentError::Spawn(_))));
        assert_eq!(entries(fx.temp_root.path()), 0);
        assert_eq!(worktree_count(fx.repo.path()), 1);
    }

    #[tokio::test]
    async fn keep_worktree_retains_directory() {
        let fx = Fixture::new();
        let mut options = fx.options("echo kept > kept.txt");
        options.keep_worktree = true;

        let outcome = generate_patch("keep it", &options).await.expect("succeeds");
        let Cleanup::Retained(path) = &outcome.cleanup else {
            panic!("expected retained worktree, got {:?}", outcome.cleanup);
        };
        assert!(path.join("kept.txt").exists());
        assert!(outcome.render_envelope().contains("<worktree>"));
        assert_eq!(worktree_count(fx.repo.path()), 2);

        git_sync(
            &["worktree", "remove", "--force", &path.to_string_lossy()],
            fx.repo.path(),
        );
    }

    #[tokio::test]
    async fn outside_repository_is_a_precondition_error() {
        let dir = tempfile::tempdir().unwrap();
        let options = PatchOptions {
            cwd: dir.path().to_path_buf(),
            temp_root: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let err = generate_patch("hi", &options).await.expect_err("not a repo");
        assert!(matches!(err, PatchError::NotARepository { .. }));
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn cancelled_release_still_cleans_up_on_drop() {
        let fx = Fixture::new();
        let mut session = WorktreeSession::create(fx.repo.path(), Some(fx.temp_root.path()))
            .await
            .unwrap();
        session.attach().await.unwrap();
        assert_eq!(worktree_count(fx.repo.path()), 2);

        // Polled once, then dropped while the first git command is in flight.
        let cancelled = tokio::time::timeout(Duration::ZERO, session.release(false)).await;
        assert!(cancelled.is_err());

        assert_eq!(entries(fx.temp_root.path()), 0);
        assert_eq!(worktree_count(fx.repo.path()), 1);
    }

    #[tokio::test]
    async fn renames_show_in_summary() {
        let fx = Fixture::new();
        let options = fx.options("mv old.txt renamed.txt");

        let outcome = generate_patch("rename it", &options)
            .await
            .expect("patch generation succeeds");

        assert!(
            outcome.summary.contains("R100\told.txt\trenamed.txt"),
            "{}",
            outcome.summary
        );
        let diff = outcome.diff.clone().unwrap();
        assert!(diff.contains("rename from old.txt"), "{diff}");
        assert!(diff.contains("rename to renamed.txt"), "{diff}");
    }

    #[tokio::test]
    async fn agent_failure_renders_error_envelope_with_output() {
        let fx = Fixture::new();
        let options = fx.options("echo \"half done\"\necho \"quota exceeded\" >&2\nexit 3");

        let err = generate_patch("fail please", &options)
            .await
            .expect_err("agent failure propagates");
        let envelope = err.render_envelope();

        assert!(envelope.starts_with("<patch_result status=\"error\">\n<error>\n"));
        assert!(envelope.contains("exited with code 3"), "{envelope}");
        assert!(envelope.contains("<agent_stdout>\nhalf done\n</agent_stdout>"));
        assert!(envelope.contains("<agent_stderr>\nquota exceeded\n</agent_stderr>"));
        assert!(envelope.ends_with("</patch_result>\n"));
        assert!(extract_diff(&envelope).is_none());
    }

    #[test]
    fn precondition_errors_render_without_agent_sections() {
        let err = PatchError::DirtyWorkingTree {
            status: " M README.md".to_string(),
        };
        let envelope = err.render_envelope();
        assert!(envelope.starts_with("<patch_result status=\"error\">"));
        assert!(envelope.contains("README.md"));
        assert!(!envelope.contains("<agent_stdout>"));
    }

    #[test]
    fn extract_diff_skips_diff_tags_printed_by_the_agent() {
        let outcome = PatchOutcome {
            summary: "M\ta.txt\n".to_string(),
            agent_stdout: "Here is what I did:\n<diff>\nnot really\n".to_string(),
            agent_stderr: String::new(),
            diff: Some("diff --git a/a.txt b/a.txt\n+x\n".to_string()),
            worktree_path: PathBuf::from("/tmp/x"),
            cleanup: Cleanup::Removed,
        };
        assert_eq!(extract_diff(&outcome.render_envelope()), outcome.diff);

        let unchanged = PatchOutcome {
            diff: None,
            agent_stdout: "<diff>\nfake\n</diff>\n</patch_result>\n".to_string(),
            ..outcome
        };
        assert!(extract_diff(&unchanged.render_envelope()).is_none());
    }

    #[test]
    fn extract_diff_ignores_diff_markers_inside_body() {
        let outcome = PatchOutcome {
            summary: "M\ta.txt\n".to_string(),
            agent_stdout: "wrote </diff> literally\n".to_string(),
            agent_stderr: String::new(),
            diff: Some("diff --git a/a.txt b/a.txt\n+</diff>\n".to_string()),
            worktree_path: PathBuf::from("/tmp/x"),
            cleanup: Cleanup::Removed,
        };
        let envelope = outcome.render_envelope();
        assert_eq!(extract_diff(&envelope), outcome.diff);
    }
}
