//! Process invocation primitive.
//!
//! Every external command (the agent CLI and `git`) goes through [`invoke`]:
//! arguments are passed verbatim (no shell), stdin is closed, stdout/stderr are
//! captured incrementally and a timeout is enforced with a hard kill.

use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How long to keep draining pipes after the child is gone. Grandchildren that
/// inherited the pipes can hold them open indefinitely.
const PIPE_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Exit code reported when the exit status carries no code at all.
const UNKNOWN_EXIT_CODE: i32 = -1;

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("'{command}' binary not found - install it or configure the path to it")]
    NotFound { command: String },

    #[error("failed to launch '{command}': {source}")]
    Launch {
        command: String,
        #[source]
        source: io::Error,
    },
}

/// Options for a single invocation.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub working_directory: Option<PathBuf>,
    pub timeout: Option<Duration>,
}

impl RunOptions {
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            working_directory: Some(dir.into()),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Outcome of one process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// The process was killed because it outlived the configured timeout.
    pub timed_out: bool,
}

impl RunResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }
}

/// Run `command` with `args` and capture its output.
///
/// A non-zero exit is a normal result. Only launch failures are errors.
pub async fn invoke(
    command: &str,
    args: &[String],
    options: &RunOptions,
) -> Result<RunResult, SpawnError> {
    let mut cmd = Command::new(command);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &options.working_directory {
        cmd.current_dir(dir);
    }

    debug!(
        "Spawning {} {:?} (cwd={:?}, timeout={:?})",
        command, args, options.working_directory, options.timeout
    );

    let mut child = cmd.spawn().map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            SpawnError::NotFound {
                command: command.to_string(),
            }
        } else {
            SpawnError::Launch {
                command: command.to_string(),
                source: e,
            }
        }
    })?;

    let stdout_buf = Arc::new(Mutex::new(Vec::new()));
    let stderr_buf = Arc::new(Mutex::new(Vec::new()));
    let stdout_task = child
        .stdout
        .take()
        .map(|pipe| spawn_collector(pipe, Arc::clone(&stdout_buf)));
    let stderr_task = child
        .stderr
        .take()
        .map(|pipe| spawn_collector(pipe, Arc::clone(&stderr_buf)));

    let mut timed_out = false;
    let status = match options.timeout {
        Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
            Ok(status) => status,
            Err(_) => {
                timed_out = true;
                warn!(
                    "{} exceeded timeout of {}ms, killing",
                    command,
                    limit.as_millis()
                );
                if let Err(e) = child.start_kill() {
                    warn!("Failed to kill {}: {}", command, e);
                }
                child.wait().await
            }
        },
        None => child.wait().await,
    };

    let exit_code = match status {
        Ok(status) => exit_code(status),
        Err(e) => {
            warn!("Failed to wait for {}: {}", command, e);
            UNKNOWN_EXIT_CODE
        }
    };

    drain(stdout_task).await;
    drain(stderr_task).await;

    let stdout = String::from_utf8_lossy(&stdout_buf.lock().await).to_string();
    let stderr = String::from_utf8_lossy(&stderr_buf.lock().await).to_string();

    debug!(
        "{} exited: code={}, timed_out={}, stdout_len={}, stderr_len={}",
        command,
        exit_code,
        timed_out,
        stdout.len(),
        stderr.len()
    );

    Ok(RunResult {
        exit_code,
        stdout,
        stderr,
        timed_out,
    })
}

fn spawn_collector<R>(mut pipe: R, sink: Arc<Mutex<Vec<u8>>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = [0u8; 8192];
        loop {
            match pipe.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => sink.lock().await.extend_from_slice(&chunk[..n]),
                Err(e) => {
                    debug!("Pipe read failed: {}", e);
                    break;
                }
            }
        }
    })
}

async fn drain(task: Option<JoinHandle<()>>) {
    let Some(mut task) = task else {
        return;
    };
    if tokio::time::timeout(PIPE_DRAIN_GRACE, &mut task).await.is_err() {
        debug!("Output pipe still open after process exit, abandoning reader");
        task.abort();
    }
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(UNKNOWN_EXIT_CODE)
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(UNKNOWN_EXIT_CODE)
}
