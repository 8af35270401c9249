//! Bridge availability check for the MCP shim.
//!
//! The shim probes `{bridge_url}/health`; when nothing answers and
//! `CURSOR_BRIDGE_AUTOSTART` is on, it launches the `cursor-bridge` binary in
//! the background and waits for it to become healthy.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};

use crate::config::Config;

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
const STARTUP_POLLS: u32 = 20;
const STARTUP_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoStart {
    AlreadyRunning,
    Started,
    Skipped(String),
    Failed(String),
}

/// Location of the bridge binary: next to the running executable if present,
/// otherwise resolved through `PATH`.
pub fn bridge_binary() -> PathBuf {
    let name = if cfg!(windows) {
        "cursor-bridge.exe"
    } else {
        "cursor-bridge"
    };
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(name)))
        .filter(|candidate| candidate.is_file())
        .unwrap_or_else(|| PathBuf::from(name))
}

/// A bridge answering 401 is running with a different key; it still owns the port.
async fn is_healthy(client: &Client, config: &Config) -> bool {
    let url = format!("{}/health", config.bridge_url.trim_end_matches('/'));
    let mut request = client.get(&url);
    if let Some(key) = config.api_key.as_deref() {
        request = request.bearer_auth(key);
    }
    match request.send().await {
        Ok(resp) if resp.status() == StatusCode::UNAUTHORIZED => {
            warn!("Bridge at {} rejected CURSOR_BRIDGE_API_KEY", url);
            true
        }
        Ok(resp) => resp.status().is_success(),
        Err(e) => {
            debug!("Bridge probe {} failed: {}", url, e);
            false
        }
    }
}

pub async fn ensure_bridge(config: &Config) -> AutoStart {
    ensure_bridge_with(config, &bridge_binary()).await
}

pub async fn ensure_bridge_with(config: &Config, bridge_bin: &Path) -> AutoStart {
    let client = match Client::builder().timeout(PROBE_TIMEOUT).no_proxy().build() {
        Ok(c) => c,
        Err(e) => return AutoStart::Failed(format!("failed to build HTTP client: {}", e)),
    };

    if is_healthy(&client, config).await {
        return AutoStart::AlreadyRunning;
    }
    if !config.autostart {
        return AutoStart::Skipped(format!(
            "no bridge at {} and CURSOR_BRIDGE_AUTOSTART is off",
            config.bridge_url
        ));
    }

    info!("Starting {} for {}", bridge_bin.display(), config.bridge_url);
    // stdout is the JSON-RPC channel, so the bridge must never write to it.
    let spawned = tokio::process::Command::new(bridge_bin)
        .current_dir(&config.workspace)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::inherit())
        .spawn();
    let mut child = match spawned {
        Ok(child) => child,
        Err(e) => {
            warn!("Failed to start bridge: {}", e);
            return AutoStart::Failed(format!(
                "failed to launch {}: {}",
                bridge_bin.display(),
                e
            ));
        }
    };

    for _ in 0..STARTUP_POLLS {
        tokio::time::sleep(STARTUP_POLL_INTERVAL).await;
        if is_healthy(&client, config).await {
            return AutoStart::Started;
        }
        if let Ok(Some(status)) = child.try_wait() {
            return AutoStart::Failed(format!("bridge exited early with {}", status));
        }
    }

    if let Err(e) = child.start_kill() {
        warn!("Failed to stop unhealthy bridge: {}", e);
    }
    let _ = child.wait().await;
    AutoStart::Failed(format!(
        "bridge did not become healthy at {}",
        config.bridge_url
    ))
}
