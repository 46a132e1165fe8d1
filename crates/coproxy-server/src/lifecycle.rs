//! Two-process lifecycle: `start`/`stop` spawn and tear down a child OS
//! process hosting the HTTP server, mirroring the parent/child split the
//! original Flet UI + Waitress server used so the owning process stays
//! responsive while the server runs.

use std::net::SocketAddr;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{info, warn};

use coproxy_pool::CredentialPool;
use coproxy_stats::ProxyStats;

use crate::app::build_router;
use crate::error::ServerError;
use crate::handlers::AppState;
use crate::upstream::{UpstreamTransport, WreqUpstreamTransport};

const SOFT_STOP_TIMEOUT: Duration = Duration::from_secs(5);
const HARD_STOP_TIMEOUT: Duration = Duration::from_secs(1);
const HEALTH_POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs the axum server in the foreground of the current process until a
/// termination or interrupt signal arrives. This is what the child process
/// spawned by [`ProxyServer::start`] executes, and also what the CLI's own
/// `serve` subcommand calls directly.
pub async fn run_foreground(
    pool: Arc<CredentialPool>,
    stats: Arc<ProxyStats>,
    host: &str,
    port: u16,
) -> Result<(), ServerError> {
    let upstream: Arc<dyn UpstreamTransport> = Arc::new(WreqUpstreamTransport::new()?);
    let state = AppState { pool, stats: stats.clone(), upstream };
    let router = build_router(state);

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|e| ServerError::Upstream(format!("invalid listen address: {e}")))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Upstream(e.to_string()))?;

    stats.mark_started(host.to_string(), port).await;
    info!(event = "server.bound", %addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(wait_for_shutdown_signal())
        .await
        .map_err(|e| ServerError::Upstream(e.to_string()))?;

    stats.mark_stopped().await;
    info!(event = "server.stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let interrupt = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => {}
        _ = terminate => {}
    }
    info!(event = "server.shutdown_signal_received");
}

/// Library-level capability to run the server as a separate OS process,
/// isolated from whatever foreground the caller (UI, CLI) needs to stay
/// responsive for. Not used by the CLI's own `serve` subcommand, which runs
/// [`run_foreground`] directly.
pub struct ProxyServer {
    child: Mutex<Option<Child>>,
}

impl Default for ProxyServer {
    fn default() -> Self {
        Self::new()
    }
}

impl ProxyServer {
    pub fn new() -> Self {
        Self { child: Mutex::new(None) }
    }

    pub async fn is_running(&self) -> bool {
        self.child.lock().await.is_some()
    }

    /// Spawns the current executable with `serve --host <host> --port <port>`
    /// as a detached child process. Returns `false` without side effects if
    /// a child is already tracked.
    pub async fn start(&self, host: &str, port: u16) -> Result<bool, ServerError> {
        let mut guard = self.child.lock().await;
        if guard.is_some() {
            return Ok(false);
        }

        let exe = std::env::current_exe()
            .map_err(|e| ServerError::Upstream(format!("cannot resolve own executable: {e}")))?;

        let child = Command::new(exe)
            .arg("serve")
            .arg("--host")
            .arg(host)
            .arg("--port")
            .arg(port.to_string())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ServerError::Upstream(format!("failed to spawn server process: {e}")))?;

        info!(event = "server.process_spawned", pid = ?child.id(), host, port);
        *guard = Some(child);
        drop(guard);

        let _ = timeout(HEALTH_POLL_TIMEOUT, wait_for_health(host, port)).await;
        Ok(true)
    }

    /// Soft-terminates the child (`SIGTERM` on Unix), waits up to 5s, then
    /// hard-kills and waits up to 1s more. Returns `false` if no child is
    /// tracked.
    pub async fn stop(&self) -> bool {
        let mut guard = self.child.lock().await;
        let Some(mut child) = guard.take() else {
            return false;
        };

        if let Some(pid) = child.id() {
            send_soft_stop(pid);
        }

        if timeout(SOFT_STOP_TIMEOUT, child.wait()).await.is_err() {
            warn!(event = "server.soft_stop_timed_out");
            let _ = child.start_kill();
            let _ = timeout(HARD_STOP_TIMEOUT, child.wait()).await;
        }

        info!(event = "server.process_stopped");
        true
    }
}

#[cfg(unix)]
fn send_soft_stop(pid: u32) {
    // SAFETY: `pid` came from `Child::id()` for a child this process owns;
    // sending it SIGTERM is the standard "please exit" request.
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGTERM);
    }
}

#[cfg(not(unix))]
fn send_soft_stop(_pid: u32) {
    // No portable "soft" signal outside Unix; stop() falls through to the
    // hard-kill path on its own timeout.
}

async fn wait_for_health(host: &str, port: u16) {
    let host = if host == "0.0.0.0" { "127.0.0.1" } else { host };
    let url = format!("http://{host}:{port}/healthz");
    loop {
        if let Ok(client) = wreq::Client::builder().timeout(Duration::from_secs(1)).build() {
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status().is_success() {
                    return;
                }
            }
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stop_without_start_is_a_noop() {
        let server = ProxyServer::new();
        assert!(!server.stop().await);
    }

    #[tokio::test]
    async fn is_running_reflects_tracked_child() {
        let server = ProxyServer::new();
        assert!(!server.is_running().await);
    }
}
