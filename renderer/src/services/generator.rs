//! Content generator process management
//!
//! Spawns the generator in serve/watch mode for the live proxy, or once in
//! build mode for a static export. Output of the child is re-emitted as
//! tracing events so its pipes never fill up.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::error::{RendererError, RendererResult};
use crate::traits::{BuildRequest, GeneratorLauncher, LaunchRequest};
use crate::types::GeneratorSettings;
use shared::{process_debug, process_info, process_warn, ProcessId};

/// Generator launcher backed by `tokio::process`
pub struct RealGeneratorLauncher {
    settings: GeneratorSettings,
    child: Mutex<Option<Child>>,
}

impl RealGeneratorLauncher {
    pub fn new(settings: GeneratorSettings) -> Self {
        Self {
            settings,
            child: Mutex::new(None),
        }
    }

    /// Arguments for `hugo server`
    pub fn serve_args(&self, request: &LaunchRequest) -> Vec<String> {
        let mut args = vec![
            "server".to_string(),
            "--source".to_string(),
            request.source_dir.display().to_string(),
            "--port".to_string(),
            request.port.to_string(),
            "--bind".to_string(),
            "127.0.0.1".to_string(),
            "--disableFastRender".to_string(),
            "--liveReloadPort".to_string(),
            request.live_reload_port.to_string(),
            "--config".to_string(),
            request.config_path.display().to_string(),
            "--watch".to_string(),
        ];
        self.push_theme_args(&mut args);
        args
    }

    /// Arguments for a one-shot static build
    pub fn build_args(&self, request: &BuildRequest) -> Vec<String> {
        let mut args = vec![
            "--source".to_string(),
            request.source_dir.display().to_string(),
            "--destination".to_string(),
            request.destination.display().to_string(),
            "--config".to_string(),
            request.config_path.display().to_string(),
        ];
        self.push_theme_args(&mut args);
        args
    }

    fn push_theme_args(&self, args: &mut Vec<String>) {
        if let Some(themes_dir) = &self.settings.themes_dir {
            args.push("--themesDir".to_string());
            args.push(themes_dir.display().to_string());
            args.push("--theme".to_string());
            args.push(self.settings.theme.clone());
        }
    }

    fn is_process_running(child: &mut Child) -> bool {
        matches!(child.try_wait(), Ok(None))
    }

    async fn terminate(mut child: Child) -> RendererResult<()> {
        if send_sigterm(&child) {
            let graceful = tokio::time::timeout(Duration::from_secs(5), child.wait()).await;
            if let Ok(Ok(status)) = graceful {
                process_debug!(ProcessId::current(), "🛑 Generator exited with {}", status);
                return Ok(());
            }
        }

        if let Err(e) = child.kill().await {
            process_warn!(ProcessId::current(), "⚠️ Failed to kill generator: {}", e);
            return Err(RendererError::IoError(e));
        }
        Ok(())
    }
}

#[cfg(unix)]
fn send_sigterm(child: &Child) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    match child.id() {
        Some(pid) => kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok(),
        None => false,
    }
}

#[cfg(not(unix))]
fn send_sigterm(_child: &Child) -> bool {
    false
}

/// Spawn tasks that re-emit the child's output line by line
pub fn spawn_output_consumers(child: &mut Child) {
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(forward_lines(stdout, "stdout"));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_lines(stderr, "stderr"));
    }
}

async fn forward_lines<R>(stream: R, stream_name: &'static str)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        process_info!(ProcessId::current(), generator = stream_name, "{}", line);
    }
}

#[async_trait]
impl GeneratorLauncher for RealGeneratorLauncher {
    async fn launch(&self, request: &LaunchRequest) -> RendererResult<u32> {
        let mut slot = self.child.lock().await;

        if let Some(previous) = slot.take() {
            process_debug!(ProcessId::current(), "♻️ Replacing previous generator process");
            Self::terminate(previous).await?;
        }

        let mut cmd = Command::new(&self.settings.binary);
        cmd.args(self.serve_args(request))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| RendererError::launch(format!("failed to spawn {}: {e}", self.settings.binary)))?;

        let pid = child.id().unwrap_or(0);
        spawn_output_consumers(&mut child);
        *slot = Some(child);

        process_info!(
            ProcessId::current(),
            "🏭 Spawned {} (PID: {}) on 127.0.0.1:{}",
            self.settings.binary,
            pid,
            request.port
        );
        Ok(pid)
    }

    async fn is_alive(&self) -> bool {
        let mut slot = self.child.lock().await;
        match slot.as_mut() {
            Some(child) => Self::is_process_running(child),
            None => false,
        }
    }

    async fn build_static(&self, request: &BuildRequest) -> RendererResult<()> {
        let output = Command::new(&self.settings.binary)
            .args(self.build_args(request))
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| RendererError::GeneratorBuildFailed {
                message: format!("failed to run {}: {e}", self.settings.binary),
            })?;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            process_info!(ProcessId::current(), generator = "stdout", "{}", line);
        }

        if !output.status.success() {
            return Err(RendererError::GeneratorBuildFailed {
                message: format!(
                    "{} exited with {}: {}",
                    self.settings.binary,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        Ok(())
    }

    async fn stop(&self) -> RendererResult<()> {
        let Some(child) = self.child.lock().await.take() else {
            return Ok(());
        };
        Self::terminate(child).await
    }
}
