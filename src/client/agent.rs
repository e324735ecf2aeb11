//! Supervision of the local ngrok agent process.
//!
//! The agent is started with `start --none` so it opens no tunnels on its own,
//! and with JSON log output on stdout so its progress can be followed. Startup
//! is complete once the agent reports both its web API address and an
//! established relay session. Fatal problems found before the agent starts
//! logging (bad config, bad authtoken) only show up on stderr.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::AgentConfig;
use crate::error::{Result, TunnelError};
use crate::protocol::AgentLogLine;

const MSG_WEB_SERVICE: &str = "starting web service";
const MSG_SESSION_ESTABLISHED: &str = "client session established";

/// Upper bound on stderr text kept for error messages
const STDERR_LIMIT: usize = 4096;
/// How long to wait for stderr to close once stdout has
const STDERR_GRACE: Duration = Duration::from_secs(2);

/// A running ngrok agent owned by this process
#[derive(Debug)]
pub struct AgentProcess {
    child: Child,
    api_url: String,
}

impl AgentProcess {
    /// Spawn the agent described by `config` and wait for it to come up
    pub async fn spawn(config: &AgentConfig) -> Result<Self> {
        let mut command = Command::new(config.binary());
        command.args(["start", "--none", "--log=stdout", "--log-format=json"]);

        if let Some(path) = &config.config_path {
            command.arg("--config").arg(path);
        }
        if let Some(token) = &config.authtoken {
            command.env("NGROK_AUTHTOKEN", token);
        }

        info!("Starting ngrok agent: {}", config.binary().display());
        Self::spawn_command(command, config.startup_timeout()).await
    }

    pub(crate) async fn spawn_command(mut command: Command, timeout: Duration) -> Result<Self> {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group: a Ctrl+C in the terminal reaches us, not the
        // agent, so the tunnel is still there to be closed.
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(TunnelError::AgentSpawn)?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TunnelError::AgentStartup("agent stdout unavailable".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| TunnelError::AgentStartup("agent stderr unavailable".to_string()))?;

        let stderr_task = tokio::spawn(collect_stderr(stderr));
        let mut lines = BufReader::new(stdout).lines();

        let api_url = match tokio::time::timeout(timeout, wait_for_startup(&mut lines)).await {
            Ok(Ok(Some(api_url))) => api_url,
            Ok(Ok(None)) => return Err(early_exit_error(stderr_task).await),
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(TunnelError::AgentTimeout { timeout }),
        };

        info!("ngrok agent ready, API at {}", api_url);
        tokio::spawn(drain_output(lines));

        Ok(Self { child, api_url })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Whether the agent process is gone, taking its tunnels with it
    pub fn has_exited(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(Some(_)))
    }

    /// Stop the agent; its relay session and tunnels go with it
    pub async fn stop(&mut self) -> Result<()> {
        if let Ok(Some(status)) = self.child.try_wait() {
            debug!("ngrok agent already exited: {}", status);
            return Ok(());
        }

        debug!(pid = ?self.pid(), "Stopping ngrok agent");
        self.child.kill().await?;
        Ok(())
    }
}

/// Follow the agent's log until it is ready. `None` means output ended first.
async fn wait_for_startup(lines: &mut Lines<BufReader<ChildStdout>>) -> Result<Option<String>> {
    let mut api_url = None;
    let mut session_established = false;

    while let Some(line) = lines.next_line().await? {
        let Ok(entry) = AgentLogLine::from_json(&line) else {
            debug!(target: "ngrok", "{}", line);
            continue;
        };
        log_agent_line(&entry);

        if entry.is_fatal() {
            return Err(TunnelError::AgentStartup(entry.reason().to_string()));
        }

        match entry.msg.as_str() {
            MSG_WEB_SERVICE => {
                if let Some(addr) = entry.addr {
                    api_url = Some(format!("http://{}", addr));
                }
            }
            MSG_SESSION_ESTABLISHED => session_established = true,
            _ => {}
        }

        if session_established {
            if let Some(url) = api_url.take() {
                return Ok(Some(url));
            }
        }
    }

    Ok(None)
}

async fn early_exit_error(stderr_task: JoinHandle<String>) -> TunnelError {
    let stderr = match tokio::time::timeout(STDERR_GRACE, stderr_task).await {
        Ok(Ok(text)) => text,
        _ => String::new(),
    };

    if stderr.is_empty() {
        TunnelError::AgentStartup("agent exited before establishing a session".to_string())
    } else {
        TunnelError::AgentStartup(format!(
            "agent exited before establishing a session: {}",
            stderr
        ))
    }
}

async fn collect_stderr(stderr: ChildStderr) -> String {
    let mut lines = BufReader::new(stderr).lines();
    let mut collected = String::new();

    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        warn!(target: "ngrok", "{}", line);

        if collected.len() < STDERR_LIMIT {
            if !collected.is_empty() {
                collected.push('\n');
            }
            collected.push_str(line);
        }
    }

    collected
}

async fn drain_output(mut lines: Lines<BufReader<ChildStdout>>) {
    while let Ok(Some(line)) = lines.next_line().await {
        match AgentLogLine::from_json(&line) {
            Ok(entry) => log_agent_line(&entry),
            Err(_) => debug!(target: "ngrok", "{}", line),
        }
    }
    debug!("ngrok agent output closed");
}

fn log_agent_line(entry: &AgentLogLine) {
    match entry.lvl.as_str() {
        "eror" | "crit" => error!(target: "ngrok", "{}", entry.reason()),
        "warn" => warn!(target: "ngrok", "{}", entry.msg),
        _ => debug!(target: "ngrok", "{}", entry.msg),
    }
}
