//! Tool-server child process management (spawn, talk, kill).

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use serde_json::Value;
use tokio::io::BufReader;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::client::Client;
use crate::error::{Error, Result};
use crate::protocol::{CallToolResult, InitializeResult, Tool};

/// How to launch a tool server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
}

/// Handle to a running tool-server process.
///
/// The child is killed when the handle is dropped.
pub struct Server {
    config: ServerConfig,
    process: Mutex<Child>,
    client: Client<BufReader<ChildStdout>, ChildStdin>,
}

impl Server {
    /// Spawn the server process with piped stdin/stdout.
    pub fn spawn(config: ServerConfig) -> Result<Self> {
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut process = cmd.spawn().map_err(|source| Error::Spawn {
            command: config.command.clone(),
            source,
        })?;

        let stdin = process.stdin.take().ok_or_else(|| Error::Spawn {
            command: config.command.clone(),
            source: std::io::Error::other("failed to capture stdin"),
        })?;
        let stdout = process.stdout.take().ok_or_else(|| Error::Spawn {
            command: config.command.clone(),
            source: std::io::Error::other("failed to capture stdout"),
        })?;

        debug!(server = %config.name, command = %config.command, pid = ?process.id(), "spawned tool server");

        Ok(Self {
            config,
            process: Mutex::new(process),
            client: Client::new(BufReader::new(stdout), stdin),
        })
    }

    /// Override the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = self.client.with_timeout(timeout);
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub async fn initialize(&self) -> Result<InitializeResult> {
        self.client.initialize().await
    }

    pub async fn list_tools(&self) -> Result<Vec<Tool>> {
        self.client.list_tools().await
    }

    pub async fn call_tool(&self, name: &str, arguments: Option<Value>) -> Result<CallToolResult> {
        self.client.call_tool(name, arguments).await
    }

    /// Check if the server process is still running.
    pub async fn is_running(&self) -> bool {
        let mut process = self.process.lock().await;
        matches!(process.try_wait(), Ok(None))
    }

    /// Kill the process and reap it. Safe to call more than once.
    pub async fn shutdown(&self) -> Result<()> {
        let mut process = self.process.lock().await;
        if let Ok(Some(status)) = process.try_wait() {
            debug!(server = %self.config.name, %status, "tool server already exited");
            return Ok(());
        }
        if let Err(e) = process.kill().await {
            warn!(server = %self.config.name, error = %e, "failed to kill tool server");
            return Err(Error::Io(e));
        }
        debug!(server = %self.config.name, "tool server stopped");
        Ok(())
    }
}
