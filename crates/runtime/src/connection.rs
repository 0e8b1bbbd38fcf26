//! Lifecycle of the single connection to a tool server.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::artifact;
use crate::catalogue::ToolCatalogue;
use crate::error::{ConnectError, ToolError};
use crate::transport::{Launcher, ToolOutput, ToolTransport};

/// Recommended bound on the handshake step.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Uninitialized,
    Connecting,
    Ready,
    Failed,
}

/// Owns the transport to one tool-server process.
///
/// The catalogue is non-empty exactly when the status is [`ConnectionStatus::Ready`].
pub struct ConnectionManager<L: Launcher> {
    launcher: L,
    handshake_timeout: Duration,
    status: ConnectionStatus,
    transport: Option<L::Transport>,
    catalogue: ToolCatalogue,
    // Set by invoke_tool, which only has `&self`, when the transport dies.
    lost: AtomicBool,
}

impl<L: Launcher> ConnectionManager<L> {
    pub fn new(launcher: L) -> Self {
        Self {
            launcher,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            status: ConnectionStatus::Uninitialized,
            transport: None,
            catalogue: ToolCatalogue::empty(),
            lost: AtomicBool::new(false),
        }
    }

    pub fn with_handshake_timeout(mut self, handshake_timeout: Duration) -> Self {
        self.handshake_timeout = handshake_timeout;
        self
    }

    pub fn status(&self) -> ConnectionStatus {
        if self.status == ConnectionStatus::Ready && self.lost.load(Ordering::SeqCst) {
            ConnectionStatus::Failed
        } else {
            self.status
        }
    }

    /// The discovered tools, or an empty catalogue when not ready.
    pub fn catalogue(&self) -> ToolCatalogue {
        if self.status() == ConnectionStatus::Ready {
            self.catalogue.clone()
        } else {
            ToolCatalogue::empty()
        }
    }

    /// Launch, handshake and discover. A no-op when already ready.
    pub async fn connect(&mut self, artifact: &Path) -> Result<(), ConnectError> {
        if self.status() == ConnectionStatus::Ready {
            debug!("tool server already connected");
            return Ok(());
        }

        // A transport observed dead is still held; release it first.
        self.teardown().await;
        self.status = ConnectionStatus::Connecting;
        info!(artifact = %artifact.display(), "connecting to tool server");

        match self.establish(artifact).await {
            Ok((transport, catalogue)) => {
                info!(tools = catalogue.len(), "tool server ready");
                self.transport = Some(transport);
                self.catalogue = catalogue;
                self.status = ConnectionStatus::Ready;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "tool server connection failed");
                self.status = ConnectionStatus::Failed;
                Err(e)
            }
        }
    }

    async fn establish(&self, artifact: &Path) -> Result<(L::Transport, ToolCatalogue), ConnectError> {
        artifact::ensure_executable(artifact)?;

        let transport = self
            .launcher
            .launch(artifact)
            .await
            .map_err(ConnectError::Spawn)?;

        match self.discover(&transport).await {
            Ok(catalogue) => Ok((transport, catalogue)),
            Err(e) => {
                transport.shutdown().await;
                Err(e)
            }
        }
    }

    async fn discover(&self, transport: &L::Transport) -> Result<ToolCatalogue, ConnectError> {
        match timeout(self.handshake_timeout, transport.handshake()).await {
            Err(_) | Ok(Err(mcp::Error::Timeout { .. })) => {
                return Err(ConnectError::HandshakeTimeout(self.handshake_timeout));
            }
            Ok(Err(e)) => return Err(ConnectError::Handshake(e)),
            Ok(Ok(())) => {}
        }

        let tools = transport
            .list_tools()
            .await
            .map_err(ConnectError::Discovery)?;
        debug!(count = tools.len(), "discovered tools");

        ToolCatalogue::from_discovery(tools)
    }

    /// Forward a tool call to the server.
    pub async fn invoke_tool(&self, name: &str, arguments: Value) -> Result<ToolOutput, ToolError> {
        if self.status() != ConnectionStatus::Ready {
            return Err(ToolError::NotReady);
        }
        let Some(transport) = &self.transport else {
            return Err(ToolError::NotReady);
        };
        if !self.catalogue.contains(name) {
            return Err(ToolError::UnknownTool(name.to_string()));
        }

        debug!(tool = %name, "invoking tool");
        transport.call_tool(name, arguments).await.map_err(|e| {
            if e.is_connection_lost() {
                warn!(tool = %name, error = %e, "tool server connection lost");
                self.lost.store(true, Ordering::SeqCst);
                return ToolError::ConnectionLost(e.to_string());
            }
            let message = match e {
                mcp::Error::ToolCallFailed(message) => message,
                other => other.to_string(),
            };
            ToolError::Execution {
                tool: name.to_string(),
                message,
            }
        })
    }

    /// Release the transport. Safe to call repeatedly.
    pub async fn teardown(&mut self) {
        if let Some(transport) = self.transport.take() {
            debug!("releasing tool server transport");
            transport.shutdown().await;
        }
        self.catalogue = ToolCatalogue::empty();
        self.lost.store(false, Ordering::SeqCst);
        self.status = ConnectionStatus::Uninitialized;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CallBehaviour, FakeLauncher, artifact_file};
    use serde_json::json;

    #[tokio::test]
    async fn connect_is_idempotent() {
        let (_dir, artifact) = artifact_file();
        let launcher = FakeLauncher::with_tools(&["echo"]);
        let mut conn = ConnectionManager::new(launcher.clone());

        conn.connect(&artifact).await.unwrap();
        conn.connect(&artifact).await.unwrap();

        assert_eq!(conn.status(), ConnectionStatus::Ready);
        assert_eq!(launcher.launches(), 1);
        assert_eq!(launcher.handshakes(), 1);
    }

    #[tokio::test]
    async fn catalogue_tracks_readiness() {
        let (_dir, artifact) = artifact_file();
        let launcher = FakeLauncher::with_tools(&["echo", "connect-wallet"]);
        let mut conn = ConnectionManager::new(launcher.clone());

        assert_eq!(conn.status(), ConnectionStatus::Uninitialized);
        assert!(conn.catalogue().is_empty());

        conn.connect(&artifact).await.unwrap();
        assert_eq!(conn.catalogue().len(), 2);

        conn.teardown().await;
        assert_eq!(conn.status(), ConnectionStatus::Uninitialized);
        assert!(conn.catalogue().is_empty());
        assert_eq!(launcher.shutdowns(), 1);
    }

    #[tokio::test]
    async fn zero_tools_is_a_failure() {
        let (_dir, artifact) = artifact_file();
        let launcher = FakeLauncher::with_tools(&[]);
        let mut conn = ConnectionManager::new(launcher.clone());

        let err = conn.connect(&artifact).await.unwrap_err();
        assert!(matches!(err, ConnectError::NoToolsDiscovered));
        assert_eq!(conn.status(), ConnectionStatus::Failed);
        assert!(conn.catalogue().is_empty());
        assert_eq!(launcher.shutdowns(), 1, "transport must be released");
    }

    #[tokio::test]
    async fn handshake_timeout_releases_transport() {
        let (_dir, artifact) = artifact_file();
        let launcher = FakeLauncher::with_tools(&["echo"]);
        launcher.delay_handshake(Duration::from_secs(5));
        let mut conn =
            ConnectionManager::new(launcher.clone()).with_handshake_timeout(Duration::from_millis(20));

        let err = conn.connect(&artifact).await.unwrap_err();
        assert!(matches!(err, ConnectError::HandshakeTimeout(_)));
        assert_eq!(conn.status(), ConnectionStatus::Failed);
        assert_eq!(launcher.shutdowns(), 1);
    }

    #[tokio::test]
    async fn client_side_handshake_timeout_is_a_handshake_timeout() {
        let (_dir, artifact) = artifact_file();
        let launcher = FakeLauncher::with_tools(&["echo"]);
        launcher.time_out_handshakes();
        let mut conn =
            ConnectionManager::new(launcher.clone()).with_handshake_timeout(Duration::from_secs(60));

        let err = conn.connect(&artifact).await.unwrap_err();
        assert!(matches!(err, ConnectError::HandshakeTimeout(t) if t == Duration::from_secs(60)));
        assert_eq!(launcher.shutdowns(), 1);
    }

    #[tokio::test]
    async fn missing_artifact_never_launches() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = FakeLauncher::with_tools(&["echo"]);
        let mut conn = ConnectionManager::new(launcher.clone());

        let err = conn.connect(&dir.path().join("server.js")).await.unwrap_err();
        assert!(matches!(err, ConnectError::ArtifactNotFound(_)));
        assert_eq!(launcher.launches(), 0);
    }

    #[tokio::test]
    async fn spawn_failure_is_a_connect_error() {
        let (_dir, artifact) = artifact_file();
        let launcher = FakeLauncher::with_tools(&["echo"]);
        launcher.fail_launches();
        let mut conn = ConnectionManager::new(launcher);

        let err = conn.connect(&artifact).await.unwrap_err();
        assert!(matches!(err, ConnectError::Spawn(_)));
    }

    #[tokio::test]
    async fn unknown_tool_leaves_connection_ready() {
        let (_dir, artifact) = artifact_file();
        let launcher = FakeLauncher::with_tools(&["echo"]);
        let mut conn = ConnectionManager::new(launcher.clone());
        conn.connect(&artifact).await.unwrap();

        let err = conn.invoke_tool("transfer", json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool(ref name) if name == "transfer"));
        assert_eq!(conn.status(), ConnectionStatus::Ready);
        assert!(launcher.calls().is_empty());
    }

    #[tokio::test]
    async fn invoke_before_connect_is_not_ready() {
        let conn = ConnectionManager::new(FakeLauncher::with_tools(&["echo"]));
        let err = conn.invoke_tool("echo", json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::NotReady));
    }

    #[tokio::test]
    async fn forwards_calls_and_server_failures() {
        let (_dir, artifact) = artifact_file();
        let launcher = FakeLauncher::with_tools(&["echo"]);
        let mut conn = ConnectionManager::new(launcher.clone());
        conn.connect(&artifact).await.unwrap();

        let output = conn.invoke_tool("echo", json!({"msg": "hi"})).await.unwrap();
        assert_eq!(output, ToolOutput::text(r#"{"msg":"hi"}"#));
        assert_eq!(launcher.calls(), [("echo".to_string(), json!({"msg": "hi"}))]);

        launcher.set_behaviour(CallBehaviour::Fail("wallet locked".into()));
        let err = conn.invoke_tool("echo", json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::Execution { ref message, .. } if message == "wallet locked"));
        assert_eq!(conn.status(), ConnectionStatus::Ready);
    }

    #[tokio::test]
    async fn lost_transport_fails_the_connection() {
        let (_dir, artifact) = artifact_file();
        let launcher = FakeLauncher::with_tools(&["echo"]);
        let mut conn = ConnectionManager::new(launcher.clone());
        conn.connect(&artifact).await.unwrap();

        launcher.set_behaviour(CallBehaviour::Exit);
        let err = conn.invoke_tool("echo", json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::ConnectionLost(_)));
        assert_eq!(conn.status(), ConnectionStatus::Failed);
        assert!(conn.catalogue().is_empty());

        launcher.set_behaviour(CallBehaviour::Echo);
        conn.connect(&artifact).await.unwrap();
        assert_eq!(launcher.launches(), 2);
        assert_eq!(launcher.shutdowns(), 1);
        assert_eq!(conn.status(), ConnectionStatus::Ready);
    }

    #[tokio::test]
    async fn teardown_twice_is_harmless() {
        let (_dir, artifact) = artifact_file();
        let launcher = FakeLauncher::with_tools(&["echo"]);
        let mut conn = ConnectionManager::new(launcher.clone());
        conn.connect(&artifact).await.unwrap();

        conn.teardown().await;
        conn.teardown().await;
        assert_eq!(launcher.shutdowns(), 1);
        assert_eq!(conn.status(), ConnectionStatus::Uninitialized);
    }
}
