//! The seam between the connection manager and a tool-server process.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::time::Duration;

use mcp::{Server, ServerConfig, ToolContent};
use serde_json::Value;

use crate::catalogue::ToolDescriptor;

/// Content a tool returned.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub content: Vec<ToolContent>,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::text(text)],
        }
    }

    /// The content blocks as a JSON array, the shape fed back to the model.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(&self.content).unwrap_or(Value::Null)
    }
}

/// An open duplex channel to one tool-server process.
pub trait ToolTransport: Send + Sync {
    /// Exchange protocol greetings.
    fn handshake(&self) -> impl Future<Output = mcp::Result<()>> + Send;

    /// Request the tool list.
    fn list_tools(&self) -> impl Future<Output = mcp::Result<Vec<ToolDescriptor>>> + Send;

    /// Invoke a tool. A server-reported failure is an error.
    fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> impl Future<Output = mcp::Result<ToolOutput>> + Send;

    /// Release the channel and its process.
    fn shutdown(self) -> impl Future<Output = ()> + Send;
}

/// Starts tool-server processes.
pub trait Launcher: Send + Sync {
    type Transport: ToolTransport;

    /// Spawn the server for `artifact`. No protocol traffic yet.
    fn launch(&self, artifact: &Path) -> impl Future<Output = mcp::Result<Self::Transport>> + Send;
}

/// Launches artifacts as child processes speaking MCP over stdio.
#[derive(Debug, Clone, Default)]
pub struct StdioLauncher {
    interpreter: Option<String>,
    args: Vec<String>,
    env: HashMap<String, String>,
    request_timeout: Option<Duration>,
}

impl StdioLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the artifact under this program instead of guessing from its extension.
    pub fn interpreter(mut self, program: impl Into<String>) -> Self {
        self.interpreter = Some(program.into());
        self
    }

    /// Extra arguments after the artifact path.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Program and argv for an artifact.
    fn command_for(&self, artifact: &Path) -> (String, Vec<String>) {
        let path = artifact.display().to_string();
        let program = self.interpreter.clone().or_else(|| {
            match artifact.extension().and_then(|ext| ext.to_str()) {
                Some("js" | "mjs" | "cjs") => Some("node".to_string()),
                Some("py") if cfg!(windows) => Some("python".to_string()),
                Some("py") => Some("python3".to_string()),
                _ => None,
            }
        });

        match program {
            Some(program) => {
                let mut args = vec![path];
                args.extend(self.args.iter().cloned());
                (program, args)
            }
            None => (path, self.args.clone()),
        }
    }
}

impl Launcher for StdioLauncher {
    type Transport = Server;

    async fn launch(&self, artifact: &Path) -> mcp::Result<Server> {
        let (command, args) = self.command_for(artifact);
        let name = artifact
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("tool-server")
            .to_string();

        let server = Server::spawn(ServerConfig {
            name,
            command,
            args,
            env: self.env.clone(),
        })?;

        Ok(match self.request_timeout {
            Some(timeout) => server.with_timeout(timeout),
            None => server,
        })
    }
}

impl ToolTransport for Server {
    async fn handshake(&self) -> mcp::Result<()> {
        self.initialize().await.map(|_| ())
    }

    async fn list_tools(&self) -> mcp::Result<Vec<ToolDescriptor>> {
        let tools = Server::list_tools(self).await?;
        Ok(tools.into_iter().map(ToolDescriptor::from).collect())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> mcp::Result<ToolOutput> {
        let arguments = match arguments {
            Value::Null => None,
            other => Some(other),
        };
        let result = Server::call_tool(self, name, arguments).await?;
        Ok(ToolOutput {
            content: result.content,
        })
    }

    async fn shutdown(self) {
        if let Err(e) = Server::shutdown(&self).await {
            tracing::warn!(server = %self.name(), error = %e, "tool server shutdown failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn picks_program_from_extension() {
        let launcher = StdioLauncher::new();

        let (program, args) = launcher.command_for(&PathBuf::from("build/server.js"));
        assert_eq!(program, "node");
        assert_eq!(args, ["build/server.js"]);

        let (program, _) = launcher.command_for(&PathBuf::from("server.py"));
        assert_eq!(program, if cfg!(windows) { "python" } else { "python3" });

        let (program, args) = launcher.command_for(&PathBuf::from("/opt/wallet-server"));
        assert_eq!(program, "/opt/wallet-server");
        assert!(args.is_empty());
    }

    #[test]
    fn explicit_interpreter_wins() {
        let launcher = StdioLauncher::new().interpreter("bun").args(["--stdio"]);
        let (program, args) = launcher.command_for(&PathBuf::from("build/server.js"));
        assert_eq!(program, "bun");
        assert_eq!(args, ["build/server.js", "--stdio"]);
    }

    #[test]
    fn tool_output_serializes_as_content_blocks() {
        let output = ToolOutput::text("Connecting to wallet 0xabc...");
        assert_eq!(
            output.to_value(),
            serde_json::json!([{"type": "text", "text": "Connecting to wallet 0xabc..."}])
        );
    }
}
