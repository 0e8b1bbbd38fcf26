//! Tiller runtime: session lifecycle and query orchestration between an LLM
//! and an MCP tool server.
//!
//! # Overview
//!
//! - **ConnectionManager**: owns the one connection to a tool-server process,
//!   from launch through handshake and tool discovery to teardown.
//! - **QueryOrchestrator**: answers a query with one model call, resolving each
//!   requested tool call with an invocation and one follow-up.
//! - **SessionSupervisor**: validates the credential, locates the artifact,
//!   connects with a bounded retry and degrades stale sessions.
//! - **DiagnosticsProbe**: read-only health report.
//!
//! # Example
//!
//! ```ignore
//! use runtime::{AnthropicFactory, Credential, SessionSupervisor, StdioLauncher, SupervisorConfig};
//!
//! # async fn example() -> Result<(), runtime::QueryError> {
//! let config = SupervisorConfig::new("build/server.js")
//!     .with_credential(Credential::new(std::env::var("ANTHROPIC_API_KEY").unwrap_or_default()));
//! let supervisor = SessionSupervisor::new(config, AnthropicFactory::default(), StdioLauncher::new());
//!
//! let answer = supervisor.run("Connect my wallet 0xabc").await?;
//! println!("{answer}");
//! # Ok(())
//! # }
//! ```

pub mod artifact;
mod catalogue;
mod connection;
mod diagnostics;
mod error;
pub mod model;
mod orchestrator;
pub mod providers;
mod rebuild;
mod report;
mod supervisor;
mod transport;

#[cfg(test)]
mod testing;

pub use artifact::ArtifactReport;
pub use catalogue::{ToolCatalogue, ToolDescriptor};
pub use connection::{ConnectionManager, ConnectionStatus, DEFAULT_HANDSHAKE_TIMEOUT};
pub use diagnostics::{CredentialCheck, DiagnosticsProbe, DiagnosticsReport, SessionCheck};
pub use error::{ConnectError, ErrorKind, InitError, QueryError, ToolError};
pub use model::{Message, ModelError, ModelGateway, ModelRequest, ModelResponse, Part, Role};
pub use orchestrator::QueryOrchestrator;
pub use providers::{AnthropicFactory, AnthropicGateway};
pub use rebuild::{CommandRebuild, DEFAULT_REBUILD_TIMEOUT, RebuildError, RebuildHook, RebuildOutcome};
pub use report::{InitReport, QueryReply, StatusReport};
pub use supervisor::{
    Credential, DEFAULT_CONNECT_RETRIES, DEFAULT_RETRY_DELAY, GatewayFactory, SessionId,
    SessionState, SessionSupervisor, SupervisorConfig,
};
pub use transport::{Launcher, StdioLauncher, ToolOutput, ToolTransport};
