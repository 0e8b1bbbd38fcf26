//! MCP (Model Context Protocol) client over stdio.
//!
//! Spawns a tool-server process, performs the `initialize` handshake,
//! discovers its tools and invokes them.
//!
//! # Example
//!
//! ```no_run
//! use mcp::{Server, ServerConfig};
//! use std::collections::HashMap;
//!
//! # async fn example() -> mcp::Result<()> {
//! let server = Server::spawn(ServerConfig {
//!     name: "wallet".to_string(),
//!     command: "node".to_string(),
//!     args: vec!["build/server.js".to_string()],
//!     env: HashMap::new(),
//! })?;
//! server.initialize().await?;
//!
//! for tool in server.list_tools().await? {
//!     println!("Tool: {}", tool.name);
//! }
//!
//! let result = server
//!     .call_tool("connect-wallet", Some(serde_json::json!({ "address": "0xabc" })))
//!     .await?;
//! println!("{}", result.text());
//!
//! server.shutdown().await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod protocol;
mod server;

pub use client::{Client, DEFAULT_TIMEOUT, MAX_OUTPUT_SIZE};
pub use error::{Error, Result};
pub use protocol::{
    CallToolParams, CallToolResult, Implementation, InitializeParams, InitializeResult,
    JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ListToolsResult,
    PROTOCOL_VERSION, RequestId, SUPPORTED_PROTOCOL_VERSIONS, ServerCapabilities, Tool,
    ToolContent,
};
pub use server::{Server, ServerConfig};
