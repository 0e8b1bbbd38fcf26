//! Line-delimited JSON-RPC client over any async byte pipe.
//!
//! [`Server`](crate::Server) wires this to a child process's stdio; tests
//! wire it to an in-memory duplex pipe.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, JsonRpcNotification,
    JsonRpcRequest, JsonRpcResponse, ListToolsResult, RequestId, Tool,
};

/// Default timeout for a single request/response exchange.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Maximum size of one response line (1MB).
pub const MAX_OUTPUT_SIZE: usize = 1024 * 1024;

struct Pipe<R, W> {
    reader: R,
    writer: W,
}

/// An MCP client session over a reader/writer pair.
pub struct Client<R, W> {
    // One exchange at a time: a request holds the pipe until its response
    // (or a timeout) so responses cannot be claimed by the wrong caller.
    pipe: Mutex<Pipe<R, W>>,
    next_id: AtomicI64,
    timeout: Duration,
    initialized: AtomicBool,
}

impl<R, W> Client<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            pipe: Mutex::new(Pipe { reader, writer }),
            next_id: AtomicI64::new(1),
            timeout: DEFAULT_TIMEOUT,
            initialized: AtomicBool::new(false),
        }
    }

    /// Override the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Perform the `initialize` handshake and send `notifications/initialized`.
    pub async fn initialize(&self) -> Result<InitializeResult> {
        let result: InitializeResult = self
            .request("initialize", Some(InitializeParams::default()))
            .await?;

        if !result.is_supported_version() {
            return Err(Error::ProtocolMismatch(result.protocol_version));
        }

        self.notify("notifications/initialized", None).await?;
        self.initialized.store(true, Ordering::SeqCst);

        debug!(
            server = %result.server_info.name,
            protocol = %result.protocol_version,
            "handshake complete"
        );
        Ok(result)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Request the server's tool list.
    pub async fn list_tools(&self) -> Result<Vec<Tool>> {
        self.ensure_initialized()?;
        let result: ListToolsResult = self.request("tools/list", None::<()>).await?;
        Ok(result.tools)
    }

    /// Call a tool by name.
    ///
    /// A result flagged `isError` comes back as [`Error::ToolCallFailed`].
    pub async fn call_tool(&self, name: &str, arguments: Option<Value>) -> Result<CallToolResult> {
        self.ensure_initialized()?;

        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };
        let result: CallToolResult = self.request("tools/call", Some(params)).await?;

        if result.is_error {
            return Err(Error::ToolCallFailed(result.text()));
        }
        Ok(result)
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(Error::NotInitialized)
        }
    }

    fn next_request_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn request<P, T>(&self, method: &str, params: Option<P>) -> Result<T>
    where
        P: Serialize,
        T: DeserializeOwned,
    {
        let id = self.next_request_id();
        let params = params.map(serde_json::to_value).transpose()?;
        let request = JsonRpcRequest::new(id.clone(), method, params);
        let line = serde_json::to_string(&request)?;

        let response = timeout(self.timeout, self.exchange(line, &id))
            .await
            .map_err(|_| Error::Timeout {
                method: method.to_string(),
            })??;

        let value = response.into_result()?;
        Ok(serde_json::from_value(value)?)
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        let line = serde_json::to_string(&JsonRpcNotification::new(method, params))?;
        let mut pipe = self.pipe.lock().await;
        write_line(&mut pipe.writer, &line).await
    }

    async fn exchange(&self, line: String, id: &RequestId) -> Result<JsonRpcResponse> {
        let mut pipe = self.pipe.lock().await;
        write_line(&mut pipe.writer, &line).await?;

        let mut buf = String::new();
        loop {
            buf.clear();
            let bytes_read = pipe.reader.read_line(&mut buf).await?;
            if bytes_read == 0 {
                return Err(Error::ServerExited);
            }
            if buf.len() > MAX_OUTPUT_SIZE {
                return Err(Error::OutputTooLarge {
                    size: buf.len(),
                    max: MAX_OUTPUT_SIZE,
                });
            }

            let trimmed = buf.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                Ok(response) if response.method.is_some() => {
                    trace!(method = ?response.method, "skipping server request");
                }
                Ok(response) if &response.id == id => return Ok(response),
                Ok(response) => trace!(id = ?response.id, "skipping response for another request"),
                // Servers may print banners or logs on stdout.
                Err(_) => trace!(line = trimmed, "skipping non-response line"),
            }
        }
    }
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}
