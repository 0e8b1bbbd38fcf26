//! Fakes shared by the unit tests.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};

use crate::catalogue::ToolDescriptor;
use crate::model::{Message, ModelError, ModelGateway, ModelRequest, ModelResponse, Part, ToolUse, Usage};
use crate::transport::{Launcher, ToolOutput, ToolTransport};

/// An executable artifact in a fresh temp dir. Keep the dir alive.
pub(crate) fn artifact_file() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("server.js");
    std::fs::write(&path, "#!/usr/bin/env node\n").unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
    (dir, path)
}

pub(crate) fn text(text: &str) -> Part {
    Part::Text {
        text: text.to_string(),
    }
}

pub(crate) fn tool_use(id: &str, name: &str, input: Value) -> Part {
    Part::ToolUse(ToolUse {
        id: id.to_string(),
        name: name.to_string(),
        input,
    })
}

#[derive(Debug, Clone)]
pub(crate) enum CallBehaviour {
    /// Return the arguments as text.
    Echo,
    /// Report a tool failure with this message.
    Fail(String),
    /// Behave as if the server process died.
    Exit,
    /// Echo after a pause.
    Slow(Duration),
}

#[derive(Debug)]
struct FakeState {
    tools: Vec<ToolDescriptor>,
    handshake_delay: Mutex<Option<Duration>>,
    handshake_times_out: AtomicBool,
    launch_fails: AtomicBool,
    behaviour: Mutex<CallBehaviour>,
    launches: AtomicUsize,
    handshakes: AtomicUsize,
    shutdowns: AtomicUsize,
    calls: Mutex<Vec<(String, Value)>>,
}

/// Counts launches and hands out in-memory transports.
#[derive(Debug, Clone)]
pub(crate) struct FakeLauncher {
    state: Arc<FakeState>,
}

impl FakeLauncher {
    pub(crate) fn with_tools(names: &[&str]) -> Self {
        let tools = names
            .iter()
            .map(|name| ToolDescriptor {
                name: name.to_string(),
                description: format!("{name} tool"),
                input_schema: json!({"type": "object"}),
            })
            .collect();
        Self {
            state: Arc::new(FakeState {
                tools,
                handshake_delay: Mutex::new(None),
                handshake_times_out: AtomicBool::new(false),
                launch_fails: AtomicBool::new(false),
                behaviour: Mutex::new(CallBehaviour::Echo),
                launches: AtomicUsize::new(0),
                handshakes: AtomicUsize::new(0),
                shutdowns: AtomicUsize::new(0),
                calls: Mutex::new(Vec::new()),
            }),
        }
    }

    pub(crate) fn delay_handshake(&self, delay: Duration) {
        *self.state.handshake_delay.lock().unwrap() = Some(delay);
    }

    /// The client gives up on `initialize` before the connection does.
    pub(crate) fn time_out_handshakes(&self) {
        self.state.handshake_times_out.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_launches(&self) {
        self.state.launch_fails.store(true, Ordering::SeqCst);
    }

    pub(crate) fn set_behaviour(&self, behaviour: CallBehaviour) {
        *self.state.behaviour.lock().unwrap() = behaviour;
    }

    pub(crate) fn launches(&self) -> usize {
        self.state.launches.load(Ordering::SeqCst)
    }

    pub(crate) fn handshakes(&self) -> usize {
        self.state.handshakes.load(Ordering::SeqCst)
    }

    pub(crate) fn shutdowns(&self) -> usize {
        self.state.shutdowns.load(Ordering::SeqCst)
    }

    pub(crate) fn calls(&self) -> Vec<(String, Value)> {
        self.state.calls.lock().unwrap().clone()
    }
}

impl Launcher for FakeLauncher {
    type Transport = FakeTransport;

    async fn launch(&self, _artifact: &Path) -> mcp::Result<FakeTransport> {
        self.state.launches.fetch_add(1, Ordering::SeqCst);
        if self.state.launch_fails.load(Ordering::SeqCst) {
            return Err(mcp::Error::Spawn {
                command: "node".to_string(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        }
        Ok(FakeTransport {
            state: Arc::clone(&self.state),
        })
    }
}

#[derive(Debug)]
pub(crate) struct FakeTransport {
    state: Arc<FakeState>,
}

impl ToolTransport for FakeTransport {
    async fn handshake(&self) -> mcp::Result<()> {
        self.state.handshakes.fetch_add(1, Ordering::SeqCst);
        let delay = *self.state.handshake_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.state.handshake_times_out.load(Ordering::SeqCst) {
            return Err(mcp::Error::Timeout {
                method: "initialize".to_string(),
            });
        }
        Ok(())
    }

    async fn list_tools(&self) -> mcp::Result<Vec<ToolDescriptor>> {
        Ok(self.state.tools.clone())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> mcp::Result<ToolOutput> {
        self.state
            .calls
            .lock()
            .unwrap()
            .push((name.to_string(), arguments.clone()));
        let behaviour = self.state.behaviour.lock().unwrap().clone();
        match behaviour {
            CallBehaviour::Echo => Ok(ToolOutput::text(arguments.to_string())),
            CallBehaviour::Fail(message) => Err(mcp::Error::ToolCallFailed(message)),
            CallBehaviour::Exit => Err(mcp::Error::ServerExited),
            CallBehaviour::Slow(pause) => {
                tokio::time::sleep(pause).await;
                Ok(ToolOutput::text(arguments.to_string()))
            }
        }
    }

    async fn shutdown(self) {
        self.state.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

/// What the gateway was asked.
#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub messages: Vec<Message>,
    pub tools: Option<Vec<String>>,
}

/// Replays a fixed script of model replies and records every request.
#[derive(Debug, Default)]
pub(crate) struct ScriptedGateway {
    replies: Mutex<VecDeque<Result<Vec<Part>, ModelError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
    reject_credentials: bool,
    probes: AtomicUsize,
}

impl ScriptedGateway {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn reply(self, parts: Vec<Part>) -> Self {
        self.replies.lock().unwrap().push_back(Ok(parts));
        self
    }

    pub(crate) fn fail(self, error: ModelError) -> Self {
        self.replies.lock().unwrap().push_back(Err(error));
        self
    }

    pub(crate) fn rejecting_credentials(mut self) -> Self {
        self.reject_credentials = true;
        self
    }

    pub(crate) fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

impl ModelGateway for ScriptedGateway {
    async fn complete(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            messages: request.messages.to_vec(),
            tools: request
                .tools
                .map(|tools| tools.iter().map(|t| t.name.clone()).collect()),
        });

        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(Ok(parts)) => Ok(ModelResponse {
                message: Message::assistant(parts),
                usage: Usage::default(),
            }),
            Some(Err(e)) => Err(e),
            None => Err(ModelError::InvalidResponse("script exhausted".into())),
        }
    }

    async fn list_models(&self) -> Result<Vec<String>, ModelError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.reject_credentials {
            Err(ModelError::Unauthorized("invalid x-api-key".into()))
        } else {
            Ok(vec!["claude-3-5-sonnet-20241022".to_string()])
        }
    }
}
