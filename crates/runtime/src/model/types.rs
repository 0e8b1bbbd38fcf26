use super::errors::ModelError;
use crate::catalogue::ToolCatalogue;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// The role of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUse {
    /// Model-assigned id correlating the request with its turn.
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// One block of turn content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text { text: String },
    ToolUse(ToolUse),
    /// Content returned by a tool, fed back to the model as a user turn.
    ToolOutput { tool_use_id: String, content: Value },
}

/// A conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::Text { text: text.into() }],
        }
    }

    pub fn assistant(parts: Vec<Part>) -> Self {
        Self {
            role: Role::Assistant,
            parts,
        }
    }

    /// A user turn carrying a tool's output.
    pub fn tool_output(tool_use_id: impl Into<String>, content: Value) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::ToolOutput {
                tool_use_id: tool_use_id.into(),
                content,
            }],
        }
    }

    /// Text of the leading block, or `""` when it is not text.
    pub fn lead_text(&self) -> &str {
        match self.parts.first() {
            Some(Part::Text { text }) => text,
            _ => "",
        }
    }

    /// Tool invocations in the order the model issued them.
    pub fn tool_uses(&self) -> impl Iterator<Item = &ToolUse> {
        self.parts.iter().filter_map(|part| match part {
            Part::ToolUse(call) => Some(call),
            _ => None,
        })
    }
}

/// Token usage statistics.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Everything needed for one completion call.
#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    pub messages: &'a [Message],
    /// Tools offered to the model. `None` solicits no tool use.
    pub tools: Option<&'a ToolCatalogue>,
}

impl<'a> ModelRequest<'a> {
    pub fn new(messages: &'a [Message]) -> Self {
        Self {
            messages,
            tools: None,
        }
    }

    pub fn with_tools(messages: &'a [Message], tools: &'a ToolCatalogue) -> Self {
        Self {
            messages,
            tools: Some(tools),
        }
    }
}

/// The model's reply: an assistant turn plus usage.
#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub message: Message,
    pub usage: Usage,
}

/// The LLM completion API.
pub trait ModelGateway: Send + Sync {
    /// Complete a conversation, optionally offering tools.
    fn complete(
        &self,
        request: ModelRequest<'_>,
    ) -> impl Future<Output = Result<ModelResponse, ModelError>> + Send;

    /// Lightweight credential probe: list the models the credential can use.
    fn list_models(&self) -> impl Future<Output = Result<Vec<String>, ModelError>> + Send;
}

impl<G: ModelGateway> ModelGateway for Arc<G> {
    fn complete(
        &self,
        request: ModelRequest<'_>,
    ) -> impl Future<Output = Result<ModelResponse, ModelError>> + Send {
        (**self).complete(request)
    }

    fn list_models(&self) -> impl Future<Output = Result<Vec<String>, ModelError>> + Send {
        (**self).list_models()
    }
}
