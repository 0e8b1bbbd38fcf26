//! Shapes returned across the supervisor boundary.

use serde::Serialize;

use crate::catalogue::ToolDescriptor;
use crate::supervisor::SessionId;

/// Outcome of session establishment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InitReport {
    pub initialized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDescriptor>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InitReport {
    pub fn ready(tools: Vec<ToolDescriptor>) -> Self {
        Self {
            initialized: true,
            tools: Some(tools),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            initialized: false,
            tools: None,
            error: Some(error.into()),
        }
    }
}

/// Outcome of one query: an answer or one explanatory message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum QueryReply {
    Result { result: String },
    Error { error: String },
}

/// Point-in-time view of the session.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub initialized: bool,
    pub tools_available: bool,
    pub tools: Vec<ToolDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    /// Why the last establishment attempt failed, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}
