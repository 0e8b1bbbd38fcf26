//! Anthropic Messages API gateway.

use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::catalogue::ToolDescriptor;
use crate::model::{
    Message, ModelError, ModelGateway, ModelRequest, ModelResponse, Part, Role, ToolUse, Usage,
};
use crate::supervisor::{Credential, GatewayFactory};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
pub const DEFAULT_MAX_TOKENS: u32 = 1000;
const API_VERSION: &str = "2023-06-01";

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool<'a>>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: ApiContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ApiContent {
    Text(String),
    Blocks(Vec<ApiContentBlock>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
}

#[derive(Debug, Serialize)]
struct ApiTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ApiResponseBlock>,
    usage: ApiUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiModels {
    data: Vec<ApiModel>,
}

#[derive(Debug, Deserialize)]
struct ApiModel {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Gateway Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for an [`AnthropicGateway`].
#[derive(Debug, Clone)]
pub struct AnthropicGatewayBuilder {
    credential: Credential,
    model: String,
    max_tokens: u32,
    base_url: String,
    timeout: Option<Duration>,
}

impl AnthropicGatewayBuilder {
    pub fn new(credential: Credential, model: impl Into<String>) -> Self {
        Self {
            credential,
            model: model.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: None,
        }
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// API origin, without the `/v1` path.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> AnthropicGateway {
        AnthropicGateway {
            client: reqwest::Client::new(),
            credential: self.credential,
            model: self.model,
            max_tokens: self.max_tokens,
            base_url: self.base_url,
            timeout: self.timeout,
        }
    }
}

/// Talks to the Anthropic Messages API with an API key.
pub struct AnthropicGateway {
    client: reqwest::Client,
    credential: Credential,
    model: String,
    max_tokens: u32,
    base_url: String,
    timeout: Option<Duration>,
}

impl AnthropicGateway {
    pub fn builder(credential: Credential, model: impl Into<String>) -> AnthropicGatewayBuilder {
        AnthropicGatewayBuilder::new(credential, model)
    }

    fn request(&self, req: RequestBuilder) -> RequestBuilder {
        let req = req
            .header("x-api-key", self.credential.expose())
            .header("anthropic-version", API_VERSION)
            .header("accept", "application/json");
        match self.timeout {
            Some(timeout) => req.timeout(timeout),
            None => req,
        }
    }

    fn role_to_api(role: Role) -> &'static str {
        match role {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    fn message_to_api(msg: &Message) -> ApiMessage {
        let role = Self::role_to_api(msg.role);

        if let [Part::Text { text }] = msg.parts.as_slice() {
            return ApiMessage {
                role,
                content: ApiContent::Text(text.clone()),
            };
        }

        let blocks = msg
            .parts
            .iter()
            .flat_map(|part| match part {
                Part::Text { text } => vec![ApiContentBlock::Text { text: text.clone() }],
                Part::ToolUse(call) => vec![ApiContentBlock::ToolUse {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    input: call.input.clone(),
                }],
                Part::ToolOutput { content, .. } => Self::tool_output_to_api(content),
            })
            .collect();

        ApiMessage {
            role,
            content: ApiContent::Blocks(blocks),
        }
    }

    /// Tool output goes back as plain content of a user turn.
    ///
    /// Text blocks pass through; anything else is sent as its JSON text.
    fn tool_output_to_api(content: &Value) -> Vec<ApiContentBlock> {
        let to_block = |item: &Value| match (item.get("type"), item.get("text")) {
            (Some(Value::String(kind)), Some(Value::String(text))) if kind == "text" => {
                ApiContentBlock::Text { text: text.clone() }
            }
            _ => ApiContentBlock::Text {
                text: item.to_string(),
            },
        };
        match content {
            Value::Array(items) => items.iter().map(to_block).collect(),
            Value::String(text) => vec![ApiContentBlock::Text { text: text.clone() }],
            other => vec![to_block(other)],
        }
    }

    fn tool_to_api(tool: &ToolDescriptor) -> ApiTool<'_> {
        ApiTool {
            name: &tool.name,
            description: &tool.description,
            input_schema: &tool.input_schema,
        }
    }

    fn response_to_message(blocks: Vec<ApiResponseBlock>) -> Message {
        let parts = blocks
            .into_iter()
            .filter_map(|block| match block {
                ApiResponseBlock::Text { text } => Some(Part::Text { text }),
                ApiResponseBlock::ToolUse { id, name, input } => {
                    Some(Part::ToolUse(ToolUse { id, name, input }))
                }
                ApiResponseBlock::Unknown => None,
            })
            .collect();

        Message::assistant(parts)
    }
}

fn transport_error(e: reqwest::Error) -> ModelError {
    if e.is_timeout() {
        ModelError::Timeout(e.to_string())
    } else {
        ModelError::Network(e.to_string())
    }
}

/// Classify a non-success response.
fn status_error(status: StatusCode, body: &str) -> ModelError {
    let message = serde_json::from_str::<ApiErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.to_string());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ModelError::Unauthorized(format!("{status}: {message}"))
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            ModelError::Timeout(format!("{status}: {message}"))
        }
        _ => ModelError::Api(format!("{status}: {message}")),
    }
}

async fn check(response: Response) -> Result<Response, ModelError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, &body))
}

impl std::fmt::Display for AnthropicGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "anthropic({})", self.model)
    }
}

impl ModelGateway for AnthropicGateway {
    async fn complete(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        let api_request = ApiRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: request.messages.iter().map(Self::message_to_api).collect(),
            tools: request
                .tools
                .map(|tools| tools.iter().map(Self::tool_to_api).collect())
                .unwrap_or_default(),
        };
        debug!(
            model = %self.model,
            messages = api_request.messages.len(),
            tools = api_request.tools.len(),
            "sending completion request"
        );

        let response = self
            .request(self.client.post(format!("{}/v1/messages", self.base_url)))
            .json(&api_request)
            .send()
            .await
            .map_err(transport_error)?;
        let api_response: ApiResponse = check(response)
            .await?
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

        Ok(ModelResponse {
            message: Self::response_to_message(api_response.content),
            usage: Usage {
                input_tokens: api_response.usage.input_tokens,
                output_tokens: api_response.usage.output_tokens,
            },
        })
    }

    async fn list_models(&self) -> Result<Vec<String>, ModelError> {
        let response = self
            .request(self.client.get(format!("{}/v1/models", self.base_url)))
            .send()
            .await
            .map_err(transport_error)?;
        let models: ApiModels = check(response)
            .await?
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

        Ok(models.data.into_iter().map(|m| m.id).collect())
    }
}

/// Builds an [`AnthropicGateway`] per credential.
#[derive(Debug, Clone)]
pub struct AnthropicFactory {
    pub model: String,
    pub max_tokens: u32,
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
}

impl Default for AnthropicFactory {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            base_url: None,
            timeout: None,
        }
    }
}

impl GatewayFactory for AnthropicFactory {
    type Gateway = AnthropicGateway;

    fn build(&self, credential: &Credential) -> AnthropicGateway {
        let mut builder = AnthropicGateway::builder(credential.clone(), &self.model)
            .max_tokens(self.max_tokens);
        if let Some(base_url) = &self.base_url {
            builder = builder.base_url(base_url);
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        builder.build()
    }
}
