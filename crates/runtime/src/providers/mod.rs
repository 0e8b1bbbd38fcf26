//! LLM provider adapters.
//!
//! Each provider implements [`ModelGateway`](crate::model::ModelGateway) for its API.

mod anthropic;

pub use anthropic::{
    AnthropicFactory, AnthropicGateway, AnthropicGatewayBuilder, DEFAULT_BASE_URL,
    DEFAULT_MAX_TOKENS, DEFAULT_MODEL,
};
