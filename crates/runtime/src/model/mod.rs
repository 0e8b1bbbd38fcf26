//! Model gateway protocol types and trait.

pub mod errors;
pub mod types;

pub use errors::ModelError;
pub use types::{Message, ModelGateway, ModelRequest, ModelResponse, Part, Role, ToolUse, Usage};
