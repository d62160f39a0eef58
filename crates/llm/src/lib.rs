//! LLM driver: the streaming provider contract and the Anthropic Messages
//! API implementation.

pub mod anthropic;
pub mod provider;
pub mod types;

pub use anthropic::AnthropicProvider;
pub use provider::{EventStream, Provider};
pub use types::{ContentBlock, Message, Role, StreamEvent, ToolDef};
