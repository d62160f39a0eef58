use std::pin::Pin;

use tokio_stream::Stream;

use crate::types::{Message, StreamEvent, ToolDef};

pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// An LLM backend that streams a tool-using conversation.
///
/// The returned stream is finite and forward-only; the provider guarantees
/// that `Complete` (success) or `Error` (failure) is the last event.
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    /// Model identifier (e.g. "claude-sonnet-4-5-20250929").
    fn model(&self) -> &str;

    fn stream(&self, system_prompt: &str, messages: &[Message], tools: &[ToolDef]) -> EventStream;
}
