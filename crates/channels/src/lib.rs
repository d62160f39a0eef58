//! External-transport adapters and their registry.
//!
//! Adapters translate transport updates into normalized inbound messages,
//! enforce the transport access policy, and deliver outbound replies.

pub mod adapter;
pub mod registry;
pub mod telegram;

pub use adapter::{ChannelAdapter, MessageSink};
pub use registry::ChannelRegistry;
pub use telegram::TelegramAdapter;
