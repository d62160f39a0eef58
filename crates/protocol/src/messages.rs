use serde::{Deserialize, Serialize};

/// A message arriving from any transport, normalized for the pipeline.
///
/// `session_id` and `agent_id` are optional; the pipeline derives them when
/// empty. Immutable once admitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InboundMessage {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub session_id: String,
    /// Originating transport, e.g. "telegram", "websocket".
    pub channel: String,
    /// "user", "group" or "channel".
    pub peer_kind: String,
    pub peer_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub guild_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub thread_id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub agent_id: String,
}

/// A reply to be delivered back through a transport adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub session_id: String,
    pub channel: String,
    pub peer_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub thread_id: String,
    pub text: String,
    #[serde(default)]
    pub format: TextFormat,
}

/// Rendering applied by the adapter before sending.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextFormat {
    #[default]
    Text,
    Markdown,
    Html,
}
