use {async_trait::async_trait, serde_json::Value};

use skein_protocol::InboundMessage;

/// The message pipeline as seen from the WebSocket endpoint. Bound late on
/// [`crate::state::GatewayState`] because the dispatcher needs the state to
/// exist first.
#[async_trait]
pub trait ChatService: Send + Sync {
    /// Admit an inbound message into the pipeline. Errors only when the
    /// session's lane rejects the task (buffer full).
    async fn process(&self, msg: InboundMessage) -> anyhow::Result<()>;

    /// Summaries of all live sessions.
    fn list_sessions(&self) -> Value;

    /// Snapshot of one session, including history.
    fn get_session(&self, key: &str) -> Option<Value>;
}
