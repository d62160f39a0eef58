use std::sync::Arc;

use {anyhow::Result, async_trait::async_trait, futures::future::BoxFuture, tokio_util::sync::CancellationToken};

use skein_protocol::{InboundMessage, OutboundMessage};

/// A messaging transport (Telegram, Slack, ...).
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Adapter identifier, matching `InboundMessage.channel`.
    fn id(&self) -> &str;

    /// Begin listening for updates. Workers exit when `shutdown` cancels.
    async fn start(&self, shutdown: CancellationToken) -> Result<()>;

    /// Gracefully stop listening.
    async fn stop(&self) -> Result<()>;

    /// Deliver a reply back to the transport.
    async fn send(&self, msg: &OutboundMessage) -> Result<()>;
}

/// Called by adapters for each accepted inbound message. Decouples the
/// adapter from pipeline internals; expected to enqueue and return quickly.
pub type MessageSink =
    Arc<dyn Fn(InboundMessage) -> BoxFuture<'static, Result<()>> + Send + Sync>;
