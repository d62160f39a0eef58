use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use {anyhow::Result, tokio_util::sync::CancellationToken, tracing::{error, info}};

use skein_protocol::OutboundMessage;

use crate::adapter::ChannelAdapter;

/// Adapter lifecycle and outbound routing.
#[derive(Default)]
pub struct ChannelRegistry {
    adapters: RwLock<HashMap<String, Arc<dyn ChannelAdapter>>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, adapter: Arc<dyn ChannelAdapter>) {
        let id = adapter.id().to_string();
        self.adapters.write().unwrap().insert(id.clone(), adapter);
        info!(channel = %id, "channel registered");
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn ChannelAdapter>> {
        self.adapters.read().unwrap().get(id).cloned()
    }

    /// Start every registered adapter. The first failure aborts startup.
    pub async fn start_all(&self, shutdown: CancellationToken) -> Result<()> {
        let adapters: Vec<_> = self.adapters.read().unwrap().values().cloned().collect();
        for adapter in adapters {
            adapter
                .start(shutdown.clone())
                .await
                .map_err(|e| anyhow::anyhow!("start channel {}: {e}", adapter.id()))?;
            info!(channel = adapter.id(), "channel started");
        }
        Ok(())
    }

    pub async fn stop_all(&self) {
        let adapters: Vec<_> = self.adapters.read().unwrap().values().cloned().collect();
        for adapter in adapters {
            if let Err(e) = adapter.stop().await {
                error!(channel = adapter.id(), err = %e, "stop channel error");
            }
        }
    }

    /// Route an outbound message to its adapter.
    pub async fn send(&self, msg: &OutboundMessage) -> Result<()> {
        let adapter = self
            .get(&msg.channel)
            .ok_or_else(|| anyhow::anyhow!("channel not found: {}", msg.channel))?;
        adapter.send(msg).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use skein_protocol::TextFormat;

    use super::*;

    struct RecordingAdapter {
        sent: Mutex<Vec<OutboundMessage>>,
    }

    #[async_trait]
    impl ChannelAdapter for RecordingAdapter {
        fn id(&self) -> &str {
            "fake"
        }

        async fn start(&self, _shutdown: CancellationToken) -> Result<()> {
            Ok(())
        }

        async fn stop(&self) -> Result<()> {
            Ok(())
        }

        async fn send(&self, msg: &OutboundMessage) -> Result<()> {
            self.sent.lock().unwrap().push(msg.clone());
            Ok(())
        }
    }

    fn outbound(channel: &str) -> OutboundMessage {
        OutboundMessage {
            session_id: "s".into(),
            channel: channel.into(),
            peer_id: "1".into(),
            thread_id: String::new(),
            text: "hi".into(),
            format: TextFormat::Text,
        }
    }

    #[tokio::test]
    async fn routes_to_registered_adapter() {
        let registry = ChannelRegistry::new();
        let adapter = Arc::new(RecordingAdapter {
            sent: Mutex::new(Vec::new()),
        });
        registry.register(adapter.clone());

        registry.send(&outbound("fake")).await.unwrap();
        assert_eq!(adapter.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_channel_errors() {
        let registry = ChannelRegistry::new();
        let err = registry.send(&outbound("nope")).await.unwrap_err();
        assert!(err.to_string().contains("channel not found"));
    }
}
