//! Telegram adapter: long polling inbound, policy gating, chunked HTML
//! outbound with a plain-text retry.

mod inbound;
mod outbound;

use std::sync::{Arc, Mutex};

use {
    anyhow::Result,
    async_trait::async_trait,
    teloxide::{prelude::*, types::UpdateKind},
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use {
    skein_protocol::OutboundMessage,
    skein_sessions::SendPolicy,
};

use crate::adapter::{ChannelAdapter, MessageSink};

pub struct TelegramAdapter {
    bot: Bot,
    policy: SendPolicy,
    sink: MessageSink,
    cancel: Mutex<Option<CancellationToken>>,
}

impl TelegramAdapter {
    pub fn new(bot_token: &str, policy: SendPolicy, sink: MessageSink) -> Self {
        Self {
            bot: Bot::new(bot_token),
            policy,
            sink,
            cancel: Mutex::new(None),
        }
    }
}

#[async_trait]
impl ChannelAdapter for TelegramAdapter {
    fn id(&self) -> &str {
        "telegram"
    }

    async fn start(&self, shutdown: CancellationToken) -> Result<()> {
        let me = self
            .bot
            .get_me()
            .await
            .map_err(|e| anyhow::anyhow!("telegram bot init: {e}"))?;
        let username = me.user.username.clone().unwrap_or_default();
        info!(username = %username, "telegram bot authorized");

        let cancel = shutdown.child_token();
        *self.cancel.lock().unwrap() = Some(cancel.clone());

        tokio::spawn(poll_updates(
            self.bot.clone(),
            username,
            self.policy.clone(),
            Arc::clone(&self.sink),
            cancel,
        ));
        info!("telegram polling started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if let Some(cancel) = self.cancel.lock().unwrap().take() {
            cancel.cancel();
        }
        info!("telegram bot stopped");
        Ok(())
    }

    async fn send(&self, msg: &OutboundMessage) -> Result<()> {
        outbound::send_text(&self.bot, msg).await
    }
}

/// Long-polling worker: fetch update batches and dispatch accepted
/// messages into the sink.
async fn poll_updates(
    bot: Bot,
    username: String,
    policy: SendPolicy,
    sink: MessageSink,
    cancel: CancellationToken,
) {
    let mut offset: i32 = 0;
    loop {
        let updates = tokio::select! {
            _ = cancel.cancelled() => return,
            r = async { bot.get_updates().offset(offset).timeout(30).await } => r,
        };

        match updates {
            Ok(batch) => {
                for update in batch {
                    offset = offset.max(update.id + 1);
                    if let UpdateKind::Message(message) = update.kind {
                        dispatch(&message, &username, &policy, &sink).await;
                    }
                }
            },
            Err(e) => {
                warn!(err = %e, "telegram poll error");
                tokio::time::sleep(std::time::Duration::from_secs(3)).await;
            },
        }
    }
}

async fn dispatch(
    message: &teloxide::types::Message,
    username: &str,
    policy: &SendPolicy,
    sink: &MessageSink,
) {
    let Some(ctx) = inbound::extract_context(message, username) else {
        return;
    };
    if !inbound::check_access(&ctx, policy) {
        debug!(user = ctx.user_id, chat = ctx.chat_id, "telegram access denied");
        return;
    }
    if let Err(e) = sink(inbound::to_inbound(ctx)).await {
        error!(err = %e, "telegram message sink error");
    }
}
