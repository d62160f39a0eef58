use teloxide::types::{Message, MessageEntityKind};

use {skein_protocol::InboundMessage, skein_sessions::SendPolicy};

/// Routing information extracted from one Telegram message.
pub(crate) struct MessageContext {
    pub chat_id: i64,
    pub thread_id: Option<i32>,
    pub user_id: i64,
    pub text: String,
    pub peer_kind: &'static str,
    pub peer_id: String,
    pub guild_id: String,
    pub is_mention: bool,
}

/// Pull text and peer identity out of an update. Returns None for messages
/// without usable text.
pub(crate) fn extract_context(msg: &Message, bot_username: &str) -> Option<MessageContext> {
    let raw = msg.text().or_else(|| msg.caption())?;
    if raw.is_empty() {
        return None;
    }

    let user_id = msg.from().map(|u| u.id.0 as i64).unwrap_or(0);
    let chat_id = msg.chat.id.0;

    let (peer_kind, peer_id, guild_id) = if msg.chat.is_private() {
        ("user", user_id.to_string(), String::new())
    } else {
        ("group", chat_id.to_string(), chat_id.to_string())
    };

    let (text, mut is_mention) = strip_mention(raw, bot_username);

    // Mentions can also arrive as typed entities over the raw text.
    if !is_mention && !bot_username.is_empty() {
        if let Some(entities) = msg.entities() {
            let handle = format!("@{bot_username}");
            for entity in entities {
                if entity.kind == MessageEntityKind::Mention {
                    if let Some(mentioned) = raw.get(entity.offset..entity.offset + entity.length) {
                        if mentioned.eq_ignore_ascii_case(&handle) {
                            is_mention = true;
                        }
                    }
                }
            }
        }
    }

    Some(MessageContext {
        chat_id,
        thread_id: msg.thread_id,
        user_id,
        text,
        peer_kind,
        peer_id,
        guild_id,
        is_mention,
    })
}

/// Remove the bot handle from the text; reports whether it was present.
pub(crate) fn strip_mention(text: &str, bot_username: &str) -> (String, bool) {
    if bot_username.is_empty() {
        return (text.to_string(), false);
    }
    let handle = format!("@{bot_username}");
    if text.contains(&handle) {
        (text.replace(&handle, "").trim().to_string(), true)
    } else {
        (text.to_string(), false)
    }
}

/// Apply the transport access policy.
pub(crate) fn check_access(ctx: &MessageContext, policy: &SendPolicy) -> bool {
    if ctx.peer_kind == "user" {
        return policy.allow_dm(ctx.user_id);
    }
    if !policy.allow_group(ctx.chat_id) {
        return false;
    }
    if policy.requires_mention() && !ctx.is_mention {
        return false;
    }
    true
}

pub(crate) fn to_inbound(ctx: MessageContext) -> InboundMessage {
    InboundMessage {
        channel: "telegram".into(),
        peer_kind: ctx.peer_kind.into(),
        peer_id: ctx.peer_id,
        guild_id: ctx.guild_id,
        thread_id: ctx.thread_id.map(|t| t.to_string()).unwrap_or_default(),
        text: ctx.text,
        ..Default::default()
    }
}
