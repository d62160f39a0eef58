use {
    anyhow::Result,
    teloxide::{prelude::*, types::{ChatId, ParseMode}},
    tracing::warn,
};

use skein_protocol::{OutboundMessage, TextFormat};

/// Telegram rejects messages beyond 4096 chars; stay under with headroom.
const MAX_CHUNK: usize = 4000;

/// Send text to a chat, chunking long content and retrying HTML parse
/// failures as plain text.
pub(crate) async fn send_text(bot: &Bot, msg: &OutboundMessage) -> Result<()> {
    let chat_id: i64 = msg
        .peer_id
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid telegram chat id: {}", msg.peer_id))?;
    let thread_id: Option<i32> = if msg.thread_id.is_empty() {
        None
    } else {
        msg.thread_id.parse().ok()
    };

    let text = match msg.format {
        TextFormat::Markdown => escape_html(&msg.text),
        _ => msg.text.clone(),
    };

    for chunk in chunk_text(&text, MAX_CHUNK) {
        let mut req = bot
            .send_message(ChatId(chat_id), chunk.clone())
            .parse_mode(ParseMode::Html);
        if let Some(tid) = thread_id {
            req = req.message_thread_id(tid);
        }

        if let Err(e) = req.await {
            warn!(err = %e, "telegram html send failed, retrying plain");
            let mut plain = bot.send_message(ChatId(chat_id), chunk);
            if let Some(tid) = thread_id {
                plain = plain.message_thread_id(tid);
            }
            plain
                .await
                .map_err(|e| anyhow::anyhow!("telegram send: {e}"))?;
        }
    }
    Ok(())
}

/// Escape HTML entities so model output cannot break Telegram's HTML mode.
pub(crate) fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Split text into chunks of at most `max_size` bytes, preferring newline
/// boundaries and never splitting inside a character.
pub(crate) fn chunk_text(text: &str, max_size: usize) -> Vec<String> {
    if text.len() <= max_size {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        if rest.len() <= max_size {
            chunks.push(rest.to_string());
            break;
        }
        let mut cut = max_size;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        if let Some(idx) = rest[..cut].rfind('\n') {
            if idx > 0 {
                cut = idx + 1;
            }
        }
        chunks.push(rest[..cut].to_string());
        rest = &rest[cut..];
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(chunk_text("hello", 4000), vec!["hello"]);
    }

    #[test]
    fn splits_at_newlines_when_possible() {
        let text = format!("{}\n{}", "a".repeat(30), "b".repeat(30));
        let chunks = chunk_text(&text, 40);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], format!("{}\n", "a".repeat(30)));
        assert_eq!(chunks[1], "b".repeat(30));
    }

    #[test]
    fn hard_split_without_newlines() {
        let text = "x".repeat(100);
        let chunks = chunk_text(&text, 40);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn never_splits_inside_a_char() {
        let text = "é".repeat(50); // 100 bytes
        let chunks = chunk_text(&text, 33);
        assert_eq!(chunks.concat(), text);
        for chunk in chunks {
            assert!(chunk.len() <= 33);
        }
    }

    #[test]
    fn escapes_html_entities() {
        assert_eq!(
            escape_html("a < b && c > d"),
            "a &lt; b &amp;&amp; c &gt; d"
        );
    }
}
