use skein_llm::{ContentBlock, Message, Role};
use skein_sessions::{HistoryMessage, Role as SessionRole};

/// Convert session history into LLM messages and append the new user turn.
pub fn build_messages(history: &[HistoryMessage], user_text: &str) -> Vec<Message> {
    let mut messages: Vec<Message> = history
        .iter()
        .map(|h| Message {
            role: match h.role {
                SessionRole::User => Role::User,
                SessionRole::Assistant => Role::Assistant,
            },
            content: vec![ContentBlock::text(&h.content)],
        })
        .collect();

    messages.push(Message::user(vec![ContentBlock::text(user_text)]));
    messages
}
