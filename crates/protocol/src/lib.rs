//! Wire protocol shared by every boundary: WebSocket frames, normalized
//! inbound/outbound messages, and the method/event name constants.

pub mod frame;
pub mod messages;

pub use frame::{ErrorDetail, EventFrame, RequestFrame, ResponseFrame};
pub use messages::{InboundMessage, OutboundMessage, TextFormat};

/// Client → server request methods.
pub mod methods {
    pub const PING: &str = "ping";
    pub const CHAT_SEND: &str = "chat.send";
    pub const CHAT_CANCEL: &str = "chat.cancel";
    pub const SESSION_LIST: &str = "session.list";
    pub const SESSION_GET: &str = "session.get";
}

/// Server → client event names.
pub mod events {
    pub const CONNECTED: &str = "connected";
    pub const CHAT_DELTA: &str = "chat.delta";
    pub const CHAT_TOOL_USE: &str = "chat.tool_use";
    pub const CHAT_TOOL_DONE: &str = "chat.tool_done";
    pub const CHAT_COMPLETE: &str = "chat.complete";
    pub const CHAT_ERROR: &str = "chat.error";
    pub const RUN_START: &str = "run.start";
    pub const RUN_END: &str = "run.end";
}

/// Error codes carried in [`ErrorDetail`].
pub mod codes {
    pub const BAD_REQUEST: u16 = 400;
    pub const NOT_FOUND: u16 = 404;
    pub const INTERNAL: u16 = 500;
}
