//! Session state: canonical session keys, the in-memory store with bounded
//! history and TTL eviction, and the transport send policy.

pub mod key;
pub mod policy;
pub mod store;

pub use key::{build_key, parse_key, ParsedKey};
pub use policy::{DmPolicy, GroupPolicy, SendPolicy};
pub use store::{HistoryMessage, Role, SessionEntry, SessionStore};
