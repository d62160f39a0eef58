//! Gateway: WebSocket/HTTP server, client registry, broadcast fabric, and
//! the unified dispatch pipeline.
//!
//! Lifecycle:
//! 1. Build [`state::GatewayState`] from resolved auth
//! 2. Wire the agent event sink ([`chat::agent_event_sink`])
//! 3. Bind the late-bound [`services::ChatService`] (the dispatcher)
//! 4. Serve `/ws` and `/health`
//!
//! Domain logic (agents, sessions, channels) lives in other crates and is
//! reached through the dispatcher.

pub mod auth;
pub mod broadcast;
pub mod chat;
pub mod dispatch;
pub mod server;
pub mod services;
pub mod state;
pub mod ws;
