use {serde::Serialize, tracing::error};

use skein_protocol::EventFrame;

use crate::state::GatewayState;

/// Serialize once and send to every connected client.
pub fn broadcast_all(state: &GatewayState, event: &EventFrame) {
    let Some(data) = encode(event) else { return };
    let clients = state.clients.read().unwrap();
    for client in clients.values() {
        client.send(&data);
    }
}

/// Serialize once and send to each client subscribed to the session.
pub fn broadcast_session(state: &GatewayState, session_id: &str, event: &EventFrame) {
    let Some(data) = encode(event) else { return };
    let clients = state.clients.read().unwrap();
    for client in clients.values() {
        if client.is_subscribed(session_id) {
            client.send(&data);
        }
    }
}

/// Targeted delivery to a single client.
pub fn broadcast_client(state: &GatewayState, client_id: &str, event: &EventFrame) {
    let Some(data) = encode(event) else { return };
    let clients = state.clients.read().unwrap();
    if let Some(client) = clients.get(client_id) {
        client.send(&data);
    }
}

/// Send any serializable frame (e.g. a response) to one client.
pub fn send_frame(state: &GatewayState, client_id: &str, frame: &impl Serialize) {
    let Some(data) = encode(frame) else { return };
    let clients = state.clients.read().unwrap();
    if let Some(client) = clients.get(client_id) {
        client.send(&data);
    }
}

fn encode(frame: &impl Serialize) -> Option<String> {
    match serde_json::to_string(frame) {
        Ok(data) => Some(data),
        Err(e) => {
            error!(err = %e, "broadcast marshal error");
            None
        },
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use skein_protocol::events;

    use super::*;
    use crate::{auth::Authenticator, state::ConnectedClient};

    fn client(state: &GatewayState, id: &str, sessions: &[&str]) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(16);
        let mut c = ConnectedClient::new(id.into(), tx);
        for s in sessions {
            c.subscribe(s);
        }
        state.register_client(c);
        rx
    }

    #[tokio::test]
    async fn session_broadcast_reaches_only_subscribers() {
        let state = GatewayState::new(Authenticator::new(""));
        let mut sub = client(&state, "sub", &["s1"]);
        let mut other = client(&state, "other", &["s2"]);

        broadcast_session(&state, "s1", &EventFrame::run(events::RUN_START, "s1", 1));

        let frame = sub.try_recv().unwrap();
        assert!(frame.contains("run.start"));
        assert!(other.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcast_all_reaches_everyone() {
        let state = GatewayState::new(Authenticator::new(""));
        let mut a = client(&state, "a", &[]);
        let mut b = client(&state, "b", &[]);

        broadcast_all(&state, &EventFrame::new(events::CONNECTED));
        assert!(a.try_recv().is_ok());
        assert!(b.try_recv().is_ok());
    }

    #[tokio::test]
    async fn targeted_broadcast() {
        let state = GatewayState::new(Authenticator::new(""));
        let mut a = client(&state, "a", &[]);
        let mut b = client(&state, "b", &[]);

        broadcast_client(&state, "a", &EventFrame::new(events::CONNECTED));
        assert!(a.try_recv().is_ok());
        assert!(b.try_recv().is_err());
    }
}
