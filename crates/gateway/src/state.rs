use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, RwLock},
    time::Instant,
};

use {tokio::sync::mpsc, tokio_util::sync::CancellationToken, tracing::warn};

use crate::{auth::Authenticator, chat::DeltaCoalescer, services::ChatService};

/// Capacity of each client's outbound frame buffer.
pub const OUTBOUND_BUFFER: usize = 256;

/// A WebSocket client currently connected to the gateway.
pub struct ConnectedClient {
    pub client_id: String,
    sender: mpsc::Sender<String>,
    subscriptions: HashSet<String>,
    pub connected_at: Instant,
}

impl ConnectedClient {
    pub fn new(client_id: String, sender: mpsc::Sender<String>) -> Self {
        Self {
            client_id,
            sender,
            subscriptions: HashSet::new(),
            connected_at: Instant::now(),
        }
    }

    /// Non-blocking enqueue to the client's write loop. When the buffer is
    /// full the frame is dropped for this client only.
    pub fn send(&self, frame: &str) -> bool {
        match self.sender.try_send(frame.to_string()) {
            Ok(()) => true,
            Err(_) => {
                warn!(client = %self.client_id, "client send buffer full, dropping message");
                false
            },
        }
    }

    /// Idempotent subscription to a session's events.
    pub fn subscribe(&mut self, session_id: &str) {
        self.subscriptions.insert(session_id.to_string());
    }

    pub fn is_subscribed(&self, session_id: &str) -> bool {
        self.subscriptions.contains(session_id)
    }
}

/// Monotonically increasing run sequence per session. The first run of a
/// session gets 1.
#[derive(Default)]
pub struct RunCounter {
    seqs: Mutex<HashMap<String, u64>>,
}

impl RunCounter {
    pub fn next(&self, session_id: &str) -> u64 {
        let mut seqs = self.seqs.lock().unwrap();
        let seq = seqs.entry(session_id.to_string()).or_insert(0);
        *seq += 1;
        *seq
    }

    pub fn current(&self, session_id: &str) -> u64 {
        *self.seqs.lock().unwrap().get(session_id).unwrap_or(&0)
    }
}

/// Shared gateway runtime state, wrapped in Arc for use across tasks.
pub struct GatewayState {
    /// All connected clients, keyed by client id.
    pub(crate) clients: RwLock<HashMap<String, ConnectedClient>>,
    pub auth: Authenticator,
    run_seqs: RunCounter,
    pub(crate) coalescer: DeltaCoalescer,
    /// Late-bound message pipeline (set after construction; the dispatcher
    /// needs the state to exist first).
    chat: RwLock<Option<Arc<dyn ChatService>>>,
    /// Cancellation token of each session's in-flight run.
    active_runs: Mutex<HashMap<String, CancellationToken>>,
}

impl GatewayState {
    pub fn new(auth: Authenticator) -> Arc<Self> {
        Arc::new(Self {
            clients: RwLock::new(HashMap::new()),
            auth,
            run_seqs: RunCounter::default(),
            coalescer: DeltaCoalescer::new(),
            chat: RwLock::new(None),
            active_runs: Mutex::new(HashMap::new()),
        })
    }

    // ── Clients ──────────────────────────────────────────────────────────

    pub fn register_client(&self, client: ConnectedClient) {
        let id = client.client_id.clone();
        self.clients.write().unwrap().insert(id, client);
    }

    pub fn remove_client(&self, client_id: &str) -> Option<ConnectedClient> {
        self.clients.write().unwrap().remove(client_id)
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().unwrap().len()
    }

    pub fn subscribe_client(&self, client_id: &str, session_id: &str) {
        if let Some(client) = self.clients.write().unwrap().get_mut(client_id) {
            client.subscribe(session_id);
        }
    }

    // ── Chat pipeline ────────────────────────────────────────────────────

    pub fn set_chat(&self, chat: Arc<dyn ChatService>) {
        *self.chat.write().unwrap() = Some(chat);
    }

    pub fn chat(&self) -> Option<Arc<dyn ChatService>> {
        self.chat.read().unwrap().clone()
    }

    // ── Run sequencing & cancellation ────────────────────────────────────

    pub fn next_run_seq(&self, session_id: &str) -> u64 {
        self.run_seqs.next(session_id)
    }

    pub fn current_run_seq(&self, session_id: &str) -> u64 {
        self.run_seqs.current(session_id)
    }

    pub fn register_run(&self, session_id: &str, cancel: CancellationToken) {
        self.active_runs
            .lock()
            .unwrap()
            .insert(session_id.to_string(), cancel);
    }

    pub fn clear_run(&self, session_id: &str) {
        self.active_runs.lock().unwrap().remove(session_id);
    }

    /// Cancel the in-flight run for a session, if any.
    pub fn cancel_run(&self, session_id: &str) -> bool {
        match self.active_runs.lock().unwrap().get(session_id) {
            Some(token) => {
                token.cancel();
                true
            },
            None => false,
        }
    }
}
