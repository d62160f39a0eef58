use std::{
    collections::HashMap,
    sync::{Arc, Mutex, RwLock},
    time::{Duration, Instant},
};

use {serde::{Deserialize, Serialize}, tokio_util::sync::CancellationToken, tracing::debug};

/// Speaker of a history turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single turn in a session's conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: Role,
    pub content: String,
}

struct EntryState {
    touched_at: Instant,
    history: Vec<HistoryMessage>,
}

/// One active session. History and the access timestamp are guarded by the
/// entry's own mutex; readers get copies.
pub struct SessionEntry {
    pub key: String,
    pub agent_id: String,
    pub created_at: Instant,
    state: Mutex<EntryState>,
}

impl SessionEntry {
    fn new(key: String, agent_id: String) -> Self {
        let now = Instant::now();
        Self {
            key,
            agent_id,
            created_at: now,
            state: Mutex::new(EntryState {
                touched_at: now,
                history: Vec::new(),
            }),
        }
    }

    /// Update the last-access timestamp.
    pub fn touch(&self) {
        self.state.lock().unwrap().touched_at = Instant::now();
    }

    pub fn touched_at(&self) -> Instant {
        self.state.lock().unwrap().touched_at
    }

    /// Append a message, dropping the oldest entries to keep the history
    /// within `max_history` (0 disables the bound).
    pub fn append(&self, msg: HistoryMessage, max_history: usize) {
        let mut state = self.state.lock().unwrap();
        state.history.push(msg);
        if max_history > 0 && state.history.len() > max_history {
            let excess = state.history.len() - max_history;
            state.history.drain(..excess);
        }
        state.touched_at = Instant::now();
    }

    /// Independent copy of the conversation history.
    pub fn history(&self) -> Vec<HistoryMessage> {
        self.state.lock().unwrap().history.clone()
    }

    pub fn history_len(&self) -> usize {
        self.state.lock().unwrap().history.len()
    }
}

/// In-memory session store with TTL eviction.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<SessionEntry>>>,
    ttl: Duration,
    max_history: usize,
}

impl SessionStore {
    pub fn new(ttl: Duration, max_history: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
            max_history,
        }
    }

    /// Return the existing session (touching it) or create a new one.
    pub fn get_or_create(&self, key: &str, agent_id: &str) -> Arc<SessionEntry> {
        if let Some(entry) = self.get(key) {
            return entry;
        }
        let mut sessions = self.sessions.write().unwrap();
        // Re-check under the write lock.
        if let Some(entry) = sessions.get(key) {
            entry.touch();
            return Arc::clone(entry);
        }
        let entry = Arc::new(SessionEntry::new(key.to_string(), agent_id.to_string()));
        sessions.insert(key.to_string(), Arc::clone(&entry));
        debug!(key, agent = agent_id, "session created");
        entry
    }

    /// Return a session if it exists, touching it.
    pub fn get(&self, key: &str) -> Option<Arc<SessionEntry>> {
        let sessions = self.sessions.read().unwrap();
        let entry = sessions.get(key)?;
        entry.touch();
        Some(Arc::clone(entry))
    }

    /// Snapshot of all live entries.
    pub fn list(&self) -> Vec<Arc<SessionEntry>> {
        self.sessions.read().unwrap().values().cloned().collect()
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    /// Spawn the periodic eviction task. Stops when `shutdown` is cancelled.
    pub fn start_sweeper(self: &Arc<Self>, interval: Duration, shutdown: CancellationToken) {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = ticker.tick() => store.sweep(),
                }
            }
        });
    }

    fn sweep(&self) {
        let cutoff = Instant::now() - self.ttl;
        let mut sessions = self.sessions.write().unwrap();
        sessions.retain(|key, entry| {
            let live = entry.touched_at() >= cutoff;
            if !live {
                debug!(key = %key, "session expired");
            }
            live
        });
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.sessions.read().unwrap().len()
    }
}
