use std::{collections::HashMap, sync::{Arc, Mutex}, time::Duration};

use serde_json::json;

use {
    skein_agents::{AgentEventKind, EventSink},
    skein_protocol::{events, EventFrame},
};

use crate::{broadcast::broadcast_session, state::GatewayState};

/// Throttle window for streaming text deltas.
pub const FLUSH_INTERVAL: Duration = Duration::from_millis(150);

#[derive(Default)]
struct DeltaBuffer {
    text: String,
    run_seq: u64,
    armed: bool,
    /// Bumped on every timer arm so a stale timer cannot flush a newer
    /// window early.
    generation: u64,
}

/// Per-session accumulator that batches `delta` stream events into at most
/// one `chat.delta` broadcast per flush window. The coalescer is the only
/// source of `chat.delta` events.
#[derive(Default)]
pub struct DeltaCoalescer {
    buffers: Mutex<HashMap<String, DeltaBuffer>>,
}

impl DeltaCoalescer {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Append streaming text for a session and arm the flush timer if idle.
pub fn accumulate(state: &Arc<GatewayState>, session_id: &str, run_seq: u64, text: &str) {
    let armed_generation = {
        let mut buffers = state.coalescer.buffers.lock().unwrap();
        let buf = buffers.entry(session_id.to_string()).or_default();
        buf.text.push_str(text);
        buf.run_seq = run_seq;
        if buf.armed {
            None
        } else {
            buf.armed = true;
            buf.generation += 1;
            Some(buf.generation)
        }
    };

    if let Some(generation) = armed_generation {
        let state = Arc::clone(state);
        let session_id = session_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(FLUSH_INTERVAL).await;
            timer_fire(&state, &session_id, generation);
        });
    }
}

/// Immediately send any buffered delta for a session. Invoked at stream
/// completion before `chat.complete` goes out.
pub fn flush(state: &GatewayState, session_id: &str) {
    let pending = {
        let mut buffers = state.coalescer.buffers.lock().unwrap();
        match buffers.get_mut(session_id) {
            Some(buf) => {
                buf.armed = false;
                take_pending(buf)
            },
            None => None,
        }
    };
    emit(state, session_id, pending);
}

/// Unconditional reset of a session's buffer.
pub fn clear(state: &GatewayState, session_id: &str) {
    state.coalescer.buffers.lock().unwrap().remove(session_id);
}

fn timer_fire(state: &GatewayState, session_id: &str, generation: u64) {
    let pending = {
        let mut buffers = state.coalescer.buffers.lock().unwrap();
        match buffers.get_mut(session_id) {
            // Only the timer belonging to the current arm may flush.
            Some(buf) if buf.armed && buf.generation == generation => {
                buf.armed = false;
                take_pending(buf)
            },
            _ => None,
        }
    };
    emit(state, session_id, pending);
}

fn take_pending(buf: &mut DeltaBuffer) -> Option<(String, u64)> {
    if buf.text.is_empty() {
        return None;
    }
    Some((std::mem::take(&mut buf.text), buf.run_seq))
}

fn emit(state: &GatewayState, session_id: &str, pending: Option<(String, u64)>) {
    if let Some((text, run_seq)) = pending {
        broadcast_session(
            state,
            session_id,
            &EventFrame::run(events::CHAT_DELTA, session_id, run_seq)
                .with_data(json!({ "text": text })),
        );
    }
}

/// Build the sink that turns agent events into broadcast frames: deltas go
/// through the coalescer, tool and completion events broadcast directly.
pub fn agent_event_sink(state: Arc<GatewayState>) -> EventSink {
    Arc::new(move |event| {
        let session_id = event.session_id.as_str();
        let run_seq = event.run_seq;
        match &event.kind {
            AgentEventKind::Delta { text } => accumulate(&state, session_id, run_seq, text),
            AgentEventKind::ToolUse {
                tool_use_id,
                tool_name,
            } => broadcast_session(
                &state,
                session_id,
                &EventFrame::run(events::CHAT_TOOL_USE, session_id, run_seq).with_data(json!({
                    "tool_use_id": tool_use_id,
                    "tool_name": tool_name,
                })),
            ),
            AgentEventKind::ToolDone {
                tool_use_id,
                tool_name,
            } => broadcast_session(
                &state,
                session_id,
                &EventFrame::run(events::CHAT_TOOL_DONE, session_id, run_seq).with_data(json!({
                    "tool_use_id": tool_use_id,
                    "tool_name": tool_name,
                })),
            ),
            AgentEventKind::Complete { .. } => {
                flush(&state, session_id);
                broadcast_session(
                    &state,
                    session_id,
                    &EventFrame::run(events::CHAT_COMPLETE, session_id, run_seq),
                );
            },
            // Failures are surfaced once, via the run result.
            AgentEventKind::Error { .. } => {},
        }
    })
}
