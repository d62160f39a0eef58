use std::sync::Arc;

use {
    async_trait::async_trait,
    serde_json::{json, Value},
    tokio_util::sync::CancellationToken,
    tracing::warn,
};

use {
    skein_agents::Runtime,
    skein_channels::ChannelRegistry,
    skein_lanes::{LaneManager, Task},
    skein_protocol::{events, EventFrame, InboundMessage, OutboundMessage, TextFormat},
    skein_routing::{ResolveParams, Resolver},
    skein_sessions::{build_key, HistoryMessage, Role, SessionEntry, SessionStore},
};

use crate::{broadcast::broadcast_session, chat, services::ChatService, state::GatewayState};

/// The unified pipeline: route, derive the session, and enqueue the run on
/// the session's lane. Shared by the WebSocket endpoint and every channel
/// adapter.
pub struct Dispatcher {
    state: Arc<GatewayState>,
    router: Resolver,
    sessions: Arc<SessionStore>,
    lanes: Arc<LaneManager>,
    runtime: Arc<Runtime>,
    channels: Arc<ChannelRegistry>,
}

impl Dispatcher {
    pub fn new(
        state: Arc<GatewayState>,
        router: Resolver,
        sessions: Arc<SessionStore>,
        lanes: Arc<LaneManager>,
        runtime: Arc<Runtime>,
        channels: Arc<ChannelRegistry>,
    ) -> Arc<Self> {
        Arc::new(Self {
            state,
            router,
            sessions,
            lanes,
            runtime,
            channels,
        })
    }

    async fn process_message(&self, mut msg: InboundMessage) -> anyhow::Result<()> {
        if msg.agent_id.is_empty() {
            msg.agent_id = self.router.resolve(&ResolveParams {
                channel: msg.channel.clone(),
                peer_kind: msg.peer_kind.clone(),
                peer_id: msg.peer_id.clone(),
                guild_id: msg.guild_id.clone(),
                team_id: String::new(),
            });
        }

        let session_key = if msg.session_id.is_empty() {
            build_key(
                &msg.agent_id,
                &msg.channel,
                &msg.peer_kind,
                &msg.peer_id,
                &msg.guild_id,
                &msg.thread_id,
            )
        } else {
            msg.session_id.clone()
        };
        msg.session_id = session_key.clone();

        let entry = self.sessions.get_or_create(&session_key, &msg.agent_id);

        let state = Arc::clone(&self.state);
        let runtime = Arc::clone(&self.runtime);
        let channels = Arc::clone(&self.channels);
        let max_history = self.sessions.max_history();

        let admitted = self.lanes.enqueue(Task {
            session_id: session_key.clone(),
            run: Box::new(move |lane_cancel| {
                Box::pin(run_task(
                    state,
                    runtime,
                    channels,
                    entry,
                    msg,
                    lane_cancel,
                    max_history,
                ))
            }),
        });
        if !admitted {
            anyhow::bail!("queue full for session {session_key}");
        }
        Ok(())
    }
}

/// One end-to-end run, executed on the session's lane: allocate the run
/// sequence, stream the agent, persist the turns, and reply on the
/// originating channel.
async fn run_task(
    state: Arc<GatewayState>,
    runtime: Arc<Runtime>,
    channels: Arc<ChannelRegistry>,
    entry: Arc<SessionEntry>,
    msg: InboundMessage,
    lane_cancel: CancellationToken,
    max_history: usize,
) -> anyhow::Result<()> {
    let session_key = msg.session_id.clone();
    let run_seq = state.next_run_seq(&session_key);

    let run_cancel = lane_cancel.child_token();
    state.register_run(&session_key, run_cancel.clone());

    broadcast_session(
        &state,
        &session_key,
        &EventFrame::run(events::RUN_START, &session_key, run_seq),
    );

    let result = runtime
        .run(&run_cancel, &msg.agent_id, &entry, &msg.text, run_seq)
        .await;
    state.clear_run(&session_key);

    match result {
        Ok(run) => {
            entry.append(
                HistoryMessage {
                    role: Role::User,
                    content: msg.text.clone(),
                },
                max_history,
            );
            entry.append(
                HistoryMessage {
                    role: Role::Assistant,
                    content: run.text.clone(),
                },
                max_history,
            );

            broadcast_session(
                &state,
                &session_key,
                &EventFrame::run(events::RUN_END, &session_key, run_seq),
            );

            if msg.channel != "websocket" {
                let reply = OutboundMessage {
                    session_id: session_key.clone(),
                    channel: msg.channel.clone(),
                    peer_id: msg.peer_id.clone(),
                    thread_id: msg.thread_id.clone(),
                    text: run.text,
                    format: TextFormat::Markdown,
                };
                // The reply is lost on persistent failure; the run is not
                // retried.
                if let Err(e) = channels.send(&reply).await {
                    warn!(channel = %msg.channel, err = %e, "outbound send failed");
                }
            }
            Ok(())
        },
        Err(e) => {
            // Failed runs leave no history and terminate their event stream
            // with chat.error followed by run.end.
            chat::clear(&state, &session_key);
            broadcast_session(
                &state,
                &session_key,
                &EventFrame::run(events::CHAT_ERROR, &session_key, run_seq)
                    .with_data(json!({ "error": e.to_string() })),
            );
            broadcast_session(
                &state,
                &session_key,
                &EventFrame::run(events::RUN_END, &session_key, run_seq),
            );
            Err(e.into())
        },
    }
}

#[async_trait]
impl ChatService for Dispatcher {
    async fn process(&self, msg: InboundMessage) -> anyhow::Result<()> {
        self.process_message(msg).await
    }

    fn list_sessions(&self) -> Value {
        let sessions: Vec<Value> = self
            .sessions
            .list()
            .iter()
            .map(|e| {
                json!({
                    "key": e.key,
                    "agent_id": e.agent_id,
                    "history_len": e.history_len(),
                })
            })
            .collect();
        json!(sessions)
    }

    fn get_session(&self, key: &str) -> Option<Value> {
        self.sessions.get(key).map(|e| {
            json!({
                "key": e.key,
                "agent_id": e.agent_id,
                "history": e.history(),
            })
        })
    }
}
