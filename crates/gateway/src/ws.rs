use std::{sync::Arc, time::Duration};

use {
    axum::extract::ws::{Message, WebSocket},
    futures::{SinkExt, StreamExt},
    serde::Deserialize,
    serde_json::json,
    tokio::sync::mpsc,
    tracing::{debug, error, info},
    uuid::Uuid,
};

use skein_protocol::{codes, events, methods, EventFrame, InboundMessage, RequestFrame, ResponseFrame};

use crate::{
    broadcast::{broadcast_client, send_frame},
    state::{ConnectedClient, GatewayState, OUTBOUND_BUFFER},
};

/// Maximum accepted request frame size.
pub const READ_LIMIT: usize = 1 << 20; // 1 MiB
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Drive one WebSocket connection: register the client, run the writer
/// worker, and dispatch request frames until disconnect. Either worker
/// exiting unregisters the client.
pub async fn handle_connection(socket: WebSocket, state: Arc<GatewayState>) {
    let client_id = Uuid::new_v4().to_string();
    let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);
    state.register_client(ConnectedClient::new(client_id.clone(), tx));
    info!(client = %client_id, "client connected");

    broadcast_client(
        &state,
        &client_id,
        &EventFrame::new(events::CONNECTED).with_data(json!({ "client_id": client_id })),
    );

    let (mut sender, mut receiver) = socket.split();

    let writer_client = client_id.clone();
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            match tokio::time::timeout(WRITE_TIMEOUT, sender.send(Message::Text(frame.into())))
                .await
            {
                Ok(Ok(())) => {},
                Ok(Err(e)) => {
                    debug!(client = %writer_client, err = %e, "client write error");
                    return;
                },
                Err(_) => {
                    debug!(client = %writer_client, "client write timeout");
                    return;
                },
            }
        }
    });

    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => dispatch_frame(&state, &client_id, text.as_str()).await,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {},
        }
    }

    // Dropping the registered client drops its sender, which ends the
    // writer once the buffer drains.
    state.remove_client(&client_id);
    drop(writer);
    info!(client = %client_id, "client disconnected");
}

async fn dispatch_frame(state: &Arc<GatewayState>, client_id: &str, raw: &str) {
    let req: RequestFrame = match serde_json::from_str(raw) {
        Ok(r) => r,
        Err(_) => {
            send_frame(
                state,
                client_id,
                &ResponseFrame::err("", codes::BAD_REQUEST, "invalid request frame"),
            );
            return;
        },
    };

    match req.method.as_str() {
        methods::PING => send_frame(
            state,
            client_id,
            &ResponseFrame::ok(&req.id, json!({ "pong": "ok" })),
        ),
        methods::CHAT_SEND => handle_chat_send(state, client_id, req).await,
        methods::CHAT_CANCEL => handle_chat_cancel(state, client_id, req),
        methods::SESSION_LIST => match state.chat() {
            Some(chat) => send_frame(
                state,
                client_id,
                &ResponseFrame::ok(&req.id, chat.list_sessions()),
            ),
            None => send_frame(
                state,
                client_id,
                &ResponseFrame::err(&req.id, codes::INTERNAL, "pipeline not ready"),
            ),
        },
        methods::SESSION_GET => handle_session_get(state, client_id, req),
        other => send_frame(
            state,
            client_id,
            &ResponseFrame::err(&req.id, codes::NOT_FOUND, format!("unknown method: {other}")),
        ),
    }
}

#[derive(Deserialize)]
struct ChatSendParams {
    #[serde(default)]
    session_id: String,
    text: String,
    #[serde(default)]
    agent_id: String,
}

async fn handle_chat_send(state: &Arc<GatewayState>, client_id: &str, req: RequestFrame) {
    let params: ChatSendParams = match serde_json::from_value(req.params) {
        Ok(p) => p,
        Err(_) => {
            send_frame(
                state,
                client_id,
                &ResponseFrame::err(&req.id, codes::BAD_REQUEST, "invalid chat.send params"),
            );
            return;
        },
    };

    state.subscribe_client(client_id, &params.session_id);

    // ACK first; admission failures surface only in server logs.
    send_frame(
        state,
        client_id,
        &ResponseFrame::ok(&req.id, json!({ "status": "queued" })),
    );

    let msg = InboundMessage {
        session_id: params.session_id,
        channel: "websocket".into(),
        peer_kind: "user".into(),
        peer_id: client_id.to_string(),
        text: params.text,
        agent_id: params.agent_id,
        ..Default::default()
    };

    let Some(chat) = state.chat() else {
        error!("chat.send received before pipeline was bound");
        return;
    };
    tokio::spawn(async move {
        if let Err(e) = chat.process(msg).await {
            error!(err = %e, "chat.send handler error");
        }
    });
}

#[derive(Deserialize)]
struct SessionParams {
    session_id: String,
}

fn handle_chat_cancel(state: &Arc<GatewayState>, client_id: &str, req: RequestFrame) {
    let params: SessionParams = match serde_json::from_value(req.params) {
        Ok(p) => p,
        Err(_) => {
            send_frame(
                state,
                client_id,
                &ResponseFrame::err(&req.id, codes::BAD_REQUEST, "invalid chat.cancel params"),
            );
            return;
        },
    };
    let cancelled = state.cancel_run(&params.session_id);
    send_frame(
        state,
        client_id,
        &ResponseFrame::ok(&req.id, json!({ "cancelled": cancelled })),
    );
}

fn handle_session_get(state: &Arc<GatewayState>, client_id: &str, req: RequestFrame) {
    let params: SessionParams = match serde_json::from_value(req.params) {
        Ok(p) => p,
        Err(_) => {
            send_frame(
                state,
                client_id,
                &ResponseFrame::err(&req.id, codes::BAD_REQUEST, "invalid session.get params"),
            );
            return;
        },
    };
    let Some(chat) = state.chat() else {
        send_frame(
            state,
            client_id,
            &ResponseFrame::err(&req.id, codes::INTERNAL, "pipeline not ready"),
        );
        return;
    };
    match chat.get_session(&params.session_id) {
        Some(session) => send_frame(state, client_id, &ResponseFrame::ok(&req.id, session)),
        None => send_frame(
            state,
            client_id,
            &ResponseFrame::err(&req.id, codes::NOT_FOUND, "session not found"),
        ),
    }
}
