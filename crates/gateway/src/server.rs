use std::{collections::HashMap, sync::Arc};

use {
    axum::{
        extract::{Query, State, WebSocketUpgrade},
        http::{header, HeaderMap, StatusCode},
        response::{IntoResponse, Json, Response},
        routing::get,
        Router,
    },
    tokio_util::sync::CancellationToken,
    tower_http::cors::{Any, CorsLayer},
    tracing::info,
};

use crate::{state::GatewayState, ws};

/// Build the gateway router (shared between production startup and tests).
pub fn build_gateway_app(state: Arc<GatewayState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_upgrade_handler))
        .layer(cors)
        .with_state(state)
}

/// Serve HTTP + WebSocket until `shutdown` is cancelled.
pub async fn start_server(
    state: Arc<GatewayState>,
    host: &str,
    port: u16,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "gateway listening");

    let app = build_gateway_app(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    State(state): State<Arc<GatewayState>>,
) -> Response {
    let query_token = params.get("token").map(String::as_str);
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    if !state.auth.check(query_token, authorization) {
        return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    }

    ws.max_message_size(ws::READ_LIMIT)
        .on_upgrade(move |socket| ws::handle_connection(socket, state))
        .into_response()
}
