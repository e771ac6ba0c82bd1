//! Local publish endpoint
//!
//! `/ws` hands out snapshot subscriptions; `/health` and `/metrics` serve
//! operators.

use std::sync::Arc;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::Response,
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info};

use crate::error::{Result, WatcherError};
use crate::publisher::Payload;
use crate::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind the configured address and serve until shutdown
pub async fn serve(state: Arc<AppState>, shutdown: watch::Receiver<bool>) -> Result<()> {
    let addr = state.config.listen_addr.clone();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| WatcherError::EndpointError(format!("Failed to listen on {}: {}", addr, e)))?;
    serve_listener(listener, state, shutdown).await
}

/// Serve on an already bound listener
pub async fn serve_listener(
    listener: TcpListener,
    state: Arc<AppState>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    info!(addr = ?listener.local_addr().ok(), "WebSocket server started");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await?;

    Ok(())
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Payload>(state.config.subscriber_queue_capacity.max(1));
    let id = state.registry.add(tx).await;

    // Ends when the registry drops our queue or the socket stops accepting writes
    let mut writer = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if let Err(e) = sink.send(Message::Text(payload.to_string())).await {
                debug!(subscriber = id, error = %e, "Error sending WebSocket message");
                break;
            }
        }
        let _ = sink.close().await;
    });

    // Subscribers never send data; reading only detects the peer going away
    let mut reader = tokio::spawn(async move {
        while let Some(msg) = stream.next().await {
            match msg {
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    state.registry.remove(id).await;
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "component": "trade-watcher",
        "symbol": state.config.symbol,
        "subscribers": state.registry.len().await,
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn metrics(State(state): State<Arc<AppState>>) -> std::result::Result<String, (StatusCode, String)> {
    state
        .metrics
        .render()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}
