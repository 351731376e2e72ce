//! Browser-facing push channel: WebSocket bar stream plus the static page.
//!
//! Closed bars arrive on a broadcast channel; every `/ws` upgrade gets its
//! own subscriber task, so a slow browser only lags itself: it skips bars
//! instead of stalling the emitter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::GatewayStats;
use crate::models::Bar;

#[derive(Default)]
pub struct PushStats {
    pub clients_connected: AtomicU64,
    pub clients_total: AtomicU64,
    pub bars_sent: AtomicU64,
    pub bars_skipped: AtomicU64,
}

impl PushStats {
    pub fn snapshot(&self) -> PushStatsSnapshot {
        PushStatsSnapshot {
            clients_connected: self.clients_connected.load(Ordering::Relaxed),
            clients_total: self.clients_total.load(Ordering::Relaxed),
            bars_sent: self.bars_sent.load(Ordering::Relaxed),
            bars_skipped: self.bars_skipped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PushStatsSnapshot {
    pub clients_connected: u64,
    pub clients_total: u64,
    pub bars_sent: u64,
    pub bars_skipped: u64,
}

#[derive(Clone)]
pub struct PushState {
    pub bar_tx: broadcast::Sender<Bar>,
    pub page_path: Arc<String>,
    pub stats: Arc<GatewayStats>,
}

pub fn router(state: PushState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .route("/stats", get(stats))
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn stats(State(state): State<PushState>) -> Json<super::GatewayStatsSnapshot> {
    Json(state.stats.snapshot())
}

/// The page is read per request so it can be edited without a restart.
async fn index(State(state): State<PushState>) -> Response {
    match tokio::fs::read_to_string(state.page_path.as_str()).await {
        Ok(body) => Html(body).into_response(),
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<PushState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: PushState) {
    let push = &state.stats.push;
    push.clients_connected.fetch_add(1, Ordering::Relaxed);
    push.clients_total.fetch_add(1, Ordering::Relaxed);
    info!(
        clients = push.clients_connected.load(Ordering::Relaxed),
        "push subscriber connected"
    );

    let mut rx = state.bar_tx.subscribe();
    loop {
        tokio::select! {
            bar = rx.recv() => match bar {
                Ok(bar) => {
                    let msg = serde_json::to_string(&bar).unwrap_or_else(|_| "{}".to_string());
                    if socket.send(Message::Text(msg)).await.is_err() {
                        break;
                    }
                    push.bars_sent.fetch_add(1, Ordering::Relaxed);
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    push.bars_skipped.fetch_add(n, Ordering::Relaxed);
                    debug!(skipped = n, "push subscriber lagging, bars skipped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            msg = socket.recv() => match msg {
                Some(Ok(Message::Close(_))) | None => break,
                // Inbound frames carry nothing this side cares about.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(error = %e, "push socket error");
                    break;
                }
            },
        }
    }

    push.clients_connected.fetch_sub(1, Ordering::Relaxed);
    debug!("push subscriber disconnected");
}
