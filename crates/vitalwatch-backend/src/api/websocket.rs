//! WebSocket relay of processed samples and alerts.
//!
//! Clients connect to `/ws/stream` and receive the same messages the
//! ingestion pipeline fans out on the broadcast channel, JSON-encoded
//! with a `type` tag (`sample` or `alert`).

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use super::state::AppState;

/// Upgrade handler for `/ws/stream`.
#[tracing::instrument(skip(state, ws))]
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| relay_stream(socket, state))
}

async fn relay_stream(mut socket: WebSocket, state: AppState) {
    let mut rx = state.subscribe();
    debug!(subscribers = state.subscriber_count(), "stream client connected");

    loop {
        tokio::select! {
            message = rx.recv() => match message {
                Ok(message) => {
                    let Ok(text) = serde_json::to_string(&message) else {
                        continue;
                    };
                    if socket.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "stream client lagging, messages dropped");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                // Inbound frames (pings, client chatter) are ignored;
                // closing the socket ends the relay.
                Some(Ok(_)) => {}
                _ => break,
            },
        }
    }

    debug!("stream client disconnected");
}
