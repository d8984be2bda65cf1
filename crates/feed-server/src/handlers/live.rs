//! Live update socket
//!
//! Each WebSocket client joins the broadcaster on connect and receives every
//! post event as a JSON text frame until it disconnects. Client frames other
//! than close are ignored.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tracing::{info, warn};

use crate::broadcast::Subscription;
use crate::config::AppState;

/// GET /live
pub async fn live_updates(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let broadcaster = state.broadcaster.clone();
    ws.on_upgrade(move |socket| async move {
        info!("[Live] client connected");
        forward_events(socket, broadcaster.subscribe()).await;
        info!("[Live] client disconnected");
    })
}

async fn forward_events(socket: WebSocket, mut subscription: Subscription) {
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            event = subscription.recv() => {
                let Some(event) = event else { break };

                let text = match serde_json::to_string(&event) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("[Live] failed to encode {} event: {}", event.action(), e);
                        continue;
                    }
                };

                if sender.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}
