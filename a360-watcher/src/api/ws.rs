//! WebSocket push channel
//!
//! Each client gets its own queue from the [`Broadcaster`]; every status event arrives as
//! one text frame holding the event JSON. Frames sent by clients are ignored.

use crate::broadcaster::Broadcaster;
use crate::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::debug;

/// GET / and GET /ws
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| client_session(socket, state.broadcaster))
}

async fn client_session(socket: WebSocket, broadcaster: Arc<Broadcaster>) {
    let (id, mut events) = broadcaster.register();

    let (mut sink, mut incoming) = socket.split();

    loop {
        tokio::select! {
            outgoing = events.recv() => {
                let Some(text) = outgoing else { break };
                if let Err(e) = sink.send(Message::Text(text)).await {
                    debug!(client_id = %id, error = %e, "Push client send failed");
                    break;
                }
            }
            frame = incoming.next() => match frame {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!(client_id = %id, error = %e, "Push client receive failed");
                    break;
                }
                Some(Ok(_)) => {}
            }
        }
    }

    broadcaster.unregister(&id);
}

pub fn ws_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
}
