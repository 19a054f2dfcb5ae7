use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use mosaic_types::api::StreamFrame;

use crate::routes::AppState;

/// GET /ws: Live transfer events.
pub async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

/// Send a snapshot of the registry, then relay every published event.
///
/// The subscription is taken before the snapshot so nothing published in
/// between is lost; a client may see an event already reflected in the
/// snapshot.
async fn handle_connection(socket: WebSocket, state: AppState) {
    let conn_id = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();
    let mut events = state.events.subscribe();

    info!(%conn_id, "Event stream client connected");

    let snapshot = StreamFrame::Snapshot {
        artifacts: state.registry.list_artifacts().await,
        sessions: state.registry.list_sessions().await,
    };
    if !send_json(&mut sender, &snapshot).await {
        return;
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if !send_json(&mut sender, &event).await {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(%conn_id, skipped, "Event stream client lagging, events dropped");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // Nothing to handle from clients; pings are answered by axum
                Some(Ok(_)) => {}
            },
        }
    }

    info!(%conn_id, "Event stream client disconnected");
}

async fn send_json<S, T>(sender: &mut S, value: &T) -> bool
where
    S: SinkExt<Message> + Unpin,
    T: serde::Serialize,
{
    let text = match serde_json::to_string(value) {
        Ok(text) => text,
        Err(e) => {
            debug!("Failed to encode stream frame: {}", e);
            return true;
        }
    };
    sender.send(Message::Text(text.into())).await.is_ok()
}
