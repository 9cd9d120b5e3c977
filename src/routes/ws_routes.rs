use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::service::session::Session;
use crate::service::upload::UploadProgress;

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum UploadEvent<'a> {
    Progress(&'a UploadProgress),
}

/// GET `/ws/uploads`: upgrades to a WebSocket that streams upload progress.
pub async fn ws_uploads_handler(
    ws: WebSocketUpgrade,
    State(session): State<Session>,
) -> impl IntoResponse {
    let progress = session.subscribe_progress();
    ws.on_upgrade(move |socket| handle_socket(socket, progress))
}

/// Handles a single progress subscriber.
///
/// Protocol:
/// - Server sends `{ "type": "progress", ...snapshot }` on connect and after
///   every change. Bursts of changes may be coalesced into the latest one.
/// - Anything the client sends is ignored; a close frame ends the stream.
async fn handle_socket(socket: WebSocket, mut progress: watch::Receiver<UploadProgress>) {
    info!("Upload progress subscriber connected");
    let (mut sender, mut receiver) = socket.split();

    let initial = progress.borrow_and_update().clone();
    if send_event(&mut sender, &UploadEvent::Progress(&initial)).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            changed = progress.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = progress.borrow_and_update().clone();
                if send_event(&mut sender, &UploadEvent::Progress(&snapshot)).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    warn!("WebSocket receive error: {e}");
                    break;
                }
                Some(Ok(_)) => {}
            }
        }
    }

    info!("Upload progress subscriber disconnected");
}

/// Helper: serialize an `UploadEvent` and send it over the socket.
async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &UploadEvent<'_>,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(event).map_err(axum::Error::new)?;
    sender.send(Message::Text(json.into())).await
}
