//! WebSocket session lifecycle.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::session::job::{dispatch, SessionContext};
use crate::session::preview::forward_previews;
use crate::session::watcher::{PreviewWatcher, SharedWatcherState};
use crate::state::AppState;

/// HTTP handler that upgrades the connection to WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Run one session over an upgraded socket.
///
/// Splits the socket, then:
///   1. Spawns the outbound forwarder (channel -> sink).
///   2. Starts the preview watcher and the preview dispatch loop.
///   3. Reads inbound frames, dispatching each text frame as its own task so
///      generation latency never stalls the read loop.
///   4. Tears everything down when the connection drops.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, "Plugin connected");

    let (mut sink, mut stream) = socket.split();

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
    let (preview_tx, preview_rx) = mpsc::unbounded_channel();

    // Outbound forwarder: drain the channel into the socket sink.
    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
        }
    });

    // Preview watcher: OS thread -> preview channel. A watch failure leaves
    // the session functional without previews.
    let watcher = match PreviewWatcher::start(&state.config.preview_dir, preview_tx) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            tracing::error!(conn_id = %conn_id, error = %e, "Failed to start preview watcher");
            None
        }
    };
    let watcher_state: SharedWatcherState = watcher
        .as_ref()
        .map(PreviewWatcher::state)
        .unwrap_or_default();

    // Preview dispatch loop: preview channel -> client, in detection order.
    let preview_cancel = CancellationToken::new();
    let preview_task = tokio::spawn(forward_previews(
        preview_rx,
        outbound_tx.clone(),
        preview_cancel.clone(),
    ));

    let ctx = SessionContext::new(state, outbound_tx, watcher_state);

    // Read loop: one dispatched task per inbound text frame.
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                tokio::spawn(dispatch(ctx.clone(), text.to_string()));
            }
            Ok(Message::Close(_)) => break,
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            Ok(_) => {
                tracing::trace!(conn_id = %conn_id, "Ignoring non-text frame");
            }
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    // Teardown: stop watching, cancel the dispatch loop (pending previews
    // are dropped, not delivered), stop the forwarder.
    drop(watcher);
    preview_cancel.cancel();
    let _ = preview_task.await;
    send_task.abort();

    tracing::info!(conn_id = %conn_id, "Plugin disconnected");
}
