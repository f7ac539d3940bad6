//! Per-connection session orchestration.
//!
//! Each WebSocket client gets one session: a read loop dispatching commands,
//! an outbound forwarder, a filesystem watcher on the preview directory, and
//! a dispatch loop that streams detected preview files back to the client in
//! detection order.

pub mod commands;
pub mod handler;
pub mod job;
pub mod preview;
pub mod watcher;

use axum::extract::ws::Message;
use tokio::sync::mpsc;

use self::commands::ServerMessage;

/// Sender half of a session's outbound message channel.
pub type OutboundTx = mpsc::UnboundedSender<Message>;

/// Encode a status frame and queue it for the client.
///
/// A closed channel means the session is tearing down; the frame is silently
/// dropped, matching the forwarder's own exit path.
pub fn send_frame(outbound: &OutboundTx, frame: &ServerMessage) {
    match serde_json::to_string(frame) {
        Ok(text) => {
            let _ = outbound.send(Message::Text(text.into()));
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode outbound frame");
        }
    }
}
