//! Preview dispatch loop.
//!
//! Single consumer per session: drains the preview queue in detection order
//! and forwards each file's bytes to the client as a preview frame.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::session::commands::ServerMessage;
use crate::session::{send_frame, OutboundTx};

/// Delay between detecting a preview file and reading it, letting the
/// backend's write settle. Best effort; there is no write-complete signal.
pub const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Drain the preview queue, forwarding each file to the client.
///
/// Runs until cancelled or the channel closes. A file that cannot be read is
/// logged and skipped; the loop continues. Cancellation exits immediately --
/// pending paths are dropped, not delivered.
pub async fn forward_previews(
    mut events: mpsc::UnboundedReceiver<PathBuf>,
    outbound: OutboundTx,
    cancel: CancellationToken,
) {
    loop {
        let path = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("Preview dispatch loop cancelled");
                return;
            }
            next = events.recv() => match next {
                Some(path) => path,
                None => return,
            },
        };

        tokio::time::sleep(SETTLE_DELAY).await;

        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                tracing::debug!(path = %path.display(), size = bytes.len(), "Forwarding preview");
                send_frame(&outbound, &ServerMessage::preview(bytes));
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read preview file");
            }
        }
    }
}
