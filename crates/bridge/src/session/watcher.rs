//! Preview directory watcher.
//!
//! The backend writes preview frames to disk as a side channel; it does not
//! speak the session protocol. The watcher turns those writes into queue
//! entries for the dispatch loop, gated by a debounce window and a one-shot
//! suppression flag.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

/// Minimum spacing between accepted events for one session, regardless of
/// path identity.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(100);

/// Debounce and suppression state for one session.
///
/// Shared between the watcher's OS thread and the session handler, which
/// clears suppression on each new generation and arms it after completion.
#[derive(Debug, Default)]
pub struct WatcherState {
    last_accepted: Option<Instant>,
    suppress_next: bool,
}

impl WatcherState {
    /// Gate one eligible filesystem event.
    ///
    /// An event inside the debounce window is discarded without touching the
    /// suppression flag. An event that clears the window advances the
    /// debounce timestamp; if the suppression flag is set, the flag is
    /// consumed and the event is discarded anyway -- a one-shot skip, not a
    /// durable mute.
    pub fn accept(&mut self, now: Instant) -> bool {
        if let Some(prev) = self.last_accepted {
            if now.duration_since(prev) < DEBOUNCE_WINDOW {
                return false;
            }
        }
        self.last_accepted = Some(now);

        if self.suppress_next {
            self.suppress_next = false;
            return false;
        }
        true
    }

    /// Arm the one-shot skip for the next accepted event.
    pub fn arm_suppression(&mut self) {
        self.suppress_next = true;
    }

    /// Drop any pending skip, re-enabling preview forwarding.
    pub fn clear_suppression(&mut self) {
        self.suppress_next = false;
    }

    pub fn is_suppressing(&self) -> bool {
        self.suppress_next
    }
}

/// Shared handle to a session's watcher state.
pub type SharedWatcherState = Arc<Mutex<WatcherState>>;

/// Lock the shared watcher state, recovering the guard if the mutex was
/// poisoned (state operations cannot panic mid-update).
pub fn lock_state(state: &SharedWatcherState) -> MutexGuard<'_, WatcherState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Watches the preview directory and feeds accepted image paths into the
/// session's preview channel.
///
/// The underlying notify watcher runs on its own OS thread; dropping this
/// struct stops it.
pub struct PreviewWatcher {
    _watcher: RecommendedWatcher,
    state: SharedWatcherState,
}

impl PreviewWatcher {
    /// Start watching `dir` (non-recursive).
    pub fn start(
        dir: &Path,
        events: mpsc::UnboundedSender<PathBuf>,
    ) -> Result<Self, notify::Error> {
        let state: SharedWatcherState = Arc::default();
        let callback_state = Arc::clone(&state);

        let mut watcher =
            notify::recommended_watcher(move |result: Result<Event, notify::Error>| {
                let event = match result {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::warn!(error = %e, "Preview watcher error");
                        return;
                    }
                };

                if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                    return;
                }

                for path in event.paths {
                    if !is_preview_image(&path) {
                        continue;
                    }
                    let accepted = lock_state(&callback_state).accept(Instant::now());
                    if accepted {
                        // Unbounded send; never blocks the watcher thread.
                        let _ = events.send(path);
                    }
                }
            })?;

        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        tracing::debug!(dir = %dir.display(), "Preview watcher started");

        Ok(Self {
            _watcher: watcher,
            state,
        })
    }

    /// The debounce/suppression state shared with the session handler.
    pub fn state(&self) -> SharedWatcherState {
        Arc::clone(&self.state)
    }
}

/// Only image writes count as preview events.
fn is_preview_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            let ext = ext.to_ascii_lowercase();
            matches!(ext.as_str(), "png" | "jpg" | "jpeg")
        })
}
