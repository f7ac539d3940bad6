//! Command execution for one session.
//!
//! Each inbound frame is dispatched as its own task; the generate path runs
//! the full backend invocation inside that task so neither the connection's
//! read loop nor the preview dispatch loop ever waits on it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use brushlink_comfyui::runner::{self, GenerationRequest};
use brushlink_core::{prompt, status};

use crate::session::commands::{Command, GenerateRequest, ServerMessage};
use crate::session::watcher::{lock_state, SharedWatcherState};
use crate::session::{send_frame, OutboundTx};
use crate::state::AppState;

/// Everything a dispatched command needs; cheap to clone per frame.
#[derive(Clone)]
pub struct SessionContext {
    pub state: AppState,
    pub outbound: OutboundTx,
    pub watcher_state: SharedWatcherState,
    /// Admission control: at most one active job per session.
    pub job_active: Arc<AtomicBool>,
}

impl SessionContext {
    pub fn new(state: AppState, outbound: OutboundTx, watcher_state: SharedWatcherState) -> Self {
        Self {
            state,
            outbound,
            watcher_state,
            job_active: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// Dispatch one inbound text frame.
///
/// Malformed frames are logged and dropped without a reply. Everything else
/// produces exactly one status frame.
pub async fn dispatch(ctx: SessionContext, text: String) {
    let command = match Command::decode(&text) {
        Ok(command) => command,
        Err(e) => {
            tracing::warn!(error = %e, "Dropping malformed frame");
            return;
        }
    };

    match command {
        Command::Generate(request) => handle_generate(&ctx, request).await,
        Command::Cancel => handle_cancel(&ctx),
        Command::Unknown(raw) => {
            tracing::warn!(command = %raw, "Unknown command");
            send_frame(&ctx.outbound, &ServerMessage::error("Unknown command"));
        }
    }
}

/// Run the generate path behind the session's busy flag.
async fn handle_generate(ctx: &SessionContext, request: GenerateRequest) {
    if ctx.job_active.swap(true, Ordering::AcqRel) {
        send_frame(
            &ctx.outbound,
            &ServerMessage::error("Generation already in progress"),
        );
        return;
    }

    let reply = run_generate(ctx, request).await;
    ctx.job_active.store(false, Ordering::Release);

    send_frame(&ctx.outbound, &reply);
}

/// Execute one generation; always yields exactly one terminal frame.
async fn run_generate(ctx: &SessionContext, request: GenerateRequest) -> ServerMessage {
    let config = &ctx.state.config;

    tracing::info!(
        input = %request.input_path.display(),
        workflow = %request.workflow_path.display(),
        source = request.source.as_str(),
        "Starting generation",
    );

    // A stale skip left by a previous job must not eat this job's first
    // preview.
    lock_state(&ctx.watcher_state).clear_suppression();

    let payload = match prompt::load_prompt(&config.plugin_data_dir).await {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load prompt payload");
            return ServerMessage::error(format!("Failed to load prompt payload: {e}"));
        }
    };

    if !tokio::fs::try_exists(&request.input_path)
        .await
        .unwrap_or(false)
    {
        return ServerMessage::error("Input image not found");
    }

    if let Err(e) = tokio::fs::create_dir_all(&config.output_dir).await {
        tracing::error!(error = %e, "Failed to create output directory");
        return ServerMessage::error(format!("Failed to create output directory: {e}"));
    }

    let generation = GenerationRequest {
        workflow_path: request.workflow_path,
        input_image: request.input_path,
        source: request.source,
        prompt: payload,
    };

    let result = runner::run_image_to_image(
        &ctx.state.client,
        &ctx.state.api,
        &generation,
        &config.output_dir,
        Some(&config.preview_dir),
    )
    .await;

    match result {
        Ok(images) => {
            // The backend's trailing write after completion duplicates the
            // last preview; skip exactly one upcoming event.
            lock_state(&ctx.watcher_state).arm_suppression();

            let record = status::CompletionRecord {
                gen_completed: true,
            };
            if let Err(e) = status::write_completion(&config.plugin_data_dir, record).await {
                tracing::error!(error = %e, "Failed to persist completion record");
            }

            tracing::info!(count = images.len(), "Generation completed");
            ServerMessage::success(images)
        }
        Err(e) => {
            tracing::error!(error = %e, "Generation failed");
            ServerMessage::error(e.to_string())
        }
    }
}

/// Fire-and-forget interrupt, then an unconditional `cancelled` reply.
///
/// Advisory only: the backend may finish its current node first, and the
/// in-flight runner call is not aborted here.
fn handle_cancel(ctx: &SessionContext) {
    let api = Arc::clone(&ctx.state.api);
    tokio::spawn(async move {
        if let Err(e) = api.interrupt().await {
            tracing::warn!(error = %e, "Interrupt request failed");
        }
    });

    send_frame(&ctx.outbound, &ServerMessage::cancelled());
}
