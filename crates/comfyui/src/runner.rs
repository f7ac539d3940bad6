//! Image-to-image job runner.
//!
//! Drives one generation to completion: upload the source image, patch the
//! workflow, submit it, follow the execution over WebSocket, then collect
//! the output images from history. Intermediate previews arrive as binary
//! WebSocket frames and are written into the preview directory -- a disk
//! side channel delivered to the plugin by the bridge's watcher, not by
//! this runner.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use serde::Serialize;
use tokio_tungstenite::tungstenite::Message;

use brushlink_core::prompt::PromptPayload;

use crate::api::{ComfyUIApi, ComfyUIApiError, ImageFolder};
use crate::client::{ComfyUIClient, ComfyUIClientError, ComfyUIConnection};
use crate::messages::{parse_message, ComfyUIMessage};
use crate::workflow::{self, WorkflowError};

/// Preview frames are written under this name so each frame overwrites the
/// last and the watcher sees a steady stream of modify events.
const PREVIEW_BASENAME: &str = "comfyui_preview";

/// One generated output image, in the order ComfyUI produced it.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedImage {
    pub filename: String,
    /// Raw image bytes; serialized as a JSON byte array for the plugin.
    pub image_data: Vec<u8>,
}

/// Parameters for one image-to-image invocation.
#[derive(Debug)]
pub struct GenerationRequest {
    pub workflow_path: PathBuf,
    pub input_image: PathBuf,
    /// ComfyUI folder the input image is uploaded into.
    pub source: ImageFolder,
    pub prompt: PromptPayload,
}

/// Errors from one generation run.
///
/// Every failure surfaces here; nothing in the runner panics or tears down
/// the caller's connection handling.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Connect(#[from] ComfyUIClientError),

    #[error(transparent)]
    Api(#[from] ComfyUIApiError),

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("ComfyUI connection closed before the job finished")]
    ConnectionClosed,

    #[error("Failed to write output image {path}: {source}")]
    OutputWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Run one image-to-image generation to completion.
///
/// Blocks (asynchronously) for the full duration of the backend execution,
/// which can be seconds to minutes. Callers own the decision to run this off
/// their message-handling path.
pub async fn run_image_to_image(
    client: &ComfyUIClient,
    api: &ComfyUIApi,
    request: &GenerationRequest,
    output_dir: &Path,
    preview_dir: Option<&Path>,
) -> Result<Vec<GeneratedImage>, GenerationError> {
    let mut wf = workflow::load_workflow(&request.workflow_path).await?;

    // Connect before submitting so no execution frame is missed.
    let conn = client.connect().await?;

    let uploaded = api.upload_image(&request.input_image, request.source).await?;
    workflow::apply_input_image(&mut wf, &uploaded.name)?;
    workflow::apply_prompts(&mut wf, &request.prompt.positive, &request.prompt.negative)?;
    workflow::apply_sampler_overrides(&mut wf, &request.prompt);

    let submit = api.submit_workflow(&wf, &conn.client_id).await?;
    tracing::info!(
        prompt_id = %submit.prompt_id,
        queue_position = submit.number,
        "Workflow queued",
    );

    track_execution(conn, &submit.prompt_id, preview_dir).await?;

    let history = api.get_history(&submit.prompt_id).await?;
    let refs = collect_output_images(&history, &submit.prompt_id);
    tracing::info!(prompt_id = %submit.prompt_id, count = refs.len(), "Execution finished");

    let mut images = Vec::with_capacity(refs.len());
    for output in &refs {
        let bytes = api
            .fetch_view(&output.filename, &output.subfolder, &output.folder_type)
            .await?;

        let dest = output_dir.join(&output.filename);
        tokio::fs::write(&dest, &bytes)
            .await
            .map_err(|e| GenerationError::OutputWrite {
                path: dest.display().to_string(),
                source: e,
            })?;

        images.push(GeneratedImage {
            filename: output.filename.clone(),
            image_data: bytes,
        });
    }

    Ok(images)
}

/// Follow a submitted prompt on the WebSocket until it completes or fails.
///
/// Binary frames are ComfyUI preview images; when a preview directory is
/// given they are decoded and written there for the watcher to pick up.
async fn track_execution(
    mut conn: ComfyUIConnection,
    prompt_id: &str,
    preview_dir: Option<&Path>,
) -> Result<(), GenerationError> {
    while let Some(frame) = conn.ws_stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match parse_message(&text) {
                Ok(ComfyUIMessage::Executing(data)) => {
                    if data.finishes(prompt_id) {
                        return Ok(());
                    }
                    if let Some(node) = &data.node {
                        tracing::debug!(prompt_id = %data.prompt_id, node = %node, "Executing node");
                    }
                }
                Ok(ComfyUIMessage::Progress(data)) => {
                    tracing::debug!(value = data.value, max = data.max, "Generation progress");
                }
                Ok(ComfyUIMessage::ExecutionError(data)) if data.prompt_id == prompt_id => {
                    tracing::error!(
                        prompt_id = %data.prompt_id,
                        node_id = %data.node_id,
                        error_type = %data.exception_type,
                        "Execution error",
                    );
                    return Err(GenerationError::Execution(data.exception_message));
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(error = %e, "Unrecognized ComfyUI frame");
                }
            },
            Ok(Message::Binary(bytes)) => {
                if let Some(dir) = preview_dir {
                    if let Err(e) = save_preview_frame(dir, &bytes).await {
                        tracing::warn!(error = %e, "Failed to write preview frame");
                    }
                }
            }
            Ok(Message::Close(frame)) => {
                tracing::warn!(?frame, "ComfyUI closed the connection mid-job");
                return Err(GenerationError::ConnectionClosed);
            }
            Ok(_) => {}
            Err(e) => {
                return Err(GenerationError::Execution(format!(
                    "WebSocket receive error: {e}"
                )));
            }
        }
    }

    Err(GenerationError::ConnectionClosed)
}

/// One output image reference from execution history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputImageRef {
    pub filename: String,
    pub subfolder: String,
    pub folder_type: String,
}

/// Collect the output image references for a prompt from its history entry.
///
/// History is shaped `{<prompt_id>: {outputs: {<node_id>: {images: [...]}}}}`.
/// Temp-folder entries are the backend's own previews and are skipped.
pub fn collect_output_images(history: &serde_json::Value, prompt_id: &str) -> Vec<OutputImageRef> {
    let mut refs = Vec::new();

    let Some(outputs) = history
        .get(prompt_id)
        .and_then(|entry| entry.get("outputs"))
        .and_then(|outputs| outputs.as_object())
    else {
        return refs;
    };

    for node_output in outputs.values() {
        let Some(images) = node_output.get("images").and_then(|i| i.as_array()) else {
            continue;
        };
        for image in images {
            let Some(filename) = image.get("filename").and_then(|f| f.as_str()) else {
                continue;
            };
            let folder_type = image
                .get("type")
                .and_then(|t| t.as_str())
                .unwrap_or("output");
            if folder_type == "temp" {
                continue;
            }
            refs.push(OutputImageRef {
                filename: filename.to_string(),
                subfolder: image
                    .get("subfolder")
                    .and_then(|s| s.as_str())
                    .unwrap_or_default()
                    .to_string(),
                folder_type: folder_type.to_string(),
            });
        }
    }

    refs
}

// Binary preview frame layout: a 4-byte big-endian event type (1 = preview
// image) followed by a 4-byte image format (1 = JPEG, 2 = PNG), then the
// image bytes.
const PREVIEW_EVENT: u32 = 1;
const FORMAT_JPEG: u32 = 1;
const FORMAT_PNG: u32 = 2;

/// Split a binary frame into its image extension and payload.
///
/// Returns `None` for frames that are not preview images.
fn decode_preview_frame(bytes: &[u8]) -> Option<(&'static str, &[u8])> {
    if bytes.len() < 8 {
        return None;
    }
    let event = u32::from_be_bytes(bytes[0..4].try_into().ok()?);
    if event != PREVIEW_EVENT {
        return None;
    }
    let format = u32::from_be_bytes(bytes[4..8].try_into().ok()?);
    let ext = match format {
        FORMAT_JPEG => "jpg",
        FORMAT_PNG => "png",
        _ => return None,
    };
    Some((ext, &bytes[8..]))
}

/// Write one preview frame into the preview directory.
async fn save_preview_frame(dir: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let Some((ext, payload)) = decode_preview_frame(bytes) else {
        return Ok(());
    };
    let path = dir.join(format!("{PREVIEW_BASENAME}.{ext}"));
    tokio::fs::write(path, payload).await
}
