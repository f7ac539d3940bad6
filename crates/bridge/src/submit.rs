//! Single-shot submission endpoint.
//!
//! The plugin's fallback path: no session, no live previews. Reads the
//! prompt payload and the staged input image from the plugin data directory,
//! runs one generation with the default workflow, records completion, and
//! answers over plain HTTP.

use axum::extract::State;
use axum::{routing::post, Json, Router};
use serde_json::{json, Value};

use brushlink_comfyui::api::ImageFolder;
use brushlink_comfyui::runner::{self, GenerationRequest};
use brushlink_core::{prompt, status};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Image file the plugin stages before calling `/submit`.
const STAGED_INPUT: &str = "temp_image_rgb.png";

/// Mount the submission route.
pub fn router() -> Router<AppState> {
    Router::new().route("/submit", post(submit))
}

/// POST /submit -- run one generation from staged plugin data.
async fn submit(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let config = &state.config;

    let payload = prompt::load_prompt(&config.plugin_data_dir).await?;

    let input_image = config.plugin_data_dir.join(STAGED_INPUT);
    if !tokio::fs::try_exists(&input_image).await.unwrap_or(false) {
        return Err(AppError::BadRequest(format!(
            "Input image ({STAGED_INPUT}) not found"
        )));
    }

    tokio::fs::create_dir_all(&config.output_dir)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to create output directory: {e}")))?;

    let request = GenerationRequest {
        workflow_path: config.default_workflow.clone(),
        input_image,
        source: ImageFolder::Input,
        prompt: payload,
    };

    let images = runner::run_image_to_image(
        &state.client,
        &state.api,
        &request,
        &config.output_dir,
        None,
    )
    .await?;

    let record = status::CompletionRecord {
        gen_completed: true,
    };
    if let Err(e) = status::write_completion(&config.plugin_data_dir, record).await {
        tracing::error!(error = %e, "Failed to persist completion record");
    }

    tracing::info!(count = images.len(), "Single-shot generation completed");

    Ok(Json(json!({
        "message": "Image generation submitted successfully. Check the output directory for results."
    })))
}
