//! The prompt payload the plugin UI writes before each generation.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::PROMPT_FILE;
use crate::error::CoreError;

/// Prompt payload from `<plugin_data_dir>/prompt.json`.
///
/// The sampler fields arrive as JSON strings or numbers depending on which
/// UI control produced them, so they are kept as raw values and coerced
/// where they are applied to a workflow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptPayload {
    #[serde(default)]
    pub positive: String,
    #[serde(default)]
    pub negative: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cfg: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub denoise: Option<serde_json::Value>,
}

/// Read the current prompt payload from the plugin data directory.
pub async fn load_prompt(plugin_data_dir: &Path) -> Result<PromptPayload, CoreError> {
    let path = plugin_data_dir.join(PROMPT_FILE);
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| CoreError::io(&path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| CoreError::json(&path, e))
}
