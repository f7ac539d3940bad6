//! The completion record polled by the plugin after each generation.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::STATUS_FILE;
use crate::error::CoreError;

/// Persisted completion flag.
///
/// Overwritten whole on every write; it reflects only the most recent job,
/// not job identity. Last writer wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRecord {
    #[serde(rename = "genCompleted")]
    pub gen_completed: bool,
}

/// Write the completion record to `<plugin_data_dir>/status.json`.
pub async fn write_completion(
    plugin_data_dir: &Path,
    record: CompletionRecord,
) -> Result<(), CoreError> {
    let path = plugin_data_dir.join(STATUS_FILE);
    let body = serde_json::to_vec(&record).map_err(|e| CoreError::json(&path, e))?;
    tokio::fs::write(&path, body)
        .await
        .map_err(|e| CoreError::io(&path, e))
}

/// Read the completion record back, if present.
pub async fn read_completion(plugin_data_dir: &Path) -> Result<CompletionRecord, CoreError> {
    let path = plugin_data_dir.join(STATUS_FILE);
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| CoreError::io(&path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| CoreError::json(&path, e))
}
