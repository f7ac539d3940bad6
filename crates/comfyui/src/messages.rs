//! Typed parsing of the ComfyUI execution WebSocket frames.
//!
//! ComfyUI sends JSON text frames shaped `{"type": "<kind>", "data": {...}}`
//! while a prompt executes. The runner only needs the subset that signals
//! progress, completion, and failure; everything else parses but is ignored.

use serde::Deserialize;

/// Execution messages the runner consumes.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ComfyUIMessage {
    /// Queue status broadcast.
    #[serde(rename = "status")]
    Status(StatusData),

    /// A prompt has started executing.
    #[serde(rename = "execution_start")]
    ExecutionStart(ExecutionStartData),

    /// Some nodes were served from cache.
    #[serde(rename = "execution_cached")]
    ExecutionCached(ExecutionCachedData),

    /// A node is executing; `node: null` means the prompt finished.
    #[serde(rename = "executing")]
    Executing(ExecutingData),

    /// Step progress inside a long-running node.
    #[serde(rename = "progress")]
    Progress(ProgressData),

    /// A node finished and produced output.
    #[serde(rename = "executed")]
    Executed(ExecutedData),

    /// Execution failed.
    #[serde(rename = "execution_error")]
    ExecutionError(ExecutionErrorData),
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusData {
    pub status: QueueStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueStatus {
    pub exec_info: QueueInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueInfo {
    pub queue_remaining: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionStartData {
    pub prompt_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionCachedData {
    pub prompt_id: String,
    #[serde(default)]
    pub nodes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutingData {
    pub node: Option<String>,
    pub prompt_id: String,
}

impl ExecutingData {
    /// Whether this frame marks the end of the given prompt's execution.
    pub fn finishes(&self, prompt_id: &str) -> bool {
        self.node.is_none() && self.prompt_id == prompt_id
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProgressData {
    /// Current step.
    pub value: i32,
    /// Total steps.
    pub max: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutedData {
    pub node: String,
    /// Raw node output (image references, etc.).
    pub output: serde_json::Value,
    pub prompt_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionErrorData {
    pub prompt_id: String,
    pub node_id: String,
    pub exception_message: String,
    pub exception_type: String,
}

/// Parse one text frame.
///
/// Unknown `type` values and malformed JSON are errors; callers log and
/// keep reading.
pub fn parse_message(text: &str) -> Result<ComfyUIMessage, serde_json::Error> {
    serde_json::from_str(text)
}
