//! REST client for the ComfyUI HTTP endpoints the bridge consumes:
//! workflow submission, interruption, image upload, history retrieval, and
//! output download.

use std::path::Path;

use serde::Deserialize;

/// ComfyUI image folder a file belongs to.
///
/// ComfyUI partitions its on-disk images into three folders; uploads and
/// `/view` downloads are addressed by folder plus filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageFolder {
    #[default]
    Input,
    Temp,
    Output,
}

impl ImageFolder {
    /// The wire name ComfyUI expects in `type` fields.
    pub fn as_str(self) -> &'static str {
        match self {
            ImageFolder::Input => "input",
            ImageFolder::Temp => "temp",
            ImageFolder::Output => "output",
        }
    }
}

/// HTTP client for a single ComfyUI instance.
pub struct ComfyUIApi {
    client: reqwest::Client,
    api_url: String,
}

/// Response from `POST /prompt` after successfully queuing a workflow.
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    /// Server-assigned identifier for the queued prompt.
    pub prompt_id: String,
    /// Position in the execution queue.
    pub number: i32,
}

/// Response from `POST /upload/image`.
#[derive(Debug, Deserialize)]
pub struct UploadResponse {
    /// Server-side file name, possibly renamed to avoid collisions.
    pub name: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(default, rename = "type")]
    pub folder_type: String,
}

/// Errors from the ComfyUI REST layer.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// ComfyUI returned a non-2xx status code.
    #[error("ComfyUI API error ({status}): {body}")]
    ApiError {
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The local file to upload could not be read.
    #[error("Upload source unreadable: {0}")]
    UploadSource(String),
}

impl ComfyUIApi {
    /// Create a new API client.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://127.0.0.1:8888`.
    pub fn new(api_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
        }
    }

    /// Submit a workflow for execution.
    ///
    /// Sends `POST /prompt` with the workflow JSON and the client ID of the
    /// WebSocket connection that will follow the execution.
    pub async fn submit_workflow(
        &self,
        workflow: &serde_json::Value,
        client_id: &str,
    ) -> Result<SubmitResponse, ComfyUIApiError> {
        let body = serde_json::json!({
            "prompt": workflow,
            "client_id": client_id,
        });

        let response = self
            .client
            .post(format!("{}/prompt", self.api_url))
            .json(&body)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Interrupt whatever is executing right now.
    ///
    /// Sends `POST /interrupt`. Advisory: this does not target a specific
    /// prompt and the server may finish the current node before stopping.
    pub async fn interrupt(&self) -> Result<(), ComfyUIApiError> {
        let response = self
            .client
            .post(format!("{}/interrupt", self.api_url))
            .send()
            .await?;

        Self::check_status(response).await
    }

    /// Upload a local image into one of ComfyUI's image folders.
    ///
    /// Sends `POST /upload/image` as multipart form data. The returned name
    /// is what workflow `LoadImage` nodes must reference (the server may
    /// rename on collision, hence `overwrite`).
    pub async fn upload_image(
        &self,
        path: &Path,
        folder: ImageFolder,
    ) -> Result<UploadResponse, ComfyUIApiError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ComfyUIApiError::UploadSource(format!("{}: {e}", path.display())))?;

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("input.png")
            .to_string();

        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
        let form = reqwest::multipart::Form::new()
            .part("image", part)
            .text("type", folder.as_str())
            .text("overwrite", "true");

        let response = self
            .client
            .post(format!("{}/upload/image", self.api_url))
            .multipart(form)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Retrieve execution history for a prompt.
    ///
    /// Sends `GET /history/{prompt_id}`. The returned JSON maps the prompt
    /// ID to its node outputs, including generated image references.
    pub async fn get_history(&self, prompt_id: &str) -> Result<serde_json::Value, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/history/{}", self.api_url, prompt_id))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Download one image by folder reference.
    ///
    /// Sends `GET /view?filename=..&subfolder=..&type=..` and returns the
    /// raw bytes.
    pub async fn fetch_view(
        &self,
        filename: &str,
        subfolder: &str,
        folder_type: &str,
    ) -> Result<Vec<u8>, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/view", self.api_url))
            .query(&[
                ("filename", filename),
                ("subfolder", subfolder),
                ("type", folder_type),
            ])
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code, or turn it into an
    /// [`ComfyUIApiError::ApiError`] carrying the status and body text.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ComfyUIApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ComfyUIApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ComfyUIApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    /// Assert a success status code, discarding the body.
    async fn check_status(response: reqwest::Response) -> Result<(), ComfyUIApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_folder_wire_names() {
        assert_eq!(ImageFolder::Input.as_str(), "input");
        assert_eq!(ImageFolder::Temp.as_str(), "temp");
        assert_eq!(ImageFolder::Output.as_str(), "output");
        assert_eq!(ImageFolder::default(), ImageFolder::Input);
    }

    #[test]
    fn upload_response_tolerates_missing_optional_fields() {
        let response: UploadResponse =
            serde_json::from_str(r#"{"name":"input_01.png"}"#).unwrap();
        assert_eq!(response.name, "input_01.png");
        assert_eq!(response.subfolder, "");
        assert_eq!(response.folder_type, "");
    }
}
