//! WebSocket client for the local ComfyUI instance.
//!
//! [`ComfyUIClient`] holds the connection configuration. Each generation
//! opens a fresh [`ComfyUIConnection`] so that progress and preview frames
//! are scoped to that job's client ID.

use tokio_tungstenite::{connect_async, MaybeTlsStream};

/// Connection settings for the ComfyUI instance the bridge talks to.
pub struct ComfyUIClient {
    ws_url: String,
    api_url: String,
}

/// A live WebSocket connection to ComfyUI.
pub struct ComfyUIConnection {
    /// Client ID sent during the handshake; ComfyUI addresses execution
    /// messages and binary preview frames to it.
    pub client_id: String,
    /// The raw WebSocket stream for reading execution frames.
    pub ws_stream: tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
}

impl ComfyUIClient {
    /// Create a new client.
    ///
    /// * `ws_url`  - WebSocket base URL, e.g. `ws://127.0.0.1:8888`.
    /// * `api_url` - HTTP base URL, e.g. `http://127.0.0.1:8888`.
    pub fn new(ws_url: String, api_url: String) -> Self {
        Self { ws_url, api_url }
    }

    /// WebSocket base URL.
    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// HTTP API base URL.
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Connect to the ComfyUI WebSocket endpoint with a fresh client ID.
    pub async fn connect(&self) -> Result<ComfyUIConnection, ComfyUIClientError> {
        let client_id = uuid::Uuid::new_v4().to_string();
        let url = format!("{}/ws?clientId={}", self.ws_url, client_id);

        let (ws_stream, _response) = connect_async(&url).await.map_err(|e| {
            ComfyUIClientError::Connection(format!(
                "Failed to connect to ComfyUI at {}: {e}",
                self.ws_url
            ))
        })?;

        tracing::debug!(client_id = %client_id, "Connected to ComfyUI at {}", self.ws_url);

        Ok(ComfyUIConnection {
            client_id,
            ws_stream,
        })
    }
}

/// Errors from the WebSocket client.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIClientError {
    /// Failed to establish the WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),
}
