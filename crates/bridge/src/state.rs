use std::sync::Arc;

use brushlink_comfyui::api::ComfyUIApi;
use brushlink_comfyui::client::ComfyUIClient;
use brushlink_core::config::BridgeConfig;

/// Shared application state available to all handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Bridge configuration, built once in `main` and injected everywhere.
    pub config: Arc<BridgeConfig>,
    /// ComfyUI HTTP API client (submission, interrupt, history, images).
    pub api: Arc<ComfyUIApi>,
    /// ComfyUI WebSocket client; each job opens its own connection.
    pub client: Arc<ComfyUIClient>,
}

impl AppState {
    pub fn new(config: BridgeConfig) -> Self {
        let api = ComfyUIApi::new(config.comfyui_api_url.clone());
        let client = ComfyUIClient::new(
            config.comfyui_ws_url.clone(),
            config.comfyui_api_url.clone(),
        );
        Self {
            config: Arc::new(config),
            api: Arc::new(api),
            client: Arc::new(client),
        }
    }
}
