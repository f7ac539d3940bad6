use std::path::PathBuf;

/// File name of the prompt payload inside the plugin data directory.
pub const PROMPT_FILE: &str = "prompt.json";

/// File name of the completion record inside the plugin data directory.
pub const STATUS_FILE: &str = "status.json";

/// Bridge configuration loaded from environment variables.
///
/// All fields have defaults suitable for a local plugin installation. Every
/// component receives this by injection; there are no compiled-in paths or
/// addresses anywhere else in the workspace.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Bind address (default: `127.0.0.1` -- the channel is loopback-only).
    pub host: String,
    /// Bind port (default: `6789`).
    pub port: u16,
    /// Directory the plugin stages its prompt payload, status file, and
    /// temp images into.
    pub plugin_data_dir: PathBuf,
    /// Directory final generated images are saved into.
    pub output_dir: PathBuf,
    /// Directory ComfyUI preview frames land in; watched per session.
    pub preview_dir: PathBuf,
    /// Workflow used by the single-shot `/submit` path, which carries no
    /// workflow reference of its own.
    pub default_workflow: PathBuf,
    /// ComfyUI HTTP API base URL.
    pub comfyui_api_url: String,
    /// ComfyUI WebSocket base URL.
    pub comfyui_ws_url: String,
    /// Allowed CORS origins for the plugin webview, parsed from the
    /// comma-separated `CORS_ORIGINS` env var. Empty means permissive.
    pub cors_origins: Vec<String>,
}

impl BridgeConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var            | Default                          |
    /// |--------------------|----------------------------------|
    /// | `HOST`             | `127.0.0.1`                      |
    /// | `PORT`             | `6789`                           |
    /// | `PLUGIN_DATA_DIR`  | `./plugin_data`                  |
    /// | `OUTPUT_DIR`       | `./output`                       |
    /// | `PREVIEW_DIR`      | `./previews`                     |
    /// | `DEFAULT_WORKFLOW` | `./workflows/image_to_image.json`|
    /// | `COMFYUI_API_URL`  | `http://127.0.0.1:8888`          |
    /// | `COMFYUI_WS_URL`   | `ws://127.0.0.1:8888`            |
    /// | `CORS_ORIGINS`     | (empty)                          |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "6789".into())
            .parse()
            .expect("PORT must be a valid u16");

        let plugin_data_dir =
            PathBuf::from(std::env::var("PLUGIN_DATA_DIR").unwrap_or_else(|_| "./plugin_data".into()));

        let output_dir =
            PathBuf::from(std::env::var("OUTPUT_DIR").unwrap_or_else(|_| "./output".into()));

        let preview_dir =
            PathBuf::from(std::env::var("PREVIEW_DIR").unwrap_or_else(|_| "./previews".into()));

        let default_workflow = PathBuf::from(
            std::env::var("DEFAULT_WORKFLOW")
                .unwrap_or_else(|_| "./workflows/image_to_image.json".into()),
        );

        let comfyui_api_url =
            std::env::var("COMFYUI_API_URL").unwrap_or_else(|_| "http://127.0.0.1:8888".into());

        let comfyui_ws_url =
            std::env::var("COMFYUI_WS_URL").unwrap_or_else(|_| "ws://127.0.0.1:8888".into());

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            host,
            port,
            plugin_data_dir,
            output_dir,
            preview_dir,
            default_workflow,
            comfyui_api_url,
            comfyui_ws_url,
            cors_origins,
        }
    }

    /// Full path of the prompt payload file.
    pub fn prompt_path(&self) -> PathBuf {
        self.plugin_data_dir.join(PROMPT_FILE)
    }

    /// Full path of the completion record file.
    pub fn status_path(&self) -> PathBuf {
        self.plugin_data_dir.join(STATUS_FILE)
    }
}
