//! ComfyUI client library for the brushlink bridge.
//!
//! Provides the HTTP API wrapper, WebSocket connection handling, typed
//! execution-message parsing, workflow patching, and the image-to-image
//! runner that drives a single generation from upload to collected outputs.

pub mod api;
pub mod client;
pub mod messages;
pub mod runner;
pub mod workflow;
