//! The brushlink bridge server.
//!
//! One axum application exposing the plugin-facing WebSocket session
//! endpoint, the single-shot `/submit` path, and a health check. The session
//! machinery lives in [`session`]; integration tests exercise it through
//! this library without a running server.

pub mod error;
pub mod health;
pub mod session;
pub mod state;
pub mod submit;
