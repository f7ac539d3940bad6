//! Session command dispatch tests.
//!
//! These exercise the dispatch path with a stub environment and no live
//! ComfyUI: the configured backend addresses point at a port nothing listens
//! on, so backend-dependent paths fail fast at the connection boundary.

use std::path::Path;
use std::sync::atomic::Ordering;
use std::time::Duration;

use axum::extract::ws::Message;
use brushlink_bridge::session::job::{dispatch, SessionContext};
use brushlink_bridge::session::watcher::lock_state;
use brushlink_bridge::state::AppState;
use brushlink_core::config::BridgeConfig;
use tokio::sync::mpsc;
use tokio::time::timeout;

fn test_config(root: &Path) -> BridgeConfig {
    BridgeConfig {
        host: "127.0.0.1".into(),
        port: 0,
        plugin_data_dir: root.join("plugin_data"),
        output_dir: root.join("output"),
        preview_dir: root.join("previews"),
        default_workflow: root.join("workflow.json"),
        // Nothing listens on port 9; backend calls fail immediately.
        comfyui_api_url: "http://127.0.0.1:9".into(),
        comfyui_ws_url: "ws://127.0.0.1:9".into(),
        cors_origins: vec![],
    }
}

fn test_context(root: &Path) -> (SessionContext, mpsc::UnboundedReceiver<Message>) {
    let state = AppState::new(test_config(root));
    let (outbound, rx) = mpsc::unbounded_channel();
    let ctx = SessionContext::new(state, outbound, Default::default());
    (ctx, rx)
}

fn write_prompt(root: &Path) {
    let dir = root.join("plugin_data");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("prompt.json"),
        r#"{"positive":"a hill","negative":"blurry"}"#,
    )
    .unwrap();
}

fn frame_json(msg: Message) -> serde_json::Value {
    let Message::Text(text) = msg else {
        panic!("expected text frame, got: {msg:?}");
    };
    serde_json::from_str(text.as_str()).expect("frame must be valid JSON")
}

// ---------------------------------------------------------------------------
// Test: missing input image yields exactly one error frame, no job
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_input_image_yields_single_error_frame() {
    let dir = tempfile::tempdir().unwrap();
    write_prompt(dir.path());
    let (ctx, mut rx) = test_context(dir.path());

    dispatch(
        ctx.clone(),
        r#"{"command":"image_to_image","input_path":"/no/such/input.png","workflow_path":"/no/such/wf.json"}"#.into(),
    )
    .await;

    let json = frame_json(rx.recv().await.unwrap());
    assert_eq!(json["status"], "error");
    assert_eq!(json["message"], "Input image not found");
    assert!(rx.try_recv().is_err(), "exactly one frame expected");
    assert!(
        !ctx.job_active.load(Ordering::Acquire),
        "busy flag must be released"
    );
}

// ---------------------------------------------------------------------------
// Test: unknown command yields the fixed error frame
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_command_yields_error_frame() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, mut rx) = test_context(dir.path());

    dispatch(ctx, r#"{"command":"unknown_op"}"#.into()).await;

    let json = frame_json(rx.recv().await.unwrap());
    assert_eq!(json["status"], "error");
    assert_eq!(json["message"], "Unknown command");
}

// ---------------------------------------------------------------------------
// Test: malformed frames are dropped without a reply
// ---------------------------------------------------------------------------

#[tokio::test]
async fn malformed_frame_is_dropped_without_reply() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, mut rx) = test_context(dir.path());

    dispatch(ctx, "this is not json".into()).await;

    assert!(rx.try_recv().is_err(), "no reply to a malformed frame");
}

// ---------------------------------------------------------------------------
// Test: cancel replies immediately, with or without an active job
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancel_replies_cancelled_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, mut rx) = test_context(dir.path());

    dispatch(ctx, r#"{"command":"cancel"}"#.into()).await;

    let frame = timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("cancelled frame must not wait on the backend")
        .unwrap();
    let json = frame_json(frame);
    assert_eq!(json["status"], "cancelled");
    assert_eq!(json["message"], "Generation cancelled");
}

// ---------------------------------------------------------------------------
// Test: a second generate while one is active is rejected
// ---------------------------------------------------------------------------

#[tokio::test]
async fn second_generate_while_busy_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    write_prompt(dir.path());
    let (ctx, mut rx) = test_context(dir.path());

    // Simulate an outstanding job.
    ctx.job_active.store(true, Ordering::Release);

    dispatch(
        ctx.clone(),
        r#"{"command":"image_to_image","input_path":"/a.png","workflow_path":"/w.json"}"#.into(),
    )
    .await;

    let json = frame_json(rx.recv().await.unwrap());
    assert_eq!(json["status"], "error");
    assert_eq!(json["message"], "Generation already in progress");
    assert!(
        ctx.job_active.load(Ordering::Acquire),
        "the outstanding job's flag must survive the rejection"
    );
}

// ---------------------------------------------------------------------------
// Test: a new generate clears stale suppression before anything else
// ---------------------------------------------------------------------------

#[tokio::test]
async fn generate_clears_stale_suppression() {
    let dir = tempfile::tempdir().unwrap();
    write_prompt(dir.path());
    let (ctx, mut rx) = test_context(dir.path());

    lock_state(&ctx.watcher_state).arm_suppression();

    dispatch(
        ctx.clone(),
        r#"{"command":"image_to_image","input_path":"/missing.png","workflow_path":"/w.json"}"#
            .into(),
    )
    .await;

    // Even though this generate failed validation, the stale skip is gone.
    assert!(!lock_state(&ctx.watcher_state).is_suppressing());
    let json = frame_json(rx.recv().await.unwrap());
    assert_eq!(json["message"], "Input image not found");
}

// ---------------------------------------------------------------------------
// Test: missing prompt payload is reported as an error frame
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_prompt_payload_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    // No prompt.json written.
    let (ctx, mut rx) = test_context(dir.path());

    dispatch(
        ctx,
        r#"{"command":"image_to_image","input_path":"/a.png","workflow_path":"/w.json"}"#.into(),
    )
    .await;

    let json = frame_json(rx.recv().await.unwrap());
    assert_eq!(json["status"], "error");
    let message = json["message"].as_str().unwrap();
    assert!(
        message.starts_with("Failed to load prompt payload"),
        "got: {message}"
    );
}

// ---------------------------------------------------------------------------
// Test: an unreachable backend is a reported error, not a dead session
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unreachable_backend_reports_error_and_releases_busy_flag() {
    let dir = tempfile::tempdir().unwrap();
    write_prompt(dir.path());

    // Real input image and workflow so the run reaches the backend boundary.
    let input = dir.path().join("input.png");
    std::fs::write(&input, b"png").unwrap();
    std::fs::write(dir.path().join("workflow.json"), "{}").unwrap();

    let (ctx, mut rx) = test_context(dir.path());

    let frame = format!(
        r#"{{"command":"image_to_image","input_path":"{}","workflow_path":"{}"}}"#,
        input.display(),
        dir.path().join("workflow.json").display(),
    );
    dispatch(ctx.clone(), frame).await;

    let json = frame_json(
        timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("terminal frame expected")
            .unwrap(),
    );
    assert_eq!(json["status"], "error");
    assert!(rx.try_recv().is_err(), "exactly one terminal frame");
    assert!(
        !ctx.job_active.load(Ordering::Acquire),
        "busy flag must be released after a failed run"
    );
}
