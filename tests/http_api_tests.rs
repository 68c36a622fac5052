use anyhow::Result;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use loqa_live::audio::{ManualOutput, ScriptedInput};
use loqa_live::{create_router, AppState, LiveAgentHandle, LiveSession, LiveSessionConfig, MemoryTransport};
use serde_json::Value;
use tower::ServiceExt;

fn app() -> (axum::Router, LiveAgentHandle) {
    let session = LiveSession::new(
        LiveSessionConfig::default(),
        Box::new(MemoryTransport::new()),
        Box::new(ScriptedInput::new()),
        Box::new(ManualOutput::new()),
    );
    let (live, _task) = LiveAgentHandle::spawn(session);
    (create_router(AppState::new(live.clone())), live)
}

async fn call(app: &axum::Router, method: &str, uri: &str) -> Result<(StatusCode, Value)> {
    let response = app
        .clone()
        .oneshot(Request::builder().method(method).uri(uri).body(Body::empty())?)
        .await?;

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    Ok((status, body))
}

#[tokio::test]
async fn test_health() -> Result<()> {
    let (app, _live) = app();
    let (status, _) = call(&app, "GET", "/health").await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn test_status_starts_idle() -> Result<()> {
    let (app, _live) = app();

    let (status, body) = call(&app, "GET", "/live/status").await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phase"], "idle");
    assert_eq!(body["status"], "Tap the icon to initiate a live conversation.");
    Ok(())
}

#[tokio::test]
async fn test_start_and_stop() -> Result<()> {
    let (app, live) = app();

    let (status, body) = call(&app, "POST", "/live/start").await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body["session_id"].is_string());

    let (status, body) = call(&app, "POST", "/live/stop").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phase"], "idle");

    // Stopping again is harmless
    let (status, _) = call(&app, "POST", "/live/stop").await?;
    assert_eq!(status, StatusCode::OK);

    let (_, transcript) = call(&app, "GET", "/live/transcript").await?;
    assert_eq!(transcript, Value::Array(vec![]));
    assert_eq!(live.snapshot().phase, loqa_live::SessionPhase::Idle);
    Ok(())
}
