//! Router tests against the stub backend and in-memory storage

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use tower::ServiceExt;

use guided_audio_config::Settings;
use guided_audio_persistence::InMemoryStorage;
use guided_audio_pipeline::{StubSpeechSynthesizer, SynthesisEvent};
use guided_audio_server::{create_router, AppState};

const SCRIPT: &str = r#"{"title": "Pause", "segments": [
    {"type": "speech", "text": "Breathe in.", "completed": true},
    {"type": "pause", "duration": 1, "completed": true},
    {"type": "speech", "text": "And out.", "completed": true}
], "completed": true}"#;

fn state() -> AppState {
    AppState::new(
        Settings::default(),
        Arc::new(StubSpeechSynthesizer::new(24000)),
        Arc::new(InMemoryStorage::new()),
    )
}

async fn body_bytes(body: Body) -> Vec<u8> {
    to_bytes(body, usize::MAX).await.unwrap().to_vec()
}

async fn synthesize(
    app: axum::Router,
    uri: &str,
    script: &str,
) -> (StatusCode, Vec<SynthesisEvent>) {
    let response = app
        .oneshot(
            Request::post(uri)
                .header(header::CONTENT_TYPE, "text/plain")
                .body(Body::from(script.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = body_bytes(response.into_body()).await;
    let text = String::from_utf8(bytes).unwrap();
    let events = text
        .lines()
        .filter(|l| !l.is_empty())
        .filter_map(|l| SynthesisEvent::from_ndjson(l).ok())
        .collect();
    (status, events)
}

#[tokio::test]
async fn test_health() {
    let response = create_router(state())
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = body_bytes(response.into_body()).await;
    let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(value["status"], "healthy");
    assert_eq!(value["tts"], "stub");
}

#[tokio::test]
async fn test_synthesize_streams_events_and_serves_asset() {
    let state = state();
    let (status, events) = synthesize(create_router(state.clone()), "/v1/synthesize", SCRIPT).await;
    assert_eq!(status, StatusCode::OK);

    let asset_ref = match events.last() {
        Some(SynthesisEvent::Complete { asset_ref }) => asset_ref.clone(),
        other => panic!("expected completion, got {:?}", other),
    };
    assert!(events.iter().any(|e| matches!(e, SynthesisEvent::Update { .. })));

    let response = create_router(state)
        .oneshot(
            Request::get(format!("/v1/assets/{}", asset_ref))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/wav");
    let bytes = body_bytes(response.into_body()).await;
    assert_eq!(&bytes[..4], b"RIFF");
}

#[tokio::test]
async fn test_truncated_script_reports_error() {
    let app = create_router(state());
    let (status, events) = synthesize(app, "/v1/synthesize", &SCRIPT[..40]).await;
    assert_eq!(status, StatusCode::OK);
    assert!(matches!(events.last(), Some(SynthesisEvent::Error { .. })));
}

#[tokio::test]
async fn test_invalid_speed_rejected() {
    let app = create_router(state());
    let (status, events) = synthesize(app, "/v1/synthesize?speed=9", SCRIPT).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(events.is_empty());
}

#[tokio::test]
async fn test_unknown_asset_is_404() {
    let response = create_router(state())
        .oneshot(Request::get("/v1/assets/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_metrics_disabled_without_recorder() {
    let response = create_router(state())
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
