//! HTTP Endpoints
//!
//! - `POST /v1/synthesize`: streamed script in, NDJSON events out
//! - `GET /v1/assets/:id`: stored audio
//! - `GET /health`, `GET /metrics`

use std::time::Duration;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use serde::Deserialize;
use tokio_stream::wrappers::ReceiverStream;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use guided_audio_config::ServerConfig;
use guided_audio_core::{AudioRef, VoiceSettings};
use guided_audio_pipeline::text_chunks;

use crate::metrics::metrics_handler;
use crate::state::AppState;
use crate::ServerError;

const NDJSON: &str = "application/x-ndjson";

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let timeout = Duration::from_millis(state.settings.server.request_timeout_ms);

    // Synthesis streams stay open for the whole run; only short routes time out
    let bounded = Router::new()
        .route("/v1/assets/:id", get(get_asset))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .layer(TimeoutLayer::new(timeout));

    Router::new()
        .route("/v1/synthesize", post(synthesize))
        .merge(bounded)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&state.settings.server)),
        )
        .with_state(state)
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if config.cors_origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(origins)
}

/// Per-request voice overrides
#[derive(Debug, Default, Deserialize)]
pub struct SynthesizeParams {
    pub voice: Option<String>,
    pub speed: Option<f32>,
    pub model: Option<String>,
}

impl SynthesizeParams {
    fn apply(self, mut voice: VoiceSettings) -> Result<VoiceSettings, ServerError> {
        if let Some(name) = self.voice {
            voice.voice = name;
        }
        if let Some(speed) = self.speed {
            if !(0.25..=4.0).contains(&speed) {
                return Err(ServerError::InvalidRequest(format!(
                    "speed {} outside 0.25..=4.0",
                    speed
                )));
            }
            voice.speed = speed;
        }
        if self.model.is_some() {
            voice.model = self.model;
        }
        Ok(voice)
    }
}

/// Run synthesis over the request body
///
/// Each event is one JSON line. Dropping the response (client disconnect)
/// cancels the run.
async fn synthesize(
    State(state): State<AppState>,
    Query(params): Query<SynthesizeParams>,
    body: Body,
) -> Result<Response, ServerError> {
    metrics::counter!("guided_audio_requests_total", "endpoint" => "synthesize").increment(1);
    let voice = params.apply(state.orchestrator.config().voice.clone())?;

    let input = text_chunks(body.into_data_stream());
    let (handle, events) = state.orchestrator.start_with_voice(input, voice);
    let guard = handle.cancellation_token().drop_guard();

    let lines = ReceiverStream::new(events).map(move |event| {
        // Lives as long as the response body
        let _guard = &guard;
        event.to_ndjson()
    });

    Ok(([(header::CONTENT_TYPE, NDJSON)], Body::from_stream(lines)).into_response())
}

/// Fetch a stored asset
async fn get_asset(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ServerError> {
    metrics::counter!("guided_audio_requests_total", "endpoint" => "assets").increment(1);
    let audio_ref = AudioRef::new(id);
    if audio_ref.is_error() {
        return Err(ServerError::NotFound(audio_ref.to_string()));
    }

    let meta = state.storage.meta(&audio_ref).await?;
    let bytes = state.storage.get(&audio_ref).await?;

    let mut response = (StatusCode::OK, bytes).into_response();
    if let Ok(content_type) = HeaderValue::from_str(&meta.content_type) {
        response.headers_mut().insert(header::CONTENT_TYPE, content_type);
    }
    Ok(response)
}

/// Health check
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "tts": state.settings.tts.engine,
        "storage": state.settings.storage.backend,
    }))
}
