use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use super::request::parse_generation_request;
use super::HealthResponse;
use crate::api::routes::AppState;
use crate::error::AppError;

pub async fn generate(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, AppError> {
    // Validate input
    let request = parse_generation_request(&body)?;

    // Synthesis blocks for as long as the engine takes, so keep it off the
    // async workers.
    let wav = tokio::task::spawn_blocking(move || state.tts.generate(&request))
        .await
        .map_err(|e| {
            AppError::generation("TaskAborted", format!("Generation task failed: {}", e))
        })??;

    // Return audio for inline playback
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "audio/wav"),
            (header::CONTENT_DISPOSITION, "inline; filename=\"generated.wav\""),
        ],
        wav,
    )
        .into_response())
}

/// Reads only the engine description captured at startup, never the
/// synthesis lock.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse::ok(state.tts.engine_info()))
}
