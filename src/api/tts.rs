//! Live speech synthesis endpoints

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use super::{ApiError, ApiQuery, ApiState, flag};
use crate::media::SpeechRequest;
use crate::tts::ensure_supported;

/// Build TTS router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/tts", get(speak))
        .route("/tts/", get(speak))
        .route("/tts/langs", get(langs))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct SpeakQuery {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(default, deserialize_with = "flag")]
    pub slow: bool,
}

/// Synthesize speech; returns MP3 audio, or `false` for empty text
async fn speak(
    State(state): State<Arc<ApiState>>,
    ApiQuery(query): ApiQuery<SpeakQuery>,
) -> Result<Response, ApiError> {
    let Some(text) = query.text.filter(|t| !t.is_empty()) else {
        return Ok(Json(false).into_response());
    };

    let request = SpeechRequest::new(text, query.lang, query.slow);
    ensure_supported(state.synthesizer.as_ref(), &request.lang)?;

    let audio = state
        .synthesizer
        .synthesize(&request.text, &request.lang, request.slow)
        .await?;

    Ok((StatusCode::OK, [(header::CONTENT_TYPE, "audio/mpeg")], audio).into_response())
}

/// Supported languages, code → name
async fn langs(State(state): State<Arc<ApiState>>) -> Json<BTreeMap<&'static str, &'static str>> {
    Json(state.synthesizer.supported_languages())
}
