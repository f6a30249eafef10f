//! Device listing and playback endpoints

use std::path::Path as FsPath;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::services::ServeDir;

use super::{ApiError, ApiQuery, ApiState, RequestOrigin, flag};
use crate::cast::{CastType, DeviceHandle, DeviceMap, DeviceState};
use crate::media::{MediaReference, SpeechRequest};

/// Build cast router
pub fn router(state: Arc<ApiState>, static_dir: &FsPath) -> Router {
    Router::new()
        .route("/devices", get(list_devices))
        .route("/devices/refresh", post(refresh_devices))
        .route("/{device}/play/{*filename}", get(play))
        .route("/{device}/say", get(say))
        .route("/{device}/say/", get(say))
        .nest_service("/static", ServeDir::new(static_dir))
        .with_state(state)
}

/// A registered receiver
#[derive(Debug, Serialize)]
pub struct DeviceInfo {
    /// Lookup key used in playback routes
    pub name: String,
    pub friendly_name: String,
    pub model_name: String,
    pub cast_type: CastType,
    pub manufacturer: String,
    pub uri: String,
    pub uuid: String,
    pub state: DeviceState,
}

impl From<&DeviceHandle> for DeviceInfo {
    fn from(handle: &DeviceHandle) -> Self {
        let d = handle.descriptor();
        Self {
            name: d.key.clone(),
            friendly_name: d.friendly_name.clone(),
            model_name: d.model_name.clone(),
            cast_type: d.cast_type,
            manufacturer: d.manufacturer.clone(),
            uri: d.uri(),
            uuid: d.uuid.clone(),
            state: handle.state(),
        }
    }
}

fn listing(map: &DeviceMap) -> Vec<DeviceInfo> {
    map.values().map(|handle| DeviceInfo::from(handle.as_ref())).collect()
}

/// List available devices
async fn list_devices(State(state): State<Arc<ApiState>>) -> Result<Json<Vec<DeviceInfo>>, ApiError> {
    let map = state.registry.devices().await?;
    Ok(Json(listing(&map)))
}

/// Re-run discovery and list the result
async fn refresh_devices(State(state): State<Arc<ApiState>>) -> Result<Json<Vec<DeviceInfo>>, ApiError> {
    let map = state.registry.refresh().await?;
    Ok(Json(listing(&map)))
}

/// Play a static file or URL on a device
async fn play(
    State(state): State<Arc<ApiState>>,
    RequestOrigin(origin): RequestOrigin,
    Path((device, filename)): Path<(String, String)>,
) -> Result<Json<String>, ApiError> {
    let handle = state.registry.device(&device).await?;
    let media = state
        .resolver
        .resolve(&origin, &MediaReference::File(filename.clone()))
        .await?;

    state
        .dispatcher
        .play(&handle, &media.url, media.content_type)
        .await?;
    Ok(Json(filename))
}

/// Speech request parameters
#[derive(Debug, Deserialize)]
pub struct SayQuery {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(default, deserialize_with = "flag")]
    pub slow: bool,
    /// Record the speech once and serve it as a static file
    #[serde(default, deserialize_with = "flag")]
    pub rec: bool,
}

/// Speak text on a device
///
/// Returns `false` when there is nothing to say.
async fn say(
    State(state): State<Arc<ApiState>>,
    RequestOrigin(origin): RequestOrigin,
    Path(device): Path<String>,
    ApiQuery(query): ApiQuery<SayQuery>,
) -> Result<Json<Value>, ApiError> {
    let Some(text) = query.text.filter(|t| !t.is_empty()) else {
        return Ok(Json(Value::Bool(false)));
    };
    tracing::info!(device = %device, "about to say '{text}'");

    let handle = state.registry.device(&device).await?;
    let request = SpeechRequest::new(text.clone(), query.lang, query.slow);
    let reference = if query.rec {
        MediaReference::RecordedSpeech(request)
    } else {
        MediaReference::LiveSpeech(request)
    };

    let media = state.resolver.resolve(&origin, &reference).await?;
    state
        .dispatcher
        .play(&handle, &media.url, media.content_type)
        .await?;
    Ok(Json(Value::String(text)))
}
