//! HTTP API server for the cast gateway

pub mod cast;
pub mod health;
pub mod tts;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::cast::{
    CastV2Factory, Connector, DeviceRegistry, DiscoveryEngine, MdnsBrowser, PlaybackDispatcher,
    ServiceBrowser, SessionFactory,
};
use crate::config::Config;
use crate::media::{MediaResolver, Origin};
use crate::tts::{SpeechSynthesizer, TextToSpeech};
use crate::{Error, Result};

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub environment: String,
    pub version: String,
    pub registry: Arc<DeviceRegistry>,
    pub dispatcher: PlaybackDispatcher,
    pub resolver: MediaResolver,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
}

/// Configuration for building an API server
pub struct ApiServerBuilder {
    config: Config,
    browser: Option<Arc<dyn ServiceBrowser>>,
    session_factory: Option<Arc<dyn SessionFactory>>,
    synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    poll_interval: Option<Duration>,
}

impl ApiServerBuilder {
    /// Create a new API server builder
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self {
            config,
            browser: None,
            session_factory: None,
            synthesizer: None,
            poll_interval: None,
        }
    }

    /// Set the service browser used for discovery (defaults to mDNS)
    #[must_use]
    pub fn browser(mut self, browser: Arc<dyn ServiceBrowser>) -> Self {
        self.browser = Some(browser);
        self
    }

    /// Set the session factory (defaults to Cast v2)
    #[must_use]
    pub fn session_factory(mut self, factory: Arc<dyn SessionFactory>) -> Self {
        self.session_factory = Some(factory);
        self
    }

    /// Set the speech synthesizer (defaults to the configured TTS backend)
    #[must_use]
    pub fn synthesizer(mut self, synthesizer: Arc<dyn SpeechSynthesizer>) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    /// Set how often media status is polled while confirming playback
    #[must_use]
    pub const fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Build the API server
    ///
    /// # Errors
    ///
    /// Returns error if the configured TTS backend cannot be created
    pub fn build(self) -> Result<ApiServer> {
        let config = self.config;

        let synthesizer = match self.synthesizer {
            Some(synthesizer) => synthesizer,
            None => Arc::new(TextToSpeech::from_config(&config.tts)?),
        };
        let browser = self.browser.unwrap_or_else(|| Arc::new(MdnsBrowser));
        let factory = self
            .session_factory
            .unwrap_or_else(|| Arc::new(CastV2Factory));

        let engine = DiscoveryEngine::new(browser, config.cast.discovery_timeout);
        let connector = Connector::new(engine, factory, config.cast.connect_timeout);
        let registry = Arc::new(DeviceRegistry::new(connector));

        let mut dispatcher =
            PlaybackDispatcher::new(config.cast.connect_timeout, config.cast.playback_timeout);
        if let Some(interval) = self.poll_interval {
            dispatcher = dispatcher.with_poll_interval(interval);
        }

        let static_dir = config.api_server.static_dir.clone();
        let resolver = MediaResolver::new(
            static_dir.clone(),
            config.route_prefix.clone(),
            synthesizer.clone(),
        );

        let state = Arc::new(ApiState {
            environment: config.environment.clone(),
            version: config.version.clone(),
            registry,
            dispatcher,
            resolver,
            synthesizer,
        });

        Ok(ApiServer {
            state,
            host: config.api_server.host,
            port: config.api_server.port,
            static_dir,
            preload_devices: config.api_server.preload_devices,
        })
    }
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    host: String,
    port: u16,
    static_dir: PathBuf,
    preload_devices: bool,
}

impl ApiServer {
    #[must_use]
    pub fn state(&self) -> Arc<ApiState> {
        self.state.clone()
    }

    /// Build the router with all routes
    #[must_use]
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .nest("/cast", cast::router(self.state.clone(), &self.static_dir))
            .nest("/status", health::router(self.state.clone()))
            .merge(tts::router(self.state.clone()))
            .nest_service("/static", ServeDir::new(&self.static_dir))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.host, self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(addr = %addr, static_dir = %self.static_dir.display(), "API server listening");

        if self.preload_devices {
            let registry = self.state.registry.clone();
            tokio::spawn(async move {
                if let Err(e) = registry.initialize().await {
                    tracing::error!(error = %e, "device preload failed");
                }
            });
        }

        axum::serve(listener, self.router())
            .await
            .map_err(|e| Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }

    /// Run the API server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}

/// Scheme and host the caller addressed
///
/// Honors `X-Forwarded-Proto` and `X-Forwarded-Host` from a reverse proxy.
#[derive(Debug, Clone)]
pub struct RequestOrigin(pub Origin);

impl<S: Send + Sync> FromRequestParts<S> for RequestOrigin {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> std::result::Result<Self, Self::Rejection> {
        let header_value = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.split(',').next().unwrap_or(v).trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let scheme = header_value("x-forwarded-proto")
            .or_else(|| parts.uri.scheme_str().map(ToString::to_string))
            .unwrap_or_else(|| "http".to_string());

        let netloc = header_value("x-forwarded-host")
            .or_else(|| header_value(header::HOST.as_str()))
            .or_else(|| parts.uri.authority().map(ToString::to_string))
            .ok_or_else(|| ApiError::BadRequest("request has no Host header".to_string()))?;

        Ok(Self(Origin::new(scheme, netloc)))
    }
}

/// Query string extractor that rejects with an [`ApiError`] body
#[derive(Debug, Clone)]
pub struct ApiQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> std::result::Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        Ok(Self(value))
    }
}

/// Deserialize a query flag, accepting `1/0`, `yes/no`, `on/off` and `true/false`
///
/// # Errors
///
/// Returns error for any other value
pub fn flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_flag(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid boolean '{raw}'")))
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "f" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

/// API errors
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Gateway(Error),
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self::Gateway(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: ErrorBody,
        }

        #[derive(Serialize)]
        struct ErrorBody {
            code: &'static str,
            message: String,
        }

        let (status, code) = match &self {
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Self::Gateway(e) => match e {
                Error::DeviceNotFound(_) => (StatusCode::NOT_FOUND, "device_not_found"),
                Error::UnsupportedLanguage(_) => (StatusCode::BAD_REQUEST, "unsupported_language"),
                Error::Resolution(_) => (StatusCode::BAD_GATEWAY, "resolution_failed"),
                Error::Connect(_) => (StatusCode::BAD_GATEWAY, "connect_failed"),
                Error::Playback(_) => (StatusCode::BAD_GATEWAY, "playback_failed"),
                Error::Tts(_) | Error::Http(_) => (StatusCode::BAD_GATEWAY, "tts_failed"),
                Error::Discovery(_) => (StatusCode::SERVICE_UNAVAILABLE, "discovery_failed"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            },
        };

        let message = match self {
            Self::BadRequest(msg) => msg,
            Self::Gateway(e) => e.to_string(),
        };

        if status.is_server_error() {
            tracing::warn!(code, error = %message, "request failed");
        }

        (status, Json(ErrorResponse { error: ErrorBody { code, message } })).into_response()
    }
}
