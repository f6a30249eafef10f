//! Shared test utilities

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use cast_gateway::Config;
use cast_gateway::api::ApiServerBuilder;
use cast_gateway::cast::CastService;
use cast_gateway::testing::{FakeBrowser, FakeSessionFactory, FakeSynthesizer};
use tempfile::TempDir;
use tower::ServiceExt;

/// Host header every test request carries
pub const HOST: &str = "10.0.0.1:8000";

/// Router wired to fakes, plus handles on the fakes
pub struct TestGateway {
    pub router: Router,
    pub browser: Arc<FakeBrowser>,
    pub factory: Arc<FakeSessionFactory>,
    pub synthesizer: Arc<FakeSynthesizer>,
    pub static_dir: TempDir,
}

/// Build a gateway whose network advertises `services`
#[must_use]
pub fn gateway(services: Vec<CastService>) -> TestGateway {
    gateway_with_browser(FakeBrowser::new(services))
}

/// Build a gateway on top of a prepared browser
#[must_use]
pub fn gateway_with_browser(browser: FakeBrowser) -> TestGateway {
    let static_dir = tempfile::tempdir().expect("failed to create static dir");
    let browser = Arc::new(browser);
    let factory = Arc::new(FakeSessionFactory::new());
    let synthesizer = Arc::new(FakeSynthesizer::new());

    let mut config = Config::default();
    config.api_server.static_dir = static_dir.path().to_path_buf();
    config.cast.discovery_timeout = Duration::ZERO;
    config.cast.connect_timeout = Duration::from_secs(1);
    config.cast.playback_timeout = Duration::from_secs(1);

    let server = ApiServerBuilder::new(config)
        .browser(browser.clone())
        .session_factory(factory.clone())
        .synthesizer(synthesizer.clone())
        .poll_interval(Duration::from_millis(5))
        .build()
        .expect("failed to build API server");

    TestGateway {
        router: server.router(),
        browser,
        factory,
        synthesizer,
        static_dir,
    }
}

/// Send a request and collect status, content type and body
pub async fn send(router: &Router, method: &str, uri: &str) -> (StatusCode, Option<String>, Vec<u8>) {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("host", HOST)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, content_type, body.to_vec())
}

/// GET a JSON endpoint
pub async fn get_json(router: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let (status, _, body) = send(router, "GET", uri).await;
    (status, serde_json::from_slice(&body).unwrap())
}
