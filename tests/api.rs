//! API endpoint integration tests

use std::sync::atomic::Ordering;

use axum::http::StatusCode;
use cast_gateway::testing::{FakeBrowser, cast_service};

mod common;
use common::{gateway, gateway_with_browser, get_json, send};

fn home() -> Vec<cast_gateway::cast::CastService> {
    vec![
        cast_service("Kitchen", "10.0.0.3"),
        cast_service("Living Room", "10.0.0.4"),
    ]
}

#[tokio::test]
async fn test_health_endpoint() {
    let gw = gateway(home());
    let (status, json) = get_json(&gw.router, "/status/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["environment"], "dev");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_ready_before_and_after_discovery() {
    let gw = gateway(home());

    let (status, json) = get_json(&gw.router, "/status/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["checks"]["registry"]["status"], "unavailable");

    get_json(&gw.router, "/cast/devices").await;
    let (status, json) = get_json(&gw.router, "/status/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["checks"]["registry"]["devices"], 2);
}

#[tokio::test]
async fn test_list_devices() {
    let gw = gateway(home());
    let (status, json) = get_json(&gw.router, "/cast/devices").await;

    assert_eq!(status, StatusCode::OK);
    let devices = json.as_array().unwrap();
    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0]["name"], "kitchen");
    assert_eq!(devices[0]["friendly_name"], "Kitchen");
    assert_eq!(devices[0]["uri"], "10.0.0.3:8009");
    assert_eq!(devices[0]["cast_type"], "audio");
    assert_eq!(devices[0]["manufacturer"], "Google Inc.");
    assert_eq!(devices[0]["state"], "ready");
    assert_eq!(devices[1]["name"], "living-room");
}

#[tokio::test]
async fn test_devices_are_discovered_once() {
    let gw = gateway(home());
    get_json(&gw.router, "/cast/devices").await;
    get_json(&gw.router, "/cast/devices").await;

    assert_eq!(gw.browser.browses.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_refresh_rediscovers() {
    let gw = gateway(home());
    get_json(&gw.router, "/cast/devices").await;

    gw.browser.set_services(vec![cast_service("Den", "10.0.0.5")]);
    let (status, _, body) = send(&gw.router, "POST", "/cast/devices/refresh").await;
    assert_eq!(status, StatusCode::OK);

    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let names: Vec<&str> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["den"]);
}

#[tokio::test]
async fn test_discovery_failure_is_503() {
    let gw = gateway_with_browser(FakeBrowser::failing());

    let (status, json) = get_json(&gw.router, "/cast/devices").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["error"]["code"], "discovery_failed");

    let (status, json) = get_json(&gw.router, "/status/ready").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["checks"]["registry"]["status"], "fail");
}

#[tokio::test]
async fn test_play_static_file() {
    let gw = gateway(home());
    std::fs::write(gw.static_dir.path().join("song.mp3"), b"mp3").unwrap();

    let (status, json) = get_json(&gw.router, "/cast/kitchen/play/song.mp3").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, "song.mp3");

    let session = gw.factory.session("kitchen").unwrap();
    assert_eq!(
        session.loaded().as_deref(),
        Some("http://10.0.0.1:8000/static/song.mp3")
    );
    assert_eq!(
        session.log(),
        vec![
            "connect",
            "stop",
            "load:http://10.0.0.1:8000/static/song.mp3",
            "active:http://10.0.0.1:8000/static/song.mp3",
        ]
    );
}

#[tokio::test]
async fn test_play_passes_through_unknown_files() {
    let gw = gateway(home());

    let (status, _) = get_json(&gw.router, "/cast/kitchen/play/http://radio.example/live.mp3").await;
    assert_eq!(status, StatusCode::OK);

    let session = gw.factory.session("kitchen").unwrap();
    assert_eq!(session.loaded().as_deref(), Some("http://radio.example/live.mp3"));
}

#[tokio::test]
async fn test_play_unknown_device_is_404() {
    let gw = gateway(home());

    let (status, json) = get_json(&gw.router, "/cast/attic/play/song.mp3").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["code"], "device_not_found");
}

#[tokio::test]
async fn test_say_empty_text_short_circuits() {
    let gw = gateway(home());

    let (status, json) = get_json(&gw.router, "/cast/kitchen/say?text=").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, false);

    let (_, json) = get_json(&gw.router, "/cast/kitchen/say").await;
    assert_eq!(json, false);

    assert_eq!(gw.browser.browses.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_say_live_speech() {
    let gw = gateway(home());

    let (status, json) = get_json(&gw.router, "/cast/living-room/say/?text=Hello%20there").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, "Hello there");

    let session = gw.factory.session("living-room").unwrap();
    assert_eq!(
        session.loaded().as_deref(),
        Some("http://10.0.0.1:8000/tts/?text=Hello%20there&lang=en&slow=false")
    );
    assert_eq!(gw.synthesizer.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_say_recorded_reuses_cache() {
    let gw = gateway(home());

    for _ in 0..2 {
        let (status, _) = get_json(&gw.router, "/cast/kitchen/say?text=hello&rec=true").await;
        assert_eq!(status, StatusCode::OK);
    }

    assert_eq!(gw.synthesizer.calls.load(Ordering::SeqCst), 1);
    assert!(gw.static_dir.path().join("recordings/hello-en-false.mp3").is_file());

    let session = gw.factory.session("kitchen").unwrap();
    assert_eq!(
        session.loaded().as_deref(),
        Some("http://10.0.0.1:8000/static/recordings/hello-en-false.mp3")
    );
}

#[tokio::test]
async fn test_say_accepts_numeric_flags() {
    let gw = gateway(home());

    let (status, _) = get_json(&gw.router, "/cast/kitchen/say?text=hello&rec=1&slow=0").await;
    assert_eq!(status, StatusCode::OK);

    let session = gw.factory.session("kitchen").unwrap();
    assert_eq!(
        session.loaded().as_deref(),
        Some("http://10.0.0.1:8000/static/recordings/hello-en-false.mp3")
    );
}

#[tokio::test]
async fn test_invalid_flag_is_json_400() {
    let gw = gateway(home());

    let (status, json) = get_json(&gw.router, "/cast/kitchen/say?text=hello&slow=maybe").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_play_after_receiver_disconnect_reconnects() {
    let gw = gateway(home());
    std::fs::write(gw.static_dir.path().join("song.mp3"), b"mp3").unwrap();

    let (status, _) = get_json(&gw.router, "/cast/kitchen/play/song.mp3").await;
    assert_eq!(status, StatusCode::OK);

    let session = gw.factory.session("kitchen").unwrap();
    session.drop_connection();

    let (status, _) = get_json(&gw.router, "/cast/kitchen/play/song.mp3").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session.connects.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_say_unsupported_language_is_400() {
    let gw = gateway(home());

    let (status, json) = get_json(&gw.router, "/cast/kitchen/say?text=hello&lang=xx").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "unsupported_language");
}

#[tokio::test]
async fn test_tts_endpoint_returns_audio() {
    let gw = gateway(home());

    let (status, content_type, body) = send(&gw.router, "GET", "/tts/?text=hi&lang=sv&slow=yes").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("audio/mpeg"));
    assert_eq!(body, b"ID3:sv:true:hi");
}

#[tokio::test]
async fn test_tts_empty_text_is_false() {
    let gw = gateway(home());

    let (status, json) = get_json(&gw.router, "/tts?text=").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, false);
}

#[tokio::test]
async fn test_tts_langs() {
    let gw = gateway(home());

    let (status, json) = get_json(&gw.router, "/tts/langs").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["en"], "English");
}

#[tokio::test]
async fn test_static_files_are_served() {
    let gw = gateway(home());
    std::fs::write(gw.static_dir.path().join("chime.mp3"), b"chime").unwrap();

    for uri in ["/static/chime.mp3", "/cast/static/chime.mp3"] {
        let (status, _, body) = send(&gw.router, "GET", uri).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
        assert_eq!(body, b"chime");
    }
}
