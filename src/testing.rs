//! In-memory stand-ins for the network-facing traits
//!
//! Used by unit tests and by the integration tests under `tests/`. Nothing
//! here touches the network.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::cast::discovery::{CastService, SERVICE_TYPE, ServiceBrowser};
use crate::cast::session::{CastSession, IdleReason, MediaStatus, PlayerState, SessionFactory};
use crate::cast::slug::slugify;
use crate::cast::{CastType, DeviceDescriptor};
use crate::tts::SpeechSynthesizer;
use crate::{Error, Result};

/// Resolved `_googlecast` record with the given friendly name
#[must_use]
pub fn cast_service(name: &str, address: &str) -> CastService {
    let mut txt = HashMap::new();
    txt.insert("fn".to_string(), name.to_string());
    txt.insert("md".to_string(), "Google Home".to_string());
    txt.insert("ca".to_string(), "2052".to_string());
    txt.insert("id".to_string(), format!("{:032x}", name.len()));

    CastService {
        fullname: format!("{}.{SERVICE_TYPE}", name.replace(' ', "-")),
        addresses: vec![address.parse::<IpAddr>().expect("valid test address")],
        port: 8009,
        txt,
    }
}

/// Audio receiver descriptor at 192.168.1.20:8009
#[must_use]
pub fn descriptor(name: &str) -> DeviceDescriptor {
    DeviceDescriptor {
        friendly_name: name.to_string(),
        key: slugify(name),
        address: "192.168.1.20".parse().expect("valid test address"),
        port: 8009,
        model_name: "Google Home".to_string(),
        manufacturer: "Google Inc.".to_string(),
        cast_type: CastType::Audio,
        service_name: format!("{name}.{SERVICE_TYPE}"),
        uuid: format!("uuid-{}", slugify(name)),
    }
}

/// Browser returning a fixed set of services
#[derive(Default)]
pub struct FakeBrowser {
    services: Mutex<Vec<CastService>>,
    filters: Mutex<Vec<Option<String>>>,
    fail: AtomicBool,
    delay: Duration,
    /// Number of browse calls so far
    pub browses: AtomicUsize,
}

impl FakeBrowser {
    #[must_use]
    pub fn new(services: Vec<CastService>) -> Self {
        Self {
            services: Mutex::new(services),
            ..Self::default()
        }
    }

    /// Browser whose every browse fails
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: AtomicBool::new(true),
            ..Self::default()
        }
    }

    /// Make subsequent browses fail or succeed
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    /// Sleep this long inside each browse
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Replace what the next browse returns
    pub fn set_services(&self, services: Vec<CastService>) {
        *self.services.lock().expect("lock") = services;
    }

    /// Name filter passed to the most recent browse
    #[must_use]
    pub fn last_filter(&self) -> Option<String> {
        self.filters.lock().expect("lock").last().cloned().flatten()
    }
}

#[async_trait]
impl ServiceBrowser for FakeBrowser {
    async fn browse(&self, _window: Duration, name: Option<&str>) -> Result<Vec<CastService>> {
        self.browses.fetch_add(1, Ordering::SeqCst);
        self.filters
            .lock()
            .expect("lock")
            .push(name.map(ToString::to_string));

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Discovery("network unreachable".to_string()));
        }
        Ok(self.services.lock().expect("lock").clone())
    }
}

/// How a fake receiver reacts to loaded media
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackBehavior {
    /// Loaded media starts playing
    Plays,
    /// Loaded media never leaves idle
    NeverActive,
    /// Receiver reports a load error
    Rejects,
}

/// Session recording every command it receives
///
/// Clones share state, so a test can keep one clone and hand another to a
/// device handle.
#[derive(Clone)]
pub struct FakeSession {
    /// Number of handshakes so far
    pub connects: Arc<AtomicUsize>,
    log: Arc<Mutex<Vec<String>>>,
    loaded: Arc<Mutex<Option<String>>>,
    connected: Arc<AtomicBool>,
    connect_delay: Duration,
    stop_delay: Duration,
    load_delay: Duration,
    fail_connect: bool,
    behavior: PlaybackBehavior,
}

impl Default for FakeSession {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeSession {
    #[must_use]
    pub fn new() -> Self {
        Self {
            connects: Arc::new(AtomicUsize::new(0)),
            log: Arc::new(Mutex::new(Vec::new())),
            loaded: Arc::new(Mutex::new(None)),
            connected: Arc::new(AtomicBool::new(false)),
            connect_delay: Duration::ZERO,
            stop_delay: Duration::ZERO,
            load_delay: Duration::ZERO,
            fail_connect: false,
            behavior: PlaybackBehavior::Plays,
        }
    }

    #[must_use]
    pub const fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    /// Sleep this long inside each stop
    #[must_use]
    pub const fn with_stop_delay(mut self, delay: Duration) -> Self {
        self.stop_delay = delay;
        self
    }

    #[must_use]
    pub const fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    #[must_use]
    pub const fn with_behavior(mut self, behavior: PlaybackBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    #[must_use]
    pub const fn failing_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    /// Commands seen so far: `connect`, `stop`, `load:<url>`, `active:<url>`
    #[must_use]
    pub fn log(&self) -> Vec<String> {
        self.log.lock().expect("lock").clone()
    }

    /// URL currently loaded on the fake receiver
    #[must_use]
    pub fn loaded(&self) -> Option<String> {
        self.loaded.lock().expect("lock").clone()
    }

    /// Simulate the receiver closing the transport
    pub fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn record(&self, entry: String) {
        self.log.lock().expect("lock").push(entry);
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::Connect("session closed".to_string()))
        }
    }
}

#[async_trait]
impl CastSession for FakeSession {
    async fn connect(&self) -> Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }
        if self.fail_connect {
            return Err(Error::Connect("connection refused".to_string()));
        }
        self.connected.store(true, Ordering::SeqCst);
        self.record("connect".to_string());
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn stop(&self) -> Result<()> {
        self.ensure_connected()?;
        if !self.stop_delay.is_zero() {
            tokio::time::sleep(self.stop_delay).await;
        }
        self.record("stop".to_string());
        *self.loaded.lock().expect("lock") = None;
        Ok(())
    }

    async fn load(&self, url: &str, _content_type: &str) -> Result<()> {
        self.ensure_connected()?;
        if !self.load_delay.is_zero() {
            tokio::time::sleep(self.load_delay).await;
        }
        self.record(format!("load:{url}"));
        *self.loaded.lock().expect("lock") = Some(url.to_string());
        Ok(())
    }

    async fn status(&self) -> Result<MediaStatus> {
        self.ensure_connected()?;
        let Some(url) = self.loaded() else {
            return Ok(MediaStatus::idle());
        };

        let status = match self.behavior {
            PlaybackBehavior::Plays => {
                self.record(format!("active:{url}"));
                MediaStatus {
                    player_state: PlayerState::Playing,
                    idle_reason: None,
                    content_id: Some(url),
                }
            }
            PlaybackBehavior::NeverActive => MediaStatus {
                player_state: PlayerState::Idle,
                idle_reason: None,
                content_id: Some(url),
            },
            PlaybackBehavior::Rejects => MediaStatus {
                player_state: PlayerState::Idle,
                idle_reason: Some(IdleReason::Error),
                content_id: Some(url),
            },
        };
        Ok(status)
    }
}

/// Factory handing out [`FakeSession`]s and remembering them by device key
#[derive(Default)]
pub struct FakeSessionFactory {
    sessions: Mutex<HashMap<String, FakeSession>>,
    unreachable: HashSet<String>,
}

impl FakeSessionFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sessions for this device key will fail to connect
    #[must_use]
    pub fn unreachable(mut self, key: &str) -> Self {
        self.unreachable.insert(key.to_string());
        self
    }

    /// Most recent session opened for `key`
    #[must_use]
    pub fn session(&self, key: &str) -> Option<FakeSession> {
        self.sessions.lock().expect("lock").get(key).cloned()
    }
}

impl SessionFactory for FakeSessionFactory {
    fn open(&self, descriptor: &DeviceDescriptor) -> Box<dyn CastSession> {
        let mut session = FakeSession::new();
        if self.unreachable.contains(&descriptor.key) {
            session = session.failing_connect();
        }
        self.sessions
            .lock()
            .expect("lock")
            .insert(descriptor.key.clone(), session.clone());
        Box::new(session)
    }
}

/// Synthesizer producing placeholder MP3 bytes and counting calls
#[derive(Default)]
pub struct FakeSynthesizer {
    /// Number of synthesize calls so far
    pub calls: AtomicUsize,
}

impl FakeSynthesizer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSynthesizer {
    async fn synthesize(&self, text: &str, lang: &str, slow: bool) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("ID3:{lang}:{slow}:{text}").into_bytes())
    }

    fn supported_languages(&self) -> BTreeMap<&'static str, &'static str> {
        BTreeMap::from([("en", "English"), ("sv", "Swedish")])
    }
}
