//! Device descriptors and connection-state-tracking handles

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard, watch};

use super::session::CastSession;
use crate::{Error, Result};

/// Receiver category, derived from the advertised capability bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CastType {
    /// Video-capable receiver (Chromecast, TVs)
    Cast,
    /// Audio-only receiver (speakers, displays without video out)
    Audio,
    /// Multizone speaker group
    Group,
}

impl CastType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cast => "cast",
            Self::Audio => "audio",
            Self::Group => "group",
        }
    }
}

impl fmt::Display for CastType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a discovered receiver
///
/// Immutable; a later discovery pass produces a new value rather than
/// updating this one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceDescriptor {
    /// Name the receiver advertises
    pub friendly_name: String,
    /// Normalized lookup key
    pub key: String,
    pub address: IpAddr,
    pub port: u16,
    pub model_name: String,
    pub manufacturer: String,
    pub cast_type: CastType,
    /// mDNS service instance full name
    pub service_name: String,
    /// Stable identifier advertised by the receiver
    pub uuid: String,
}

impl DeviceDescriptor {
    /// `address:port` of the control channel
    #[must_use]
    pub fn uri(&self) -> String {
        SocketAddr::new(self.address, self.port).to_string()
    }
}

/// Connection state of a device handle
///
/// `Disconnected → Connecting → Ready → (Stopped | Playing | Failed)`.
/// A `Failed` or `Disconnected` handle reconnects on its next use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    Disconnected,
    Connecting,
    Ready,
    Stopped,
    Playing,
    Failed,
}

impl DeviceState {
    /// Whether commands may be issued in this state
    #[must_use]
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Ready | Self::Stopped | Self::Playing)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Stopped => "stopped",
            Self::Playing => "playing",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live connection to one receiver
pub struct DeviceHandle {
    descriptor: DeviceDescriptor,
    session: Box<dyn CastSession>,
    state: watch::Sender<DeviceState>,
    /// Serializes handshakes so concurrent callers share one connect
    connect_lock: Mutex<()>,
    /// Held for a whole stop/load/confirm sequence
    dispatch_lock: Mutex<()>,
}

impl DeviceHandle {
    /// Wrap a session; the handle starts `Disconnected`
    #[must_use]
    pub fn new(descriptor: DeviceDescriptor, session: Box<dyn CastSession>) -> Self {
        let (state, _) = watch::channel(DeviceState::Disconnected);
        Self {
            descriptor,
            session,
            state,
            connect_lock: Mutex::new(()),
            dispatch_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub const fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    /// Normalized lookup key
    #[must_use]
    pub fn key(&self) -> &str {
        &self.descriptor.key
    }

    /// Current connection state
    #[must_use]
    pub fn state(&self) -> DeviceState {
        *self.state.borrow()
    }

    /// Watch state transitions
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<DeviceState> {
        self.state.subscribe()
    }

    pub(crate) fn session(&self) -> &dyn CastSession {
        self.session.as_ref()
    }

    pub(crate) fn set_state(&self, next: DeviceState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::debug!(
                device = %self.descriptor.key,
                from = %previous,
                to = %next,
                "device state changed"
            );
        }
    }

    pub(crate) async fn lock_dispatch(&self) -> MutexGuard<'_, ()> {
        self.dispatch_lock.lock().await
    }

    /// Block until the session is connected, connecting if needed
    ///
    /// A handle whose state says ready but whose transport has closed is
    /// reconnected.
    ///
    /// # Errors
    ///
    /// Returns `Connect` if the handshake fails or does not finish within `timeout`
    pub async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        if self.state().is_ready() && self.session.is_connected().await {
            return Ok(());
        }

        let _guard = self.connect_lock.lock().await;
        if self.state().is_ready() {
            if self.session.is_connected().await {
                return Ok(());
            }
            tracing::info!(device = %self.descriptor.key, "session closed, reconnecting");
            self.set_state(DeviceState::Disconnected);
        }

        let name = &self.descriptor.friendly_name;
        tracing::info!(device = %self.descriptor.key, uri = %self.descriptor.uri(), "connecting to '{name}'");
        self.set_state(DeviceState::Connecting);

        match tokio::time::timeout(timeout, self.session.connect()).await {
            Ok(Ok(())) => {
                self.set_state(DeviceState::Ready);
                tracing::info!(device = %self.descriptor.key, "connected to '{name}'");
                Ok(())
            }
            Ok(Err(e)) => {
                self.set_state(DeviceState::Failed);
                Err(Error::Connect(format!("'{name}': {e}")))
            }
            Err(_) => {
                self.set_state(DeviceState::Failed);
                Err(Error::Connect(format!(
                    "'{name}' did not connect within {}s",
                    timeout.as_secs_f32()
                )))
            }
        }
    }
}

impl fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("descriptor", &self.descriptor)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
