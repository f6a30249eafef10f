//! Receiver session abstraction
//!
//! A session is the stateful control channel to one receiver. The Cast v2
//! implementation lives in [`super::castv2`]; tests substitute their own.

use async_trait::async_trait;
use serde::Serialize;

use super::DeviceDescriptor;
use crate::Result;

/// Player state reported by a receiver's media channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PlayerState {
    Idle,
    Buffering,
    Playing,
    Paused,
}

/// Why a receiver went idle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IdleReason {
    Cancelled,
    Interrupted,
    Finished,
    Error,
}

/// Snapshot of a receiver's media session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaStatus {
    pub player_state: PlayerState,
    pub idle_reason: Option<IdleReason>,
    /// URL of the media the status refers to, if any is loaded
    pub content_id: Option<String>,
}

impl MediaStatus {
    /// Status of a receiver with nothing loaded
    #[must_use]
    pub const fn idle() -> Self {
        Self {
            player_state: PlayerState::Idle,
            idle_reason: None,
            content_id: None,
        }
    }

    /// Whether `url` is loaded and active
    ///
    /// An idle player that just finished `url` counts as active; short clips
    /// can end between two status polls.
    #[must_use]
    pub fn is_active_for(&self, url: &str) -> bool {
        let same_media = self.content_id.as_deref().is_none_or(|id| id == url);
        match self.player_state {
            PlayerState::Playing | PlayerState::Buffering | PlayerState::Paused => same_media,
            PlayerState::Idle => {
                self.idle_reason == Some(IdleReason::Finished)
                    && self.content_id.as_deref() == Some(url)
            }
        }
    }

    /// Whether the receiver rejected or failed the media
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.player_state == PlayerState::Idle && self.idle_reason == Some(IdleReason::Error)
    }
}

/// Control channel to a single receiver
#[async_trait]
pub trait CastSession: Send + Sync {
    /// Open the transport and complete the handshake
    async fn connect(&self) -> Result<()>;

    /// Whether the transport opened by the last `connect` is still up
    async fn is_connected(&self) -> bool;

    /// Stop whatever media is playing; a no-op when nothing is
    async fn stop(&self) -> Result<()>;

    /// Load and start `url` on the default media receiver
    async fn load(&self, url: &str, content_type: &str) -> Result<()>;

    /// Current media status
    async fn status(&self) -> Result<MediaStatus>;
}

/// Creates sessions for discovered devices
pub trait SessionFactory: Send + Sync {
    fn open(&self, descriptor: &DeviceDescriptor) -> Box<dyn CastSession>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(state: PlayerState, reason: Option<IdleReason>, id: Option<&str>) -> MediaStatus {
        MediaStatus {
            player_state: state,
            idle_reason: reason,
            content_id: id.map(ToString::to_string),
        }
    }

    #[test]
    fn playing_is_active() {
        let s = status(PlayerState::Playing, None, Some("http://a/x.mp3"));
        assert!(s.is_active_for("http://a/x.mp3"));
        assert!(!s.is_active_for("http://a/other.mp3"));
    }

    #[test]
    fn buffering_without_content_id_is_active() {
        let s = status(PlayerState::Buffering, None, None);
        assert!(s.is_active_for("http://a/x.mp3"));
    }

    #[test]
    fn finished_clip_counts_as_active() {
        let s = status(PlayerState::Idle, Some(IdleReason::Finished), Some("http://a/x.mp3"));
        assert!(s.is_active_for("http://a/x.mp3"));
        assert!(!s.is_error());
    }

    #[test]
    fn plain_idle_is_not_active() {
        assert!(!MediaStatus::idle().is_active_for("http://a/x.mp3"));
        let cancelled = status(PlayerState::Idle, Some(IdleReason::Cancelled), Some("http://a/x.mp3"));
        assert!(!cancelled.is_active_for("http://a/x.mp3"));
    }

    #[test]
    fn idle_error_is_error() {
        let s = status(PlayerState::Idle, Some(IdleReason::Error), None);
        assert!(s.is_error());
        assert!(!s.is_active_for("http://a/x.mp3"));
    }
}
