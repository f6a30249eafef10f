//! Stop, load, confirm: driving a receiver's media session

use std::time::Duration;

use super::{DeviceHandle, DeviceState};
use crate::{Error, Result};

/// How often media status is polled while waiting for playback
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Plays media on device handles
#[derive(Debug, Clone, Copy)]
pub struct PlaybackDispatcher {
    connect_timeout: Duration,
    playback_timeout: Duration,
    poll_interval: Duration,
}

impl PlaybackDispatcher {
    #[must_use]
    pub const fn new(connect_timeout: Duration, playback_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            playback_timeout,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Replace whatever the device is playing with `url`
    ///
    /// Holds the handle's dispatch lock for the whole sequence, reconnects a
    /// handle that is not ready, and returns once the receiver reports the
    /// new media active.
    ///
    /// # Errors
    ///
    /// Returns `Connect` if the handle cannot be readied, and `Playback` if
    /// the receiver rejects the media or the sequence does not finish in time
    pub async fn play(&self, handle: &DeviceHandle, url: &str, content_type: &str) -> Result<()> {
        let _dispatch = handle.lock_dispatch().await;
        handle.wait_ready(self.connect_timeout).await?;

        tracing::info!(device = %handle.key(), url = %url, content_type, "playing media");

        match self.dispatch(handle, url, content_type).await {
            Ok(()) => {
                handle.set_state(DeviceState::Playing);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(device = %handle.key(), url = %url, error = %e, "playback failed");
                handle.set_state(DeviceState::Failed);
                Err(e)
            }
        }
    }

    /// Stop, load and confirm, all under the playback timeout
    async fn dispatch(&self, handle: &DeviceHandle, url: &str, content_type: &str) -> Result<()> {
        let session = handle.session();

        let sequence = async {
            session.stop().await?;
            handle.set_state(DeviceState::Stopped);

            session.load(url, content_type).await?;
            loop {
                let status = session.status().await?;
                if status.is_error() {
                    return Err(Error::Playback(format!("receiver failed to play '{url}'")));
                }
                if status.is_active_for(url) {
                    return Ok(());
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        };

        tokio::time::timeout(self.playback_timeout, sequence)
            .await
            .map_err(|_| {
                Error::Playback(format!(
                    "'{url}' did not start within {}s",
                    self.playback_timeout.as_secs_f32()
                ))
            })?
    }
}
