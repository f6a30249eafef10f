//! Cast v2 sessions backed by `rust_cast`
//!
//! A `rust_cast::CastDevice` is neither `Send` nor async, so each session
//! owns a dedicated worker thread that holds the socket. Commands travel to
//! it over a channel and results come back over oneshot replies. While idle
//! the worker sends heartbeats so the receiver keeps the connection open.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::time::Duration;

use async_trait::async_trait;
use rust_cast::CastDevice;
use rust_cast::ChannelMessage;
use rust_cast::channels::connection::ConnectionResponse;
use rust_cast::channels::heartbeat::HeartbeatResponse;
use rust_cast::channels::media::{self, Media, StreamType};
use rust_cast::channels::receiver::CastDeviceApp;
use tokio::sync::{Mutex, oneshot};

use super::session::{CastSession, IdleReason, MediaStatus, PlayerState, SessionFactory};
use super::DeviceDescriptor;
use crate::{Error, Result};

/// Platform receiver every sender connects to first
const PLATFORM_RECEIVER: &str = "receiver-0";

/// App id of the Default Media Receiver
const DEFAULT_MEDIA_RECEIVER_ID: &str = "CC1AD845";

/// Idle time after which the worker sends a heartbeat
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Messages read while waiting for a pong before the receiver is given up on
const MAX_HEARTBEAT_MESSAGES: usize = 16;

type Reply<T> = oneshot::Sender<Result<T>>;

enum Command {
    Stop(Reply<()>),
    Load {
        url: String,
        content_type: String,
        reply: Reply<()>,
    },
    Status(Reply<MediaStatus>),
}

/// Opens [`CastV2Session`]s
#[derive(Debug, Default, Clone, Copy)]
pub struct CastV2Factory;

impl SessionFactory for CastV2Factory {
    fn open(&self, descriptor: &DeviceDescriptor) -> Box<dyn CastSession> {
        Box::new(CastV2Session::new(descriptor))
    }
}

/// Channel to a running worker thread
struct WorkerLink {
    commands: mpsc::Sender<Command>,
    /// Cleared by the worker when it exits
    alive: Arc<AtomicBool>,
}

/// Session to one receiver over the Cast v2 protocol
pub struct CastV2Session {
    host: String,
    port: u16,
    key: String,
    worker: Mutex<Option<WorkerLink>>,
}

impl CastV2Session {
    #[must_use]
    pub fn new(descriptor: &DeviceDescriptor) -> Self {
        Self {
            host: descriptor.address.to_string(),
            port: descriptor.port,
            key: descriptor.key.clone(),
            worker: Mutex::new(None),
        }
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let sender = self
            .worker
            .lock()
            .await
            .as_ref()
            .map(|link| link.commands.clone())
            .ok_or_else(|| Error::Connect(format!("'{}' is not connected", self.key)))?;

        let (tx, rx) = oneshot::channel();
        sender
            .send(command(tx))
            .map_err(|_| Error::Connect(format!("session to '{}' closed", self.key)))?;

        rx.await
            .map_err(|_| Error::Connect(format!("session to '{}' closed", self.key)))?
    }
}

#[async_trait]
impl CastSession for CastV2Session {
    async fn connect(&self) -> Result<()> {
        let (command_tx, command_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let alive = Arc::new(AtomicBool::new(true));
        let host = self.host.clone();
        let port = self.port;

        std::thread::Builder::new()
            .name(format!("cast-{}", self.key))
            .spawn({
                let alive = alive.clone();
                move || {
                    run_worker(host, port, command_rx, ready_tx);
                    alive.store(false, Ordering::SeqCst);
                }
            })?;

        ready_rx
            .await
            .map_err(|_| Error::Connect(format!("session worker for '{}' exited", self.key)))??;

        // Dropping the previous sender ends the previous worker
        *self.worker.lock().await = Some(WorkerLink {
            commands: command_tx,
            alive,
        });
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.worker
            .lock()
            .await
            .as_ref()
            .is_some_and(|link| link.alive.load(Ordering::SeqCst))
    }

    async fn stop(&self) -> Result<()> {
        self.request(Command::Stop).await
    }

    async fn load(&self, url: &str, content_type: &str) -> Result<()> {
        let url = url.to_string();
        let content_type = content_type.to_string();
        self.request(|reply| Command::Load {
            url,
            content_type,
            reply,
        })
        .await
    }

    async fn status(&self) -> Result<MediaStatus> {
        self.request(Command::Status).await
    }
}

/// Running Default Media Receiver instance
struct MediaApp {
    transport_id: String,
    session_id: String,
}

struct Worker {
    device: CastDevice<'static>,
    app: Option<MediaApp>,
}

fn run_worker(
    host: String,
    port: u16,
    commands: mpsc::Receiver<Command>,
    ready: oneshot::Sender<Result<()>>,
) {
    let mut worker = match Worker::connect(host.clone(), port) {
        Ok(worker) => {
            let _ = ready.send(Ok(()));
            worker
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    loop {
        match commands.recv_timeout(HEARTBEAT_INTERVAL) {
            Ok(Command::Stop(reply)) => {
                let _ = reply.send(worker.stop());
            }
            Ok(Command::Load {
                url,
                content_type,
                reply,
            }) => {
                let _ = reply.send(worker.load(url, content_type));
            }
            Ok(Command::Status(reply)) => {
                let _ = reply.send(worker.status());
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if let Err(e) = worker.heartbeat() {
                    tracing::warn!(host = %host, error = %e, "heartbeat failed, closing session");
                    break;
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    tracing::debug!(host = %host, "cast session worker stopped");
}

impl Worker {
    fn connect(host: String, port: u16) -> Result<Self> {
        let device = CastDevice::connect_without_host_verification(host, port)
            .map_err(|e| Error::Connect(e.to_string()))?;
        device
            .connection
            .connect(PLATFORM_RECEIVER)
            .map_err(|e| Error::Connect(e.to_string()))?;

        Ok(Self { device, app: None })
    }

    /// Ping the receiver and read until its pong
    ///
    /// Media and receiver broadcasts that arrive first are skipped. The read
    /// itself blocks; `rust_cast` keeps the socket private, so callers bound
    /// their wait on the async side.
    fn heartbeat(&self) -> Result<()> {
        self.device
            .heartbeat
            .ping()
            .map_err(|e| Error::Connect(e.to_string()))?;

        for _ in 0..MAX_HEARTBEAT_MESSAGES {
            let message = self
                .device
                .receive()
                .map_err(|e| Error::Connect(e.to_string()))?;

            match beat(&message) {
                Beat::Pong => return Ok(()),
                Beat::Ping => self
                    .device
                    .heartbeat
                    .pong()
                    .map_err(|e| Error::Connect(e.to_string()))?,
                Beat::Closed => {
                    return Err(Error::Connect("receiver closed the connection".to_string()));
                }
                Beat::Other => {}
            }
        }

        Err(Error::Connect(format!(
            "no pong within {MAX_HEARTBEAT_MESSAGES} messages"
        )))
    }

    /// Find the media app already running on the receiver, if any
    fn running_app(&mut self) -> Result<Option<&MediaApp>> {
        if self.app.is_none() {
            let status = self
                .device
                .receiver
                .get_status()
                .map_err(|e| Error::Playback(e.to_string()))?;

            if let Some(app) = status
                .applications
                .into_iter()
                .find(|app| app.app_id == DEFAULT_MEDIA_RECEIVER_ID)
            {
                self.device
                    .connection
                    .connect(app.transport_id.clone())
                    .map_err(|e| Error::Playback(e.to_string()))?;
                self.app = Some(MediaApp {
                    transport_id: app.transport_id,
                    session_id: app.session_id,
                });
            }
        }
        Ok(self.app.as_ref())
    }

    fn stop(&mut self) -> Result<()> {
        let Some(transport_id) = self.running_app()?.map(|app| app.transport_id.clone()) else {
            return Ok(());
        };

        let status = match self.device.media.get_status(transport_id.clone(), None) {
            Ok(status) => status,
            Err(e) => {
                // The app may have been closed from another sender
                tracing::debug!(error = %e, "no media status, nothing to stop");
                self.app = None;
                return Ok(());
            }
        };

        for entry in status.entries {
            self.device
                .media
                .stop(transport_id.clone(), entry.media_session_id)
                .map_err(|e| Error::Playback(e.to_string()))?;
        }
        Ok(())
    }

    fn load(&mut self, url: String, content_type: String) -> Result<()> {
        let app = self
            .device
            .receiver
            .launch_app(&CastDeviceApp::DefaultMediaReceiver)
            .map_err(|e| Error::Playback(format!("failed to launch media receiver: {e}")))?;

        self.device
            .connection
            .connect(app.transport_id.clone())
            .map_err(|e| Error::Playback(e.to_string()))?;

        let media = Media {
            content_id: url,
            content_type,
            stream_type: StreamType::Buffered,
            duration: None,
            metadata: None,
        };

        self.device
            .media
            .load(app.transport_id.clone(), app.session_id.clone(), &media)
            .map_err(|e| Error::Playback(format!("failed to load media: {e}")))?;

        self.app = Some(MediaApp {
            transport_id: app.transport_id,
            session_id: app.session_id,
        });
        Ok(())
    }

    fn status(&mut self) -> Result<MediaStatus> {
        let Some(transport_id) = self.running_app()?.map(|app| app.transport_id.clone()) else {
            return Ok(MediaStatus::idle());
        };

        let status = self
            .device
            .media
            .get_status(transport_id, None)
            .map_err(|e| Error::Playback(e.to_string()))?;

        Ok(status
            .entries
            .into_iter()
            .next()
            .map_or_else(MediaStatus::idle, |entry| MediaStatus {
                player_state: player_state(&entry.player_state),
                idle_reason: entry.idle_reason.as_ref().map(idle_reason),
                content_id: entry.media.map(|m| m.content_id),
            }))
    }
}

/// What a message read during a heartbeat means for the connection
#[derive(Debug, PartialEq, Eq)]
enum Beat {
    Pong,
    Ping,
    Closed,
    Other,
}

const fn beat(message: &ChannelMessage) -> Beat {
    match message {
        ChannelMessage::Heartbeat(HeartbeatResponse::Pong) => Beat::Pong,
        ChannelMessage::Heartbeat(HeartbeatResponse::Ping) => Beat::Ping,
        ChannelMessage::Connection(ConnectionResponse::Close) => Beat::Closed,
        _ => Beat::Other,
    }
}

const fn player_state(state: &media::PlayerState) -> PlayerState {
    match state {
        media::PlayerState::Idle => PlayerState::Idle,
        media::PlayerState::Buffering => PlayerState::Buffering,
        media::PlayerState::Playing => PlayerState::Playing,
        media::PlayerState::Paused => PlayerState::Paused,
    }
}

const fn idle_reason(reason: &media::IdleReason) -> IdleReason {
    match reason {
        media::IdleReason::Cancelled => IdleReason::Cancelled,
        media::IdleReason::Interrupted => IdleReason::Interrupted,
        media::IdleReason::Finished => IdleReason::Finished,
        media::IdleReason::Error => IdleReason::Error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::descriptor;

    #[test]
    fn maps_player_states() {
        assert_eq!(player_state(&media::PlayerState::Playing), PlayerState::Playing);
        assert_eq!(player_state(&media::PlayerState::Idle), PlayerState::Idle);
        assert_eq!(idle_reason(&media::IdleReason::Finished), IdleReason::Finished);
        assert_eq!(idle_reason(&media::IdleReason::Error), IdleReason::Error);
    }

    #[test]
    fn heartbeat_classifies_messages() {
        assert_eq!(beat(&ChannelMessage::Heartbeat(HeartbeatResponse::Pong)), Beat::Pong);
        assert_eq!(beat(&ChannelMessage::Heartbeat(HeartbeatResponse::Ping)), Beat::Ping);
        assert_eq!(beat(&ChannelMessage::Connection(ConnectionResponse::Close)), Beat::Closed);
        assert_eq!(beat(&ChannelMessage::Connection(ConnectionResponse::Connect)), Beat::Other);
    }

    #[tokio::test]
    async fn commands_before_connect_fail() {
        let session = CastV2Session::new(&descriptor("Kitchen"));
        assert!(!session.is_connected().await);
        let err = session.status().await.unwrap_err();
        assert!(matches!(err, Error::Connect(msg) if msg.contains("not connected")));
    }

    #[tokio::test]
    async fn exited_worker_is_not_connected() {
        let session = CastV2Session::new(&descriptor("Kitchen"));
        let (commands, _rx) = mpsc::channel();
        *session.worker.lock().await = Some(WorkerLink {
            commands,
            alive: Arc::new(AtomicBool::new(true)),
        });
        assert!(session.is_connected().await);

        if let Some(link) = session.worker.lock().await.as_ref() {
            link.alive.store(false, Ordering::SeqCst);
        }
        assert!(!session.is_connected().await);
    }

    #[test]
    fn session_targets_descriptor_address() {
        let session = CastV2Session::new(&descriptor("Kitchen"));
        assert_eq!(session.host, "192.168.1.20");
        assert_eq!(session.port, 8009);
    }
}
