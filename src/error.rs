//! Error types for the cast gateway

use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the cast gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Named device is not in the registry, or did not advertise in time
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// Network discovery failed entirely
    #[error("discovery error: {0}")]
    Discovery(String),

    /// Session handshake with a receiver failed or timed out
    #[error("connection error: {0}")]
    Connect(String),

    /// Media never became active on the receiver
    #[error("playback error: {0}")]
    Playback(String),

    /// Hostname could not be resolved to an IP address
    #[error("could not resolve host: {0}")]
    Resolution(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Language code not offered by the synthesis provider
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}
