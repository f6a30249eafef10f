//! Cast Gateway - play media and speech on Cast receivers over HTTP
//!
//! This library provides the core functionality for the gateway:
//! - Receiver discovery over mDNS and a cached device registry
//! - Cast v2 sessions driven through stop, load and confirm
//! - Receiver-reachable media URLs, including synthesized speech
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    HTTP API                          │
//! │   /cast/devices  │  /cast/{device}/say  │  /tts     │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │   Device Registry  │  Media Resolver  │  TTS         │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │   Discovery (mDNS)  │  Connector  │  Dispatcher      │
//! │                 Cast v2 sessions                     │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod cast;
pub mod config;
pub mod error;
pub mod media;
pub mod testing;
pub mod tts;

pub use cast::{DeviceDescriptor, DeviceHandle, DeviceRegistry, DeviceState, PlaybackDispatcher};
pub use config::Config;
pub use error::{Error, Result};
pub use media::{MediaReference, MediaResolver, SpeechRequest};
pub use tts::{SpeechSynthesizer, TextToSpeech};
