//! Media references and the URLs receivers fetch them from

pub mod cache;
pub mod resolver;

pub use cache::SpeechCache;
pub use resolver::{MediaResolver, Origin, ResolvedMedia, resolve_netloc};

use std::path::Path;

use serde::Deserialize;

/// Subdirectory of the static root holding recorded speech
pub const RECORDINGS_DIR: &str = "recordings";

/// Content type used when nothing better is known
pub const DEFAULT_CONTENT_TYPE: &str = "audio/mp3";

/// Language used when a speech request names none
pub const DEFAULT_LANG: &str = "en";

/// Something a receiver can be asked to play
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaReference {
    /// A file under the static root, or an opaque URL passed through as-is
    File(String),
    /// Speech synthesized when the receiver fetches it
    LiveSpeech(SpeechRequest),
    /// Speech synthesized once and kept under the recordings directory
    RecordedSpeech(SpeechRequest),
}

/// Text to synthesize
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SpeechRequest {
    pub text: String,
    #[serde(default = "default_lang")]
    pub lang: String,
    #[serde(default)]
    pub slow: bool,
}

fn default_lang() -> String {
    DEFAULT_LANG.to_string()
}

impl SpeechRequest {
    #[must_use]
    pub fn new(text: impl Into<String>, lang: Option<String>, slow: bool) -> Self {
        Self {
            text: text.into(),
            lang: lang
                .filter(|l| !l.is_empty())
                .unwrap_or_else(default_lang),
            slow,
        }
    }
}

/// Guess a content type from a file name's extension
#[must_use]
pub fn content_type_for(path: &str) -> &'static str {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase);

    match ext.as_deref() {
        Some("m4a") => "audio/mp4",
        Some("aac") => "audio/aac",
        Some("ogg" | "oga") => "audio/ogg",
        Some("flac") => "audio/flac",
        Some("wav") => "audio/wav",
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        _ => DEFAULT_CONTENT_TYPE,
    }
}
