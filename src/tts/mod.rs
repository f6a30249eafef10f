//! Text-to-speech (TTS) synthesis

pub mod langs;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::config::{TtsBackend, TtsConfig};
use crate::{Error, Result};

/// Google Translate speech endpoint
const GOOGLE_TTS_URL: &str = "https://translate.google.com/translate_tts";

/// Longest text the Google endpoint accepts per request
const GOOGLE_MAX_CHUNK: usize = 100;

/// `OpenAI` speech endpoint
const OPENAI_TTS_URL: &str = "https://api.openai.com/v1/audio/speech";

/// Produces MP3 audio from text
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` in `lang`, at reduced speed when `slow`
    async fn synthesize(&self, text: &str, lang: &str, slow: bool) -> Result<Vec<u8>>;

    /// Language code → display name
    fn supported_languages(&self) -> BTreeMap<&'static str, &'static str>;
}

/// Fail unless `lang` is offered by `synthesizer`
///
/// # Errors
///
/// Returns `UnsupportedLanguage` for unknown codes
pub fn ensure_supported(synthesizer: &dyn SpeechSynthesizer, lang: &str) -> Result<()> {
    if synthesizer.supported_languages().contains_key(lang) {
        Ok(())
    } else {
        Err(Error::UnsupportedLanguage(lang.to_string()))
    }
}

/// TTS provider backend
#[derive(Clone, Copy, Debug)]
enum TtsProvider {
    Google,
    OpenAI,
}

/// Synthesizes speech over HTTP
pub struct TextToSpeech {
    client: reqwest::Client,
    api_key: String,
    voice: String,
    model: String,
    provider: TtsProvider,
}

impl TextToSpeech {
    /// Create a TTS instance using the keyless Google endpoint
    #[must_use]
    pub fn new_google() -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: String::new(),
            voice: String::new(),
            model: String::new(),
            provider: TtsProvider::Google,
        }
    }

    /// Create a TTS instance using `OpenAI`
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_openai(api_key: String, voice: String) -> Result<Self> {
        Self::new_openai_with_model(api_key, voice, "tts-1".to_string())
    }

    /// Create a TTS instance using `OpenAI` with custom model
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_openai_with_model(api_key: String, voice: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("OpenAI API key required for TTS".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            voice,
            model,
            provider: TtsProvider::OpenAI,
        })
    }

    /// Create the backend selected by configuration
    ///
    /// # Errors
    ///
    /// Returns error if the `OpenAI` backend is selected without a key
    pub fn from_config(config: &TtsConfig) -> Result<Self> {
        match config.backend {
            TtsBackend::Google => Ok(Self::new_google()),
            TtsBackend::OpenAi => Self::new_openai(
                config.openai_api_key.clone().unwrap_or_default(),
                config.voice.clone(),
            ),
        }
    }

    /// Synthesize using the Google Translate endpoint
    ///
    /// Long text is sent in chunks and the MP3 frames concatenated.
    async fn synthesize_google(&self, text: &str, lang: &str, slow: bool) -> Result<Vec<u8>> {
        let chunks = split_chunks(text, GOOGLE_MAX_CHUNK);
        let total = chunks.len().to_string();
        let speed = if slow { "0.3" } else { "1" };
        let mut audio = Vec::new();

        for (idx, chunk) in chunks.iter().enumerate() {
            let url = url::Url::parse_with_params(
                GOOGLE_TTS_URL,
                &[
                    ("ie", "UTF-8"),
                    ("client", "tw-ob"),
                    ("q", chunk.as_str()),
                    ("tl", lang),
                    ("ttsspeed", speed),
                    ("total", total.as_str()),
                    ("idx", idx.to_string().as_str()),
                    ("textlen", chunk.chars().count().to_string().as_str()),
                ],
            )
            .map_err(|e| Error::Tts(format!("invalid TTS URL: {e}")))?;

            let response = self.client.get(url).send().await?;
            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(Error::Tts(format!("Google TTS error {status}: {body}")));
            }
            audio.extend_from_slice(&response.bytes().await?);
        }

        tracing::debug!(chunks = chunks.len(), bytes = audio.len(), "synthesized speech");
        Ok(audio)
    }

    /// Synthesize using `OpenAI` TTS
    async fn synthesize_openai(&self, text: &str, slow: bool) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
        }

        let request = TtsRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            speed: if slow { 0.75 } else { 1.0 },
        };

        let response = self
            .client
            .post(OPENAI_TTS_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("OpenAI TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }
}

#[async_trait]
impl SpeechSynthesizer for TextToSpeech {
    async fn synthesize(&self, text: &str, lang: &str, slow: bool) -> Result<Vec<u8>> {
        if text.trim().is_empty() {
            return Err(Error::Tts("nothing to synthesize".to_string()));
        }
        match self.provider {
            TtsProvider::Google => self.synthesize_google(text, lang, slow).await,
            TtsProvider::OpenAI => self.synthesize_openai(text, slow).await,
        }
    }

    fn supported_languages(&self) -> BTreeMap<&'static str, &'static str> {
        langs::languages()
    }
}

/// Split text on whitespace into chunks of at most `max` characters
///
/// Words longer than `max` are split mid-word.
fn split_chunks(text: &str, max: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();

        if word_len > max {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let chars: Vec<char> = word.chars().collect();
            chunks.extend(chars.chunks(max).map(|c| c.iter().collect::<String>()));
            continue;
        }

        let needed = if current.is_empty() { word_len } else { current_len + 1 + word_len };
        if needed > max {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeSynthesizer;

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(split_chunks("Dinner is ready", 100), vec!["Dinner is ready"]);
    }

    #[test]
    fn chunks_respect_limit() {
        let text = "word ".repeat(60);
        let chunks = split_chunks(&text, 100);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 100));
        assert_eq!(chunks.join(" "), text.trim());
    }

    #[test]
    fn long_words_are_split() {
        let word = "a".repeat(250);
        let chunks = split_chunks(&word, 100);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].len(), 50);
    }

    #[test]
    fn empty_text_has_no_chunks() {
        assert!(split_chunks("   ", 100).is_empty());
    }

    #[test]
    fn openai_requires_key() {
        let result = TextToSpeech::new_openai(String::new(), "alloy".to_string());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn config_selects_backend() {
        let config = TtsConfig {
            backend: TtsBackend::OpenAi,
            openai_api_key: None,
            voice: "alloy".to_string(),
        };
        assert!(TextToSpeech::from_config(&config).is_err());
        assert!(TextToSpeech::from_config(&TtsConfig::default()).is_ok());
    }

    #[tokio::test]
    async fn empty_text_is_rejected_before_any_request() {
        let tts = TextToSpeech::new_google();
        assert!(matches!(tts.synthesize("  ", "en", false).await, Err(Error::Tts(_))));
    }

    #[test]
    fn ensure_supported_checks_table() {
        let synthesizer = FakeSynthesizer::new();
        assert!(ensure_supported(&synthesizer, "sv").is_ok());
        assert!(matches!(
            ensure_supported(&synthesizer, "xx"),
            Err(Error::UnsupportedLanguage(_))
        ));
    }
}
