//! On-disk cache of recorded speech

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::SpeechRequest;
use crate::Result;
use crate::cast::slugify;
use crate::tts::SpeechSynthesizer;

/// Recorded speech, keyed by text, language and speed
///
/// Entries are never evicted.
#[derive(Clone)]
pub struct SpeechCache {
    dir: PathBuf,
    synthesizer: Arc<dyn SpeechSynthesizer>,
}

impl SpeechCache {
    #[must_use]
    pub fn new(dir: PathBuf, synthesizer: Arc<dyn SpeechSynthesizer>) -> Self {
        Self { dir, synthesizer }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Deterministic file name for a request
    #[must_use]
    pub fn filename(request: &SpeechRequest) -> String {
        let key = format!("{}-{}-{}", request.text, request.lang, request.slow);
        format!("{}.mp3", slugify(&key))
    }

    /// Make sure the recording exists, synthesizing it if needed
    ///
    /// Returns the file name within the cache directory. Audio is written
    /// to a uniquely named temporary file and renamed into place, so a
    /// reader never sees a partial file.
    ///
    /// # Errors
    ///
    /// Returns error if synthesis or the file write fails
    pub async fn ensure(&self, request: &SpeechRequest) -> Result<String> {
        let filename = Self::filename(request);
        let path = self.dir.join(&filename);

        if tokio::fs::try_exists(&path).await? {
            tracing::debug!(file = %path.display(), "using recorded speech");
            return Ok(filename);
        }

        tracing::info!(file = %path.display(), "recording speech");
        let audio = self
            .synthesizer
            .synthesize(&request.text, &request.lang, request.slow)
            .await?;

        tokio::fs::create_dir_all(&self.dir).await?;
        let temp = self
            .dir
            .join(format!(".{filename}.{}.tmp", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&temp, &audio).await?;

        if let Err(e) = tokio::fs::rename(&temp, &path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }

        Ok(filename)
    }
}
