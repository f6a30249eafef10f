//! Receiver-reachable URLs for media references
//!
//! Receivers only fetch media reliably from IP-literal URLs, so the host a
//! request came in on is resolved before it is embedded in a media URL.

use std::net::{IpAddr, SocketAddr};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use super::{MediaReference, RECORDINGS_DIR, SpeechCache, SpeechRequest, content_type_for};
use crate::tts::{self, SpeechSynthesizer};
use crate::{Error, Result};

/// Scheme and `host[:port]` a request was addressed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub scheme: String,
    pub netloc: String,
}

impl Origin {
    #[must_use]
    pub fn new(scheme: impl Into<String>, netloc: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            netloc: netloc.into(),
        }
    }
}

/// A playable URL and the content type to announce for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMedia {
    pub url: String,
    pub content_type: &'static str,
}

/// Replace the host in `host[:port]` with an IP address
///
/// IPv4 addresses are preferred. IP literals are returned unchanged.
///
/// # Errors
///
/// Returns `Resolution` if the host has no address
pub async fn resolve_netloc(netloc: &str) -> Result<String> {
    let (host, port) = split_netloc(netloc);

    let ip = match host.parse::<IpAddr>() {
        Ok(ip) => ip,
        Err(_) => lookup(host).await?,
    };

    let resolved = match port {
        Some(port) => format!("{}:{port}", bracketed(ip)),
        None => bracketed(ip),
    };
    tracing::debug!(netloc, resolved = %resolved, "resolved hostname");
    Ok(resolved)
}

fn split_netloc(netloc: &str) -> (&str, Option<&str>) {
    if let Some(rest) = netloc.strip_prefix('[') {
        if let Some((host, after)) = rest.split_once(']') {
            return (host, after.strip_prefix(':'));
        }
    }
    match netloc.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => (host, Some(port)),
        _ => (netloc, None),
    }
}

fn bracketed(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => format!("[{v6}]"),
    }
}

async fn lookup(host: &str) -> Result<IpAddr> {
    let addresses: Vec<IpAddr> = tokio::net::lookup_host((host, 0))
        .await
        .map_err(|e| Error::Resolution(format!("{host}: {e}")))?
        .map(|addr: SocketAddr| addr.ip())
        .collect();

    addresses
        .iter()
        .find(|ip| ip.is_ipv4())
        .or_else(|| addresses.first())
        .copied()
        .ok_or_else(|| Error::Resolution(host.to_string()))
}

/// Builds URLs for files under the static root and for speech
#[derive(Clone)]
pub struct MediaResolver {
    static_dir: PathBuf,
    route_prefix: String,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    cache: SpeechCache,
}

impl MediaResolver {
    #[must_use]
    pub fn new(
        static_dir: PathBuf,
        route_prefix: impl Into<String>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        let cache = SpeechCache::new(static_dir.join(RECORDINGS_DIR), synthesizer.clone());
        Self {
            static_dir,
            route_prefix: route_prefix.into(),
            synthesizer,
            cache,
        }
    }

    /// Resolve any media reference to a playable URL
    ///
    /// # Errors
    ///
    /// Returns `Resolution` if the origin host cannot be resolved,
    /// `UnsupportedLanguage` for speech in an unknown language, or a
    /// synthesis error when recording fails
    pub async fn resolve(&self, origin: &Origin, reference: &MediaReference) -> Result<ResolvedMedia> {
        let resolved = match reference {
            MediaReference::File(filename) => ResolvedMedia {
                url: self.file_url(origin, filename).await?,
                content_type: content_type_for(filename),
            },
            MediaReference::LiveSpeech(request) => ResolvedMedia {
                url: self.live_speech_url(origin, request).await?,
                content_type: super::DEFAULT_CONTENT_TYPE,
            },
            MediaReference::RecordedSpeech(request) => ResolvedMedia {
                url: self.recorded_speech_url(origin, request).await?,
                content_type: super::DEFAULT_CONTENT_TYPE,
            },
        };
        tracing::info!(url = %resolved.url, "resolved media");
        Ok(resolved)
    }

    /// URL of a static file, or `filename` unchanged if no such file exists
    ///
    /// # Errors
    ///
    /// Returns `Resolution` if the origin host cannot be resolved
    pub async fn file_url(&self, origin: &Origin, filename: &str) -> Result<String> {
        match self.static_segments(filename).await {
            Some(segments) => Ok(static_url(&self.base_url(origin).await?, &segments)),
            None => {
                tracing::debug!(filename, "not a static file, passing through");
                Ok(filename.to_string())
            }
        }
    }

    /// URL that synthesizes speech when fetched
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedLanguage` or `Resolution`
    pub async fn live_speech_url(&self, origin: &Origin, request: &SpeechRequest) -> Result<String> {
        tts::ensure_supported(self.synthesizer.as_ref(), &request.lang)?;
        Ok(format!(
            "{}/tts/?text={}&lang={}&slow={}",
            self.base_url(origin).await?,
            urlencoding::encode(&request.text),
            urlencoding::encode(&request.lang),
            request.slow
        ))
    }

    /// URL of a recording of the speech, recording it first if needed
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedLanguage`, `Resolution`, or a synthesis error
    pub async fn recorded_speech_url(&self, origin: &Origin, request: &SpeechRequest) -> Result<String> {
        tts::ensure_supported(self.synthesizer.as_ref(), &request.lang)?;
        let base = self.base_url(origin).await?;
        let filename = self.cache.ensure(request).await?;
        Ok(static_url(&base, &[RECORDINGS_DIR.to_string(), filename]))
    }

    async fn base_url(&self, origin: &Origin) -> Result<String> {
        Ok(format!(
            "{}://{}{}",
            origin.scheme,
            resolve_netloc(&origin.netloc).await?,
            self.route_prefix
        ))
    }

    /// Path segments of `filename` if it names a file under the static root
    async fn static_segments(&self, filename: &str) -> Option<Vec<String>> {
        let relative = Path::new(filename);
        let mut segments = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => segments.push(part.to_str()?.to_string()),
                Component::CurDir => {}
                _ => return None,
            }
        }
        if segments.is_empty() {
            return None;
        }

        let metadata = tokio::fs::metadata(self.static_dir.join(relative)).await.ok()?;
        metadata.is_file().then_some(segments)
    }
}

fn static_url(base: &str, segments: &[String]) -> String {
    let path: Vec<_> = segments
        .iter()
        .map(|s| urlencoding::encode(s).into_owned())
        .collect();
    format!("{base}/static/{}", path.join("/"))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::testing::FakeSynthesizer;

    fn origin() -> Origin {
        Origin::new("http", "10.0.0.1:8000")
    }

    fn resolver(dir: &Path, prefix: &str) -> (MediaResolver, Arc<FakeSynthesizer>) {
        let synthesizer = Arc::new(FakeSynthesizer::new());
        let resolver = MediaResolver::new(dir.to_path_buf(), prefix, synthesizer.clone());
        (resolver, synthesizer)
    }

    #[tokio::test]
    async fn ip_literals_pass_through() {
        assert_eq!(resolve_netloc("10.0.0.1:8000").await.unwrap(), "10.0.0.1:8000");
        assert_eq!(resolve_netloc("10.0.0.1").await.unwrap(), "10.0.0.1");
        assert_eq!(resolve_netloc("[::1]:8000").await.unwrap(), "[::1]:8000");
    }

    #[tokio::test]
    async fn localhost_resolves_to_ipv4() {
        assert_eq!(resolve_netloc("localhost:8000").await.unwrap(), "127.0.0.1:8000");
    }

    #[tokio::test]
    async fn unknown_host_is_resolution_error() {
        let err = resolve_netloc("no-such-host.invalid:8000").await.unwrap_err();
        assert!(matches!(err, Error::Resolution(_)));
    }

    #[test]
    fn splits_netloc() {
        assert_eq!(split_netloc("host:80"), ("host", Some("80")));
        assert_eq!(split_netloc("host"), ("host", None));
        assert_eq!(split_netloc("[fe80::1]:80"), ("fe80::1", Some("80")));
        assert_eq!(split_netloc("fe80::1"), ("fe80::1", None));
    }

    #[tokio::test]
    async fn existing_static_file_gets_static_url() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("song.mp3"), b"mp3").unwrap();
        let (resolver, _) = resolver(dir.path(), "");

        let url = resolver.file_url(&origin(), "song.mp3").await.unwrap();
        assert_eq!(url, "http://10.0.0.1:8000/static/song.mp3");
    }

    #[tokio::test]
    async fn static_url_encodes_segments_and_prefix() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("chimes")).unwrap();
        std::fs::write(dir.path().join("chimes/door bell.mp3"), b"mp3").unwrap();
        let (resolver, _) = resolver(dir.path(), "/cast-api");

        let url = resolver.file_url(&origin(), "chimes/door bell.mp3").await.unwrap();
        assert_eq!(url, "http://10.0.0.1:8000/cast-api/static/chimes/door%20bell.mp3");
    }

    #[tokio::test]
    async fn missing_file_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let (resolver, _) = resolver(dir.path(), "");

        let url = resolver
            .file_url(&origin(), "http://radio.example/stream.mp3")
            .await
            .unwrap();
        assert_eq!(url, "http://radio.example/stream.mp3");
    }

    #[tokio::test]
    async fn parent_paths_are_never_static() {
        let dir = tempfile::tempdir().unwrap();
        let inner = dir.path().join("static");
        std::fs::create_dir(&inner).unwrap();
        std::fs::write(dir.path().join("secret.mp3"), b"mp3").unwrap();
        let (resolver, _) = resolver(&inner, "");

        let url = resolver.file_url(&origin(), "../secret.mp3").await.unwrap();
        assert_eq!(url, "../secret.mp3");
    }

    #[tokio::test]
    async fn live_speech_url_encodes_query() {
        let dir = tempfile::tempdir().unwrap();
        let (resolver, synthesizer) = resolver(dir.path(), "");
        let request = SpeechRequest::new("Dinner is ready & hot", None, true);

        let url = resolver.live_speech_url(&origin(), &request).await.unwrap();
        assert_eq!(
            url,
            "http://10.0.0.1:8000/tts/?text=Dinner%20is%20ready%20%26%20hot&lang=en&slow=true"
        );
        assert_eq!(synthesizer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn recorded_speech_points_at_recordings() {
        let dir = tempfile::tempdir().unwrap();
        let (resolver, synthesizer) = resolver(dir.path(), "");
        let request = SpeechRequest::new("hello", None, false);

        let url = resolver.recorded_speech_url(&origin(), &request).await.unwrap();
        assert_eq!(url, "http://10.0.0.1:8000/static/recordings/hello-en-false.mp3");
        assert!(dir.path().join("recordings/hello-en-false.mp3").is_file());

        resolver.recorded_speech_url(&origin(), &request).await.unwrap();
        assert_eq!(synthesizer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unsupported_language_fails_before_synthesis() {
        let dir = tempfile::tempdir().unwrap();
        let (resolver, synthesizer) = resolver(dir.path(), "");
        let request = SpeechRequest::new("hello", Some("xx".into()), false);

        let err = resolver
            .recorded_speech_url(&origin(), &request)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedLanguage(lang) if lang == "xx"));
        assert_eq!(synthesizer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn resolve_picks_content_type() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("chime.wav"), b"wav").unwrap();
        let (resolver, _) = resolver(dir.path(), "");

        let media = resolver
            .resolve(&origin(), &MediaReference::File("chime.wav".into()))
            .await
            .unwrap();
        assert_eq!(media.content_type, "audio/wav");

        let media = resolver
            .resolve(
                &origin(),
                &MediaReference::LiveSpeech(SpeechRequest::new("hi", None, false)),
            )
            .await
            .unwrap();
        assert_eq!(media.content_type, "audio/mp3");
    }
}
