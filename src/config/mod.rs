//! Configuration management for the cast gateway

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use crate::{Error, Result};

pub use file::{CastConfigFile, load_config_file};

/// Default API server port
pub const DEFAULT_PORT: u16 = 8000;

/// Cast gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Deployment environment label (`ENVIRONMENT`)
    pub environment: String,

    /// External base path prepended to URLs handed to receivers (`ROUTE_PREFIX`)
    pub route_prefix: String,

    /// Reported service version (`VERSION`)
    pub version: String,

    /// HTTP API server configuration
    pub api_server: ApiServerConfig,

    /// Discovery, connect and playback timing
    pub cast: CastConfig,

    /// Speech synthesis configuration
    pub tts: TtsConfig,
}

/// HTTP API server configuration
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Address to bind
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Root directory for static media and recorded speech
    pub static_dir: PathBuf,

    /// Populate the device registry at startup instead of on first request
    pub preload_devices: bool,
}

/// Discovery, connect and playback timing
#[derive(Debug, Clone)]
pub struct CastConfig {
    /// mDNS listening window for a discovery pass
    pub discovery_timeout: Duration,

    /// Upper bound on a session handshake
    pub connect_timeout: Duration,

    /// Upper bound on waiting for loaded media to become active
    pub playback_timeout: Duration,
}

impl Default for CastConfig {
    fn default() -> Self {
        Self {
            discovery_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
            playback_timeout: Duration::from_secs(10),
        }
    }
}

/// Speech synthesis backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TtsBackend {
    /// Google Translate speech endpoint (no key required)
    #[default]
    Google,
    /// `OpenAI` speech API
    OpenAi,
}

impl std::str::FromStr for TtsBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "google" | "gtts" => Ok(Self::Google),
            "openai" => Ok(Self::OpenAi),
            other => Err(Error::Config(format!("unknown TTS provider '{other}'"))),
        }
    }
}

/// Speech synthesis configuration
#[derive(Debug, Clone)]
pub struct TtsConfig {
    pub backend: TtsBackend,

    /// `OpenAI` API key, required for the `OpenAI` backend
    pub openai_api_key: Option<String>,

    /// `OpenAI` voice identifier
    pub voice: String,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            backend: TtsBackend::Google,
            openai_api_key: None,
            voice: "alloy".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: "dev".to_string(),
            route_prefix: String::new(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            api_server: ApiServerConfig {
                host: "0.0.0.0".to_string(),
                port: DEFAULT_PORT,
                static_dir: PathBuf::from("static"),
                preload_devices: true,
            },
            cast: CastConfig::default(),
            tts: TtsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration (env > toml > default)
    ///
    /// # Errors
    ///
    /// Returns error if a value is present but invalid
    pub fn load() -> Result<Self> {
        tracing::info!("loading config settings from the environment");
        let fc = load_config_file();
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Build configuration from a parsed config file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if a value is present but invalid
    pub fn from_sources<F>(fc: CastConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let environment = env("ENVIRONMENT")
            .or(fc.environment)
            .unwrap_or(defaults.environment);
        // Test runs discover lazily unless preloading is asked for explicitly
        let testing = env("TESTING").is_some_and(|v| is_truthy(&v));
        let route_prefix = normalize_prefix(
            &env("ROUTE_PREFIX")
                .or(fc.route_prefix)
                .unwrap_or(defaults.route_prefix),
        );
        let version = env("VERSION").unwrap_or(defaults.version);

        let port = match env("CAST_PORT").or_else(|| env("PORT")) {
            Some(raw) => raw
                .parse()
                .map_err(|_| Error::Config(format!("invalid port '{raw}'")))?,
            None => fc.server.port.unwrap_or(defaults.api_server.port),
        };

        let api_server = ApiServerConfig {
            host: env("CAST_HOST")
                .or(fc.server.host)
                .unwrap_or(defaults.api_server.host),
            port,
            static_dir: env("CAST_STATIC_DIR")
                .or(fc.server.static_dir)
                .map_or(defaults.api_server.static_dir, PathBuf::from),
            preload_devices: env("CAST_PRELOAD_DEVICES")
                .map(|v| is_truthy(&v))
                .or(fc.server.preload_devices)
                .unwrap_or(!testing && defaults.api_server.preload_devices),
        };

        let cast = CastConfig {
            discovery_timeout: seconds(
                &env,
                "CAST_DISCOVERY_TIMEOUT_SECS",
                fc.cast.discovery_timeout_secs,
                defaults.cast.discovery_timeout,
            )?,
            connect_timeout: seconds(
                &env,
                "CAST_CONNECT_TIMEOUT_SECS",
                fc.cast.connect_timeout_secs,
                defaults.cast.connect_timeout,
            )?,
            playback_timeout: seconds(
                &env,
                "CAST_PLAYBACK_TIMEOUT_SECS",
                fc.cast.playback_timeout_secs,
                defaults.cast.playback_timeout,
            )?,
        };

        let backend = env("CAST_TTS_PROVIDER")
            .or(fc.tts.provider)
            .map(|s| s.parse::<TtsBackend>())
            .transpose()?
            .unwrap_or_default();

        let tts = TtsConfig {
            backend,
            openai_api_key: env("OPENAI_API_KEY").or(fc.tts.openai_api_key),
            voice: env("CAST_TTS_VOICE")
                .or(fc.tts.voice)
                .unwrap_or(defaults.tts.voice),
        };

        Ok(Self {
            environment,
            route_prefix,
            version,
            api_server,
            cast,
            tts,
        })
    }
}

fn is_truthy(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

/// Strip trailing slashes and ensure a leading one; "" and "/" mean no prefix
fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

fn seconds<F>(env: &F, key: &str, file_value: Option<u64>, default: Duration) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    match env(key) {
        Some(raw) => raw
            .parse()
            .map(Duration::from_secs)
            .map_err(|_| Error::Config(format!("invalid {key} '{raw}'"))),
        None => Ok(file_value.map_or(default, Duration::from_secs)),
    }
}
