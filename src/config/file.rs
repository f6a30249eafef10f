//! TOML configuration file loading
//!
//! Supports `~/.config/omni/cast-gateway/config.toml` (or the path in
//! `CAST_CONFIG`) as a persistent config source. All fields are optional;
//! the file is a partial overlay on top of defaults.

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct CastConfigFile {
    /// Deployment environment label (e.g. "dev", "prod")
    #[serde(default)]
    pub environment: Option<String>,

    /// External base path prepended to URLs handed to receivers
    #[serde(default)]
    pub route_prefix: Option<String>,

    /// Server/runtime configuration
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Discovery and playback timing
    #[serde(default)]
    pub cast: CastFileConfig,

    /// Speech synthesis configuration
    #[serde(default)]
    pub tts: TtsFileConfig,
}

/// Server/runtime configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// Bind address
    pub host: Option<String>,

    /// API server port
    pub port: Option<u16>,

    /// Static resource root
    pub static_dir: Option<String>,

    /// Populate the device registry at startup
    pub preload_devices: Option<bool>,
}

/// Discovery and playback timing, in seconds
#[derive(Debug, Default, Deserialize)]
pub struct CastFileConfig {
    pub discovery_timeout_secs: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
    pub playback_timeout_secs: Option<u64>,
}

/// Speech synthesis configuration
#[derive(Debug, Default, Deserialize)]
pub struct TtsFileConfig {
    /// Provider name ("google" or "openai")
    pub provider: Option<String>,

    /// `OpenAI` API key
    pub openai_api_key: Option<String>,

    /// `OpenAI` voice identifier
    pub voice: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `CastConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> CastConfigFile {
    let Some(path) = config_file_path() else {
        return CastConfigFile::default();
    };

    if !path.exists() {
        return CastConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                CastConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            CastConfigFile::default()
        }
    }
}

/// Return the config file path: `CAST_CONFIG`, else `~/.config/omni/cast-gateway/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("CAST_CONFIG") {
        return Some(PathBuf::from(path));
    }

    directories::BaseDirs::new().map(|d| {
        d.config_dir()
            .join("omni")
            .join("cast-gateway")
            .join("config.toml")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_file() {
        let content = r#"
            environment = "prod"

            [server]
            port = 9000

            [tts]
            provider = "openai"
        "#;

        let fc: CastConfigFile = toml::from_str(content).unwrap();
        assert_eq!(fc.environment.as_deref(), Some("prod"));
        assert_eq!(fc.server.port, Some(9000));
        assert!(fc.server.static_dir.is_none());
        assert_eq!(fc.tts.provider.as_deref(), Some("openai"));
        assert!(fc.cast.playback_timeout_secs.is_none());
    }

    #[test]
    fn empty_file_is_default() {
        let fc: CastConfigFile = toml::from_str("").unwrap();
        assert!(fc.route_prefix.is_none());
        assert!(fc.server.port.is_none());
    }
}
