//! TOML configuration file loading
//!
//! Supports `~/.config/budget-assistant/config.toml` as a persistent config
//! source. All fields are optional; the file is a partial overlay on top of
//! defaults, and environment variables override it.

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerFileConfig,

    #[serde(default)]
    pub llm: LlmFileConfig,

    #[serde(default)]
    pub voice: VoiceFileConfig,

    #[serde(default)]
    pub storage: StorageFileConfig,

    #[serde(default)]
    pub auth: AuthFileConfig,

    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,
}

/// HTTP server configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    pub port: Option<u16>,
    /// Shared bearer token accepted in place of an identity provider JWT
    pub api_token: Option<String>,
    /// Requests per minute across the whole process
    pub rate_limit: Option<u32>,
    /// Directory with the browser front-end
    pub static_dir: Option<String>,
}

/// Plan generation configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// "openai" or "gemini"
    pub provider: Option<String>,
    pub model: Option<String>,
    /// Base URL for OpenAI-compatible endpoints
    pub base_url: Option<String>,
    /// Upper bound on plan length in words
    pub max_words: Option<usize>,
}

/// Speech configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// "openai" or "elevenlabs"
    pub tts_provider: Option<String>,
    pub tts_model: Option<String>,
    pub tts_voice: Option<String>,
    pub tts_speed: Option<f32>,
    /// "whisper" or "deepgram"
    pub stt_provider: Option<String>,
    pub stt_model: Option<String>,
}

/// Plan storage configuration
#[derive(Debug, Default, Deserialize)]
pub struct StorageFileConfig {
    /// "sqlite" or "file"
    pub backend: Option<String>,
    pub data_dir: Option<String>,
}

/// Identity provider configuration
#[derive(Debug, Default, Deserialize)]
pub struct AuthFileConfig {
    /// Base URL of the OIDC issuer used to validate JWTs
    pub base_url: Option<String>,
}

/// API keys for external services
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
    pub gemini: Option<String>,
    pub elevenlabs: Option<String>,
    pub deepgram: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `ConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> ConfigFile {
    let Some(path) = config_file_path() else {
        return ConfigFile::default();
    };

    if !path.exists() {
        return ConfigFile::default();
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
                ConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read config file");
            ConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/budget-assistant/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("budget-assistant").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_partial_file() {
        let file: ConfigFile = toml::from_str(
            r#"
            [llm]
            provider = "gemini"
            max_words = 120

            [voice]
            tts_voice = "nova"
            "#,
        )
        .unwrap();

        assert_eq!(file.llm.provider.as_deref(), Some("gemini"));
        assert_eq!(file.llm.max_words, Some(120));
        assert_eq!(file.voice.tts_voice.as_deref(), Some("nova"));
        assert!(file.server.port.is_none());
        assert!(file.api_keys.openai.is_none());
    }
}
