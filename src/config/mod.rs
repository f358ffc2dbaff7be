//! Configuration management for the budget assistant

pub mod file;

use std::path::PathBuf;

use secrecy::SecretString;

use file::ConfigFile;

/// Default plan length bound in words
pub const DEFAULT_MAX_WORDS: usize = 150;

/// Budget assistant configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to data directory (database, per-user plan files)
    pub data_dir: PathBuf,

    /// HTTP API server configuration
    pub server: ServerConfig,

    /// Plan generation configuration
    pub llm: LlmConfig,

    /// Speech configuration
    pub voice: VoiceConfig,

    /// Which plan store backs persistence
    pub storage: StorageBackend,

    /// Identity provider base URL for JWT validation
    pub auth_base_url: Option<String>,

    /// API keys
    pub api_keys: ApiKeys,
}

/// HTTP API server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,

    /// Shared bearer token (local deployments without an identity provider)
    pub api_token: Option<SecretString>,

    /// Process-wide requests per minute; `None` disables limiting
    pub rate_limit: Option<u32>,

    /// Path to static files directory (web UI)
    pub static_dir: Option<PathBuf>,
}

/// Text generation backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlmProvider {
    #[default]
    OpenAi,
    Gemini,
}

impl LlmProvider {
    /// Parse from configuration string, falling back to `OpenAI`
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "gemini" | "google" => Self::Gemini,
            _ => Self::OpenAi,
        }
    }
}

/// Plan generation configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub model: String,
    /// Base URL for OpenAI-compatible endpoints
    pub base_url: String,
    pub max_words: usize,
}

/// Speech synthesis backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TtsProvider {
    #[default]
    OpenAi,
    ElevenLabs,
}

impl TtsProvider {
    /// Parse from configuration string, falling back to `OpenAI`
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "elevenlabs" | "eleven_labs" => Self::ElevenLabs,
            _ => Self::OpenAi,
        }
    }
}

/// Speech recognition backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SttProvider {
    #[default]
    Whisper,
    Deepgram,
}

impl SttProvider {
    /// Parse from configuration string, falling back to Whisper
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "deepgram" => Self::Deepgram,
            _ => Self::Whisper,
        }
    }
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    pub tts_provider: TtsProvider,

    /// TTS model (e.g. "tts-1", "eleven_monolingual_v1")
    pub tts_model: String,

    /// Default voice identifier when the caller does not pick one
    pub tts_voice: String,

    /// TTS speed multiplier (0.25 to 4.0, `OpenAI` only)
    pub tts_speed: f32,

    pub stt_provider: SttProvider,

    /// STT model (e.g. "whisper-1", "nova-2")
    pub stt_model: String,
}

/// Plan store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageBackend {
    #[default]
    Sqlite,
    File,
}

impl StorageBackend {
    /// Parse from configuration string, falling back to `SQLite`
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "file" | "json" | "local" => Self::File,
            _ => Self::Sqlite,
        }
    }
}

/// API keys for external services
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// `OpenAI` API key (generation, Whisper and TTS)
    pub openai: Option<SecretString>,

    /// Google Gemini API key
    pub gemini: Option<SecretString>,

    /// `ElevenLabs` API key (optional TTS)
    pub elevenlabs: Option<SecretString>,

    /// `Deepgram` API key (optional STT)
    pub deepgram: Option<SecretString>,
}

impl Config {
    /// Load configuration from the config file and the process environment
    #[must_use]
    pub fn load() -> Self {
        Self::from_sources(file::load_config_file(), |key| std::env::var(key).ok())
    }

    /// Build configuration from a parsed file and an environment lookup
    ///
    /// Environment values win over file values, which win over defaults.
    pub fn from_sources(file: ConfigFile, env: impl Fn(&str) -> Option<String>) -> Self {
        let pick = |key: &str, fallback: Option<String>| env(key).or(fallback);
        let secret = |key: &str, fallback: Option<String>| {
            pick(key, fallback)
                .filter(|v| !v.is_empty())
                .map(SecretString::from)
        };

        let server = ServerConfig {
            port: pick("BUDGET_PORT", None)
                .and_then(|s| s.parse().ok())
                .or(file.server.port)
                .unwrap_or(8787),
            api_token: secret("BUDGET_API_TOKEN", file.server.api_token),
            rate_limit: pick("BUDGET_RATE_LIMIT", None)
                .and_then(|s| s.parse().ok())
                .or(file.server.rate_limit)
                .filter(|rpm| *rpm > 0),
            static_dir: pick("BUDGET_STATIC_DIR", file.server.static_dir).map(PathBuf::from),
        };

        let provider = pick("BUDGET_LLM_PROVIDER", file.llm.provider)
            .map(|s| LlmProvider::parse(&s))
            .unwrap_or_default();
        let default_model = match provider {
            LlmProvider::OpenAi => "gpt-4o-mini",
            LlmProvider::Gemini => "gemini-1.5-flash",
        };
        let llm = LlmConfig {
            provider,
            model: pick("BUDGET_LLM_MODEL", file.llm.model)
                .unwrap_or_else(|| default_model.to_string()),
            base_url: pick("BUDGET_LLM_BASE_URL", file.llm.base_url)
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            max_words: pick("BUDGET_MAX_WORDS", None)
                .and_then(|s| s.parse().ok())
                .or(file.llm.max_words)
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_MAX_WORDS),
        };

        let tts_provider = pick("BUDGET_TTS_PROVIDER", file.voice.tts_provider)
            .map(|s| TtsProvider::parse(&s))
            .unwrap_or_default();
        let (default_tts_model, default_voice) = match tts_provider {
            TtsProvider::OpenAi => ("tts-1", "alloy"),
            // "Rachel"
            TtsProvider::ElevenLabs => ("eleven_monolingual_v1", "21m00Tcm4TlvDq8ikWAM"),
        };
        let stt_provider = pick("BUDGET_STT_PROVIDER", file.voice.stt_provider)
            .map(|s| SttProvider::parse(&s))
            .unwrap_or_default();
        let default_stt_model = match stt_provider {
            SttProvider::Whisper => "whisper-1",
            SttProvider::Deepgram => "nova-2",
        };
        let voice = VoiceConfig {
            tts_provider,
            tts_model: pick("BUDGET_TTS_MODEL", file.voice.tts_model)
                .unwrap_or_else(|| default_tts_model.to_string()),
            tts_voice: pick("BUDGET_TTS_VOICE", file.voice.tts_voice)
                .unwrap_or_else(|| default_voice.to_string()),
            tts_speed: file.voice.tts_speed.unwrap_or(1.0).clamp(0.25, 4.0),
            stt_provider,
            stt_model: pick("BUDGET_STT_MODEL", file.voice.stt_model)
                .unwrap_or_else(|| default_stt_model.to_string()),
        };

        let storage = pick("BUDGET_STORAGE", file.storage.backend)
            .map(|s| StorageBackend::parse(&s))
            .unwrap_or_default();

        // ~/.local/share/budget-assistant on Linux
        let data_dir = pick("BUDGET_DATA_DIR", file.storage.data_dir).map_or_else(
            || {
                directories::ProjectDirs::from("dev", "budget", "budget-assistant")
                    .map_or_else(|| PathBuf::from("."), |d| d.data_dir().to_path_buf())
            },
            PathBuf::from,
        );

        let api_keys = ApiKeys {
            openai: secret("OPENAI_API_KEY", file.api_keys.openai),
            gemini: secret("GEMINI_API_KEY", file.api_keys.gemini),
            elevenlabs: secret("ELEVENLABS_API_KEY", file.api_keys.elevenlabs),
            deepgram: secret("DEEPGRAM_API_KEY", file.api_keys.deepgram),
        };

        Self {
            data_dir,
            server,
            llm,
            voice,
            storage,
            auth_base_url: pick("AUTH_BASE_URL", file.auth.base_url),
            api_keys,
        }
    }

    /// Path of the `SQLite` database file
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("plans.db")
    }

    /// Ensure the data directory exists
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created
    pub fn ensure_data_dir(&self) -> crate::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_sources(ConfigFile::default(), env_from(&[]));
        assert_eq!(config.server.port, 8787);
        assert_eq!(config.llm.provider, LlmProvider::OpenAi);
        assert_eq!(config.llm.max_words, DEFAULT_MAX_WORDS);
        assert_eq!(config.voice.tts_voice, "alloy");
        assert_eq!(config.voice.stt_model, "whisper-1");
        assert_eq!(config.storage, StorageBackend::Sqlite);
        assert!(config.server.rate_limit.is_none());
        assert!(config.api_keys.openai.is_none());
    }

    #[test]
    fn test_env_overrides_file() {
        let file: ConfigFile = toml::from_str(
            r#"
            [server]
            port = 9000

            [llm]
            provider = "openai"
            model = "from-file"

            [api_keys]
            openai = "file-key"
            "#,
        )
        .unwrap();

        let config = Config::from_sources(
            file,
            env_from(&[
                ("BUDGET_LLM_PROVIDER", "gemini"),
                ("OPENAI_API_KEY", "env-key"),
                ("BUDGET_STORAGE", "file"),
            ]),
        );

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.llm.provider, LlmProvider::Gemini);
        assert_eq!(config.llm.model, "from-file");
        assert_eq!(config.api_keys.openai.unwrap().expose_secret(), "env-key");
        assert_eq!(config.storage, StorageBackend::File);
    }

    #[test]
    fn test_elevenlabs_defaults() {
        let config =
            Config::from_sources(ConfigFile::default(), env_from(&[("BUDGET_TTS_PROVIDER", "elevenlabs")]));
        assert_eq!(config.voice.tts_provider, TtsProvider::ElevenLabs);
        assert_eq!(config.voice.tts_model, "eleven_monolingual_v1");
    }
}
