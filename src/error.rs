//! Error types for the budget assistant

use thiserror::Error;

/// Result type alias for budget assistant operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the budget assistant
///
/// Every variant is scoped to the single user action that produced it;
/// nothing here is fatal to the process.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Missing or malformed form input, caught before any remote call
    #[error("invalid input: {0}")]
    Validation(String),

    /// Plan generation failed or returned empty text
    #[error("generation error: {0}")]
    Generation(String),

    /// Text-to-speech request or playback failed
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Speech recognition reported an error
    #[error("recognition error: {0}")]
    Recognition(String),

    /// Speech recognition is not available in this environment
    #[error("speech recognition unavailable: {0}")]
    RecognitionUnavailable(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Plan storage rejected the operation
    #[error("persistence error: {0}")]
    Persistence(String),

    /// No authenticated identity was supplied
    #[error("not authenticated")]
    Unauthenticated,

    /// Resource not found
    #[error("not found: {0}")]
    NotFound(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// `SQLite` error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl Error {
    /// Short machine-readable code for API responses
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "not_configured",
            Self::Validation(_) => "invalid_input",
            Self::Generation(_) => "generation_failed",
            Self::Synthesis(_) => "synthesis_failed",
            Self::Recognition(_) => "recognition_failed",
            Self::RecognitionUnavailable(_) => "recognition_unavailable",
            Self::Audio(_) => "audio_failed",
            Self::Persistence(_) | Self::Sqlite(_) | Self::Io(_) => "persistence_failed",
            Self::Unauthenticated => "unauthenticated",
            Self::NotFound(_) => "not_found",
            Self::Http(_) => "upstream_failed",
            Self::Serialization(_) | Self::Toml(_) => "bad_data",
        }
    }
}
