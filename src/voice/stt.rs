//! Speech-to-text (STT) processing

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};

use crate::config::{Config, SttProvider};
use crate::{Error, Result};

/// Response from OpenAI Whisper transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Response from Deepgram transcription API
#[derive(serde::Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(serde::Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(serde::Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(serde::Deserialize)]
struct DeepgramAlternative {
    transcript: String,
}

/// Turns recorded audio into text
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe one utterance
    ///
    /// # Errors
    ///
    /// Returns `Error::Recognition` if the provider rejects the audio
    async fn transcribe(&self, audio: &[u8], mime: &str) -> Result<String>;

    /// Provider name for logging
    fn name(&self) -> &'static str;
}

/// Transcribes speech through a hosted STT API
pub struct SpeechToText {
    client: Client,
    api_key: SecretString,
    model: String,
    provider: SttProvider,
}

impl SpeechToText {
    /// Create an STT client for the configured provider
    ///
    /// # Errors
    ///
    /// Returns `Error::RecognitionUnavailable` if the provider's API key is missing
    pub fn from_config(config: &Config) -> Result<Self> {
        let model = config.voice.stt_model.clone();
        match config.voice.stt_provider {
            SttProvider::Whisper => Self::new_whisper(config.api_keys.openai.clone(), model),
            SttProvider::Deepgram => Self::new_deepgram(config.api_keys.deepgram.clone(), model),
        }
    }

    /// Create a new STT instance using `OpenAI` Whisper
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_whisper(api_key: Option<SecretString>, model: String) -> Result<Self> {
        Ok(Self {
            client: Client::new(),
            api_key: require_key(api_key, "OpenAI API key required for Whisper")?,
            model,
            provider: SttProvider::Whisper,
        })
    }

    /// Create a new STT instance using Deepgram
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_deepgram(api_key: Option<SecretString>, model: String) -> Result<Self> {
        Ok(Self {
            client: Client::new(),
            api_key: require_key(api_key, "Deepgram API key required")?,
            model,
            provider: SttProvider::Deepgram,
        })
    }

    async fn transcribe_whisper(&self, audio: &[u8], mime: &str) -> Result<String> {
        tracing::debug!(audio_bytes = audio.len(), "starting Whisper transcription");

        let part = reqwest::multipart::Part::bytes(audio.to_vec())
            .file_name(format!("speech.{}", extension_for(mime)))
            .mime_str(mime)
            .map_err(|e| Error::Recognition(format!("unsupported audio type {mime}: {e}")))?;

        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone());

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/transcriptions")
            .bearer_auth(self.api_key.expose_secret())
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Whisper request failed");
                Error::Recognition(format!("request failed: {e}"))
            })?;

        let response = check_status(response, "Whisper").await?;
        let result: WhisperResponse = response
            .json()
            .await
            .map_err(|e| Error::Recognition(format!("invalid Whisper response: {e}")))?;

        Ok(result.text)
    }

    async fn transcribe_deepgram(&self, audio: &[u8], mime: &str) -> Result<String> {
        tracing::debug!(audio_bytes = audio.len(), "starting Deepgram transcription");

        let url = format!(
            "https://api.deepgram.com/v1/listen?model={}&punctuate=true&numerals=true",
            self.model
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Token {}", self.api_key.expose_secret()))
            .header("Content-Type", mime)
            .body(audio.to_vec())
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Deepgram request failed");
                Error::Recognition(format!("request failed: {e}"))
            })?;

        let response = check_status(response, "Deepgram").await?;
        let result: DeepgramResponse = response
            .json()
            .await
            .map_err(|e| Error::Recognition(format!("invalid Deepgram response: {e}")))?;

        Ok(result
            .results
            .channels
            .into_iter()
            .next()
            .and_then(|c| c.alternatives.into_iter().next())
            .map(|a| a.transcript)
            .unwrap_or_default())
    }
}

#[async_trait]
impl Transcriber for SpeechToText {
    async fn transcribe(&self, audio: &[u8], mime: &str) -> Result<String> {
        if audio.is_empty() {
            return Err(Error::Validation("no audio supplied".to_string()));
        }

        let transcript = match self.provider {
            SttProvider::Whisper => self.transcribe_whisper(audio, mime).await?,
            SttProvider::Deepgram => self.transcribe_deepgram(audio, mime).await?,
        };

        tracing::info!(provider = self.name(), chars = transcript.len(), "transcription complete");
        Ok(transcript)
    }

    fn name(&self) -> &'static str {
        match self.provider {
            SttProvider::Whisper => "whisper",
            SttProvider::Deepgram => "deepgram",
        }
    }
}

fn require_key(api_key: Option<SecretString>, message: &str) -> Result<SecretString> {
    api_key
        .filter(|k| !k.expose_secret().is_empty())
        .ok_or_else(|| Error::RecognitionUnavailable(message.to_string()))
}

async fn check_status(response: reqwest::Response, provider: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::error!(provider, status = %status, body = %body, "STT API error");
    Err(Error::Recognition(format!("{provider} API error {status}: {body}")))
}

/// File extension hint for multipart uploads
fn extension_for(mime: &str) -> &'static str {
    let essence = mime.split(';').next().unwrap_or_default().trim();
    match essence {
        "audio/webm" => "webm",
        "audio/ogg" => "ogg",
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => "m4a",
        "audio/flac" => "flac",
        _ => "wav",
    }
}
