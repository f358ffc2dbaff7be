//! Text-to-speech (TTS) synthesis

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};

use crate::config::{Config, TtsProvider};
use crate::{Error, Result};

/// Sample rate of streamed PCM audio (16-bit little-endian mono)
pub const STREAM_SAMPLE_RATE: u32 = 24_000;

/// MIME type of streamed audio
pub const STREAM_CONTENT_TYPE: &str = "audio/L16;rate=24000;channels=1";

/// MIME type of buffered audio
pub const BUFFERED_CONTENT_TYPE: &str = "audio/mpeg";

/// Incrementally delivered audio bytes
pub type AudioStream = BoxStream<'static, Result<Bytes>>;

/// Converts text into speech audio
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Request a complete MP3 clip
    ///
    /// # Errors
    ///
    /// Returns `Error::Synthesis` if the provider rejects the request
    async fn synthesize(&self, text: &str, voice: Option<&str>) -> Result<Bytes>;

    /// Request PCM16 audio at [`STREAM_SAMPLE_RATE`] as it is produced
    ///
    /// # Errors
    ///
    /// Returns `Error::Synthesis` if the provider rejects the request
    async fn synthesize_stream(&self, text: &str, voice: Option<&str>) -> Result<AudioStream>;

    /// Provider name for logging
    fn name(&self) -> &'static str;
}

/// Synthesizes speech through a hosted TTS API
pub struct TextToSpeech {
    client: Client,
    api_key: SecretString,
    voice: String,
    speed: f32,
    model: String,
    provider: TtsProvider,
}

impl TextToSpeech {
    /// Create a TTS client for the configured provider
    ///
    /// # Errors
    ///
    /// Returns error if the provider's API key is missing
    pub fn from_config(config: &Config) -> Result<Self> {
        let voice = &config.voice;
        match voice.tts_provider {
            TtsProvider::OpenAi => Self::new_openai_with_model(
                config.api_keys.openai.clone(),
                voice.tts_voice.clone(),
                voice.tts_speed,
                voice.tts_model.clone(),
            ),
            TtsProvider::ElevenLabs => Self::new_elevenlabs_with_model(
                config.api_keys.elevenlabs.clone(),
                voice.tts_voice.clone(),
                voice.tts_model.clone(),
            ),
        }
    }

    /// Create a new TTS instance using `OpenAI` with custom model
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_openai_with_model(
        api_key: Option<SecretString>,
        voice: String,
        speed: f32,
        model: String,
    ) -> Result<Self> {
        let api_key = api_key
            .filter(|k| !k.expose_secret().is_empty())
            .ok_or_else(|| Error::Config("OpenAI API key required for TTS".to_string()))?;

        Ok(Self {
            client: Client::new(),
            api_key,
            voice,
            speed,
            model,
            provider: TtsProvider::OpenAi,
        })
    }

    /// Create a new TTS instance using `ElevenLabs` with custom model
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_elevenlabs_with_model(
        api_key: Option<SecretString>,
        voice_id: String,
        model: String,
    ) -> Result<Self> {
        let api_key = api_key
            .filter(|k| !k.expose_secret().is_empty())
            .ok_or_else(|| Error::Config("ElevenLabs API key required for TTS".to_string()))?;

        Ok(Self {
            client: Client::new(),
            api_key,
            voice: voice_id,
            speed: 1.0,
            model,
            provider: TtsProvider::ElevenLabs,
        })
    }

    /// Default voice identifier
    #[must_use]
    pub fn default_voice(&self) -> &str {
        &self.voice
    }

    fn request(&self, text: &str, voice: Option<&str>, streaming: bool) -> reqwest::RequestBuilder {
        let voice = voice.filter(|v| !v.is_empty()).unwrap_or(&self.voice);

        match self.provider {
            TtsProvider::OpenAi => {
                #[derive(serde::Serialize)]
                struct TtsRequest<'a> {
                    model: &'a str,
                    input: &'a str,
                    voice: &'a str,
                    speed: f32,
                    response_format: &'a str,
                }

                let request = TtsRequest {
                    model: &self.model,
                    input: text,
                    voice,
                    speed: self.speed,
                    response_format: if streaming { "pcm" } else { "mp3" },
                };

                self.client
                    .post("https://api.openai.com/v1/audio/speech")
                    .bearer_auth(self.api_key.expose_secret())
                    .json(&request)
            }
            TtsProvider::ElevenLabs => {
                #[derive(serde::Serialize)]
                struct ElevenLabsRequest<'a> {
                    text: &'a str,
                    model_id: &'a str,
                }

                let url = if streaming {
                    format!(
                        "https://api.elevenlabs.io/v1/text-to-speech/{voice}/stream?output_format=pcm_24000"
                    )
                } else {
                    format!("https://api.elevenlabs.io/v1/text-to-speech/{voice}")
                };

                self.client
                    .post(&url)
                    .header("xi-api-key", self.api_key.expose_secret())
                    .json(&ElevenLabsRequest {
                        text,
                        model_id: &self.model,
                    })
            }
        }
    }

    async fn send(&self, text: &str, voice: Option<&str>, streaming: bool) -> Result<reqwest::Response> {
        if text.trim().is_empty() {
            return Err(Error::Validation("nothing to read aloud".to_string()));
        }

        let response = self
            .request(text, voice, streaming)
            .send()
            .await
            .map_err(|e| Error::Synthesis(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(provider = self.name(), status = %status, body = %body, "TTS API error");
            return Err(Error::Synthesis(format!("{} TTS error {status}: {body}", self.name())));
        }

        Ok(response)
    }
}

#[async_trait]
impl Synthesizer for TextToSpeech {
    async fn synthesize(&self, text: &str, voice: Option<&str>) -> Result<Bytes> {
        let response = self.send(text, voice, false).await?;
        let audio = response
            .bytes()
            .await
            .map_err(|e| Error::Synthesis(format!("failed to read audio: {e}")))?;

        tracing::debug!(provider = self.name(), bytes = audio.len(), "synthesized clip");
        Ok(audio)
    }

    async fn synthesize_stream(&self, text: &str, voice: Option<&str>) -> Result<AudioStream> {
        let response = self.send(text, voice, true).await?;
        tracing::debug!(provider = self.name(), "streaming synthesis started");

        Ok(response
            .bytes_stream()
            .map_err(|e| Error::Synthesis(format!("stream interrupted: {e}")))
            .boxed())
    }

    fn name(&self) -> &'static str {
        match self.provider {
            TtsProvider::OpenAi => "openai",
            TtsProvider::ElevenLabs => "elevenlabs",
        }
    }
}
