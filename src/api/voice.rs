//! Voice API endpoints for speech-to-text and text-to-speech

use std::sync::Arc;

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use super::identity::require_identity;
use super::{ApiError, ApiState};
use crate::Error;
use crate::budget::form::{TargetKind, normalize_transcript};
use crate::voice::{BUFFERED_CONTENT_TYPE, STREAM_CONTENT_TYPE};

/// Build voice router
pub fn router(state: Arc<ApiState>) -> Router {
    let protected = Router::new()
        .route("/transcribe", post(transcribe))
        .route("/synthesize", post(synthesize))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_identity));

    Router::new()
        .route("/capabilities", get(capabilities))
        .merge(protected)
        .with_state(state)
}

/// Voice capabilities response
#[derive(Debug, Serialize)]
pub struct VoiceCapabilities {
    pub stt_available: bool,
    pub tts_available: bool,
    pub streaming: bool,
}

async fn capabilities(State(state): State<Arc<ApiState>>) -> Json<VoiceCapabilities> {
    let tts_available = state.synthesizer.is_some();
    Json(VoiceCapabilities {
        stt_available: state.transcriber.is_some(),
        tts_available,
        streaming: tts_available,
    })
}

/// Which form field the transcript is for
#[derive(Debug, Deserialize)]
pub struct TranscribeQuery {
    pub target: Option<TargetKind>,
}

/// Transcription response
#[derive(Debug, Serialize)]
pub struct TranscribeResponse {
    /// Raw transcript
    pub text: String,
    /// Transcript normalized for the target field
    pub value: String,
}

/// Transcribe one utterance
///
/// The request body is the recorded audio; its `Content-Type` is passed to
/// the provider (WAV when absent).
async fn transcribe(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<TranscribeQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<TranscribeResponse>, ApiError> {
    let transcriber = state.transcriber.as_ref().ok_or_else(|| {
        Error::RecognitionUnavailable("speech-to-text is not configured".to_string())
    })?;

    if body.is_empty() {
        return Err(Error::Validation("empty audio data".to_string()).into());
    }

    let mime = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .filter(|v| v.starts_with("audio/"))
        .unwrap_or("audio/wav");

    let text = transcriber.transcribe(&body, mime).await?;
    let numeric = query.target.is_some_and(TargetKind::is_numeric);
    let value = normalize_transcript(&text, numeric);

    Ok(Json(TranscribeResponse { text, value }))
}

/// Synthesis request
#[derive(Debug, Deserialize)]
pub struct SynthesizeRequest {
    pub text: String,
    /// Provider-specific voice identifier; the configured default when absent
    #[serde(default)]
    pub voice: Option<String>,
    /// Stream raw PCM as it is produced instead of one MP3 clip
    #[serde(default)]
    pub stream: bool,
}

/// Synthesize text to speech
async fn synthesize(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<SynthesizeRequest>,
) -> Result<Response, ApiError> {
    let synthesizer = state
        .synthesizer
        .as_ref()
        .ok_or_else(|| Error::Config("text-to-speech is not configured".to_string()))?;

    if request.text.trim().is_empty() {
        return Err(Error::Validation("empty text".to_string()).into());
    }

    if request.stream {
        let audio = synthesizer
            .synthesize_stream(&request.text, request.voice.as_deref())
            .await?;
        // Dropping the body (client disconnect) drops the provider stream
        return Ok((
            StatusCode::OK,
            [(header::CONTENT_TYPE, STREAM_CONTENT_TYPE)],
            Body::from_stream(audio),
        )
            .into_response());
    }

    let audio = synthesizer
        .synthesize(&request.text, request.voice.as_deref())
        .await?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, BUFFERED_CONTENT_TYPE)],
        audio,
    )
        .into_response())
}
