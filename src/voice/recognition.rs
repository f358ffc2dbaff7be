//! Single-shot speech recognition routed into the plan form
//!
//! A [`Recognizer`] is the platform capability: it listens once and reports
//! exactly one [`RecognitionEvent`]. [`SpeechBridge`] owns at most one
//! [`RecognitionSession`] at a time and routes the transcript into whichever
//! field the session was opened for.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use super::capture::{AudioCapture, SAMPLE_RATE, UtteranceLimits, samples_to_wav};
use super::stt::Transcriber;
use crate::budget::form::{InputTarget, PlanForm};
use crate::{Error, Result};

/// Outcome of one listening session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// A transcript was recognized
    Result(String),
    /// The capability or provider reported an error code
    Error(String),
    /// Listening ended without a transcript
    End,
}

/// Speech recognition capability
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Whether recognition can work in this environment
    fn is_available(&self) -> bool;

    /// Listen for a single utterance
    async fn recognize(&self) -> RecognitionEvent;

    /// Ask an in-progress `recognize` to end early
    fn stop(&self);
}

/// Recognizes speech from the default microphone through a hosted STT API
pub struct MicRecognizer {
    transcriber: Arc<dyn Transcriber>,
    limits: UtteranceLimits,
    stop: Arc<AtomicBool>,
}

impl MicRecognizer {
    #[must_use]
    pub fn new(transcriber: Arc<dyn Transcriber>) -> Self {
        Self {
            transcriber,
            limits: UtteranceLimits::default(),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub const fn with_limits(mut self, limits: UtteranceLimits) -> Self {
        self.limits = limits;
        self
    }
}

#[async_trait]
impl Recognizer for MicRecognizer {
    fn is_available(&self) -> bool {
        AudioCapture::is_available()
    }

    async fn recognize(&self) -> RecognitionEvent {
        self.stop.store(false, Ordering::Relaxed);
        let stop = Arc::clone(&self.stop);
        let limits = self.limits;

        let recorded = tokio::task::spawn_blocking(move || {
            let mut capture = AudioCapture::new()?;
            capture.record_utterance(limits, &stop)
        })
        .await;

        let samples = match recorded {
            Ok(Ok(samples)) => samples,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "audio capture failed");
                return RecognitionEvent::Error("audio-capture".to_string());
            }
            Err(e) => {
                tracing::error!(error = %e, "capture task failed");
                return RecognitionEvent::Error("aborted".to_string());
            }
        };

        if samples.is_empty() {
            return RecognitionEvent::End;
        }

        let wav = match samples_to_wav(&samples, SAMPLE_RATE) {
            Ok(wav) => wav,
            Err(e) => return RecognitionEvent::Error(e.to_string()),
        };

        match self.transcriber.transcribe(&wav, "audio/wav").await {
            Ok(text) if text.trim().is_empty() => RecognitionEvent::End,
            Ok(text) => RecognitionEvent::Result(text),
            Err(e) => RecognitionEvent::Error(e.to_string()),
        }
    }

    fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

/// One listening request bound to the field it fills
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionSession {
    target: InputTarget,
}

impl RecognitionSession {
    #[must_use]
    pub const fn target(&self) -> &InputTarget {
        &self.target
    }
}

/// Routes recognized speech into the plan form
pub struct SpeechBridge {
    recognizer: Option<Arc<dyn Recognizer>>,
    active: Option<RecognitionSession>,
}

impl SpeechBridge {
    /// Create a bridge; `None` means speech input is unsupported here
    #[must_use]
    pub fn new(recognizer: Option<Arc<dyn Recognizer>>) -> Self {
        Self {
            recognizer,
            active: None,
        }
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.recognizer.as_ref().is_some_and(|r| r.is_available())
    }

    #[must_use]
    pub const fn is_listening(&self) -> bool {
        self.active.is_some()
    }

    #[must_use]
    pub fn active_target(&self) -> Option<&InputTarget> {
        self.active.as_ref().map(RecognitionSession::target)
    }

    /// Open a session for `target`
    ///
    /// # Errors
    ///
    /// Returns `Error::RecognitionUnavailable` if there is no usable
    /// recognizer, or `Error::Recognition` if a session is already open
    pub fn begin(&mut self, target: InputTarget) -> Result<&RecognitionSession> {
        if !self.is_available() {
            return Err(Error::RecognitionUnavailable(
                "speech recognition is not supported in this environment".to_string(),
            ));
        }
        if self.active.is_some() {
            return Err(Error::Recognition("already listening".to_string()));
        }

        tracing::debug!(?target, "listening");
        Ok(self.active.insert(RecognitionSession { target }))
    }

    /// Close the open session with its event, routing any transcript
    ///
    /// The session is cleared whatever the event. Returns the value written
    /// to the form, or `None` when recognition ended without a transcript.
    ///
    /// # Errors
    ///
    /// Returns `Error::Recognition` for an error event or when no session is
    /// open, and `Error::NotFound` if the target expense was removed meanwhile
    pub fn complete(&mut self, event: RecognitionEvent, form: &mut PlanForm) -> Result<Option<String>> {
        let session = self
            .active
            .take()
            .ok_or_else(|| Error::Recognition("not listening".to_string()))?;

        match event {
            RecognitionEvent::Result(transcript) => {
                form.apply_transcript(&session.target, &transcript)?;
                let value = form.value(&session.target).unwrap_or_default();
                tracing::debug!(target = ?session.target, %value, "transcript routed");
                Ok(Some(value))
            }
            RecognitionEvent::Error(code) => Err(Error::Recognition(code)),
            RecognitionEvent::End => Ok(None),
        }
    }

    /// Listen once and route the result into `form`
    ///
    /// Dropping the returned future before it resolves closes the session
    /// and stops the recognizer.
    ///
    /// # Errors
    ///
    /// As [`Self::begin`] and [`Self::complete`]
    pub async fn listen(&mut self, target: InputTarget, form: &mut PlanForm) -> Result<Option<String>> {
        self.begin(target)?;
        let Some(recognizer) = self.recognizer.clone() else {
            return self.complete(RecognitionEvent::Error("not-available".to_string()), form);
        };

        let mut guard = ListenGuard {
            active: &mut self.active,
            recognizer: recognizer.as_ref(),
            settled: false,
        };
        let event = recognizer.recognize().await;
        guard.settled = true;
        drop(guard);

        self.complete(event, form)
    }

    /// Abandon the open session, if any
    pub fn cancel(&mut self) {
        if self.active.take().is_some() {
            if let Some(recognizer) = &self.recognizer {
                recognizer.stop();
            }
        }
    }
}

/// Closes an abandoned session when a `listen` future is dropped mid-await
struct ListenGuard<'a> {
    active: &'a mut Option<RecognitionSession>,
    recognizer: &'a dyn Recognizer,
    settled: bool,
}

impl Drop for ListenGuard<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        if let Some(session) = self.active.take() {
            tracing::debug!(target = ?session.target, "listening abandoned");
            self.recognizer.stop();
        }
    }
}
