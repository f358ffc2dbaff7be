//! Microphone capture for spoken form input

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};

use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// RMS level above which a window counts as speech
const SPEECH_THRESHOLD: f32 = 0.02;

/// Size of the window used for silence detection
const WINDOW: Duration = Duration::from_millis(100);

/// Limits for a single spoken utterance
#[derive(Debug, Clone, Copy)]
pub struct UtteranceLimits {
    /// Hard cap on recording length
    pub max_duration: Duration,
    /// Trailing silence that ends the utterance once speech was heard
    pub trailing_silence: Duration,
    /// Give up if nothing is said within this time
    pub initial_timeout: Duration,
}

impl Default for UtteranceLimits {
    fn default() -> Self {
        Self {
            max_duration: Duration::from_secs(15),
            trailing_silence: Duration::from_millis(1200),
            initial_timeout: Duration::from_secs(6),
        }
    }
}

/// Captures audio from the default input device
pub struct AudioCapture {
    config: StreamConfig,
    buffer: Arc<Mutex<Vec<f32>>>,
    stream: Option<Stream>,
}

impl AudioCapture {
    /// Open the default input device
    ///
    /// # Errors
    ///
    /// Returns error if no input device exists or none supports 16 kHz mono
    pub fn new() -> Result<Self> {
        let device = default_input()?;

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
            })
            .ok_or_else(|| Error::Audio("no suitable audio config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = SAMPLE_RATE,
            "audio capture initialized"
        );

        Ok(Self {
            config,
            buffer: Arc::new(Mutex::new(Vec::new())),
            stream: None,
        })
    }

    /// Whether an input device is present at all
    #[must_use]
    pub fn is_available() -> bool {
        cpal::default_host().default_input_device().is_some()
    }

    /// Start capturing audio
    ///
    /// # Errors
    ///
    /// Returns error if the input stream cannot be built or started
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let buffer = Arc::clone(&self.buffer);
        let device = default_input()?;

        let stream = device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = buffer.lock() {
                        buf.extend_from_slice(data);
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("audio capture started");
        Ok(())
    }

    /// Stop capturing audio
    pub fn stop(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!("audio capture stopped");
        }
    }

    /// Take the samples captured since the last call
    #[must_use]
    pub fn take_buffer(&self) -> Vec<f32> {
        self.buffer
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default()
    }

    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }

    /// Record one utterance, blocking the calling thread
    ///
    /// Returns an empty buffer when nothing was said before
    /// `initial_timeout` or when `stop` was raised before any speech.
    ///
    /// # Errors
    ///
    /// Returns error if capture cannot start
    pub fn record_utterance(&mut self, limits: UtteranceLimits, stop: &AtomicBool) -> Result<Vec<f32>> {
        let _ = self.take_buffer();
        self.start()?;

        let started = Instant::now();
        let mut detector = SilenceDetector::new(limits);
        let mut recorded = Vec::new();

        loop {
            std::thread::sleep(WINDOW);
            let window = self.take_buffer();
            let elapsed = started.elapsed();
            let done = detector.observe(rms(&window), elapsed);
            recorded.extend(window);
            if done || stop.load(Ordering::Relaxed) {
                break;
            }
        }

        self.stop();

        if !detector.heard_speech() {
            tracing::debug!("no speech detected");
            return Ok(Vec::new());
        }

        tracing::debug!(
            samples = recorded.len(),
            secs = started.elapsed().as_secs_f32(),
            "utterance recorded"
        );
        Ok(recorded)
    }
}

fn default_input() -> Result<cpal::Device> {
    cpal::default_host()
        .default_input_device()
        .ok_or_else(|| Error::Audio("no input device available".to_string()))
}

/// Decides when an utterance is over
#[derive(Debug)]
struct SilenceDetector {
    limits: UtteranceLimits,
    speech_seen: bool,
    silent_since: Option<Duration>,
}

impl SilenceDetector {
    const fn new(limits: UtteranceLimits) -> Self {
        Self {
            limits,
            speech_seen: false,
            silent_since: None,
        }
    }

    const fn heard_speech(&self) -> bool {
        self.speech_seen
    }

    /// Feed one window's level; returns true when recording should stop
    fn observe(&mut self, level: f32, elapsed: Duration) -> bool {
        if elapsed >= self.limits.max_duration {
            return true;
        }

        if level >= SPEECH_THRESHOLD {
            self.speech_seen = true;
            self.silent_since = None;
            return false;
        }

        if !self.speech_seen {
            return elapsed >= self.limits.initial_timeout;
        }

        let since = *self.silent_since.get_or_insert(elapsed);
        elapsed.saturating_sub(since) >= self.limits.trailing_silence
    }
}

/// Root-mean-square level of a sample window
#[must_use]
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    #[allow(clippy::cast_precision_loss)]
    let len = samples.len() as f32;
    (sum / len).sqrt()
}

/// Convert f32 samples to WAV bytes for STT APIs
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
