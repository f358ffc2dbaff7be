//! Voice pipeline integration tests
//!
//! Tests voice components without requiring audio hardware

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use budget_assistant::voice::{
    Pcm16Decoder, Playback, PlaybackOutcome, RecognitionEvent, Recognizer, SAMPLE_RATE,
    SpeechBridge, StreamingPlayback, rms, samples_to_wav,
};
use budget_assistant::{Error, InputTarget, PlanForm};

mod common;
use common::{FakeSynthesizer, RecordingSink};

/// Generate sine wave audio samples
fn generate_sine_samples(frequency: f32, duration_secs: f32, amplitude: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

/// Recognizer that hears the same phrase every time
struct FixedRecognizer {
    phrase: &'static str,
    calls: AtomicUsize,
}

#[async_trait]
impl Recognizer for FixedRecognizer {
    fn is_available(&self) -> bool {
        true
    }

    async fn recognize(&self) -> RecognitionEvent {
        self.calls.fetch_add(1, Ordering::SeqCst);
        RecognitionEvent::Result(self.phrase.to_string())
    }

    fn stop(&self) {}
}

#[test]
fn test_samples_to_wav_roundtrip_header() {
    let samples = generate_sine_samples(440.0, 0.25, 0.5);
    let wav = samples_to_wav(&samples, SAMPLE_RATE).unwrap();

    let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.sample_rate, SAMPLE_RATE);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(reader.len() as usize, samples.len());
}

#[test]
fn test_rms_of_sine_and_silence() {
    let sine = generate_sine_samples(440.0, 0.5, 1.0);
    let level = rms(&sine);
    assert!((level - std::f32::consts::FRAC_1_SQRT_2).abs() < 0.01);
    assert!(rms(&[0.0; 1600]) < f32::EPSILON);
    assert!(rms(&[]) < f32::EPSILON);
}

#[test]
fn test_pcm16_decoder_across_odd_chunks() {
    let mut decoder = Pcm16Decoder::default();
    let mut samples = decoder.push(&[0x00, 0x40, 0x00]);
    samples.extend(decoder.push(&[0xC0]));

    assert_eq!(samples.len(), 2);
    assert!((samples[0] - 0.5).abs() < 1e-3);
    assert!((samples[1] + 0.5).abs() < 1e-3);
}

#[tokio::test]
async fn test_streaming_playback_plays_all_chunks() {
    let (sinks, log) = RecordingSink::factory();
    let playback = StreamingPlayback::new(Arc::new(FakeSynthesizer), sinks);
    assert_eq!(playback.mode(), "streamed");

    let handle = playback.start("Spend less on takeout.".to_string(), None);
    assert_eq!(handle.wait().await.unwrap(), PlaybackOutcome::Completed);

    let log = log.lock().unwrap();
    // [1, 0, 2] + [0, 3, 0] is three little-endian samples: 1, 2, 3
    assert_eq!(log.samples.len(), 3);
    assert!(log.samples[1] > log.samples[0]);
    assert!(log.finished);
    assert!(log.released);
}

#[tokio::test]
async fn test_bridge_routes_amount_to_one_expense() {
    let recognizer = Arc::new(FixedRecognizer {
        phrase: "roughly 1,350 dollars",
        calls: AtomicUsize::new(0),
    });
    let mut bridge = SpeechBridge::new(Some(recognizer.clone()));
    let mut form = PlanForm::new();
    let first = form.expenses[0].id.clone();
    let second = form.add_expense();

    let value = bridge
        .listen(InputTarget::ExpenseAmount(second.clone()), &mut form)
        .await
        .unwrap();

    assert_eq!(value.as_deref(), Some("1350"));
    assert_eq!(form.expense(&second).unwrap().amount, "1350");
    assert_eq!(form.expense(&first).unwrap().amount, "");
    assert!(!bridge.is_listening());
    assert_eq!(recognizer.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_bridge_without_recognizer_is_unavailable() {
    let mut bridge = SpeechBridge::new(None);
    let mut form = PlanForm::new();

    assert!(!bridge.is_available());
    let err = bridge.listen(InputTarget::Income, &mut form).await.unwrap_err();
    assert!(matches!(err, Error::RecognitionUnavailable(_)));
    assert!(form.income.is_empty());
}
