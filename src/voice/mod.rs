//! Voice processing module
//!
//! Handles speech synthesis and plan read-back, microphone capture and
//! speech recognition for form input.

mod capture;
mod decode;
mod output;
mod playback;
mod queue;
mod recognition;
mod stt;
mod tts;

pub use capture::{AudioCapture, SAMPLE_RATE, UtteranceLimits, rms, samples_to_wav};
pub use decode::{DecodedAudio, Pcm16Decoder, decode_mp3};
pub use output::SpeakerSink;
pub use playback::{
    AudioSink, BufferedPlayback, Playback, PlaybackHandle, PlaybackOutcome, SinkFactory,
    StreamingPlayback,
};
pub use queue::{ChunkQueue, Next};
pub use recognition::{MicRecognizer, RecognitionEvent, RecognitionSession, Recognizer, SpeechBridge};
pub use stt::{SpeechToText, Transcriber};
pub use tts::{
    AudioStream, BUFFERED_CONTENT_TYPE, STREAM_CONTENT_TYPE, STREAM_SAMPLE_RATE, Synthesizer,
    TextToSpeech,
};

#[cfg(test)]
pub(crate) use recognition::fake::{ScriptedRecognizer, SilentRecognizer};
