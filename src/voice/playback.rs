//! Plan read-back: buffered and streamed playback behind one interface
//!
//! Both modes run in a spawned task owned by a [`PlaybackHandle`]. Stopping
//! the handle, or dropping it, cancels the task; every exit path (natural
//! end, error, cancellation at any point) goes through the same teardown,
//! which aborts the network reader, halts and releases the sink and clears
//! pending chunks.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::decode::{Pcm16Decoder, decode_mp3};
use super::queue::{ChunkQueue, Next};
use super::tts::{AudioStream, STREAM_SAMPLE_RATE, Synthesizer};
use crate::{Error, Result};

/// Platform audio output that accepts a growing buffer of samples
#[async_trait]
pub trait AudioSink: Send {
    /// Append mono samples; playback may begin before the last append
    ///
    /// # Errors
    ///
    /// Returns error if the platform rejects the audio
    async fn append(&mut self, samples: Vec<f32>, sample_rate: u32) -> Result<()>;

    /// Signal end of audio and wait until everything has been played
    ///
    /// # Errors
    ///
    /// Returns error if playback fails while draining
    async fn finish(&mut self) -> Result<()>;

    /// Stop output immediately
    fn halt(&mut self);

    /// Free the underlying audio resources
    fn release(&mut self);
}

/// Creates a fresh sink for each playback
pub type SinkFactory = Arc<dyn Fn() -> Result<Box<dyn AudioSink>> + Send + Sync>;

/// How a playback ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// All audio was played
    Completed,
    /// Stopped by the user or by teardown
    Stopped,
}

/// Reads text aloud
pub trait Playback: Send + Sync {
    /// Begin reading `text` aloud with an optional voice override
    fn start(&self, text: String, voice: Option<String>) -> PlaybackHandle;

    /// Mode name for logging
    fn mode(&self) -> &'static str;
}

/// Owner of a running playback
///
/// Dropping the handle cancels playback.
pub struct PlaybackHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<Result<PlaybackOutcome>>>,
    queue: Option<ChunkQueue>,
}

impl PlaybackHandle {
    fn spawn<F>(cancel: CancellationToken, queue: Option<ChunkQueue>, fut: F) -> Self
    where
        F: Future<Output = Result<PlaybackOutcome>> + Send + 'static,
    {
        Self {
            cancel,
            task: Some(tokio::spawn(fut)),
            queue,
        }
    }

    /// Request cancellation; teardown happens in the playback task
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Whether the playback task has exited
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Chunks received but not yet appended (streamed mode only)
    #[must_use]
    pub fn pending_chunks(&self) -> usize {
        self.queue.as_ref().map_or(0, ChunkQueue::len)
    }

    /// Wait for playback to end
    ///
    /// # Errors
    ///
    /// Returns the synthesis or audio error that ended playback
    pub async fn wait(mut self) -> Result<PlaybackOutcome> {
        let Some(task) = self.task.take() else {
            return Ok(PlaybackOutcome::Stopped);
        };
        task.await
            .map_err(|e| Error::Synthesis(format!("playback task failed: {e}")))?
    }
}

impl Drop for PlaybackHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Request the whole clip, then play it
pub struct BufferedPlayback {
    synthesizer: Arc<dyn Synthesizer>,
    sinks: SinkFactory,
}

impl BufferedPlayback {
    /// Create a buffered player
    #[must_use]
    pub fn new(synthesizer: Arc<dyn Synthesizer>, sinks: SinkFactory) -> Self {
        Self { synthesizer, sinks }
    }
}

impl Playback for BufferedPlayback {
    fn start(&self, text: String, voice: Option<String>) -> PlaybackHandle {
        let cancel = CancellationToken::new();
        let synthesizer = Arc::clone(&self.synthesizer);
        let sinks = Arc::clone(&self.sinks);
        let token = cancel.clone();

        PlaybackHandle::spawn(cancel, None, async move {
            let mut sink = sinks()?;

            let result = tokio::select! {
                biased;
                () = token.cancelled() => Ok(PlaybackOutcome::Stopped),
                r = play_clip(synthesizer.as_ref(), sink.as_mut(), &text, voice.as_deref()) => r,
            };

            teardown(None, sink.as_mut(), None).await;
            log_outcome("buffered", &result);
            result
        })
    }

    fn mode(&self) -> &'static str {
        "buffered"
    }
}

async fn play_clip(
    synthesizer: &dyn Synthesizer,
    sink: &mut dyn AudioSink,
    text: &str,
    voice: Option<&str>,
) -> Result<PlaybackOutcome> {
    let audio = synthesizer.synthesize(text, voice).await?;
    let decoded = decode_mp3(&audio)?;
    sink.append(decoded.samples, decoded.sample_rate).await?;
    sink.finish().await?;
    Ok(PlaybackOutcome::Completed)
}

/// Play audio chunks as they arrive from the provider
pub struct StreamingPlayback {
    synthesizer: Arc<dyn Synthesizer>,
    sinks: SinkFactory,
}

impl StreamingPlayback {
    /// Create a streaming player
    #[must_use]
    pub fn new(synthesizer: Arc<dyn Synthesizer>, sinks: SinkFactory) -> Self {
        Self { synthesizer, sinks }
    }
}

impl Playback for StreamingPlayback {
    fn start(&self, text: String, voice: Option<String>) -> PlaybackHandle {
        let cancel = CancellationToken::new();
        let queue = ChunkQueue::new();
        let synthesizer = Arc::clone(&self.synthesizer);
        let sinks = Arc::clone(&self.sinks);
        let token = cancel.clone();
        let task_queue = queue.clone();

        PlaybackHandle::spawn(cancel, Some(queue), async move {
            let queue = task_queue;
            let mut sink = sinks()?;
            let mut reader: Option<JoinHandle<()>> = None;

            let result = tokio::select! {
                biased;
                () = token.cancelled() => Ok(PlaybackOutcome::Stopped),
                r = async {
                    let stream = synthesizer.synthesize_stream(&text, voice.as_deref()).await?;
                    reader = Some(tokio::spawn(read_stream(stream, queue.clone())));
                    drain(&queue, sink.as_mut()).await
                } => r,
            };

            teardown(reader, sink.as_mut(), Some(&queue)).await;
            log_outcome("streamed", &result);
            result
        })
    }

    fn mode(&self) -> &'static str {
        "streamed"
    }
}

/// Move network chunks into the queue until the stream ends
async fn read_stream(mut stream: AudioStream, queue: ChunkQueue) {
    while let Some(item) = stream.next().await {
        match item {
            Ok(chunk) if chunk.is_empty() => {}
            Ok(chunk) => queue.push(chunk),
            Err(e) => {
                queue.fail(e.to_string());
                return;
            }
        }
    }
    queue.end();
}

/// Single appender: one chunk at a time, finalize once drained
async fn drain(queue: &ChunkQueue, sink: &mut dyn AudioSink) -> Result<PlaybackOutcome> {
    let mut decoder = Pcm16Decoder::default();

    loop {
        match queue.next().await {
            Next::Chunk(bytes) => {
                let samples = decoder.push(&bytes);
                let appended = if samples.is_empty() {
                    Ok(())
                } else {
                    sink.append(samples, STREAM_SAMPLE_RATE).await
                };
                queue.append_done();
                appended?;
            }
            Next::Finalize => {
                sink.finish().await?;
                return Ok(PlaybackOutcome::Completed);
            }
            Next::Failed(reason) => return Err(Error::Synthesis(reason)),
        }
    }
}

/// The one teardown path shared by every exit
async fn teardown(reader: Option<JoinHandle<()>>, sink: &mut dyn AudioSink, queue: Option<&ChunkQueue>) {
    if let Some(reader) = reader {
        reader.abort();
        // Wait for the abort so the network stream is dropped before we return
        let _ = reader.await;
    }
    sink.halt();
    sink.release();
    if let Some(queue) = queue {
        queue.clear();
    }
}

fn log_outcome(mode: &str, result: &Result<PlaybackOutcome>) {
    match result {
        Ok(outcome) => tracing::debug!(mode, ?outcome, "playback ended"),
        Err(e) => tracing::warn!(mode, error = %e, "playback failed"),
    }
}
