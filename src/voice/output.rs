//! Speaker output for plan read-back

use std::collections::VecDeque;
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use tokio::sync::oneshot;

use super::playback::{AudioSink, SinkFactory};
use crate::{Error, Result};

/// Seconds of audio allowed to sit ahead of the device
const MAX_BUFFERED_SECS: usize = 4;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

type SampleBuffer = Arc<Mutex<VecDeque<f32>>>;

/// Plays appended samples on the default output device
///
/// The cpal stream is not `Send`, so it lives on a dedicated thread that
/// is opened on the first append and torn down on halt or release.
#[derive(Default)]
pub struct SpeakerSink {
    buffer: SampleBuffer,
    sample_rate: Option<u32>,
    stop: Option<std_mpsc::Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl SpeakerSink {
    /// Create an idle sink; the device is opened lazily
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory suitable for [`super::BufferedPlayback`] and [`super::StreamingPlayback`]
    #[must_use]
    pub fn factory() -> SinkFactory {
        Arc::new(|| Ok(Box::new(Self::new()) as Box<dyn AudioSink>))
    }

    fn buffered(&self) -> usize {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    async fn open(&mut self, sample_rate: u32) -> Result<()> {
        let (stop_tx, stop_rx) = std_mpsc::channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let buffer = Arc::clone(&self.buffer);

        let worker = std::thread::Builder::new()
            .name("speaker-output".to_string())
            .spawn(move || run_output(sample_rate, &buffer, &stop_rx, ready_tx))?;

        self.stop = Some(stop_tx);
        self.worker = Some(worker);

        ready_rx
            .await
            .map_err(|_| Error::Audio("output thread exited during startup".to_string()))??;

        self.sample_rate = Some(sample_rate);
        Ok(())
    }
}

#[async_trait]
impl AudioSink for SpeakerSink {
    async fn append(&mut self, samples: Vec<f32>, sample_rate: u32) -> Result<()> {
        match self.sample_rate {
            None => self.open(sample_rate).await?,
            Some(open) if open != sample_rate => {
                return Err(Error::Audio(format!(
                    "sample rate changed mid-playback ({open} -> {sample_rate})"
                )));
            }
            Some(_) => {}
        }

        let limit = MAX_BUFFERED_SECS * sample_rate as usize;
        while self.buffered() > limit {
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(samples);
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        if self.worker.is_none() {
            return Ok(());
        }
        while self.buffered() > 0 {
            if self.worker.as_ref().is_some_and(JoinHandle::is_finished) {
                return Err(Error::Audio("output device stopped unexpectedly".to_string()));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        // Let the device flush its own buffer
        tokio::time::sleep(POLL_INTERVAL * 5).await;
        Ok(())
    }

    fn halt(&mut self) {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        if let Some(stop) = &self.stop {
            let _ = stop.send(());
        }
    }

    fn release(&mut self) {
        self.stop = None;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("speaker output thread panicked");
            }
        }
        self.sample_rate = None;
    }
}

impl Drop for SpeakerSink {
    fn drop(&mut self) {
        self.halt();
        self.release();
    }
}

fn run_output(
    sample_rate: u32,
    buffer: &SampleBuffer,
    stop: &std_mpsc::Receiver<()>,
    ready: oneshot::Sender<Result<()>>,
) {
    let stream = match open_stream(sample_rate, Arc::clone(buffer)) {
        Ok(stream) => {
            let _ = ready.send(Ok(()));
            stream
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    // Either an explicit stop or the sender being dropped ends output
    let _ = stop.recv();
    drop(stream);
    tracing::debug!("speaker output closed");
}

fn open_stream(sample_rate: u32, buffer: SampleBuffer) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

    let rate = SampleRate(sample_rate);
    let supports = |c: &cpal::SupportedStreamConfigRange, channels: u16| {
        c.channels() == channels && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate
    };

    let supported = device
        .supported_output_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .find(|c| supports(c, 1))
        .or_else(|| {
            device
                .supported_output_configs()
                .ok()?
                .find(|c| supports(c, 2))
        })
        .ok_or_else(|| {
            Error::Audio(format!("no output config supports {sample_rate} Hz"))
        })?;

    let config: StreamConfig = supported.with_sample_rate(rate).config();
    let channels = usize::from(config.channels);

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate,
        channels,
        "speaker output opened"
    );

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut pending = buffer.lock().unwrap_or_else(PoisonError::into_inner);
                for frame in data.chunks_mut(channels) {
                    let sample = pending.pop_front().unwrap_or(0.0);
                    frame.fill(sample);
                }
            },
            |err| {
                tracing::error!(error = %err, "audio playback error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;
    Ok(stream)
}
