//! Shared test utilities

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{Request, Response};
use budget_assistant::api::ApiServerBuilder;
use budget_assistant::voice::{AudioStream, Synthesizer, Transcriber};
use budget_assistant::{BudgetInput, DbPool, Error, PlanGenerator, Result, SqlitePlanStore, db};
use futures::StreamExt;
use secrecy::SecretString;

/// Bearer token accepted by test servers
pub const TEST_TOKEN: &str = "test-api-token";

/// Set up an in-memory test database
#[must_use]
pub fn setup_test_db() -> DbPool {
    db::init_memory().expect("failed to init test db")
}

/// Generator answering with canned text, or failing
pub struct FakeGenerator {
    pub reply: std::result::Result<String, String>,
    pub calls: AtomicUsize,
}

impl FakeGenerator {
    pub fn ok(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(text.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(reason: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(reason.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlanGenerator for FakeGenerator {
    async fn generate(&self, input: &BudgetInput) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.reply {
            Ok(text) => Ok(format!(
                "{text} Income {} against expenses of {}.",
                input.income,
                input.total_expenses()
            )),
            Err(reason) => Err(Error::Generation(reason.clone())),
        }
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Synthesizer returning fixed bytes, in pieces when streaming
pub struct FakeSynthesizer;

#[async_trait]
impl Synthesizer for FakeSynthesizer {
    async fn synthesize(&self, _text: &str, voice: Option<&str>) -> Result<Bytes> {
        Ok(Bytes::from(format!("mp3:{}", voice.unwrap_or("default"))))
    }

    async fn synthesize_stream(&self, _text: &str, _voice: Option<&str>) -> Result<AudioStream> {
        let chunks = vec![
            Ok(Bytes::from_static(&[1, 0, 2])),
            Ok(Bytes::from_static(&[0, 3, 0])),
        ];
        Ok(futures::stream::iter(chunks).boxed())
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Transcriber returning a fixed transcript
pub struct FakeTranscriber(pub &'static str);

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(&self, _audio: &[u8], _mime: &str) -> Result<String> {
        Ok(self.0.to_string())
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Build a test API router backed by `SQLite` with every provider faked
pub fn build_test_router(db: DbPool, generator: Arc<FakeGenerator>) -> axum::Router {
    ApiServerBuilder::new(Arc::new(SqlitePlanStore::new(db.clone())), 0)
        .db(db)
        .generator(generator)
        .synthesizer(Arc::new(FakeSynthesizer))
        .transcriber(Arc::new(FakeTranscriber("about 250 dollars")))
        .api_token(Some(SecretString::from(TEST_TOKEN.to_string())))
        .build()
        .router()
}

/// Request builder with the test bearer token attached
pub fn authed(method: &str, uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {TEST_TOKEN}"))
}

/// JSON request with the test bearer token
pub fn authed_json(method: &str, uri: &str, body: &serde_json::Value) -> Request<Body> {
    authed(method, uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Collect a response body
pub async fn body_bytes(response: Response<Body>) -> Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
}

/// Collect a response body as JSON
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// What a [`RecordingSink`] was asked to do
#[derive(Debug, Default)]
pub struct SinkLog {
    pub samples: Vec<f32>,
    pub appends: usize,
    pub finished: bool,
    pub halted: bool,
    pub released: bool,
}

/// Audio sink that records calls instead of playing
pub struct RecordingSink(pub Arc<std::sync::Mutex<SinkLog>>);

impl RecordingSink {
    /// Factory handing out sinks that share one log
    pub fn factory() -> (budget_assistant::voice::SinkFactory, Arc<std::sync::Mutex<SinkLog>>) {
        let log = Arc::new(std::sync::Mutex::new(SinkLog::default()));
        let shared = log.clone();
        let factory: budget_assistant::voice::SinkFactory = Arc::new(move || {
            Ok(Box::new(Self(shared.clone())) as Box<dyn budget_assistant::voice::AudioSink>)
        });
        (factory, log)
    }
}

#[async_trait]
impl budget_assistant::voice::AudioSink for RecordingSink {
    async fn append(&mut self, samples: Vec<f32>, _sample_rate: u32) -> Result<()> {
        let mut log = self.0.lock().unwrap();
        log.samples.extend(samples);
        log.appends += 1;
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        self.0.lock().unwrap().finished = true;
        Ok(())
    }

    fn halt(&mut self) {
        self.0.lock().unwrap().halted = true;
    }

    fn release(&mut self) {
        self.0.lock().unwrap().released = true;
    }
}
