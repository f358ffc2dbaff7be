//! Budget plan generation clients
//!
//! A generator turns validated budget input into a short prose plan. It
//! fails only when the remote call errors or comes back empty; there is no
//! retry policy.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::prompt::{SYSTEM_PROMPT, build_prompt, limit_words};
use crate::budget::BudgetInput;
use crate::config::{Config, LlmProvider};
use crate::{Error, Result};

/// Produces budget narratives from structured input
#[async_trait]
pub trait PlanGenerator: Send + Sync {
    /// Generate a plan
    ///
    /// # Errors
    ///
    /// Returns `Error::Generation` if the provider fails or returns no text
    async fn generate(&self, input: &BudgetInput) -> Result<String>;

    /// Provider name for logging
    fn name(&self) -> &'static str;
}

/// Turn raw provider output into a plan, rejecting empty text
///
/// # Errors
///
/// Returns `Error::Generation` when the output is missing or blank
pub fn finish_plan(raw: Option<String>, max_words: usize) -> Result<String> {
    let text = limit_words(raw.as_deref().unwrap_or_default(), max_words);
    if text.is_empty() {
        return Err(Error::Generation("provider returned an empty plan".to_string()));
    }
    Ok(text)
}

/// Build the generator selected by configuration
///
/// # Errors
///
/// Returns `Error::Config` if the provider's API key is missing
pub fn from_config(config: &Config) -> Result<Box<dyn PlanGenerator>> {
    let llm = &config.llm;
    match llm.provider {
        LlmProvider::OpenAi => {
            let key = config
                .api_keys
                .openai
                .clone()
                .ok_or_else(|| Error::Config("OPENAI_API_KEY required for plan generation".to_string()))?;
            Ok(Box::new(OpenAiGenerator::new(
                key,
                llm.base_url.clone(),
                llm.model.clone(),
                llm.max_words,
            )))
        }
        LlmProvider::Gemini => {
            let key = config
                .api_keys
                .gemini
                .clone()
                .ok_or_else(|| Error::Config("GEMINI_API_KEY required for plan generation".to_string()))?;
            Ok(Box::new(GeminiGenerator::new(key, llm.model.clone(), llm.max_words)))
        }
    }
}

/// OpenAI-compatible chat completions generator
pub struct OpenAiGenerator {
    client: Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    max_words: usize,
}

impl OpenAiGenerator {
    /// Create a generator against an OpenAI-compatible base URL
    #[must_use]
    pub fn new(api_key: SecretString, base_url: String, model: String, max_words: usize) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            max_words,
        }
    }
}

#[async_trait]
impl PlanGenerator for OpenAiGenerator {
    async fn generate(&self, input: &BudgetInput) -> Result<String> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: SYSTEM_PROMPT.to_string() },
                ChatMessage { role: "user", content: build_prompt(input, self.max_words) },
            ],
            temperature: 0.7,
        };

        tracing::debug!(model = %self.model, expenses = input.expenses.len(), "requesting plan");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Generation(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "generation API error");
            return Err(Error::Generation(format!("API error {status}: {body}")));
        }

        let result: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Generation(format!("failed to parse response: {e}")))?;

        let raw = result.choices.into_iter().next().and_then(|c| c.message.content);
        let plan = finish_plan(raw, self.max_words)?;
        tracing::info!(words = plan.split_whitespace().count(), "plan generated");
        Ok(plan)
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Google Gemini `generateContent` generator
pub struct GeminiGenerator {
    client: Client,
    api_key: SecretString,
    model: String,
    max_words: usize,
}

impl GeminiGenerator {
    /// Create a Gemini generator
    #[must_use]
    pub fn new(api_key: SecretString, model: String, max_words: usize) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model,
            max_words,
        }
    }
}

#[async_trait]
impl PlanGenerator for GeminiGenerator {
    async fn generate(&self, input: &BudgetInput) -> Result<String> {
        let request = GeminiRequest {
            system_instruction: GeminiContent {
                parts: vec![GeminiPart { text: SYSTEM_PROMPT.to_string() }],
            },
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: build_prompt(input, self.max_words) }],
            }],
        };

        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
            self.model
        );

        tracing::debug!(model = %self.model, expenses = input.expenses.len(), "requesting plan");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Generation(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Gemini API error");
            return Err(Error::Generation(format!("Gemini API error {status}: {body}")));
        }

        let result: GeminiResponse = response
            .json()
            .await
            .map_err(|e| Error::Generation(format!("failed to parse Gemini response: {e}")))?;

        let plan = finish_plan(result.text(), self.max_words)?;
        tracing::info!(words = plan.split_whitespace().count(), "plan generated");
        Ok(plan)
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    system_instruction: GeminiContent,
    contents: Vec<GeminiContent>,
}

#[derive(Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

impl GeminiResponse {
    fn text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        Some(content.parts.into_iter().map(|p| p.text).collect())
    }
}
