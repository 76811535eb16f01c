//! Generation client for the Google Generative Language API.
//!
//! We only call `models/{model}:generateContent` and ask for a JSON completion.
//! Calls are instrumented and log the model, latency, attempt and payload
//! sizes (not contents).
//!
//! NOTE: We never log the API key; it travels as a query parameter and is
//! stripped from transport error messages.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::config::{GenerationSettings, SamplingConfig};
use crate::error::GenerationError;
use crate::retry::RetryPolicy;

/// Text-completion boundary. Implementations own timeout and retry policy;
/// callers see one atomic call.
#[async_trait]
pub trait GenerationClient: Send + Sync {
  async fn generate(&self, prompt: &str, sampling: &SamplingConfig) -> Result<String, GenerationError>;

  /// Short label for logs.
  fn name(&self) -> &str;
}

#[derive(Clone)]
pub struct GeminiClient {
  client: reqwest::Client,
  api_key: String,
  pub base_url: String,
  pub model: String,
  pub retry: RetryPolicy,
}

impl GeminiClient {
  pub fn new(api_key: String, settings: &GenerationSettings) -> Result<Self, GenerationError> {
    let client = reqwest::Client::builder()
      .timeout(settings.timeout())
      .build()
      .map_err(|e| GenerationError::Transport { reason: e.to_string() })?;
    Ok(Self {
      client,
      api_key,
      base_url: settings.base_url.trim_end_matches('/').to_string(),
      model: settings.model.clone(),
      retry: RetryPolicy::new(settings.max_retries, settings.backoff()),
    })
  }

  /// Construct the client if we find GEMINI_API_KEY; otherwise return None.
  pub fn from_env(settings: &GenerationSettings) -> Option<Self> {
    let api_key = std::env::var("GEMINI_API_KEY").ok().filter(|k| !k.trim().is_empty())?;
    match Self::new(api_key, settings) {
      Ok(c) => Some(c),
      Err(e) => {
        error!(target: "generation", error = %e, "Failed to build HTTP client");
        None
      }
    }
  }

  fn endpoint(&self) -> String {
    format!("{}/models/{}:generateContent", self.base_url, self.model)
  }

  /// One HTTP round trip, no retries.
  async fn call_once(&self, prompt: &str, sampling: &SamplingConfig) -> Result<String, GenerationError> {
    let req = GenerateContentRequest {
      contents: vec![Content { parts: vec![Part { text: prompt.to_string() }] }],
      generation_config: GenerationConfigReq {
        temperature: sampling.temperature,
        top_k: sampling.top_k,
        top_p: sampling.top_p,
        max_output_tokens: sampling.max_output_tokens,
        response_mime_type: "application/json".into(),
      },
    };

    let res = self
      .client
      .post(self.endpoint())
      .query(&[("key", self.api_key.as_str())])
      .header(USER_AGENT, "schoolpower-builder/0.1")
      .header(CONTENT_TYPE, "application/json")
      .json(&req)
      .send()
      .await
      .map_err(|e| GenerationError::Transport { reason: e.without_url().to_string() })?;

    let status = res.status();
    if !status.is_success() {
      let body = res.text().await.unwrap_or_default();
      let message = extract_api_error(&body).unwrap_or(body);
      return Err(GenerationError::Upstream { status: Some(status.as_u16()), message });
    }

    let body: GenerateContentResponse = res.json().await.map_err(|e| GenerationError::from(e.without_url()))?;
    if let Some(usage) = &body.usage_metadata {
      info!(target: "generation", prompt_tokens = ?usage.prompt_token_count, completion_tokens = ?usage.candidates_token_count, total_tokens = ?usage.total_token_count, "Gemini usage");
    }

    let text = body
      .candidates
      .first()
      .and_then(|c| c.content.as_ref())
      .and_then(|c| c.parts.first())
      .map(|p| p.text.trim().to_string())
      .unwrap_or_default();

    if text.is_empty() {
      return Err(GenerationError::Upstream { status: Some(status.as_u16()), message: "empty completion".into() });
    }
    Ok(text)
  }
}

#[async_trait]
impl GenerationClient for GeminiClient {
  #[instrument(level = "info", skip(self, prompt, sampling), fields(model = %self.model, prompt_len = prompt.len()))]
  async fn generate(&self, prompt: &str, sampling: &SamplingConfig) -> Result<String, GenerationError> {
    let start = Instant::now();
    let result = self
      .retry
      .run(|attempt| async move {
        if attempt > 0 {
          info!(target: "generation", attempt, "Retrying Gemini call");
        }
        self.call_once(prompt, sampling).await
      }, GenerationError::is_retryable)
      .await;
    let elapsed: Duration = start.elapsed();

    match &result {
      Ok(text) => info!(target: "generation", ?elapsed, response_len = text.len(), "Model response received"),
      Err(e) => error!(target: "generation", ?elapsed, error = %e, "Model call failed"),
    }
    result
  }

  fn name(&self) -> &str {
    &self.model
  }
}

/// Stand-in used when no API key is configured: every call fails upstream,
/// so each build takes the fallback path.
#[derive(Clone, Debug, Default)]
pub struct DisabledClient;

#[async_trait]
impl GenerationClient for DisabledClient {
  async fn generate(&self, _prompt: &str, _sampling: &SamplingConfig) -> Result<String, GenerationError> {
    Err(GenerationError::Upstream { status: None, message: "generation disabled (no GEMINI_API_KEY)".into() })
  }

  fn name(&self) -> &str {
    "disabled"
  }
}

// --- Gemini DTOs ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
  contents: Vec<Content>,
  generation_config: GenerationConfigReq,
}
#[derive(Serialize)]
struct Content { parts: Vec<Part> }
#[derive(Serialize)]
struct Part { text: String }
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfigReq {
  temperature: f32,
  top_k: u32,
  top_p: f32,
  max_output_tokens: u32,
  response_mime_type: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
  #[serde(default)] candidates: Vec<Candidate>,
  #[serde(default)] usage_metadata: Option<UsageMetadata>,
}
#[derive(Deserialize)]
struct Candidate { #[serde(default)] content: Option<CandidateContent> }
#[derive(Deserialize)]
struct CandidateContent { #[serde(default)] parts: Vec<CandidatePart> }
#[derive(Deserialize)]
struct CandidatePart { #[serde(default)] text: String }
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
  #[serde(default)] prompt_token_count: Option<u32>,
  #[serde(default)] candidates_token_count: Option<u32>,
  #[serde(default)] total_token_count: Option<u32>,
}

/// Try to extract a clean error message from a Gemini error body.
fn extract_api_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}
