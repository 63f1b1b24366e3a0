//! Inference service contract and clients
//!
//! The coordinator uses a text-completion service twice per coordination
//! (planning and synthesis) plus once for requirement analysis. The service
//! is treated as an unreliable, stateless request/response boundary.

use crate::config::InferenceSettings;
use crate::error::{AgentError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Result of a completion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResult {
    /// Whether the service produced a completion
    pub success: bool,
    /// Completion text
    pub text: String,
}

impl CompletionResult {
    /// Successful completion
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            success: true,
            text: text.into(),
        }
    }

    /// Unsuccessful completion
    pub fn failed() -> Self {
        Self {
            success: false,
            text: String::new(),
        }
    }
}

/// Text-completion oracle
#[async_trait]
pub trait ModelInferenceService: Send + Sync {
    /// Complete `prompt`
    async fn complete(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<CompletionResult>;
}

/// Shared inference service handle
pub type SharedInference = Arc<dyn ModelInferenceService>;

#[derive(Debug, Serialize)]
struct CompletionRequestBody<'a> {
    model: &'a str,
    prompt: &'a str,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponseBody {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    text: String,
}

/// Inference service backed by an OpenAI-compatible `/v1/completions` endpoint
///
/// # Examples
///
/// ```ignore
/// use nexo_agents::HttpInferenceService;
///
/// let oracle = HttpInferenceService::new("http://localhost:11434", "llama3.2")
///     .with_api_key(std::env::var("NEXO_API_KEY").ok());
/// ```
#[derive(Debug, Clone)]
pub struct HttpInferenceService {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpInferenceService {
    /// Create a client for `base_url` using `model`
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            api_key: None,
        }
    }

    /// Set the bearer token sent with each request
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    /// Use a preconfigured HTTP client
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ModelInferenceService for HttpInferenceService {
    async fn complete(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<CompletionResult> {
        let body = CompletionRequestBody {
            model: &self.model,
            prompt,
            temperature,
            max_tokens,
        };

        let mut request = self.client.post(self.endpoint()).json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, model = %self.model, "Inference endpoint returned an error status");
            return Ok(CompletionResult::failed());
        }

        let parsed: CompletionResponseBody = response.json().await?;
        match parsed.choices.into_iter().next() {
            Some(choice) => {
                debug!(model = %self.model, chars = choice.text.len(), "Received completion");
                Ok(CompletionResult::ok(choice.text))
            }
            None => Ok(CompletionResult::failed()),
        }
    }
}

/// Inference service wrapper applying timeouts and cancellation
///
/// Every outcome other than a successful completion becomes an `Err`:
/// `Cancelled` when the token fires, `Timeout` when the limit elapses, and
/// `InferenceFailed` when the service reports failure.
#[derive(Clone)]
pub struct InferenceClient {
    service: SharedInference,
    timeout: Option<Duration>,
}

impl InferenceClient {
    /// Wrap `service` with an optional per-call timeout
    pub fn new(service: SharedInference, timeout: Option<Duration>) -> Self {
        Self { service, timeout }
    }

    /// Complete `prompt` and return the text of a successful completion
    pub async fn complete_text(
        &self,
        prompt: &str,
        settings: InferenceSettings,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let call = self
            .service
            .complete(prompt, settings.temperature, settings.max_tokens);
        let bounded = async {
            match self.timeout {
                Some(limit) => match tokio::time::timeout(limit, call).await {
                    Ok(result) => result,
                    Err(_) => Err(AgentError::timeout(limit.as_millis() as u64)),
                },
                None => call.await,
            }
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            outcome = bounded => outcome,
        };

        let completion = outcome?;
        if completion.success {
            Ok(completion.text)
        } else {
            Err(AgentError::inference_failed(
                "inference service reported an unsuccessful completion",
            ))
        }
    }
}
