//! Final result synthesis

use crate::config::InferenceSettings;
use crate::error::Result;
use crate::events::{CoordinationEvent, SharedObserver, TracingObserver};
use crate::executor::CoordinatedResponse;
use crate::inference::InferenceClient;
use crate::models::{unit_interval, AgentResponse, ComplexAgentRequest};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// First line of every synthesis prompt
pub const SYNTHESIS_PROMPT_HEADER: &str = "## Result Synthesis Request";

/// Upper bound on the confidence of a coordinated answer
pub const MAX_COORDINATED_CONFIDENCE: f64 = 0.95;

/// Merges step outputs into one answer through a single inference call
pub struct ResponseSynthesizer {
    inference: InferenceClient,
    settings: InferenceSettings,
    observer: SharedObserver,
}

impl ResponseSynthesizer {
    /// Create a synthesizer using `inference`
    pub fn new(inference: InferenceClient) -> Self {
        Self {
            inference,
            settings: InferenceSettings::new(0.5, 4000),
            observer: Arc::new(TracingObserver),
        }
    }

    /// Override the sampling settings of the synthesis call
    pub fn with_settings(mut self, settings: InferenceSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Report events to `observer`
    pub fn with_observer(mut self, observer: SharedObserver) -> Self {
        self.observer = observer;
        self
    }

    /// Synthesize the final response for `request`
    ///
    /// An oracle failure yields a failed response with zero confidence.
    /// Only cancellation is returned as an error.
    pub async fn synthesize(
        &self,
        coordinated: &CoordinatedResponse,
        request: &ComplexAgentRequest,
        cancel: &CancellationToken,
    ) -> Result<AgentResponse> {
        let prompt = build_synthesis_prompt(coordinated, request);
        let text = match self
            .inference
            .complete_text(&prompt, self.settings, cancel)
            .await
        {
            Ok(text) => text,
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                self.observer.on_event(&CoordinationEvent::SynthesisFailed {
                    error: e.to_string(),
                });
                return Ok(AgentResponse::failure(format!(
                    "Failed to synthesize final response: {}",
                    e
                ))
                .with_metadata("step_order", json!(coordinated.step_order)));
            }
        };

        let response = AgentResponse::success(text, coordinated_confidence(coordinated))
            .with_metadata("step_responses", serde_json::to_value(&coordinated.responses)?)
            .with_metadata("step_order", json!(coordinated.step_order))
            .with_metadata("agent_count", json!(coordinated.agent_count()));
        Ok(response)
    }
}

/// Mean confidence of contributing steps, capped at [`MAX_COORDINATED_CONFIDENCE`]
///
/// Failed steps and declined steps do not count. Each step's confidence is
/// read as `[0.0, 1.0]`, non-finite values as zero. Without any contributing step the
/// confidence is zero.
pub fn coordinated_confidence(coordinated: &CoordinatedResponse) -> f64 {
    let confidences: Vec<f64> = coordinated
        .ordered()
        .filter(|(_, response)| response.contributes())
        .map(|(_, response)| unit_interval(response.confidence))
        .collect();
    if confidences.is_empty() {
        return 0.0;
    }
    let mean = confidences.iter().sum::<f64>() / confidences.len() as f64;
    mean.clamp(0.0, MAX_COORDINATED_CONFIDENCE)
}

fn build_synthesis_prompt(coordinated: &CoordinatedResponse, request: &ComplexAgentRequest) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!("{}\n", SYNTHESIS_PROMPT_HEADER));
    prompt.push('\n');
    prompt.push_str(&format!("Original request: {}\n", request.description));
    let platforms = if request.target_platforms.is_empty() {
        "none specified".to_string()
    } else {
        request.target_platforms.join(", ")
    };
    prompt.push_str(&format!("Target platforms: {}\n", platforms));
    prompt.push('\n');
    prompt.push_str("Results from specialized agents:\n");

    let mut any_result = false;
    for (step, response) in coordinated.ordered() {
        if !response.contributes() || response.result.trim().is_empty() {
            continue;
        }
        any_result = true;
        prompt.push_str(&format!("\n### {}\n{}\n", step, response.result));
    }
    if !any_result {
        prompt.push_str("(no successful results)\n");
    }

    prompt.push('\n');
    prompt.push_str(
        "Combine these results into one cohesive, production-ready deliverable. \
         Resolve conflicts between the results, keep every security and performance \
         measure, and make sure the output fits the target platforms.",
    );
    prompt
}
