//! Scripted agents and inference services for tests
//!
//! Available under `cfg(test)` and with the `testing` feature.

use crate::agents::{SharedAgent, SpecializedAgent};
use crate::error::{AgentError, Result};
use crate::inference::{CompletionResult, ModelInferenceService};
use crate::models::{AgentRequest, AgentResponse, CapabilityAssessment, SpecializationSet};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Agent with a fixed, configurable behavior
///
/// By default it can handle every request with score `0.5` and answers with
/// `"<id> output"` at confidence `0.9`.
pub struct ScriptedAgent {
    id: String,
    specializations: SpecializationSet,
    assessment: CapabilityAssessment,
    assessment_fails: bool,
    response: AgentResponse,
    failures_remaining: AtomicU32,
    failure_message: String,
    panic_message: Option<String>,
    delay: Option<Duration>,
    invocations: AtomicUsize,
    inputs: Mutex<Vec<AgentRequest>>,
    collaborators_seen: Mutex<Vec<Vec<String>>>,
}

impl ScriptedAgent {
    /// Create an agent declaring `specializations`
    pub fn new(id: impl Into<String>, specializations: SpecializationSet) -> Self {
        let id = id.into();
        let response = AgentResponse::success(format!("{} output", id), 0.9);
        Self {
            id,
            specializations,
            assessment: CapabilityAssessment::new(true, 0.5),
            assessment_fails: false,
            response,
            failures_remaining: AtomicU32::new(0),
            failure_message: String::new(),
            panic_message: None,
            delay: None,
            invocations: AtomicUsize::new(0),
            inputs: Mutex::new(Vec::new()),
            collaborators_seen: Mutex::new(Vec::new()),
        }
    }

    /// Report `score` as a capable agent
    pub fn with_score(mut self, score: f64) -> Self {
        self.assessment = CapabilityAssessment::new(true, score);
        self
    }

    /// Report that the agent cannot handle any request
    pub fn unable(mut self) -> Self {
        self.assessment = CapabilityAssessment::cannot_handle();
        self
    }

    /// Make `assess_capability` return an error
    pub fn with_failing_assessment(mut self) -> Self {
        self.assessment_fails = true;
        self
    }

    /// Answer every invocation with `response`
    pub fn with_response(mut self, response: AgentResponse) -> Self {
        self.response = response;
        self
    }

    /// Fail the first `times` invocations with `message`
    pub fn failing(mut self, times: u32, message: impl Into<String>) -> Self {
        self.failures_remaining = AtomicU32::new(times);
        self.failure_message = message.into();
        self
    }

    /// Fail every invocation with `message`
    pub fn always_failing(self, message: impl Into<String>) -> Self {
        self.failing(u32::MAX, message)
    }

    /// Panic on every invocation
    pub fn panicking(mut self, message: impl Into<String>) -> Self {
        self.panic_message = Some(message.into());
        self
    }

    /// Sleep for `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `process`/`coordinate` invocations
    pub fn invocation_count(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Inputs received by `process`/`coordinate`, in order
    pub fn received_inputs(&self) -> Vec<String> {
        self.inputs
            .lock()
            .map(|inputs| inputs.iter().map(|r| r.input.clone()).collect())
            .unwrap_or_default()
    }

    /// Requests received by `process`/`coordinate`, in order
    pub fn received_requests(&self) -> Vec<AgentRequest> {
        self.inputs
            .lock()
            .map(|inputs| inputs.clone())
            .unwrap_or_default()
    }

    /// Collaborator IDs passed to each `coordinate` call
    pub fn collaborators_seen(&self) -> Vec<Vec<String>> {
        self.collaborators_seen
            .lock()
            .map(|seen| seen.clone())
            .unwrap_or_default()
    }

    async fn answer(&self, request: &AgentRequest) -> Result<AgentResponse> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut inputs) = self.inputs.lock() {
            inputs.push(request.clone());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = &self.panic_message {
            panic!("{}", message);
        }

        let should_fail = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                match remaining {
                    0 => None,
                    u32::MAX => Some(u32::MAX),
                    n => Some(n - 1),
                }
            })
            .is_ok();
        if should_fail {
            return Err(AgentError::execution_failed(self.failure_message.clone()));
        }

        Ok(self.response.clone())
    }
}

#[async_trait]
impl SpecializedAgent for ScriptedAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn specializations(&self) -> &SpecializationSet {
        &self.specializations
    }

    async fn assess_capability(&self, _request: &AgentRequest) -> Result<CapabilityAssessment> {
        if self.assessment_fails {
            return Err(AgentError::execution_failed("assessment unavailable"));
        }
        Ok(self.assessment)
    }

    async fn process(&self, request: &AgentRequest) -> Result<AgentResponse> {
        self.answer(request).await
    }

    async fn coordinate(
        &self,
        request: &AgentRequest,
        collaborators: &[SharedAgent],
    ) -> Result<AgentResponse> {
        if let Ok(mut seen) = self.collaborators_seen.lock() {
            seen.push(collaborators.iter().map(|c| c.id().to_string()).collect());
        }
        self.answer(request).await
    }
}

#[derive(Debug, Clone)]
enum OracleReply {
    Complete(CompletionResult),
    Error(String),
}

/// Inference service answering by prompt substring
///
/// Rules are checked in insertion order; the first rule whose marker occurs
/// in the prompt decides the reply. Without a matching rule the default
/// reply is an unparseable, successful completion.
pub struct ScriptedOracle {
    rules: Vec<(String, OracleReply)>,
    default: OracleReply,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedOracle {
    /// Oracle that answers every prompt with text containing no structure
    pub fn unparseable() -> Self {
        Self {
            rules: Vec::new(),
            default: OracleReply::Complete(CompletionResult::ok(
                "I am unable to provide a structured answer right now",
            )),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Oracle that reports failure for every prompt
    pub fn failing() -> Self {
        Self::unparseable().otherwise(CompletionResult::failed())
    }

    /// Replace the default reply
    pub fn otherwise(mut self, result: CompletionResult) -> Self {
        self.default = OracleReply::Complete(result);
        self
    }

    /// Answer prompts containing `marker` with `text`
    pub fn when(mut self, marker: impl Into<String>, text: impl Into<String>) -> Self {
        self.rules.push((
            marker.into(),
            OracleReply::Complete(CompletionResult::ok(text)),
        ));
        self
    }

    /// Report an unsuccessful completion for prompts containing `marker`
    pub fn fail_when(mut self, marker: impl Into<String>) -> Self {
        self.rules.push((
            marker.into(),
            OracleReply::Complete(CompletionResult::failed()),
        ));
        self
    }

    /// Return an error for prompts containing `marker`
    pub fn error_when(mut self, marker: impl Into<String>, message: impl Into<String>) -> Self {
        self.rules
            .push((marker.into(), OracleReply::Error(message.into())));
        self
    }

    /// Prompts received, in order
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|prompts| prompts.clone())
            .unwrap_or_default()
    }

    /// Prompts containing `marker`
    pub fn prompts_containing(&self, marker: &str) -> Vec<String> {
        self.prompts()
            .into_iter()
            .filter(|prompt| prompt.contains(marker))
            .collect()
    }
}

#[async_trait]
impl ModelInferenceService for ScriptedOracle {
    async fn complete(
        &self,
        prompt: &str,
        _temperature: f32,
        _max_tokens: u32,
    ) -> Result<CompletionResult> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        let reply = self
            .rules
            .iter()
            .find(|(marker, _)| prompt.contains(marker.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| self.default.clone());

        match reply {
            OracleReply::Complete(result) => Ok(result),
            OracleReply::Error(message) => Err(AgentError::inference_failed(message)),
        }
    }
}
