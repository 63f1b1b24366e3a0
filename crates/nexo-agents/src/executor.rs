//! Sequential workflow execution
//!
//! Steps run strictly in declared order. Each step sees the successful
//! results of the steps before it and the shared context they published.
//! A failing step is recorded and execution continues; a step asking for
//! termination stops the workflow; cancellation aborts it.

use crate::agents::SharedAgent;
use crate::config::RetryConfig;
use crate::error::{AgentError, Result};
use crate::events::{CoordinationEvent, SharedObserver, TracingObserver};
use crate::models::{unit_interval, AgentRequest, AgentResponse};
use crate::workflow::{AgentWorkflow, WorkflowStep};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Response metadata key whose JSON object is merged into the shared context
pub const SHARED_CONTEXT_KEY: &str = "shared_context";

/// Values accumulated across the steps of one execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Shared values published by successful steps; later steps overwrite earlier ones
    pub shared_results: BTreeMap<String, Value>,
    /// Names of the steps that ran, in order
    pub completed_steps: Vec<String>,
}

/// Responses collected while executing one workflow
#[derive(Debug, Clone, Default)]
pub struct CoordinatedResponse {
    /// Response of every executed step, keyed by step name
    pub responses: HashMap<String, AgentResponse>,
    /// Executed step names, in order
    pub step_order: Vec<String>,
    /// Shared context after the last executed step
    pub execution_context: ExecutionContext,
    /// Distinct IDs of the agents that ran a step, in order of first use
    pub participating_agents: Vec<String>,
    /// Whether a step stopped the workflow before its end
    pub terminated_early: bool,
}

impl CoordinatedResponse {
    /// Response of `step`, if it ran
    pub fn response(&self, step: &str) -> Option<&AgentResponse> {
        self.responses.get(step)
    }

    /// Executed steps with their responses, in execution order
    pub fn ordered(&self) -> impl Iterator<Item = (&str, &AgentResponse)> + '_ {
        self.step_order
            .iter()
            .filter_map(|name| self.responses.get(name).map(|r| (name.as_str(), r)))
    }

    /// Number of distinct agents that ran a step
    pub fn agent_count(&self) -> usize {
        self.participating_agents.len()
    }

    fn record(&mut self, step: &WorkflowStep, response: AgentResponse) {
        if response.success {
            if let Some(Value::Object(shared)) = response.metadata.get(SHARED_CONTEXT_KEY) {
                for (key, value) in shared {
                    self.execution_context
                        .shared_results
                        .insert(key.clone(), value.clone());
                }
            }
        }

        let agent_id = step.agent_id();
        if !self.participating_agents.iter().any(|id| id == agent_id) {
            self.participating_agents.push(agent_id.to_string());
        }
        self.execution_context
            .completed_steps
            .push(step.name.clone());
        self.step_order.push(step.name.clone());
        self.responses.insert(step.name.clone(), response);
    }
}

/// Runs workflow steps one after another
pub struct WorkflowExecutor {
    step_timeout: Option<Duration>,
    retry: RetryConfig,
    observer: SharedObserver,
}

impl WorkflowExecutor {
    /// Create an executor without timeouts, using the default retry policy
    pub fn new() -> Self {
        Self {
            step_timeout: None,
            retry: RetryConfig::default(),
            observer: Arc::new(TracingObserver),
        }
    }

    /// Bound each agent invocation by `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.step_timeout = timeout;
        self
    }

    /// Use `retry` for invocations that fail, time out or panic
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Report events to `observer`
    pub fn with_observer(mut self, observer: SharedObserver) -> Self {
        self.observer = observer;
        self
    }

    /// Execute `workflow` step by step
    ///
    /// Returns `Cancelled` when `cancel` fires; the steps completed so far
    /// are discarded.
    pub async fn execute(
        &self,
        workflow: &AgentWorkflow,
        cancel: &CancellationToken,
    ) -> Result<CoordinatedResponse> {
        let mut coordinated = CoordinatedResponse::default();

        for (index, step) in workflow.steps.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(self.cancelled(&coordinated));
            }

            let request = contextual_request(step, &coordinated);
            self.observer.on_event(&CoordinationEvent::StepStarted {
                step: step.name.clone(),
                agent_id: step.agent_id().to_string(),
                coordinated: step.requires_coordination,
            });

            let started = Instant::now();
            let response = match self.invoke_with_retry(step, &request, cancel).await {
                Ok(response) => settle(response, &step.name),
                Err(e) if e.is_cancelled() => return Err(self.cancelled(&coordinated)),
                Err(e) => AgentResponse::failure(e.to_string()),
            };
            let duration_ms = started.elapsed().as_millis() as u64;

            let response = response
                .with_metadata("agent_id", json!(step.agent_id()))
                .with_metadata("duration_ms", json!(duration_ms));
            self.observer.on_event(&CoordinationEvent::StepCompleted {
                step: step.name.clone(),
                success: response.success,
                confidence: response.confidence,
                duration_ms,
            });

            let terminate = response.should_terminate_workflow;
            coordinated.record(step, response);

            if terminate {
                let skipped_steps = workflow.len() - index - 1;
                self.observer.on_event(&CoordinationEvent::WorkflowTerminated {
                    step: step.name.clone(),
                    skipped_steps,
                });
                coordinated.terminated_early = skipped_steps > 0;
                break;
            }
        }

        Ok(coordinated)
    }

    fn cancelled(&self, coordinated: &CoordinatedResponse) -> AgentError {
        self.observer
            .on_event(&CoordinationEvent::CoordinationCancelled {
                completed_steps: coordinated.step_order.len(),
            });
        AgentError::Cancelled
    }

    async fn invoke_with_retry(
        &self,
        step: &WorkflowStep,
        request: &AgentRequest,
        cancel: &CancellationToken,
    ) -> Result<AgentResponse> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let error = match self.invoke_once(step, request, cancel).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => e,
            };

            self.observer.on_event(&CoordinationEvent::StepAttemptFailed {
                step: step.name.clone(),
                attempt,
                error: error.to_string(),
            });
            if attempt > self.retry.max_retries {
                return Err(error);
            }

            let backoff = self.retry.backoff_for(attempt);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                _ = tokio::time::sleep(backoff) => {}
            }
        }
    }

    async fn invoke_once(
        &self,
        step: &WorkflowStep,
        request: &AgentRequest,
        cancel: &CancellationToken,
    ) -> Result<AgentResponse> {
        let agent: &SharedAgent = &step.assigned_agent;
        let call = async {
            if step.requires_coordination {
                agent.coordinate(request, &step.collaborators).await
            } else {
                agent.process(request).await
            }
        };

        let guarded = async {
            match AssertUnwindSafe(call).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => Err(AgentError::internal(format!(
                    "agent {} panicked: {}",
                    agent.id(),
                    panic_message(&*panic)
                ))),
            }
        };

        let bounded = async {
            match self.step_timeout {
                Some(limit) => tokio::time::timeout(limit, guarded)
                    .await
                    .unwrap_or_else(|_| Err(AgentError::timeout(limit.as_millis() as u64))),
                None => guarded.await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AgentError::Cancelled),
            outcome = bounded => outcome,
        }
    }
}

impl Default for WorkflowExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// The step's base request extended with earlier results and shared context
fn contextual_request(step: &WorkflowStep, coordinated: &CoordinatedResponse) -> AgentRequest {
    let mut request = step.request.clone();

    let previous: Vec<(&str, &AgentResponse)> = coordinated
        .ordered()
        .filter(|(_, response)| response.success && !response.result.trim().is_empty())
        .collect();
    if !previous.is_empty() {
        request.input.push_str("\n\nPrevious Results:\n");
        for (name, response) in previous {
            request.input.push_str(&format!("\n### {}\n{}\n", name, response.result));
        }
    }

    let shared = &coordinated.execution_context.shared_results;
    if !shared.is_empty() {
        request.input.push_str("\n\nShared Context:\n");
        for (key, value) in shared {
            let rendered = match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            request.input.push_str(&format!("- {}: {}\n", key, rendered));
        }
    }

    request
}

/// Keep `error_message` present exactly when the response is unsuccessful
fn settle(mut response: AgentResponse, step: &str) -> AgentResponse {
    response.confidence = unit_interval(response.confidence);
    if response.success {
        response.error_message = None;
    } else if response
        .error_message
        .as_deref()
        .map_or(true, |message| message.trim().is_empty())
    {
        response.error_message = Some(format!("step {} failed without an error message", step));
    }
    response
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
