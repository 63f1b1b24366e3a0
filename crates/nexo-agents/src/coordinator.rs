//! Agent coordinator for complex, multi-specialization tasks

use crate::config::CoordinatorConfig;
use crate::error::{AgentError, Result};
use crate::events::{CoordinationEvent, SharedObserver, TracingObserver};
use crate::executor::WorkflowExecutor;
use crate::inference::{InferenceClient, SharedInference};
use crate::models::{AgentResponse, AgentSpecialization, ComplexAgentRequest, SpecializationSet};
use crate::planner::{WorkflowPlanner, DEFAULT_ORDER};
use crate::registry::AgentRegistry;
use crate::selector::AgentSelector;
use crate::synthesizer::ResponseSynthesizer;
use crate::workflow::AgentWorkflow;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// First line of every specialization analysis prompt
pub const ANALYSIS_PROMPT_HEADER: &str = "## Specialization Analysis Request";

/// Coordinates a complex task across the registered agents
///
/// One call runs the whole pipeline: analyze the required specializations,
/// select one agent per specialization, plan and optimize a workflow,
/// execute it step by step, and synthesize the final answer. The registry
/// and the inference service are shared and only read, so concurrent calls
/// need no synchronization.
///
/// # Examples
///
/// ```ignore
/// use nexo_agents::{AgentCoordinator, AgentRegistry, ComplexAgentRequest, HttpInferenceService};
/// use std::sync::Arc;
///
/// let coordinator = AgentCoordinator::new(
///     Arc::new(registry),
///     Arc::new(HttpInferenceService::new("http://localhost:11434", "llama3.2")),
/// );
/// let response = coordinator
///     .coordinate_complex_task(&ComplexAgentRequest::new("Generate a login endpoint"))
///     .await;
/// ```
pub struct AgentCoordinator {
    registry: Arc<AgentRegistry>,
    inference: SharedInference,
    config: CoordinatorConfig,
    observer: SharedObserver,
}

impl AgentCoordinator {
    /// Create a coordinator with the default configuration
    pub fn new(registry: Arc<AgentRegistry>, inference: SharedInference) -> Self {
        Self {
            registry,
            inference,
            config: CoordinatorConfig::default(),
            observer: Arc::new(TracingObserver),
        }
    }

    /// Use `config` for timeouts, retries and sampling settings
    pub fn with_config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Report events to `observer`
    pub fn with_observer(mut self, observer: SharedObserver) -> Self {
        self.observer = observer;
        self
    }

    /// The agent registry
    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// The active configuration
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Coordinate `request` across the registered agents
    ///
    /// Never fails: every problem is reported inside the returned response.
    pub async fn coordinate_complex_task(&self, request: &ComplexAgentRequest) -> AgentResponse {
        self.coordinate_complex_task_with_cancellation(request, &CancellationToken::new())
            .await
    }

    /// Coordinate `request`, aborting when `cancel` fires
    ///
    /// A cancelled coordination runs no further steps, skips synthesis and
    /// returns [`AgentResponse::cancelled`].
    pub async fn coordinate_complex_task_with_cancellation(
        &self,
        request: &ComplexAgentRequest,
        cancel: &CancellationToken,
    ) -> AgentResponse {
        self.observer.on_event(&CoordinationEvent::TaskStarted {
            description_len: request.description.len(),
            pool_size: self.registry.agent_count(),
        });

        let response = match self.run(request, cancel).await {
            Ok(response) => response,
            Err(e) if e.is_cancelled() => AgentResponse::cancelled(),
            Err(e) => AgentResponse::failure(format!("Coordination failed: {}", e)),
        };

        let step_count = response
            .metadata
            .get("step_order")
            .and_then(|order| order.as_array())
            .map(|order| order.len())
            .unwrap_or(0);
        self.observer.on_event(&CoordinationEvent::TaskCompleted {
            success: response.success,
            confidence: response.confidence,
            step_count,
        });
        response
    }

    /// Determine the specializations `request` needs
    ///
    /// Asks the inference service first. When it fails or names nothing, the
    /// set is derived from the request's requirements and widened with every
    /// specialization the registry covers.
    pub async fn analyze_required_specializations(
        &self,
        request: &ComplexAgentRequest,
        cancel: &CancellationToken,
    ) -> Result<SpecializationSet> {
        let client = self.inference_client();
        self.analyze_with(&client, request, cancel).await
    }

    async fn run(
        &self,
        request: &ComplexAgentRequest,
        cancel: &CancellationToken,
    ) -> Result<AgentResponse> {
        let client = self.inference_client();

        let workflow = match self.prepare(&client, request, cancel).await {
            Ok(workflow) => workflow,
            Err(e) => {
                if e.is_cancelled() {
                    self.observer
                        .on_event(&CoordinationEvent::CoordinationCancelled { completed_steps: 0 });
                }
                return Err(e);
            }
        };

        let executor = WorkflowExecutor::new()
            .with_timeout(self.config.step_timeout())
            .with_retry(self.config.retry.clone())
            .with_observer(self.observer.clone());
        let coordinated = executor.execute(&workflow, cancel).await?;

        let synthesizer = ResponseSynthesizer::new(client)
            .with_settings(self.config.synthesis)
            .with_observer(self.observer.clone());
        let synthesized = if cancel.is_cancelled() {
            Err(AgentError::Cancelled)
        } else {
            synthesizer.synthesize(&coordinated, request, cancel).await
        };
        let response = match synthesized {
            Ok(response) => response,
            Err(e) => {
                if e.is_cancelled() {
                    self.observer.on_event(&CoordinationEvent::CoordinationCancelled {
                        completed_steps: coordinated.step_order.len(),
                    });
                }
                return Err(e);
            }
        };

        Ok(response
            .with_metadata("workflow_id", json!(workflow.workflow_id))
            .with_metadata("workflow_name", json!(workflow.name)))
    }

    /// Analysis, selection, planning and optimization
    async fn prepare(
        &self,
        client: &InferenceClient,
        request: &ComplexAgentRequest,
        cancel: &CancellationToken,
    ) -> Result<AgentWorkflow> {
        let required = self.analyze_with(client, request, cancel).await?;

        let selector = AgentSelector::new(self.registry.clone())
            .with_timeout(self.config.step_timeout())
            .with_observer(self.observer.clone());
        let agents = selector
            .select_optimal_agents(&required, request, cancel)
            .await?;

        let planner = WorkflowPlanner::new(client.clone())
            .with_settings(self.config.planning, self.config.optimization)
            .with_observer(self.observer.clone());
        let workflow = planner.create_workflow(&agents, request, cancel).await?;

        if self.config.apply_optimization {
            planner.optimize_workflow(&workflow, cancel).await
        } else {
            Ok(workflow)
        }
    }

    async fn analyze_with(
        &self,
        client: &InferenceClient,
        request: &ComplexAgentRequest,
        cancel: &CancellationToken,
    ) -> Result<SpecializationSet> {
        let prompt = build_analysis_prompt(request);
        let named = match client
            .complete_text(&prompt, self.config.analysis, cancel)
            .await
        {
            Ok(text) => AgentSpecialization::mentioned_in(&text),
            Err(e) if e.is_cancelled() => return Err(e),
            Err(_) => SpecializationSet::new(),
        };

        let from_inference = !named.is_empty();
        let required = if from_inference {
            named
        } else {
            let covered = self.registry.covered_specializations();
            let mut derived = derive_from_requirements(request);
            for spec in DEFAULT_ORDER {
                if covered.contains(spec) {
                    derived.insert(spec);
                }
            }
            derived
        };

        self.observer
            .on_event(&CoordinationEvent::SpecializationsAnalyzed {
                specializations: required.iter().collect(),
                from_inference,
            });
        Ok(required)
    }

    fn inference_client(&self) -> InferenceClient {
        InferenceClient::new(self.inference.clone(), self.config.inference_timeout())
    }
}

/// Specializations implied by the request's explicit requirements
fn derive_from_requirements(request: &ComplexAgentRequest) -> SpecializationSet {
    let mut required = SpecializationSet::new();
    if request.security_requirements.is_some() {
        required.insert(AgentSpecialization::SecurityAnalysis);
    }
    if request.performance_requirements.is_some() {
        required.insert(AgentSpecialization::PerformanceOptimization);
    }
    if !request.target_platforms.is_empty() {
        required.insert(AgentSpecialization::PlatformSpecific);
    }
    required.insert(AgentSpecialization::CodeQuality);
    required
}

fn build_analysis_prompt(request: &ComplexAgentRequest) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!("{}\n", ANALYSIS_PROMPT_HEADER));
    prompt.push('\n');
    prompt.push_str(&format!("Task: {}\n", request.description));
    if !request.target_platforms.is_empty() {
        prompt.push_str(&format!(
            "Target platforms: {}\n",
            request.target_platforms.join(", ")
        ));
    }
    if let Some(performance) = &request.performance_requirements {
        prompt.push_str(&format!(
            "Performance: target {:?}, minimum level {:?}\n",
            performance.primary_target, performance.minimum_level
        ));
    }
    if let Some(security) = &request.security_requirements {
        prompt.push_str(&format!("Security level: {:?}\n", security.required_level));
    }
    if let Some(quality) = &request.quality_requirements {
        prompt.push_str(&format!("Quality bar: {:?}\n", quality.minimum_quality));
    }

    let known: Vec<&str> = AgentSpecialization::ALL
        .iter()
        .filter(|spec| **spec != AgentSpecialization::None)
        .map(|spec| spec.name())
        .collect();
    prompt.push('\n');
    prompt.push_str(&format!("Known specializations: {}\n", known.join(", ")));
    prompt.push_str("Answer with a comma-separated list of the specializations this task requires.");
    prompt
}
