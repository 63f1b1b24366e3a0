//! Workflow planning
//!
//! The planner asks the inference service for a step structure and treats the
//! answer as an untrusted suggestion. A JSON plan is tried first, then
//! `StepName: AgentId` lines. When neither yields a step, a fixed default
//! ordering over the supplied agents is used.

use crate::agents::SharedAgent;
use crate::config::InferenceSettings;
use crate::error::Result;
use crate::events::{CoordinationEvent, PlanSource, SharedObserver, TracingObserver};
use crate::inference::InferenceClient;
use crate::models::{
    AgentRequest, AgentSpecialization, ComplexAgentRequest, PerformanceConstraints,
};
use crate::workflow::{AgentWorkflow, WorkflowStep};
use serde::Deserialize;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// First line of every planning prompt
pub const PLANNING_PROMPT_HEADER: &str = "## Workflow Planning Request";

/// First line of every optimization prompt
pub const OPTIMIZATION_PROMPT_HEADER: &str = "## Workflow Optimization Request";

/// Specializations covered by the default ordering, in step order
pub(crate) const DEFAULT_ORDER: [AgentSpecialization; 4] = [
    AgentSpecialization::SecurityAnalysis,
    AgentSpecialization::PerformanceOptimization,
    AgentSpecialization::PlatformSpecific,
    AgentSpecialization::CodeQuality,
];

/// Keywords mapping step names onto specializations, checked in order
const STEP_KEYWORDS: [(&str, AgentSpecialization); 6] = [
    ("security", AgentSpecialization::SecurityAnalysis),
    ("performance", AgentSpecialization::PerformanceOptimization),
    ("platform", AgentSpecialization::PlatformSpecific),
    ("quality", AgentSpecialization::CodeQuality),
    ("test", AgentSpecialization::TestGeneration),
    ("documentation", AgentSpecialization::DocumentationGeneration),
];

/// A step before it is bound to a request
struct PlannedStep {
    name: String,
    agent: SharedAgent,
    requires_coordination: bool,
    collaborators: Vec<SharedAgent>,
    declared_specialization: Option<AgentSpecialization>,
    specialization_hint: Option<AgentSpecialization>,
}

#[derive(Deserialize)]
struct JsonPlan {
    steps: Vec<JsonStep>,
}

#[derive(Deserialize)]
struct JsonStep {
    name: String,
    agent_id: String,
    #[serde(default)]
    requires_coordination: bool,
    #[serde(default)]
    specialization: Option<String>,
}

#[derive(Deserialize)]
struct JsonOrder {
    order: Vec<String>,
}

/// Builds and optimizes workflows over a set of selected agents
pub struct WorkflowPlanner {
    inference: InferenceClient,
    planning: InferenceSettings,
    optimization: InferenceSettings,
    observer: SharedObserver,
}

impl WorkflowPlanner {
    /// Create a planner using `inference` for structure suggestions
    pub fn new(inference: InferenceClient) -> Self {
        Self {
            inference,
            planning: InferenceSettings::new(0.3, 1000),
            optimization: InferenceSettings::new(0.3, 800),
            observer: Arc::new(TracingObserver),
        }
    }

    /// Override the sampling settings of the planning and optimization calls
    pub fn with_settings(
        mut self,
        planning: InferenceSettings,
        optimization: InferenceSettings,
    ) -> Self {
        self.planning = planning;
        self.optimization = optimization;
        self
    }

    /// Report events to `observer`
    pub fn with_observer(mut self, observer: SharedObserver) -> Self {
        self.observer = observer;
        self
    }

    /// Create a workflow binding `agents` to ordered steps for `request`
    ///
    /// Every step's agent belongs to `agents`. An oracle failure or an
    /// unusable plan falls back to the default ordering; only cancellation
    /// is returned as an error.
    pub async fn create_workflow(
        &self,
        agents: &[SharedAgent],
        request: &ComplexAgentRequest,
        cancel: &CancellationToken,
    ) -> Result<AgentWorkflow> {
        let (planned, source) = if agents.is_empty() {
            (Vec::new(), PlanSource::Fallback)
        } else {
            let prompt = build_planning_prompt(agents, request);
            let proposal = match self
                .inference
                .complete_text(&prompt, self.planning, cancel)
                .await
            {
                Ok(text) => {
                    let steps = parse_plan(&text, agents);
                    if steps.is_empty() {
                        Err("inference plan contained no usable steps".to_string())
                    } else {
                        Ok(steps)
                    }
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => Err(format!("inference planning failed: {}", e)),
            };

            match proposal {
                Ok(steps) => (steps, PlanSource::Inference),
                Err(reason) => {
                    self.observer
                        .on_event(&CoordinationEvent::PlanFallback { reason });
                    (fallback_plan(agents), PlanSource::Fallback)
                }
            }
        };

        let workflow = materialize(planned, agents.len(), request, source);
        self.observer.on_event(&CoordinationEvent::WorkflowCreated {
            workflow_id: workflow.workflow_id.clone(),
            step_count: workflow.len(),
            source,
        });
        Ok(workflow)
    }

    /// Reorder a workflow's steps as suggested by the inference service
    ///
    /// A suggestion is applied only when it names every current step exactly
    /// once. Otherwise, and on oracle failure, an unchanged copy is returned.
    pub async fn optimize_workflow(
        &self,
        workflow: &AgentWorkflow,
        cancel: &CancellationToken,
    ) -> Result<AgentWorkflow> {
        if workflow.len() < 2 {
            return Ok(workflow.clone());
        }

        let prompt = build_optimization_prompt(workflow);
        let text = match self
            .inference
            .complete_text(&prompt, self.optimization, cancel)
            .await
        {
            Ok(text) => text,
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                debug!(workflow_id = %workflow.workflow_id, error = %e, "Optimization unavailable");
                self.report_optimized(workflow, false);
                return Ok(workflow.clone());
            }
        };

        let names = workflow.step_names();
        let order = match parse_order(&text, &names) {
            Some(order) => order,
            None => {
                debug!(workflow_id = %workflow.workflow_id, "Optimization suggestion not applicable");
                self.report_optimized(workflow, false);
                return Ok(workflow.clone());
            }
        };

        let reordered = order.iter().enumerate().any(|(i, position)| i != *position);
        let steps = order
            .into_iter()
            .map(|position| workflow.steps[position].clone())
            .collect();
        self.report_optimized(workflow, reordered);
        Ok(workflow.with_steps(steps))
    }

    fn report_optimized(&self, workflow: &AgentWorkflow, reordered: bool) {
        self.observer.on_event(&CoordinationEvent::WorkflowOptimized {
            workflow_id: workflow.workflow_id.clone(),
            reordered,
        });
    }
}

fn build_planning_prompt(agents: &[SharedAgent], request: &ComplexAgentRequest) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!("{}\n", PLANNING_PROMPT_HEADER));
    prompt.push('\n');
    prompt.push_str(&format!("Task: {}\n", request.description));
    prompt.push_str(&format!("Target platforms: {}\n", describe_platforms(request)));
    if let Some(performance) = &request.performance_requirements {
        prompt.push_str(&format!(
            "Performance: target {:?}, minimum level {:?}, real-time {}\n",
            performance.primary_target, performance.minimum_level, performance.requires_real_time
        ));
    }
    if let Some(security) = &request.security_requirements {
        prompt.push_str(&format!("Security level: {:?}\n", security.required_level));
    }
    if let Some(quality) = &request.quality_requirements {
        prompt.push_str(&format!("Quality bar: {:?}\n", quality.minimum_quality));
    }

    prompt.push('\n');
    prompt.push_str("Available agents:\n");
    for agent in agents {
        prompt.push_str(&format!(
            "- {} ({}): {}\n",
            agent.id(),
            agent.name(),
            agent.specializations().describe()
        ));
    }

    prompt.push('\n');
    prompt.push_str(
        "List the workflow steps in execution order, one per line, as `StepName: AgentId`.\n",
    );
    prompt.push_str(
        "Put \"Coordination\" in a step name when its agent must work with the other agents.\n",
    );
    prompt.push_str(
        "You may instead answer with JSON: {\"steps\": [{\"name\": \"...\", \"agent_id\": \"...\", \"specialization\": \"...\", \"requires_coordination\": false}]}",
    );
    prompt
}

fn build_optimization_prompt(workflow: &AgentWorkflow) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!("{}\n", OPTIMIZATION_PROMPT_HEADER));
    prompt.push('\n');
    prompt.push_str(&format!("Workflow: {}\n", workflow.name));
    prompt.push_str("Current steps:\n");
    for (i, step) in workflow.steps.iter().enumerate() {
        let marker = if step.requires_coordination {
            ", coordinated"
        } else {
            ""
        };
        prompt.push_str(&format!(
            "{}. {} (agent {}{})\n",
            i + 1,
            step.name,
            step.agent_id(),
            marker
        ));
    }
    prompt.push('\n');
    prompt.push_str(
        "Suggest a better execution order. Answer with a single line `ORDER: step, step, ...` naming every step exactly once.",
    );
    prompt
}

fn describe_platforms(request: &ComplexAgentRequest) -> String {
    if request.target_platforms.is_empty() {
        "none specified".to_string()
    } else {
        request.target_platforms.join(", ")
    }
}

fn parse_plan(text: &str, agents: &[SharedAgent]) -> Vec<PlannedStep> {
    let by_id: HashMap<&str, &SharedAgent> =
        agents.iter().map(|agent| (agent.id(), agent)).collect();
    let mut taken = HashSet::new();

    if let Some(plan) = extract_json(text).and_then(|json| serde_json::from_str::<JsonPlan>(json).ok())
    {
        return plan
            .steps
            .into_iter()
            .filter_map(|step| {
                let agent = by_id.get(step.agent_id.trim())?;
                let name = clean_step_name(&step.name);
                if name.is_empty() {
                    return None;
                }
                let requires_coordination =
                    step.requires_coordination || mentions_coordination(&name);
                let mut planned = planned_step(
                    unique_name(&mut taken, &name),
                    agent,
                    requires_coordination,
                    agents,
                );
                planned.declared_specialization = step
                    .specialization
                    .as_deref()
                    .and_then(AgentSpecialization::from_name)
                    .filter(|spec| agent.specializations().contains(*spec));
                Some(planned)
            })
            .collect();
    }

    text.lines()
        .filter_map(|line| {
            let (raw_name, raw_agent) = line.split_once(':')?;
            let name = clean_step_name(raw_name);
            let agent_id = clean_agent_id(raw_agent)?;
            let agent = by_id.get(agent_id)?;
            if name.is_empty() {
                return None;
            }
            let requires_coordination = mentions_coordination(&name);
            Some(planned_step(
                unique_name(&mut taken, &name),
                agent,
                requires_coordination,
                agents,
            ))
        })
        .collect()
}

fn planned_step(
    name: String,
    agent: &SharedAgent,
    requires_coordination: bool,
    pool: &[SharedAgent],
) -> PlannedStep {
    let collaborators = if requires_coordination {
        pool.iter()
            .filter(|other| other.id() != agent.id())
            .cloned()
            .collect()
    } else {
        Vec::new()
    };
    PlannedStep {
        name,
        agent: agent.clone(),
        requires_coordination,
        collaborators,
        declared_specialization: None,
        specialization_hint: agent.specializations().primary(),
    }
}

/// Default ordering: security, performance, platform, quality
///
/// Only specializations present in the pool get a step; agents covering
/// none of the four are left out.
fn fallback_plan(agents: &[SharedAgent]) -> Vec<PlannedStep> {
    let first_with = |spec: AgentSpecialization| {
        agents
            .iter()
            .find(|agent| agent.specializations().contains(spec))
            .cloned()
    };
    let security = first_with(AgentSpecialization::SecurityAnalysis);
    let performance = first_with(AgentSpecialization::PerformanceOptimization);
    let platform = first_with(AgentSpecialization::PlatformSpecific);
    let quality = first_with(AgentSpecialization::CodeQuality);

    let mut steps = Vec::new();
    if let Some(agent) = security {
        steps.push(fixed_step(
            "SecurityAnalysis",
            agent,
            AgentSpecialization::SecurityAnalysis,
        ));
    }
    if let Some(agent) = performance {
        let mut step = fixed_step(
            "PerformanceOptimization",
            agent,
            AgentSpecialization::PerformanceOptimization,
        );
        if let Some(platform_agent) = &platform {
            if platform_agent.id() != step.agent.id() {
                step.requires_coordination = true;
                step.collaborators = vec![platform_agent.clone()];
            }
        }
        steps.push(step);
    }
    if let Some(agent) = platform {
        steps.push(fixed_step(
            "PlatformSpecific",
            agent,
            AgentSpecialization::PlatformSpecific,
        ));
    }
    if let Some(agent) = quality {
        steps.push(fixed_step(
            "QualityAssurance",
            agent,
            AgentSpecialization::CodeQuality,
        ));
    }

    steps
}

fn fixed_step(name: &str, agent: SharedAgent, spec: AgentSpecialization) -> PlannedStep {
    PlannedStep {
        name: name.to_string(),
        agent,
        requires_coordination: false,
        collaborators: Vec::new(),
        declared_specialization: None,
        specialization_hint: Some(spec),
    }
}

fn materialize(
    planned: Vec<PlannedStep>,
    agent_count: usize,
    request: &ComplexAgentRequest,
    source: PlanSource,
) -> AgentWorkflow {
    let performance_constraints = request
        .performance_requirements
        .as_ref()
        .map(PerformanceConstraints::from);

    let steps = planned
        .into_iter()
        .map(|step| {
            let specialization = step
                .declared_specialization
                .or_else(|| infer_specialization(&step.name))
                .or(step.specialization_hint);
            WorkflowStep {
                request: AgentRequest {
                    input: format!("{}\n\nWorkflow Step: {}", request.description, step.name),
                    step_name: Some(step.name.clone()),
                    specialization,
                    target_platforms: request.target_platforms.clone(),
                    performance_constraints: performance_constraints.clone(),
                    context: request.context.clone(),
                },
                name: step.name,
                assigned_agent: step.agent,
                requires_coordination: step.requires_coordination,
                collaborators: step.collaborators,
            }
        })
        .collect();

    let mut context = HashMap::new();
    context.insert(
        "created_at".to_string(),
        json!(chrono::Utc::now().to_rfc3339()),
    );
    context.insert("agent_count".to_string(), json!(agent_count));
    context.insert(
        "plan_source".to_string(),
        json!(match source {
            PlanSource::Inference => "inference",
            PlanSource::Fallback => "fallback",
        }),
    );
    context.insert("description".to_string(), json!(request.description));
    context.insert(
        "target_platforms".to_string(),
        json!(request.target_platforms),
    );

    AgentWorkflow {
        workflow_id: uuid::Uuid::new_v4().to_string(),
        name: workflow_name(&request.description),
        steps,
        context,
    }
}

fn workflow_name(description: &str) -> String {
    let summary: String = description.trim().chars().take(60).collect();
    if summary.is_empty() {
        "Coordinated Workflow".to_string()
    } else {
        format!("Coordinated Workflow: {}", summary)
    }
}

/// Specialization named by a step, via the first matching keyword
pub(crate) fn infer_specialization(step_name: &str) -> Option<AgentSpecialization> {
    let lowered = step_name.to_lowercase();
    STEP_KEYWORDS
        .iter()
        .find(|(keyword, _)| lowered.contains(keyword))
        .map(|(_, spec)| *spec)
}

fn mentions_coordination(step_name: &str) -> bool {
    step_name.to_lowercase().contains("coordination")
}

/// Strip list markers and emphasis around a step name
fn clean_step_name(raw: &str) -> String {
    let trimmed = raw
        .trim()
        .trim_start_matches(|c: char| c == '-' || c == '*' || c == '#' || c == '>' || c.is_whitespace());

    let unnumbered = match trimmed.find(|c: char| !c.is_ascii_digit()) {
        Some(pos) if pos > 0 && trimmed[pos..].starts_with(['.', ')']) => &trimmed[pos + 1..],
        _ => trimmed,
    };

    unnumbered
        .trim()
        .trim_matches(|c: char| c == '*' || c == '`' || c == '"' || c == '\'')
        .trim()
        .to_string()
}

fn clean_agent_id(raw: &str) -> Option<&str> {
    let token = raw
        .split_whitespace()
        .next()?
        .trim_matches(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_'));
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

fn unique_name(taken: &mut HashSet<String>, base: &str) -> String {
    let mut candidate = base.to_string();
    let mut suffix = 2;
    while taken.contains(&candidate) {
        candidate = format!("{} ({})", base, suffix);
        suffix += 1;
    }
    taken.insert(candidate.clone());
    candidate
}

/// Outermost `{...}` span, which also skips Markdown code fences
fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Positions of `names` in the suggested order, if it is an exact permutation
fn parse_order(text: &str, names: &[String]) -> Option<Vec<usize>> {
    let suggested: Vec<String> = match extract_json(text)
        .and_then(|json| serde_json::from_str::<JsonOrder>(json).ok())
    {
        Some(order) => order.order,
        None => {
            let line = text.lines().find_map(|line| {
                let cleaned = line.trim().trim_start_matches(['-', '*', '`', ' ']);
                let (label, rest) = cleaned.split_once(':')?;
                label.trim().eq_ignore_ascii_case("order").then_some(rest)
            })?;
            line.replace("->", ",")
                .split(',')
                .map(|name| name.to_string())
                .collect()
        }
    };

    if suggested.len() != names.len() {
        return None;
    }

    let mut used = vec![false; names.len()];
    let mut order = Vec::with_capacity(names.len());
    for name in suggested {
        let name = clean_step_name(&name);
        let position = names.iter().position(|known| *known == name)?;
        if used[position] {
            return None;
        }
        used[position] = true;
        order.push(position);
    }
    Some(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingObserver;
    use crate::models::{OptimizationTarget, PerformanceLevel, PerformanceRequirements};
    use crate::testing::{ScriptedAgent, ScriptedOracle};
    use crate::workflow::OPTIMIZED_KEY;

    fn agent(id: &str, specs: &[AgentSpecialization]) -> SharedAgent {
        Arc::new(ScriptedAgent::new(id, specs.iter().copied().collect()))
    }

    fn planner(oracle: ScriptedOracle) -> WorkflowPlanner {
        WorkflowPlanner::new(InferenceClient::new(Arc::new(oracle), None))
    }

    fn pool() -> Vec<SharedAgent> {
        vec![
            agent("quality", &[AgentSpecialization::CodeQuality]),
            agent("platform", &[AgentSpecialization::PlatformSpecific]),
            agent("perf", &[AgentSpecialization::PerformanceOptimization]),
            agent("sec", &[AgentSpecialization::SecurityAnalysis]),
        ]
    }

    #[tokio::test]
    async fn test_colon_lines_become_steps() {
        let oracle = ScriptedOracle::unparseable().when(
            PLANNING_PROMPT_HEADER,
            "Here is the plan:\n1. Threat Review: sec\n2. **Platform Coordination**: platform - align builds\n- Final Quality Pass: `quality`.\nUnknown: ghost",
        );
        let agents = pool();
        let workflow = planner(oracle)
            .create_workflow(&agents, &ComplexAgentRequest::new("build"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            workflow.step_names(),
            vec!["Threat Review", "Platform Coordination", "Final Quality Pass"]
        );
        let coordination = workflow.step("Platform Coordination").unwrap();
        assert!(coordination.requires_coordination);
        assert_eq!(coordination.collaborator_ids(), vec!["quality", "perf", "sec"]);
        assert!(!workflow.steps[0].requires_coordination);
        assert_eq!(workflow.context["plan_source"], json!("inference"));
    }

    #[tokio::test]
    async fn test_json_plan_is_preferred() {
        let oracle = ScriptedOracle::unparseable().when(
            PLANNING_PROMPT_HEADER,
            "```json\n{\"steps\": [{\"name\": \"Harden\", \"agent_id\": \"sec\"}, {\"name\": \"Tune\", \"agent_id\": \"perf\", \"requires_coordination\": true}, {\"name\": \"Skip\", \"agent_id\": \"nobody\"}]}\n```",
        );
        let agents = pool();
        let workflow = planner(oracle)
            .create_workflow(&agents, &ComplexAgentRequest::new("build"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(workflow.step_names(), vec!["Harden", "Tune"]);
        assert!(workflow.steps[1].requires_coordination);
        assert_eq!(workflow.steps[1].collaborators.len(), 3);
        assert_eq!(
            workflow.steps[0].request.specialization,
            Some(AgentSpecialization::SecurityAnalysis)
        );
    }

    #[tokio::test]
    async fn test_json_plan_declared_specialization() {
        let oracle = ScriptedOracle::unparseable().when(
            PLANNING_PROMPT_HEADER,
            "{\"steps\": [{\"name\": \"Test Review\", \"agent_id\": \"platform\", \"specialization\": \"platform_specific\"}, {\"name\": \"Audit\", \"agent_id\": \"quality\", \"specialization\": \"Security Analysis\"}]}",
        );
        let agents = pool();
        let workflow = planner(oracle)
            .create_workflow(&agents, &ComplexAgentRequest::new("build"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            workflow.steps[0].request.specialization,
            Some(AgentSpecialization::PlatformSpecific)
        );
        // The quality agent does not declare SecurityAnalysis
        assert_eq!(
            workflow.steps[1].request.specialization,
            Some(AgentSpecialization::CodeQuality)
        );
    }

    #[tokio::test]
    async fn test_unparseable_plan_uses_default_ordering() {
        let observer = Arc::new(RecordingObserver::new());
        let agents = pool();
        let workflow = planner(ScriptedOracle::unparseable())
            .with_observer(observer.clone())
            .create_workflow(&agents, &ComplexAgentRequest::new("build"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            workflow.step_names(),
            vec![
                "SecurityAnalysis",
                "PerformanceOptimization",
                "PlatformSpecific",
                "QualityAssurance"
            ]
        );
        let performance = workflow.step("PerformanceOptimization").unwrap();
        assert!(performance.requires_coordination);
        assert_eq!(performance.collaborator_ids(), vec!["platform"]);
        assert_eq!(workflow.context["plan_source"], json!("fallback"));
        assert_eq!(
            observer.count(|e| matches!(e, CoordinationEvent::PlanFallback { .. })),
            1
        );
    }

    #[tokio::test]
    async fn test_oracle_failure_uses_default_ordering() {
        let agents = vec![
            agent("quality", &[AgentSpecialization::CodeQuality]),
            agent("sec", &[AgentSpecialization::SecurityAnalysis]),
        ];
        let workflow = planner(ScriptedOracle::failing())
            .create_workflow(&agents, &ComplexAgentRequest::new("login"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            workflow.step_names(),
            vec!["SecurityAnalysis", "QualityAssurance"]
        );
        assert!(!workflow.steps[0].requires_coordination);
    }

    #[tokio::test]
    async fn test_fallback_skips_agents_outside_default_ordering() {
        let agents = vec![
            agent("docs", &[AgentSpecialization::DocumentationGeneration]),
            agent("sec", &[AgentSpecialization::SecurityAnalysis]),
            agent("idle", &[]),
        ];
        let workflow = planner(ScriptedOracle::unparseable())
            .create_workflow(&agents, &ComplexAgentRequest::new("x"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(workflow.step_names(), vec!["SecurityAnalysis"]);
        assert_eq!(workflow.steps[0].agent_id(), "sec");
    }

    #[tokio::test]
    async fn test_fallback_without_core_agents_is_empty() {
        let agents = vec![agent("docs", &[AgentSpecialization::DocumentationGeneration])];
        let workflow = planner(ScriptedOracle::unparseable())
            .create_workflow(&agents, &ComplexAgentRequest::new("x"), &CancellationToken::new())
            .await
            .unwrap();

        assert!(workflow.is_empty());
        assert_eq!(workflow.context["plan_source"], json!("fallback"));
    }

    #[tokio::test]
    async fn test_performance_agent_covering_platform_does_not_collaborate_with_itself() {
        let agents = vec![agent(
            "full-stack",
            &[
                AgentSpecialization::PerformanceOptimization,
                AgentSpecialization::PlatformSpecific,
            ],
        )];
        let workflow = planner(ScriptedOracle::unparseable())
            .create_workflow(&agents, &ComplexAgentRequest::new("x"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            workflow.step_names(),
            vec!["PerformanceOptimization", "PlatformSpecific"]
        );
        assert!(!workflow.steps[0].requires_coordination);
    }

    #[tokio::test]
    async fn test_step_requests_carry_request_details() {
        let request = ComplexAgentRequest::new("Generate a login endpoint")
            .with_platforms(vec!["web".to_string()])
            .with_performance(PerformanceRequirements {
                primary_target: OptimizationTarget::Memory,
                minimum_level: PerformanceLevel::High,
                requires_real_time: true,
                prefer_parallel: false,
            });
        let agents = pool();
        let workflow = planner(ScriptedOracle::unparseable())
            .create_workflow(&agents, &request, &CancellationToken::new())
            .await
            .unwrap();

        let step = &workflow.steps[0];
        assert_eq!(
            step.request.input,
            "Generate a login endpoint\n\nWorkflow Step: SecurityAnalysis"
        );
        assert_eq!(step.request.step_name.as_deref(), Some("SecurityAnalysis"));
        assert_eq!(step.request.target_platforms, vec!["web"]);
        let constraints = step.request.performance_constraints.as_ref().unwrap();
        assert_eq!(constraints.max_memory_mb, 512);
        assert!(constraints.requires_real_time);
        assert_eq!(
            workflow.steps[3].request.specialization,
            Some(AgentSpecialization::CodeQuality)
        );
        assert_eq!(workflow.context["agent_count"], json!(4));
        assert_eq!(workflow.context["target_platforms"], json!(["web"]));
        assert!(workflow.context.contains_key("created_at"));
    }

    #[tokio::test]
    async fn test_duplicate_step_names_get_suffixes() {
        let oracle = ScriptedOracle::unparseable()
            .when(PLANNING_PROMPT_HEADER, "Review: sec\nReview: quality");
        let agents = pool();
        let workflow = planner(oracle)
            .create_workflow(&agents, &ComplexAgentRequest::new("x"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(workflow.step_names(), vec!["Review", "Review (2)"]);
    }

    #[tokio::test]
    async fn test_empty_pool_makes_empty_workflow_without_inference() {
        let oracle = Arc::new(ScriptedOracle::unparseable());
        let planner = WorkflowPlanner::new(InferenceClient::new(oracle.clone(), None));
        let workflow = planner
            .create_workflow(&[], &ComplexAgentRequest::new("x"), &CancellationToken::new())
            .await
            .unwrap();
        assert!(workflow.is_empty());
        assert!(oracle.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_planning_is_an_error() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let agents = pool();
        let result = planner(ScriptedOracle::unparseable())
            .create_workflow(&agents, &ComplexAgentRequest::new("x"), &cancel)
            .await;
        assert!(result.unwrap_err().is_cancelled());
    }

    async fn default_workflow(oracle: ScriptedOracle) -> (WorkflowPlanner, AgentWorkflow) {
        let planner = planner(oracle);
        let agents = pool();
        let workflow = planner
            .create_workflow(&agents, &ComplexAgentRequest::new("x"), &CancellationToken::new())
            .await
            .unwrap();
        (planner, workflow)
    }

    #[tokio::test]
    async fn test_optimize_applies_exact_permutation() {
        let oracle = ScriptedOracle::unparseable().when(
            OPTIMIZATION_PROMPT_HEADER,
            "Suggested:\nORDER: QualityAssurance, SecurityAnalysis -> PerformanceOptimization, PlatformSpecific",
        );
        let (planner, workflow) = default_workflow(oracle).await;
        let optimized = planner
            .optimize_workflow(&workflow, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            optimized.step_names(),
            vec![
                "QualityAssurance",
                "SecurityAnalysis",
                "PerformanceOptimization",
                "PlatformSpecific"
            ]
        );
        assert_eq!(optimized.workflow_id, workflow.workflow_id);
        assert_eq!(optimized.context[OPTIMIZED_KEY], json!(true));
        assert_eq!(workflow.step_names()[0], "SecurityAnalysis");
    }

    #[tokio::test]
    async fn test_optimize_accepts_json_order() {
        let oracle = ScriptedOracle::unparseable().when(
            OPTIMIZATION_PROMPT_HEADER,
            r#"{"order": ["PlatformSpecific", "PerformanceOptimization", "SecurityAnalysis", "QualityAssurance"]}"#,
        );
        let (planner, workflow) = default_workflow(oracle).await;
        let optimized = planner
            .optimize_workflow(&workflow, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(optimized.step_names()[0], "PlatformSpecific");
    }

    #[tokio::test]
    async fn test_optimize_ignores_partial_suggestion() {
        let oracle = ScriptedOracle::unparseable().when(
            OPTIMIZATION_PROMPT_HEADER,
            "ORDER: QualityAssurance, SecurityAnalysis, QualityAssurance, PlatformSpecific",
        );
        let (planner, workflow) = default_workflow(oracle).await;
        let optimized = planner
            .optimize_workflow(&workflow, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(optimized.step_names(), workflow.step_names());
        assert!(!optimized.context.contains_key(OPTIMIZED_KEY));
    }

    #[tokio::test]
    async fn test_optimize_oracle_failure_returns_original() {
        let oracle = ScriptedOracle::unparseable().fail_when(OPTIMIZATION_PROMPT_HEADER);
        let (planner, workflow) = default_workflow(oracle).await;
        let optimized = planner
            .optimize_workflow(&workflow, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(optimized.step_names(), workflow.step_names());
        assert_eq!(optimized.workflow_id, workflow.workflow_id);
    }

    #[tokio::test]
    async fn test_optimize_single_step_skips_inference() {
        let oracle = Arc::new(ScriptedOracle::unparseable());
        let planner = WorkflowPlanner::new(InferenceClient::new(oracle.clone(), None));
        let agents = vec![agent("sec", &[AgentSpecialization::SecurityAnalysis])];
        let workflow = planner
            .create_workflow(&agents, &ComplexAgentRequest::new("x"), &CancellationToken::new())
            .await
            .unwrap();
        planner
            .optimize_workflow(&workflow, &CancellationToken::new())
            .await
            .unwrap();
        assert!(oracle.prompts_containing(OPTIMIZATION_PROMPT_HEADER).is_empty());
    }

    #[tokio::test]
    async fn test_optimization_prompt_numbers_steps() {
        let oracle = Arc::new(ScriptedOracle::unparseable());
        let planner = WorkflowPlanner::new(InferenceClient::new(oracle.clone(), None));
        let workflow = planner
            .create_workflow(&pool(), &ComplexAgentRequest::new("x"), &CancellationToken::new())
            .await
            .unwrap();
        planner
            .optimize_workflow(&workflow, &CancellationToken::new())
            .await
            .unwrap();

        let prompts = oracle.prompts_containing(OPTIMIZATION_PROMPT_HEADER);
        assert_eq!(prompts.len(), 1);
        let prompt = &prompts[0];
        assert!(prompt.contains("1. SecurityAnalysis (agent sec)\n"));
        assert!(prompt.contains("2. PerformanceOptimization (agent perf, coordinated)\n"));
        assert!(prompt.contains("4. QualityAssurance (agent quality)\n"));
        assert!(prompt.ends_with("naming every step exactly once."));
    }

    #[test]
    fn test_infer_specialization_keywords() {
        assert_eq!(
            infer_specialization("Security Review"),
            Some(AgentSpecialization::SecurityAnalysis)
        );
        assert_eq!(
            infer_specialization("QualityAssurance"),
            Some(AgentSpecialization::CodeQuality)
        );
        assert_eq!(
            infer_specialization("Write unit tests"),
            Some(AgentSpecialization::TestGeneration)
        );
        assert_eq!(infer_specialization("Deploy"), None);
    }

    #[test]
    fn test_clean_step_name() {
        assert_eq!(clean_step_name("  1. Security Review "), "Security Review");
        assert_eq!(clean_step_name("- **Tune**"), "Tune");
        assert_eq!(clean_step_name("2) `Ship`"), "Ship");
        assert_eq!(clean_step_name("Step 3"), "Step 3");
    }
}
