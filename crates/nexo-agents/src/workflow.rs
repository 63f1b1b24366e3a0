//! Workflow data model

use crate::agents::SharedAgent;
use crate::models::AgentRequest;
use std::collections::HashMap;
use std::fmt;

/// Context key recording whether a workflow came out of optimization
pub const OPTIMIZED_KEY: &str = "optimized";

/// One unit of work in a workflow, bound to a single agent
#[derive(Clone)]
pub struct WorkflowStep {
    /// Step name, unique within its workflow
    pub name: String,
    /// Agent executing the step
    pub assigned_agent: SharedAgent,
    /// Base request for the step
    pub request: AgentRequest,
    /// Whether the agent runs with collaborators
    pub requires_coordination: bool,
    /// Collaborating agents, drawn from the workflow's agent pool
    pub collaborators: Vec<SharedAgent>,
}

impl WorkflowStep {
    /// ID of the assigned agent
    pub fn agent_id(&self) -> &str {
        self.assigned_agent.id()
    }

    /// IDs of the collaborators
    pub fn collaborator_ids(&self) -> Vec<String> {
        self.collaborators
            .iter()
            .map(|agent| agent.id().to_string())
            .collect()
    }
}

impl fmt::Debug for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowStep")
            .field("name", &self.name)
            .field("assigned_agent", &self.agent_id())
            .field("requires_coordination", &self.requires_coordination)
            .field("collaborators", &self.collaborator_ids())
            .field("request", &self.request)
            .finish()
    }
}

/// Ordered steps produced for one complex request
///
/// A workflow is never mutated in place; [`AgentWorkflow::with_steps`]
/// produces a new value.
#[derive(Debug, Clone)]
pub struct AgentWorkflow {
    /// Unique workflow identifier
    pub workflow_id: String,
    /// Display name
    pub name: String,
    /// Steps, in execution order
    pub steps: Vec<WorkflowStep>,
    /// Creation metadata
    pub context: HashMap<String, serde_json::Value>,
}

impl AgentWorkflow {
    /// Step names, in execution order
    pub fn step_names(&self) -> Vec<String> {
        self.steps.iter().map(|step| step.name.clone()).collect()
    }

    /// Find a step by name
    pub fn step(&self, name: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|step| step.name == name)
    }

    /// Number of steps
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the workflow has no steps
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// New workflow with the same identity and a replaced step sequence
    pub fn with_steps(&self, steps: Vec<WorkflowStep>) -> Self {
        let mut context = self.context.clone();
        context.insert(OPTIMIZED_KEY.to_string(), serde_json::Value::Bool(true));
        Self {
            workflow_id: self.workflow_id.clone(),
            name: self.name.clone(),
            steps,
            context,
        }
    }
}
