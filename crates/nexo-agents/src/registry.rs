//! Agent registry keyed by specialization tag

use crate::agents::SharedAgent;
use crate::error::{AgentError, Result};
use crate::models::{AgentSpecialization, SpecializationSet};
use std::collections::HashMap;
use tracing::{debug, info};

/// Registry of the agents available for coordination
///
/// Agents are indexed by ID and by every specialization they declare.
/// Registration order is preserved, so lookups are deterministic.
///
/// # Examples
///
/// ```ignore
/// use nexo_agents::{AgentRegistry, AgentSpecialization};
/// use std::sync::Arc;
///
/// let mut registry = AgentRegistry::new();
/// registry.register(Arc::new(security_agent))?;
///
/// let candidates = registry.agents_with(AgentSpecialization::SecurityAnalysis);
/// ```
pub struct AgentRegistry {
    agents: Vec<SharedAgent>,
    index: HashMap<String, usize>,
    specialization_map: HashMap<AgentSpecialization, Vec<usize>>,
}

impl AgentRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            agents: Vec::new(),
            index: HashMap::new(),
            specialization_map: HashMap::new(),
        }
    }

    /// Create a registry holding `agents`, in order
    pub fn from_agents(agents: impl IntoIterator<Item = SharedAgent>) -> Result<Self> {
        let mut registry = Self::new();
        for agent in agents {
            registry.register(agent)?;
        }
        Ok(registry)
    }

    /// Register an agent
    ///
    /// Fails with `InvalidInput` when an agent with the same ID exists.
    pub fn register(&mut self, agent: SharedAgent) -> Result<()> {
        let agent_id = agent.id().to_string();
        if self.has_agent(&agent_id) {
            return Err(AgentError::invalid_input(format!(
                "Agent already registered: {}",
                agent_id
            )));
        }

        debug!(agent_id = %agent_id, agent_name = %agent.name(), "Registering agent");

        let position = self.agents.len();
        for spec in agent.specializations().iter() {
            if spec == AgentSpecialization::None {
                continue;
            }
            self.specialization_map
                .entry(spec)
                .or_default()
                .push(position);
        }

        info!(
            agent_id = %agent_id,
            specializations = %agent.specializations().describe(),
            "Agent registered"
        );

        self.index.insert(agent_id, position);
        self.agents.push(agent);
        Ok(())
    }

    /// Find an agent by ID
    pub fn find_agent(&self, agent_id: &str) -> Result<SharedAgent> {
        self.index
            .get(agent_id)
            .map(|position| self.agents[*position].clone())
            .ok_or_else(|| AgentError::not_found(agent_id))
    }

    /// Agents declaring `spec`, in registration order
    pub fn agents_with(&self, spec: AgentSpecialization) -> Vec<SharedAgent> {
        self.specialization_map
            .get(&spec)
            .map(|positions| {
                positions
                    .iter()
                    .map(|position| self.agents[*position].clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of registered agents
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Whether an agent with `agent_id` is registered
    pub fn has_agent(&self, agent_id: &str) -> bool {
        self.index.contains_key(agent_id)
    }

    /// Every specialization declared by at least one agent
    pub fn covered_specializations(&self) -> SpecializationSet {
        self.specialization_map.keys().copied().collect()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}
