//! Agent selection by specialization and self-assessment

use crate::agents::SharedAgent;
use crate::error::{AgentError, Result};
use crate::events::{CoordinationEvent, SharedObserver, TracingObserver};
use crate::models::{
    AgentRequest, AgentSpecialization, CapabilityAssessment, ComplexAgentRequest,
    SpecializationSet,
};
use crate::registry::AgentRegistry;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// An agent chosen to cover one specialization
#[derive(Clone)]
pub struct AgentSelection {
    /// Covered specialization
    pub specialization: AgentSpecialization,
    /// Chosen agent
    pub agent: SharedAgent,
    /// Normalized capability score of the chosen agent
    pub score: f64,
}

/// Picks the best capable agent for each required specialization
///
/// Candidates are the registry's agents declaring the specialization. Each
/// candidate assesses itself; the highest-scoring capable candidate wins,
/// with ties broken by the lexicographically smallest agent ID. A
/// specialization without a capable candidate is reported as a coverage gap
/// and skipped.
pub struct AgentSelector {
    registry: Arc<AgentRegistry>,
    assessment_timeout: Option<Duration>,
    observer: SharedObserver,
}

impl AgentSelector {
    /// Create a selector over `registry`
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self {
            registry,
            assessment_timeout: None,
            observer: Arc::new(TracingObserver),
        }
    }

    /// Bound every capability assessment by `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.assessment_timeout = timeout;
        self
    }

    /// Report events to `observer`
    pub fn with_observer(mut self, observer: SharedObserver) -> Self {
        self.observer = observer;
        self
    }

    /// Select one agent per covered specialization, deduplicated
    ///
    /// Agents are returned in specialization order; an agent chosen for
    /// several specializations appears once, at its first position.
    pub async fn select_optimal_agents(
        &self,
        required: &SpecializationSet,
        request: &ComplexAgentRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<SharedAgent>> {
        let selections = self.select_with_scores(required, request, cancel).await?;

        let mut agents: Vec<SharedAgent> = Vec::with_capacity(selections.len());
        for selection in selections {
            if !agents.iter().any(|a| a.id() == selection.agent.id()) {
                agents.push(selection.agent);
            }
        }
        Ok(agents)
    }

    /// Select one agent per covered specialization, keeping the scores
    pub async fn select_with_scores(
        &self,
        required: &SpecializationSet,
        request: &ComplexAgentRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<AgentSelection>> {
        let mut selections = Vec::new();

        for specialization in required.iter() {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }

            let candidates = self.registry.agents_with(specialization);
            if candidates.is_empty() {
                self.observer.on_event(&CoordinationEvent::CoverageGap {
                    specialization,
                    candidates: 0,
                });
                continue;
            }

            let mut assessment_request = AgentRequest::from_complex(request);
            assessment_request.specialization = Some(specialization);

            let assessments = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                assessments = join_all(
                    candidates
                        .iter()
                        .map(|candidate| self.assess(candidate, &assessment_request)),
                ) => assessments,
            };

            let capable = candidates
                .iter()
                .zip(assessments)
                .filter(|(_, assessment)| assessment.can_handle_request)
                .map(|(agent, assessment)| (agent, assessment.normalized_score()));

            match pick_best(capable) {
                Some((agent, score)) => {
                    self.observer.on_event(&CoordinationEvent::AgentSelected {
                        specialization,
                        agent_id: agent.id().to_string(),
                        score,
                    });
                    selections.push(AgentSelection {
                        specialization,
                        agent: agent.clone(),
                        score,
                    });
                }
                None => self.observer.on_event(&CoordinationEvent::CoverageGap {
                    specialization,
                    candidates: candidates.len(),
                }),
            }
        }

        Ok(selections)
    }

    async fn assess(&self, agent: &SharedAgent, request: &AgentRequest) -> CapabilityAssessment {
        let call = agent.assess_capability(request);
        let outcome = match self.assessment_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => Err(AgentError::timeout(limit.as_millis() as u64)),
            },
            None => call.await,
        };

        outcome.unwrap_or_else(|e| {
            debug!(agent_id = %agent.id(), error = %e, "Capability assessment failed");
            CapabilityAssessment::cannot_handle()
        })
    }
}

/// Highest score wins; equal scores go to the smallest agent ID
fn pick_best<'a>(
    scored: impl Iterator<Item = (&'a SharedAgent, f64)>,
) -> Option<(&'a SharedAgent, f64)> {
    scored.fold(None, |best, (agent, score)| match best {
        None => Some((agent, score)),
        Some((current, current_score)) => {
            if score > current_score || (score == current_score && agent.id() < current.id()) {
                Some((agent, score))
            } else {
                Some((current, current_score))
            }
        }
    })
}
