//! Structured coordination events
//!
//! The coordination pipeline reports what it does as typed events to a
//! [`CoordinationObserver`] instead of logging inline. [`TracingObserver`]
//! forwards them to `tracing`; [`RecordingObserver`] keeps them in memory.

use crate::models::AgentSpecialization;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

/// Where a workflow's step structure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanSource {
    /// Parsed from the inference service's proposal
    Inference,
    /// Fixed default ordering
    Fallback,
}

/// An observable step in a coordination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CoordinationEvent {
    /// A coordination call started
    TaskStarted {
        /// Length of the request description
        description_len: usize,
        /// Number of agents in the pool
        pool_size: usize,
    },
    /// Required specializations were determined
    SpecializationsAnalyzed {
        /// The required specializations
        specializations: Vec<AgentSpecialization>,
        /// Whether they came from the inference service
        from_inference: bool,
    },
    /// An agent was chosen for a specialization
    AgentSelected {
        /// Specialization being covered
        specialization: AgentSpecialization,
        /// Chosen agent
        agent_id: String,
        /// Normalized capability score
        score: f64,
    },
    /// No capable agent exists for a specialization
    CoverageGap {
        /// Uncovered specialization
        specialization: AgentSpecialization,
        /// Number of candidates that declared the specialization
        candidates: usize,
    },
    /// The inference plan was unusable and the default ordering was used
    PlanFallback {
        /// Why the inference plan was rejected
        reason: String,
    },
    /// A workflow was materialized
    WorkflowCreated {
        /// Workflow identifier
        workflow_id: String,
        /// Number of steps
        step_count: usize,
        /// Where the structure came from
        source: PlanSource,
    },
    /// Workflow optimization finished
    WorkflowOptimized {
        /// Workflow identifier
        workflow_id: String,
        /// Whether the step order changed
        reordered: bool,
    },
    /// A step is about to run
    StepStarted {
        /// Step name
        step: String,
        /// Assigned agent
        agent_id: String,
        /// Whether collaborators are involved
        coordinated: bool,
    },
    /// One invocation attempt of a step failed
    StepAttemptFailed {
        /// Step name
        step: String,
        /// 1-based attempt number
        attempt: u32,
        /// Failure description
        error: String,
    },
    /// A step finished, successfully or not
    StepCompleted {
        /// Step name
        step: String,
        /// Whether the response was successful
        success: bool,
        /// Response confidence
        confidence: f64,
        /// Wall-clock duration
        duration_ms: u64,
    },
    /// A step asked the workflow to stop
    WorkflowTerminated {
        /// Step that requested termination
        step: String,
        /// Steps that will not run
        skipped_steps: usize,
    },
    /// The caller cancelled the coordination
    CoordinationCancelled {
        /// Steps completed before cancellation
        completed_steps: usize,
    },
    /// The synthesis call failed
    SynthesisFailed {
        /// Failure description
        error: String,
    },
    /// The coordination call returned
    TaskCompleted {
        /// Whether the final response is successful
        success: bool,
        /// Final confidence
        confidence: f64,
        /// Number of executed steps
        step_count: usize,
    },
}

/// Receives coordination events
pub trait CoordinationObserver: Send + Sync {
    /// Handle one event
    fn on_event(&self, event: &CoordinationEvent);
}

/// Shared observer handle
pub type SharedObserver = Arc<dyn CoordinationObserver>;

/// Observer that emits events through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl CoordinationObserver for TracingObserver {
    fn on_event(&self, event: &CoordinationEvent) {
        match event {
            CoordinationEvent::TaskStarted {
                description_len,
                pool_size,
            } => info!(
                description_len = description_len,
                pool_size = pool_size,
                "Starting complex task coordination"
            ),
            CoordinationEvent::SpecializationsAnalyzed {
                specializations,
                from_inference,
            } => info!(
                count = specializations.len(),
                from_inference = from_inference,
                specializations = ?specializations,
                "Analyzed required specializations"
            ),
            CoordinationEvent::AgentSelected {
                specialization,
                agent_id,
                score,
            } => debug!(
                specialization = %specialization,
                agent_id = %agent_id,
                score = score,
                "Selected agent"
            ),
            CoordinationEvent::CoverageGap {
                specialization,
                candidates,
            } => warn!(
                specialization = %specialization,
                candidates = candidates,
                "No capable agent for specialization"
            ),
            CoordinationEvent::PlanFallback { reason } => {
                warn!(reason = %reason, "Using default workflow ordering")
            }
            CoordinationEvent::WorkflowCreated {
                workflow_id,
                step_count,
                source,
            } => info!(
                workflow_id = %workflow_id,
                step_count = step_count,
                source = ?source,
                "Workflow created"
            ),
            CoordinationEvent::WorkflowOptimized {
                workflow_id,
                reordered,
            } => debug!(
                workflow_id = %workflow_id,
                reordered = reordered,
                "Workflow optimization finished"
            ),
            CoordinationEvent::StepStarted {
                step,
                agent_id,
                coordinated,
            } => debug!(
                step = %step,
                agent_id = %agent_id,
                coordinated = coordinated,
                "Executing workflow step"
            ),
            CoordinationEvent::StepAttemptFailed {
                step,
                attempt,
                error,
            } => warn!(
                step = %step,
                attempt = attempt,
                error = %error,
                "Workflow step attempt failed"
            ),
            CoordinationEvent::StepCompleted {
                step,
                success,
                confidence,
                duration_ms,
            } => debug!(
                step = %step,
                success = success,
                confidence = confidence,
                duration_ms = duration_ms,
                "Workflow step completed"
            ),
            CoordinationEvent::WorkflowTerminated {
                step,
                skipped_steps,
            } => info!(
                step = %step,
                skipped_steps = skipped_steps,
                "Workflow terminated early"
            ),
            CoordinationEvent::CoordinationCancelled { completed_steps } => {
                warn!(completed_steps = completed_steps, "Coordination cancelled")
            }
            CoordinationEvent::SynthesisFailed { error } => {
                error!(error = %error, "Failed to synthesize final response")
            }
            CoordinationEvent::TaskCompleted {
                success,
                confidence,
                step_count,
            } => info!(
                success = success,
                confidence = confidence,
                step_count = step_count,
                "Complex task coordination finished"
            ),
        }
    }
}

/// Observer that records every event in memory
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<CoordinationEvent>>,
}

impl RecordingObserver {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded events, in emission order
    pub fn events(&self) -> Vec<CoordinationEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Number of recorded events matching `predicate`
    pub fn count(&self, predicate: impl Fn(&CoordinationEvent) -> bool) -> usize {
        self.events().iter().filter(|event| predicate(event)).count()
    }
}

impl CoordinationObserver for RecordingObserver {
    fn on_event(&self, event: &CoordinationEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
