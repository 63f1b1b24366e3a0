//! Multi-Agent Coordination for Nexo
//!
//! This crate coordinates specialized agents on complex tasks. A single call
//! analyzes which specializations a task needs, selects one capable agent per
//! specialization, plans an ordered workflow, runs it step by step while
//! passing earlier results forward, and synthesizes one final answer.
//!
//! # Architecture
//!
//! The framework consists of:
//! - **SpecializedAgent**: Interface every agent implements
//! - **AgentRegistry**: Agents indexed by specialization tag
//! - **AgentSelector**: Picks the best capable agent per specialization
//! - **WorkflowPlanner**: Turns selected agents into ordered workflow steps
//! - **WorkflowExecutor**: Runs steps sequentially with timeouts and retries
//! - **ResponseSynthesizer**: Merges step outputs into the final response
//! - **AgentCoordinator**: Public entry point running the whole pipeline
//!
//! Planning, requirement analysis and synthesis are delegated to a
//! [`ModelInferenceService`]; every decision it makes has a deterministic
//! fallback.
//!
//! # Example
//!
//! ```ignore
//! use nexo_agents::{AgentCoordinator, AgentRegistry, ComplexAgentRequest, CoordinatorConfig};
//! use std::sync::Arc;
//!
//! let mut registry = AgentRegistry::new();
//! // ... register agents ...
//!
//! let coordinator = AgentCoordinator::new(Arc::new(registry), inference)
//!     .with_config(CoordinatorConfig::load(None)?);
//!
//! let response = coordinator
//!     .coordinate_complex_task(&ComplexAgentRequest::new("Generate a login endpoint"))
//!     .await;
//! ```

#![warn(missing_docs)]

pub mod agents;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod executor;
pub mod inference;
pub mod models;
pub mod planner;
pub mod registry;
pub mod selector;
pub mod synthesizer;
pub mod workflow;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

#[cfg(test)]
mod selector_properties;

#[cfg(test)]
mod planner_properties;

#[cfg(test)]
mod executor_properties;

pub use agents::{SharedAgent, SpecializedAgent};
pub use config::{CoordinatorConfig, InferenceSettings, RetryConfig};
pub use coordinator::{AgentCoordinator, ANALYSIS_PROMPT_HEADER};
pub use error::{AgentError, Result};
pub use events::{
    CoordinationEvent, CoordinationObserver, PlanSource, RecordingObserver, SharedObserver,
    TracingObserver,
};
pub use executor::{
    CoordinatedResponse, ExecutionContext, WorkflowExecutor, SHARED_CONTEXT_KEY,
};
pub use inference::{
    CompletionResult, HttpInferenceService, InferenceClient, ModelInferenceService,
    SharedInference,
};
pub use models::{
    AgentRequest, AgentResponse, AgentSpecialization, CapabilityAssessment, ComplexAgentRequest,
    OptimizationTarget, PerformanceConstraints, PerformanceLevel, PerformanceRequirements,
    QualityLevel, QualityRequirements, SecurityLevel, SecurityRequirements, SpecializationSet,
};
pub use planner::{WorkflowPlanner, OPTIMIZATION_PROMPT_HEADER, PLANNING_PROMPT_HEADER};
pub use registry::AgentRegistry;
pub use selector::{AgentSelection, AgentSelector};
pub use synthesizer::{
    coordinated_confidence, ResponseSynthesizer, MAX_COORDINATED_CONFIDENCE,
    SYNTHESIS_PROMPT_HEADER,
};
pub use workflow::{AgentWorkflow, WorkflowStep};

// Cancellation handle accepted by the coordinator
pub use tokio_util::sync::CancellationToken;
