//! Specialized agent trait

use crate::error::Result;
use crate::models::{
    AgentRequest, AgentResponse, AgentSpecialization, CapabilityAssessment, SpecializationSet,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Shared handle to an agent
///
/// The coordinator never owns agent lifetimes; agents are injected and shared
/// across concurrent coordinations.
pub type SharedAgent = Arc<dyn SpecializedAgent>;

/// Trait that all coordinated agents implement
///
/// An agent declares one or more specializations, can judge whether it is
/// able to handle a request, and can process a request alone or together
/// with collaborators. Returning an `Err` from any async method is treated by
/// the coordinator as the agent failing; it never aborts a coordination.
///
/// # Examples
///
/// ```ignore
/// use nexo_agents::{AgentRequest, AgentResponse, CapabilityAssessment, SpecializedAgent};
/// use async_trait::async_trait;
///
/// struct LintAgent { specs: SpecializationSet }
///
/// #[async_trait]
/// impl SpecializedAgent for LintAgent {
///     fn id(&self) -> &str { "lint" }
///     fn specializations(&self) -> &SpecializationSet { &self.specs }
///
///     async fn assess_capability(&self, _request: &AgentRequest) -> Result<CapabilityAssessment> {
///         Ok(CapabilityAssessment::new(true, 0.8))
///     }
///
///     async fn process(&self, request: &AgentRequest) -> Result<AgentResponse> {
///         Ok(AgentResponse::success(format!("linted: {}", request.input), 0.9))
///     }
/// }
/// ```
#[async_trait]
pub trait SpecializedAgent: Send + Sync {
    /// Unique, stable agent identifier
    fn id(&self) -> &str;

    /// Human-readable name, defaults to the identifier
    fn name(&self) -> &str {
        self.id()
    }

    /// Specializations this agent declares
    fn specializations(&self) -> &SpecializationSet;

    /// Whether the agent declares `spec`
    fn has_specialization(&self, spec: AgentSpecialization) -> bool {
        self.specializations().contains(spec)
    }

    /// Judge whether this agent can handle `request`, and how well
    async fn assess_capability(&self, request: &AgentRequest) -> Result<CapabilityAssessment>;

    /// Process a request alone
    async fn process(&self, request: &AgentRequest) -> Result<AgentResponse>;

    /// Process a request together with collaborator agents
    ///
    /// Agents without a dedicated coordination strategy fall back to
    /// [`SpecializedAgent::process`].
    async fn coordinate(
        &self,
        request: &AgentRequest,
        collaborators: &[SharedAgent],
    ) -> Result<AgentResponse> {
        let _ = collaborators;
        self.process(request).await
    }
}
