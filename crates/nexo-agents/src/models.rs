//! Data models for the coordination framework
//!
//! This module contains the request, response and capability types exchanged
//! between the coordinator, its agents and the inference service.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Metadata key marking a response as the "declined to act" sentinel
pub const NO_ACTION_KEY: &str = "no_action";

/// Metadata key marking a response as produced by cancellation
pub const CANCELLED_KEY: &str = "cancelled";

/// Named capability domain an agent may declare
///
/// Variants are ordered; the order is used wherever a set of
/// specializations is iterated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AgentSpecialization {
    /// No specialization
    None,
    /// Runtime and memory performance tuning
    PerformanceOptimization,
    /// Vulnerability and threat analysis
    SecurityAnalysis,
    /// Target-platform specific adaptation
    PlatformSpecific,
    /// High-level architecture design
    ArchitecturalDesign,
    /// Test generation
    TestGeneration,
    /// Documentation generation
    DocumentationGeneration,
    /// Code quality review
    CodeQuality,
    /// Database schema and query design
    DatabaseDesign,
    /// Network stack optimization
    NetworkingOptimization,
    /// UI/UX generation
    UIUXGeneration,
    /// Game development
    GameDevelopment,
    /// Web development
    WebDevelopment,
    /// Mobile development
    MobileDevelopment,
    /// CI/CD and DevOps integration
    DevOpsIntegration,
}

impl AgentSpecialization {
    /// Every specialization, in declaration order
    pub const ALL: [AgentSpecialization; 15] = [
        Self::None,
        Self::PerformanceOptimization,
        Self::SecurityAnalysis,
        Self::PlatformSpecific,
        Self::ArchitecturalDesign,
        Self::TestGeneration,
        Self::DocumentationGeneration,
        Self::CodeQuality,
        Self::DatabaseDesign,
        Self::NetworkingOptimization,
        Self::UIUXGeneration,
        Self::GameDevelopment,
        Self::WebDevelopment,
        Self::MobileDevelopment,
        Self::DevOpsIntegration,
    ];

    /// Canonical name of the specialization
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::PerformanceOptimization => "PerformanceOptimization",
            Self::SecurityAnalysis => "SecurityAnalysis",
            Self::PlatformSpecific => "PlatformSpecific",
            Self::ArchitecturalDesign => "ArchitecturalDesign",
            Self::TestGeneration => "TestGeneration",
            Self::DocumentationGeneration => "DocumentationGeneration",
            Self::CodeQuality => "CodeQuality",
            Self::DatabaseDesign => "DatabaseDesign",
            Self::NetworkingOptimization => "NetworkingOptimization",
            Self::UIUXGeneration => "UIUXGeneration",
            Self::GameDevelopment => "GameDevelopment",
            Self::WebDevelopment => "WebDevelopment",
            Self::MobileDevelopment => "MobileDevelopment",
            Self::DevOpsIntegration => "DevOpsIntegration",
        }
    }

    /// Parse a specialization name, ignoring case, spaces, underscores and slashes
    ///
    /// `"security_analysis"`, `"Security Analysis"` and `"UI/UX Generation"`
    /// all resolve to their variants.
    pub fn from_name(name: &str) -> Option<Self> {
        let wanted = normalize(name);
        if wanted.is_empty() {
            return None;
        }
        Self::ALL
            .iter()
            .copied()
            .find(|spec| normalize(spec.name()) == wanted)
    }

    /// Find every specialization named anywhere in free text
    ///
    /// `None` is never reported.
    pub fn mentioned_in(text: &str) -> SpecializationSet {
        let haystack = normalize(text);
        Self::ALL
            .iter()
            .copied()
            .filter(|spec| *spec != Self::None)
            .filter(|spec| haystack.contains(&normalize(spec.name())))
            .collect()
    }
}

impl fmt::Display for AgentSpecialization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Clamp to `[0.0, 1.0]`; non-finite values become `0.0`
pub(crate) fn unit_interval(value: f64) -> f64 {
    if !value.is_finite() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn normalize(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Set of specializations declared by an agent
///
/// Backed by an ordered set of enum variants, so it has no width limit and
/// iterates deterministically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpecializationSet(BTreeSet<AgentSpecialization>);

impl SpecializationSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a specialization
    pub fn insert(&mut self, spec: AgentSpecialization) -> bool {
        self.0.insert(spec)
    }

    /// Whether the set includes `spec`
    ///
    /// `AgentSpecialization::None` is never included.
    pub fn contains(&self, spec: AgentSpecialization) -> bool {
        spec != AgentSpecialization::None && self.0.contains(&spec)
    }

    /// Iterate in declaration order
    pub fn iter(&self) -> impl Iterator<Item = AgentSpecialization> + '_ {
        self.0.iter().copied()
    }

    /// Number of specializations in the set
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First declared specialization other than `None`
    pub fn primary(&self) -> Option<AgentSpecialization> {
        self.iter().find(|spec| *spec != AgentSpecialization::None)
    }

    /// Comma separated names
    pub fn describe(&self) -> String {
        self.iter()
            .map(|spec| spec.name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl FromIterator<AgentSpecialization> for SpecializationSet {
    fn from_iter<I: IntoIterator<Item = AgentSpecialization>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[AgentSpecialization; N]> for SpecializationSet {
    fn from(specs: [AgentSpecialization; N]) -> Self {
        specs.into_iter().collect()
    }
}

/// Primary optimization goal of a request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizationTarget {
    /// Favor execution speed
    Speed,
    /// Favor low memory usage
    Memory,
    /// Favor battery life
    Battery,
    /// No single priority
    #[default]
    Balanced,
}

/// Minimum acceptable performance level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PerformanceLevel {
    /// Relaxed requirements
    Low,
    /// Typical application requirements
    #[default]
    Medium,
    /// Tight requirements
    High,
    /// Hard real-world limits
    Critical,
}

impl PerformanceLevel {
    /// Memory ceiling (in megabytes) a step must respect at this level
    pub fn memory_ceiling_mb(&self) -> u64 {
        match self {
            Self::Low => 2048,
            Self::Medium => 1024,
            Self::High => 512,
            Self::Critical => 256,
        }
    }
}

/// Performance profile attached to a complex request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRequirements {
    /// Primary optimization target
    pub primary_target: OptimizationTarget,
    /// Minimum acceptable performance level
    pub minimum_level: PerformanceLevel,
    /// Whether real-time behavior is required
    pub requires_real_time: bool,
    /// Whether parallel execution is preferred
    pub prefer_parallel: bool,
}

/// Required security level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SecurityLevel {
    /// Basic hygiene
    Basic,
    /// Standard application security
    #[default]
    Standard,
    /// Elevated requirements
    High,
    /// Regulated or safety-critical systems
    Critical,
}

/// Security profile attached to a complex request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityRequirements {
    /// Required security level
    pub required_level: SecurityLevel,
}

/// Minimum code quality bar
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum QualityLevel {
    /// Prototype quality
    Basic,
    /// Reviewed code
    #[default]
    Standard,
    /// Well tested and documented
    High,
    /// Ready to ship
    Production,
}

/// Quality profile attached to a complex request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityRequirements {
    /// Minimum code quality bar
    pub minimum_quality: QualityLevel,
}

/// A complex task to be coordinated across several agents
///
/// Owned by the caller and never mutated by the coordinator.
///
/// # Examples
///
/// ```ignore
/// use nexo_agents::{ComplexAgentRequest, SecurityRequirements};
///
/// let request = ComplexAgentRequest::new("Generate a login endpoint")
///     .with_platforms(vec!["web".to_string()])
///     .with_security(SecurityRequirements::default());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComplexAgentRequest {
    /// Free-text description of the task
    pub description: String,
    /// Target platform identifiers, in priority order
    pub target_platforms: Vec<String>,
    /// Optional performance profile
    pub performance_requirements: Option<PerformanceRequirements>,
    /// Optional security profile
    pub security_requirements: Option<SecurityRequirements>,
    /// Optional quality profile
    pub quality_requirements: Option<QualityRequirements>,
    /// Opaque caller context
    pub context: HashMap<String, serde_json::Value>,
}

impl ComplexAgentRequest {
    /// Create a request with only a description
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Default::default()
        }
    }

    /// Set the target platforms
    pub fn with_platforms(mut self, platforms: Vec<String>) -> Self {
        self.target_platforms = platforms;
        self
    }

    /// Attach a performance profile
    pub fn with_performance(mut self, requirements: PerformanceRequirements) -> Self {
        self.performance_requirements = Some(requirements);
        self
    }

    /// Attach a security profile
    pub fn with_security(mut self, requirements: SecurityRequirements) -> Self {
        self.security_requirements = Some(requirements);
        self
    }

    /// Attach a quality profile
    pub fn with_quality(mut self, requirements: QualityRequirements) -> Self {
        self.quality_requirements = Some(requirements);
        self
    }

    /// Add an opaque context value
    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }
}

/// Step-level performance constraints derived from [`PerformanceRequirements`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceConstraints {
    /// Memory ceiling in megabytes
    pub max_memory_mb: u64,
    /// Whether real-time behavior is required
    pub requires_real_time: bool,
    /// Whether parallel execution is preferred
    pub prefer_parallel: bool,
    /// Primary optimization target
    pub primary_target: OptimizationTarget,
}

impl From<&PerformanceRequirements> for PerformanceConstraints {
    fn from(requirements: &PerformanceRequirements) -> Self {
        Self {
            max_memory_mb: requirements.minimum_level.memory_ceiling_mb(),
            requires_real_time: requirements.requires_real_time,
            prefer_parallel: requirements.prefer_parallel,
            primary_target: requirements.primary_target,
        }
    }
}

/// Request handed to a single agent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentRequest {
    /// Instruction text for the agent
    pub input: String,
    /// Workflow step this request belongs to, if any
    pub step_name: Option<String>,
    /// Specialization the step expects the agent to apply
    pub specialization: Option<AgentSpecialization>,
    /// Target platforms carried over from the complex request
    pub target_platforms: Vec<String>,
    /// Performance constraints for this step
    pub performance_constraints: Option<PerformanceConstraints>,
    /// Additional context values
    pub context: HashMap<String, serde_json::Value>,
}

impl AgentRequest {
    /// Create a request with only an input text
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            ..Default::default()
        }
    }

    /// Build the request used to ask agents whether they can handle `request`
    pub fn from_complex(request: &ComplexAgentRequest) -> Self {
        Self {
            input: request.description.clone(),
            step_name: None,
            specialization: None,
            target_platforms: request.target_platforms.clone(),
            performance_constraints: request
                .performance_requirements
                .as_ref()
                .map(PerformanceConstraints::from),
            context: request.context.clone(),
        }
    }
}

/// An agent's self-assessment for one request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapabilityAssessment {
    /// Whether the agent can handle the request
    pub can_handle_request: bool,
    /// Ranking score in `[0.0, 1.0]`
    pub capability_score: f64,
}

impl CapabilityAssessment {
    /// Create an assessment
    pub fn new(can_handle_request: bool, capability_score: f64) -> Self {
        Self {
            can_handle_request,
            capability_score,
        }
    }

    /// Assessment of an agent that cannot handle the request
    pub fn cannot_handle() -> Self {
        Self::new(false, 0.0)
    }

    /// Score clamped to `[0.0, 1.0]`, with non-finite values mapped to `0.0`
    pub fn normalized_score(&self) -> f64 {
        unit_interval(self.capability_score)
    }
}

/// Output of an agent, a workflow step or a whole coordination
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    /// Whether the agent succeeded
    pub success: bool,
    /// Text payload, typically generated code or analysis
    pub result: String,
    /// Confidence in `[0.0, 1.0]`
    pub confidence: f64,
    /// Error text, present iff `success` is false
    pub error_message: Option<String>,
    /// Diagnostic and trace data
    pub metadata: HashMap<String, serde_json::Value>,
    /// Whether the workflow should stop after this response
    pub should_terminate_workflow: bool,
}

impl AgentResponse {
    /// Successful response
    pub fn success(result: impl Into<String>, confidence: f64) -> Self {
        Self {
            success: true,
            result: result.into(),
            confidence: unit_interval(confidence),
            ..Default::default()
        }
    }

    /// Failed response with zero confidence
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error_message: Some(error.into()),
            ..Default::default()
        }
    }

    /// Sentinel for "this agent declined to act"
    pub fn no_action() -> Self {
        Self::success(String::new(), 0.0)
            .with_metadata(NO_ACTION_KEY, serde_json::Value::Bool(true))
    }

    /// Response returned when the caller cancels a coordination
    pub fn cancelled() -> Self {
        Self::failure("Coordination cancelled before completion")
            .with_metadata(CANCELLED_KEY, serde_json::Value::Bool(true))
    }

    /// Whether this is the [`AgentResponse::no_action`] sentinel
    pub fn is_no_action(&self) -> bool {
        matches!(
            self.metadata.get(NO_ACTION_KEY),
            Some(serde_json::Value::Bool(true))
        )
    }

    /// Whether this response came from a cancelled coordination
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self.metadata.get(CANCELLED_KEY),
            Some(serde_json::Value::Bool(true))
        )
    }

    /// Whether this response contributed an actual result
    pub fn contributes(&self) -> bool {
        self.success && !self.is_no_action()
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Ask the executor to stop after this response
    pub fn terminating(mut self) -> Self {
        self.should_terminate_workflow = true;
        self
    }
}
