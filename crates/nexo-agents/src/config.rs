//! Coordinator configuration
//!
//! Configuration is layered: built-in defaults, then an optional TOML file,
//! then environment variables prefixed with `NEXO` (nested keys separated by
//! `__`, e.g. `NEXO__RETRY__MAX_RETRIES=2`).

use crate::error::{AgentError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Sampling settings for one kind of inference call
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceSettings {
    /// Sampling temperature
    pub temperature: f32,
    /// Maximum tokens to generate
    pub max_tokens: u32,
}

impl InferenceSettings {
    /// Create inference settings
    pub const fn new(temperature: f32, max_tokens: u32) -> Self {
        Self {
            temperature,
            max_tokens,
        }
    }

    fn validate(&self, phase: &str) -> Result<()> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(AgentError::config_error(format!(
                "{} temperature must be between 0.0 and 2.0, got {}",
                phase, self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(AgentError::config_error(format!(
                "{} max_tokens must be greater than 0",
                phase
            )));
        }
        Ok(())
    }
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self::new(0.3, 1000)
    }
}

/// Configuration for retrying failed step invocations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first invocation
    pub max_retries: u32,
    /// Initial backoff duration in milliseconds
    pub initial_backoff_ms: u64,
    /// Maximum backoff duration in milliseconds
    pub max_backoff_ms: u64,
    /// Backoff multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Retry configuration that never retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Backoff to wait before retry number `retry` (1-based)
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1) as i32;
        let backoff_ms =
            (self.initial_backoff_ms as f64) * self.backoff_multiplier.powi(exponent);
        let capped = backoff_ms.min(self.max_backoff_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            initial_backoff_ms: 100,
            max_backoff_ms: 2000,
            backoff_multiplier: 2.0,
        }
    }
}

/// Configuration for [`crate::AgentCoordinator`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Settings for the required-specialization analysis call
    pub analysis: InferenceSettings,
    /// Settings for the workflow structure call
    pub planning: InferenceSettings,
    /// Settings for the workflow optimization call
    pub optimization: InferenceSettings,
    /// Settings for the final synthesis call
    pub synthesis: InferenceSettings,
    /// Timeout for each agent call, in milliseconds
    pub step_timeout_ms: Option<u64>,
    /// Timeout for each inference call, in milliseconds
    pub inference_timeout_ms: Option<u64>,
    /// Retry policy for failed step invocations
    pub retry: RetryConfig,
    /// Whether to run workflow optimization before execution
    pub apply_optimization: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            analysis: InferenceSettings::new(0.3, 500),
            planning: InferenceSettings::new(0.3, 1000),
            optimization: InferenceSettings::new(0.3, 800),
            synthesis: InferenceSettings::new(0.5, 4000),
            step_timeout_ms: Some(120_000),
            inference_timeout_ms: Some(60_000),
            retry: RetryConfig::default(),
            apply_optimization: true,
        }
    }
}

impl CoordinatorConfig {
    /// Environment variable prefix
    pub const ENV_PREFIX: &'static str = "NEXO";

    /// Load configuration from an optional TOML file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path.to_path_buf()).required(false));
        }
        builder = builder.add_source(
            Environment::with_prefix(Self::ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate value ranges
    pub fn validate(&self) -> Result<()> {
        self.analysis.validate("analysis")?;
        self.planning.validate("planning")?;
        self.optimization.validate("optimization")?;
        self.synthesis.validate("synthesis")?;

        if self.step_timeout_ms == Some(0) {
            return Err(AgentError::config_error(
                "step_timeout_ms must be greater than 0 when set",
            ));
        }
        if self.inference_timeout_ms == Some(0) {
            return Err(AgentError::config_error(
                "inference_timeout_ms must be greater than 0 when set",
            ));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(AgentError::config_error(
                "retry.backoff_multiplier must be at least 1.0",
            ));
        }
        Ok(())
    }

    /// Per-call agent timeout
    pub fn step_timeout(&self) -> Option<Duration> {
        self.step_timeout_ms.map(Duration::from_millis)
    }

    /// Per-call inference timeout
    pub fn inference_timeout(&self) -> Option<Duration> {
        self.inference_timeout_ms.map(Duration::from_millis)
    }
}
