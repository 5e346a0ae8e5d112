//! Typed pipeline configuration
//!
//! Deserialized through [`veritas_kernel::config`] from any supported file
//! format; every section has defaults so a file only needs the `models`
//! list. [`VeritasConfig::validate`] runs at load time.

use crate::agent::retry::{BackoffStrategy, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use veritas_kernel::RequestBounds;
use veritas_kernel::config::{ConfigError, ConfigResult};

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VeritasConfig {
    pub models: Vec<BackendConfig>,
    pub agent: AgentConfig,
    pub consistency: ConsistencyConfig,
    pub scorer: ScorerConfig,
    pub refiner: RefinerConfig,
    pub bounds: RequestBounds,
    pub feedback: FeedbackConfig,
}

impl VeritasConfig {
    /// Reject configurations that would only fail later at request time.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut seen = HashSet::new();
        for model in &self.models {
            if model.model_id.trim().is_empty() {
                return Err(invalid("model_id must not be empty"));
            }
            if !seen.insert(model.model_id.as_str()) {
                return Err(invalid(format!("duplicate model_id '{}'", model.model_id)));
            }
            if model.rate_limit.max_concurrent == 0 {
                return Err(invalid(format!(
                    "model '{}': rate_limit.max_concurrent must be at least 1",
                    model.model_id
                )));
            }
            if matches!(model.provider, ProviderKind::Http | ProviderKind::Watsonx)
                && model.endpoint.is_none()
            {
                return Err(invalid(format!(
                    "model '{}': provider {:?} requires an endpoint",
                    model.model_id, model.provider
                )));
            }
            for cap in &model.capabilities {
                if cap.tag.trim().is_empty() || !cap.score.is_finite() || cap.score < 0.0 {
                    return Err(invalid(format!(
                        "model '{}': capability entries need a tag and a non-negative score",
                        model.model_id
                    )));
                }
            }
        }
        if self.models.iter().filter(|m| m.default).count() > 1 {
            return Err(invalid("at most one model may be flagged default"));
        }

        if self.agent.max_attempts == 0 {
            return Err(invalid("agent.max_attempts must be at least 1"));
        }
        if self.agent.call_timeout_ms == 0 {
            return Err(invalid("agent.call_timeout_ms must be positive"));
        }
        if self.agent.max_in_flight == 0 {
            return Err(invalid("agent.max_in_flight must be at least 1"));
        }

        let c = &self.consistency;
        if c.default_samples == 0 || c.default_samples > self.bounds.max_samples {
            return Err(invalid(format!(
                "consistency.default_samples must be in [1, {}]",
                self.bounds.max_samples
            )));
        }
        if !(c.quorum > 0.0 && c.quorum <= 1.0) {
            return Err(invalid("consistency.quorum must be in (0, 1]"));
        }
        if !(0.0..=1.0).contains(&c.similarity_threshold) {
            return Err(invalid("consistency.similarity_threshold must be in [0, 1]"));
        }
        if c.max_parallel_samples == Some(0) {
            return Err(invalid("consistency.max_parallel_samples must be at least 1"));
        }

        let s = &self.scorer;
        if !(0.0..=1.0).contains(&s.threshold) {
            return Err(invalid("scorer.threshold must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&s.dimension_floor) {
            return Err(invalid("scorer.dimension_floor must be in [0, 1]"));
        }
        let w = &s.weights;
        if [w.format, w.relevance, w.safety]
            .iter()
            .any(|v| !v.is_finite() || *v < 0.0)
            || w.total() <= 0.0
        {
            return Err(invalid("scorer.weights must be non-negative with a positive sum"));
        }
        for pattern in &s.safety.blocked_patterns {
            regex::Regex::new(pattern)
                .map_err(|e| invalid(format!("scorer.safety pattern '{pattern}': {e}")))?;
        }

        if !self.refiner.rewrite_template.contains("{prompt}")
            || !self.refiner.rewrite_template.contains("{critique}")
        {
            return Err(invalid(
                "refiner.rewrite_template must reference {prompt} and {critique}",
            ));
        }
        if !self.refiner.critique_template.contains("{output}") {
            return Err(invalid("refiner.critique_template must reference {output}"));
        }

        if self.bounds.min_temperature > self.bounds.max_temperature {
            return Err(invalid("bounds.min_temperature exceeds bounds.max_temperature"));
        }
        if self.feedback.subscriber_capacity == 0 {
            return Err(invalid("feedback.subscriber_capacity must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}

/// Supported provider families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Generic JSON-over-HTTP endpoint
    #[default]
    Http,
    /// IBM watsonx text generation
    Watsonx,
    /// OpenLLM server
    Openllm,
    /// Offline echo adapter
    Local,
}

/// Capability declaration with a match score used for ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityTag {
    pub tag: String,
    #[serde(default = "default_capability_score")]
    pub score: f64,
}

fn default_capability_score() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimit {
    /// Maximum concurrent calls against this backend
    pub max_concurrent: usize,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self { max_concurrent: 4 }
    }
}

/// Static configuration of one backend registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub model_id: String,
    #[serde(default)]
    pub provider: ProviderKind,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<CapabilityTag>,
    #[serde(default)]
    pub rate_limit: RateLimit,
    /// Resolve `ModelTarget::Default` to this registration
    #[serde(default)]
    pub default: bool,
    /// Extra provider parameters merged into each call body
    #[serde(default)]
    pub params: HashMap<String, serde_json::Value>,
}

impl BackendConfig {
    pub fn new(model_id: impl Into<String>, provider: ProviderKind) -> Self {
        Self {
            model_id: model_id.into(),
            provider,
            endpoint: None,
            api_key: None,
            capabilities: Vec::new(),
            rate_limit: RateLimit::default(),
            default: false,
            params: HashMap::new(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_capability(mut self, tag: impl Into<String>, score: f64) -> Self {
        self.capabilities.push(CapabilityTag {
            tag: tag.into(),
            score,
        });
        self
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.rate_limit.max_concurrent = max;
        self
    }

    pub fn as_default(mut self) -> Self {
        self.default = true;
        self
    }

    /// Declared match score for `tag`, if any.
    pub fn capability_score(&self, tag: &str) -> Option<f64> {
        self.capabilities
            .iter()
            .filter(|c| c.tag == tag)
            .map(|c| c.score)
            .fold(None, |best, s| Some(best.map_or(s, |b: f64| b.max(s))))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub max_attempts: u32,
    pub backoff: BackoffStrategy,
    pub call_timeout_ms: u64,
    /// Global cap on concurrently running backend calls
    pub max_in_flight: usize,
    /// Try lower-ranked capability matches once a backend is exhausted
    pub failover: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffStrategy::default(),
            call_timeout_ms: 30_000,
            max_in_flight: 16,
            failover: true,
        }
    }
}

impl AgentConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff: self.backoff.clone(),
        }
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    /// Equality after whitespace and case normalisation
    Exact,
    /// Token-set overlap
    #[default]
    Jaccard,
    /// Normalised edit-distance ratio
    Levenshtein,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsistencyConfig {
    /// Sample count applied to requests built through the pipeline
    pub default_samples: u32,
    pub quorum: f64,
    pub similarity: SimilarityMetric,
    pub similarity_threshold: f64,
    /// Parallelism cap for sampling; defaults to the sample count
    pub max_parallel_samples: Option<usize>,
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self {
            default_samples: 3,
            quorum: 0.6,
            similarity: SimilarityMetric::default(),
            similarity_threshold: 0.8,
            max_parallel_samples: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub format: f64,
    pub relevance: f64,
    pub safety: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            format: 0.4,
            relevance: 0.3,
            safety: 0.3,
        }
    }
}

impl ScoreWeights {
    pub fn total(&self) -> f64 {
        self.format + self.relevance + self.safety
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelevanceKind {
    /// Prompt content words mentioned by the output
    #[default]
    Lexical,
    /// Words per sentence of the output alone
    Fluency,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Case-insensitive regexes; any match scores the safety dimension 0
    pub blocked_patterns: Vec<String>,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            blocked_patterns: vec![
                r"ignore (all )?(previous|prior) instructions".to_string(),
                r"-----BEGIN [A-Z ]*PRIVATE KEY-----".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    pub threshold: f64,
    pub weights: ScoreWeights,
    /// Sub-scores below this become critique defects
    pub dimension_floor: f64,
    pub relevance: RelevanceKind,
    pub safety: SafetyConfig,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            weights: ScoreWeights::default(),
            dimension_floor: 0.7,
            relevance: RelevanceKind::default(),
            safety: SafetyConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CritiqueMode {
    /// Critique built from the failing score dimensions only
    #[default]
    Derived,
    /// Additionally ask the model to review its own output
    ModelAssisted,
}

pub const DEFAULT_REWRITE_TEMPLATE: &str = "Original prompt: {prompt}\nCurrent answer: {output}\nCritique: {critique}\n\nRewrite the answer incorporating the critique.";

pub const DEFAULT_CRITIQUE_TEMPLATE: &str = "You are a critic. Review the following output and describe any problems or improvements needed:\n\n{output}";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinerConfig {
    /// Revisions allowed after the seed is scored
    pub max_iterations: u32,
    pub critique_mode: CritiqueMode,
    /// Placeholders: `{prompt}`, `{output}`, `{critique}`
    pub rewrite_template: String,
    /// Placeholder: `{output}`
    pub critique_template: String,
}

impl Default for RefinerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 2,
            critique_mode: CritiqueMode::default(),
            rewrite_template: DEFAULT_REWRITE_TEMPLATE.to_string(),
            critique_template: DEFAULT_CRITIQUE_TEMPLATE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    /// Queue depth per subscriber before events are dropped for it
    pub subscriber_capacity: usize,
    /// Append every event as a JSON line to this file
    pub trace_path: Option<String>,
    /// Log every event through `tracing`
    pub audit_log: bool,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            subscriber_capacity: 256,
            trace_path: None,
            audit_log: true,
        }
    }
}
