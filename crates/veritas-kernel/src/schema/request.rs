use crate::error::{InferenceError, InferenceResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Default time budget for a request when no deadline is given.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// How a request names the backend it wants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ModelTarget {
    /// An exact registered model id.
    Model(String),
    /// Any registration declaring this capability tag.
    Capability(String),
    /// The registry's default model.
    #[default]
    Default,
}

impl fmt::Display for ModelTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Model(id) => write!(f, "model:{id}"),
            Self::Capability(tag) => write!(f, "capability:{tag}"),
            Self::Default => f.write_str("default"),
        }
    }
}

/// Category of prompt being issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    #[default]
    Task,
    Critique,
    Refine,
    Replay,
}

/// Expected structure of the model output, checked by the scorer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputFormat {
    /// Free text; must not be blank.
    #[default]
    Text,
    /// A JSON document, optionally required to be an object carrying these keys.
    Json {
        #[serde(default)]
        required_fields: Vec<String>,
    },
    /// Source code; must not be blank and must have balanced delimiters.
    Code,
}

/// Where a request originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RequestSource {
    Dag,
    Replay,
    Test,
    #[default]
    Manual,
}

/// Caller-supplied tracing metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RequestMetadata {
    pub source: RequestSource,
    pub trace_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Sampling parameters passed to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
    /// Number of independent samples drawn for consistency checking.
    pub samples: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1024,
            samples: 3,
        }
    }
}

/// Configured limits a request must respect to be accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestBounds {
    pub min_temperature: f32,
    pub max_temperature: f32,
    pub max_tokens: u32,
    pub max_samples: u32,
}

impl Default for RequestBounds {
    fn default() -> Self {
        Self {
            min_temperature: 0.0,
            max_temperature: 2.0,
            max_tokens: 32_768,
            max_samples: 15,
        }
    }
}

impl RequestBounds {
    fn check(&self, params: &GenerationParams) -> InferenceResult<()> {
        if params.samples == 0 {
            return Err(InferenceError::InvalidRequest(
                "sampling count must be at least 1".to_string(),
            ));
        }
        if params.samples > self.max_samples {
            return Err(InferenceError::InvalidRequest(format!(
                "sampling count {} exceeds bound {}",
                params.samples, self.max_samples
            )));
        }
        if !params.temperature.is_finite()
            || params.temperature < self.min_temperature
            || params.temperature > self.max_temperature
        {
            return Err(InferenceError::InvalidRequest(format!(
                "temperature {} outside [{}, {}]",
                params.temperature, self.min_temperature, self.max_temperature
            )));
        }
        if params.max_tokens == 0 || params.max_tokens > self.max_tokens {
            return Err(InferenceError::InvalidRequest(format!(
                "max_tokens {} outside [1, {}]",
                params.max_tokens, self.max_tokens
            )));
        }
        Ok(())
    }
}

/// One logical inference task. Immutable once built.
#[derive(Debug, Clone)]
pub struct Request {
    id: String,
    prompt: String,
    kind: PromptKind,
    format: OutputFormat,
    target: ModelTarget,
    params: GenerationParams,
    deadline: Instant,
    metadata: RequestMetadata,
}

impl Request {
    pub fn builder(prompt: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(prompt)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn kind(&self) -> PromptKind {
        self.kind
    }

    pub fn format(&self) -> &OutputFormat {
        &self.format
    }

    pub fn target(&self) -> &ModelTarget {
        &self.target
    }

    pub fn params(&self) -> &GenerationParams {
        &self.params
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn metadata(&self) -> &RequestMetadata {
        &self.metadata
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

/// Builder for [`Request`]; validation happens in [`RequestBuilder::build`].
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    id: Option<String>,
    prompt: String,
    kind: PromptKind,
    format: OutputFormat,
    target: ModelTarget,
    params: GenerationParams,
    timeout: Duration,
    deadline: Option<Instant>,
    metadata: RequestMetadata,
}

impl RequestBuilder {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            id: None,
            prompt: prompt.into(),
            kind: PromptKind::default(),
            format: OutputFormat::default(),
            target: ModelTarget::default(),
            params: GenerationParams::default(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            deadline: None,
            metadata: RequestMetadata::default(),
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn kind(mut self, kind: PromptKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn target(mut self, target: ModelTarget) -> Self {
        self.target = target;
        self
    }

    pub fn model(self, model_id: impl Into<String>) -> Self {
        self.target(ModelTarget::Model(model_id.into()))
    }

    pub fn capability(self, tag: impl Into<String>) -> Self {
        self.target(ModelTarget::Capability(tag.into()))
    }

    pub fn params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.params.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.params.max_tokens = max_tokens;
        self
    }

    pub fn samples(mut self, samples: u32) -> Self {
        self.params.samples = samples;
        self
    }

    /// Deadline relative to the moment `build` is called.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self.deadline = None;
        self
    }

    /// Absolute deadline; takes precedence over `timeout`.
    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn source(mut self, source: RequestSource) -> Self {
        self.metadata.source = source;
        self
    }

    pub fn trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.metadata.trace_id = Some(trace_id.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.metadata.tags.push(tag.into());
        self
    }

    /// Validate against `bounds` and freeze the request.
    pub fn build(self, bounds: &RequestBounds) -> InferenceResult<Request> {
        if self.prompt.trim().is_empty() {
            return Err(InferenceError::InvalidRequest(
                "prompt text is empty".to_string(),
            ));
        }
        bounds.check(&self.params)?;
        if let Some(id) = &self.id {
            if id.trim().is_empty() {
                return Err(InferenceError::InvalidRequest(
                    "request id is empty".to_string(),
                ));
            }
        }

        let deadline = self
            .deadline
            .unwrap_or_else(|| Instant::now() + self.timeout);

        Ok(Request {
            id: self
                .id
                .unwrap_or_else(|| uuid::Uuid::now_v7().to_string()),
            prompt: self.prompt,
            kind: self.kind,
            format: self.format,
            target: self.target,
            params: self.params,
            deadline,
            metadata: self.metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds() -> RequestBounds {
        RequestBounds::default()
    }

    #[tokio::test]
    async fn test_build_defaults() {
        let request = Request::builder("summarize X").build(&bounds()).unwrap();
        assert_eq!(request.prompt(), "summarize X");
        assert_eq!(request.target(), &ModelTarget::Default);
        assert_eq!(request.params().samples, 3);
        assert!(!request.id().is_empty());
        assert!(request.remaining() > Duration::from_secs(50));
    }

    #[tokio::test]
    async fn test_empty_prompt_rejected() {
        let err = Request::builder("   ").build(&bounds()).unwrap_err();
        assert!(matches!(err, InferenceError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_zero_samples_rejected() {
        let err = Request::builder("hi").samples(0).build(&bounds()).unwrap_err();
        assert!(matches!(err, InferenceError::InvalidRequest(msg) if msg.contains("sampling")));
    }

    #[tokio::test]
    async fn test_out_of_bounds_parameters_rejected() {
        assert!(Request::builder("hi").samples(99).build(&bounds()).is_err());
        assert!(Request::builder("hi").temperature(3.5).build(&bounds()).is_err());
        assert!(Request::builder("hi").temperature(f32::NAN).build(&bounds()).is_err());
        assert!(Request::builder("hi").max_tokens(0).build(&bounds()).is_err());
    }

    #[tokio::test]
    async fn test_unique_ids() {
        let a = Request::builder("hi").build(&bounds()).unwrap();
        let b = Request::builder("hi").build(&bounds()).unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_tracks_timeout() {
        let request = Request::builder("hi")
            .timeout(Duration::from_secs(2))
            .build(&bounds())
            .unwrap();
        assert!(!request.is_expired());
        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(request.is_expired());
        assert_eq!(request.remaining(), Duration::ZERO);
    }

    #[test]
    fn test_target_serde_shape() {
        let json = serde_json::to_value(ModelTarget::Capability("summarize".into())).unwrap();
        assert_eq!(json["type"], "capability");
        assert_eq!(json["value"], "summarize");
        assert_eq!(ModelTarget::Model("m".into()).to_string(), "model:m");
    }
}
