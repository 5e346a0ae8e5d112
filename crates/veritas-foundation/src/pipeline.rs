//! Orchestrating pipeline
//!
//! One request end to end: the consistency controller elects a seed (or a
//! single agent call provides it when only one sample is requested), the
//! self-refiner drives it to a terminal outcome, and every feedback event
//! emitted on the way is returned alongside the result. The request deadline
//! bounds the whole run.

use crate::agent::ModelAgent;
use crate::agent::retry::RetryPolicy;
use crate::config::{
    AgentConfig, ConsistencyConfig, RefinerConfig, ScorerConfig, VeritasConfig,
};
use crate::consistency::ConsistencyController;
use crate::feedback::{FeedbackLog, FeedbackRouter};
use crate::refiner::{RefineStep, RefinementStatus, SelfRefiner};
use crate::registry::ModelRegistry;
use crate::scorer::OutputScorer;
use serde::Serialize;
use std::sync::Arc;
use tokio::time::timeout_at;
use tracing::{Instrument, info, warn};
use veritas_kernel::config::ConfigError;
use veritas_kernel::policy::{RelevanceMeasure, SafetyPolicy, SimilarityStrategy};
use veritas_kernel::{
    Candidate, ConsistencyVerdict, FeedbackEvent, InferenceError, InferenceResult, Request,
    RequestBounds, RequestBuilder, Score,
};

/// Terminal result of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub request_id: String,
    pub status: RefinementStatus,
    /// Accepted candidate, or the best one seen when refinement was exhausted.
    pub candidate: Candidate,
    pub score: Score,
    /// Present when the seed came from a consistency check.
    pub verdict: Option<ConsistencyVerdict>,
    pub steps: Vec<RefineStep>,
    /// Every feedback event emitted for the request, in emission order.
    pub events: Vec<FeedbackEvent>,
}

/// Named failure of a run, with the events emitted before it.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{error}")]
pub struct PipelineError {
    pub error: InferenceError,
    pub events: Vec<FeedbackEvent>,
}

pub struct InferencePipeline {
    registry: Arc<ModelRegistry>,
    agent: Arc<ModelAgent>,
    consistency: ConsistencyController,
    refiner: SelfRefiner,
    router: FeedbackRouter,
    bounds: RequestBounds,
    default_samples: u32,
}

impl InferencePipeline {
    pub fn builder(registry: Arc<ModelRegistry>) -> PipelineBuilder {
        PipelineBuilder::new(registry)
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn agent(&self) -> &Arc<ModelAgent> {
        &self.agent
    }

    pub fn router(&self) -> &FeedbackRouter {
        &self.router
    }

    pub fn bounds(&self) -> &RequestBounds {
        &self.bounds
    }

    /// Request builder preloaded with the configured sample count.
    pub fn request(&self, prompt: impl Into<String>) -> RequestBuilder {
        Request::builder(prompt).samples(self.default_samples)
    }

    /// Validate `builder` against the configured bounds, then run it.
    pub async fn submit(&self, builder: RequestBuilder) -> Result<PipelineOutcome, PipelineError> {
        let request = builder.build(&self.bounds).map_err(|error| PipelineError {
            error,
            events: Vec::new(),
        })?;
        self.run(request).await
    }

    pub async fn run(&self, request: Request) -> Result<PipelineOutcome, PipelineError> {
        let log = FeedbackLog::new(self.router.clone(), request.id());
        let span = tracing::info_span!(
            "veritas.pipeline",
            request_id = %request.id(),
            model_target = %request.target(),
            samples = request.params().samples
        );

        let result = timeout_at(request.deadline(), self.execute(&request, &log))
            .instrument(span)
            .await
            .unwrap_or_else(|_| Err(InferenceError::deadline(request.id())));

        match result {
            Ok((verdict, refinement)) => {
                info!(
                    request_id = %request.id(),
                    status = ?refinement.status,
                    overall = refinement.best_score.overall,
                    "Pipeline finished"
                );
                Ok(PipelineOutcome {
                    request_id: request.id().to_string(),
                    status: refinement.status,
                    candidate: refinement.best,
                    score: refinement.best_score,
                    verdict,
                    steps: refinement.steps,
                    events: log.into_events(),
                })
            }
            Err(error) => {
                warn!(request_id = %request.id(), error = %error, "Pipeline failed");
                Err(PipelineError {
                    error,
                    events: log.into_events(),
                })
            }
        }
    }

    async fn execute(
        &self,
        request: &Request,
        log: &FeedbackLog,
    ) -> InferenceResult<(Option<ConsistencyVerdict>, crate::refiner::RefinementOutcome)> {
        let (seed, verdict) = if request.params().samples >= 2 {
            let verdict = self.consistency.check(request, log).await?;
            match verdict.elected.clone() {
                Some(elected) => (elected, Some(verdict)),
                None => {
                    return Err(InferenceError::ConsistencyFailure {
                        agreement_ratio: verdict.agreement_ratio,
                        quorum: verdict.quorum,
                    });
                }
            }
        } else {
            (self.agent.invoke(request, log).await?, None)
        };

        let refinement = self.refiner.run(request, seed, log).await?;
        Ok((verdict, refinement))
    }
}

/// Wires an [`InferencePipeline`] from configuration sections plus optional
/// custom strategies.
pub struct PipelineBuilder {
    registry: Arc<ModelRegistry>,
    agent: AgentConfig,
    retry: Option<RetryPolicy>,
    consistency: ConsistencyConfig,
    scorer: ScorerConfig,
    refiner: RefinerConfig,
    bounds: RequestBounds,
    router: Option<FeedbackRouter>,
    similarity: Option<Arc<dyn SimilarityStrategy>>,
    relevance: Option<Arc<dyn RelevanceMeasure>>,
    safety: Option<Arc<dyn SafetyPolicy>>,
}

impl PipelineBuilder {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self {
            registry,
            agent: AgentConfig::default(),
            retry: None,
            consistency: ConsistencyConfig::default(),
            scorer: ScorerConfig::default(),
            refiner: RefinerConfig::default(),
            bounds: RequestBounds::default(),
            router: None,
            similarity: None,
            relevance: None,
            safety: None,
        }
    }

    /// Take every section of `config` except the model list.
    pub fn config(mut self, config: &VeritasConfig) -> Self {
        self.agent = config.agent.clone();
        self.consistency = config.consistency.clone();
        self.scorer = config.scorer.clone();
        self.refiner = config.refiner.clone();
        self.bounds = config.bounds.clone();
        self
    }

    pub fn agent(mut self, agent: AgentConfig) -> Self {
        self.agent = agent;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn consistency(mut self, consistency: ConsistencyConfig) -> Self {
        self.consistency = consistency;
        self
    }

    pub fn scorer(mut self, scorer: ScorerConfig) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn refiner(mut self, refiner: RefinerConfig) -> Self {
        self.refiner = refiner;
        self
    }

    pub fn bounds(mut self, bounds: RequestBounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn router(mut self, router: FeedbackRouter) -> Self {
        self.router = Some(router);
        self
    }

    pub fn similarity(mut self, similarity: Arc<dyn SimilarityStrategy>) -> Self {
        self.similarity = Some(similarity);
        self
    }

    pub fn relevance(mut self, relevance: Arc<dyn RelevanceMeasure>) -> Self {
        self.relevance = Some(relevance);
        self
    }

    pub fn safety(mut self, safety: Arc<dyn SafetyPolicy>) -> Self {
        self.safety = Some(safety);
        self
    }

    pub fn build(self) -> Result<InferencePipeline, ConfigError> {
        let mut agent = ModelAgent::new(self.registry.clone(), &self.agent);
        if let Some(retry) = self.retry {
            agent = agent.with_retry(retry);
        }
        let agent = Arc::new(agent);

        let mut scorer = OutputScorer::new(&self.scorer)
            .map_err(|e| ConfigError::Invalid(format!("scorer.safety: {e}")))?;
        if let Some(relevance) = self.relevance {
            scorer = scorer.with_relevance(relevance);
        }
        if let Some(safety) = self.safety {
            scorer = scorer.with_safety(safety);
        }

        let mut consistency = ConsistencyController::new(agent.clone(), &self.consistency);
        if let Some(similarity) = self.similarity {
            consistency = consistency.with_similarity(similarity);
        }

        let refiner = SelfRefiner::new(agent.clone(), Arc::new(scorer), self.refiner);

        Ok(InferencePipeline {
            registry: self.registry,
            agent,
            consistency,
            refiner,
            router: self.router.unwrap_or_default(),
            bounds: self.bounds,
            default_samples: self.consistency.default_samples,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::LocalEchoBackend;
    use crate::config::{BackendConfig, ProviderKind};
    use crate::registry::RegisterMode;
    use veritas_kernel::FeedbackKind;

    fn pipeline() -> InferencePipeline {
        let registry = Arc::new(ModelRegistry::new());
        registry
            .register(
                Arc::new(LocalEchoBackend::new("echo")),
                BackendConfig::new("echo", ProviderKind::Local),
                RegisterMode::Insert,
            )
            .unwrap();
        InferencePipeline::builder(registry).build().unwrap()
    }

    #[tokio::test]
    async fn test_echo_backend_is_accepted_after_consistency() {
        let pipeline = pipeline();
        let outcome = pipeline
            .submit(pipeline.request("summarize the quarterly report"))
            .await
            .unwrap();
        assert_eq!(outcome.status, RefinementStatus::Accepted);
        let verdict = outcome.verdict.unwrap();
        assert_eq!(verdict.agreement_ratio, 1.0);
        assert_eq!(outcome.candidate.sequence, 0);
        assert_eq!(
            outcome.events.iter().map(|e| e.kind()).collect::<Vec<_>>(),
            vec![FeedbackKind::Accepted]
        );
    }

    #[tokio::test]
    async fn test_single_sample_skips_consistency() {
        let pipeline = pipeline();
        let outcome = pipeline
            .submit(pipeline.request("summarize the quarterly report").samples(1))
            .await
            .unwrap();
        assert!(outcome.verdict.is_none());
        assert_eq!(outcome.status, RefinementStatus::Accepted);
    }

    #[tokio::test]
    async fn test_invalid_request_rejected_before_dispatch() {
        let pipeline = pipeline();
        let err = pipeline.submit(pipeline.request("")).await.unwrap_err();
        assert!(matches!(err.error, InferenceError::InvalidRequest(_)));
        assert!(err.events.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_model_surfaces_model_not_found() {
        let pipeline = pipeline();
        let err = pipeline
            .submit(pipeline.request("hello there").model("ghost"))
            .await
            .unwrap_err();
        assert!(matches!(err.error, InferenceError::ModelNotFound(_)));
        assert!(err.events.is_empty());
    }
}
