//! Model agent
//!
//! Turns a [`Request`] into [`Candidate`]s by calling registered backends.
//!
//! - Per-attempt timeout is the smaller of the configured call timeout and
//!   the time left before the request deadline
//! - Transient failures are retried with backoff; once a backend is spent the
//!   next capability match is tried (failover)
//! - Every running call holds a slot of its backend's rate limit and a
//!   global in-flight slot; waiting for a slot is not an attempt
//! - `invoke_many` samples concurrently with bounded parallelism and
//!   tolerates partial failure
//! - Each attempt's `veritas.invoke` span carries SHA-256 digests of the
//!   prompt and, once answered, of the output

pub mod retry;

use crate::config::AgentConfig;
use crate::feedback::FeedbackLog;
use crate::registry::{ModelRegistry, ResolvedBackend};
use futures::StreamExt;
use retry::RetryPolicy;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{AcquireError, Semaphore, SemaphorePermit};
use tokio::time::{Instant, sleep, timeout_at};
use tracing::{Instrument, debug, info, warn};
use veritas_kernel::{
    BackendError, Candidate, FeedbackPayload, GenerationParams, InferenceError, InferenceResult,
    Request,
};

const SOURCE: &str = "agent";

/// Result of sampling one request `requested` times.
#[derive(Debug, Clone)]
pub struct SampleSet {
    pub requested: u32,
    /// Successful samples, ordered by sequence number.
    pub candidates: Vec<Candidate>,
    /// Why the remaining samples failed.
    pub failures: Vec<InferenceError>,
}

impl SampleSet {
    pub fn succeeded(&self) -> u32 {
        self.candidates.len() as u32
    }
}

/// Permits held for the duration of one backend call.
struct CallSlots<'a> {
    _backend: SemaphorePermit<'a>,
    _global: SemaphorePermit<'a>,
}

enum AttemptError {
    /// Retries against this backend are spent.
    Exhausted(BackendError),
    DeadlineExceeded,
}

pub struct ModelAgent {
    registry: Arc<ModelRegistry>,
    retry: RetryPolicy,
    call_timeout: Duration,
    in_flight: Arc<Semaphore>,
    failover: bool,
}

impl ModelAgent {
    pub fn new(registry: Arc<ModelRegistry>, config: &AgentConfig) -> Self {
        Self {
            registry,
            retry: config.retry_policy(),
            call_timeout: config.call_timeout(),
            in_flight: Arc::new(Semaphore::new(config.max_in_flight.max(1))),
            failover: config.failover,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Single call for `request`, producing the candidate with sequence 0.
    pub async fn invoke(&self, request: &Request, log: &FeedbackLog) -> InferenceResult<Candidate> {
        self.invoke_prompt(request, request.prompt(), 0, log).await
    }

    /// Call the request's target with a substitute prompt, e.g. a revision
    /// prompt built by the refiner.
    pub async fn invoke_prompt(
        &self,
        request: &Request,
        prompt: &str,
        sequence: u32,
        log: &FeedbackLog,
    ) -> InferenceResult<Candidate> {
        let result = self.call_chain(request, prompt, sequence).await;
        if let Err(InferenceError::BackendFailure {
            model_id,
            attempts,
            detail,
        }) = &result
        {
            log.emit(
                SOURCE,
                FeedbackPayload::BackendFailure {
                    model_id: model_id.clone(),
                    attempts: *attempts,
                    detail: detail.clone(),
                },
            );
        }
        result
    }

    /// `n` independent calls with parallelism capped at `n`.
    pub async fn invoke_many(
        &self,
        request: &Request,
        n: u32,
        log: &FeedbackLog,
    ) -> InferenceResult<SampleSet> {
        self.invoke_many_bounded(request, n, n as usize, log).await
    }

    /// `n` independent calls, at most `max_parallel` at a time.
    ///
    /// Individual failures are collected in the returned set. Unknown targets
    /// and the request deadline fail the whole call.
    pub async fn invoke_many_bounded(
        &self,
        request: &Request,
        n: u32,
        max_parallel: usize,
        log: &FeedbackLog,
    ) -> InferenceResult<SampleSet> {
        if n == 0 {
            return Err(InferenceError::InvalidRequest(
                "sample count must be at least 1".to_string(),
            ));
        }
        self.registry.resolve_ranked(request.target())?;

        let parallel = max_parallel.clamp(1, n as usize);
        debug!(request_id = %request.id(), n, parallel, "Sampling");

        let calls = futures::stream::iter(0..n)
            .map(|sequence| async move {
                (
                    sequence,
                    self.call_chain(request, request.prompt(), sequence).await,
                )
            })
            .buffer_unordered(parallel)
            .collect::<Vec<_>>();

        let mut results = timeout_at(request.deadline(), calls)
            .await
            .map_err(|_| InferenceError::deadline(request.id()))?;
        results.sort_by_key(|(sequence, _)| *sequence);

        let mut set = SampleSet {
            requested: n,
            candidates: Vec::with_capacity(results.len()),
            failures: Vec::new(),
        };
        for (_, result) in results {
            match result {
                Ok(candidate) => set.candidates.push(candidate),
                Err(InferenceError::DeadlineExceeded { request_id }) => {
                    return Err(InferenceError::DeadlineExceeded { request_id });
                }
                Err(err) => {
                    if let InferenceError::BackendFailure {
                        model_id,
                        attempts,
                        detail,
                    } = &err
                    {
                        log.emit(
                            SOURCE,
                            FeedbackPayload::BackendFailure {
                                model_id: model_id.clone(),
                                attempts: *attempts,
                                detail: detail.clone(),
                            },
                        );
                    }
                    set.failures.push(err);
                }
            }
        }

        info!(
            request_id = %request.id(),
            requested = n,
            succeeded = set.succeeded(),
            "Sampling finished"
        );
        Ok(set)
    }

    /// Resolve, then walk the ranked backends until one answers.
    async fn call_chain(
        &self,
        request: &Request,
        prompt: &str,
        sequence: u32,
    ) -> InferenceResult<Candidate> {
        let mut backends = self.registry.resolve_ranked(request.target())?;
        if !self.failover {
            backends.truncate(1);
        }

        let mut attempts = 0u32;
        let mut last_failure: Option<(String, BackendError)> = None;

        for backend in &backends {
            if let Some((previous, _)) = &last_failure {
                warn!(
                    request_id = %request.id(),
                    from = %previous,
                    to = %backend.model_id,
                    "Failing over"
                );
            }
            let started = Instant::now();
            match self
                .call_with_retry(request, backend, prompt, sequence, &mut attempts)
                .await
            {
                Ok(text) => {
                    return Ok(Candidate::new(
                        request.id(),
                        sequence,
                        text,
                        backend.model_id.clone(),
                        started.elapsed(),
                    ));
                }
                Err(AttemptError::DeadlineExceeded) => {
                    warn!(request_id = %request.id(), model_id = %backend.model_id, "Deadline exceeded");
                    return Err(InferenceError::deadline(request.id()));
                }
                Err(AttemptError::Exhausted(error)) => {
                    last_failure = Some((backend.model_id.clone(), error));
                }
            }
        }

        let (model_id, detail) = match last_failure {
            Some((model_id, error)) => (model_id, error.to_string()),
            None => (request.target().to_string(), "no backend attempted".to_string()),
        };
        warn!(
            request_id = %request.id(),
            model_id = %model_id,
            attempts,
            error = %detail,
            "Backend failure"
        );
        Err(InferenceError::BackendFailure {
            model_id,
            attempts,
            detail,
        })
    }

    async fn call_with_retry(
        &self,
        request: &Request,
        backend: &ResolvedBackend,
        prompt: &str,
        sequence: u32,
        attempts: &mut u32,
    ) -> Result<String, AttemptError> {
        let deadline = request.deadline();
        let max_attempts = self.retry.max_attempts.max(1);
        let prompt_hash = content_hash(prompt);

        for attempt in 0..max_attempts {
            if Instant::now() >= deadline {
                return Err(AttemptError::DeadlineExceeded);
            }

            let attempt_span = tracing::info_span!(
                "veritas.invoke",
                request_id = %request.id(),
                model_id = %backend.model_id,
                sequence,
                attempt,
                max_attempts,
                prompt_hash = %prompt_hash,
                output_hash = tracing::field::Empty
            );

            // Queueing for a slot is not an attempt: only the call itself is
            // bounded by the call timeout.
            let slots = self
                .acquire_slots(backend, deadline)
                .instrument(attempt_span.clone())
                .await?;
            *attempts += 1;
            let attempt_deadline = deadline.min(Instant::now() + self.call_timeout);

            let outcome = self
                .call_once(backend, prompt, request.params(), attempt_deadline)
                .instrument(attempt_span.clone())
                .await;
            drop(slots);

            let error = match outcome {
                Ok(text) => {
                    let output_hash = content_hash(&text);
                    attempt_span.record("output_hash", tracing::field::display(&output_hash));
                    debug!(parent: &attempt_span, chars = text.len(), "Backend answered");
                    if attempt > 0 {
                        info!(
                            request_id = %request.id(),
                            model_id = %backend.model_id,
                            "Call succeeded on attempt {}",
                            attempt + 1
                        );
                    }
                    return Ok(text);
                }
                Err(error) => error,
            };

            if Instant::now() >= deadline {
                return Err(AttemptError::DeadlineExceeded);
            }
            if !self.retry.should_retry(attempt, &error) {
                return Err(AttemptError::Exhausted(error));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            let Some(delay) = self.retry.delay_within(attempt, remaining) else {
                return Err(AttemptError::DeadlineExceeded);
            };
            warn!(
                request_id = %request.id(),
                model_id = %backend.model_id,
                error = %error,
                "Call failed (attempt {}), retrying in {}ms",
                attempt + 1,
                delay.as_millis()
            );
            sleep(delay).instrument(attempt_span).await;
        }

        // Loop always returns; keeps the compiler satisfied for max_attempts == 0.
        Err(AttemptError::Exhausted(BackendError::Other(
            "retry loop completed without result".to_string(),
        )))
    }

    /// Wait for a slot of the backend's rate limit, then a global in-flight
    /// slot. The global slot is only taken once the call can start, so calls
    /// queued on a saturated backend never starve idle ones.
    async fn acquire_slots<'a>(
        &'a self,
        backend: &'a ResolvedBackend,
        deadline: Instant,
    ) -> Result<CallSlots<'a>, AttemptError> {
        let acquire = async {
            let backend_slot = backend.limiter.acquire().await?;
            let global_slot = self.in_flight.acquire().await?;
            Ok::<_, AcquireError>(CallSlots {
                _backend: backend_slot,
                _global: global_slot,
            })
        };
        match timeout_at(deadline, acquire).await {
            Ok(Ok(slots)) => Ok(slots),
            Ok(Err(_)) => Err(AttemptError::Exhausted(BackendError::Other(
                "call limiter closed".to_string(),
            ))),
            Err(_) => Err(AttemptError::DeadlineExceeded),
        }
    }

    async fn call_once(
        &self,
        backend: &ResolvedBackend,
        prompt: &str,
        params: &GenerationParams,
        deadline: Instant,
    ) -> Result<String, BackendError> {
        match timeout_at(deadline, backend.adapter.call(prompt, params, deadline)).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout(format!(
                "{} did not answer in time",
                backend.model_id
            ))),
        }
    }
}

/// Lowercase hex SHA-256 of `text`, used to correlate traces without
/// logging prompts or outputs.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
