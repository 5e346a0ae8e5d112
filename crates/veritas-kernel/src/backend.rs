//! Backend adapter contract.
//!
//! A backend adapter executes one model call against one provider or
//! endpoint. It is the only extension point for adding providers: the
//! registry stores adapters behind `Arc<dyn BackendAdapter>` and the model
//! agent layers retries, timeouts and failover on top of a single `call`.

use crate::schema::GenerationParams;
use async_trait::async_trait;
use tokio::time::Instant;

/// Failure of a single backend call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum BackendError {
    /// Connection-level failure.
    #[error("network error: {0}")]
    Network(String),
    /// The call did not complete within its time budget.
    #[error("request timeout: {0}")]
    Timeout(String),
    /// The provider throttled the call.
    #[error("rate limited: {0}")]
    RateLimited(String),
    /// The provider answered with an error status.
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
    /// The provider answered, but not in the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    /// Credentials were missing or rejected.
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("backend error: {0}")]
    Other(String),
}

impl BackendError {
    /// Whether a fresh attempt could plausibly succeed.
    ///
    /// Network trouble, timeouts, throttling, 5xx statuses and malformed
    /// responses are transient; authentication failures and other 4xx
    /// statuses will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::RateLimited(_) => true,
            Self::InvalidResponse(_) => true,
            Self::Api { status, .. } => *status >= 500 || *status == 429 || *status == 408,
            Self::Auth(_) | Self::Other(_) => false,
        }
    }
}

/// Provider integration able to execute a single model call.
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    /// Provider name, used in logs.
    fn name(&self) -> &str;

    /// Run `prompt` with `params`. Implementations should abandon the call
    /// once `deadline` passes; the agent enforces it regardless.
    async fn call(
        &self,
        prompt: &str,
        params: &GenerationParams,
        deadline: Instant,
    ) -> Result<String, BackendError>;

    /// Liveness probe (default: always healthy).
    async fn health_check(&self) -> Result<bool, BackendError> {
        Ok(true)
    }
}
