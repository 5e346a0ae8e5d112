//! Error taxonomy for the inference loop.
//!
//! [`InferenceError`] is what every pipeline stage returns: it names the
//! failure a caller has to react to (bad input, registry misuse, an
//! exhausted backend, no usable quorum, a blown deadline). Transient backend
//! errors never appear here; the model agent retries them and only reports
//! [`InferenceError::BackendFailure`] once its attempts are spent.
//!
//! [`VeritasError`] composes the inference taxonomy with configuration, IO
//! and serialization failures for the bootstrap path, and is carried in an
//! [`error_stack::Report`] so context can be attached as it propagates.
//!
//! ```rust,ignore
//! use error_stack::ResultExt;
//! use veritas_kernel::error::{VeritasError, VeritasResult};
//!
//! fn load() -> VeritasResult<String> {
//!     let raw = std::fs::read_to_string("veritas.toml")
//!         .map_err(VeritasError::from)
//!         .map_err(error_stack::Report::new)
//!         .attach("reading veritas.toml")?;
//!     Ok(raw)
//! }
//! ```

use crate::config::ConfigError;
use thiserror::Error;

/// Failures surfaced by registry, agent, consistency, refinement and pipeline
/// operations.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum InferenceError {
    /// Malformed request, rejected before any dispatch.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No registration matches the requested model id or capability tag.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// A registration with this id already exists and replace was not requested.
    #[error("model '{0}' is already registered")]
    DuplicateModel(String),

    /// Every attempt against the resolved backend(s) failed.
    #[error("backend '{model_id}' failed after {attempts} attempt(s): {detail}")]
    BackendFailure {
        model_id: String,
        attempts: u32,
        detail: String,
    },

    /// Fewer than two samples succeeded, so no agreement can be measured.
    #[error("insufficient samples: {succeeded} of {requested} succeeded")]
    InsufficientSamples { requested: u32, succeeded: u32 },

    /// The sampled outputs did not reach the configured quorum.
    #[error("consistency failure: agreement {agreement_ratio:.2} below quorum {quorum:.2}")]
    ConsistencyFailure { agreement_ratio: f64, quorum: f64 },

    /// The request deadline elapsed; in-flight work for it was cancelled.
    #[error("deadline exceeded for request {request_id}")]
    DeadlineExceeded { request_id: String },
}

impl InferenceError {
    /// Registry misuse is a programmer error and is never retried.
    pub fn is_registry_misuse(&self) -> bool {
        matches!(self, Self::ModelNotFound(_) | Self::DuplicateModel(_))
    }

    pub fn deadline(request_id: impl Into<String>) -> Self {
        Self::DeadlineExceeded {
            request_id: request_id.into(),
        }
    }
}

/// Result alias for inference operations.
pub type InferenceResult<T> = Result<T, InferenceError>;

/// Crate-level error used on the bootstrap and CLI path.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum VeritasError {
    /// An inference-loop failure.
    #[error("inference error: {0}")]
    Inference(#[from] InferenceError),

    /// Loading or validating configuration failed.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// A low-level I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An untyped error described by a message string.
    #[error("{0}")]
    Internal(String),
}

/// Convenience result alias using [`error_stack::Report`].
pub type VeritasResult<T> = Result<T, error_stack::Report<VeritasError>>;

/// Extension trait lifting any error convertible into [`VeritasError`] into
/// a [`VeritasResult`].
pub trait IntoVeritasReport<T> {
    /// Convert the error and wrap it in an `error_stack::Report`.
    fn into_report(self) -> VeritasResult<T>;
}

impl<T, E> IntoVeritasReport<T> for Result<T, E>
where
    E: Into<VeritasError>,
{
    #[inline]
    fn into_report(self) -> VeritasResult<T> {
        self.map_err(|e| error_stack::Report::new(e.into()))
    }
}
