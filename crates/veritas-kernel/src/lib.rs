//! Veritas Kernel
//!
//! Leaf contracts shared by every stage of the inference loop:
//!
//! - [`schema`]: requests, candidates, critiques, scores, verdicts and feedback events
//! - [`backend`]: the adapter trait every model provider implements
//! - [`policy`]: pluggable similarity / relevance / safety strategies
//! - [`error`]: the error taxonomy surfaced to callers
//! - [`config`]: multi-format configuration loading with env substitution
//!
//! Implementations live in `veritas-foundation`.

// error module
pub mod error;

// schema module
pub mod schema;
pub use schema::*;

// backend module
pub mod backend;
pub use backend::{BackendAdapter, BackendError};

// policy module
pub mod policy;

// config module
pub mod config;

pub use error::{InferenceError, InferenceResult, IntoVeritasReport, VeritasError, VeritasResult};
