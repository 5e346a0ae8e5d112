//! Veritas Foundation
//!
//! Implementations of the inference loop on top of `veritas-kernel`:
//!
//! - [`registry`]: model id / capability → backend adapter
//! - [`agent`]: retries, timeouts, failover and concurrent sampling
//! - [`consistency`]: multi-sample agreement and majority election
//! - [`scorer`]: format / relevance / safety scoring and critiques
//! - [`refiner`]: the bounded score → critique → revise state machine
//! - [`feedback`]: publish/subscribe routing of feedback events
//! - [`pipeline`]: end-to-end composition of the above
//! - [`backends`]: HTTP and local provider adapters
//! - [`bootstrap`]: building everything from a configuration file

pub mod agent;
pub mod backends;
pub mod bootstrap;
pub mod config;
pub mod consistency;
pub mod feedback;
pub mod logging;
pub mod pipeline;
pub mod refiner;
pub mod registry;
pub mod scorer;

pub use agent::retry::{BackoffStrategy, RetryPolicy};
pub use agent::{ModelAgent, SampleSet};
pub use config::VeritasConfig;
pub use consistency::ConsistencyController;
pub use feedback::{
    EventFilter, FeedbackHandler, FeedbackLog, FeedbackRouter, SubscribeError, SubscriptionHandle,
    handler_fn,
};
pub use pipeline::{InferencePipeline, PipelineBuilder, PipelineError, PipelineOutcome};
pub use refiner::{RefinementOutcome, RefinementStatus, SelfRefiner};
pub use registry::{ModelRegistry, RegisterMode};
pub use scorer::OutputScorer;

pub use veritas_kernel;
