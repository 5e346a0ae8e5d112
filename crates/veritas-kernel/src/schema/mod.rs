//! Shared data types for requests, model outputs, critiques, scores,
//! consistency verdicts and feedback events.
//!
//! Every type here is plain data. Ownership follows the request lifecycle:
//! a [`Candidate`] belongs to one [`Request`], a [`Critique`] or [`Score`]
//! to one candidate, and a [`ConsistencyVerdict`] to the sample set of one
//! request. None of them are mutated after construction.

mod feedback;
mod output;
mod request;
mod verdict;

pub use feedback::{FeedbackEvent, FeedbackKind, FeedbackPayload};
pub use output::{Candidate, Critique, Defect, DefectCategory, DimensionScore, Score, Severity};
pub use request::{
    GenerationParams, ModelTarget, OutputFormat, PromptKind, Request, RequestBounds,
    RequestBuilder, RequestMetadata, RequestSource,
};
pub use verdict::ConsistencyVerdict;
