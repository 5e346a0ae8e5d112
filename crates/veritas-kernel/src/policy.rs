//! Pluggable evaluation strategies.
//!
//! The consistency controller compares samples through a
//! [`SimilarityStrategy`]; the output scorer delegates its relevance and
//! safety dimensions to a [`RelevanceMeasure`] and a [`SafetyPolicy`].
//! Which concrete strategy runs is a configuration choice.

/// Reason a measure could not produce a value. The scorer records it and
/// scores the dimension at its minimum.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{measure} unavailable: {reason}")]
pub struct MeasureError {
    pub measure: String,
    pub reason: String,
}

impl MeasureError {
    pub fn new(measure: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            measure: measure.into(),
            reason: reason.into(),
        }
    }
}

/// Symmetric similarity between two outputs, in [0,1].
pub trait SimilarityStrategy: Send + Sync {
    fn name(&self) -> &str;

    fn similarity(&self, a: &str, b: &str) -> f64;
}

/// How well an output addresses its prompt, in [0,1].
pub trait RelevanceMeasure: Send + Sync {
    fn name(&self) -> &str;

    fn relevance(&self, prompt: &str, output: &str) -> Result<f64, MeasureError>;
}

/// Policy check on an output: 1.0 is clean, 0.0 is a violation.
pub trait SafetyPolicy: Send + Sync {
    fn name(&self) -> &str;

    fn evaluate(&self, output: &str) -> Result<f64, MeasureError>;
}
