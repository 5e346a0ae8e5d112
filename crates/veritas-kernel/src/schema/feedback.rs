use super::output::{Candidate, Critique, Score};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Payload-free discriminant of [`FeedbackPayload`], used for filtering and
/// for the once-per-request emission rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    ConsistencyFailure,
    RefinementExhausted,
    ScoreBelowThreshold,
    BackendFailure,
    Accepted,
}

impl FeedbackKind {
    /// Kinds that may be emitted more than once for the same request.
    pub fn may_recur(self) -> bool {
        matches!(self, Self::ConsistencyFailure)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConsistencyFailure => "consistency_failure",
            Self::RefinementExhausted => "refinement_exhausted",
            Self::ScoreBelowThreshold => "score_below_threshold",
            Self::BackendFailure => "backend_failure",
            Self::Accepted => "accepted",
        }
    }
}

impl fmt::Display for FeedbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeedbackPayload {
    ConsistencyFailure {
        agreement_ratio: f64,
        quorum: f64,
        samples_succeeded: u32,
        dissenting: usize,
    },
    RefinementExhausted {
        best: Candidate,
        score: Score,
        iterations: u32,
        critique: Option<Critique>,
    },
    ScoreBelowThreshold {
        score: Score,
        critique: Critique,
    },
    BackendFailure {
        model_id: String,
        attempts: u32,
        detail: String,
    },
    Accepted {
        candidate: Candidate,
        score: Score,
    },
}

impl FeedbackPayload {
    pub fn kind(&self) -> FeedbackKind {
        match self {
            Self::ConsistencyFailure { .. } => FeedbackKind::ConsistencyFailure,
            Self::RefinementExhausted { .. } => FeedbackKind::RefinementExhausted,
            Self::ScoreBelowThreshold { .. } => FeedbackKind::ScoreBelowThreshold,
            Self::BackendFailure { .. } => FeedbackKind::BackendFailure,
            Self::Accepted { .. } => FeedbackKind::Accepted,
        }
    }
}

/// Immutable record of a pipeline outcome, published once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEvent {
    pub id: String,
    pub request_id: String,
    /// Component that produced the event (`agent`, `consistency`, `refiner`).
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub payload: FeedbackPayload,
}

impl FeedbackEvent {
    pub fn new(
        request_id: impl Into<String>,
        source: impl Into<String>,
        payload: FeedbackPayload,
    ) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            request_id: request_id.into(),
            source: source.into(),
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn kind(&self) -> FeedbackKind {
        self.payload.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_serializes_with_kind_tag() {
        let event = FeedbackEvent::new(
            "req-1",
            "agent",
            FeedbackPayload::BackendFailure {
                model_id: "granite".into(),
                attempts: 3,
                detail: "timeout".into(),
            },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["payload"]["kind"], "backend_failure");
        assert_eq!(json["request_id"], "req-1");

        let back: FeedbackEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back.kind(), FeedbackKind::BackendFailure);
    }

    #[test]
    fn only_consistency_failure_recurs() {
        assert!(FeedbackKind::ConsistencyFailure.may_recur());
        assert!(!FeedbackKind::Accepted.may_recur());
        assert!(!FeedbackKind::BackendFailure.may_recur());
    }
}
