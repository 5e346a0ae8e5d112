use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// One model output produced for a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub request_id: String,
    /// Position within a sample set or refinement run, starting at 0.
    pub sequence: u32,
    pub text: String,
    /// Registered model id of the backend that produced the text.
    pub backend_id: String,
    pub latency: Duration,
    pub produced_at: DateTime<Utc>,
}

impl Candidate {
    pub fn new(
        request_id: impl Into<String>,
        sequence: u32,
        text: impl Into<String>,
        backend_id: impl Into<String>,
        latency: Duration,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            sequence,
            text: text.into(),
            backend_id: backend_id.into(),
            latency,
            produced_at: Utc::now(),
        }
    }

    /// Re-number the candidate, e.g. when an elected sample seeds a refinement run.
    pub fn with_sequence(mut self, sequence: u32) -> Self {
        self.sequence = sequence;
        self
    }
}

/// Quality dimension a defect or sub-score refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefectCategory {
    Format,
    Relevance,
    Safety,
    /// Overall score failed although no single dimension fell below its floor.
    Overall,
    /// Free-form review produced by a model.
    Reviewer,
}

impl fmt::Display for DefectCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Format => "format",
            Self::Relevance => "relevance",
            Self::Safety => "safety",
            Self::Overall => "overall",
            Self::Reviewer => "reviewer",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Map a sub-score in [0,1] to a severity; lower scores are more severe.
    pub fn from_value(value: f64) -> Self {
        if value <= 0.0 {
            Self::Critical
        } else if value < 0.35 {
            Self::High
        } else if value < 0.6 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Defect {
    pub category: DefectCategory,
    pub severity: Severity,
    pub description: String,
}

/// Structured list of defects found in one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Critique {
    pub request_id: String,
    pub candidate_sequence: u32,
    pub defects: Vec<Defect>,
}

impl Critique {
    pub fn is_empty(&self) -> bool {
        self.defects.is_empty()
    }

    /// Bullet list suitable for splicing into a revision prompt.
    pub fn render(&self) -> String {
        self.defects
            .iter()
            .map(|d| format!("- [{}] {}: {}", d.severity, d.category, d.description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A single sub-score. `reason` is set whenever the value was not measured
/// normally (measure unavailable, non-finite result, malformed output).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionScore {
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl DimensionScore {
    pub fn measured(value: f64) -> Self {
        Self {
            value,
            reason: None,
        }
    }

    pub fn floor(reason: impl Into<String>) -> Self {
        Self {
            value: 0.0,
            reason: Some(reason.into()),
        }
    }
}

/// Evaluation of one candidate. Carries no timestamp so identical inputs
/// always produce identical scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub request_id: String,
    pub candidate_sequence: u32,
    /// Weighted combination of the sub-scores, in [0,1].
    pub overall: f64,
    pub format: DimensionScore,
    pub relevance: DimensionScore,
    pub safety: DimensionScore,
    pub threshold: f64,
    pub passed: bool,
}

impl Score {
    pub fn dimensions(&self) -> [(DefectCategory, &DimensionScore); 3] {
        [
            (DefectCategory::Format, &self.format),
            (DefectCategory::Relevance, &self.relevance),
            (DefectCategory::Safety, &self.safety),
        ]
    }
}
