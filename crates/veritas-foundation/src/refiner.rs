//! Self-refiner
//!
//! Bounded score / critique / revise loop over one request, driven as an
//! explicit state machine:
//!
//! ```text
//! Scoring ──pass──▶ Accepted
//!    │
//!   fail
//!    ▼
//! Critiquing ──budget spent──▶ Exhausted
//!    │
//!    ▼
//! Revising ──▶ Scoring
//! ```
//!
//! `max_iterations` bounds the number of revisions, so a run scores at most
//! `max_iterations + 1` candidates, numbered 0, 1, 2, ... in order.

use crate::agent::ModelAgent;
use crate::config::{CritiqueMode, RefinerConfig};
use crate::feedback::FeedbackLog;
use crate::scorer::OutputScorer;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use veritas_kernel::{
    Candidate, Critique, Defect, DefectCategory, FeedbackKind, FeedbackPayload, InferenceError,
    InferenceResult, Request, Score, Severity,
};

const SOURCE: &str = "refiner";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefinementStatus {
    Accepted,
    Exhausted,
}

/// One scored candidate of a run, with the critique derived from it when it
/// failed.
#[derive(Debug, Clone, Serialize)]
pub struct RefineStep {
    pub candidate: Candidate,
    pub score: Score,
    pub critique: Option<Critique>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefinementOutcome {
    pub status: RefinementStatus,
    /// Accepted candidate, or the best-scoring one when exhausted.
    pub best: Candidate,
    pub best_score: Score,
    pub steps: Vec<RefineStep>,
}

impl RefinementOutcome {
    /// Revisions performed after the seed.
    pub fn iterations(&self) -> u32 {
        self.steps.len().saturating_sub(1) as u32
    }
}

enum RefineState {
    Scoring(Candidate),
    Critiquing(usize),
    Revising(usize),
    Accepted(usize),
    Exhausted,
}

pub struct SelfRefiner {
    agent: Arc<ModelAgent>,
    scorer: Arc<OutputScorer>,
    config: RefinerConfig,
}

impl SelfRefiner {
    pub fn new(agent: Arc<ModelAgent>, scorer: Arc<OutputScorer>, config: RefinerConfig) -> Self {
        Self {
            agent,
            scorer,
            config,
        }
    }

    pub fn max_iterations(&self) -> u32 {
        self.config.max_iterations
    }

    /// Refine `seed` until it is accepted or the revision budget is spent.
    ///
    /// A backend failure while revising aborts the run; so does the request
    /// deadline, checked at every state boundary.
    pub async fn run(
        &self,
        request: &Request,
        seed: Candidate,
        log: &FeedbackLog,
    ) -> InferenceResult<RefinementOutcome> {
        let mut steps: Vec<RefineStep> = Vec::new();
        let mut best = 0usize;
        let mut revisions = 0u32;
        let mut state = RefineState::Scoring(seed.with_sequence(0));

        loop {
            state = match state {
                RefineState::Scoring(candidate) => {
                    self.check_deadline(request)?;
                    let score = self.scorer.score(request, &candidate);
                    steps.push(RefineStep {
                        candidate,
                        score,
                        critique: None,
                    });
                    let index = steps.len() - 1;
                    if steps[index].score.overall > steps[best].score.overall {
                        best = index;
                    }
                    if steps[index].score.passed {
                        RefineState::Accepted(index)
                    } else {
                        RefineState::Critiquing(index)
                    }
                }

                RefineState::Critiquing(index) => {
                    let mut critique = self.scorer.critique(&steps[index].score);
                    let budget_left = revisions < self.config.max_iterations;
                    if budget_left && self.config.critique_mode == CritiqueMode::ModelAssisted {
                        self.check_deadline(request)?;
                        let review = self.review(request, &steps[index].candidate, log).await?;
                        critique.defects.push(review);
                    }
                    debug!(
                        request_id = %request.id(),
                        sequence = steps[index].candidate.sequence,
                        defects = critique.defects.len(),
                        "Critique derived"
                    );
                    if !log.has_emitted(FeedbackKind::ScoreBelowThreshold) {
                        log.emit(
                            SOURCE,
                            FeedbackPayload::ScoreBelowThreshold {
                                score: steps[index].score.clone(),
                                critique: critique.clone(),
                            },
                        );
                    }
                    steps[index].critique = Some(critique);
                    if budget_left {
                        RefineState::Revising(index)
                    } else {
                        RefineState::Exhausted
                    }
                }

                RefineState::Revising(index) => {
                    self.check_deadline(request)?;
                    revisions += 1;
                    let prompt = self.rewrite_prompt(request, &steps[index]);
                    let next = self
                        .agent
                        .invoke_prompt(request, &prompt, revisions, log)
                        .await
                        .inspect_err(|e| {
                            warn!(request_id = %request.id(), error = %e, "Revision aborted");
                        })?;
                    RefineState::Scoring(next)
                }

                RefineState::Accepted(index) => {
                    let step = &steps[index];
                    info!(
                        request_id = %request.id(),
                        sequence = step.candidate.sequence,
                        overall = step.score.overall,
                        revisions,
                        "Candidate accepted"
                    );
                    log.emit(
                        SOURCE,
                        FeedbackPayload::Accepted {
                            candidate: step.candidate.clone(),
                            score: step.score.clone(),
                        },
                    );
                    return Ok(RefinementOutcome {
                        status: RefinementStatus::Accepted,
                        best: step.candidate.clone(),
                        best_score: step.score.clone(),
                        steps,
                    });
                }

                RefineState::Exhausted => {
                    let step = &steps[best];
                    warn!(
                        request_id = %request.id(),
                        best_sequence = step.candidate.sequence,
                        best_overall = step.score.overall,
                        revisions,
                        "Refinement exhausted"
                    );
                    log.emit(
                        SOURCE,
                        FeedbackPayload::RefinementExhausted {
                            best: step.candidate.clone(),
                            score: step.score.clone(),
                            iterations: revisions,
                            critique: step.critique.clone(),
                        },
                    );
                    return Ok(RefinementOutcome {
                        status: RefinementStatus::Exhausted,
                        best: step.candidate.clone(),
                        best_score: step.score.clone(),
                        steps,
                    });
                }
            };
        }
    }

    fn check_deadline(&self, request: &Request) -> InferenceResult<()> {
        if request.is_expired() {
            warn!(request_id = %request.id(), "Deadline reached during refinement");
            return Err(InferenceError::deadline(request.id()));
        }
        Ok(())
    }

    fn rewrite_prompt(&self, request: &Request, step: &RefineStep) -> String {
        let critique = step
            .critique
            .as_ref()
            .map(Critique::render)
            .unwrap_or_default();
        self.config
            .rewrite_template
            .replace("{prompt}", request.prompt())
            .replace("{output}", &step.candidate.text)
            .replace("{critique}", &critique)
    }

    /// Ask the model to review its own output; the answer becomes a
    /// reviewer defect.
    async fn review(
        &self,
        request: &Request,
        candidate: &Candidate,
        log: &FeedbackLog,
    ) -> InferenceResult<Defect> {
        let prompt = self
            .config
            .critique_template
            .replace("{output}", &candidate.text);
        let review = self
            .agent
            .invoke_prompt(request, &prompt, candidate.sequence, log)
            .await?;
        Ok(Defect {
            category: DefectCategory::Reviewer,
            severity: Severity::Medium,
            description: review.text.trim().to_string(),
        })
    }
}
