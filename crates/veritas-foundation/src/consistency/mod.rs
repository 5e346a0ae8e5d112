//! Consistency controller
//!
//! Samples a request several times, clusters the answers with a pluggable
//! [`SimilarityStrategy`] and elects a representative of the majority
//! cluster when it reaches quorum.

pub mod similarity;

use crate::agent::{ModelAgent, SampleSet};
use crate::config::ConsistencyConfig;
use crate::feedback::FeedbackLog;
use similarity::similarity_for;
use std::sync::Arc;
use tracing::{info, warn};
use veritas_kernel::policy::SimilarityStrategy;
use veritas_kernel::{
    Candidate, ConsistencyVerdict, FeedbackPayload, InferenceError, InferenceResult, Request,
};

const SOURCE: &str = "consistency";

/// Tolerance for comparing the agreement ratio with the quorum.
const QUORUM_EPSILON: f64 = 1e-9;

pub struct ConsistencyController {
    agent: Arc<ModelAgent>,
    similarity: Arc<dyn SimilarityStrategy>,
    similarity_threshold: f64,
    quorum: f64,
    max_parallel: Option<usize>,
}

impl ConsistencyController {
    pub fn new(agent: Arc<ModelAgent>, config: &ConsistencyConfig) -> Self {
        Self {
            agent,
            similarity: similarity_for(config.similarity),
            similarity_threshold: config.similarity_threshold,
            quorum: config.quorum,
            max_parallel: config.max_parallel_samples,
        }
    }

    /// Swap in a custom similarity strategy.
    pub fn with_similarity(mut self, similarity: Arc<dyn SimilarityStrategy>) -> Self {
        self.similarity = similarity;
        self
    }

    pub fn quorum(&self) -> f64 {
        self.quorum
    }

    /// Draw `request.params().samples` samples and judge their agreement.
    ///
    /// A verdict without quorum is still `Ok`; it carries no elected
    /// candidate and a `ConsistencyFailure` event has been emitted.
    pub async fn check(
        &self,
        request: &Request,
        log: &FeedbackLog,
    ) -> InferenceResult<ConsistencyVerdict> {
        let k = request.params().samples;
        let parallel = self.max_parallel.unwrap_or(k as usize);
        let samples = self
            .agent
            .invoke_many_bounded(request, k, parallel, log)
            .await?;
        self.evaluate(request.id(), samples, log)
    }

    /// Cluster an already drawn sample set.
    pub fn evaluate(
        &self,
        request_id: &str,
        samples: SampleSet,
        log: &FeedbackLog,
    ) -> InferenceResult<ConsistencyVerdict> {
        let succeeded = samples.succeeded();
        if succeeded < 2 {
            warn!(
                request_id = %request_id,
                requested = samples.requested,
                succeeded,
                "Not enough samples to measure agreement"
            );
            return Err(InferenceError::InsufficientSamples {
                requested: samples.requested,
                succeeded,
            });
        }

        let mut candidates = samples.candidates;
        candidates.sort_by_key(|c| c.sequence);

        let clusters = cluster(&candidates, self.similarity.as_ref(), self.similarity_threshold);
        let majority = majority_cluster(&clusters);
        let agreement_ratio = clusters[majority].len() as f64 / candidates.len() as f64;
        let has_quorum = agreement_ratio + QUORUM_EPSILON >= self.quorum;

        let elected_index = elect(&clusters[majority], &candidates, self.similarity.as_ref());
        let mut cluster_sizes: Vec<usize> = clusters.iter().map(Vec::len).collect();
        cluster_sizes.sort_unstable_by(|a, b| b.cmp(a));

        let mut elected = None;
        let mut dissenting = Vec::new();
        for (index, candidate) in candidates.into_iter().enumerate() {
            if !clusters[majority].contains(&index) {
                dissenting.push(candidate);
            } else if index == elected_index && has_quorum {
                elected = Some(candidate);
            }
        }

        let verdict = ConsistencyVerdict {
            request_id: request_id.to_string(),
            agreement_ratio,
            quorum: self.quorum,
            elected,
            dissenting,
            cluster_sizes,
            samples_requested: samples.requested,
            samples_succeeded: succeeded,
        };

        if verdict.has_quorum() {
            info!(
                request_id = %request_id,
                agreement = agreement_ratio,
                similarity = self.similarity.name(),
                "Consistency quorum reached"
            );
        } else {
            warn!(
                request_id = %request_id,
                agreement = agreement_ratio,
                quorum = self.quorum,
                "Consistency quorum not reached"
            );
            log.emit(
                SOURCE,
                FeedbackPayload::ConsistencyFailure {
                    agreement_ratio,
                    quorum: self.quorum,
                    samples_succeeded: succeeded,
                    dissenting: verdict.dissenting.len(),
                },
            );
        }
        Ok(verdict)
    }
}

/// Greedy single pass in sequence order: each candidate joins the first
/// cluster whose anchor (first member) is similar enough, else starts one.
fn cluster(
    candidates: &[Candidate],
    similarity: &dyn SimilarityStrategy,
    threshold: f64,
) -> Vec<Vec<usize>> {
    let mut clusters: Vec<Vec<usize>> = Vec::new();
    for (index, candidate) in candidates.iter().enumerate() {
        let home = clusters.iter_mut().find(|members| {
            similarity.similarity(&candidates[members[0]].text, &candidate.text) >= threshold
        });
        match home {
            Some(members) => members.push(index),
            None => clusters.push(vec![index]),
        }
    }
    clusters
}

/// Largest cluster; ties go to the one founded earliest.
fn majority_cluster(clusters: &[Vec<usize>]) -> usize {
    let mut best = 0;
    for (index, members) in clusters.iter().enumerate() {
        if members.len() > clusters[best].len() {
            best = index;
        }
    }
    best
}

/// Member with the highest mean similarity to the rest of its cluster;
/// ties go to the earliest sequence.
fn elect(members: &[usize], candidates: &[Candidate], similarity: &dyn SimilarityStrategy) -> usize {
    if members.len() == 1 {
        return members[0];
    }
    let mut best = members[0];
    let mut best_mean = f64::NEG_INFINITY;
    for &i in members {
        let total: f64 = members
            .iter()
            .filter(|&&j| j != i)
            .map(|&j| similarity.similarity(&candidates[i].text, &candidates[j].text))
            .sum();
        let mean = total / (members.len() - 1) as f64;
        if mean > best_mean {
            best = i;
            best_mean = mean;
        }
    }
    best
}
