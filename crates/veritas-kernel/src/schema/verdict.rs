use super::output::Candidate;
use serde::{Deserialize, Serialize};

/// Outcome of sampling one request several times and clustering the answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyVerdict {
    pub request_id: String,
    /// |majority cluster| / |successful samples|.
    pub agreement_ratio: f64,
    pub quorum: f64,
    /// Representative of the majority cluster; `None` when quorum was not met.
    pub elected: Option<Candidate>,
    /// Samples outside the majority cluster.
    pub dissenting: Vec<Candidate>,
    /// Cluster sizes, largest first.
    pub cluster_sizes: Vec<usize>,
    pub samples_requested: u32,
    pub samples_succeeded: u32,
}

impl ConsistencyVerdict {
    pub fn has_quorum(&self) -> bool {
        self.elected.is_some()
    }
}
