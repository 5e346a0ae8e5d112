//! Similarity strategies used to cluster sampled outputs.

use crate::config::SimilarityMetric;
use std::collections::HashSet;
use std::sync::Arc;
use veritas_kernel::policy::SimilarityStrategy;

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// 1.0 when the texts are equal after case and whitespace normalisation.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExactMatch;

impl SimilarityStrategy for ExactMatch {
    fn name(&self) -> &str {
        "exact"
    }

    fn similarity(&self, a: &str, b: &str) -> f64 {
        if normalize(a) == normalize(b) { 1.0 } else { 0.0 }
    }
}

/// Jaccard index over lowercase alphanumeric token sets.
#[derive(Debug, Default, Clone, Copy)]
pub struct Jaccard;

impl SimilarityStrategy for Jaccard {
    fn name(&self) -> &str {
        "jaccard"
    }

    fn similarity(&self, a: &str, b: &str) -> f64 {
        let (ta, tb) = (tokens(a), tokens(b));
        if ta.is_empty() && tb.is_empty() {
            return 1.0;
        }
        let inter = ta.intersection(&tb).count();
        let union = ta.union(&tb).count();
        inter as f64 / union as f64
    }
}

/// Characters of each normalised text that take part in an edit-distance
/// comparison. Keeps one comparison within a few million cell updates.
pub const LEVENSHTEIN_MAX_CHARS: usize = 2_048;

/// `1 - distance / max_len` over the normalised character sequences,
/// truncated to [`LEVENSHTEIN_MAX_CHARS`].
#[derive(Debug, Default, Clone, Copy)]
pub struct Levenshtein;

impl Levenshtein {
    fn distance(a: &[char], b: &[char]) -> usize {
        let mut prev: Vec<usize> = (0..=b.len()).collect();
        let mut curr = vec![0; b.len() + 1];
        for (i, ca) in a.iter().enumerate() {
            curr[0] = i + 1;
            for (j, cb) in b.iter().enumerate() {
                let cost = usize::from(ca != cb);
                curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
            }
            std::mem::swap(&mut prev, &mut curr);
        }
        prev[b.len()]
    }
}

impl SimilarityStrategy for Levenshtein {
    fn name(&self) -> &str {
        "levenshtein"
    }

    fn similarity(&self, a: &str, b: &str) -> f64 {
        let a: Vec<char> = normalize(a).chars().take(LEVENSHTEIN_MAX_CHARS).collect();
        let b: Vec<char> = normalize(b).chars().take(LEVENSHTEIN_MAX_CHARS).collect();
        let longest = a.len().max(b.len());
        if longest == 0 {
            return 1.0;
        }
        1.0 - Self::distance(&a, &b) as f64 / longest as f64
    }
}

pub fn similarity_for(metric: SimilarityMetric) -> Arc<dyn SimilarityStrategy> {
    match metric {
        SimilarityMetric::Exact => Arc::new(ExactMatch),
        SimilarityMetric::Jaccard => Arc::new(Jaccard),
        SimilarityMetric::Levenshtein => Arc::new(Levenshtein),
    }
}
