//! Similarity search over entity feature vectors.
//!
//! [`ExactIndex`] scores every stored vector against the query. That is
//! plenty for the few thousand teams and matches a league cache holds; a
//! different [`SimilarityIndex`] can be swapped in without touching the
//! store.

use crate::StoreError;
use fb_types::{EntityKey, EntityKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// How two vectors are compared. Larger scores are always closer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityMetric {
    /// Cosine of the angle, in `[-1, 1]`.
    #[default]
    Cosine,
    /// Raw dot product.
    Dot,
    /// `1 / (1 + distance)`, in `(0, 1]`.
    Euclidean,
}

impl SimilarityMetric {
    /// Score `a` against `b`.
    ///
    /// `None` when the vectors differ in length, are empty, or the score is
    /// not finite (e.g. cosine against a zero vector).
    pub fn score(&self, a: &[f32], b: &[f32]) -> Option<f32> {
        if a.len() != b.len() || a.is_empty() {
            return None;
        }
        let dot = || a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>();

        let score = match self {
            SimilarityMetric::Dot => dot(),
            SimilarityMetric::Cosine => {
                let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                dot() / (norm_a * norm_b)
            }
            SimilarityMetric::Euclidean => {
                let distance = a
                    .iter()
                    .zip(b)
                    .map(|(x, y)| (x - y) * (x - y))
                    .sum::<f32>()
                    .sqrt();
                1.0 / (1.0 + distance)
            }
        };
        score.is_finite().then_some(score)
    }
}

impl fmt::Display for SimilarityMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SimilarityMetric::Cosine => "cosine",
            SimilarityMetric::Dot => "dot",
            SimilarityMetric::Euclidean => "euclidean",
        })
    }
}

impl FromStr for SimilarityMetric {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cosine" => Ok(SimilarityMetric::Cosine),
            "dot" => Ok(SimilarityMetric::Dot),
            "euclidean" | "l2" => Ok(SimilarityMetric::Euclidean),
            other => Err(StoreError::Config(format!("unknown similarity metric: {}", other))),
        }
    }
}

/// One search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub key: EntityKey,
    pub score: f32,
}

/// Pluggable nearest-neighbour index keyed by entity.
pub trait SimilarityIndex: Send + Sync {
    /// Insert or replace the vector for `key`.
    fn insert(&mut self, key: EntityKey, vector: Vec<f32>);

    fn remove(&mut self, key: &EntityKey);

    /// Up to `k` hits of the given kind (any kind if `None`), best first.
    fn query_kind(&self, vector: &[f32], k: usize, kind: Option<EntityKind>) -> Vec<SearchHit>;

    /// Up to `k` hits across all kinds, best first.
    fn query(&self, vector: &[f32], k: usize) -> Vec<SearchHit> {
        self.query_kind(vector, k, None)
    }

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory exact scan.
#[derive(Debug, Default)]
pub struct ExactIndex {
    metric: SimilarityMetric,
    vectors: HashMap<EntityKey, Vec<f32>>,
}

impl ExactIndex {
    pub fn new(metric: SimilarityMetric) -> Self {
        Self {
            metric,
            vectors: HashMap::new(),
        }
    }

    pub fn metric(&self) -> SimilarityMetric {
        self.metric
    }
}

impl SimilarityIndex for ExactIndex {
    fn insert(&mut self, key: EntityKey, vector: Vec<f32>) {
        self.vectors.insert(key, vector);
    }

    fn remove(&mut self, key: &EntityKey) {
        self.vectors.remove(key);
    }

    fn query_kind(&self, vector: &[f32], k: usize, kind: Option<EntityKind>) -> Vec<SearchHit> {
        if k == 0 {
            return Vec::new();
        }

        let mut hits: Vec<SearchHit> = self
            .vectors
            .iter()
            .filter(|(key, _)| kind.map_or(true, |kind| key.kind() == kind))
            .filter_map(|(key, stored)| {
                self.metric.score(vector, stored).map(|score| SearchHit {
                    key: key.clone(),
                    score,
                })
            })
            .collect();

        // Best first; ties by key so results are stable between calls.
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.key.cmp(&b.key)));
        hits.truncate(k);
        hits
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(metric: SimilarityMetric) -> ExactIndex {
        let mut index = ExactIndex::new(metric);
        index.insert(EntityKey::team("a"), vec![1.0, 0.0]);
        index.insert(EntityKey::team("b"), vec![0.0, 1.0]);
        index.insert(EntityKey::team("c"), vec![2.0, 0.1]);
        index.insert(EntityKey::fixture("m"), vec![1.0, 0.0, 0.0]);
        index
    }

    fn keys(hits: &[SearchHit]) -> Vec<String> {
        hits.iter().map(|h| h.key.to_string()).collect()
    }

    #[test]
    fn test_cosine_ranking() {
        let hits = index(SimilarityMetric::Cosine).query(&[1.0, 0.0], 3);
        assert_eq!(keys(&hits), ["team:a", "team:c", "team:b"]);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_dot_prefers_magnitude() {
        let hits = index(SimilarityMetric::Dot).query(&[1.0, 0.0], 2);
        assert_eq!(keys(&hits), ["team:c", "team:a"]);
    }

    #[test]
    fn test_euclidean_prefers_nearby() {
        let hits = index(SimilarityMetric::Euclidean).query(&[0.1, 0.9], 1);
        assert_eq!(keys(&hits), ["team:b"]);
        assert!(hits[0].score > 0.0 && hits[0].score <= 1.0);
    }

    #[test]
    fn test_dimension_mismatch_skipped() {
        let hits = index(SimilarityMetric::Cosine).query(&[1.0, 0.0, 0.0], 10);
        assert_eq!(keys(&hits), ["match:m"]);
    }

    #[test]
    fn test_zero_vector_and_k_zero() {
        let index = index(SimilarityMetric::Cosine);
        assert!(index.query(&[0.0, 0.0], 5).is_empty());
        assert!(index.query(&[1.0, 0.0], 0).is_empty());
        assert!(ExactIndex::default().query(&[1.0], 5).is_empty());
    }

    #[test]
    fn test_kind_filter_and_ties() {
        let mut index = ExactIndex::new(SimilarityMetric::Dot);
        index.insert(EntityKey::team("z"), vec![1.0, 1.0]);
        index.insert(EntityKey::team("y"), vec![1.0, 1.0]);
        index.insert(EntityKey::league("PL"), vec![1.0, 1.0]);

        let hits = index.query_kind(&[1.0, 1.0], 5, Some(EntityKind::Team));
        assert_eq!(keys(&hits), ["team:y", "team:z"]);
    }

    #[test]
    fn test_metric_parse() {
        assert_eq!("Cosine".parse::<SimilarityMetric>().unwrap(), SimilarityMetric::Cosine);
        assert_eq!("l2".parse::<SimilarityMetric>().unwrap(), SimilarityMetric::Euclidean);
        assert!("manhattan".parse::<SimilarityMetric>().is_err());
    }
}
