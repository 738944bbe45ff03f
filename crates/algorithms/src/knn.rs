//! k-Nearest-Neighbors rating prediction
//!
//! ## Algorithm
//! 1. At fit time, compute the similarity matrix (users or items, see
//!    [`SimilarityOptions::user_based`]) and, when needed, the baseline
//!    biases and per-entity mean ratings
//! 2. To estimate (u, i), collect the *other* entities that rated i
//!    (user-based) or that u rated (item-based)
//! 3. Drop neighbors with non-positive similarity, sort the rest by
//!    similarity descending then inner id ascending, keep the first k
//! 4. Return the similarity-weighted average of the neighbors' ratings,
//!    optionally centered on entity means or baseline estimates
//!
//! No qualifying neighbor makes the prediction impossible.

use crate::baseline::{BaselineOptions, Biases, compute_baselines};
use crate::error::{AlgoError, PredictionImpossible, Result};
use crate::prediction::Estimate;
use crate::similarity::{SimilarityMatrix, SimilarityOptions};
use crate::traits::{PredictionAlgorithm, fitted};
use dataset::{InnerIid, InnerUid, Trainset};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

/// How neighbor ratings are combined
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnnVariant {
    /// Plain similarity-weighted average
    #[default]
    Basic,
    /// Weighted average of deviations from each entity's mean rating
    WithMeans,
    /// Weighted average of deviations from the baseline estimates
    Baseline,
}

/// kNN configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnnOptions {
    /// Maximum number of neighbors
    pub k: usize,
    pub variant: KnnVariant,
    pub sim: SimilarityOptions,
    /// Used by the baseline variant and by `pearson_baseline`
    pub baseline: BaselineOptions,
}

impl Default for KnnOptions {
    fn default() -> Self {
        Self {
            k: 40,
            variant: KnnVariant::Basic,
            sim: SimilarityOptions::default(),
            baseline: BaselineOptions::default(),
        }
    }
}

impl KnnOptions {
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn with_variant(mut self, variant: KnnVariant) -> Self {
        self.variant = variant;
        self
    }

    pub fn with_sim(mut self, sim: SimilarityOptions) -> Self {
        self.sim = sim;
        self
    }

    pub fn with_baseline(mut self, baseline: BaselineOptions) -> Self {
        self.baseline = baseline;
        self
    }
}

#[derive(Debug, Clone)]
struct FittedKnn {
    trainset: Arc<Trainset>,
    sim: SimilarityMatrix,
    /// Present for the baseline variant and `pearson_baseline`
    biases: Option<Biases>,
    /// Mean rating of every x entity, for the means variant
    means: Option<Vec<f64>>,
}

/// Neighborhood-based collaborative filtering
#[derive(Debug, Clone, Default)]
pub struct Knn {
    options: KnnOptions,
    state: Option<FittedKnn>,
}

impl Knn {
    pub fn new(options: KnnOptions) -> Self {
        Self {
            options,
            state: None,
        }
    }

    pub fn options(&self) -> &KnnOptions {
        &self.options
    }

    /// Similarity matrix of the current fit
    pub fn similarities(&self) -> Result<&SimilarityMatrix> {
        fitted(&self.state, self.name()).map(|s| &s.sim)
    }

    /// The `k` entities most similar to inner id `x`
    ///
    /// `x` is a user or an item depending on the similarity orientation.
    /// Ties are broken by lower inner id.
    pub fn get_neighbors(&self, x: usize, k: usize) -> Result<Vec<usize>> {
        let sim = self.similarities()?;
        if x >= sim.n() {
            return Err(AlgoError::invalid_option(
                "x",
                format!("inner id {} out of range (have {})", x, sim.n()),
            ));
        }

        let mut others: Vec<(usize, f64)> = sim
            .row(x)
            .iter()
            .copied()
            .enumerate()
            .filter(|&(other, _)| other != x)
            .collect();
        others.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        Ok(others.into_iter().take(k).map(|(other, _)| other).collect())
    }
}

impl PredictionAlgorithm for Knn {
    fn name(&self) -> &str {
        match self.options.variant {
            KnnVariant::Basic => "KNNBasic",
            KnnVariant::WithMeans => "KNNWithMeans",
            KnnVariant::Baseline => "KNNBaseline",
        }
    }

    #[instrument(skip_all, fields(algorithm = self.name(), k = self.options.k))]
    fn fit(&mut self, trainset: Arc<Trainset>) -> Result<&mut Self> {
        self.state = None;
        if self.options.k == 0 {
            return Err(AlgoError::invalid_option("k", "must be at least 1"));
        }

        let needs_biases = self.options.variant == KnnVariant::Baseline
            || self.options.sim.measure.needs_baselines();
        let biases = if needs_biases {
            Some(compute_baselines(&trainset, &self.options.baseline)?)
        } else {
            None
        };

        let sim = SimilarityMatrix::compute(&trainset, &self.options.sim, biases.as_ref())?;

        let means = (self.options.variant == KnnVariant::WithMeans).then(|| {
            let xr = if self.options.sim.user_based {
                trainset.ur()
            } else {
                trainset.ir()
            };
            xr.iter()
                .map(|ratings| {
                    ratings.iter().map(|&(_, r)| r).sum::<f64>() / ratings.len().max(1) as f64
                })
                .collect::<Vec<f64>>()
        });

        debug!("Fitted with {} entities", sim.n());
        self.state = Some(FittedKnn {
            trainset,
            sim,
            biases,
            means,
        });
        Ok(self)
    }

    fn trainset(&self) -> Option<&Arc<Trainset>> {
        self.state.as_ref().map(|s| &s.trainset)
    }

    fn estimate(
        &self,
        u: InnerUid,
        i: InnerIid,
    ) -> std::result::Result<Estimate, PredictionImpossible> {
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| PredictionImpossible::new("algorithm is not fitted"))?;
        let user_based = self.options.sim.user_based;
        let trainset = &state.trainset;

        // x is the entity we look neighbors up for, y the one they rated
        let (x, candidates) = if user_based {
            (u, trainset.item_ratings(i))
        } else {
            (i, trainset.user_ratings(u))
        };

        let mut neighbors: Vec<(usize, f64, f64)> = candidates
            .iter()
            .filter(|&&(x2, _)| x2 != x)
            .map(|&(x2, r)| (x2, state.sim.get(x, x2), r))
            .filter(|&(_, sim, _)| sim > 0.0)
            .collect();
        neighbors.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        neighbors.truncate(self.options.k);

        if neighbors.is_empty() {
            return Err(PredictionImpossible::new("Not enough neighbors."));
        }

        // Each neighbor rating is measured from its offset; the weighted
        // deviation is added back to `base`
        let (base, offsets): (f64, Vec<f64>) = match self.options.variant {
            KnnVariant::Basic => (0.0, vec![0.0; neighbors.len()]),
            KnnVariant::WithMeans => {
                let means = state
                    .means
                    .as_ref()
                    .ok_or_else(|| PredictionImpossible::new("missing entity means"))?;
                let offsets = neighbors.iter().map(|&(x2, _, _)| means[x2]).collect();
                (means[x], offsets)
            }
            KnnVariant::Baseline => {
                let biases = state
                    .biases
                    .as_ref()
                    .ok_or_else(|| PredictionImpossible::new("missing baselines"))?;
                let mu = trainset.global_mean();
                let offsets = neighbors
                    .iter()
                    .map(|&(x2, _, _)| {
                        if user_based {
                            biases.baseline(mu, x2, i)
                        } else {
                            biases.baseline(mu, u, x2)
                        }
                    })
                    .collect();
                (biases.baseline(mu, u, i), offsets)
            }
        };

        let (mut weighted, mut total_sim) = (0.0, 0.0);
        for (&(_, sim, r), offset) in neighbors.iter().zip(&offsets) {
            weighted += sim * (r - offset);
            total_sim += sim;
        }

        Ok(Estimate::new(base + weighted / total_sim).with_actual_k(neighbors.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::SimilarityMeasure;
    use dataset::{Rating, RatingScale};

    fn trainset(ratings: &[Rating]) -> Arc<Trainset> {
        Arc::new(Trainset::build(ratings, RatingScale::default()).unwrap())
    }

    fn dense_ratings() -> Vec<Rating> {
        let grid = [
            ("u0", [5.0, 4.0, 1.0, 2.0]),
            ("u1", [4.0, 5.0, 2.0, 1.0]),
            ("u2", [1.0, 2.0, 5.0, 4.0]),
            ("u3", [2.0, 1.0, 4.0, 5.0]),
            ("u4", [5.0, 5.0, 1.0, 1.0]),
        ];
        grid.iter()
            .flat_map(|(user, row)| {
                row.iter()
                    .enumerate()
                    .map(move |(i, &r)| Rating::new(*user, format!("i{}", i), r))
            })
            .collect()
    }

    #[test]
    fn test_estimate_within_neighbor_range() {
        let ratings = dense_ratings();
        for measure in [
            SimilarityMeasure::Cosine,
            SimilarityMeasure::Msd,
            SimilarityMeasure::Pearson,
        ] {
            let options = KnnOptions::default()
                .with_k(3)
                .with_sim(SimilarityOptions::new(measure));
            let mut knn = Knn::new(options);
            knn.fit(trainset(&ratings)).unwrap();

            let trainset = knn.trainset().unwrap().clone();
            for u in trainset.all_users() {
                for i in trainset.all_items() {
                    let Ok(est) = knn.estimate(u, i) else { continue };
                    let neighbor_ratings: Vec<f64> = trainset
                        .item_ratings(i)
                        .iter()
                        .filter(|&&(v, _)| v != u)
                        .map(|&(_, r)| r)
                        .collect();
                    let lo = neighbor_ratings.iter().cloned().fold(f64::INFINITY, f64::min);
                    let hi = neighbor_ratings.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                    assert!(est.value >= lo - 1e-9 && est.value <= hi + 1e-9);
                }
            }
        }
    }

    #[test]
    fn test_item_based_k1_copies_single_neighbor() {
        // u0 rated only i1, which is the one candidate neighbor for i0
        let ratings = vec![
            Rating::new("u0", "i1", 2.0),
            Rating::new("u1", "i0", 4.0),
            Rating::new("u1", "i1", 4.0),
            Rating::new("u2", "i0", 3.0),
            Rating::new("u2", "i1", 3.0),
        ];
        let options = KnnOptions::default()
            .with_k(1)
            .with_sim(SimilarityOptions::new(SimilarityMeasure::Msd).with_user_based(false));
        let mut knn = Knn::new(options);
        knn.fit(trainset(&ratings)).unwrap();

        let pred = knn.predict("u0", "i0", None).unwrap();
        assert!(!pred.was_impossible());
        assert_eq!(pred.est, 2.0);
        assert_eq!(pred.details.actual_k, Some(1));
    }

    #[test]
    fn test_no_neighbors_is_impossible() {
        let ratings = vec![
            Rating::new("u0", "i0", 5.0),
            Rating::new("u1", "i1", 1.0),
        ];
        let mut knn = Knn::default();
        knn.fit(trainset(&ratings)).unwrap();

        // u1 is known and i0 is known, but nobody similar to u1 rated i0
        let pred = knn.predict("u1", "i0", Some(5.0)).unwrap();
        assert!(pred.was_impossible());
        assert_eq!(pred.est, 3.0);
        assert_eq!(pred.details.reason.as_deref(), Some("Not enough neighbors."));
    }

    #[test]
    fn test_constant_rater_is_not_a_pearson_neighbor() {
        // "a" rates everything it shares with "c" at the same fractional value
        let mut ratings = Vec::new();
        for (n, r) in [2.0, 4.5, 1.0, 3.5, 5.0].into_iter().enumerate() {
            ratings.push(Rating::new("a", format!("i{}", n), 1.01));
            ratings.push(Rating::new("c", format!("i{}", n), r));
        }
        ratings.push(Rating::new("a", "t", 4.0));

        let options =
            KnnOptions::default().with_sim(SimilarityOptions::new(SimilarityMeasure::Pearson));
        let mut knn = Knn::new(options);
        knn.fit(trainset(&ratings)).unwrap();

        let sim = knn.similarities().unwrap();
        assert_eq!(sim.get(0, 1), 0.0);

        let pred = knn.predict("c", "t", None).unwrap();
        assert!(pred.was_impossible());
        let trainset = knn.trainset().unwrap();
        assert_eq!(pred.est, trainset.rating_scale().clip(trainset.global_mean()));
    }

    #[test]
    fn test_tie_break_on_inner_id() {
        // u1 and u2 are equally similar to u0; k = 1 keeps u1
        let ratings = vec![
            Rating::new("u0", "i0", 3.0),
            Rating::new("u1", "i0", 3.0),
            Rating::new("u1", "i1", 5.0),
            Rating::new("u2", "i0", 3.0),
            Rating::new("u2", "i1", 1.0),
        ];
        let options = KnnOptions::default().with_k(1);
        let mut knn = Knn::new(options);
        knn.fit(trainset(&ratings)).unwrap();

        assert_eq!(knn.predict("u0", "i1", None).unwrap().est, 5.0);
        assert_eq!(knn.get_neighbors(0, 1).unwrap(), vec![1]);
    }

    #[test]
    fn test_variants_predict_finite_values() {
        let ratings = dense_ratings();
        for variant in [KnnVariant::Basic, KnnVariant::WithMeans, KnnVariant::Baseline] {
            for user_based in [true, false] {
                let options = KnnOptions::default().with_variant(variant).with_sim(
                    SimilarityOptions::new(SimilarityMeasure::PearsonBaseline)
                        .with_user_based(user_based),
                );
                let mut knn = Knn::new(options);
                knn.fit(trainset(&ratings)).unwrap();

                let pred = knn.predict("u0", "i2", Some(1.0)).unwrap();
                assert!(pred.est.is_finite());
                assert!((1.0..=5.0).contains(&pred.est));
            }
        }
    }

    #[test]
    fn test_predict_is_idempotent() {
        let mut knn = Knn::new(KnnOptions::default().with_variant(KnnVariant::WithMeans));
        knn.fit(trainset(&dense_ratings())).unwrap();

        let first = knn.predict("u2", "i0", None).unwrap();
        let second = knn.predict("u2", "i0", None).unwrap();
        assert_eq!(first.est.to_bits(), second.est.to_bits());
    }

    #[test]
    fn test_refit_replaces_similarities() {
        let mut knn = Knn::default();
        knn.fit(trainset(&dense_ratings())).unwrap();
        assert_eq!(knn.similarities().unwrap().n(), 5);

        let small = vec![Rating::new("a", "x", 3.0), Rating::new("b", "x", 4.0)];
        knn.fit(trainset(&small)).unwrap();
        assert_eq!(knn.similarities().unwrap().n(), 2);
    }

    #[test]
    fn test_zero_k_rejected() {
        let mut knn = Knn::new(KnnOptions::default().with_k(0));
        assert!(knn.fit(trainset(&dense_ratings())).is_err());
        assert!(knn.trainset().is_none());
    }
}
