//! Similarity Engine - pairwise user-user or item-item similarities
//!
//! ## Algorithm
//! For every pair (a, b) of "x" entities (users when `user_based`, items
//! otherwise):
//! 1. Walk a's ratings (`xr[a]`), and for each co-rated "y" entity walk the
//!    entities that rated it too (`yr[y]`)
//! 2. Accumulate the co-rating statistics (support, Σab, Σa², Σb², Σa, Σb,
//!    Σ(a−b)²) for every b > a
//! 3. Turn the statistics into a similarity for the configured measure,
//!    then apply shrinkage
//!
//! Only the upper triangle is computed; mirroring it makes the matrix
//! exactly symmetric. Rows are independent, so they run on rayon.
//!
//! Pairs without co-ratings (or with fewer than `min_support`) get 0.
//! Degenerate statistics (zero norm, zero variance) also give 0, never NaN.

use crate::baseline::Biases;
use crate::error::{AlgoError, Result};
use dataset::Trainset;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, instrument};

/// Supported similarity measures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMeasure {
    /// Cosine of the co-rated rating vectors
    Cosine,
    /// `1 / (1 + mean squared difference)`
    Msd,
    /// Pearson correlation over the co-rated set
    Pearson,
    /// Cosine of baseline-centered ratings `r - (μ + b_x + b_y)`
    PearsonBaseline,
}

impl SimilarityMeasure {
    /// Shrinkage used when none is configured
    pub fn default_shrinkage(&self) -> f64 {
        match self {
            Self::PearsonBaseline => 100.0,
            _ => 0.0,
        }
    }

    pub fn needs_baselines(&self) -> bool {
        matches!(self, Self::PearsonBaseline)
    }
}

impl fmt::Display for SimilarityMeasure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Cosine => "cosine",
            Self::Msd => "msd",
            Self::Pearson => "pearson",
            Self::PearsonBaseline => "pearson_baseline",
        };
        f.write_str(name)
    }
}

/// Similarity configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityOptions {
    #[serde(rename = "name")]
    pub measure: SimilarityMeasure,
    /// Compare users (true) or items (false)
    pub user_based: bool,
    /// Pairs with fewer co-ratings than this get similarity 0
    pub min_support: usize,
    /// Shrinkage constant; `None` uses the measure's default
    pub shrinkage: Option<f64>,
}

impl Default for SimilarityOptions {
    fn default() -> Self {
        Self {
            measure: SimilarityMeasure::Msd,
            user_based: true,
            min_support: 1,
            shrinkage: None,
        }
    }
}

impl SimilarityOptions {
    pub fn new(measure: SimilarityMeasure) -> Self {
        Self {
            measure,
            ..Self::default()
        }
    }

    pub fn with_user_based(mut self, user_based: bool) -> Self {
        self.user_based = user_based;
        self
    }

    pub fn with_min_support(mut self, min_support: usize) -> Self {
        self.min_support = min_support;
        self
    }

    pub fn with_shrinkage(mut self, shrinkage: f64) -> Self {
        self.shrinkage = Some(shrinkage);
        self
    }

    pub fn effective_shrinkage(&self) -> f64 {
        self.shrinkage
            .unwrap_or_else(|| self.measure.default_shrinkage())
    }

    fn validate(&self) -> Result<()> {
        let shrinkage = self.effective_shrinkage();
        if !shrinkage.is_finite() || shrinkage < 0.0 {
            return Err(AlgoError::invalid_option(
                "sim.shrinkage",
                format!("must be a non-negative number, got {}", shrinkage),
            ));
        }
        Ok(())
    }
}

/// Relative cutoff under which a one-pass variance counts as zero
const VARIANCE_TOLERANCE: f64 = 1e-12;

/// Co-rating statistics of one (a, b) pair
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CoRating {
    pub support: usize,
    pub sum_ab: f64,
    pub sum_aa: f64,
    pub sum_bb: f64,
    pub sum_a: f64,
    pub sum_b: f64,
    pub sum_sq_diff: f64,
}

impl CoRating {
    pub fn push(&mut self, a: f64, b: f64) {
        self.support += 1;
        self.sum_ab += a * b;
        self.sum_aa += a * a;
        self.sum_bb += b * b;
        self.sum_a += a;
        self.sum_b += b;
        self.sum_sq_diff += (a - b) * (a - b);
    }

    /// Similarity before shrinkage; 0 when the statistics are degenerate
    pub fn raw_similarity(&self, measure: SimilarityMeasure) -> f64 {
        if self.support == 0 {
            return 0.0;
        }
        let n = self.support as f64;

        let sim = match measure {
            SimilarityMeasure::Cosine | SimilarityMeasure::PearsonBaseline => {
                let denom = (self.sum_aa * self.sum_bb).sqrt();
                if denom <= f64::EPSILON {
                    0.0
                } else {
                    self.sum_ab / denom
                }
            }
            SimilarityMeasure::Msd => 1.0 / (1.0 + self.sum_sq_diff / n),
            SimilarityMeasure::Pearson => {
                let var_a = n * self.sum_aa - self.sum_a * self.sum_a;
                let var_b = n * self.sum_bb - self.sum_b * self.sum_b;
                // one-pass variances of constant vectors leave rounding residue
                if var_a <= VARIANCE_TOLERANCE * n * self.sum_aa
                    || var_b <= VARIANCE_TOLERANCE * n * self.sum_bb
                {
                    0.0
                } else {
                    (n * self.sum_ab - self.sum_a * self.sum_b) / (var_a * var_b).sqrt()
                }
            }
        };

        if sim.is_finite() {
            sim.clamp(-1.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Discount a similarity backed by `support` co-ratings
///
/// `shrinkage == 0` leaves the similarity unchanged.
pub fn shrink(sim: f64, support: usize, shrinkage: f64) -> f64 {
    let n = support as f64;
    if n + shrinkage <= 0.0 {
        return 0.0;
    }
    sim * (n / (n + shrinkage))
}

/// Dense symmetric `n × n` similarity matrix
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatrix {
    n: usize,
    values: Vec<f64>,
}

impl SimilarityMatrix {
    /// Compute the similarity matrix of `trainset`
    ///
    /// `biases` are required by [`SimilarityMeasure::PearsonBaseline`] and
    /// ignored otherwise.
    #[instrument(skip_all, fields(measure = %options.measure, user_based = options.user_based))]
    pub fn compute(
        trainset: &Trainset,
        options: &SimilarityOptions,
        biases: Option<&Biases>,
    ) -> Result<Self> {
        options.validate()?;

        let (n, xr, yr) = if options.user_based {
            (trainset.n_users(), trainset.ur(), trainset.ir())
        } else {
            (trainset.n_items(), trainset.ir(), trainset.ur())
        };

        // (bx, by) are the biases of the x and y entities
        let centering = match (options.measure.needs_baselines(), biases) {
            (false, _) => None,
            (true, Some(b)) if options.user_based => Some((&b.bu, &b.bi)),
            (true, Some(b)) => Some((&b.bi, &b.bu)),
            (true, None) => {
                return Err(AlgoError::invalid_option(
                    "sim.name",
                    "pearson_baseline needs baseline estimates",
                ));
            }
        };
        let mu = trainset.global_mean();
        let center = |x: usize, y: usize, r: f64| match centering {
            Some((bx, by)) => r - (mu + bx[x] + by[y]),
            None => r,
        };

        let shrinkage = options.effective_shrinkage();
        let min_support = options.min_support;
        let measure = options.measure;

        info!("Computing {} similarity matrix ({} x {})", measure, n, n);

        // Upper triangle, row by row: rows[a][k] is sim(a, a + 1 + k)
        let rows: Vec<Vec<f64>> = (0..n)
            .into_par_iter()
            .map(|a| {
                let mut stats = vec![CoRating::default(); n - a - 1];
                for &(y, r_a) in &xr[a] {
                    let va = center(a, y, r_a);
                    for &(b, r_b) in &yr[y] {
                        if b > a {
                            stats[b - a - 1].push(va, center(b, y, r_b));
                        }
                    }
                }
                stats
                    .iter()
                    .map(|s| {
                        if s.support == 0 || s.support < min_support {
                            0.0
                        } else {
                            shrink(s.raw_similarity(measure), s.support, shrinkage)
                        }
                    })
                    .collect()
            })
            .collect();

        let mut values = vec![0.0; n * n];
        for (a, row) in rows.into_iter().enumerate() {
            values[a * n + a] = 1.0;
            for (k, sim) in row.into_iter().enumerate() {
                let b = a + 1 + k;
                values[a * n + b] = sim;
                values[b * n + a] = sim;
            }
        }

        info!("Done computing similarity matrix");
        Ok(Self { n, values })
    }

    /// Number of entities on each side
    pub fn n(&self) -> usize {
        self.n
    }

    /// Similarity of `a` and `b`
    pub fn get(&self, a: usize, b: usize) -> f64 {
        self.values[a * self.n + b]
    }

    /// All similarities of `a`
    pub fn row(&self, a: usize) -> &[f64] {
        &self.values[a * self.n..(a + 1) * self.n]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::{BaselineOptions, compute_baselines};
    use dataset::{Rating, RatingScale};

    fn sample_trainset() -> Trainset {
        let ratings = vec![
            Rating::new("u0", "i0", 5.0),
            Rating::new("u0", "i1", 3.0),
            Rating::new("u0", "i2", 1.0),
            Rating::new("u1", "i0", 4.0),
            Rating::new("u1", "i1", 3.0),
            Rating::new("u1", "i3", 2.0),
            Rating::new("u2", "i0", 1.0),
            Rating::new("u2", "i2", 5.0),
            Rating::new("u2", "i3", 4.0),
            Rating::new("u3", "i4", 3.0),
        ];
        Trainset::build(&ratings, RatingScale::default()).unwrap()
    }

    fn all_measures() -> [SimilarityMeasure; 4] {
        [
            SimilarityMeasure::Cosine,
            SimilarityMeasure::Msd,
            SimilarityMeasure::Pearson,
            SimilarityMeasure::PearsonBaseline,
        ]
    }

    #[test]
    fn test_matrix_is_symmetric_for_every_measure() {
        let trainset = sample_trainset();
        let biases = compute_baselines(&trainset, &BaselineOptions::als()).unwrap();

        for measure in all_measures() {
            for user_based in [true, false] {
                let options = SimilarityOptions::new(measure).with_user_based(user_based);
                let sim = SimilarityMatrix::compute(&trainset, &options, Some(&biases)).unwrap();
                for a in 0..sim.n() {
                    assert_eq!(sim.get(a, a), 1.0);
                    for b in 0..sim.n() {
                        assert_eq!(sim.get(a, b), sim.get(b, a), "{} ({}, {})", measure, a, b);
                    }
                }
            }
        }
    }

    #[test]
    fn test_no_co_ratings_means_zero() {
        let trainset = sample_trainset();
        let options = SimilarityOptions::new(SimilarityMeasure::Msd);
        let sim = SimilarityMatrix::compute(&trainset, &options, None).unwrap();

        // u3 shares no item with anyone
        let u3 = trainset.to_inner_uid("u3").unwrap();
        for other in 0..3 {
            assert_eq!(sim.get(u3, other), 0.0);
        }
    }

    #[test]
    fn test_msd_value() {
        let trainset = sample_trainset();
        let options = SimilarityOptions::new(SimilarityMeasure::Msd);
        let sim = SimilarityMatrix::compute(&trainset, &options, None).unwrap();

        // u0, u1 co-rate i0 (5 vs 4) and i1 (3 vs 3): msd = 0.5
        assert!((sim.get(0, 1) - 1.0 / 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_cosine_value() {
        let mut stats = CoRating::default();
        stats.push(1.0, 2.0);
        stats.push(2.0, 4.0);
        assert!((stats.raw_similarity(SimilarityMeasure::Cosine) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_pearson_zero_variance_is_zero() {
        let mut stats = CoRating::default();
        stats.push(3.0, 1.0);
        stats.push(3.0, 5.0);
        let sim = stats.raw_similarity(SimilarityMeasure::Pearson);
        assert_eq!(sim, 0.0);
        assert!(!sim.is_nan());
    }

    #[test]
    fn test_pearson_constant_fractional_ratings_is_zero() {
        for value in [1.01, 2.81, 4.7] {
            let mut stats = CoRating::default();
            for (k, b) in [1.0, 2.0, 5.0, 3.0, 4.0, 2.5].into_iter().enumerate() {
                stats.push(value, b);
                assert_eq!(stats.raw_similarity(SimilarityMeasure::Pearson), 0.0, "n = {}", k + 1);
            }

            let mut mirrored = CoRating::default();
            for b in [1.0, 2.0, 5.0, 3.0, 4.0, 2.5] {
                mirrored.push(b, value);
            }
            assert_eq!(mirrored.raw_similarity(SimilarityMeasure::Pearson), 0.0);
        }
    }

    #[test]
    fn test_pearson_perfect_anticorrelation() {
        let mut stats = CoRating::default();
        stats.push(1.0, 5.0);
        stats.push(3.0, 3.0);
        stats.push(5.0, 1.0);
        assert!((stats.raw_similarity(SimilarityMeasure::Pearson) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_shrinkage_is_identity() {
        let trainset = sample_trainset();
        for measure in [
            SimilarityMeasure::Cosine,
            SimilarityMeasure::Msd,
            SimilarityMeasure::Pearson,
        ] {
            let raw = SimilarityMatrix::compute(&trainset, &SimilarityOptions::new(measure), None)
                .unwrap();
            let shrunk = SimilarityMatrix::compute(
                &trainset,
                &SimilarityOptions::new(measure).with_shrinkage(0.0),
                None,
            )
            .unwrap();
            assert_eq!(raw, shrunk);
        }
        assert_eq!(shrink(0.8, 2, 0.0), 0.8);
    }

    #[test]
    fn test_shrinkage_discounts_small_support() {
        assert!((shrink(1.0, 2, 98.0) - 0.02).abs() < 1e-12);
        assert!(shrink(1.0, 200, 100.0) > shrink(1.0, 2, 100.0));
    }

    #[test]
    fn test_min_support() {
        let trainset = sample_trainset();
        let options = SimilarityOptions::new(SimilarityMeasure::Msd).with_min_support(3);
        let sim = SimilarityMatrix::compute(&trainset, &options, None).unwrap();

        // no pair of users co-rates three items
        assert_eq!(sim.get(0, 1), 0.0);
    }

    #[test]
    fn test_pearson_baseline_requires_biases() {
        let trainset = sample_trainset();
        let options = SimilarityOptions::new(SimilarityMeasure::PearsonBaseline);
        assert!(SimilarityMatrix::compute(&trainset, &options, None).is_err());
    }

    #[test]
    fn test_negative_shrinkage_rejected() {
        let trainset = sample_trainset();
        let options = SimilarityOptions::new(SimilarityMeasure::Cosine).with_shrinkage(-1.0);
        assert!(matches!(
            SimilarityMatrix::compute(&trainset, &options, None),
            Err(AlgoError::InvalidOption { .. })
        ));
    }
}
