//! # Cross-validation harness
//!
//! Coordinates one evaluation run:
//! 1. Split the ratings into folds
//! 2. For every fold, build a trainset and fit a fresh clone of the algorithm
//! 3. Predict every test rating
//! 4. Score the predictions and aggregate per-measure mean and std
//!
//! Folds share nothing mutable, so they can run on rayon workers.
//! A run aborts on trainset or fitting failures only. Impossible
//! predictions are counted and scored around.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use algorithms::{Prediction, PredictionAlgorithm};
use dataset::{Rating, RatingScale, RawId, Trainset};
use rayon::prelude::*;
use serde::{Serialize, Serializer};
use tracing::{info, instrument, warn};

use crate::accuracy::Measure;
use crate::error::Result;
use crate::split::{Fold, Split, Splitter};

fn as_secs<S: Serializer>(
    duration: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Outcome of a single fold
#[derive(Debug, Clone, Serialize)]
pub struct FoldReport {
    pub fold: usize,
    pub n_train: usize,
    pub n_test: usize,
    pub n_impossible: usize,
    /// Measures that could be computed on this fold
    pub metrics: BTreeMap<Measure, f64>,
    #[serde(serialize_with = "as_secs")]
    pub fit_time: Duration,
    #[serde(serialize_with = "as_secs")]
    pub test_time: Duration,
}

/// Aggregated outcome of a cross-validation run
#[derive(Debug, Clone, Serialize)]
pub struct CvReport {
    pub algorithm: String,
    pub folds: Vec<FoldReport>,
    pub mean: BTreeMap<Measure, f64>,
    /// Population standard deviation across folds
    pub std: BTreeMap<Measure, f64>,
    pub n_impossible: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predictions: Option<Vec<Prediction>>,
}

impl CvReport {
    fn aggregate(algorithm: String, folds: Vec<(FoldReport, Vec<Prediction>)>, keep: bool) -> Self {
        let mut per_measure: BTreeMap<Measure, Vec<f64>> = BTreeMap::new();
        for (report, _) in &folds {
            for (&measure, &value) in &report.metrics {
                per_measure.entry(measure).or_default().push(value);
            }
        }

        let mut mean = BTreeMap::new();
        let mut std = BTreeMap::new();
        for (measure, values) in per_measure {
            let n = values.len() as f64;
            let m = values.iter().sum::<f64>() / n;
            let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n;
            mean.insert(measure, m);
            std.insert(measure, var.sqrt());
        }

        let n_impossible = folds.iter().map(|(r, _)| r.n_impossible).sum();
        let (reports, predictions): (Vec<_>, Vec<_>) = folds.into_iter().unzip();
        let predictions = keep.then(|| predictions.into_iter().flatten().collect());

        Self {
            algorithm,
            folds: reports,
            mean,
            std,
            n_impossible,
            predictions,
        }
    }

    /// Mean of `measure` across folds, if any fold could compute it
    pub fn mean_of(&self, measure: Measure) -> Option<f64> {
        self.mean.get(&measure).copied()
    }

    pub fn total_fit_time(&self) -> Duration {
        self.folds.iter().map(|f| f.fit_time).sum()
    }

    pub fn total_test_time(&self) -> Duration {
        self.folds.iter().map(|f| f.test_time).sum()
    }
}

/// Cross-validation runner
#[derive(Debug, Clone)]
pub struct CrossValidation {
    split: Split,
    measures: Vec<Measure>,
    rating_scale: RatingScale,
    parallel: bool,
    keep_predictions: bool,
}

impl CrossValidation {
    /// Runner with RMSE and MAE on the default 1-5 scale
    pub fn new(split: impl Into<Split>) -> Self {
        Self {
            split: split.into(),
            measures: vec![Measure::Rmse, Measure::Mae],
            rating_scale: RatingScale::default(),
            parallel: false,
            keep_predictions: false,
        }
    }

    pub fn with_measures(mut self, measures: impl Into<Vec<Measure>>) -> Self {
        self.measures = measures.into();
        self
    }

    pub fn with_rating_scale(mut self, rating_scale: RatingScale) -> Self {
        self.rating_scale = rating_scale;
        self
    }

    /// Evaluate folds concurrently on the rayon pool
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Keep every prediction in the report
    pub fn with_predictions(mut self, keep: bool) -> Self {
        self.keep_predictions = keep;
        self
    }

    pub fn split(&self) -> &Split {
        &self.split
    }

    /// Cross-validate `algorithm` on `ratings`
    ///
    /// `algorithm` is used as a template: each fold fits its own clone.
    #[instrument(skip_all, fields(algorithm = algorithm.name(), n_ratings = ratings.len()))]
    pub fn run<A>(&self, algorithm: &A, ratings: &[Rating]) -> Result<CvReport>
    where
        A: PredictionAlgorithm + Clone,
    {
        let folds = self.split.split(ratings)?;
        self.run_folds(algorithm, ratings, &folds)
    }

    /// Cross-validate several algorithms on the same folds
    pub fn run_many<A>(&self, algorithms: &[A], ratings: &[Rating]) -> Result<Vec<CvReport>>
    where
        A: PredictionAlgorithm + Clone,
    {
        let folds = self.split.split(ratings)?;
        algorithms
            .iter()
            .map(|algorithm| self.run_folds(algorithm, ratings, &folds))
            .collect()
    }

    fn run_folds<A>(&self, algorithm: &A, ratings: &[Rating], folds: &[Fold]) -> Result<CvReport>
    where
        A: PredictionAlgorithm + Clone,
    {
        let start_time = Instant::now();

        let results = if self.parallel {
            folds
                .par_iter()
                .map(|fold| self.evaluate_fold(algorithm, ratings, fold))
                .collect::<Result<Vec<_>>>()?
        } else {
            folds
                .iter()
                .map(|fold| self.evaluate_fold(algorithm, ratings, fold))
                .collect::<Result<Vec<_>>>()?
        };

        let report =
            CvReport::aggregate(algorithm.name().to_string(), results, self.keep_predictions);
        info!(
            "Evaluated {} on {} folds in {:.2?}",
            report.algorithm,
            report.folds.len(),
            start_time.elapsed()
        );
        Ok(report)
    }

    fn evaluate_fold<A>(
        &self,
        algorithm: &A,
        ratings: &[Rating],
        fold: &Fold,
    ) -> Result<(FoldReport, Vec<Prediction>)>
    where
        A: PredictionAlgorithm + Clone,
    {
        let trainset = Arc::new(Trainset::build(fold.train_ratings(ratings), self.rating_scale)?);
        let testset = fold.testset(ratings);

        let mut algo = algorithm.clone();
        let fit_start = Instant::now();
        algo.fit(trainset)?;
        let fit_time = fit_start.elapsed();

        let test_start = Instant::now();
        let predictions = algo.test(&testset)?;
        let test_time = test_start.elapsed();

        let n_impossible = predictions.iter().filter(|p| p.was_impossible()).count();
        let mut metrics = BTreeMap::new();
        for &measure in &self.measures {
            match measure.compute(&predictions) {
                Ok(value) => {
                    metrics.insert(measure, value);
                }
                Err(e) => warn!("Fold {}: {}", fold.index, e),
            }
        }

        info!(
            "Fold {}: fit in {:.2?}, tested {} ratings in {:.2?} ({} impossible)",
            fold.index,
            fit_time,
            testset.len(),
            test_time,
            n_impossible
        );

        let report = FoldReport {
            fold: fold.index,
            n_train: fold.train.len(),
            n_test: fold.test.len(),
            n_impossible,
            metrics,
            fit_time,
            test_time,
        };
        Ok((report, predictions))
    }
}

/// Fit `algorithm` on `trainset` and predict every rating of `testset`
pub fn train_test<A: PredictionAlgorithm>(
    algorithm: &mut A,
    trainset: Arc<Trainset>,
    testset: &[Rating],
) -> Result<Vec<Prediction>> {
    Ok(algorithm.fit(trainset)?.test(testset)?)
}

/// Best `n` predictions of every user, highest estimate first
///
/// Ties on the estimate are ordered by item id.
pub fn top_n(predictions: &[Prediction], n: usize) -> BTreeMap<RawId, Vec<Prediction>> {
    let mut by_user: BTreeMap<RawId, Vec<Prediction>> = BTreeMap::new();
    for p in predictions {
        by_user.entry(p.user.clone()).or_default().push(p.clone());
    }
    for preds in by_user.values_mut() {
        preds.sort_by(|a, b| b.est.total_cmp(&a.est).then_with(|| a.item.cmp(&b.item)));
        preds.truncate(n);
    }
    by_user
}
