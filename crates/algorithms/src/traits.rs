//! Core trait shared by every prediction algorithm.
//!
//! Variants only implement `fit` and the inner-id `estimate`. Raw id
//! lookup, cold-start fallback and clipping live in the provided
//! [`PredictionAlgorithm::predict`] so every variant behaves the same way.

use crate::error::{AlgoError, PredictionImpossible, Result};
use crate::prediction::{Details, Estimate, Prediction};
use dataset::{InnerIid, InnerUid, Rating, Trainset};
use std::sync::Arc;

/// Core trait for rating-prediction algorithms.
///
/// ## Lifecycle
/// - A new instance is *unfit*: `predict` fails with [`AlgoError::NotFitted`]
/// - `fit` builds the whole trained state from a trainset
/// - Calling `fit` again discards the previous state wholesale
///
/// `Send + Sync` lets fitted instances be moved across rayon workers.
pub trait PredictionAlgorithm: Send + Sync {
    /// Returns the name of this algorithm (for logging/reports)
    fn name(&self) -> &str;

    /// Train on `trainset` and return the algorithm for chaining
    fn fit(&mut self, trainset: Arc<Trainset>) -> Result<&mut Self>
    where
        Self: Sized;

    /// Trainset of the current fit, or `None` while unfit
    fn trainset(&self) -> Option<&Arc<Trainset>>;

    /// Estimate the rating of known user `u` for known item `i`
    ///
    /// Only called by `predict` after both ids resolved in the fitted
    /// trainset.
    fn estimate(
        &self,
        u: InnerUid,
        i: InnerIid,
    ) -> std::result::Result<Estimate, PredictionImpossible>;

    /// Predict the rating of raw `user` for raw `item`
    ///
    /// Unknown ids and impossible estimates fall back to the global mean
    /// with `was_impossible = true`. The estimate is always clipped to the
    /// trainset's rating scale. No randomness is involved, so repeated calls
    /// are bit-identical.
    fn predict(&self, user: &str, item: &str, r_true: Option<f64>) -> Result<Prediction> {
        let trainset = self.trainset().ok_or_else(|| AlgoError::NotFitted {
            algorithm: self.name().to_string(),
        })?;

        let outcome = match (trainset.to_inner_uid(user), trainset.to_inner_iid(item)) {
            (Ok(u), Ok(i)) => self.estimate(u, i),
            (Err(e), _) | (_, Err(e)) => Err(PredictionImpossible::new(e.to_string())),
        };

        let (est, details) = match outcome {
            Ok(estimate) => (
                estimate.value,
                Details {
                    was_impossible: false,
                    reason: None,
                    actual_k: estimate.actual_k,
                },
            ),
            Err(impossible) => (trainset.global_mean(), Details::impossible(impossible.0)),
        };

        Ok(Prediction {
            user: user.to_string(),
            item: item.to_string(),
            r_true,
            est: trainset.rating_scale().clip(est),
            details,
        })
    }

    /// Predict every rating of a testset
    fn test(&self, testset: &[Rating]) -> Result<Vec<Prediction>> {
        testset
            .iter()
            .map(|r| self.predict(&r.user, &r.item, Some(r.rating)))
            .collect()
    }
}

/// Fetch the fitted state or fail with `NotFitted`
pub(crate) fn fitted<'a, T>(state: &'a Option<T>, algorithm: &str) -> Result<&'a T> {
    state.as_ref().ok_or_else(|| AlgoError::NotFitted {
        algorithm: algorithm.to_string(),
    })
}
