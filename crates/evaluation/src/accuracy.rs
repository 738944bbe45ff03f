//! Accuracy measures over a set of predictions.
//!
//! Impossible predictions and predictions without a true rating are
//! skipped. A measure with nothing left to score is an error rather
//! than a silent NaN.

use crate::error::{EvalError, Result};
use algorithms::Prediction;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Supported accuracy measures
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Measure {
    Rmse,
    Mae,
    Mse,
    Fcp,
}

impl Measure {
    pub fn compute(&self, predictions: &[Prediction]) -> Result<f64> {
        match self {
            Self::Rmse => rmse(predictions),
            Self::Mae => mae(predictions),
            Self::Mse => mse(predictions),
            Self::Fcp => fcp(predictions),
        }
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Rmse => "RMSE",
            Self::Mae => "MAE",
            Self::Mse => "MSE",
            Self::Fcp => "FCP",
        };
        f.write_str(name)
    }
}

/// `(r_true, est)` of every scorable prediction
fn scored(predictions: &[Prediction]) -> impl Iterator<Item = (f64, f64)> + '_ {
    predictions
        .iter()
        .filter(|p| !p.was_impossible())
        .filter_map(|p| p.r_true.map(|r| (r, p.est)))
}

fn mean_of(values: impl Iterator<Item = f64>, measure: Measure) -> Result<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        return Err(EvalError::NoPredictions { measure });
    }
    Ok(sum / count as f64)
}

/// Mean squared error
pub fn mse(predictions: &[Prediction]) -> Result<f64> {
    mean_of(scored(predictions).map(|(r, est)| (r - est).powi(2)), Measure::Mse)
}

/// Root mean squared error
pub fn rmse(predictions: &[Prediction]) -> Result<f64> {
    mean_of(scored(predictions).map(|(r, est)| (r - est).powi(2)), Measure::Rmse).map(f64::sqrt)
}

/// Mean absolute error
pub fn mae(predictions: &[Prediction]) -> Result<f64> {
    mean_of(scored(predictions).map(|(r, est)| (r - est).abs()), Measure::Mae)
}

/// Fraction of concordant pairs
///
/// Within each user, a pair of predictions is concordant when the higher
/// true rating also got the strictly higher estimate, and discordant when
/// it got an equal or lower one. Counts are averaged over users before
/// taking `nc / (nc + nd)`.
pub fn fcp(predictions: &[Prediction]) -> Result<f64> {
    let mut by_user: HashMap<&str, Vec<(f64, f64)>> = HashMap::new();
    for p in predictions.iter().filter(|p| !p.was_impossible()) {
        if let Some(r) = p.r_true {
            by_user.entry(p.user.as_str()).or_default().push((r, p.est));
        }
    }

    let (mut concordant, mut discordant) = (0.0, 0.0);
    for pairs in by_user.values() {
        let (mut nc, mut nd) = (0usize, 0usize);
        for &(r0, est0) in pairs {
            for &(r1, est1) in pairs {
                if r0 > r1 && est0 > est1 {
                    nc += 1;
                }
                if r0 < r1 && est0 >= est1 {
                    nd += 1;
                }
            }
        }
        concordant += nc as f64;
        discordant += nd as f64;
    }

    let n_users = by_user.len() as f64;
    let (nc, nd) = (concordant / n_users, discordant / n_users);
    if by_user.is_empty() || nc + nd == 0.0 {
        return Err(EvalError::NoPredictions {
            measure: Measure::Fcp,
        });
    }
    Ok(nc / (nc + nd))
}
