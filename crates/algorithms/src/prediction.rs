//! Prediction records returned by every algorithm.

use dataset::RawId;
use serde::Serialize;
use std::fmt;

/// Output of a variant's inner-id `estimate`
///
/// Neighborhood algorithms also report how many neighbors they used.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub value: f64,
    pub actual_k: Option<usize>,
}

impl Estimate {
    pub fn new(value: f64) -> Self {
        Self {
            value,
            actual_k: None,
        }
    }

    pub fn with_actual_k(mut self, actual_k: usize) -> Self {
        self.actual_k = Some(actual_k);
        self
    }
}

/// Extra information attached to a prediction
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Details {
    /// True when the estimate is a fallback (cold start, no neighbors)
    pub was_impossible: bool,
    /// Why the prediction was impossible
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Number of neighbors used by kNN algorithms
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_k: Option<usize>,
}

impl Details {
    pub fn impossible(reason: impl Into<String>) -> Self {
        Self {
            was_impossible: true,
            reason: Some(reason.into()),
            actual_k: None,
        }
    }
}

/// A rating estimate for one (user, item) pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub user: RawId,
    pub item: RawId,
    /// True rating, when known (testset predictions)
    pub r_true: Option<f64>,
    /// Estimated rating, clipped to the trainset's scale
    pub est: f64,
    pub details: Details,
}

impl Prediction {
    pub fn was_impossible(&self) -> bool {
        self.details.was_impossible
    }

    /// Signed error `r_true - est`, if the true rating is known
    pub fn error(&self) -> Option<f64> {
        self.r_true.map(|r| r - self.est)
    }
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user: {:<10} item: {:<10} ", self.user, self.item)?;
        match self.r_true {
            Some(r) => write!(f, "r_ui = {:.2}   ", r)?,
            None => write!(f, "r_ui = None   ")?,
        }
        write!(f, "est = {:.2}   ", self.est)?;
        match &self.details.reason {
            Some(reason) if self.details.was_impossible => write!(f, "[impossible: {}]", reason),
            _ => match self.details.actual_k {
                Some(k) => write!(f, "[k = {}]", k),
                None => Ok(()),
            },
        }
    }
}
