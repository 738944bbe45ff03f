//! Baseline estimates: `r̂_ui = μ + b_u + b_i`.
//!
//! [`compute_baselines`] is a standalone routine. [`BaselineOnly`] uses it
//! directly, and kNN uses it for the baseline-centered variant and for the
//! `pearson_baseline` similarity.
//!
//! ## Algorithms
//! - **ALS**: alternate closed-form updates of item then user biases,
//!   each regularized by a damping term (`reg_i`, `reg_u`)
//! - **SGD**: stochastic gradient descent on the squared error with L2
//!   regularization on both bias vectors

use crate::error::{AlgoError, PredictionImpossible, Result};
use crate::prediction::Estimate;
use crate::traits::{PredictionAlgorithm, fitted};
use dataset::{InnerIid, InnerUid, Trainset};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

/// How the bias terms are fitted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum BaselineOptions {
    Als {
        #[serde(default = "default_reg_u")]
        reg_u: f64,
        #[serde(default = "default_reg_i")]
        reg_i: f64,
        #[serde(default = "default_als_epochs")]
        n_epochs: usize,
    },
    Sgd {
        #[serde(default = "default_sgd_reg")]
        reg: f64,
        #[serde(default = "default_sgd_lr")]
        learning_rate: f64,
        #[serde(default = "default_sgd_epochs")]
        n_epochs: usize,
    },
}

fn default_reg_u() -> f64 {
    15.0
}
fn default_reg_i() -> f64 {
    10.0
}
fn default_als_epochs() -> usize {
    10
}
fn default_sgd_reg() -> f64 {
    0.02
}
fn default_sgd_lr() -> f64 {
    0.005
}
fn default_sgd_epochs() -> usize {
    20
}

impl BaselineOptions {
    /// ALS with the default damping terms
    pub fn als() -> Self {
        Self::Als {
            reg_u: default_reg_u(),
            reg_i: default_reg_i(),
            n_epochs: default_als_epochs(),
        }
    }

    /// SGD with the default learning rate and regularization
    pub fn sgd() -> Self {
        Self::Sgd {
            reg: default_sgd_reg(),
            learning_rate: default_sgd_lr(),
            n_epochs: default_sgd_epochs(),
        }
    }

    /// Override the number of epochs for either method
    pub fn with_n_epochs(mut self, epochs: usize) -> Self {
        match &mut self {
            Self::Als { n_epochs, .. } | Self::Sgd { n_epochs, .. } => *n_epochs = epochs,
        }
        self
    }

    fn validate(&self) -> Result<()> {
        match *self {
            Self::Als { reg_u, reg_i, .. } => {
                if !is_non_negative(reg_u) || !is_non_negative(reg_i) {
                    return Err(AlgoError::invalid_option(
                        "baseline.reg",
                        "regularization must be non-negative",
                    ));
                }
            }
            Self::Sgd {
                reg, learning_rate, ..
            } => {
                if !is_non_negative(reg) {
                    return Err(AlgoError::invalid_option(
                        "baseline.reg",
                        "regularization must be non-negative",
                    ));
                }
                if !learning_rate.is_finite() || learning_rate <= 0.0 {
                    return Err(AlgoError::invalid_option(
                        "baseline.learning_rate",
                        "learning rate must be positive",
                    ));
                }
            }
        }
        Ok(())
    }
}

fn is_non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

impl Default for BaselineOptions {
    fn default() -> Self {
        Self::als()
    }
}

/// Fitted user and item biases
#[derive(Debug, Clone, PartialEq)]
pub struct Biases {
    pub bu: Vec<f64>,
    pub bi: Vec<f64>,
}

impl Biases {
    /// Baseline estimate `μ + b_u + b_i` for known ids
    pub fn baseline(&self, global_mean: f64, u: InnerUid, i: InnerIid) -> f64 {
        global_mean + self.bu[u] + self.bi[i]
    }
}

/// Fit user and item biases on `trainset`
#[instrument(skip(trainset), fields(n_ratings = trainset.n_ratings()))]
pub fn compute_baselines(trainset: &Trainset, options: &BaselineOptions) -> Result<Biases> {
    options.validate()?;

    let biases = match *options {
        BaselineOptions::Als {
            reg_u,
            reg_i,
            n_epochs,
        } => optimize_als(trainset, reg_u, reg_i, n_epochs),
        BaselineOptions::Sgd {
            reg,
            learning_rate,
            n_epochs,
        } => optimize_sgd(trainset, reg, learning_rate, n_epochs),
    };

    debug!("Estimated {} user and {} item biases", biases.bu.len(), biases.bi.len());
    Ok(biases)
}

fn optimize_als(trainset: &Trainset, reg_u: f64, reg_i: f64, n_epochs: usize) -> Biases {
    let mu = trainset.global_mean();
    let mut bu = vec![0.0; trainset.n_users()];
    let mut bi = vec![0.0; trainset.n_items()];

    for _ in 0..n_epochs {
        for i in trainset.all_items() {
            let ratings = trainset.item_ratings(i);
            let dev: f64 = ratings.iter().map(|&(u, r)| r - mu - bu[u]).sum();
            bi[i] = dev / (reg_i + ratings.len() as f64);
        }

        for u in trainset.all_users() {
            let ratings = trainset.user_ratings(u);
            let dev: f64 = ratings.iter().map(|&(i, r)| r - mu - bi[i]).sum();
            bu[u] = dev / (reg_u + ratings.len() as f64);
        }
    }

    Biases { bu, bi }
}

fn optimize_sgd(trainset: &Trainset, reg: f64, lr: f64, n_epochs: usize) -> Biases {
    let mu = trainset.global_mean();
    let mut bu = vec![0.0; trainset.n_users()];
    let mut bi = vec![0.0; trainset.n_items()];

    for _ in 0..n_epochs {
        for (u, i, r) in trainset.all_ratings() {
            let err = r - (mu + bu[u] + bi[i]);
            bu[u] += lr * (err - reg * bu[u]);
            bi[i] += lr * (err - reg * bi[i]);
        }
    }

    Biases { bu, bi }
}

// =============================================================================
// BaselineOnly
// =============================================================================

#[derive(Debug, Clone)]
struct FittedBaseline {
    trainset: Arc<Trainset>,
    biases: Biases,
}

/// Predicts the baseline estimate `μ + b_u + b_i`
#[derive(Debug, Clone, Default)]
pub struct BaselineOnly {
    options: BaselineOptions,
    state: Option<FittedBaseline>,
}

impl BaselineOnly {
    pub fn new(options: BaselineOptions) -> Self {
        Self {
            options,
            state: None,
        }
    }

    pub fn options(&self) -> &BaselineOptions {
        &self.options
    }

    /// Biases of the current fit
    pub fn biases(&self) -> Result<&Biases> {
        fitted(&self.state, self.name()).map(|s| &s.biases)
    }
}

impl PredictionAlgorithm for BaselineOnly {
    fn name(&self) -> &str {
        "BaselineOnly"
    }

    fn fit(&mut self, trainset: Arc<Trainset>) -> Result<&mut Self> {
        self.state = None;
        let biases = compute_baselines(&trainset, &self.options)?;
        self.state = Some(FittedBaseline { trainset, biases });
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
        let mu = state.trainset.global_mean();
        Ok(Estimate::new(state.biases.baseline(mu, u, i)))
    }
}
