//! Latent-factor model (SVD-style matrix factorization) trained by SGD.
//!
//! Prediction: `r̂_ui = μ + b_u + b_i + q_iᵀ p_u` (or `q_iᵀ p_u` unbiased).
//!
//! ## Training
//! For a fixed number of epochs, visit every training rating in a freshly
//! shuffled order and apply, with `e = r - r̂`:
//! - `b_u += lr_bu (e - reg_bu b_u)`, `b_i += lr_bi (e - reg_bi b_i)`
//! - `p_u += lr_pu (e q_i - reg_pu p_u)`, `q_i += lr_qi (e p_u - reg_qi q_i)`
//!
//! The p/q updates read the pre-update value of the other vector.
//! Learning rates are multiplied by `lr_decay` after each epoch.
//!
//! Factors start from `Normal(init_mean, init_std_dev)`. All randomness
//! comes from a `StdRng` owned by the fit, seeded from `seed` when given.

use crate::error::{AlgoError, PredictionImpossible, Result};
use crate::prediction::Estimate;
use crate::traits::{PredictionAlgorithm, fitted};
use dataset::{InnerIid, InnerUid, Trainset};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// SVD configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SvdOptions {
    pub n_factors: usize,
    pub n_epochs: usize,
    /// Include the `μ + b_u + b_i` terms
    pub biased: bool,
    pub init_mean: f64,
    pub init_std_dev: f64,
    pub lr_bu: f64,
    pub lr_bi: f64,
    pub lr_pu: f64,
    pub lr_qi: f64,
    pub reg_bu: f64,
    pub reg_bi: f64,
    pub reg_pu: f64,
    pub reg_qi: f64,
    /// Per-epoch multiplier applied to every learning rate
    pub lr_decay: f64,
    /// Seed for factor initialization and epoch shuffling
    pub seed: Option<u64>,
}

impl Default for SvdOptions {
    fn default() -> Self {
        Self {
            n_factors: 100,
            n_epochs: 20,
            biased: true,
            init_mean: 0.0,
            init_std_dev: 0.1,
            lr_bu: 0.005,
            lr_bi: 0.005,
            lr_pu: 0.005,
            lr_qi: 0.005,
            reg_bu: 0.02,
            reg_bi: 0.02,
            reg_pu: 0.02,
            reg_qi: 0.02,
            lr_decay: 1.0,
            seed: None,
        }
    }
}

impl SvdOptions {
    pub fn with_n_factors(mut self, n_factors: usize) -> Self {
        self.n_factors = n_factors;
        self
    }

    pub fn with_n_epochs(mut self, n_epochs: usize) -> Self {
        self.n_epochs = n_epochs;
        self
    }

    pub fn with_biased(mut self, biased: bool) -> Self {
        self.biased = biased;
        self
    }

    /// Set the same learning rate for every parameter
    pub fn with_lr_all(mut self, lr: f64) -> Self {
        self.lr_bu = lr;
        self.lr_bi = lr;
        self.lr_pu = lr;
        self.lr_qi = lr;
        self
    }

    /// Set the same regularization for every parameter
    pub fn with_reg_all(mut self, reg: f64) -> Self {
        self.reg_bu = reg;
        self.reg_bi = reg;
        self.reg_pu = reg;
        self.reg_qi = reg;
        self
    }

    pub fn with_lr_decay(mut self, lr_decay: f64) -> Self {
        self.lr_decay = lr_decay;
        self
    }

    pub fn with_init(mut self, mean: f64, std_dev: f64) -> Self {
        self.init_mean = mean;
        self.init_std_dev = std_dev;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.n_factors == 0 {
            return Err(AlgoError::invalid_option("n_factors", "must be at least 1"));
        }
        let rates = [self.lr_bu, self.lr_bi, self.lr_pu, self.lr_qi];
        if rates.iter().any(|lr| !lr.is_finite() || *lr <= 0.0) {
            return Err(AlgoError::invalid_option("lr", "learning rates must be positive"));
        }
        let regs = [self.reg_bu, self.reg_bi, self.reg_pu, self.reg_qi];
        if regs.iter().any(|reg| !reg.is_finite() || *reg < 0.0) {
            return Err(AlgoError::invalid_option("reg", "regularization must be non-negative"));
        }
        if !self.init_std_dev.is_finite() || self.init_std_dev < 0.0 {
            return Err(AlgoError::invalid_option("init_std_dev", "must be non-negative"));
        }
        if !self.lr_decay.is_finite() || self.lr_decay <= 0.0 {
            return Err(AlgoError::invalid_option("lr_decay", "must be positive"));
        }
        Ok(())
    }
}

/// Learned parameters of an SVD fit
#[derive(Debug, Clone)]
pub struct SvdModel {
    pub n_factors: usize,
    pub bu: Vec<f64>,
    pub bi: Vec<f64>,
    /// User factors, row-major `n_users × n_factors`
    pub pu: Vec<f64>,
    /// Item factors, row-major `n_items × n_factors`
    pub qi: Vec<f64>,
    /// Training RMSE of each epoch, measured before each update
    pub epoch_rmse: Vec<f64>,
}

impl SvdModel {
    pub fn user_factors(&self, u: InnerUid) -> &[f64] {
        &self.pu[u * self.n_factors..(u + 1) * self.n_factors]
    }

    pub fn item_factors(&self, i: InnerIid) -> &[f64] {
        &self.qi[i * self.n_factors..(i + 1) * self.n_factors]
    }
}

#[derive(Debug, Clone)]
struct FittedSvd {
    trainset: Arc<Trainset>,
    model: SvdModel,
}

/// Matrix factorization trained by stochastic gradient descent
#[derive(Debug, Clone, Default)]
pub struct Svd {
    options: SvdOptions,
    state: Option<FittedSvd>,
}

impl Svd {
    pub fn new(options: SvdOptions) -> Self {
        Self {
            options,
            state: None,
        }
    }

    pub fn options(&self) -> &SvdOptions {
        &self.options
    }

    /// Parameters of the current fit
    pub fn model(&self) -> Result<&SvdModel> {
        fitted(&self.state, self.name()).map(|s| &s.model)
    }

    /// Training RMSE per epoch of the current fit
    pub fn epoch_rmse(&self) -> Result<&[f64]> {
        self.model().map(|m| m.epoch_rmse.as_slice())
    }

    fn sgd(&self, trainset: &Trainset) -> Result<SvdModel> {
        let opts = &self.options;
        let f = opts.n_factors;
        let mu = trainset.global_mean();

        let mut rng = match opts.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let normal = Normal::new(opts.init_mean, opts.init_std_dev)
            .map_err(|e| AlgoError::invalid_option("init_std_dev", e.to_string()))?;

        let mut bu = vec![0.0; trainset.n_users()];
        let mut bi = vec![0.0; trainset.n_items()];
        let mut pu: Vec<f64> = (0..trainset.n_users() * f)
            .map(|_| normal.sample(&mut rng))
            .collect();
        let mut qi: Vec<f64> = (0..trainset.n_items() * f)
            .map(|_| normal.sample(&mut rng))
            .collect();

        let (mut lr_bu, mut lr_bi) = (opts.lr_bu, opts.lr_bi);
        let (mut lr_pu, mut lr_qi) = (opts.lr_pu, opts.lr_qi);
        let mut order: Vec<(InnerUid, InnerIid, f64)> = trainset.all_ratings().collect();
        let mut epoch_rmse = Vec::with_capacity(opts.n_epochs);

        for epoch in 0..opts.n_epochs {
            order.shuffle(&mut rng);
            let mut sq_err = 0.0;

            for &(u, i, r) in &order {
                let p = &mut pu[u * f..(u + 1) * f];
                let q = &mut qi[i * f..(i + 1) * f];

                let dot: f64 = p.iter().zip(q.iter()).map(|(a, b)| a * b).sum();
                let est = if opts.biased {
                    mu + bu[u] + bi[i] + dot
                } else {
                    dot
                };
                let err = r - est;
                sq_err += err * err;

                if opts.biased {
                    bu[u] += lr_bu * (err - opts.reg_bu * bu[u]);
                    bi[i] += lr_bi * (err - opts.reg_bi * bi[i]);
                }

                for (pf, qf) in p.iter_mut().zip(q.iter_mut()) {
                    let (puf, qif) = (*pf, *qf);
                    *pf += lr_pu * (err * qif - opts.reg_pu * puf);
                    *qf += lr_qi * (err * puf - opts.reg_qi * qif);
                }
            }

            let rmse = (sq_err / order.len().max(1) as f64).sqrt();
            debug!(epoch, rmse, "Finished SVD epoch");
            epoch_rmse.push(rmse);

            lr_bu *= opts.lr_decay;
            lr_bi *= opts.lr_decay;
            lr_pu *= opts.lr_decay;
            lr_qi *= opts.lr_decay;
        }

        Ok(SvdModel {
            n_factors: f,
            bu,
            bi,
            pu,
            qi,
            epoch_rmse,
        })
    }
}

impl PredictionAlgorithm for Svd {
    fn name(&self) -> &str {
        "SVD"
    }

    #[instrument(
        skip_all,
        fields(n_factors = self.options.n_factors, n_epochs = self.options.n_epochs)
    )]
    fn fit(&mut self, trainset: Arc<Trainset>) -> Result<&mut Self> {
        self.state = None;
        self.options.validate()?;

        let model = self.sgd(&trainset)?;
        if let Some(last) = model.epoch_rmse.last() {
            info!("SVD trained, final epoch RMSE {:.4}", last);
        }
        self.state = Some(FittedSvd { trainset, model });
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
        let model = &state.model;

        let dot: f64 = model
            .user_factors(u)
            .iter()
            .zip(model.item_factors(i))
            .map(|(a, b)| a * b)
            .sum();

        let value = if self.options.biased {
            state.trainset.global_mean() + model.bu[u] + model.bi[i] + dot
        } else {
            dot
        };
        Ok(Estimate::new(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataset::{Rating, RatingScale};

    fn toy_trainset() -> Arc<Trainset> {
        let grid = [
            ("u0", [5.0, 4.0, 1.0, 2.0]),
            ("u1", [4.0, 5.0, 2.0, 1.0]),
            ("u2", [1.0, 2.0, 5.0, 4.0]),
            ("u3", [2.0, 1.0, 4.0, 5.0]),
        ];
        let ratings: Vec<Rating> = grid
            .iter()
            .flat_map(|(user, row)| {
                row.iter()
                    .enumerate()
                    .map(move |(i, &r)| Rating::new(*user, format!("i{}", i), r))
            })
            .collect();
        Arc::new(Trainset::build(&ratings, RatingScale::default()).unwrap())
    }

    fn small_options(seed: u64) -> SvdOptions {
        SvdOptions::default()
            .with_n_factors(4)
            .with_n_epochs(100)
            .with_lr_all(0.02)
            .with_seed(seed)
    }

    #[test]
    fn test_training_error_trends_down() {
        let trainset = toy_trainset();
        let (mut first, mut last) = (0.0, 0.0);
        for seed in 0..5 {
            let mut svd = Svd::new(small_options(seed));
            svd.fit(trainset.clone()).unwrap();
            let rmse = svd.epoch_rmse().unwrap();
            assert_eq!(rmse.len(), 100);
            first += rmse[0];
            last += rmse[rmse.len() - 1];
        }
        assert!(last < first);
    }

    #[test]
    fn test_same_seed_is_reproducible() {
        let trainset = toy_trainset();
        let mut a = Svd::new(small_options(7));
        let mut b = Svd::new(small_options(7));
        a.fit(trainset.clone()).unwrap();
        b.fit(trainset.clone()).unwrap();

        let pa = a.predict("u0", "i3", None).unwrap();
        let pb = b.predict("u0", "i3", None).unwrap();
        assert_eq!(pa.est.to_bits(), pb.est.to_bits());
        assert_eq!(a.model().unwrap().pu, b.model().unwrap().pu);
    }

    #[test]
    fn test_different_seed_changes_factors() {
        let trainset = toy_trainset();
        let mut a = Svd::new(small_options(1));
        let mut b = Svd::new(small_options(2));
        a.fit(trainset.clone()).unwrap();
        b.fit(trainset).unwrap();
        assert_ne!(a.model().unwrap().pu, b.model().unwrap().pu);
    }

    #[test]
    fn test_predict_is_idempotent() {
        let mut svd = Svd::new(small_options(3));
        svd.fit(toy_trainset()).unwrap();
        let first = svd.predict("u2", "i1", Some(2.0)).unwrap();
        let second = svd.predict("u2", "i1", Some(2.0)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_fit_chains_into_predict() {
        let mut svd = Svd::new(small_options(11));
        let pred = svd
            .fit(toy_trainset())
            .unwrap()
            .predict("u1", "i0", Some(4.0))
            .unwrap();
        assert!(!pred.was_impossible());
        assert!((1.0..=5.0).contains(&pred.est));
    }

    #[test]
    fn test_unbiased_model() {
        let mut svd = Svd::new(small_options(5).with_biased(false).with_n_epochs(300));
        svd.fit(toy_trainset()).unwrap();
        let model = svd.model().unwrap();
        assert!(model.bu.iter().all(|&b| b == 0.0));
        assert!(svd.epoch_rmse().unwrap().last().unwrap().is_finite());
    }

    #[test]
    fn test_invalid_options() {
        let mut svd = Svd::new(SvdOptions::default().with_n_factors(0));
        assert!(svd.fit(toy_trainset()).is_err());

        let mut svd = Svd::new(SvdOptions::default().with_init(0.0, -1.0).with_seed(1));
        assert!(svd.fit(toy_trainset()).is_err());
    }

    #[test]
    fn test_factor_shapes() {
        let mut svd = Svd::new(small_options(9));
        svd.fit(toy_trainset()).unwrap();
        let model = svd.model().unwrap();
        assert_eq!(model.pu.len(), 4 * 4);
        assert_eq!(model.item_factors(3).len(), 4);
    }
}
