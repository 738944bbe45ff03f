//! Tagged union over every algorithm, plus its JSON configuration.

use crate::baseline::{BaselineOnly, BaselineOptions};
use crate::error::{PredictionImpossible, Result};
use crate::knn::{Knn, KnnOptions};
use crate::prediction::Estimate;
use crate::svd::{Svd, SvdOptions};
use crate::traits::PredictionAlgorithm;
use dataset::{InnerIid, InnerUid, Trainset};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Any supported algorithm
///
/// This is what the evaluation harness clones per fold.
#[derive(Debug, Clone)]
pub enum Algorithm {
    Baseline(BaselineOnly),
    Knn(Knn),
    Svd(Svd),
}

impl From<BaselineOnly> for Algorithm {
    fn from(algo: BaselineOnly) -> Self {
        Self::Baseline(algo)
    }
}

impl From<Knn> for Algorithm {
    fn from(algo: Knn) -> Self {
        Self::Knn(algo)
    }
}

impl From<Svd> for Algorithm {
    fn from(algo: Svd) -> Self {
        Self::Svd(algo)
    }
}

impl PredictionAlgorithm for Algorithm {
    fn name(&self) -> &str {
        match self {
            Self::Baseline(a) => a.name(),
            Self::Knn(a) => a.name(),
            Self::Svd(a) => a.name(),
        }
    }

    fn fit(&mut self, trainset: Arc<Trainset>) -> Result<&mut Self> {
        match self {
            Self::Baseline(a) => {
                a.fit(trainset)?;
            }
            Self::Knn(a) => {
                a.fit(trainset)?;
            }
            Self::Svd(a) => {
                a.fit(trainset)?;
            }
        }
        Ok(self)
    }

    fn trainset(&self) -> Option<&Arc<Trainset>> {
        match self {
            Self::Baseline(a) => a.trainset(),
            Self::Knn(a) => a.trainset(),
            Self::Svd(a) => a.trainset(),
        }
    }

    fn estimate(
        &self,
        u: InnerUid,
        i: InnerIid,
    ) -> std::result::Result<Estimate, PredictionImpossible> {
        match self {
            Self::Baseline(a) => a.estimate(u, i),
            Self::Knn(a) => a.estimate(u, i),
            Self::Svd(a) => a.estimate(u, i),
        }
    }
}

/// Serializable description of an unfitted algorithm
///
/// ```json
/// {"algorithm": "knn", "k": 20, "variant": "with_means", "sim": {"name": "pearson"}}
/// {"algorithm": "svd", "n_factors": 50, "seed": 7}
/// {"algorithm": "baseline", "baseline": {"method": "sgd"}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum AlgorithmConfig {
    Baseline {
        #[serde(default)]
        baseline: BaselineOptions,
    },
    Knn(KnnOptions),
    Svd(SvdOptions),
}

impl Default for AlgorithmConfig {
    fn default() -> Self {
        Self::Svd(SvdOptions::default())
    }
}

impl AlgorithmConfig {
    pub fn build(&self) -> Algorithm {
        match self {
            Self::Baseline { baseline } => BaselineOnly::new(baseline.clone()).into(),
            Self::Knn(options) => Knn::new(options.clone()).into(),
            Self::Svd(options) => Svd::new(options.clone()).into(),
        }
    }
}
