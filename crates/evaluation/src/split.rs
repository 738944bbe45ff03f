//! Train/test splitters.
//!
//! A split yields [`Fold`]s of indices into the caller's rating slice, so
//! folds stay cheap and the harness builds each trainset on demand.
//! Every splitter owns a `StdRng` seeded from its `seed`: the same seed on
//! the same input always yields the same folds.

use crate::error::{EvalError, Result};
use dataset::Rating;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// One train/test partition, as indices into the full rating set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub index: usize,
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

impl Fold {
    /// Materialize the test ratings of this fold
    pub fn testset(&self, ratings: &[Rating]) -> Vec<Rating> {
        self.test.iter().map(|&idx| ratings[idx].clone()).collect()
    }

    /// Borrow the train ratings of this fold
    pub fn train_ratings<'a>(&'a self, ratings: &'a [Rating]) -> impl Iterator<Item = &'a Rating> {
        self.train.iter().map(move |&idx| &ratings[idx])
    }
}

/// Anything that partitions a rating set into folds
pub trait Splitter {
    fn split(&self, ratings: &[Rating]) -> Result<Vec<Fold>>;
}

fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

// =============================================================================
// KFold
// =============================================================================

/// Partition the ratings into `n_folds` disjoint test sets
///
/// Fold sizes differ by at most one: the first `n % n_folds` folds take
/// the extra ratings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KFold {
    pub n_folds: usize,
    pub shuffle: bool,
    pub seed: Option<u64>,
}

impl Default for KFold {
    fn default() -> Self {
        Self {
            n_folds: 5,
            shuffle: true,
            seed: None,
        }
    }
}

impl KFold {
    pub fn new(n_folds: usize) -> Self {
        Self {
            n_folds,
            ..Self::default()
        }
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

impl Splitter for KFold {
    fn split(&self, ratings: &[Rating]) -> Result<Vec<Fold>> {
        let n = ratings.len();
        let k = self.n_folds;
        if k < 2 || k > n {
            return Err(EvalError::InvalidSplit(format!(
                "n_folds must be between 2 and the number of ratings ({}), got {}",
                n, k
            )));
        }

        let mut order: Vec<usize> = (0..n).collect();
        if self.shuffle {
            order.shuffle(&mut make_rng(self.seed));
        }

        let (base, extra) = (n / k, n % k);
        let mut start = 0;
        let folds = (0..k)
            .map(|index| {
                let stop = start + base + usize::from(index < extra);
                let test = order[start..stop].to_vec();
                let train = order[..start]
                    .iter()
                    .chain(&order[stop..])
                    .copied()
                    .collect();
                start = stop;
                Fold { index, train, test }
            })
            .collect();

        debug!("Split {} ratings into {} folds", n, k);
        Ok(folds)
    }
}

// =============================================================================
// ShuffleSplit
// =============================================================================

/// Size of the test set of a [`ShuffleSplit`]
///
/// In JSON an integer is a count and a float is a fraction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TestSize {
    Count(usize),
    Fraction(f64),
}

impl TestSize {
    fn resolve(self, n: usize) -> Result<usize> {
        let count = match self {
            Self::Fraction(f) if f > 0.0 && f < 1.0 => (f * n as f64).ceil() as usize,
            Self::Fraction(f) => {
                return Err(EvalError::InvalidSplit(format!(
                    "test fraction must be in (0, 1), got {}",
                    f
                )));
            }
            Self::Count(c) => c,
        };
        if count == 0 || count >= n {
            return Err(EvalError::InvalidSplit(format!(
                "test size must leave at least one rating on each side, got {} of {}",
                count, n
            )));
        }
        Ok(count)
    }
}

/// Random train/test splits with a fixed test size
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShuffleSplit {
    pub n_splits: usize,
    pub test_size: TestSize,
    pub seed: Option<u64>,
}

impl Default for ShuffleSplit {
    fn default() -> Self {
        Self {
            n_splits: 1,
            test_size: TestSize::Fraction(0.2),
            seed: None,
        }
    }
}

impl ShuffleSplit {
    pub fn new(test_size: TestSize) -> Self {
        Self {
            test_size,
            ..Self::default()
        }
    }

    pub fn with_n_splits(mut self, n_splits: usize) -> Self {
        self.n_splits = n_splits;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

impl Splitter for ShuffleSplit {
    fn split(&self, ratings: &[Rating]) -> Result<Vec<Fold>> {
        if self.n_splits == 0 {
            return Err(EvalError::InvalidSplit("n_splits must be at least 1".into()));
        }
        let n = ratings.len();
        let n_test = self.test_size.resolve(n)?;

        let mut rng = make_rng(self.seed);
        let mut order: Vec<usize> = (0..n).collect();
        let folds = (0..self.n_splits)
            .map(|index| {
                order.shuffle(&mut rng);
                Fold {
                    index,
                    test: order[..n_test].to_vec(),
                    train: order[n_test..].to_vec(),
                }
            })
            .collect();
        Ok(folds)
    }
}

// =============================================================================
// LeaveOneOut
// =============================================================================

/// Hold out one random rating of every user per fold
///
/// Users with `min_n_ratings` ratings or fewer are left out of the fold
/// entirely, so every user in a trainset keeps at least `min_n_ratings`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaveOneOut {
    pub n_splits: usize,
    pub seed: Option<u64>,
    pub min_n_ratings: usize,
}

impl Default for LeaveOneOut {
    fn default() -> Self {
        Self {
            n_splits: 5,
            seed: None,
            min_n_ratings: 0,
        }
    }
}

impl LeaveOneOut {
    pub fn new(n_splits: usize) -> Self {
        Self {
            n_splits,
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_min_n_ratings(mut self, min_n_ratings: usize) -> Self {
        self.min_n_ratings = min_n_ratings;
        self
    }
}

impl Splitter for LeaveOneOut {
    fn split(&self, ratings: &[Rating]) -> Result<Vec<Fold>> {
        if self.n_splits == 0 {
            return Err(EvalError::InvalidSplit("n_splits must be at least 1".into()));
        }

        // users in first-appearance order so folds don't depend on hashing
        let mut slots: HashMap<&str, usize> = HashMap::new();
        let mut by_user: Vec<Vec<usize>> = Vec::new();
        for (idx, rating) in ratings.iter().enumerate() {
            let slot = *slots.entry(rating.user.as_str()).or_insert_with(|| {
                by_user.push(Vec::new());
                by_user.len() - 1
            });
            by_user[slot].push(idx);
        }

        let mut rng = make_rng(self.seed);
        let mut folds = Vec::with_capacity(self.n_splits);
        for index in 0..self.n_splits {
            let (mut train, mut test) = (Vec::new(), Vec::new());
            for user_ratings in by_user.iter().filter(|r| r.len() > self.min_n_ratings) {
                let held_out = rng.random_range(0..user_ratings.len());
                for (pos, &idx) in user_ratings.iter().enumerate() {
                    if pos == held_out {
                        test.push(idx);
                    } else {
                        train.push(idx);
                    }
                }
            }

            if train.is_empty() {
                return Err(EvalError::InvalidSplit(format!(
                    "no trainset left with min_n_ratings = {}",
                    self.min_n_ratings
                )));
            }
            folds.push(Fold { index, train, test });
        }
        Ok(folds)
    }
}

// =============================================================================
// Split
// =============================================================================

/// Any splitter, as loaded from configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Split {
    #[serde(rename = "kfold")]
    KFold(KFold),
    ShuffleSplit(ShuffleSplit),
    LeaveOneOut(LeaveOneOut),
}

impl Default for Split {
    fn default() -> Self {
        Self::KFold(KFold::default())
    }
}

impl From<KFold> for Split {
    fn from(split: KFold) -> Self {
        Self::KFold(split)
    }
}

impl From<ShuffleSplit> for Split {
    fn from(split: ShuffleSplit) -> Self {
        Self::ShuffleSplit(split)
    }
}

impl From<LeaveOneOut> for Split {
    fn from(split: LeaveOneOut) -> Self {
        Self::LeaveOneOut(split)
    }
}

impl Splitter for Split {
    fn split(&self, ratings: &[Rating]) -> Result<Vec<Fold>> {
        match self {
            Self::KFold(s) => s.split(ratings),
            Self::ShuffleSplit(s) => s.split(ratings),
            Self::LeaveOneOut(s) => s.split(ratings),
        }
    }
}
