//! Evaluation harness for rating-prediction algorithms.
//!
//! This crate provides:
//! - Splitters (k-fold, shuffle split, leave-one-out) producing index folds
//! - Accuracy measures (RMSE, MAE, MSE, FCP)
//! - `CrossValidation` to fit and score an algorithm on every fold
//!
//! ## Example Usage
//! ```ignore
//! use algorithms::{Svd, SvdOptions};
//! use evaluation::{CrossValidation, KFold, Measure};
//!
//! let cv = CrossValidation::new(KFold::new(5).with_seed(42))
//!     .with_measures([Measure::Rmse, Measure::Mae])
//!     .with_parallel(true);
//!
//! let report = cv.run(&Svd::new(SvdOptions::default().with_seed(42)), &ratings)?;
//! println!("RMSE {:.4}", report.mean_of(Measure::Rmse).unwrap_or(f64::NAN));
//! ```

pub mod accuracy;
pub mod error;
pub mod harness;
pub mod split;

// Re-export main types
pub use accuracy::{fcp, mae, mse, rmse, Measure};
pub use error::{EvalError, Result};
pub use harness::{top_n, train_test, CrossValidation, CvReport, FoldReport};
pub use split::{Fold, KFold, LeaveOneOut, ShuffleSplit, Split, Splitter, TestSize};
