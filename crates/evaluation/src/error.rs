//! Error types for the evaluation harness.

use crate::accuracy::Measure;
use algorithms::AlgoError;
use dataset::DatasetError;
use thiserror::Error;

/// Errors that abort an evaluation run
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    /// A fold's trainset could not be built
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    /// Fitting failed, or an unfit algorithm was asked to predict
    #[error(transparent)]
    Algorithm(#[from] AlgoError),

    /// The splitter cannot partition this dataset
    #[error("Invalid split: {0}")]
    InvalidSplit(String),

    /// Every prediction was impossible or lacked a true rating
    #[error("No usable predictions to compute {measure}")]
    NoPredictions { measure: Measure },
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, EvalError>;
