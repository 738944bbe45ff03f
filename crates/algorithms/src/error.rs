//! Error types for the algorithms crate.

use dataset::DatasetError;
use thiserror::Error;

/// Errors surfaced by prediction algorithms
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AlgoError {
    /// `predict` was called before `fit`
    #[error("{algorithm} must be fitted before it can predict")]
    NotFitted { algorithm: String },

    /// A configuration value is out of its valid range
    #[error("Invalid option {option}: {reason}")]
    InvalidOption { option: String, reason: String },

    /// Trainset-level failure
    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

impl AlgoError {
    pub(crate) fn invalid_option(option: &str, reason: impl Into<String>) -> Self {
        Self::InvalidOption {
            option: option.to_string(),
            reason: reason.into(),
        }
    }
}

/// Raised by `estimate` when there is not enough evidence for a prediction
///
/// This never escapes `predict`: it is turned into `was_impossible = true`
/// with the reason recorded in the prediction details.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct PredictionImpossible(pub String);

impl PredictionImpossible {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, AlgoError>;
