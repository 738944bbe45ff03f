//! Error types for the dataset crate.
//!
//! Everything that can go wrong while reading ratings or building a
//! [`Trainset`](crate::Trainset) ends up in [`DatasetError`].

use thiserror::Error;

/// Errors raised while reading ratings or building a trainset
///
/// `Empty`, `InvalidRating` and `InvalidScale` are setup defects and are
/// fatal. `UnknownUser` / `UnknownItem` are ordinary cold-start misses:
/// prediction algorithms catch them and turn them into an impossible
/// prediction instead of failing.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DatasetError {
    /// No ratings were supplied
    #[error("Cannot build a trainset from zero ratings")]
    Empty,

    /// A rating value is not finite or lies outside the declared scale
    #[error("Invalid rating {value} for user {user} and item {item}: {reason}")]
    InvalidRating {
        user: String,
        item: String,
        value: f64,
        reason: String,
    },

    /// Rating scale bounds are not ordered
    #[error("Invalid rating scale [{lower}, {upper}]")]
    InvalidScale { lower: f64, upper: f64 },

    /// Raw user id was never observed in this trainset
    #[error("User {0} is not part of the trainset")]
    UnknownUser(String),

    /// Raw item id was never observed in this trainset
    #[error("Item {0} is not part of the trainset")]
    UnknownItem(String),

    /// Inner id is out of range
    #[error("Inner id {id} is out of range (have {len})")]
    InnerIdOutOfRange { id: usize, len: usize },

    /// I/O error occurred while reading a ratings file
    ///
    /// Stored as a message so the error stays `Clone`.
    #[error("I/O error on {path}: {reason}")]
    Io { path: String, reason: String },

    /// Line in a ratings file couldn't be parsed
    #[error("Parse error at line {line} in {file}: {reason}")]
    Parse {
        file: String,
        line: usize,
        reason: String,
    },
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, DatasetError>;
