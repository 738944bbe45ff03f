//! # Dataset Crate
//!
//! Ratings in, sparse rating matrix out.
//!
//! ## Main Components
//!
//! - **types**: `Rating`, `RatingScale`, raw/inner id aliases and the `IdMap` table
//! - **trainset**: `Trainset`, the immutable per-fold rating matrix
//! - **reader**: parse delimited rating files into `Rating` values
//! - **error**: `DatasetError`
//!
//! ## Example Usage
//!
//! ```ignore
//! use dataset::{Rating, RatingScale, Trainset};
//!
//! let ratings = vec![
//!     Rating::new("alice", "matrix", 5.0),
//!     Rating::new("bob", "matrix", 3.0),
//! ];
//! let trainset = Trainset::build(&ratings, RatingScale::default())?;
//!
//! let u = trainset.to_inner_uid("alice")?;
//! println!("alice rated {} items", trainset.user_ratings(u).len());
//! ```

// Public modules
pub mod error;
pub mod types;
pub mod trainset;
pub mod reader;

// Re-export commonly used types for convenience
pub use error::{DatasetError, Result};
pub use reader::{read_ratings, Field, ReaderFormat};
pub use trainset::Trainset;
pub use types::{IdMap, InnerIid, InnerUid, Rating, RatingScale, RawId};
