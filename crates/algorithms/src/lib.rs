//! Rating-prediction algorithms trained on a [`dataset::Trainset`].
//!
//! This crate provides:
//! - `PredictionAlgorithm` trait with the shared raw-id `predict` path
//! - Baseline biases (ALS and SGD) and the `BaselineOnly` predictor
//! - Pairwise similarity matrices (cosine, MSD, Pearson, Pearson-baseline)
//! - kNN predictors (basic, mean-centered, baseline-centered)
//! - SVD-style matrix factorization
//!
//! ## Example Usage
//! ```ignore
//! use algorithms::{Knn, KnnOptions, PredictionAlgorithm, SimilarityOptions};
//! use algorithms::similarity::SimilarityMeasure;
//!
//! let options = KnnOptions::default()
//!     .with_k(20)
//!     .with_sim(SimilarityOptions::new(SimilarityMeasure::Pearson).with_user_based(false));
//!
//! let mut knn = Knn::new(options);
//! let pred = knn.fit(trainset.clone())?.predict("196", "242", Some(3.0))?;
//! println!("{}", pred);
//! ```

pub mod algorithm;
pub mod baseline;
pub mod error;
pub mod knn;
pub mod prediction;
pub mod similarity;
pub mod svd;
pub mod traits;

// Re-export main types
pub use algorithm::{Algorithm, AlgorithmConfig};
pub use baseline::{compute_baselines, BaselineOnly, BaselineOptions, Biases};
pub use error::{AlgoError, PredictionImpossible, Result};
pub use knn::{Knn, KnnOptions, KnnVariant};
pub use prediction::{Details, Estimate, Prediction};
pub use similarity::{SimilarityMatrix, SimilarityMeasure, SimilarityOptions};
pub use svd::{Svd, SvdModel, SvdOptions};
pub use traits::PredictionAlgorithm;
