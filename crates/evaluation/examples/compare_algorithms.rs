//! Example: Compare algorithms on MovieLens 100k
//!
//! Run with: cargo run --release --package evaluation --example compare_algorithms
//!
//! This example shows how to:
//! 1. Load the MovieLens 100k ratings file
//! 2. Configure a baseline, two kNN variants and an SVD model
//! 3. Cross-validate all of them on the same 5 folds
//! 4. Display the results

use algorithms::{
    Algorithm, BaselineOnly, Knn, KnnOptions, KnnVariant, SimilarityMeasure, SimilarityOptions,
    Svd, SvdOptions,
};
use dataset::{ReaderFormat, read_ratings};
use evaluation::{CrossValidation, KFold, Measure};
use std::path::Path;
use std::time::Instant;

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .init();

    println!("=== Rating Prediction Comparison ===\n");

    // Load dataset
    println!("Loading MovieLens 100k ratings...");
    let start = Instant::now();
    let ratings = read_ratings(Path::new("data/ml-100k/u.data"), &ReaderFormat::ml_100k())?;
    println!("Loaded {} ratings in {:?}\n", ratings.len(), start.elapsed());

    let algorithms: Vec<Algorithm> = vec![
        BaselineOnly::default().into(),
        Knn::new(
            KnnOptions::default()
                .with_variant(KnnVariant::WithMeans)
                .with_sim(
                    SimilarityOptions::new(SimilarityMeasure::Pearson).with_user_based(false),
                ),
        )
        .into(),
        Knn::new(
            KnnOptions::default()
                .with_variant(KnnVariant::Baseline)
                .with_sim(SimilarityOptions::new(SimilarityMeasure::PearsonBaseline)),
        )
        .into(),
        Svd::new(SvdOptions::default().with_seed(42)).into(),
    ];

    let cv = CrossValidation::new(KFold::new(5).with_seed(42))
        .with_measures([Measure::Rmse, Measure::Mae, Measure::Fcp])
        .with_parallel(true);

    let start = Instant::now();
    let reports = cv.run_many(&algorithms, &ratings)?;
    println!("Cross-validated {} algorithms in {:?}\n", reports.len(), start.elapsed());

    println!("{:<14} {:>8} {:>8} {:>8} {:>10}", "Algorithm", "RMSE", "MAE", "FCP", "Fit time");
    for report in &reports {
        let show = |m: Measure| {
            report
                .mean_of(m)
                .map(|v| format!("{:.4}", v))
                .unwrap_or_else(|| "-".to_string())
        };
        println!(
            "{:<14} {:>8} {:>8} {:>8} {:>10.2?}",
            report.algorithm,
            show(Measure::Rmse),
            show(Measure::Mae),
            show(Measure::Fcp),
            report.total_fit_time()
        );
    }

    Ok(())
}
