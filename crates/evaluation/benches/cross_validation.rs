//! Benchmarks for cross-validation
//!
//! Run with: cargo bench --package evaluation
//!
//! Uses a synthetic 200 x 100 rating matrix so no dataset download is needed.

use algorithms::{
    Knn, KnnOptions, SimilarityMatrix, SimilarityMeasure, SimilarityOptions, Svd, SvdOptions,
};
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use dataset::{Rating, RatingScale, Trainset};
use evaluation::{CrossValidation, KFold};

fn synthetic_ratings() -> Vec<Rating> {
    let mut ratings = Vec::new();
    for u in 0..200 {
        for i in 0..100 {
            if (u * 31 + i * 17) % 5 != 0 {
                continue;
            }
            let r = ((u * 7 + i * 11) % 5 + 1) as f64;
            ratings.push(Rating::new(format!("u{}", u), format!("i{}", i), r));
        }
    }
    ratings
}

fn bench_similarity_matrix(c: &mut Criterion) {
    let ratings = synthetic_ratings();
    let trainset =
        Trainset::build(&ratings, RatingScale::default()).expect("Failed to build trainset");
    let options = SimilarityOptions::new(SimilarityMeasure::Pearson);

    c.bench_function("pearson_user_similarity", |b| {
        b.iter(|| {
            let sim = SimilarityMatrix::compute(black_box(&trainset), &options, None).unwrap();
            black_box(sim)
        })
    });
}

fn bench_knn_cross_validation(c: &mut Criterion) {
    let ratings = synthetic_ratings();
    let cv = CrossValidation::new(KFold::new(5).with_seed(1)).with_parallel(true);
    let knn = Knn::new(KnnOptions::default());

    c.bench_function("knn_5fold", |b| {
        b.iter(|| {
            let report = cv.run(black_box(&knn), &ratings).unwrap();
            black_box(report)
        })
    });
}

fn bench_svd_cross_validation(c: &mut Criterion) {
    let ratings = synthetic_ratings();
    let cv = CrossValidation::new(KFold::new(5).with_seed(1)).with_parallel(true);
    let svd = Svd::new(SvdOptions::default().with_n_factors(20).with_seed(1));

    c.bench_function("svd_5fold", |b| {
        b.iter(|| {
            let report = cv.run(black_box(&svd), &ratings).unwrap();
            black_box(report)
        })
    });
}

criterion_group!(
    benches,
    bench_similarity_matrix,
    bench_knn_cross_validation,
    bench_svd_cross_validation
);
criterion_main!(benches);
