//! Integration tests for the algorithms.
//!
//! These tests fit every algorithm on the same small but realistic
//! rating matrix and check that they agree on the obvious cases.

use algorithms::{
    AlgoError, Algorithm, AlgorithmConfig, BaselineOnly, BaselineOptions, Knn, KnnOptions,
    KnnVariant, PredictionAlgorithm, SimilarityMeasure, SimilarityOptions, Svd, SvdOptions,
};
use dataset::{Rating, RatingScale, Trainset};
use std::sync::Arc;

/// Two taste clusters: users 0-4 like items a*, users 5-9 like items b*
fn create_test_trainset() -> Arc<Trainset> {
    let mut ratings = Vec::new();
    for u in 0..10 {
        let likes_a = u < 5;
        for (n, item) in ["a0", "a1", "a2", "b0", "b1", "b2"].iter().enumerate() {
            // leave a hole per user so there is something to predict
            if n == u % 6 {
                continue;
            }
            let is_a = item.starts_with('a');
            let rating = if is_a == likes_a { 5.0 } else { 1.0 };
            ratings.push(Rating::new(format!("u{}", u), *item, rating));
        }
    }
    Arc::new(Trainset::build(&ratings, RatingScale::default()).unwrap())
}

fn all_algorithms() -> Vec<Algorithm> {
    vec![
        BaselineOnly::default().into(),
        Knn::default().into(),
        Knn::new(KnnOptions::default().with_variant(KnnVariant::WithMeans)).into(),
        Knn::new(
            KnnOptions::default()
                .with_variant(KnnVariant::Baseline)
                .with_sim(SimilarityOptions::new(SimilarityMeasure::PearsonBaseline)),
        )
        .into(),
        Knn::new(
            KnnOptions::default()
                .with_sim(
                    SimilarityOptions::new(SimilarityMeasure::Pearson).with_user_based(false),
                ),
        )
        .into(),
        Svd::new(SvdOptions::default().with_n_factors(5).with_seed(42)).into(),
    ]
}

#[test]
fn test_every_algorithm_predicts_within_scale() {
    let trainset = create_test_trainset();

    for mut algo in all_algorithms() {
        algo.fit(trainset.clone()).unwrap();
        for u in 0..10 {
            let pred = algo.predict(&format!("u{}", u), "a0", None).unwrap();
            assert!(
                (1.0..=5.0).contains(&pred.est),
                "{} predicted {} out of scale",
                algo.name(),
                pred.est
            );
        }
    }
}

#[test]
fn test_neighborhood_recovers_clusters() {
    let trainset = create_test_trainset();
    // u0 never rated a0; its cluster loves a0
    let mut knn = Knn::new(KnnOptions::default().with_k(4));
    let pred = knn.fit(trainset.clone()).unwrap().predict("u0", "a0", None).unwrap();
    assert!(!pred.was_impossible());
    assert!(pred.est > 4.0, "expected a high rating, got {}", pred.est);
    assert!(pred.details.actual_k.unwrap() <= 4);

    // u9 is in the other cluster and never rated b0
    let pred = knn.predict("u9", "b0", None).unwrap();
    assert!(pred.est > 4.0, "expected a high rating, got {}", pred.est);
}

#[test]
fn test_cold_start_is_flagged_everywhere() {
    let trainset = create_test_trainset();

    for mut algo in all_algorithms() {
        algo.fit(trainset.clone()).unwrap();

        let unknown_item = algo.predict("u0", "zz", Some(3.0)).unwrap();
        assert!(unknown_item.was_impossible());
        assert_eq!(unknown_item.est, trainset.rating_scale().clip(trainset.global_mean()));

        let unknown_user = algo.predict("nobody", "a0", None).unwrap();
        assert!(unknown_user.was_impossible());
    }
}

#[test]
fn test_refit_on_a_new_trainset_discards_old_state() {
    let first = create_test_trainset();
    let second = Arc::new(
        Trainset::build(
            &[Rating::new("x", "only", 2.0), Rating::new("y", "only", 4.0)],
            RatingScale::default(),
        )
        .unwrap(),
    );

    let mut algo = BaselineOnly::new(BaselineOptions::sgd());
    algo.fit(first).unwrap();
    assert!(!algo.predict("u1", "a1", None).unwrap().was_impossible());

    algo.fit(second).unwrap();
    assert!(algo.predict("u1", "a1", None).unwrap().was_impossible());
    assert_eq!(algo.biases().unwrap().bu.len(), 2);
}

#[test]
fn test_failed_fit_leaves_algorithm_unfit() {
    let mut broken = Knn::new(KnnOptions::default().with_k(0));
    assert!(broken.fit(create_test_trainset()).is_err());
    assert!(matches!(
        broken.predict("u0", "a0", None),
        Err(AlgoError::NotFitted { .. })
    ));
}

#[test]
fn test_testset_round_trip_through_config() {
    let trainset = create_test_trainset();
    let config: AlgorithmConfig = serde_json::from_str(
        r#"{"algorithm": "knn", "k": 3, "variant": "baseline",
            "baseline": {"method": "als", "n_epochs": 5}}"#,
    )
    .unwrap();

    let mut algo = config.build();
    algo.fit(trainset.clone()).unwrap();
    let testset = trainset.build_testset();
    let predictions = algo.test(&testset).unwrap();

    assert_eq!(predictions.len(), trainset.n_ratings());
    assert!(predictions.iter().all(|p| p.r_true.is_some()));
}
