//! Trainset building and indexing logic.
//!
//! A [`Trainset`] is the sparse rating matrix of one fold:
//! - raw user/item ids are mapped to dense inner ids (first-seen order)
//! - ratings are indexed by user (`ur`) and by item (`ir`)
//! - the global mean and the rating scale are computed once
//!
//! The trainset is immutable after [`Trainset::build`]. Algorithms share it
//! through an `Arc<Trainset>` and drop it with the fold.

use crate::error::{DatasetError, Result};
use crate::types::{IdMap, InnerIid, InnerUid, Rating, RatingScale};
use tracing::debug;

/// Immutable sparse-matrix view over the ratings of one fold
#[derive(Debug, Clone)]
pub struct Trainset {
    users: IdMap,
    items: IdMap,

    /// Ratings made by each user: `ur[u] = [(i, r), ...]`
    ur: Vec<Vec<(InnerIid, f64)>>,
    /// Ratings received by each item: `ir[i] = [(u, r), ...]`
    ir: Vec<Vec<(InnerUid, f64)>>,
    /// Insertion-ordered triples backing `all_ratings`
    ratings: Vec<(InnerUid, InnerIid, f64)>,

    rating_scale: RatingScale,
    global_mean: f64,
}

impl Trainset {
    /// Build a trainset from raw ratings
    ///
    /// Fails with [`DatasetError::Empty`] on zero ratings and with
    /// [`DatasetError::InvalidRating`] when a value is not finite or falls
    /// outside `rating_scale`.
    pub fn build<'a, I>(ratings: I, rating_scale: RatingScale) -> Result<Self>
    where
        I: IntoIterator<Item = &'a Rating>,
    {
        let mut users = IdMap::new();
        let mut items = IdMap::new();
        let mut ur: Vec<Vec<(InnerIid, f64)>> = Vec::new();
        let mut ir: Vec<Vec<(InnerUid, f64)>> = Vec::new();
        let mut triples = Vec::new();
        let mut total = 0.0;

        for rating in ratings {
            validate(rating, &rating_scale)?;

            let u = users.get_or_insert(&rating.user);
            let i = items.get_or_insert(&rating.item);
            if u == ur.len() {
                ur.push(Vec::new());
            }
            if i == ir.len() {
                ir.push(Vec::new());
            }

            ur[u].push((i, rating.rating));
            ir[i].push((u, rating.rating));
            triples.push((u, i, rating.rating));
            total += rating.rating;
        }

        if triples.is_empty() {
            return Err(DatasetError::Empty);
        }

        let global_mean = total / triples.len() as f64;
        debug!(
            n_users = users.len(),
            n_items = items.len(),
            n_ratings = triples.len(),
            global_mean,
            "Built trainset"
        );

        Ok(Self {
            users,
            items,
            ur,
            ir,
            ratings: triples,
            rating_scale,
            global_mean,
        })
    }

    // Sizes and scalars

    pub fn n_users(&self) -> usize {
        self.users.len()
    }

    pub fn n_items(&self) -> usize {
        self.items.len()
    }

    pub fn n_ratings(&self) -> usize {
        self.ratings.len()
    }

    /// Arithmetic mean of every rating, computed once at build time
    pub fn global_mean(&self) -> f64 {
        self.global_mean
    }

    pub fn rating_scale(&self) -> RatingScale {
        self.rating_scale
    }

    // Id conversion

    /// Convert a raw user id into its inner id
    pub fn to_inner_uid(&self, raw: &str) -> Result<InnerUid> {
        self.users
            .inner(raw)
            .ok_or_else(|| DatasetError::UnknownUser(raw.to_string()))
    }

    /// Convert a raw item id into its inner id
    pub fn to_inner_iid(&self, raw: &str) -> Result<InnerIid> {
        self.items
            .inner(raw)
            .ok_or_else(|| DatasetError::UnknownItem(raw.to_string()))
    }

    pub fn to_raw_uid(&self, inner: InnerUid) -> Result<&str> {
        self.users.raw(inner).ok_or(DatasetError::InnerIdOutOfRange {
            id: inner,
            len: self.users.len(),
        })
    }

    pub fn to_raw_iid(&self, inner: InnerIid) -> Result<&str> {
        self.items.raw(inner).ok_or(DatasetError::InnerIdOutOfRange {
            id: inner,
            len: self.items.len(),
        })
    }

    pub fn knows_user(&self, u: InnerUid) -> bool {
        u < self.n_users()
    }

    pub fn knows_item(&self, i: InnerIid) -> bool {
        i < self.n_items()
    }

    // Rating access

    /// Ratings made by user `u`; empty for an unknown id
    pub fn user_ratings(&self, u: InnerUid) -> &[(InnerIid, f64)] {
        self.ur.get(u).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Ratings received by item `i`; empty for an unknown id
    pub fn item_ratings(&self, i: InnerIid) -> &[(InnerUid, f64)] {
        self.ir.get(i).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Per-user index, `ur[u] = [(i, r), ...]`
    pub fn ur(&self) -> &[Vec<(InnerIid, f64)>] {
        &self.ur
    }

    /// Per-item index, `ir[i] = [(u, r), ...]`
    pub fn ir(&self) -> &[Vec<(InnerUid, f64)>] {
        &self.ir
    }

    /// Every `(u, i, r)` triple in insertion order
    ///
    /// The iterator borrows the trainset, so calling this again restarts it.
    pub fn all_ratings(&self) -> impl Iterator<Item = (InnerUid, InnerIid, f64)> + '_ {
        self.ratings.iter().copied()
    }

    pub fn all_users(&self) -> std::ops::Range<InnerUid> {
        0..self.n_users()
    }

    pub fn all_items(&self) -> std::ops::Range<InnerIid> {
        0..self.n_items()
    }

    /// Mean rating given by user `u`, or `None` when `u` is unknown
    pub fn user_mean(&self, u: InnerUid) -> Option<f64> {
        mean(self.user_ratings(u).iter().map(|&(_, r)| r))
    }

    /// Mean rating received by item `i`, or `None` when `i` is unknown
    pub fn item_mean(&self, i: InnerIid) -> Option<f64> {
        mean(self.item_ratings(i).iter().map(|&(_, r)| r))
    }

    // Testset builders

    /// Every training rating, as raw ratings
    ///
    /// Useful to measure how well an algorithm fits its own training data.
    pub fn build_testset(&self) -> Vec<Rating> {
        self.ratings
            .iter()
            .filter_map(|&(u, i, r)| {
                let user = self.users.raw(u)?;
                let item = self.items.raw(i)?;
                Some(Rating::new(user, item, r))
            })
            .collect()
    }

    /// Every (user, item) pair that is *not* in the trainset
    ///
    /// `fill` is used as the placeholder true rating; it defaults to the
    /// global mean. Predicting on this set yields top-N candidates.
    pub fn build_anti_testset(&self, fill: Option<f64>) -> Vec<Rating> {
        let mut seen = vec![false; self.n_items()];
        let mut anti = Vec::new();
        for u in self.all_users() {
            self.push_unrated(u, fill, &mut seen, &mut anti);
        }
        anti
    }

    /// The items user `u` has not rated, as raw ratings filled like
    /// [`Trainset::build_anti_testset`]
    pub fn build_user_anti_testset(
        &self,
        u: InnerUid,
        fill: Option<f64>,
    ) -> Result<Vec<Rating>> {
        if !self.knows_user(u) {
            return Err(DatasetError::InnerIdOutOfRange {
                id: u,
                len: self.n_users(),
            });
        }
        let mut seen = vec![false; self.n_items()];
        let mut anti = Vec::new();
        self.push_unrated(u, fill, &mut seen, &mut anti);
        Ok(anti)
    }

    /// Append the unrated items of `u` to `out`; `seen` is all false on
    /// entry and on return
    fn push_unrated(
        &self,
        u: InnerUid,
        fill: Option<f64>,
        seen: &mut [bool],
        out: &mut Vec<Rating>,
    ) {
        let fill = fill.unwrap_or(self.global_mean);
        let rated = &self.ur[u];
        for &(i, _) in rated {
            seen[i] = true;
        }
        if let Some(user) = self.users.raw(u) {
            for i in self.all_items().filter(|&i| !seen[i]) {
                if let Some(item) = self.items.raw(i) {
                    out.push(Rating::new(user, item, fill));
                }
            }
        }
        for &(i, _) in rated {
            seen[i] = false;
        }
    }
}

fn validate(rating: &Rating, scale: &RatingScale) -> Result<()> {
    let reason = if !rating.rating.is_finite() {
        "rating is not a finite number".to_string()
    } else if !scale.contains(rating.rating) {
        format!("outside of scale [{}, {}]", scale.lower, scale.upper)
    } else {
        return Ok(());
    };

    Err(DatasetError::InvalidRating {
        user: rating.user.clone(),
        item: rating.item.clone(),
        value: rating.rating,
        reason,
    })
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), r| (s + r, c + 1));
    (count > 0).then(|| sum / count as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_ratings() -> Vec<Rating> {
        vec![
            Rating::new("A", "x", 4.0),
            Rating::new("A", "y", 2.0),
            Rating::new("B", "x", 5.0),
            Rating::new("B", "y", 1.0),
        ]
    }

    #[test]
    fn test_build_assigns_dense_ids() {
        let trainset = Trainset::build(&toy_ratings(), RatingScale::default()).unwrap();

        assert_eq!(trainset.n_users(), 2);
        assert_eq!(trainset.n_items(), 2);
        assert_eq!(trainset.n_ratings(), 4);
        assert_eq!(trainset.to_inner_uid("A").unwrap(), 0);
        assert_eq!(trainset.to_inner_uid("B").unwrap(), 1);
        assert_eq!(trainset.to_inner_iid("y").unwrap(), 1);
        assert_eq!(trainset.to_raw_iid(0).unwrap(), "x");
    }

    #[test]
    fn test_global_mean() {
        let trainset = Trainset::build(&toy_ratings(), RatingScale::default()).unwrap();
        assert!((trainset.global_mean() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_ratings_fail() {
        let result = Trainset::build(&Vec::<Rating>::new(), RatingScale::default());
        assert_eq!(result.unwrap_err(), DatasetError::Empty);
    }

    #[test]
    fn test_out_of_scale_rating_fails() {
        let ratings = vec![Rating::new("A", "x", 7.0)];
        let result = Trainset::build(&ratings, RatingScale::default());
        assert!(matches!(result, Err(DatasetError::InvalidRating { .. })));
    }

    #[test]
    fn test_unknown_ids() {
        let trainset = Trainset::build(&toy_ratings(), RatingScale::default()).unwrap();
        assert_eq!(
            trainset.to_inner_uid("C"),
            Err(DatasetError::UnknownUser("C".to_string()))
        );
        assert_eq!(
            trainset.to_inner_iid("z"),
            Err(DatasetError::UnknownItem("z".to_string()))
        );
    }

    #[test]
    fn test_indexes_agree() {
        let trainset = Trainset::build(&toy_ratings(), RatingScale::default()).unwrap();

        assert_eq!(trainset.user_ratings(0), &[(0, 4.0), (1, 2.0)]);
        assert_eq!(trainset.item_ratings(0), &[(0, 4.0), (1, 5.0)]);
        assert!(trainset.user_ratings(42).is_empty());
    }

    #[test]
    fn test_all_ratings_is_restartable() {
        let trainset = Trainset::build(&toy_ratings(), RatingScale::default()).unwrap();

        let first: Vec<_> = trainset.all_ratings().collect();
        let second: Vec<_> = trainset.all_ratings().collect();
        assert_eq!(first, second);
        assert_eq!(first[2], (1, 0, 5.0));
    }

    #[test]
    fn test_anti_testset() {
        let ratings = vec![
            Rating::new("A", "x", 4.0),
            Rating::new("B", "y", 2.0),
        ];
        let trainset = Trainset::build(&ratings, RatingScale::default()).unwrap();
        let anti = trainset.build_anti_testset(None);

        assert_eq!(anti.len(), 2);
        assert_eq!(anti[0], Rating::new("A", "y", 3.0));
        assert_eq!(anti[1], Rating::new("B", "x", 3.0));
    }

    #[test]
    fn test_user_anti_testset_matches_full_anti_testset() {
        let ratings = vec![
            Rating::new("A", "x", 4.0),
            Rating::new("B", "y", 2.0),
            Rating::new("B", "z", 5.0),
        ];
        let trainset = Trainset::build(&ratings, RatingScale::default()).unwrap();
        let full = trainset.build_anti_testset(Some(1.5));

        let mut per_user = Vec::new();
        for u in trainset.all_users() {
            per_user.extend(trainset.build_user_anti_testset(u, Some(1.5)).unwrap());
        }
        assert_eq!(per_user, full);

        let b = trainset.to_inner_uid("B").unwrap();
        assert_eq!(
            trainset.build_user_anti_testset(b, None).unwrap(),
            vec![Rating::new("B", "x", trainset.global_mean())]
        );
        assert!(matches!(
            trainset.build_user_anti_testset(7, None),
            Err(DatasetError::InnerIdOutOfRange { id: 7, len: 2 })
        ));
    }

    #[test]
    fn test_means() {
        let trainset = Trainset::build(&toy_ratings(), RatingScale::default()).unwrap();
        assert_eq!(trainset.user_mean(0), Some(3.0));
        assert_eq!(trainset.item_mean(0), Some(4.5));
        assert_eq!(trainset.item_mean(9), None);
    }
}
