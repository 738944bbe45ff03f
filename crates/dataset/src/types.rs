//! Core domain types shared by every crate in the workspace.
//!
//! - Type aliases for raw and inner identifiers
//! - [`Rating`], the immutable observation supplied by callers
//! - [`RatingScale`], the declared bounds used for validation and clipping
//! - [`IdMap`], the bidirectional raw ↔ inner id table

use crate::error::{DatasetError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// =============================================================================
// Type Aliases
// =============================================================================

/// Identifier of a user or item as supplied by the caller
///
/// Integer ids from a data file are kept in their decimal string form.
pub type RawId = String;

/// Dense user index in `[0, n_users)` within one trainset
pub type InnerUid = usize;

/// Dense item index in `[0, n_items)` within one trainset
pub type InnerIid = usize;

// =============================================================================
// Rating
// =============================================================================

/// A single (user, item, rating) observation
///
/// Ratings are never mutated once read. Trainsets and folds refer to them
/// by position in the caller's slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub user: RawId,
    pub item: RawId,
    pub rating: f64,
    /// Unix timestamp, when the source provides one
    pub timestamp: Option<i64>,
}

impl Rating {
    /// Create a rating without a timestamp
    pub fn new(user: impl Into<RawId>, item: impl Into<RawId>, rating: f64) -> Self {
        Self {
            user: user.into(),
            item: item.into(),
            rating,
            timestamp: None,
        }
    }

    /// Attach a timestamp (builder style)
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

// =============================================================================
// Rating Scale
// =============================================================================

/// Inclusive bounds of the rating scale, e.g. `[1, 5]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingScale {
    pub lower: f64,
    pub upper: f64,
}

impl RatingScale {
    /// Create a scale, rejecting unordered or non-finite bounds
    pub fn new(lower: f64, upper: f64) -> Result<Self> {
        if !lower.is_finite() || !upper.is_finite() || lower >= upper {
            return Err(DatasetError::InvalidScale { lower, upper });
        }
        Ok(Self { lower, upper })
    }

    /// Clip an estimate into the scale
    pub fn clip(&self, value: f64) -> f64 {
        value.clamp(self.lower, self.upper)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

impl Default for RatingScale {
    fn default() -> Self {
        Self {
            lower: 1.0,
            upper: 5.0,
        }
    }
}

// =============================================================================
// IdMap - raw <-> inner id table
// =============================================================================

/// Bidirectional mapping between raw ids and dense inner ids
///
/// Inner ids are handed out in first-seen order, so they always form the
/// contiguous range `[0, len)`.
#[derive(Debug, Clone, Default)]
pub struct IdMap {
    to_inner: HashMap<RawId, usize>,
    to_raw: Vec<RawId>,
}

impl IdMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the inner id for `raw`, assigning the next free one if unseen
    pub fn get_or_insert(&mut self, raw: &str) -> usize {
        if let Some(&inner) = self.to_inner.get(raw) {
            return inner;
        }
        let inner = self.to_raw.len();
        self.to_inner.insert(raw.to_string(), inner);
        self.to_raw.push(raw.to_string());
        inner
    }

    pub fn inner(&self, raw: &str) -> Option<usize> {
        self.to_inner.get(raw).copied()
    }

    pub fn raw(&self, inner: usize) -> Option<&str> {
        self.to_raw.get(inner).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.to_raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_raw.is_empty()
    }
}
