//! Reader for delimited rating files.
//!
//! A [`ReaderFormat`] describes one line of the file, e.g.
//! `user item rating timestamp` separated by `'\t'` for MovieLens 100k or by
//! `"::"` for MovieLens 1M. Each non-empty line becomes one [`Rating`].
//!
//! Downloading or bundling corpora is not this module's job: it only parses
//! files the caller already has.

use crate::error::{DatasetError, Result};
use crate::types::{Rating, RatingScale};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::info;

/// One column of a ratings line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    User,
    Item,
    Rating,
    Timestamp,
}

/// Layout of a ratings file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderFormat {
    /// Column order; must contain user, item and rating
    pub line_format: Vec<Field>,
    /// Column separator; `None` splits on any whitespace
    pub separator: Option<String>,
    /// Number of header lines to skip
    pub skip_lines: usize,
    pub rating_scale: RatingScale,
}

impl Default for ReaderFormat {
    fn default() -> Self {
        Self {
            line_format: vec![Field::User, Field::Item, Field::Rating],
            separator: None,
            skip_lines: 0,
            rating_scale: RatingScale::default(),
        }
    }
}

impl ReaderFormat {
    /// `u.data` from MovieLens 100k: `user item rating timestamp`, tab separated
    pub fn ml_100k() -> Self {
        Self {
            line_format: vec![Field::User, Field::Item, Field::Rating, Field::Timestamp],
            separator: Some("\t".to_string()),
            ..Self::default()
        }
    }

    /// `ratings.dat` from MovieLens 1M: `user::item::rating::timestamp`
    pub fn ml_1m() -> Self {
        Self {
            line_format: vec![Field::User, Field::Item, Field::Rating, Field::Timestamp],
            separator: Some("::".to_string()),
            ..Self::default()
        }
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = Some(separator.into());
        self
    }

    pub fn with_skip_lines(mut self, skip_lines: usize) -> Self {
        self.skip_lines = skip_lines;
        self
    }

    pub fn with_rating_scale(mut self, rating_scale: RatingScale) -> Self {
        self.rating_scale = rating_scale;
        self
    }

    fn position(&self, field: Field) -> Option<usize> {
        self.line_format.iter().position(|&f| f == field)
    }

    fn split<'a>(&self, line: &'a str) -> Vec<&'a str> {
        match &self.separator {
            Some(sep) => line.split(sep.as_str()).map(str::trim).collect(),
            None => line.split_whitespace().collect(),
        }
    }
}

/// Read every rating from `path`
pub fn read_ratings(path: &Path, format: &ReaderFormat) -> Result<Vec<Rating>> {
    let file_name = path.display().to_string();
    let io_error = |e: std::io::Error| DatasetError::Io {
        path: file_name.clone(),
        reason: e.to_string(),
    };

    let mut bytes = Vec::new();
    File::open(path)
        .and_then(|mut f| f.read_to_end(&mut bytes))
        .map_err(io_error)?;

    // MovieLens files are Latin-1; map each byte straight to its code point
    let content: String = bytes.iter().map(|&b| b as char).collect();
    let ratings = parse_ratings(&content, format, &file_name)?;

    info!("Read {} ratings from {}", ratings.len(), file_name);
    Ok(ratings)
}

/// Parse ratings from in-memory text
///
/// `source` only appears in error messages.
pub fn parse_ratings(content: &str, format: &ReaderFormat, source: &str) -> Result<Vec<Rating>> {
    let parse_error = |line: usize, reason: String| DatasetError::Parse {
        file: source.to_string(),
        line,
        reason,
    };

    let (user_pos, item_pos, rating_pos) = match (
        format.position(Field::User),
        format.position(Field::Item),
        format.position(Field::Rating),
    ) {
        (Some(u), Some(i), Some(r)) => (u, i, r),
        _ => {
            return Err(parse_error(
                0,
                "line format must contain user, item and rating".to_string(),
            ));
        }
    };
    let timestamp_pos = format.position(Field::Timestamp);

    let mut ratings = Vec::new();
    for (idx, line) in content.lines().enumerate().skip(format.skip_lines) {
        let line_no = idx + 1;
        let line_trimmed = line.trim();
        if line_trimmed.is_empty() {
            continue;
        }

        let parts = format.split(line_trimmed);
        if parts.len() < format.line_format.len() {
            return Err(parse_error(
                line_no,
                format!(
                    "expected {} fields but found {}",
                    format.line_format.len(),
                    parts.len()
                ),
            ));
        }

        let rating: f64 = parts[rating_pos]
            .parse()
            .map_err(|e| parse_error(line_no, format!("Invalid rating: {}", e)))?;

        let timestamp = match timestamp_pos {
            Some(pos) => Some(
                parts[pos]
                    .parse::<i64>()
                    .map_err(|e| parse_error(line_no, format!("Invalid timestamp: {}", e)))?,
            ),
            None => None,
        };

        ratings.push(Rating {
            user: parts[user_pos].to_string(),
            item: parts[item_pos].to_string(),
            rating,
            timestamp,
        });
    }

    Ok(ratings)
}
