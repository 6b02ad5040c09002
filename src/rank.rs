// src/rank.rs
//! Ranking: order scored items by relevance and cut the batch to size.
//!
//! - Descending by score; ties keep their input order (stable sort).
//! - At most `max` items survive. `max == 0` yields an empty batch.

use crate::error::RankError;
use crate::model::ScoredItem;

/// Anything with a 0..=100 relevance score.
pub trait Scored {
    fn score(&self) -> u8;
}

impl Scored for ScoredItem {
    fn score(&self) -> u8 {
        self.assessment.score
    }
}

/// Stable descending sort by score, then truncate to `max`.
pub fn rank_by_score<T: Scored>(mut items: Vec<T>, max: usize) -> Vec<T> {
    // sort_by is stable: equal scores stay in arrival order
    items.sort_by(|a, b| b.score().cmp(&a.score()));
    items.truncate(max);
    items
}

pub fn rank(items: Vec<ScoredItem>, max: usize) -> Vec<ScoredItem> {
    rank_by_score(items, max)
}

/// Same as [`rank`] but takes a signed limit straight from configuration.
pub fn try_rank(items: Vec<ScoredItem>, max: i64) -> Result<Vec<ScoredItem>, RankError> {
    let max = usize::try_from(max).map_err(|_| RankError::NegativeMax(max))?;
    Ok(rank(items, max))
}
