//! Named rating brackets

use crate::config::BracketThreshold;
use crate::config::rating::default_brackets;

/// Ordered bracket thresholds; the first bracket also catches anything below it
#[derive(Debug, Clone)]
pub struct BracketTable {
    thresholds: Vec<BracketThreshold>,
}

impl BracketTable {
    /// Build from thresholds sorted by ascending `min_rating`
    pub fn new(mut thresholds: Vec<BracketThreshold>) -> Self {
        if thresholds.is_empty() {
            thresholds = default_brackets();
        }
        thresholds.sort_by(|a, b| {
            a.min_rating
                .partial_cmp(&b.min_rating)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Self { thresholds }
    }

    pub fn index_for(&self, rating: f64) -> usize {
        self.thresholds
            .iter()
            .rposition(|t| rating >= t.min_rating)
            .unwrap_or(0)
    }

    pub fn name_for(&self, rating: f64) -> &str {
        &self.thresholds[self.index_for(rating)].name
    }

    pub fn thresholds(&self) -> &[BracketThreshold] {
        &self.thresholds
    }
}

impl Default for BracketTable {
    fn default() -> Self {
        Self::new(default_brackets())
    }
}
