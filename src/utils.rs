//! Utility functions for the ranked ladder

use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

/// Generate a new unique match ID
pub fn generate_match_id() -> Uuid {
    Uuid::new_v4()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Calculate the absolute difference between two ratings
pub fn rating_difference(rating1: f64, rating2: f64) -> f64 {
    (rating1 - rating2).abs()
}

/// Number of whole and fractional periods between two instants, never negative
pub fn elapsed_periods(from: DateTime<Utc>, to: DateTime<Utc>, period: Duration) -> f64 {
    let period_secs = period.as_secs_f64();
    if period_secs <= 0.0 {
        return 0.0;
    }
    let elapsed = (to - from).num_milliseconds() as f64 / 1000.0;
    (elapsed / period_secs).max(0.0)
}

/// Convert a std duration into a chrono duration, saturating on overflow
pub fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_periods() {
        let start = current_timestamp();
        let day = Duration::from_secs(86_400);

        let later = start + chrono::Duration::hours(36);
        assert!((elapsed_periods(start, later, day) - 1.5).abs() < 1e-9);

        // Clock skew never yields negative periods
        let earlier = start - chrono::Duration::hours(1);
        assert_eq!(elapsed_periods(start, earlier, day), 0.0);

        assert_eq!(elapsed_periods(start, later, Duration::ZERO), 0.0);
    }

    #[test]
    fn test_rating_difference() {
        assert_eq!(rating_difference(1500.0, 1400.0), 100.0);
        assert_eq!(rating_difference(1400.0, 1500.0), 100.0);
    }
}
