//! Rating system configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which rating policy drives updates and pairing distance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RatingPolicyKind {
    Glicko2,
    /// Legacy discrete tier+points ladder
    Tiered,
}

impl std::str::FromStr for RatingPolicyKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "glicko2" | "glicko" => Ok(RatingPolicyKind::Glicko2),
            "tiered" | "danisen" => Ok(RatingPolicyKind::Tiered),
            other => Err(format!("unknown rating policy: {}", other)),
        }
    }
}

/// Lower bound of a named rating bracket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BracketThreshold {
    pub name: String,
    pub min_rating: f64,
}

impl BracketThreshold {
    pub fn new(name: &str, min_rating: f64) -> Self {
        Self {
            name: name.to_string(),
            min_rating,
        }
    }
}

/// Top-level rating settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingSettings {
    pub policy: RatingPolicyKind,
    /// Length of one rating period in days
    pub rating_period_days: f64,
    pub glicko: Glicko2Settings,
    pub tiers: TierSettings,
    /// Brackets ordered by ascending `min_rating`
    pub brackets: Vec<BracketThreshold>,
}

/// Glicko-2 parameters and defaults for new records
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Glicko2Settings {
    pub default_rating: f64,
    pub default_deviation: f64,
    pub default_volatility: f64,
    /// System constant constraining volatility change
    pub tau: f64,
    pub convergence_tolerance: f64,
    pub max_iterations: usize,
    /// When set, a loser never drops below this rating
    pub rating_floor: Option<f64>,
}

/// Legacy tier ladder rules
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TierSettings {
    pub total_tiers: u32,
    /// Losers at or below this tier cannot go negative on points
    pub minimum_derank: u32,
    /// A winner more than this many tiers above the loser gains nothing
    pub maximum_rank_difference: u32,
    /// Tier gap at which a lower-tier winner earns double points
    pub rank_gap_for_more_points: u32,
    pub rankup_points_normal: i32,
    pub rankup_points_special: i32,
    pub rankdown_points: i32,
    pub special_rank_threshold: u32,
    pub special_rank_up_rules: bool,
    pub point_rollover: bool,
}

impl Default for RatingSettings {
    fn default() -> Self {
        Self {
            policy: RatingPolicyKind::Glicko2,
            rating_period_days: 1.0,
            glicko: Glicko2Settings::default(),
            tiers: TierSettings::default(),
            brackets: default_brackets(),
        }
    }
}

impl Default for Glicko2Settings {
    fn default() -> Self {
        Self {
            default_rating: 1500.0,
            default_deviation: 350.0,
            default_volatility: 0.06,
            tau: 0.3,
            convergence_tolerance: 1e-6,
            max_iterations: 100,
            rating_floor: None,
        }
    }
}

impl Default for TierSettings {
    fn default() -> Self {
        Self {
            total_tiers: 7,
            minimum_derank: 2,
            maximum_rank_difference: 1,
            rank_gap_for_more_points: 1,
            rankup_points_normal: 3,
            rankup_points_special: 5,
            rankdown_points: -3,
            special_rank_threshold: 8,
            special_rank_up_rules: false,
            point_rollover: true,
        }
    }
}

/// Rookie, Advanced, Expert, Ultimate and Unrivaled bands
pub fn default_brackets() -> Vec<BracketThreshold> {
    vec![
        BracketThreshold::new("Rookie", 0.0),
        BracketThreshold::new("Advanced", 1100.0),
        BracketThreshold::new("Expert", 1250.0),
        BracketThreshold::new("Ultimate", 1400.0),
        BracketThreshold::new("Unrivaled", 1600.0),
    ]
}

/// Longest accepted rating period, ten years
pub const MAX_RATING_PERIOD_DAYS: f64 = 3650.0;

impl RatingSettings {
    /// Get the rating period as Duration, clamped to `MAX_RATING_PERIOD_DAYS`.
    /// A NaN period maps to zero.
    pub fn rating_period(&self) -> Duration {
        let days = self.rating_period_days.clamp(0.0, MAX_RATING_PERIOD_DAYS);
        Duration::try_from_secs_f64(days * 86_400.0).unwrap_or_default()
    }
}

impl TierSettings {
    /// Points needed to leave `tier`
    pub fn rankup_points(&self, tier: u32) -> i32 {
        if tier >= self.special_rank_threshold {
            self.rankup_points_special
        } else {
            self.rankup_points_normal
        }
    }

    pub fn is_special(&self, tier: u32) -> bool {
        tier >= self.special_rank_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_kind_parsing() {
        assert_eq!("glicko2".parse(), Ok(RatingPolicyKind::Glicko2));
        assert_eq!("Danisen".parse(), Ok(RatingPolicyKind::Tiered));
        assert!("elo".parse::<RatingPolicyKind>().is_err());
    }

    #[test]
    fn test_rankup_points_by_tier() {
        let tiers = TierSettings::default();
        assert_eq!(tiers.rankup_points(3), 3);
        assert_eq!(tiers.rankup_points(8), 5);
        assert!(!tiers.is_special(7));
    }

    #[test]
    fn test_rating_period_duration() {
        let settings = RatingSettings {
            rating_period_days: 0.5,
            ..Default::default()
        };
        assert_eq!(settings.rating_period(), Duration::from_secs(43_200));
    }

    #[test]
    fn test_rating_period_out_of_range_does_not_panic() {
        let huge = RatingSettings {
            rating_period_days: 1e300,
            ..Default::default()
        };
        assert_eq!(
            huge.rating_period(),
            Duration::from_secs((MAX_RATING_PERIOD_DAYS * 86_400.0) as u64)
        );

        let nan = RatingSettings {
            rating_period_days: f64::NAN,
            ..Default::default()
        };
        assert_eq!(nan.rating_period(), Duration::ZERO);
    }
}
