//! Legacy tier ladder
//!
//! Skill is a discrete `(tier, points)` pair. Wins add points, losses take
//! them away, and crossing a threshold moves the participant one tier.

use crate::config::{RatingPolicyKind, TierSettings};
use crate::error::RatingError;
use crate::rating::calculator::{rating_delta, RatingPolicy};
use crate::types::{MatchRatingUpdate, ParticipantId, RatingRecord, TierStanding};
use chrono::{DateTime, Utc};
use tracing::debug;

const MINIMUM_TIER: u32 = 1;

/// Tier+points ladder
#[derive(Debug, Clone)]
pub struct TieredPolicy {
    settings: TierSettings,
}

impl TieredPolicy {
    pub fn new(settings: TierSettings) -> Self {
        Self { settings }
    }

    /// Pure standing update for one result
    pub fn score(&self, winner: TierStanding, loser: TierStanding) -> (TierStanding, TierStanding) {
        let tiers = &self.settings;
        let mut winner_new = winner;
        let mut loser_new = loser;

        // Beating someone too far below changes nothing for either side
        if winner.tier > loser.tier + tiers.maximum_rank_difference {
            return (winner, loser);
        }

        if loser.tier >= winner.tier + tiers.rank_gap_for_more_points {
            winner_new.points += 2;
        } else {
            winner_new.points += 1;
        }

        if loser.tier > tiers.minimum_derank || loser.points > 0 {
            loser_new.points -= 1;
        }

        let rankup_points = tiers.rankup_points(winner.tier);
        if winner_new.points >= rankup_points {
            let mut can_rank_up = winner.tier < tiers.total_tiers;
            if tiers.special_rank_up_rules && tiers.is_special(winner.tier) {
                // Special tiers only advance by beating another special tier
                can_rank_up &= tiers.is_special(loser.tier);
            }

            if can_rank_up {
                winner_new.tier += 1;
                winner_new.points = if tiers.point_rollover {
                    winner_new.points % rankup_points
                } else {
                    0
                };
            } else {
                winner_new.points = rankup_points - 1;
            }
        }

        if loser_new.points <= tiers.rankdown_points {
            loser_new.tier = loser.tier.saturating_sub(1).max(MINIMUM_TIER);
            loser_new.points = 0;
        }

        (winner_new, loser_new)
    }

    /// Candidate buckets visited in order: same tier, +1, -1, +2, -2, ...
    fn bucket_order(anchor_tier: u32, candidate_tier: u32) -> u32 {
        let gap = anchor_tier.abs_diff(candidate_tier);
        if candidate_tier > anchor_tier {
            2 * gap - 1
        } else {
            2 * gap
        }
    }
}

impl RatingPolicy for TieredPolicy {
    fn kind(&self) -> RatingPolicyKind {
        RatingPolicyKind::Tiered
    }

    fn initial_record(&self, participant: ParticipantId, now: DateTime<Utc>) -> RatingRecord {
        RatingRecord {
            participant,
            rating: 0.0,
            rating_deviation: 0.0,
            volatility: 0.0,
            standing: TierStanding::default(),
            games_played: 0,
            last_rated_at: now,
        }
    }

    fn apply_result(
        &self,
        winner: &RatingRecord,
        loser: &RatingRecord,
        now: DateTime<Utc>,
    ) -> Result<MatchRatingUpdate, RatingError> {
        let (winner_standing, loser_standing) = self.score(winner.standing, loser.standing);
        debug!(
            "Tier result {}: {:?} -> {:?}, {}: {:?} -> {:?}",
            winner.participant,
            winner.standing,
            winner_standing,
            loser.participant,
            loser.standing,
            loser_standing
        );

        let winner_after = RatingRecord {
            standing: winner_standing,
            games_played: winner.games_played + 1,
            last_rated_at: now,
            ..winner.clone()
        };
        let loser_after = RatingRecord {
            standing: loser_standing,
            games_played: loser.games_played + 1,
            last_rated_at: now,
            ..loser.clone()
        };
        Ok(MatchRatingUpdate {
            winner: rating_delta(self, winner, winner_after),
            loser: rating_delta(self, loser, loser_after),
        })
    }

    fn apply_inactivity(
        &self,
        record: &RatingRecord,
        until: DateTime<Utc>,
    ) -> Result<RatingRecord, RatingError> {
        // Standings do not decay
        Ok(RatingRecord {
            last_rated_at: until,
            ..record.clone()
        })
    }

    fn matchmaking_distance(&self, anchor: &RatingRecord, candidate: &RatingRecord) -> f64 {
        f64::from(Self::bucket_order(anchor.standing.tier, candidate.standing.tier))
    }

    fn bracket_rank(&self, record: &RatingRecord) -> usize {
        record.standing.tier as usize
    }

    fn bracket_name(&self, record: &RatingRecord) -> String {
        format!("Dan {}", record.standing.tier)
    }

    fn config(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "tiered",
            "total_tiers": self.settings.total_tiers,
            "minimum_derank": self.settings.minimum_derank,
            "maximum_rank_difference": self.settings.maximum_rank_difference,
            "rank_gap_for_more_points": self.settings.rank_gap_for_more_points,
            "rankup_points_normal": self.settings.rankup_points_normal,
            "rankup_points_special": self.settings.rankup_points_special,
            "rankdown_points": self.settings.rankdown_points,
            "special_rank_threshold": self.settings.special_rank_threshold,
            "special_rank_up_rules": self.settings.special_rank_up_rules,
            "point_rollover": self.settings.point_rollover,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BracketChange;

    fn standing(tier: u32, points: i32) -> TierStanding {
        TierStanding { tier, points }
    }

    fn create_test_policy() -> TieredPolicy {
        TieredPolicy::new(TierSettings::default())
    }

    #[test]
    fn test_equal_tiers_trade_one_point() {
        let policy = create_test_policy();
        let (w, l) = policy.score(standing(3, 0), standing(3, 0));
        assert_eq!(w, standing(3, 1));
        assert_eq!(l, standing(3, -1));
    }

    #[test]
    fn test_lower_tier_winner_gains_two() {
        let policy = create_test_policy();
        let (w, _) = policy.score(standing(2, 0), standing(3, 0));
        assert_eq!(w, standing(2, 2));
    }

    #[test]
    fn test_winner_far_above_loser_changes_nothing() {
        let policy = create_test_policy();
        let (w, l) = policy.score(standing(5, 1), standing(3, 1));
        assert_eq!(w, standing(5, 1));
        assert_eq!(l, standing(3, 1));
    }

    #[test]
    fn test_low_tier_loser_points_floor_at_zero() {
        let policy = create_test_policy();
        let (_, l) = policy.score(standing(2, 0), standing(2, 0));
        assert_eq!(l, standing(2, 0));

        let (_, l) = policy.score(standing(2, 0), standing(1, 1));
        assert_eq!(l, standing(1, 0));
    }

    #[test]
    fn test_promotion_with_rollover() {
        let policy = create_test_policy();
        // 2 + 2 = 4 points, threshold 3, rollover keeps 1
        let (w, _) = policy.score(standing(3, 2), standing(4, 0));
        assert_eq!(w, standing(4, 1));

        let no_rollover = TieredPolicy::new(TierSettings {
            point_rollover: false,
            ..Default::default()
        });
        let (w, _) = no_rollover.score(standing(3, 2), standing(4, 0));
        assert_eq!(w, standing(4, 0));
    }

    #[test]
    fn test_demotion_at_negative_threshold() {
        let policy = create_test_policy();
        let (_, l) = policy.score(standing(4, 0), standing(4, -2));
        assert_eq!(l, standing(3, 0));
    }

    #[test]
    fn test_top_tier_holds_points_below_threshold() {
        let policy = create_test_policy();
        let (w, _) = policy.score(standing(7, 2), standing(7, 0));
        assert_eq!(w, standing(7, 2));
    }

    #[test]
    fn test_special_rank_up_rules() {
        let policy = TieredPolicy::new(TierSettings {
            total_tiers: 12,
            special_rank_up_rules: true,
            ..Default::default()
        });

        // Special winner against a non-special loser is held at threshold - 1
        let (w, _) = policy.score(standing(8, 4), standing(7, 0));
        assert_eq!(w, standing(8, 4));

        // Against another special tier the promotion goes through
        let (w, _) = policy.score(standing(8, 4), standing(8, 0));
        assert_eq!(w, standing(9, 0));
    }

    #[test]
    fn test_bucket_order_prefers_higher_neighbour() {
        assert_eq!(TieredPolicy::bucket_order(3, 3), 0);
        assert_eq!(TieredPolicy::bucket_order(3, 4), 1);
        assert_eq!(TieredPolicy::bucket_order(3, 2), 2);
        assert_eq!(TieredPolicy::bucket_order(3, 5), 3);
        assert_eq!(TieredPolicy::bucket_order(3, 1), 4);
    }

    #[test]
    fn test_apply_result_reports_tier_changes() {
        let policy = create_test_policy();
        let now = Utc::now();
        let mut winner = policy.initial_record(ParticipantId::new(1, "ryu"), now);
        winner.standing = standing(3, 2);
        let mut loser = policy.initial_record(ParticipantId::new(2, "ken"), now);
        loser.standing = standing(3, -2);

        let update = policy.apply_result(&winner, &loser, now).unwrap();

        assert_eq!(update.winner.bracket_change, BracketChange::Promoted);
        assert_eq!(update.winner.bracket_after, "Dan 4");
        assert_eq!(update.loser.bracket_change, BracketChange::Demoted);
        assert_eq!(update.loser.after.standing, standing(2, 0));
    }
}
