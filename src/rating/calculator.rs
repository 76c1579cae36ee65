//! Rating policy trait
//!
//! A policy owns every rule that turns a match result into new rating
//! state. The matchmaker, the match lifecycle and the rating-period clock
//! only talk to this trait, so the Glicko-2 ladder and the legacy tiered
//! ladder are interchangeable.

use crate::config::RatingPolicyKind;
use crate::error::RatingError;
use crate::types::{
    BracketChange, MatchProjection, MatchRatingUpdate, OutcomeProjection, ParticipantId,
    RatingDelta, RatingRecord,
};
use chrono::{DateTime, Utc};

/// Trait for turning match results into rating changes
pub trait RatingPolicy: Send + Sync {
    fn kind(&self) -> RatingPolicyKind;

    /// Rating state for a newly registered participant
    fn initial_record(&self, participant: ParticipantId, now: DateTime<Utc>) -> RatingRecord;

    /// Apply a single result. Pure: the inputs are not modified.
    fn apply_result(
        &self,
        winner: &RatingRecord,
        loser: &RatingRecord,
        now: DateTime<Utc>,
    ) -> Result<MatchRatingUpdate, RatingError>;

    /// Bring an idle record up to `until` without any games
    fn apply_inactivity(
        &self,
        record: &RatingRecord,
        until: DateTime<Utc>,
    ) -> Result<RatingRecord, RatingError>;

    /// Sort key for candidate opponents; lower is a better match
    fn matchmaking_distance(&self, anchor: &RatingRecord, candidate: &RatingRecord) -> f64;

    /// Ordinal of the bracket or tier, higher is stronger
    fn bracket_rank(&self, record: &RatingRecord) -> usize;

    fn bracket_name(&self, record: &RatingRecord) -> String;

    /// Get current configuration as JSON
    fn config(&self) -> serde_json::Value;

    /// Advisory preview of both outcomes, built from `apply_result`
    fn project(
        &self,
        a: &RatingRecord,
        b: &RatingRecord,
        now: DateTime<Utc>,
    ) -> Result<MatchProjection, RatingError> {
        let a_wins = self.apply_result(a, b, now)?;
        let b_wins = self.apply_result(b, a, now)?;
        Ok(MatchProjection {
            participant_a: outcome_projection(&a_wins.winner, &b_wins.loser),
            participant_b: outcome_projection(&b_wins.winner, &a_wins.loser),
        })
    }
}

/// Package a before/after pair with its bracket movement
pub fn rating_delta<P: RatingPolicy + ?Sized>(
    policy: &P,
    before: &RatingRecord,
    after: RatingRecord,
) -> RatingDelta {
    let rank_before = policy.bracket_rank(before);
    let rank_after = policy.bracket_rank(&after);
    let bracket_change = match rank_after.cmp(&rank_before) {
        std::cmp::Ordering::Greater => BracketChange::Promoted,
        std::cmp::Ordering::Less => BracketChange::Demoted,
        std::cmp::Ordering::Equal => BracketChange::Unchanged,
    };
    RatingDelta {
        participant: before.participant.clone(),
        bracket_before: policy.bracket_name(before),
        bracket_after: policy.bracket_name(&after),
        before: before.clone(),
        after,
        bracket_change,
    }
}

fn outcome_projection(if_win: &RatingDelta, if_loss: &RatingDelta) -> OutcomeProjection {
    let crosses = |change: BracketChange| {
        if_win.bracket_change == change || if_loss.bracket_change == change
    };
    OutcomeProjection {
        participant: if_win.participant.clone(),
        bracket: if_win.bracket_before.clone(),
        rating_if_win: if_win.after.rating,
        rating_if_loss: if_loss.after.rating,
        points_if_win: if_win.after.standing.points,
        points_if_loss: if_loss.after.standing.points,
        promotion_possible: crosses(BracketChange::Promoted),
        demotion_possible: crosses(BracketChange::Demoted),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Glicko2Settings, TierSettings};
    use crate::rating::brackets::BracketTable;
    use crate::rating::glicko2::Glicko2Policy;
    use crate::rating::tiered::TieredPolicy;
    use crate::types::TierStanding;
    use std::time::Duration;

    #[test]
    fn test_projection_matches_real_update() {
        let policy = Glicko2Policy::new(
            Glicko2Settings::default(),
            BracketTable::default(),
            Duration::from_secs(86_400),
        );
        let now = Utc::now();
        let mut a = policy.initial_record(ParticipantId::new(1, "ryu"), now);
        a.rating = 1580.0;
        a.rating_deviation = 90.0;
        let b = policy.initial_record(ParticipantId::new(2, "ken"), now);

        let projection = policy.project(&a, &b, now).unwrap();
        let real = policy.apply_result(&a, &b, now).unwrap();

        assert_eq!(projection.participant_a.rating_if_win, real.winner.after.rating);
        assert_eq!(projection.participant_b.rating_if_loss, real.loser.after.rating);
        assert_eq!(projection.participant_a.bracket, "Ultimate");
        // Inputs are untouched
        assert_eq!(a.rating, 1580.0);
    }

    #[test]
    fn test_projection_flags_tier_boundaries() {
        let policy = TieredPolicy::new(TierSettings::default());
        let now = Utc::now();
        let mut a = policy.initial_record(ParticipantId::new(1, "ryu"), now);
        a.standing = TierStanding { tier: 3, points: 2 };
        let mut b = policy.initial_record(ParticipantId::new(2, "ken"), now);
        b.standing = TierStanding { tier: 3, points: -2 };

        let projection = policy.project(&a, &b, now).unwrap();

        assert!(projection.participant_a.promotion_possible);
        assert!(!projection.participant_a.demotion_possible);
        assert!(projection.participant_b.demotion_possible);
        assert!(!projection.participant_b.promotion_possible);
    }
}
