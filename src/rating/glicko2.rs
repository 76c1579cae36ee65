//! Glicko-2 rating math and the policy built on it
//!
//! The free functions in this module are pure: they take public-scale
//! ratings, convert to the internal Glicko-2 scale, run one rating period
//! and convert back. `Glicko2Policy` wraps them behind `RatingPolicy`.

use crate::config::{Glicko2Settings, RatingPolicyKind};
use crate::error::RatingError;
use crate::rating::brackets::BracketTable;
use crate::rating::calculator::{rating_delta, RatingPolicy};
use crate::types::{MatchRatingUpdate, ParticipantId, RatingRecord, TierStanding};
use crate::utils::{elapsed_periods, rating_difference};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::time::Duration;
use tracing::{debug, warn};

/// Conversion factor between the public and internal scales
pub const GLICKO2_SCALE: f64 = 173.7178;

/// Public rating that maps to μ = 0
pub const GLICKO2_CENTER: f64 = 1500.0;

/// Public-scale Glicko-2 state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Glicko2Rating {
    pub rating: f64,
    pub deviation: f64,
    pub volatility: f64,
}

impl From<&RatingRecord> for Glicko2Rating {
    fn from(record: &RatingRecord) -> Self {
        Self {
            rating: record.rating,
            deviation: record.rating_deviation,
            volatility: record.volatility,
        }
    }
}

/// One game played during the rating period
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GameOutcome {
    pub opponent_rating: f64,
    pub opponent_deviation: f64,
    /// 1.0 win, 0.5 draw, 0.0 loss
    pub score: f64,
}

impl GameOutcome {
    pub fn against(opponent: &Glicko2Rating, score: f64) -> Self {
        Self {
            opponent_rating: opponent.rating,
            opponent_deviation: opponent.deviation,
            score,
        }
    }
}

/// Solver parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Glicko2Parameters {
    pub tau: f64,
    pub convergence_tolerance: f64,
    pub max_iterations: usize,
}

impl Default for Glicko2Parameters {
    fn default() -> Self {
        Self {
            tau: 0.3,
            convergence_tolerance: 1e-6,
            max_iterations: 100,
        }
    }
}

impl From<&Glicko2Settings> for Glicko2Parameters {
    fn from(settings: &Glicko2Settings) -> Self {
        Self {
            tau: settings.tau,
            convergence_tolerance: settings.convergence_tolerance,
            max_iterations: settings.max_iterations,
        }
    }
}

fn g(phi: f64) -> f64 {
    1.0 / (1.0 + 3.0 * phi * phi / (PI * PI)).sqrt()
}

fn expected(mu: f64, mu_j: f64, phi_j: f64) -> f64 {
    1.0 / (1.0 + (-g(phi_j) * (mu - mu_j)).exp())
}

/// Reject ratings the solver cannot work with
pub fn validate(player: &Glicko2Rating) -> Result<(), RatingError> {
    if !player.rating.is_finite() {
        return Err(RatingError::InvalidInput {
            reason: format!("rating {} is not finite", player.rating),
        });
    }
    if !(player.deviation > 0.0 && player.deviation.is_finite()) {
        return Err(RatingError::InvalidInput {
            reason: format!("deviation {} must be positive", player.deviation),
        });
    }
    if !(player.volatility > 0.0 && player.volatility.is_finite()) {
        return Err(RatingError::InvalidInput {
            reason: format!("volatility {} must be positive", player.volatility),
        });
    }
    Ok(())
}

/// Probability that `player` beats `opponent`
pub fn expected_score(player: &Glicko2Rating, opponent: &Glicko2Rating) -> f64 {
    let mu = (player.rating - GLICKO2_CENTER) / GLICKO2_SCALE;
    let mu_j = (opponent.rating - GLICKO2_CENTER) / GLICKO2_SCALE;
    expected(mu, mu_j, opponent.deviation / GLICKO2_SCALE)
}

/// Zero-game update: widen the deviation for `elapsed` idle periods
pub fn inflate_deviation(
    player: &Glicko2Rating,
    elapsed: f64,
) -> Result<Glicko2Rating, RatingError> {
    validate(player)?;
    if !(elapsed > 0.0) {
        return Ok(*player);
    }
    let phi = player.deviation / GLICKO2_SCALE;
    let phi_star = (phi * phi + elapsed * player.volatility * player.volatility).sqrt();
    Ok(Glicko2Rating {
        deviation: phi_star * GLICKO2_SCALE,
        ..*player
    })
}

/// Run one Glicko-2 rating period for `player`
pub fn update(
    player: &Glicko2Rating,
    games: &[GameOutcome],
    elapsed: f64,
    params: &Glicko2Parameters,
) -> Result<Glicko2Rating, RatingError> {
    if games.is_empty() {
        return inflate_deviation(player, elapsed);
    }
    validate(player)?;

    let mu = (player.rating - GLICKO2_CENTER) / GLICKO2_SCALE;
    let phi = player.deviation / GLICKO2_SCALE;

    let mut variance_inv = 0.0;
    let mut score_sum = 0.0;
    for game in games {
        validate(&Glicko2Rating {
            rating: game.opponent_rating,
            deviation: game.opponent_deviation,
            volatility: player.volatility,
        })?;
        let mu_j = (game.opponent_rating - GLICKO2_CENTER) / GLICKO2_SCALE;
        let phi_j = game.opponent_deviation / GLICKO2_SCALE;
        let g_j = g(phi_j);
        let e_j = expected(mu, mu_j, phi_j);
        variance_inv += g_j * g_j * e_j * (1.0 - e_j);
        score_sum += g_j * (game.score - e_j);
    }
    let v = 1.0 / variance_inv;
    let delta = v * score_sum;

    let sigma_prime = solve_volatility(delta, phi, v, player.volatility, params)?;

    let elapsed = elapsed.max(0.0);
    let phi_star = (phi * phi + elapsed * sigma_prime * sigma_prime).sqrt();
    let phi_prime = 1.0 / (1.0 / (phi_star * phi_star) + 1.0 / v).sqrt();
    let mu_prime = mu + phi_prime * phi_prime * score_sum;

    let result = Glicko2Rating {
        rating: GLICKO2_SCALE * mu_prime + GLICKO2_CENTER,
        deviation: GLICKO2_SCALE * phi_prime,
        volatility: sigma_prime,
    };
    if !(result.rating.is_finite() && result.deviation.is_finite()) {
        return Err(RatingError::NonConvergence {
            iterations: params.max_iterations,
        });
    }
    Ok(result)
}

/// Illinois root-find for the new volatility, with a bounded bisection fallback
fn solve_volatility(
    delta: f64,
    phi: f64,
    v: f64,
    sigma: f64,
    params: &Glicko2Parameters,
) -> Result<f64, RatingError> {
    let tau = params.tau;
    let epsilon = params.convergence_tolerance;
    let a = (sigma * sigma).ln();
    let f = |x: f64| {
        let ex = x.exp();
        let denom = phi * phi + v + ex;
        ex * (delta * delta - phi * phi - v - ex) / (2.0 * denom * denom) - (x - a) / (tau * tau)
    };

    let mut lower = a;
    let mut upper = if delta * delta > phi * phi + v {
        (delta * delta - phi * phi - v).ln()
    } else {
        let mut k = 1.0;
        let mut steps = 0;
        while f(a - k * tau) < 0.0 {
            k += 1.0;
            steps += 1;
            if steps >= params.max_iterations {
                warn!("Volatility bracket search exhausted after {} steps", steps);
                return Err(RatingError::NonConvergence { iterations: steps });
            }
        }
        a - k * tau
    };

    let mut f_lower = f(lower);
    let mut f_upper = f(upper);
    let mut iterations = 0;
    while (upper - lower).abs() > epsilon {
        if iterations >= params.max_iterations {
            break;
        }
        iterations += 1;

        let c = lower + (lower - upper) * f_lower / (f_upper - f_lower);
        if !c.is_finite() {
            break;
        }
        let f_c = f(c);
        if f_c * f_upper <= 0.0 {
            lower = upper;
            f_lower = f_upper;
        } else {
            f_lower /= 2.0;
        }
        upper = c;
        f_upper = f_c;
    }

    if (upper - lower).abs() > epsilon {
        debug!(
            "Illinois iteration stalled after {} steps, bisecting [{}, {}]",
            iterations, lower, upper
        );
        let mut bisections = 0;
        while (upper - lower).abs() > epsilon && bisections < params.max_iterations * 2 {
            bisections += 1;
            let mid = (lower + upper) / 2.0;
            let f_mid = f(mid);
            if f_mid * f_lower <= 0.0 {
                upper = mid;
                f_upper = f_mid;
            } else {
                lower = mid;
                f_lower = f_mid;
            }
        }
        let midpoint = (lower + upper) / 2.0;
        let sigma_prime = (midpoint / 2.0).exp();
        if !sigma_prime.is_finite() || !f_upper.is_finite() {
            return Err(RatingError::NonConvergence {
                iterations: iterations + bisections,
            });
        }
        return Ok(sigma_prime);
    }

    let sigma_prime = (lower / 2.0).exp();
    if !sigma_prime.is_finite() {
        return Err(RatingError::NonConvergence { iterations });
    }
    Ok(sigma_prime)
}

/// Glicko-2 ladder: continuous rating with named brackets
#[derive(Debug, Clone)]
pub struct Glicko2Policy {
    settings: Glicko2Settings,
    params: Glicko2Parameters,
    brackets: BracketTable,
    rating_period: Duration,
}

impl Glicko2Policy {
    pub fn new(settings: Glicko2Settings, brackets: BracketTable, rating_period: Duration) -> Self {
        let params = Glicko2Parameters::from(&settings);
        Self {
            settings,
            params,
            brackets,
            rating_period,
        }
    }

    pub fn parameters(&self) -> &Glicko2Parameters {
        &self.params
    }

    fn to_record(&self, base: &RatingRecord, rating: Glicko2Rating, now: DateTime<Utc>, played: bool) -> RatingRecord {
        RatingRecord {
            rating: rating.rating,
            rating_deviation: rating.deviation,
            volatility: rating.volatility,
            games_played: base.games_played + u64::from(played),
            last_rated_at: now,
            ..base.clone()
        }
    }

    fn rate_one(
        &self,
        player: &RatingRecord,
        opponent: &RatingRecord,
        score: f64,
        now: DateTime<Utc>,
    ) -> Result<Glicko2Rating, RatingError> {
        let elapsed = elapsed_periods(player.last_rated_at, now, self.rating_period);
        let opponent = Glicko2Rating::from(opponent);
        update(
            &Glicko2Rating::from(player),
            &[GameOutcome::against(&opponent, score)],
            elapsed,
            &self.params,
        )
    }
}

impl RatingPolicy for Glicko2Policy {
    fn kind(&self) -> RatingPolicyKind {
        RatingPolicyKind::Glicko2
    }

    fn initial_record(&self, participant: ParticipantId, now: DateTime<Utc>) -> RatingRecord {
        RatingRecord {
            participant,
            rating: self.settings.default_rating,
            rating_deviation: self.settings.default_deviation,
            volatility: self.settings.default_volatility,
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
        // Both sides are rated against the other's pre-match state
        let winner_new = self.rate_one(winner, loser, 1.0, now)?;
        let mut loser_new = self.rate_one(loser, winner, 0.0, now)?;

        if let Some(floor) = self.settings.rating_floor {
            loser_new.rating = loser_new.rating.max(floor);
        }

        let winner_after = self.to_record(winner, winner_new, now, true);
        let loser_after = self.to_record(loser, loser_new, now, true);
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
        let elapsed = elapsed_periods(record.last_rated_at, until, self.rating_period);
        let inflated = inflate_deviation(&Glicko2Rating::from(record), elapsed)?;
        Ok(self.to_record(record, inflated, until, false))
    }

    fn matchmaking_distance(&self, anchor: &RatingRecord, candidate: &RatingRecord) -> f64 {
        rating_difference(anchor.rating, candidate.rating)
    }

    fn bracket_rank(&self, record: &RatingRecord) -> usize {
        self.brackets.index_for(record.rating)
    }

    fn bracket_name(&self, record: &RatingRecord) -> String {
        self.brackets.name_for(record.rating).to_string()
    }

    fn config(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "glicko2",
            "tau": self.params.tau,
            "convergence_tolerance": self.params.convergence_tolerance,
            "max_iterations": self.params.max_iterations,
            "default_rating": self.settings.default_rating,
            "default_deviation": self.settings.default_deviation,
            "default_volatility": self.settings.default_volatility,
            "rating_floor": self.settings.rating_floor,
            "rating_period_seconds": self.rating_period.as_secs(),
            "brackets": self.brackets.thresholds(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BracketChange;

    fn create_test_policy() -> Glicko2Policy {
        Glicko2Policy::new(
            Glicko2Settings::default(),
            BracketTable::default(),
            Duration::from_secs(86_400),
        )
    }

    fn rating(rating: f64, deviation: f64, volatility: f64) -> Glicko2Rating {
        Glicko2Rating {
            rating,
            deviation,
            volatility,
        }
    }

    #[test]
    fn test_glickman_reference_example() {
        // Worked example from Glickman's Glicko-2 paper
        let player = rating(1500.0, 200.0, 0.06);
        let games = [
            GameOutcome {
                opponent_rating: 1400.0,
                opponent_deviation: 30.0,
                score: 1.0,
            },
            GameOutcome {
                opponent_rating: 1550.0,
                opponent_deviation: 100.0,
                score: 0.0,
            },
            GameOutcome {
                opponent_rating: 1700.0,
                opponent_deviation: 300.0,
                score: 0.0,
            },
        ];
        let params = Glicko2Parameters {
            tau: 0.5,
            ..Default::default()
        };

        let result = update(&player, &games, 1.0, &params).unwrap();

        assert!((result.rating - 1464.06).abs() < 0.05, "rating {}", result.rating);
        assert!((result.deviation - 151.52).abs() < 0.05, "rd {}", result.deviation);
        assert!((result.volatility - 0.05999).abs() < 1e-4, "vol {}", result.volatility);
    }

    #[test]
    fn test_win_against_equal_opponent_moves_ratings_apart() {
        let a = rating(1500.0, 200.0, 0.06);
        let b = rating(1500.0, 200.0, 0.06);
        let params = Glicko2Parameters::default();

        let a_new = update(&a, &[GameOutcome::against(&b, 1.0)], 1.0, &params).unwrap();
        let b_new = update(&b, &[GameOutcome::against(&a, 0.0)], 1.0, &params).unwrap();

        assert!(a_new.rating > 1500.0);
        assert!(b_new.rating < 1500.0);
        // Symmetric outcome
        assert!(((a_new.rating - 1500.0) + (b_new.rating - 1500.0)).abs() < 1e-9);
    }

    #[test]
    fn test_zero_elapsed_inflation_is_identity() {
        let player = rating(1623.4, 87.2, 0.059);
        let inflated = inflate_deviation(&player, 0.0).unwrap();
        assert_eq!(inflated, player);

        let zero_games = update(&player, &[], 0.0, &Glicko2Parameters::default()).unwrap();
        assert_eq!(zero_games.deviation, 87.2);
    }

    #[test]
    fn test_inflation_widens_deviation_only() {
        let player = rating(1623.4, 87.2, 0.06);
        let inflated = inflate_deviation(&player, 3.0).unwrap();

        assert!(inflated.deviation > player.deviation);
        assert_eq!(inflated.rating, player.rating);
        assert_eq!(inflated.volatility, player.volatility);
    }

    #[test]
    fn test_invalid_inputs_are_rejected() {
        let params = Glicko2Parameters::default();
        let opponent = rating(1500.0, 350.0, 0.06);

        let bad_rd = rating(1500.0, 0.0, 0.06);
        assert!(matches!(
            update(&bad_rd, &[GameOutcome::against(&opponent, 1.0)], 1.0, &params),
            Err(RatingError::InvalidInput { .. })
        ));

        let nan_rating = rating(f64::NAN, 200.0, 0.06);
        assert!(inflate_deviation(&nan_rating, 1.0).is_err());
    }

    #[test]
    fn test_tight_iteration_cap_still_terminates() {
        // A single Illinois step cannot converge; bisection fallback takes over
        let params = Glicko2Parameters {
            max_iterations: 1,
            ..Default::default()
        };
        let player = rating(1500.0, 350.0, 0.06);
        let opponent = rating(2400.0, 30.0, 0.06);

        let result = update(&player, &[GameOutcome::against(&opponent, 1.0)], 1.0, &params);
        match result {
            Ok(r) => {
                assert!(r.rating.is_finite());
                assert!(r.volatility > 0.0);
            }
            Err(RatingError::NonConvergence { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_extreme_upset_converges() {
        let params = Glicko2Parameters::default();
        let player = rating(800.0, 350.0, 0.06);
        let opponent = rating(2800.0, 40.0, 0.06);

        let result = update(&player, &[GameOutcome::against(&opponent, 1.0)], 1.0, &params).unwrap();
        assert!(result.rating > 800.0);
        assert!(result.deviation < 350.0);
        assert!(result.volatility.is_finite());
    }

    #[test]
    fn test_default_players_single_game_scenario() {
        let policy = create_test_policy();
        let now = Utc::now();
        let a = policy.initial_record(ParticipantId::new(1, "ryu"), now);
        let b = policy.initial_record(ParticipantId::new(2, "ken"), now);

        let update = policy.apply_result(&a, &b, now).unwrap();

        assert!(update.winner.after.rating > 1500.0);
        assert!(update.winner.after.rating_deviation < 350.0);
        assert!(update.loser.after.rating < 1500.0);
        assert!(update.loser.after.rating_deviation < 350.0);
        assert_eq!(update.winner.after.games_played, 1);
        assert_eq!(update.loser.after.last_rated_at, now);
    }

    #[test]
    fn test_rating_floor_clamps_loser() {
        let settings = Glicko2Settings {
            rating_floor: Some(1500.0),
            ..Default::default()
        };
        let policy = Glicko2Policy::new(settings, BracketTable::default(), Duration::from_secs(86_400));
        let now = Utc::now();
        let a = policy.initial_record(ParticipantId::new(1, "ryu"), now);
        let b = policy.initial_record(ParticipantId::new(2, "ken"), now);

        let update = policy.apply_result(&a, &b, now).unwrap();
        assert_eq!(update.loser.after.rating, 1500.0);
        assert!(update.winner.after.rating > 1500.0);
    }

    #[test]
    fn test_bracket_promotion_flag() {
        let policy = create_test_policy();
        let now = Utc::now();
        let mut a = policy.initial_record(ParticipantId::new(1, "ryu"), now);
        a.rating = 1595.0;
        a.rating_deviation = 120.0;
        let mut b = policy.initial_record(ParticipantId::new(2, "ken"), now);
        b.rating = 1700.0;
        b.rating_deviation = 120.0;

        let update = policy.apply_result(&a, &b, now).unwrap();
        assert_eq!(update.winner.bracket_before, "Ultimate");
        assert_eq!(update.winner.bracket_after, "Unrivaled");
        assert_eq!(update.winner.bracket_change, BracketChange::Promoted);
    }

    #[test]
    fn test_inactivity_uses_elapsed_periods() {
        let policy = create_test_policy();
        let start = Utc::now();
        let record = policy.initial_record(ParticipantId::new(1, "ryu"), start);
        let mut record = RatingRecord {
            rating_deviation: 60.0,
            ..record
        };
        record.last_rated_at = start;

        let later = start + chrono::Duration::days(2);
        let inflated = policy.apply_inactivity(&record, later).unwrap();

        let expected = ((60.0 / GLICKO2_SCALE).powi(2) + 2.0 * 0.06f64.powi(2)).sqrt() * GLICKO2_SCALE;
        assert!((inflated.rating_deviation - expected).abs() < 1e-9);
        assert_eq!(inflated.last_rated_at, later);
        assert_eq!(inflated.games_played, 0);
    }
}
