//! Cross-checks the Glicko-2 update against the skillratings crate
//!
//! skillratings runs one standard rating period per game, which matches
//! `update` with exactly one elapsed period.

use proptest::prelude::*;
use ranked_ladder::rating::glicko2::{update, GameOutcome, Glicko2Parameters, Glicko2Rating};
use skillratings::glicko2::{glicko2, Glicko2Config};
use skillratings::Outcomes;

const RATING_TOLERANCE: f64 = 0.01;
const VOLATILITY_TOLERANCE: f64 = 1e-4;

fn create_test_params() -> Glicko2Parameters {
    Glicko2Parameters {
        tau: 0.3,
        ..Glicko2Parameters::default()
    }
}

fn create_reference_config() -> Glicko2Config {
    let mut config = Glicko2Config::new();
    config.tau = 0.3;
    config.convergence_tolerance = 1e-6;
    config
}

fn to_reference(rating: &Glicko2Rating) -> skillratings::glicko2::Glicko2Rating {
    skillratings::glicko2::Glicko2Rating {
        rating: rating.rating,
        deviation: rating.deviation,
        volatility: rating.volatility,
    }
}

fn assert_close(ours: &Glicko2Rating, reference: &skillratings::glicko2::Glicko2Rating) {
    assert!(
        (ours.rating - reference.rating).abs() < RATING_TOLERANCE,
        "rating {} vs {}",
        ours.rating,
        reference.rating
    );
    assert!(
        (ours.deviation - reference.deviation).abs() < RATING_TOLERANCE,
        "deviation {} vs {}",
        ours.deviation,
        reference.deviation
    );
    assert!(
        (ours.volatility - reference.volatility).abs() < VOLATILITY_TOLERANCE,
        "volatility {} vs {}",
        ours.volatility,
        reference.volatility
    );
}

/// Winner and loser after one game, through our update
fn play(winner: &Glicko2Rating, loser: &Glicko2Rating) -> (Glicko2Rating, Glicko2Rating) {
    let params = create_test_params();
    let winner_after = update(winner, &[GameOutcome::against(loser, 1.0)], 1.0, &params).unwrap();
    let loser_after = update(loser, &[GameOutcome::against(winner, 0.0)], 1.0, &params).unwrap();
    (winner_after, loser_after)
}

#[test]
fn test_single_game_matches_reference() {
    let winner = Glicko2Rating {
        rating: 1500.0,
        deviation: 200.0,
        volatility: 0.06,
    };
    let loser = Glicko2Rating {
        rating: 1400.0,
        deviation: 30.0,
        volatility: 0.06,
    };

    let (winner_after, loser_after) = play(&winner, &loser);
    let (reference_winner, reference_loser) = glicko2(
        &to_reference(&winner),
        &to_reference(&loser),
        &Outcomes::WIN,
        &create_reference_config(),
    );

    assert_close(&winner_after, &reference_winner);
    assert_close(&loser_after, &reference_loser);
}

#[test]
fn test_new_players_match_reference() {
    let fresh = Glicko2Rating {
        rating: 1500.0,
        deviation: 350.0,
        volatility: 0.06,
    };

    let (winner_after, loser_after) = play(&fresh, &fresh);
    let (reference_winner, reference_loser) = glicko2(
        &to_reference(&fresh),
        &to_reference(&fresh),
        &Outcomes::WIN,
        &create_reference_config(),
    );

    assert_close(&winner_after, &reference_winner);
    assert_close(&loser_after, &reference_loser);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_random_games_match_reference(
        winner_rating in 1000.0f64..2000.0,
        winner_deviation in 50.0f64..350.0,
        loser_rating in 1000.0f64..2000.0,
        loser_deviation in 50.0f64..350.0,
    ) {
        let winner = Glicko2Rating {
            rating: winner_rating,
            deviation: winner_deviation,
            volatility: 0.06,
        };
        let loser = Glicko2Rating {
            rating: loser_rating,
            deviation: loser_deviation,
            volatility: 0.06,
        };

        let (winner_after, loser_after) = play(&winner, &loser);
        let (reference_winner, reference_loser) = glicko2(
            &to_reference(&winner),
            &to_reference(&loser),
            &Outcomes::WIN,
            &create_reference_config(),
        );

        prop_assert!((winner_after.rating - reference_winner.rating).abs() < RATING_TOLERANCE);
        prop_assert!((loser_after.rating - reference_loser.rating).abs() < RATING_TOLERANCE);
        prop_assert!((winner_after.deviation - reference_winner.deviation).abs() < RATING_TOLERANCE);
        prop_assert!((loser_after.deviation - reference_loser.deviation).abs() < RATING_TOLERANCE);
    }
}
