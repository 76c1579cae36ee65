//! Ladder simulator CLI
//!
//! Runs the matchmaking service in-process against synthetic players with a
//! hidden skill and reports how well the ladder recovers it.
//!
//! Usage:
//!   cargo run --bin ladder-sim -- --players 64 --rounds 200
//!   cargo run --bin ladder-sim -- --policy tiered --seed 7

use anyhow::Result;
use clap::{Parser, ValueEnum};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use ranked_ladder::amqp::LoggingEventPublisher;
use ranked_ladder::config::{MatchmakingSettings, RatingPolicyKind, RatingSettings};
use ranked_ladder::error::QueueError;
use ranked_ladder::metrics::MetricsCollector;
use ranked_ladder::rating::glicko2::{expected_score, Glicko2Rating};
use ranked_ladder::rating::{build_policy, InMemoryParticipantRepository};
use ranked_ladder::service::MatchmakingService;
use ranked_ladder::types::UserId;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

const CHARACTER: &str = "main";

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Policy {
    Glicko2,
    Tiered,
}

#[derive(Parser)]
#[command(name = "ladder-sim")]
#[command(about = "Simulate a ranked ladder with synthetic players of hidden skill")]
struct Cli {
    /// Number of synthetic players
    #[arg(short, long, default_value_t = 32)]
    players: u64,

    /// Matchmaking passes to run
    #[arg(short, long, default_value_t = 100)]
    rounds: usize,

    /// RNG seed for reproducible runs
    #[arg(short, long, default_value_t = 42)]
    seed: u64,

    /// Rating policy
    #[arg(long, value_enum, default_value_t = Policy::Glicko2)]
    policy: Policy,

    /// Concurrent match cap
    #[arg(long, default_value_t = 16)]
    max_active_matches: usize,

    /// Recent opponents each player avoids
    #[arg(long, default_value_t = 3)]
    recent_opponents: usize,

    /// Leaderboard rows to print
    #[arg(long, default_value_t = 20)]
    top: usize,

    /// Hidden skill range, public rating scale
    #[arg(long, default_value_t = 1000.0)]
    min_skill: f64,

    #[arg(long, default_value_t = 2000.0)]
    max_skill: f64,
}

/// Probability that a player with `skill` beats one with `opponent_skill`
fn win_probability(skill: f64, opponent_skill: f64) -> f64 {
    let hidden = |rating| Glicko2Rating {
        rating,
        deviation: 30.0,
        volatility: 0.06,
    };
    expected_score(&hidden(skill), &hidden(opponent_skill))
}

/// Spearman rank correlation between hidden skill and ladder order
fn rank_correlation(skill_order: &[UserId], ladder_order: &[UserId]) -> f64 {
    let n = ladder_order.len();
    if n < 2 {
        return 1.0;
    }
    let skill_rank: HashMap<UserId, usize> = skill_order
        .iter()
        .enumerate()
        .map(|(rank, user)| (*user, rank))
        .collect();
    let sum_d2: f64 = ladder_order
        .iter()
        .enumerate()
        .filter_map(|(rank, user)| skill_rank.get(user).map(|s| (rank as f64 - *s as f64).powi(2)))
        .sum();
    let n = n as f64;
    1.0 - 6.0 * sum_d2 / (n * (n * n - 1.0))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    if cli.min_skill >= cli.max_skill {
        anyhow::bail!("--min-skill must be below --max-skill");
    }

    let rating_settings = RatingSettings {
        policy: match cli.policy {
            Policy::Glicko2 => RatingPolicyKind::Glicko2,
            Policy::Tiered => RatingPolicyKind::Tiered,
        },
        ..RatingSettings::default()
    };
    let settings = MatchmakingSettings {
        max_active_matches: cli.max_active_matches,
        recent_opponents_limit: cli.recent_opponents,
        // Passes are forced below; keep the timer out of the way
        matchmaking_delay_ms: 3_600_000,
        ..MatchmakingSettings::default()
    };

    let service = MatchmakingService::new(
        settings,
        build_policy(&rating_settings),
        Arc::new(InMemoryParticipantRepository::new()),
        Arc::new(LoggingEventPublisher),
        Arc::new(MetricsCollector::new()?),
    );

    let mut rng = StdRng::seed_from_u64(cli.seed);
    let mut skills: HashMap<UserId, f64> = HashMap::new();
    for user_id in 1..=cli.players {
        let skill = rng.gen_range(cli.min_skill..cli.max_skill);
        skills.insert(user_id, skill);
        service.register_character(user_id, CHARACTER).await?;
    }

    println!(
        "Simulating {} players for {} rounds ({:?} policy, seed {})",
        cli.players, cli.rounds, cli.policy, cli.seed
    );

    let mut upsets = 0usize;
    let mut reported = 0usize;
    for round in 0..cli.rounds {
        for user_id in 1..=cli.players {
            match service.join_queue(user_id, CHARACTER).await {
                Ok(_) | Err(QueueError::AlreadyQueued { .. }) | Err(QueueError::AlreadyInMatch { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }

        let created = service.run_matchmaking_pass().await;
        debug!("Round {}: {} matches", round, created.len());

        for event in created {
            let a = event.participant_a.user_id;
            let b = event.participant_b.user_id;
            let (skill_a, skill_b) = (skills[&a], skills[&b]);
            let a_wins = rng.gen_bool(win_probability(skill_a, skill_b).clamp(0.0, 1.0));
            let winner = if a_wins { a } else { b };
            if (a_wins && skill_a < skill_b) || (!a_wins && skill_b < skill_a) {
                upsets += 1;
            }
            service.report_result(event.match_id, winner).await?;
            reported += 1;
        }
    }

    let leaderboard = service.leaderboard(cli.players as usize).await?;
    println!();
    println!(
        "{:>4}  {:<10} {:>9} {:>7} {:>12} {:>6} {:>11}",
        "Rank", "Player", "Rating", "RD", "Bracket", "Games", "Hidden"
    );
    for entry in leaderboard.iter().take(cli.top) {
        println!(
            "{:>4}  {:<10} {:>9.1} {:>7.1} {:>12} {:>6} {:>11.1}",
            entry.rank,
            entry.participant.to_string(),
            entry.rating,
            entry.rating_deviation,
            entry.bracket,
            entry.games_played,
            skills[&entry.participant.user_id]
        );
    }

    let mut skill_order: Vec<UserId> = skills.keys().copied().collect();
    skill_order.sort_by(|a, b| skills[b].total_cmp(&skills[a]));
    let ladder_order: Vec<UserId> = leaderboard
        .iter()
        .map(|entry| entry.participant.user_id)
        .collect();

    let stats = service.get_stats().await;
    println!();
    println!("Matches reported:   {}", reported);
    println!(
        "Upsets:             {} ({:.1}%)",
        upsets,
        if reported > 0 {
            upsets as f64 * 100.0 / reported as f64
        } else {
            0.0
        }
    );
    println!("Passes run:         {}", stats.passes_run);
    println!("Players queued:     {}", stats.players_queued);
    println!("Still waiting:      {}", stats.queue_length);
    println!(
        "Rank correlation:   {:.3}",
        rank_correlation(&skill_order, &ladder_order)
    );

    service.shutdown().await;
    Ok(())
}
