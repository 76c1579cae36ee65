//! Pairing search over the waiting queue
//!
//! One pass repeatedly takes the head of the queue as an anchor, orders the
//! other waiting entries by the policy's matchmaking distance (stable, so
//! FIFO order breaks ties) and accepts the first candidate that is not the
//! same user, not a recent opponent and not already in a match.

use crate::queue::store::QueueStore;
use crate::rating::RatingPolicy;
use crate::types::{ParticipantId, QueueEntry};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Two entries that were taken out of the queue together
#[derive(Debug, Clone)]
pub struct Pairing {
    pub anchor: QueueEntry,
    pub opponent: QueueEntry,
}

/// Why a pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassStop {
    MatchCapReached,
    TooFewEntries,
    /// Remaining entries could not be paired with each other
    Exhausted,
}

#[derive(Debug, Clone)]
pub struct PassOutcome {
    pub pairings: Vec<Pairing>,
    pub stop: PassStop,
    pub no_match_count: usize,
}

/// Rating-distance matchmaker
pub struct Matchmaker {
    policy: Arc<dyn RatingPolicy>,
}

impl Matchmaker {
    pub fn new(policy: Arc<dyn RatingPolicy>) -> Self {
        Self { policy }
    }

    /// Run one pass, creating at most `available_slots` pairings.
    /// Entries in `sitting_out` stay queued but are neither anchors nor candidates.
    pub fn run_pass(
        &self,
        store: &mut QueueStore,
        available_slots: usize,
        sitting_out: &HashSet<ParticipantId>,
    ) -> PassOutcome {
        let abort_after = store.len() / 2;
        let mut pairings = Vec::new();
        let mut no_match_count = 0;

        let stop = loop {
            if pairings.len() >= available_slots {
                break PassStop::MatchCapReached;
            }
            if store.len() < 2 {
                break PassStop::TooFewEntries;
            }
            let Some(anchor) = store.pop_front() else {
                break PassStop::TooFewEntries;
            };

            let opponent = if sitting_out.contains(&anchor.participant)
                || store.is_user_in_match(anchor.participant.user_id)
            {
                None
            } else {
                self.find_opponent(&anchor, store, sitting_out)
            };

            match opponent.and_then(|opponent| store.pair(anchor.clone(), &opponent)) {
                Some((anchor, opponent)) => {
                    info!(
                        "Paired {} ({:.0}) with {} ({:.0})",
                        anchor.participant,
                        anchor.rating.rating,
                        opponent.participant,
                        opponent.rating.rating
                    );
                    pairings.push(Pairing { anchor, opponent });
                }
                None => {
                    debug!("No opponent for {}, returning to tail", anchor.participant);
                    store.push_back(anchor);
                    no_match_count += 1;
                    if no_match_count > abort_after {
                        break PassStop::Exhausted;
                    }
                }
            }
        };

        debug!(
            "Matchmaking pass finished: {} pairings, {} misses, stop={:?}",
            pairings.len(),
            no_match_count,
            stop
        );
        PassOutcome {
            pairings,
            stop,
            no_match_count,
        }
    }

    /// Waiting entries ordered as candidates for `anchor`
    pub fn ordered_candidates<'a>(
        &self,
        anchor: &QueueEntry,
        store: &'a QueueStore,
    ) -> Vec<&'a QueueEntry> {
        let mut candidates: Vec<(f64, &QueueEntry)> = store
            .peek_all_ordered_by_arrival()
            .filter(|entry| entry.participant != anchor.participant)
            .map(|entry| {
                (
                    self.policy.matchmaking_distance(&anchor.rating, &entry.rating),
                    entry,
                )
            })
            .collect();
        // Stable sort keeps arrival order among equal distances
        candidates.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        candidates.into_iter().map(|(_, entry)| entry).collect()
    }

    fn find_opponent(
        &self,
        anchor: &QueueEntry,
        store: &QueueStore,
        sitting_out: &HashSet<ParticipantId>,
    ) -> Option<ParticipantId> {
        self.ordered_candidates(anchor, store)
            .into_iter()
            .find(|candidate| {
                let candidate = &candidate.participant;
                candidate.user_id != anchor.participant.user_id
                    && !sitting_out.contains(candidate)
                    && !store.is_user_in_match(candidate.user_id)
                    && !store.met_recently(&anchor.participant, candidate)
            })
            .map(|candidate| candidate.participant.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Glicko2Settings, TierSettings};
    use crate::rating::{BracketTable, Glicko2Policy, TieredPolicy};
    use crate::types::{RatingRecord, TierStanding, UserId};
    use crate::utils::current_timestamp;
    use proptest::prelude::*;
    use std::time::Duration;

    fn create_test_matchmaker() -> Matchmaker {
        Matchmaker::new(Arc::new(Glicko2Policy::new(
            Glicko2Settings::default(),
            BracketTable::default(),
            Duration::from_secs(86_400),
        )))
    }

    fn create_test_entry(user_id: UserId, character: &str, rating: f64) -> QueueEntry {
        let participant = ParticipantId::new(user_id, character);
        QueueEntry {
            participant: participant.clone(),
            rating: RatingRecord {
                participant,
                rating,
                rating_deviation: 200.0,
                volatility: 0.06,
                standing: TierStanding::default(),
                games_played: 0,
                last_rated_at: current_timestamp(),
            },
            enqueued_at: current_timestamp(),
        }
    }

    fn queue_of(entries: Vec<QueueEntry>) -> QueueStore {
        let mut store = QueueStore::new(2, true);
        for entry in entries {
            store.enqueue(entry).unwrap();
        }
        store
    }

    #[test]
    fn test_two_entries_pair() {
        let matchmaker = create_test_matchmaker();
        let mut store = queue_of(vec![
            create_test_entry(1, "ryu", 1500.0),
            create_test_entry(2, "ken", 1500.0),
        ]);

        let outcome = matchmaker.run_pass(&mut store, 3, &HashSet::new());

        assert_eq!(outcome.pairings.len(), 1);
        assert!(store.is_empty());
        assert_eq!(outcome.stop, PassStop::TooFewEntries);
    }

    #[test]
    fn test_closest_rating_wins_and_ties_follow_arrival() {
        let matchmaker = create_test_matchmaker();
        let mut store = queue_of(vec![
            create_test_entry(1, "ryu", 1500.0),
            create_test_entry(2, "ken", 1800.0),
            create_test_entry(3, "guile", 1450.0),
            create_test_entry(4, "chun", 1550.0),
        ]);

        let outcome = matchmaker.run_pass(&mut store, 1, &HashSet::new());

        // 1450 and 1550 tie; 3 arrived first
        assert_eq!(outcome.pairings.len(), 1);
        assert_eq!(outcome.pairings[0].opponent.participant.user_id, 3);
        assert_eq!(outcome.stop, PassStop::MatchCapReached);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_same_user_never_paired() {
        let matchmaker = create_test_matchmaker();
        let mut store = queue_of(vec![
            create_test_entry(1, "ryu", 1500.0),
            create_test_entry(1, "ken", 1500.0),
        ]);

        let outcome = matchmaker.run_pass(&mut store, 3, &HashSet::new());

        assert!(outcome.pairings.is_empty());
        assert_eq!(outcome.stop, PassStop::Exhausted);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_recent_opponents_vetoed() {
        let matchmaker = create_test_matchmaker();
        let mut store = queue_of(vec![
            create_test_entry(1, "ryu", 1500.0),
            create_test_entry(2, "ken", 1500.0),
        ]);
        let outcome = matchmaker.run_pass(&mut store, 3, &HashSet::new());
        assert_eq!(outcome.pairings.len(), 1);
        store.clear_in_match(1);
        store.clear_in_match(2);

        // Back in the queue with a third player far away in rating
        store.enqueue(create_test_entry(1, "ryu", 1500.0)).unwrap();
        store.enqueue(create_test_entry(2, "ken", 1500.0)).unwrap();
        store.enqueue(create_test_entry(3, "guile", 2100.0)).unwrap();

        let outcome = matchmaker.run_pass(&mut store, 3, &HashSet::new());
        assert_eq!(outcome.pairings.len(), 1);
        let pairing = &outcome.pairings[0];
        assert_eq!(pairing.anchor.participant.user_id, 1);
        assert_eq!(pairing.opponent.participant.user_id, 3);
    }

    #[test]
    fn test_in_match_user_skipped_as_candidate_and_anchor() {
        let matchmaker = create_test_matchmaker();
        let mut store = queue_of(vec![
            create_test_entry(1, "ryu", 1500.0),
            create_test_entry(2, "ken", 1500.0),
            create_test_entry(3, "guile", 1500.0),
        ]);
        store.mark_in_match(2);

        let outcome = matchmaker.run_pass(&mut store, 3, &HashSet::new());

        assert_eq!(outcome.pairings.len(), 1);
        assert_eq!(outcome.pairings[0].opponent.participant.user_id, 3);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_match_cap_limits_pairings() {
        let matchmaker = create_test_matchmaker();
        let mut store = queue_of((1..=6).map(|u| create_test_entry(u, "ryu", 1500.0)).collect());

        let outcome = matchmaker.run_pass(&mut store, 1, &HashSet::new());

        assert_eq!(outcome.pairings.len(), 1);
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn test_zero_slots_creates_nothing() {
        let matchmaker = create_test_matchmaker();
        let mut store = queue_of(vec![
            create_test_entry(1, "ryu", 1500.0),
            create_test_entry(2, "ken", 1500.0),
        ]);

        let outcome = matchmaker.run_pass(&mut store, 0, &HashSet::new());
        assert!(outcome.pairings.is_empty());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_sitting_out_entries_stay_queued() {
        let matchmaker = create_test_matchmaker();
        let mut store = queue_of(vec![
            create_test_entry(1, "ryu", 1500.0),
            create_test_entry(2, "ken", 1500.0),
        ]);
        let sitting_out: HashSet<_> = [ParticipantId::new(2, "ken")].into_iter().collect();

        let outcome = matchmaker.run_pass(&mut store, 3, &sitting_out);

        assert!(outcome.pairings.is_empty());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_tiered_bucket_order() {
        let matchmaker = Matchmaker::new(Arc::new(TieredPolicy::new(TierSettings::default())));
        let mut anchor = create_test_entry(1, "ryu", 0.0);
        anchor.rating.standing = TierStanding { tier: 3, points: 0 };
        let mut lower = create_test_entry(2, "ken", 0.0);
        lower.rating.standing = TierStanding { tier: 2, points: 0 };
        let mut higher = create_test_entry(3, "guile", 0.0);
        higher.rating.standing = TierStanding { tier: 4, points: 0 };
        let store = queue_of(vec![lower, higher]);

        let order: Vec<UserId> = matchmaker
            .ordered_candidates(&anchor, &store)
            .iter()
            .map(|entry| entry.participant.user_id)
            .collect();
        assert_eq!(order, vec![3, 2]);
    }

    proptest! {
        #[test]
        fn prop_pairings_never_share_user_or_repeat(
            users in proptest::collection::vec((0u64..6, 1200.0f64..1800.0), 2..24)
        ) {
            let matchmaker = create_test_matchmaker();
            let mut store = QueueStore::new(2, true);
            for (index, (user, rating)) in users.iter().enumerate() {
                let character = format!("c{}", index % 3);
                let _ = store.enqueue(create_test_entry(*user, &character, *rating));
            }

            let outcome = matchmaker.run_pass(&mut store, usize::MAX, &HashSet::new());

            let mut matched_users = HashSet::new();
            for pairing in &outcome.pairings {
                prop_assert_ne!(pairing.anchor.participant.user_id, pairing.opponent.participant.user_id);
                prop_assert!(matched_users.insert(pairing.anchor.participant.user_id));
                prop_assert!(matched_users.insert(pairing.opponent.participant.user_id));
            }
        }
    }
}
