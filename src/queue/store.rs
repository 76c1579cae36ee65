//! Queue store
//!
//! Holds the single FIFO of waiting participants together with the metadata
//! the matchmaker needs: recent-opponent history, in-queue and in-match
//! flags. The store is not synchronised itself; the service keeps it behind
//! one async mutex so a whole matchmaking pass runs without interleaving.

use crate::error::QueueError;
use crate::queue::history::RecentOpponents;
use crate::types::{ParticipantId, QueueEntry, QueuePosition, RatingRecord, UserId};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

#[derive(Debug, Clone)]
struct ParticipantMeta {
    in_queue: bool,
    recent_opponents: RecentOpponents,
}

/// Waiting participants and their queue metadata
#[derive(Debug)]
pub struct QueueStore {
    waiting: VecDeque<QueueEntry>,
    /// Survives leaving the queue so rematch vetoes outlive a requeue
    participants: HashMap<ParticipantId, ParticipantMeta>,
    in_match: HashSet<UserId>,
    recent_opponents_limit: usize,
    open: bool,
}

impl QueueStore {
    pub fn new(recent_opponents_limit: usize, open: bool) -> Self {
        Self {
            waiting: VecDeque::new(),
            participants: HashMap::new(),
            in_match: HashSet::new(),
            recent_opponents_limit,
            open,
        }
    }

    /// Insert at the tail of the queue
    pub fn enqueue(&mut self, entry: QueueEntry) -> Result<QueuePosition, QueueError> {
        if !self.open {
            return Err(QueueError::QueueClosed);
        }
        if self.in_match.contains(&entry.participant.user_id) {
            return Err(QueueError::AlreadyInMatch {
                user_id: entry.participant.user_id,
            });
        }

        let limit = self.recent_opponents_limit;
        let meta = self
            .participants
            .entry(entry.participant.clone())
            .or_insert_with(|| ParticipantMeta {
                in_queue: false,
                recent_opponents: RecentOpponents::new(limit),
            });
        if meta.in_queue {
            return Err(QueueError::AlreadyQueued {
                participant: entry.participant,
            });
        }
        meta.in_queue = true;

        debug!("Enqueued {} at position {}", entry.participant, self.waiting.len() + 1);
        self.waiting.push_back(entry);
        Ok(QueuePosition {
            position: self.waiting.len(),
            queue_length: self.waiting.len(),
        })
    }

    /// Remove a waiting participant regardless of position
    pub fn dequeue(&mut self, participant: &ParticipantId) -> Option<QueueEntry> {
        let index = self
            .waiting
            .iter()
            .position(|entry| &entry.participant == participant)?;
        let entry = self.waiting.remove(index)?;
        if let Some(meta) = self.participants.get_mut(participant) {
            meta.in_queue = false;
        }
        Some(entry)
    }

    /// Remove every waiting character of a user
    pub fn dequeue_user(&mut self, user_id: UserId) -> Vec<QueueEntry> {
        let targets: Vec<ParticipantId> = self
            .waiting
            .iter()
            .filter(|entry| entry.participant.user_id == user_id)
            .map(|entry| entry.participant.clone())
            .collect();
        targets
            .iter()
            .filter_map(|participant| self.dequeue(participant))
            .collect()
    }

    /// Waiting entries in FIFO arrival order
    pub fn peek_all_ordered_by_arrival(&self) -> impl Iterator<Item = &QueueEntry> {
        self.waiting.iter()
    }

    /// Take the head for a pairing attempt. The entry stays flagged as queued
    /// and must come back through `push_back` or leave through `pair`.
    pub fn pop_front(&mut self) -> Option<QueueEntry> {
        self.waiting.pop_front()
    }

    /// Return an entry taken by `pop_front` to the tail
    pub fn push_back(&mut self, entry: QueueEntry) {
        self.waiting.push_back(entry);
    }

    /// Complete a pairing between a popped anchor and a waiting opponent
    pub fn pair(
        &mut self,
        anchor: QueueEntry,
        opponent: &ParticipantId,
    ) -> Option<(QueueEntry, QueueEntry)> {
        let opponent = self.dequeue(opponent)?;

        for (me, them) in [
            (&anchor.participant, opponent.participant.user_id),
            (&opponent.participant, anchor.participant.user_id),
        ] {
            if let Some(meta) = self.participants.get_mut(me) {
                meta.in_queue = false;
                meta.recent_opponents.push(them);
            }
        }
        self.in_match.insert(anchor.participant.user_id);
        self.in_match.insert(opponent.participant.user_id);

        Some((anchor, opponent))
    }

    /// Whether either side remembers the other as a recent opponent
    pub fn met_recently(&self, a: &ParticipantId, b: &ParticipantId) -> bool {
        let remembers = |me: &ParticipantId, them: UserId| {
            self.participants
                .get(me)
                .is_some_and(|meta| meta.recent_opponents.contains(them))
        };
        remembers(a, b.user_id) || remembers(b, a.user_id)
    }

    pub fn recent_opponents(&self, participant: &ParticipantId) -> Vec<UserId> {
        self.participants
            .get(participant)
            .map(|meta| meta.recent_opponents.to_vec())
            .unwrap_or_default()
    }

    pub fn is_queued(&self, participant: &ParticipantId) -> bool {
        self.participants
            .get(participant)
            .is_some_and(|meta| meta.in_queue)
    }

    pub fn is_user_in_match(&self, user_id: UserId) -> bool {
        self.in_match.contains(&user_id)
    }

    pub fn mark_in_match(&mut self, user_id: UserId) {
        self.in_match.insert(user_id);
    }

    pub fn clear_in_match(&mut self, user_id: UserId) -> bool {
        self.in_match.remove(&user_id)
    }

    /// Replace the rating snapshot of a waiting entry
    pub fn refresh_rating(&mut self, record: RatingRecord) -> bool {
        match self
            .waiting
            .iter_mut()
            .find(|entry| entry.participant == record.participant)
        {
            Some(entry) => {
                entry.rating = record;
                true
            }
            None => false,
        }
    }

    /// Drop all queue state for an unregistered character
    pub fn forget(&mut self, participant: &ParticipantId) -> Option<QueueEntry> {
        let entry = self.dequeue(participant);
        self.participants.remove(participant);
        entry
    }

    pub fn set_recent_opponents_limit(&mut self, limit: usize) {
        self.recent_opponents_limit = limit;
        for meta in self.participants.values_mut() {
            meta.recent_opponents.resize(limit);
        }
    }

    pub fn recent_opponents_limit(&self) -> usize {
        self.recent_opponents_limit
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Open or close the queue; closing drains every waiting entry
    pub fn set_open(&mut self, open: bool) -> Vec<QueueEntry> {
        self.open = open;
        if open {
            return Vec::new();
        }
        let drained: Vec<QueueEntry> = self.waiting.drain(..).collect();
        for entry in &drained {
            if let Some(meta) = self.participants.get_mut(&entry.participant) {
                meta.in_queue = false;
            }
        }
        drained
    }

    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }

    pub fn in_match_count(&self) -> usize {
        self.in_match.len()
    }
}
