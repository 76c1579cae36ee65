//! Bounded recent-opponent history

use crate::types::UserId;
use std::collections::VecDeque;

/// Fixed-capacity ring buffer of the last opponents a participant faced
#[derive(Debug, Clone, Default)]
pub struct RecentOpponents {
    opponents: VecDeque<UserId>,
    capacity: usize,
}

impl RecentOpponents {
    pub fn new(capacity: usize) -> Self {
        Self {
            opponents: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record an opponent, evicting the oldest when full
    pub fn push(&mut self, opponent: UserId) {
        if self.capacity == 0 {
            return;
        }
        while self.opponents.len() >= self.capacity {
            self.opponents.pop_front();
        }
        self.opponents.push_back(opponent);
    }

    pub fn contains(&self, opponent: UserId) -> bool {
        self.opponents.contains(&opponent)
    }

    /// Change the capacity, keeping the most recent entries
    pub fn resize(&mut self, capacity: usize) {
        self.capacity = capacity;
        while self.opponents.len() > capacity {
            self.opponents.pop_front();
        }
    }

    /// Oldest first
    pub fn to_vec(&self) -> Vec<UserId> {
        self.opponents.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.opponents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.opponents.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
