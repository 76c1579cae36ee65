//! Matchmaking queue
//!
//! This module contains the waiting-queue data structures and the pairing
//! search that runs over them.

pub mod history;
pub mod matcher;
pub mod store;

// Re-export commonly used types
pub use history::RecentOpponents;
pub use matcher::{Matchmaker, Pairing, PassOutcome, PassStop};
pub use store::QueueStore;
