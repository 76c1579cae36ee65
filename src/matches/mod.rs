//! Match lifecycle
//!
//! Active matches from pairing to reported result.

pub mod lifecycle;

pub use lifecycle::MatchLifecycle;
