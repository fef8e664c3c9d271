//! Candidate scoring and top-N ranking.
//!
//! Fuses per-horizon purchase probabilities, expected quantities, and the product surplus ratio
//! into one score per candidate.

mod scoring;
mod types;

pub use scoring::ScoreRanker;
pub use types::*;

/// Recommendations returned when the caller does not choose a list length.
pub const DEFAULT_TOP_N: usize = 5;
