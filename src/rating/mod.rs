//! Ranked rating system using Elo
//!
//! This module provides the Elo rating delta, the calculator interface the
//! matchmaking service depends on, and player record storage.

pub mod calculator;
pub mod elo;
pub mod sqlite;
pub mod storage;

// Re-export commonly used types
pub use calculator::{FixedDeltaCalculator, RatingCalculator};
pub use elo::{compute_delta, expected_score, EloRatingCalculator, K_FACTOR};
pub use sqlite::SqlitePlayerStore;
pub use storage::{InMemoryPlayerStore, PlayerStore, RecordDelta};
