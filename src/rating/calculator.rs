//! Rating calculator trait
//!
//! This module defines the interface the matchmaking service uses to turn a
//! ranked result into a rating change.

/// Trait for calculating rating changes after ranked matches
pub trait RatingCalculator: Send + Sync {
    /// Rating change for the player rated `rating_self`
    ///
    /// # Arguments
    /// * `rating_self` - Current rating of the player the delta is for
    /// * `rating_opponent` - Current rating of their opponent
    /// * `did_win` - Whether `rating_self` won
    ///
    /// # Returns
    /// The delta to add to `rating_self`; the opponent receives its negation.
    fn rating_delta(&self, rating_self: i64, rating_opponent: i64, did_win: bool) -> i64;

    /// Get the initial rating for new players
    fn initial_rating(&self) -> i64;

    /// Get current configuration as JSON
    fn config(&self) -> serde_json::Value;
}

/// Calculator that always returns a fixed delta, for tests
#[derive(Debug, Clone)]
pub struct FixedDeltaCalculator {
    delta: i64,
}

impl FixedDeltaCalculator {
    pub fn new(delta: i64) -> Self {
        Self { delta }
    }
}

impl RatingCalculator for FixedDeltaCalculator {
    fn rating_delta(&self, _rating_self: i64, _rating_opponent: i64, did_win: bool) -> i64 {
        if did_win {
            self.delta
        } else {
            -self.delta
        }
    }

    fn initial_rating(&self) -> i64 {
        crate::types::DEFAULT_RATING
    }

    fn config(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "fixed",
            "delta": self.delta
        })
    }
}
