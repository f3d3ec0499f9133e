//! Elo rating system implementation
//!
//! This module provides the rating delta used for ranked 1v1 results, built on
//! the Elo expected-score function from the skillratings crate.
//!
//! A delta is always derived from the winner's perspective and handed to the
//! loser negated, so the two players' changes sum to exactly zero even after
//! rounding.

use crate::rating::calculator::RatingCalculator;
use crate::types::DEFAULT_RATING;
use skillratings::elo::{EloConfig, EloRating};

/// Sensitivity of a single result
pub const K_FACTOR: f64 = 32.0;

/// Probability that `rating_self` beats `rating_opponent`
pub fn expected_score(rating_self: i64, rating_opponent: i64) -> f64 {
    let (expected, _) = skillratings::elo::expected_score(
        &EloRating {
            rating: rating_self as f64,
        },
        &EloRating {
            rating: rating_opponent as f64,
        },
    );
    expected
}

/// Rating change for `rating_self` after playing `rating_opponent` with K = 32
pub fn compute_delta(rating_self: i64, rating_opponent: i64, did_win: bool) -> i64 {
    delta_with_k(K_FACTOR, rating_self, rating_opponent, did_win)
}

fn delta_with_k(k: f64, rating_self: i64, rating_opponent: i64, did_win: bool) -> i64 {
    if did_win {
        winner_gain(k, rating_self, rating_opponent)
    } else {
        // K * (0 - E(self)) == -(K * (1 - E(opponent)))
        -winner_gain(k, rating_opponent, rating_self)
    }
}

fn winner_gain(k: f64, winner: i64, loser: i64) -> i64 {
    (k * (1.0 - expected_score(winner, loser))).round() as i64
}

/// Elo rating calculator used by the matchmaking service
#[derive(Debug, Clone)]
pub struct EloRatingCalculator {
    config: EloConfig,
    initial_rating: i64,
}

impl EloRatingCalculator {
    /// Create a calculator with the standard K-factor of 32
    pub fn new() -> Self {
        Self {
            config: EloConfig { k: K_FACTOR },
            initial_rating: DEFAULT_RATING,
        }
    }

    pub fn k_factor(&self) -> f64 {
        self.config.k
    }
}

impl Default for EloRatingCalculator {
    fn default() -> Self {
        Self::new()
    }
}

impl RatingCalculator for EloRatingCalculator {
    fn rating_delta(&self, rating_self: i64, rating_opponent: i64, did_win: bool) -> i64 {
        delta_with_k(self.config.k, rating_self, rating_opponent, did_win)
    }

    fn initial_rating(&self) -> i64 {
        self.initial_rating
    }

    fn config(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "elo",
            "k_factor": self.config.k,
            "initial_rating": self.initial_rating
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_equal_ratings_win() {
        assert_eq!(compute_delta(500, 500, true), 16);
        assert_eq!(compute_delta(500, 500, false), -16);
    }

    #[test]
    fn test_expected_score_symmetry() {
        let e = expected_score(600, 500);
        assert!((e - 0.6401).abs() < 1e-3);
        assert!((e + expected_score(500, 600) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_favourite_gains_less() {
        // E(600 vs 500) ~ 0.64 -> 32 * 0.36 = 11.52
        assert_eq!(compute_delta(600, 500, true), 12);
        // underdog wins: 32 * 0.64 = 20.48
        assert_eq!(compute_delta(500, 600, true), 20);
        assert_eq!(compute_delta(600, 500, false), -20);
    }

    #[test]
    fn test_lopsided_match() {
        assert_eq!(compute_delta(2500, 500, true), 0);
        assert_eq!(compute_delta(500, 2500, true), 32);
        assert_eq!(compute_delta(2500, 500, false), -32);
    }

    #[test]
    fn test_second_match_after_first_result() {
        // 516 beat 484 once; the same winner again earns less than 16
        let delta = compute_delta(516, 484, true);
        assert_eq!(delta, 15);
    }

    #[test]
    fn test_calculator_matches_free_function() {
        let calculator = EloRatingCalculator::default();
        assert_eq!(calculator.k_factor(), 32.0);
        assert_eq!(calculator.initial_rating(), 500);
        assert_eq!(calculator.rating_delta(480, 530, true), compute_delta(480, 530, true));

        let config = calculator.config();
        assert_eq!(config["type"], "elo");
        assert_eq!(config["k_factor"], 32.0);
    }

    proptest! {
        #[test]
        fn prop_delta_is_zero_sum(r1 in -5_000i64..5_000, r2 in -5_000i64..5_000) {
            prop_assert_eq!(compute_delta(r1, r2, true), -compute_delta(r2, r1, false));
        }

        #[test]
        fn prop_delta_bounded_by_k(r1 in -5_000i64..5_000, r2 in -5_000i64..5_000, won: bool) {
            let delta = compute_delta(r1, r2, won);
            prop_assert!(delta.abs() <= 32);
            if won {
                prop_assert!(delta >= 0);
            } else {
                prop_assert!(delta <= 0);
            }
        }
    }
}
