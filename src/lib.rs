//! Ladder Room - casual and ranked matchmaking with an Elo ladder
//!
//! This crate provides FIFO casual and ranked queues, a ranked match registry,
//! Elo rating updates over a durable player store, a leaderboard, and the
//! AMQP and HTTP plumbing to run it as a service.

pub mod amqp;
pub mod config;
pub mod error;
pub mod matchmaking;
pub mod metrics;
pub mod rating;
pub mod service;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{MatchmakingError, Result};
pub use types::*;

// Re-export key components
pub use amqp::publisher::EventPublisher;
pub use matchmaking::{MatchmakingManager, MatchmakingStats};
pub use rating::{InMemoryPlayerStore, PlayerStore, SqlitePlayerStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
