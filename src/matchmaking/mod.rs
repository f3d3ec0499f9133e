//! Queues, pairing and the ranked match registry

pub mod manager;
pub mod queue;
pub mod registry;

pub use manager::{MatchmakingManager, MatchmakingStats, DEFAULT_LEADERBOARD_SIZE};
pub use queue::{MatchQueue, QueueEntry};
pub use registry::{ActiveMatch, MatchRegistry};
