//! Error types for the matchmaking service
//!
//! This module defines all error types using anyhow for consistent error handling
//! throughout the application. Callers that need to tell failure kinds apart
//! downcast to [`MatchmakingError`].

use crate::types::{PlayerId, QueueKind};

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific matchmaking scenarios
#[derive(Debug, thiserror::Error)]
pub enum MatchmakingError {
    #[error("Player {player_id} is already in the {queue} queue")]
    AlreadyQueued { player_id: PlayerId, queue: QueueKind },

    #[error("No active ranked match between {reporter} and {opponent}")]
    NoActiveMatch {
        reporter: PlayerId,
        opponent: PlayerId,
    },

    #[error("Player {player_id} still has an unreported ranked match against {opponent}")]
    MatchInProgress {
        player_id: PlayerId,
        opponent: PlayerId,
    },

    #[error("Storage error: {message}")]
    StorageError { message: String },

    #[error("Consistency fault: {message}")]
    ConsistencyFault { message: String },

    #[error("Invalid command: {reason}")]
    InvalidCommand { reason: String },

    #[error("AMQP connection failed: {message}")]
    AmqpConnectionFailed { message: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}

impl MatchmakingError {
    /// Stable machine-readable name of the failure kind
    pub fn kind(&self) -> &'static str {
        match self {
            MatchmakingError::AlreadyQueued { .. } => "already_queued",
            MatchmakingError::NoActiveMatch { .. } => "no_active_match",
            MatchmakingError::MatchInProgress { .. } => "match_in_progress",
            MatchmakingError::StorageError { .. } => "storage_error",
            MatchmakingError::ConsistencyFault { .. } => "consistency_fault",
            MatchmakingError::InvalidCommand { .. } => "invalid_command",
            MatchmakingError::AmqpConnectionFailed { .. } => "amqp_connection_failed",
            MatchmakingError::ConfigurationError { .. } => "configuration_error",
            MatchmakingError::InternalError { .. } => "internal_error",
        }
    }

    /// Short text a collaborator can show to the user who issued the command
    pub fn user_message(&self) -> String {
        match self {
            MatchmakingError::AlreadyQueued { queue, .. } => {
                format!("You are already in the {} queue.", queue)
            }
            MatchmakingError::NoActiveMatch { .. } => {
                "No active match with this opponent.".to_string()
            }
            MatchmakingError::MatchInProgress { .. } => {
                "Report your current ranked match before queueing again.".to_string()
            }
            MatchmakingError::StorageError { .. } => {
                "Player records are unavailable right now, try again later.".to_string()
            }
            MatchmakingError::InvalidCommand { reason } => format!("Invalid command: {}", reason),
            MatchmakingError::ConsistencyFault { .. }
            | MatchmakingError::AmqpConnectionFailed { .. }
            | MatchmakingError::ConfigurationError { .. }
            | MatchmakingError::InternalError { .. } => {
                "Something went wrong on our side.".to_string()
            }
        }
    }

    /// Build a storage error from any displayable backend failure
    pub fn storage(err: impl std::fmt::Display) -> Self {
        MatchmakingError::StorageError {
            message: err.to_string(),
        }
    }

    /// Find the matchmaking error inside an anyhow chain, if there is one
    pub fn find(err: &anyhow::Error) -> Option<&MatchmakingError> {
        err.chain()
            .find_map(|cause| cause.downcast_ref::<MatchmakingError>())
    }
}
