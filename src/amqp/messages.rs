//! AMQP message definitions and serialization

use crate::error::{MatchmakingError, Result};
use crate::types::*;
use serde_json;

/// AMQP queue and exchange names
pub const COMMAND_QUEUE: &str = "matchmaking.commands";
pub const MATCH_EVENTS_EXCHANGE: &str = "matchmaking.match_events";
pub const REPLIES_EXCHANGE: &str = "matchmaking.replies";

/// Routing keys for events
pub const MATCH_FOUND_CASUAL_ROUTING_KEY: &str = "match.found.casual";
pub const MATCH_FOUND_RANKED_ROUTING_KEY: &str = "match.found.ranked";
pub const MATCH_REPORTED_ROUTING_KEY: &str = "match.reported";
pub const LEADERBOARD_RESET_ROUTING_KEY: &str = "leaderboard.reset";
pub const COMMAND_REQUEST_ROUTING_KEY: &str = "command.request";
pub const COMMAND_REPLY_ROUTING_KEY: &str = "command.reply";

/// Message envelope with metadata
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MessageEnvelope<T> {
    pub payload: T,
    pub correlation_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub routing_key: String,
}

impl<T> MessageEnvelope<T>
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    /// Create a new message envelope
    pub fn new(payload: T, routing_key: String) -> Self {
        Self {
            payload,
            correlation_id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now(),
            routing_key,
        }
    }

    /// Create an envelope whose correlation id is derived from the payload
    ///
    /// Republishing the same logical event yields the same correlation id.
    pub fn with_correlation_id(payload: T, routing_key: String, correlation_id: String) -> Self {
        Self {
            payload,
            correlation_id,
            timestamp: chrono::Utc::now(),
            routing_key,
        }
    }

    /// Serialize the envelope to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            MatchmakingError::InternalError {
                message: format!("Failed to serialize message: {}", e),
            }
            .into()
        })
    }

    /// Deserialize envelope from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            MatchmakingError::InvalidCommand {
                reason: format!("Failed to deserialize message: {}", e),
            }
            .into()
        })
    }
}

/// Message serialization and validation utilities
pub struct MessageUtils;

impl MessageUtils {
    /// Serialize a command request to bytes
    pub fn serialize_command_request(request: &CommandRequest) -> Result<Vec<u8>> {
        Self::validate_command_request(request)?;
        serde_json::to_vec(request).map_err(|e| {
            MatchmakingError::InternalError {
                message: format!("Failed to serialize command request: {}", e),
            }
            .into()
        })
    }

    /// Deserialize command request from bytes
    pub fn deserialize_command_request(bytes: &[u8]) -> Result<CommandRequest> {
        let request: CommandRequest =
            serde_json::from_slice(bytes).map_err(|e| MatchmakingError::InvalidCommand {
                reason: format!("Failed to deserialize command request: {}", e),
            })?;

        Self::validate_command_request(&request)?;
        Ok(request)
    }

    /// Validate a command request
    pub fn validate_command_request(request: &CommandRequest) -> Result<()> {
        if !crate::utils::is_valid_player_id(&request.player_id) {
            return Err(MatchmakingError::InvalidCommand {
                reason: "Player ID cannot be empty".to_string(),
            }
            .into());
        }

        if let Command::Report { opponent, .. } = &request.command {
            if !crate::utils::is_valid_player_id(opponent) {
                return Err(MatchmakingError::InvalidCommand {
                    reason: "Opponent ID cannot be empty".to_string(),
                }
                .into());
            }

            if opponent == &request.player_id {
                return Err(MatchmakingError::InvalidCommand {
                    reason: "You cannot report a match against yourself".to_string(),
                }
                .into());
            }
        }

        Ok(())
    }

    /// Serialize any AMQP message to bytes
    pub fn serialize_message<T: serde::Serialize>(message: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(message).map_err(|e| {
            MatchmakingError::InternalError {
                message: format!("Failed to serialize message: {}", e),
            }
            .into()
        })
    }

    /// Routing key for a match-found event from `queue`
    pub fn match_found_routing_key(queue: QueueKind) -> &'static str {
        match queue {
            QueueKind::Casual => MATCH_FOUND_CASUAL_ROUTING_KEY,
            QueueKind::Ranked => MATCH_FOUND_RANKED_ROUTING_KEY,
        }
    }

    /// Get routing key for a message type
    pub fn get_routing_key(message: &AmqpMessage) -> &'static str {
        match message {
            AmqpMessage::CommandRequest(_) => COMMAND_REQUEST_ROUTING_KEY,
            AmqpMessage::CommandReply(_) => COMMAND_REPLY_ROUTING_KEY,
            AmqpMessage::MatchFound(found) => Self::match_found_routing_key(found.queue),
            AmqpMessage::MatchReported(_) => MATCH_REPORTED_ROUTING_KEY,
            AmqpMessage::LeaderboardReset(_) => LEADERBOARD_RESET_ROUTING_KEY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{current_timestamp, generate_match_id};

    fn create_test_command_request(command: Command) -> CommandRequest {
        CommandRequest {
            request_id: "req-1".to_string(),
            player_id: "111".to_string(),
            command,
            timestamp: current_timestamp(),
        }
    }

    #[test]
    fn test_message_envelope_creation() {
        let request = create_test_command_request(Command::JoinRanked);
        let envelope = MessageEnvelope::new(request, "test.routing.key".to_string());

        assert_eq!(envelope.routing_key, "test.routing.key");
        assert!(!envelope.correlation_id.is_empty());
    }

    #[test]
    fn test_command_request_validation() {
        let valid = create_test_command_request(Command::Report {
            opponent: "222".to_string(),
            won: true,
        });
        assert!(MessageUtils::validate_command_request(&valid).is_ok());

        let mut empty_player = create_test_command_request(Command::JoinCasual);
        empty_player.player_id = " ".to_string();
        assert!(MessageUtils::validate_command_request(&empty_player).is_err());

        let self_report = create_test_command_request(Command::Report {
            opponent: "111".to_string(),
            won: false,
        });
        let err = MessageUtils::validate_command_request(&self_report).unwrap_err();
        assert_eq!(
            MatchmakingError::find(&err).unwrap().kind(),
            "invalid_command"
        );
    }

    #[test]
    fn test_parse_wire_format() {
        let json = br#"{
            "request_id": "abc",
            "player_id": "42",
            "command": {"type": "report", "opponent": "43", "won": false},
            "timestamp": "2024-05-01T12:00:00Z"
        }"#;

        let request = MessageUtils::deserialize_command_request(json).unwrap();
        assert_eq!(request.player_id, "42");
        assert_eq!(
            request.command,
            Command::Report {
                opponent: "43".to_string(),
                won: false
            }
        );

        let unit = br#"{"request_id":"x","player_id":"1","command":{"type":"leaderboard"},"timestamp":"2024-05-01T12:00:00Z"}"#;
        let request = MessageUtils::deserialize_command_request(unit).unwrap();
        assert_eq!(request.command.name(), "leaderboard");
    }

    #[test]
    fn test_reject_unknown_command() {
        let json = br#"{"request_id":"x","player_id":"1","command":{"type":"dance"},"timestamp":"2024-05-01T12:00:00Z"}"#;
        assert!(MessageUtils::deserialize_command_request(json).is_err());
    }

    #[test]
    fn test_routing_key_generation() {
        let request = AmqpMessage::CommandRequest(create_test_command_request(Command::JoinCasual));
        assert_eq!(
            MessageUtils::get_routing_key(&request),
            COMMAND_REQUEST_ROUTING_KEY
        );

        let found = AmqpMessage::MatchFound(MatchFound {
            match_id: generate_match_id(),
            queue: QueueKind::Ranked,
            player_one: "a".to_string(),
            player_two: "b".to_string(),
            timestamp: current_timestamp(),
        });
        assert_eq!(
            MessageUtils::get_routing_key(&found),
            MATCH_FOUND_RANKED_ROUTING_KEY
        );
        assert_eq!(
            MessageUtils::match_found_routing_key(QueueKind::Casual),
            "match.found.casual"
        );
    }
}
