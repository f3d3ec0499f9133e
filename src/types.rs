//! Common types used throughout the matchmaking service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque participant identity (a chat platform user id)
pub type PlayerId = String;

/// Unique identifier for a pairing
pub type MatchId = Uuid;

/// Rating every player starts from
pub const DEFAULT_RATING: i64 = 500;

/// Which queue a participant is waiting in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueKind {
    Casual,
    Ranked,
}

impl QueueKind {
    pub const ALL: [QueueKind; 2] = [QueueKind::Casual, QueueKind::Ranked];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueKind::Casual => "casual",
            QueueKind::Ranked => "ranked",
        }
    }
}

impl std::fmt::Display for QueueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted per-player standing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub player_id: PlayerId,
    pub wins: u32,
    pub losses: u32,
    pub rating: i64,
}

impl PlayerRecord {
    /// Fresh record with no games and the default rating
    pub fn new(player_id: impl Into<PlayerId>) -> Self {
        Self {
            player_id: player_id.into(),
            wins: 0,
            losses: 0,
            rating: DEFAULT_RATING,
        }
    }

    pub fn games_played(&self) -> u32 {
        self.wins + self.losses
    }
}

/// Event emitted when a queue yields a pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchFound {
    pub match_id: MatchId,
    pub queue: QueueKind,
    /// Longest-waiting participant
    pub player_one: PlayerId,
    pub player_two: PlayerId,
    pub timestamp: DateTime<Utc>,
}

impl MatchFound {
    pub fn involves(&self, player_id: &str) -> bool {
        self.player_one == player_id || self.player_two == player_id
    }
}

/// Event emitted once a ranked result has been applied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchReported {
    pub match_id: MatchId,
    pub reporter: PlayerId,
    pub opponent: PlayerId,
    pub reporter_won: bool,
    /// Change applied to the reporter; the opponent received the negation
    pub rating_delta: i64,
    pub reporter_record: PlayerRecord,
    pub opponent_record: PlayerRecord,
    pub timestamp: DateTime<Utc>,
}

impl MatchReported {
    pub fn winner(&self) -> &PlayerId {
        if self.reporter_won {
            &self.reporter
        } else {
            &self.opponent
        }
    }

    pub fn loser(&self) -> &PlayerId {
        if self.reporter_won {
            &self.opponent
        } else {
            &self.reporter
        }
    }
}

/// Event emitted when all player records were deleted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardReset {
    pub players_removed: u64,
    pub timestamp: DateTime<Utc>,
}

/// Result of a successful join
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum JoinOutcome {
    /// Still waiting; `position` is 1-based
    Queued { queue: QueueKind, position: usize },
    /// The join completed a pair
    Matched(MatchFound),
}

impl JoinOutcome {
    pub fn match_found(&self) -> Option<&MatchFound> {
        match self {
            JoinOutcome::Matched(found) => Some(found),
            JoinOutcome::Queued { .. } => None,
        }
    }
}

/// Operations a collaborator can request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    JoinCasual,
    JoinRanked,
    Report { opponent: PlayerId, won: bool },
    Leaderboard,
    /// Callers must only send this for administrators
    ResetLeaderboard,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::JoinCasual => "join_casual",
            Command::JoinRanked => "join_ranked",
            Command::Report { .. } => "report",
            Command::Leaderboard => "leaderboard",
            Command::ResetLeaderboard => "reset_leaderboard",
        }
    }
}

/// AMQP Message Types
/// Inbound request issued on behalf of a player
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRequest {
    pub request_id: String,
    pub player_id: PlayerId,
    pub command: Command,
    pub timestamp: DateTime<Utc>,
}

/// Data returned by a successful command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum CommandPayload {
    Joined(JoinOutcome),
    Reported(MatchReported),
    Leaderboard(Vec<PlayerRecord>),
    LeaderboardReset(LeaderboardReset),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommandOutcome {
    Success { payload: CommandPayload },
    Failure { kind: String, message: String },
}

/// Reply published for every processed command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandReply {
    pub request_id: String,
    pub player_id: PlayerId,
    pub outcome: CommandOutcome,
    pub timestamp: DateTime<Utc>,
}

/// Union type for all AMQP messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AmqpMessage {
    CommandRequest(CommandRequest),
    CommandReply(CommandReply),
    MatchFound(MatchFound),
    MatchReported(MatchReported),
    LeaderboardReset(LeaderboardReset),
}
