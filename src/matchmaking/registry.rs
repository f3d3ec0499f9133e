//! Registry of unresolved ranked matches
//!
//! Every active match is stored under both participants, each entry pointing
//! at the other. Entries are only ever inserted and removed in pairs.

use crate::error::{MatchmakingError, Result};
use crate::types::{MatchId, PlayerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One participant's view of an active match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveMatch {
    pub match_id: MatchId,
    pub opponent: PlayerId,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct MatchRegistry {
    entries: HashMap<PlayerId, ActiveMatch>,
}

impl MatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `player_a` and `player_b` to each other
    pub fn create(&mut self, match_id: MatchId, player_a: &str, player_b: &str) -> Result<()> {
        if player_a == player_b {
            return Err(MatchmakingError::ConsistencyFault {
                message: format!("cannot match '{}' against themselves", player_a),
            }
            .into());
        }

        if let Some(busy) = [player_a, player_b]
            .into_iter()
            .find(|player| self.entries.contains_key(*player))
        {
            return Err(MatchmakingError::ConsistencyFault {
                message: format!("'{}' already has an active match", busy),
            }
            .into());
        }

        let started_at = Utc::now();
        self.entries.insert(
            player_a.to_string(),
            ActiveMatch {
                match_id,
                opponent: player_b.to_string(),
                started_at,
            },
        );
        self.entries.insert(
            player_b.to_string(),
            ActiveMatch {
                match_id,
                opponent: player_a.to_string(),
                started_at,
            },
        );

        Ok(())
    }

    pub fn get_opponent(&self, player_id: &str) -> Option<&PlayerId> {
        self.entries.get(player_id).map(|active| &active.opponent)
    }

    pub fn get(&self, player_id: &str) -> Option<&ActiveMatch> {
        self.entries.get(player_id)
    }

    /// Remove the match between `player_a` and `player_b`
    ///
    /// Fails without touching anything unless both entries point at each other.
    pub fn resolve(&mut self, player_a: &str, player_b: &str) -> Result<ActiveMatch> {
        let paired = self.get_opponent(player_a).map(String::as_str) == Some(player_b)
            && self.get_opponent(player_b).map(String::as_str) == Some(player_a);

        if !paired {
            return Err(MatchmakingError::ConsistencyFault {
                message: format!(
                    "registry does not pair '{}' with '{}'",
                    player_a, player_b
                ),
            }
            .into());
        }

        self.entries.remove(player_b);
        self.entries.remove(player_a).ok_or_else(|| {
            MatchmakingError::ConsistencyFault {
                message: format!("entry for '{}' vanished during resolve", player_a),
            }
            .into()
        })
    }

    /// Number of active matches (not entries)
    pub fn match_count(&self) -> usize {
        self.entries.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
