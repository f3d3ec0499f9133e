//! Player record storage interface and implementations
//!
//! This module defines the interface for persisting and retrieving player
//! records, with an in-memory implementation for tests and ephemeral runs.
//! The durable implementation lives in [`crate::rating::sqlite`].

use crate::error::{MatchmakingError, Result};
use crate::types::{PlayerId, PlayerRecord, DEFAULT_RATING};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// Amounts to add to one player's record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDelta {
    pub player_id: PlayerId,
    pub wins: u32,
    pub losses: u32,
    pub rating: i64,
}

impl RecordDelta {
    /// One win plus a rating change
    pub fn win(player_id: impl Into<PlayerId>, rating: i64) -> Self {
        Self {
            player_id: player_id.into(),
            wins: 1,
            losses: 0,
            rating,
        }
    }

    /// One loss plus a rating change
    pub fn loss(player_id: impl Into<PlayerId>, rating: i64) -> Self {
        Self {
            player_id: player_id.into(),
            wins: 0,
            losses: 1,
            rating,
        }
    }

    /// Add this delta to a record in place
    pub fn apply_to(&self, record: &mut PlayerRecord) {
        record.wins = record.wins.saturating_add(self.wins);
        record.losses = record.losses.saturating_add(self.losses);
        record.rating += self.rating;
    }
}

/// Trait for player record storage operations
///
/// Every rating that is read in order to compute a write must be preceded by
/// [`PlayerStore::ensure_exists`] for that player, so the default used for the
/// computation is the default that gets persisted.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlayerStore: Send + Sync {
    /// Insert a default record if none exists; no-op otherwise
    async fn ensure_exists(&self, player_id: &str) -> Result<()>;

    /// Stored rating, or the default rating when the player has no record
    async fn get_rating(&self, player_id: &str) -> Result<i64>;

    /// Get a player's full record
    async fn get_player(&self, player_id: &str) -> Result<Option<PlayerRecord>>;

    /// Add a delta to an existing record and return the updated record
    async fn apply_result(&self, delta: RecordDelta) -> Result<PlayerRecord>;

    /// Apply several deltas as one unit: either all records change or none do
    async fn apply_results(&self, deltas: Vec<RecordDelta>) -> Result<Vec<PlayerRecord>>;

    /// Top `n` records by rating, descending; ties ordered by player id
    async fn top_n(&self, n: usize) -> Result<Vec<PlayerRecord>>;

    /// Delete every record, returning how many were removed
    async fn reset_all(&self) -> Result<u64>;

    /// Get total number of stored players
    async fn player_count(&self) -> Result<usize>;
}

/// Order used by every leaderboard query
pub fn leaderboard_order(a: &PlayerRecord, b: &PlayerRecord) -> std::cmp::Ordering {
    b.rating
        .cmp(&a.rating)
        .then_with(|| a.player_id.cmp(&b.player_id))
}

fn missing_record(player_id: &str) -> MatchmakingError {
    MatchmakingError::ConsistencyFault {
        message: format!("no player record for '{}'", player_id),
    }
}

/// In-memory player storage implementation
#[derive(Debug, Default)]
pub struct InMemoryPlayerStore {
    players: RwLock<HashMap<PlayerId, PlayerRecord>>,
}

impl InMemoryPlayerStore {
    /// Create a new, empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset records for testing
    pub fn with_players(players: Vec<PlayerRecord>) -> Self {
        let players = players
            .into_iter()
            .map(|record| (record.player_id.clone(), record))
            .collect();
        Self {
            players: RwLock::new(players),
        }
    }

    fn read_lock(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<PlayerId, PlayerRecord>>> {
        self.players.read().map_err(|_| {
            MatchmakingError::InternalError {
                message: "Failed to acquire players read lock".to_string(),
            }
            .into()
        })
    }

    fn write_lock(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<PlayerId, PlayerRecord>>> {
        self.players.write().map_err(|_| {
            MatchmakingError::InternalError {
                message: "Failed to acquire players write lock".to_string(),
            }
            .into()
        })
    }
}

#[async_trait]
impl PlayerStore for InMemoryPlayerStore {
    async fn ensure_exists(&self, player_id: &str) -> Result<()> {
        let mut players = self.write_lock()?;
        players
            .entry(player_id.to_string())
            .or_insert_with(|| PlayerRecord::new(player_id));
        Ok(())
    }

    async fn get_rating(&self, player_id: &str) -> Result<i64> {
        let players = self.read_lock()?;
        Ok(players
            .get(player_id)
            .map(|record| record.rating)
            .unwrap_or(DEFAULT_RATING))
    }

    async fn get_player(&self, player_id: &str) -> Result<Option<PlayerRecord>> {
        let players = self.read_lock()?;
        Ok(players.get(player_id).cloned())
    }

    async fn apply_result(&self, delta: RecordDelta) -> Result<PlayerRecord> {
        let mut updated = self.apply_results(vec![delta]).await?;
        updated.pop().ok_or_else(|| {
            MatchmakingError::InternalError {
                message: "apply_results returned no record".to_string(),
            }
            .into()
        })
    }

    async fn apply_results(&self, deltas: Vec<RecordDelta>) -> Result<Vec<PlayerRecord>> {
        let mut players = self.write_lock()?;

        // Validate first so a missing record leaves every record untouched
        if let Some(missing) = deltas
            .iter()
            .find(|delta| !players.contains_key(&delta.player_id))
        {
            return Err(missing_record(&missing.player_id).into());
        }

        let mut updated = Vec::with_capacity(deltas.len());
        for delta in &deltas {
            if let Some(record) = players.get_mut(&delta.player_id) {
                delta.apply_to(record);
                updated.push(record.clone());
            }
        }

        Ok(updated)
    }

    async fn top_n(&self, n: usize) -> Result<Vec<PlayerRecord>> {
        let players = self.read_lock()?;

        let mut records: Vec<PlayerRecord> = players.values().cloned().collect();
        records.sort_by(leaderboard_order);
        records.truncate(n);

        Ok(records)
    }

    async fn reset_all(&self) -> Result<u64> {
        let mut players = self.write_lock()?;
        let removed = players.len() as u64;
        players.clear();
        Ok(removed)
    }

    async fn player_count(&self) -> Result<usize> {
        let players = self.read_lock()?;
        Ok(players.len())
    }
}
