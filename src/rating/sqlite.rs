//! SQLite-backed player store
//!
//! Records live in a single `players` table keyed by player id. Schema
//! creation is idempotent so restarting the service keeps every record.

use crate::error::{MatchmakingError, Result};
use crate::rating::storage::{PlayerStore, RecordDelta};
use crate::types::{PlayerRecord, DEFAULT_RATING};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

const CREATE_PLAYERS_TABLE: &str = "CREATE TABLE IF NOT EXISTS players (
    user_id TEXT PRIMARY KEY,
    wins INTEGER NOT NULL DEFAULT 0,
    losses INTEGER NOT NULL DEFAULT 0,
    elo INTEGER NOT NULL DEFAULT 500
)";

const SELECT_PLAYER: &str = "SELECT user_id, wins, losses, elo FROM players WHERE user_id = ?";

/// Player store persisted in SQLite through a sqlx connection pool
#[derive(Debug, Clone)]
pub struct SqlitePlayerStore {
    pool: SqlitePool,
}

impl SqlitePlayerStore {
    /// Open (creating if needed) the database at `database_url` and ensure the schema
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        info!("Opening player database: {}", database_url);

        let in_memory = database_url.contains(":memory:");

        if !in_memory {
            let path = database_url
                .trim_start_matches("sqlite://")
                .trim_start_matches("sqlite:");
            let path = path.split('?').next().unwrap_or(path);
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(MatchmakingError::storage)?;
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(MatchmakingError::storage)?
            .create_if_missing(true);

        // Every connection to `:memory:` is its own database, so pin it to one
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections.max(1))
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(MatchmakingError::storage)?;

        let store = Self::new(pool);
        store.migrate().await?;

        info!("Player database ready");
        Ok(store)
    }

    /// Wrap an existing pool; call [`SqlitePlayerStore::migrate`] before use
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the players table if it does not exist
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(CREATE_PLAYERS_TABLE)
            .execute(&self.pool)
            .await
            .map_err(MatchmakingError::storage)?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn record_from_row(row: &SqliteRow) -> Result<PlayerRecord> {
    let player_id: String = row.try_get("user_id").map_err(MatchmakingError::storage)?;
    let wins: i64 = row.try_get("wins").map_err(MatchmakingError::storage)?;
    let losses: i64 = row.try_get("losses").map_err(MatchmakingError::storage)?;
    let rating: i64 = row.try_get("elo").map_err(MatchmakingError::storage)?;

    Ok(PlayerRecord {
        player_id,
        wins: u32::try_from(wins).map_err(MatchmakingError::storage)?,
        losses: u32::try_from(losses).map_err(MatchmakingError::storage)?,
        rating,
    })
}

async fn apply_delta(conn: &mut SqliteConnection, delta: &RecordDelta) -> Result<PlayerRecord> {
    let updated = sqlx::query(
        "UPDATE players SET wins = wins + ?, losses = losses + ?, elo = elo + ? WHERE user_id = ?",
    )
    .bind(i64::from(delta.wins))
    .bind(i64::from(delta.losses))
    .bind(delta.rating)
    .bind(&delta.player_id)
    .execute(&mut *conn)
    .await
    .map_err(MatchmakingError::storage)?;

    if updated.rows_affected() == 0 {
        return Err(MatchmakingError::ConsistencyFault {
            message: format!("no player record for '{}'", delta.player_id),
        }
        .into());
    }

    let row = sqlx::query(SELECT_PLAYER)
        .bind(&delta.player_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(MatchmakingError::storage)?;

    record_from_row(&row)
}

#[async_trait]
impl PlayerStore for SqlitePlayerStore {
    async fn ensure_exists(&self, player_id: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO players (user_id, wins, losses, elo) VALUES (?, 0, 0, ?)")
            .bind(player_id)
            .bind(DEFAULT_RATING)
            .execute(&self.pool)
            .await
            .map_err(MatchmakingError::storage)?;
        Ok(())
    }

    async fn get_rating(&self, player_id: &str) -> Result<i64> {
        let rating: Option<i64> = sqlx::query_scalar("SELECT elo FROM players WHERE user_id = ?")
            .bind(player_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(MatchmakingError::storage)?;
        Ok(rating.unwrap_or(DEFAULT_RATING))
    }

    async fn get_player(&self, player_id: &str) -> Result<Option<PlayerRecord>> {
        let row = sqlx::query(SELECT_PLAYER)
            .bind(player_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(MatchmakingError::storage)?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn apply_result(&self, delta: RecordDelta) -> Result<PlayerRecord> {
        let mut conn = self.pool.acquire().await.map_err(MatchmakingError::storage)?;
        apply_delta(&mut conn, &delta).await
    }

    async fn apply_results(&self, deltas: Vec<RecordDelta>) -> Result<Vec<PlayerRecord>> {
        let mut tx = self.pool.begin().await.map_err(MatchmakingError::storage)?;

        let mut updated = Vec::with_capacity(deltas.len());
        for delta in &deltas {
            // Dropping `tx` on error rolls back the earlier updates
            updated.push(apply_delta(&mut tx, delta).await?);
        }

        tx.commit().await.map_err(MatchmakingError::storage)?;

        debug!("Applied {} record deltas", updated.len());
        Ok(updated)
    }

    async fn top_n(&self, n: usize) -> Result<Vec<PlayerRecord>> {
        let limit = i64::try_from(n).unwrap_or(i64::MAX);
        let rows = sqlx::query(
            "SELECT user_id, wins, losses, elo FROM players ORDER BY elo DESC, user_id ASC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(MatchmakingError::storage)?;

        rows.iter().map(record_from_row).collect()
    }

    async fn reset_all(&self) -> Result<u64> {
        let deleted = sqlx::query("DELETE FROM players")
            .execute(&self.pool)
            .await
            .map_err(MatchmakingError::storage)?;
        Ok(deleted.rows_affected())
    }

    async fn player_count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM players")
            .fetch_one(&self.pool)
            .await
            .map_err(MatchmakingError::storage)?;
        Ok(count.max(0) as usize)
    }
}
