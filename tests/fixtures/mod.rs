//! Test fixtures and mock implementations for integration testing

#![allow(dead_code)]

use async_trait::async_trait;
use ladder_room::amqp::publisher::EventPublisher;
use ladder_room::error::{MatchmakingError, Result};
use ladder_room::matchmaking::MatchmakingManager;
use ladder_room::rating::{InMemoryPlayerStore, PlayerStore, RecordDelta, SqlitePlayerStore};
use ladder_room::types::{
    AmqpMessage, CommandReply, LeaderboardReset, MatchFound, MatchReported, PlayerRecord,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Mock event publisher that captures published events for testing
#[derive(Debug, Default)]
pub struct MockEventPublisher {
    published_events: Arc<Mutex<Vec<AmqpMessage>>>,
}

impl MockEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all published events (for testing)
    pub fn get_published_events(&self) -> Vec<AmqpMessage> {
        self.published_events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Count events of specific type
    pub fn count_events_of_type(&self, event_type: &str) -> usize {
        self.get_published_events()
            .iter()
            .filter(|event| match event {
                AmqpMessage::MatchFound(_) => event_type == "MatchFound",
                AmqpMessage::MatchReported(_) => event_type == "MatchReported",
                AmqpMessage::LeaderboardReset(_) => event_type == "LeaderboardReset",
                AmqpMessage::CommandReply(_) => event_type == "CommandReply",
                AmqpMessage::CommandRequest(_) => event_type == "CommandRequest",
            })
            .count()
    }

    /// All match-found events in publication order
    pub fn matches_found(&self) -> Vec<MatchFound> {
        self.get_published_events()
            .into_iter()
            .filter_map(|event| match event {
                AmqpMessage::MatchFound(found) => Some(found),
                _ => None,
            })
            .collect()
    }

    fn push(&self, message: AmqpMessage) {
        if let Ok(mut events) = self.published_events.lock() {
            events.push(message);
        }
    }
}

#[async_trait]
impl EventPublisher for MockEventPublisher {
    async fn publish_match_found(&self, event: MatchFound) -> Result<()> {
        self.push(AmqpMessage::MatchFound(event));
        Ok(())
    }

    async fn publish_match_reported(&self, event: MatchReported) -> Result<()> {
        self.push(AmqpMessage::MatchReported(event));
        Ok(())
    }

    async fn publish_leaderboard_reset(&self, event: LeaderboardReset) -> Result<()> {
        self.push(AmqpMessage::LeaderboardReset(event));
        Ok(())
    }

    async fn publish_command_reply(&self, reply: CommandReply) -> Result<()> {
        self.push(AmqpMessage::CommandReply(reply));
        Ok(())
    }
}

/// Player store wrapper whose next `failures` result writes fail
///
/// Reads pass through so a failed report can be retried against the same
/// records once the store recovers.
pub struct FlakyPlayerStore {
    inner: Arc<dyn PlayerStore>,
    remaining_failures: AtomicUsize,
}

impl FlakyPlayerStore {
    pub fn new(inner: Arc<dyn PlayerStore>, failures: usize) -> Self {
        Self {
            inner,
            remaining_failures: AtomicUsize::new(failures),
        }
    }

    fn should_fail(&self) -> bool {
        self.remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl PlayerStore for FlakyPlayerStore {
    async fn ensure_exists(&self, player_id: &str) -> Result<()> {
        self.inner.ensure_exists(player_id).await
    }

    async fn get_rating(&self, player_id: &str) -> Result<i64> {
        self.inner.get_rating(player_id).await
    }

    async fn get_player(&self, player_id: &str) -> Result<Option<PlayerRecord>> {
        self.inner.get_player(player_id).await
    }

    async fn apply_result(&self, delta: RecordDelta) -> Result<PlayerRecord> {
        if self.should_fail() {
            return Err(MatchmakingError::storage("simulated write failure").into());
        }
        self.inner.apply_result(delta).await
    }

    async fn apply_results(&self, deltas: Vec<RecordDelta>) -> Result<Vec<PlayerRecord>> {
        if self.should_fail() {
            return Err(MatchmakingError::storage("simulated write failure").into());
        }
        self.inner.apply_results(deltas).await
    }

    async fn top_n(&self, limit: usize) -> Result<Vec<PlayerRecord>> {
        self.inner.top_n(limit).await
    }

    async fn reset_all(&self) -> Result<u64> {
        self.inner.reset_all().await
    }

    async fn player_count(&self) -> Result<usize> {
        self.inner.player_count().await
    }
}

/// Manager over an in-memory store
pub fn create_memory_system() -> (MatchmakingManager, Arc<MockEventPublisher>) {
    let event_publisher = Arc::new(MockEventPublisher::new());
    let manager =
        MatchmakingManager::new(Arc::new(InMemoryPlayerStore::new()), event_publisher.clone());
    (manager, event_publisher)
}

/// Manager over an in-memory SQLite database
pub async fn create_sqlite_system() -> (
    MatchmakingManager,
    Arc<SqlitePlayerStore>,
    Arc<MockEventPublisher>,
) {
    let store = Arc::new(
        SqlitePlayerStore::connect("sqlite::memory:", 1)
            .await
            .expect("in-memory SQLite store"),
    );
    let event_publisher = Arc::new(MockEventPublisher::new());
    let manager = MatchmakingManager::new(store.clone(), event_publisher.clone());
    (manager, store, event_publisher)
}

/// Pair two players in the ranked queue, returning the created match
pub async fn play_ranked(manager: &MatchmakingManager, first: &str, second: &str) -> MatchFound {
    manager
        .join_ranked(first)
        .await
        .expect("first ranked join");
    manager
        .join_ranked(second)
        .await
        .expect("second ranked join")
        .match_found()
        .cloned()
        .expect("second join completes a pair")
}

/// Database file path unique to one test
pub fn temp_database_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!(
        "ladder-room-{}-{}.db",
        name,
        uuid::Uuid::new_v4()
    ))
}
